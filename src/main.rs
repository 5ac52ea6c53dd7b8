//! Reachmap: place points of interest, group them into categories, and fetch
//! walking-isochrone overlays from Openrouteservice.
//!
//! The CLI owns entity CRUD and credential management; the overlay engine
//! owns fetching, quota, caching, and reconciliation.

mod config;

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{AppConfig, Category, IsochroneResult, Point, Store};
use ors_client::{IsochroneCache, OrsClient, QuotaTracker};
use overlay::OverlayEngine;

const CATEGORIES_KEY: &str = "categories";
const POINTS_KEY: &str = "points";
const API_KEY_KEY: &str = "api-key";
const OVERLAYS_KEY: &str = "overlays";
const CATEGORIES_SEEDED_KEY: &str = "categories-initialized";

/// Map points of interest and fetch walking isochrone overlays.
#[derive(Parser)]
#[command(name = "reachmap", about = "Map points of interest and fetch walking isochrone overlays")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch isochrone overlays for all eligible points.
    Fetch {
        /// Travel time in minutes (clamped to the configured bounds).
        #[arg(long)]
        minutes: Option<u32>,

        /// Refetch even when a cached result exists, and keep going past
        /// quota or credential errors.
        #[arg(long)]
        force: bool,
    },

    /// Show local API usage against the minute and daily limits.
    Usage,

    /// Store the Openrouteservice API key.
    SetKey { key: String },

    /// Add a category.
    AddCategory {
        name: String,

        /// Hex color for rendering.
        #[arg(long, default_value = "#808080")]
        color: String,

        /// Emoji marker.
        #[arg(long, default_value = "📍")]
        icon: String,

        /// Create the category with isochrone generation disabled.
        #[arg(long)]
        no_isochrones: bool,
    },

    /// Edit a category's fields.
    EditCategory {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        icon: Option<String>,

        /// Enable or disable isochrone generation for the category.
        #[arg(long)]
        generate_isochrones: Option<bool>,
    },

    /// Delete a category, all points in it, and their overlays.
    RemoveCategory { id: String },

    /// Toggle a category's visibility.
    ToggleCategory { id: String },

    /// Add a point to a category.
    AddPoint {
        /// Id of the category the point belongs to.
        #[arg(long)]
        category: String,

        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lng: f64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        link: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a point and its overlay.
    RemovePoint { id: String },

    /// Toggle a point's visibility.
    TogglePoint { id: String },

    /// List categories and points.
    List,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reachmap=info,ors_client=info,overlay=info".into()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let store = match Store::open(config::resolve_data_dir()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open data directory: {}", e);
            std::process::exit(1);
        }
    };

    let mut categories: Vec<Category> = store.read(CATEGORIES_KEY);
    seed_default_category(&store, &mut categories);
    let mut points: Vec<Point> = store.read(POINTS_KEY);

    match cli.command {
        Command::Fetch { minutes, force } => {
            run_fetch(&cfg, &store, &categories, &points, minutes, force).await;
        }
        Command::Usage => show_usage(&cfg, &store),
        Command::SetKey { key } => set_key(&store, &key),
        Command::AddCategory {
            name,
            color,
            icon,
            no_isochrones,
        } => add_category(&store, &mut categories, name, color, icon, !no_isochrones),
        Command::EditCategory {
            id,
            name,
            color,
            icon,
            generate_isochrones,
        } => edit_category(&store, &mut categories, &id, name, color, icon, generate_isochrones),
        Command::RemoveCategory { id } => {
            remove_category(&store, &mut categories, &mut points, &id)
        }
        Command::ToggleCategory { id } => toggle_category(&store, &mut categories, &id),
        Command::AddPoint {
            category,
            lat,
            lng,
            name,
            link,
            description,
        } => add_point(&store, &categories, &mut points, category, lat, lng, name, link, description),
        Command::RemovePoint { id } => remove_point(&store, &mut points, &id),
        Command::TogglePoint { id } => toggle_point(&store, &mut points, &id),
        Command::List => list(&categories, &points),
    }
}

/// Seed the "General" category exactly once on a fresh data directory, so a
/// wiped category list later on stays wiped.
fn seed_default_category(store: &Store, categories: &mut Vec<Category>) {
    let seeded = store.read_opt::<bool>(CATEGORIES_SEEDED_KEY).unwrap_or(false);
    if seeded {
        return;
    }
    if categories.is_empty() {
        let general = Category {
            id: Uuid::new_v4().to_string(),
            name: "General".into(),
            color: "#808080".into(),
            icon: "📍".into(),
            is_visible: true,
            generate_isochrones: true,
        };
        info!("Seeding default category \"General\" ({})", general.id);
        categories.push(general);
        write_or_die(store, CATEGORIES_KEY, categories);
    }
    write_or_die(store, CATEGORIES_SEEDED_KEY, &true);
}

fn write_or_die<T: serde::Serialize>(store: &Store, key: &str, value: &T) {
    if let Err(e) = store.write(key, value) {
        error!("Failed to persist {}: {}", key, e);
        std::process::exit(1);
    }
}

fn resolve_api_key(store: &Store) -> Option<String> {
    if let Ok(raw) = std::env::var("ORS_API_KEY") {
        if !raw.trim().is_empty() {
            return Some(raw);
        }
    }
    store
        .read_opt::<String>(API_KEY_KEY)
        .filter(|k| !k.trim().is_empty())
}

async fn run_fetch(
    cfg: &AppConfig,
    store: &Store,
    categories: &[Category],
    points: &[Point],
    minutes: Option<u32>,
    force: bool,
) {
    let minutes = cfg
        .travel
        .clamp_minutes(minutes.unwrap_or(cfg.travel.default_minutes));

    let api_key = resolve_api_key(store);
    if api_key.is_none() {
        error!("API Key is not configured. Set ORS_API_KEY or run `reachmap set-key`.");
        std::process::exit(1);
    }

    let quota = QuotaTracker::load(store.clone(), cfg.api.minute_limit, cfg.api.daily_limit);
    let cache = IsochroneCache::load(store.clone());
    let client = OrsClient::new(&cfg.api, api_key, quota, cache);

    let overlays: HashMap<String, IsochroneResult> = store.read(OVERLAYS_KEY);
    let mut engine = OverlayEngine::with_results(client, overlays);

    let mut rx = engine.progress();
    let progress_task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let p = *rx.borrow_and_update();
            if p.total > 0 {
                info!("Progress: {}/{}", p.current, p.total);
            }
        }
    });

    let report = engine.run(points, categories, minutes, force).await;

    if let Err(e) = store.write(OVERLAYS_KEY, engine.results()) {
        warn!("Failed to persist overlays: {}", e);
    }

    let (minute_used, minute_limit) = engine.source().minute_usage();
    let (daily_used, daily_limit) = engine.source().daily_usage();
    drop(engine);
    let _ = progress_task.await;

    if let Some(alert) = &report.alert {
        error!("{}", alert);
    }
    info!(
        "Batch complete: {} fetched, {} failed, {} skipped (of {} eligible)",
        report.fetched, report.failed, report.skipped, report.total
    );
    info!(
        "API usage — minute {}/{}, daily {}/{}",
        minute_used, minute_limit, daily_used, daily_limit
    );

    if report.needs_api_key {
        error!("Configuration required: set a valid API key with `reachmap set-key`.");
        std::process::exit(1);
    }
}

fn show_usage(cfg: &AppConfig, store: &Store) {
    let quota = QuotaTracker::load(store.clone(), cfg.api.minute_limit, cfg.api.daily_limit);
    let cache = IsochroneCache::load(store.clone());
    let key_configured = resolve_api_key(store).is_some();

    println!(
        "Minute window:  {}/{}",
        quota.minute_count(),
        quota.minute_limit()
    );
    println!(
        "Daily (UTC, last reset {}): {}/{}",
        quota.last_reset(),
        quota.daily_count(),
        quota.daily_limit()
    );
    println!("Cached isochrones: {}", cache.len());
    println!(
        "API key: {}",
        if key_configured { "configured" } else { "not configured" }
    );
}

fn set_key(store: &Store, key: &str) {
    if key.trim().is_empty() {
        error!("Refusing to store an empty API key.");
        std::process::exit(1);
    }
    write_or_die(store, API_KEY_KEY, &key.to_string());
    info!("API key stored.");
}

fn add_category(
    store: &Store,
    categories: &mut Vec<Category>,
    name: String,
    color: String,
    icon: String,
    generate_isochrones: bool,
) {
    let category = Category {
        id: Uuid::new_v4().to_string(),
        name,
        color,
        icon,
        is_visible: true,
        generate_isochrones,
    };
    info!("Added category \"{}\" ({})", category.name, category.id);
    categories.push(category);
    write_or_die(store, CATEGORIES_KEY, categories);
}

#[allow(clippy::too_many_arguments)]
fn edit_category(
    store: &Store,
    categories: &mut Vec<Category>,
    id: &str,
    name: Option<String>,
    color: Option<String>,
    icon: Option<String>,
    generate_isochrones: Option<bool>,
) {
    let Some(category) = categories.iter_mut().find(|c| c.id == id) else {
        error!("No category with id {}", id);
        std::process::exit(1);
    };

    if let Some(name) = name {
        category.name = name;
    }
    if let Some(color) = color {
        category.color = color;
    }
    if let Some(icon) = icon {
        category.icon = icon;
    }
    if let Some(generate) = generate_isochrones {
        category.generate_isochrones = generate;
    }
    info!("Updated category \"{}\" ({})", category.name, category.id);
    write_or_die(store, CATEGORIES_KEY, categories);
}

/// Deleting a category cascades: its points go, and so do their overlays.
fn remove_category(
    store: &Store,
    categories: &mut Vec<Category>,
    points: &mut Vec<Point>,
    id: &str,
) {
    let Some(idx) = categories.iter().position(|c| c.id == id) else {
        error!("No category with id {}", id);
        std::process::exit(1);
    };
    let removed = categories.remove(idx);

    let removed_point_ids: Vec<String> = points
        .iter()
        .filter(|p| p.category_id == id)
        .map(|p| p.id.clone())
        .collect();
    points.retain(|p| p.category_id != id);

    write_or_die(store, CATEGORIES_KEY, categories);
    write_or_die(store, POINTS_KEY, points);
    purge_overlays(store, &removed_point_ids);

    info!(
        "Removed category \"{}\" and {} point(s)",
        removed.name,
        removed_point_ids.len()
    );
}

fn toggle_category(store: &Store, categories: &mut Vec<Category>, id: &str) {
    let Some(category) = categories.iter_mut().find(|c| c.id == id) else {
        error!("No category with id {}", id);
        std::process::exit(1);
    };
    category.is_visible = !category.is_visible;
    info!(
        "Category \"{}\" is now {}",
        category.name,
        if category.is_visible { "visible" } else { "hidden" }
    );
    write_or_die(store, CATEGORIES_KEY, categories);
}

#[allow(clippy::too_many_arguments)]
fn add_point(
    store: &Store,
    categories: &[Category],
    points: &mut Vec<Point>,
    category_id: String,
    lat: f64,
    lng: f64,
    name: Option<String>,
    link: Option<String>,
    description: Option<String>,
) {
    if categories.is_empty() {
        error!("Please add a category first before placing points.");
        std::process::exit(1);
    }
    if !categories.iter().any(|c| c.id == category_id) {
        error!("No category with id {}", category_id);
        std::process::exit(1);
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        error!("Coordinates out of range: lat must be in [-90, 90], lng in [-180, 180]");
        std::process::exit(1);
    }

    let point = Point {
        id: Uuid::new_v4().to_string(),
        category_id,
        lat,
        lng,
        is_visible: true,
        name,
        link,
        description,
    };
    info!("Added {} at ({}, {})", point.label(), point.lat, point.lng);
    points.push(point);
    write_or_die(store, POINTS_KEY, points);
}

fn remove_point(store: &Store, points: &mut Vec<Point>, id: &str) {
    let Some(idx) = points.iter().position(|p| p.id == id) else {
        error!("No point with id {}", id);
        std::process::exit(1);
    };
    let removed = points.remove(idx);
    write_or_die(store, POINTS_KEY, points);
    purge_overlays(store, std::slice::from_ref(&removed.id));
    info!("Removed {}", removed.label());
}

fn toggle_point(store: &Store, points: &mut Vec<Point>, id: &str) {
    let Some(point) = points.iter_mut().find(|p| p.id == id) else {
        error!("No point with id {}", id);
        std::process::exit(1);
    };
    point.is_visible = !point.is_visible;
    info!(
        "{} is now {}",
        point.label(),
        if point.is_visible { "visible" } else { "hidden" }
    );
    write_or_die(store, POINTS_KEY, points);
}

/// Drop stored overlay results for deleted points.
fn purge_overlays(store: &Store, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    let mut overlays: HashMap<String, IsochroneResult> = store.read(OVERLAYS_KEY);
    let before = overlays.len();
    overlays.retain(|id, _| !ids.contains(id));
    if overlays.len() != before {
        write_or_die(store, OVERLAYS_KEY, &overlays);
    }
}

fn list(categories: &[Category], points: &[Point]) {
    if categories.is_empty() {
        println!("No categories.");
        return;
    }
    for category in categories {
        let flags = format!(
            "{}{}",
            if category.is_visible { "" } else { " [hidden]" },
            if category.generate_isochrones {
                ""
            } else {
                " [no isochrones]"
            }
        );
        println!(
            "{} {} ({}){}",
            category.icon, category.name, category.id, flags
        );
        for point in points.iter().filter(|p| p.category_id == category.id) {
            println!(
                "    {} ({}) at ({}, {}){}",
                point.label(),
                point.id,
                point.lat,
                point.lng,
                if point.is_visible { "" } else { " [hidden]" }
            );
        }
    }

    let orphans: Vec<&Point> = points
        .iter()
        .filter(|p| !categories.iter().any(|c| c.id == p.category_id))
        .collect();
    if !orphans.is_empty() {
        // Should not happen: category deletion cascades. Surface it anyway.
        warn!("{} point(s) reference a missing category", orphans.len());
    }
}
