//! Batch orchestration over the live point set.
//!
//! One run: select eligible points, dispatch fetches strictly one at a time,
//! then reconcile outcomes against entities that may have changed mid-batch.
//! Sequential dispatch keeps the minute-quota accounting exact — there is
//! never a second in-flight request racing the check-then-record sequence.

use std::collections::{HashMap, HashSet};

use common::{Category, IsochroneResult, Point};
use ors_client::IsochroneSource;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Per-point result recorded for points behind an earlier halting error.
pub const SKIPPED_MESSAGE: &str = "Fetching skipped due to an earlier error in this batch.";

/// `(current, total)` attempts for the run in flight; `(0, 0)` when idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
}

/// Summary of one batch run. Errors are folded into the per-point result map;
/// `alert` carries the first error message in dispatch order, surfaced once.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub alert: Option<String>,
    /// Set when a credential-class error occurred: waiting will not fix it,
    /// the user has to (re)configure the API key.
    pub needs_api_key: bool,
}

/// Orchestrates isochrone batches through an [`IsochroneSource`] and owns the
/// running per-point result map.
pub struct OverlayEngine<S> {
    source: S,
    results: HashMap<String, IsochroneResult>,
    state: BatchState,
    progress_tx: watch::Sender<Progress>,
}

impl<S: IsochroneSource> OverlayEngine<S> {
    pub fn new(source: S) -> Self {
        Self::with_results(source, HashMap::new())
    }

    /// Seed the running result map, e.g. with overlays reloaded from storage.
    pub fn with_results(source: S, results: HashMap<String, IsochroneResult>) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            source,
            results,
            state: BatchState::Idle,
            progress_tx,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == BatchState::Running
    }

    /// Subscribe to progress updates; one update lands after every attempt.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    pub fn results(&self) -> &HashMap<String, IsochroneResult> {
        &self.results
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// A point is eligible when it is visible itself, its category is
    /// visible, and the category has isochrone generation enabled.
    fn eligible<'a>(points: &'a [Point], categories: &[Category]) -> Vec<&'a Point> {
        points
            .iter()
            .filter(|p| {
                p.is_visible
                    && categories
                        .iter()
                        .find(|c| c.id == p.category_id)
                        .is_some_and(|c| c.is_visible && c.generate_isochrones)
            })
            .collect()
    }

    /// Run one batch for the committed travel time.
    ///
    /// Concurrent runs are not supported; the `&mut self` receiver makes a
    /// second call while one is in flight unrepresentable.
    pub async fn run(
        &mut self,
        points: &[Point],
        categories: &[Category],
        minutes: u32,
        force_refetch: bool,
    ) -> BatchReport {
        let eligible = Self::eligible(points, categories);

        // Purge entries for points that are no longer eligible so stale
        // overlays disappear even when nothing gets fetched.
        let eligible_ids: HashSet<&str> = eligible.iter().map(|p| p.id.as_str()).collect();
        self.results.retain(|id, _| eligible_ids.contains(id.as_str()));

        if eligible.is_empty() {
            debug!("No points eligible for isochrone generation");
            self.state = BatchState::Idle;
            self.progress_tx.send_replace(Progress::default());
            return BatchReport::default();
        }

        self.state = BatchState::Running;
        let total = eligible.len();
        self.progress_tx.send_replace(Progress { current: 0, total });
        info!("Fetching isochrones for {} points ({} min)", total, minutes);

        let mut batch: HashMap<String, IsochroneResult> = HashMap::new();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        let mut halted = false;

        for (idx, point) in eligible.iter().enumerate() {
            if halted && !force_refetch {
                batch.insert(
                    point.id.clone(),
                    IsochroneResult::Error(SKIPPED_MESSAGE.to_string()),
                );
                report.skipped += 1;
                self.progress_tx.send_replace(Progress {
                    current: idx + 1,
                    total,
                });
                continue;
            }

            match self
                .source
                .fetch_isochrone(point.lat, point.lng, minutes, force_refetch)
                .await
            {
                Ok(collection) => {
                    batch.insert(point.id.clone(), IsochroneResult::Geojson(collection));
                    report.fetched += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    if report.alert.is_none() {
                        report.alert = Some(e.to_string());
                    }
                    if e.is_credential() {
                        report.needs_api_key = true;
                    }
                    if e.halts_batch() {
                        warn!(
                            "Halting remaining fetches after error on {}: {}",
                            point.label(),
                            e
                        );
                        halted = true;
                    } else {
                        warn!("Isochrone fetch failed for {}: {}", point.label(), e);
                    }
                    batch.insert(point.id.clone(), IsochroneResult::Error(e.to_string()));
                }
            }

            self.progress_tx.send_replace(Progress {
                current: idx + 1,
                total,
            });
        }

        // Reconcile: merge this batch, then drop entries whose point is gone
        // or whose category stopped generating isochrones mid-run.
        self.results.extend(batch);
        let generating: HashSet<&str> = points
            .iter()
            .filter(|p| {
                categories
                    .iter()
                    .find(|c| c.id == p.category_id)
                    .is_some_and(|c| c.generate_isochrones)
            })
            .map(|p| p.id.as_str())
            .collect();
        self.results.retain(|id, _| generating.contains(id.as_str()));

        self.state = BatchState::Completed;
        self.progress_tx.send_replace(Progress::default());
        report
    }
}
