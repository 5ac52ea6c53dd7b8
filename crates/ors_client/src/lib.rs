//! Openrouteservice isochrone client.
//!
//! One network call per uncached location, gated by the locally tracked
//! quota windows. Quota and cache are only updated after a confirmed,
//! fully parsed 2xx response — failed attempts never consume quota.

pub mod cache;
pub mod quota;

pub use cache::{fingerprint, IsochroneCache};
pub use quota::QuotaTracker;

use common::config::ApiConfig;
use common::Error;
use geojson::FeatureCollection;
use serde::Serialize;
use tracing::{debug, info};

/// The seam the overlay engine fetches isochrones through.
#[allow(async_fn_in_trait)]
pub trait IsochroneSource {
    async fn fetch_isochrone(
        &mut self,
        lat: f64,
        lng: f64,
        minutes: u32,
        force_refetch: bool,
    ) -> Result<FeatureCollection, Error>;
}

/// POST body for `/v2/isochrones/{profile}`.
#[derive(Debug, Serialize)]
struct IsochroneRequest {
    /// `[lng, lat]` pairs — GeoJSON axis order.
    locations: Vec<[f64; 2]>,
    /// Travel budget in seconds.
    range: Vec<u32>,
    range_type: &'static str,
}

/// Async client for the Openrouteservice isochrone API.
pub struct OrsClient {
    http: reqwest::Client,
    base_url: String,
    profile: String,
    api_key: Option<String>,
    quota: QuotaTracker,
    cache: IsochroneCache,
}

impl OrsClient {
    pub fn new(
        cfg: &ApiConfig,
        api_key: Option<String>,
        quota: QuotaTracker,
        cache: IsochroneCache,
    ) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            profile: cfg.profile.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            quota,
            cache,
        }
    }

    /// `(used, limit)` for the trailing minute.
    pub fn minute_usage(&self) -> (usize, u32) {
        (self.quota.minute_count(), self.quota.minute_limit())
    }

    /// `(used, limit)` for the current UTC day.
    pub fn daily_usage(&self) -> (u32, u32) {
        (self.quota.daily_count(), self.quota.daily_limit())
    }

    fn url(&self) -> String {
        format!("{}/v2/isochrones/{}", self.base_url, self.profile)
    }

    /// Fetch the walking isochrone for one location.
    ///
    /// Order of checks: credential, cache (unless `force_refetch`), daily
    /// quota, minute quota, network. A cache hit costs nothing.
    pub async fn fetch(
        &mut self,
        lat: f64,
        lng: f64,
        minutes: u32,
        force_refetch: bool,
    ) -> Result<FeatureCollection, Error> {
        let Some(api_key) = self.api_key.clone() else {
            return Err(Error::MissingApiKey);
        };

        let key = fingerprint(lat, lng, minutes);
        if !force_refetch {
            if let Some(hit) = self.cache.lookup(&key) {
                debug!("Cache hit for {}", key);
                return Ok(hit.clone());
            }
        }

        if !self.quota.can_issue_daily_request() {
            return Err(Error::DailyQuotaExceeded {
                limit: self.quota.daily_limit(),
                last_reset: self.quota.last_reset().to_string(),
            });
        }
        if !self.quota.can_issue_minute_request() {
            return Err(Error::MinuteQuotaExceeded {
                limit: self.quota.minute_limit(),
            });
        }

        info!(
            "Attempting ORS query for {}. Local minute count: {}/{}, local daily count: {}/{}",
            key,
            self.quota.minute_count(),
            self.quota.minute_limit(),
            self.quota.daily_count(),
            self.quota.daily_limit(),
        );

        let body = IsochroneRequest {
            locations: vec![[lng, lat]],
            range: vec![minutes * 60],
            range_type: "time",
        };

        let resp = self
            .http
            .post(self.url())
            .header("Authorization", &api_key)
            .header("Accept", "application/json, application/geo+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown error");
            let raw = resp.text().await.unwrap_or_default();
            let mut message = extract_server_message(&raw)
                .unwrap_or_else(|| reason.to_string());

            match status.as_u16() {
                401 | 403 => message.push_str(
                    " This might be due to an invalid or unauthorized API key. Please check it in your settings.",
                ),
                429 => message.push_str(" Rate limit exceeded on the Openrouteservice server."),
                _ => {}
            }

            return Err(Error::OrsApi {
                status: status.as_u16(),
                message,
            });
        }

        // Quota and cache are only touched once the body has fully parsed.
        let collection: FeatureCollection = resp
            .json()
            .await
            .map_err(|e| Error::Network(format!("failed to parse isochrone response: {e}")))?;

        self.quota.record_request();
        self.cache.store(key, collection.clone());
        Ok(collection)
    }
}

/// Pull `error.message` (or a top-level `error` string) out of an ORS error
/// body, if there is one.
fn extract_server_message(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    match value.get("error")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}

impl IsochroneSource for OrsClient {
    async fn fetch_isochrone(
        &mut self,
        lat: f64,
        lng: f64,
        minutes: u32,
        force_refetch: bool,
    ) -> Result<FeatureCollection, Error> {
        self.fetch(lat, lng, minutes, force_refetch).await
    }
}
