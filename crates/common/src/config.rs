//! App configuration types.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Openrouteservice API settings and local quota limits.
    #[serde(default)]
    pub api: ApiConfig,

    /// Travel-time bounds for isochrone requests.
    #[serde(default)]
    pub travel: TravelConfig,
}

/// Openrouteservice settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the routing API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Routing profile used for isochrones.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Locally tracked requests-per-minute limit.
    #[serde(default = "default_minute_limit")]
    pub minute_limit: u32,

    /// Locally tracked requests-per-day limit.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

/// Travel-time slider bounds (minutes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelConfig {
    #[serde(default = "default_travel_minutes")]
    pub default_minutes: u32,

    #[serde(default = "default_min_minutes")]
    pub min_minutes: u32,

    #[serde(default = "default_max_minutes")]
    pub max_minutes: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://api.openrouteservice.org".into()
}

fn default_profile() -> String {
    "foot-walking".into()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_minute_limit() -> u32 {
    20
}

fn default_daily_limit() -> u32 {
    500
}

fn default_travel_minutes() -> u32 {
    5
}

fn default_min_minutes() -> u32 {
    1
}

fn default_max_minutes() -> u32 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            profile: default_profile(),
            request_timeout_secs: default_request_timeout(),
            minute_limit: default_minute_limit(),
            daily_limit: default_daily_limit(),
        }
    }
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_travel_minutes(),
            min_minutes: default_min_minutes(),
            max_minutes: default_max_minutes(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            travel: TravelConfig::default(),
        }
    }
}

impl TravelConfig {
    /// Clamp a requested travel time into the configured bounds.
    pub fn clamp_minutes(&self, minutes: u32) -> u32 {
        minutes.clamp(self.min_minutes, self.max_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ors_free_tier() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.minute_limit, 20);
        assert_eq!(cfg.api.daily_limit, 500);
        assert_eq!(cfg.api.profile, "foot-walking");
    }

    #[test]
    fn test_clamp_minutes() {
        let travel = TravelConfig::default();
        assert_eq!(travel.clamp_minutes(0), 1);
        assert_eq!(travel.clamp_minutes(5), 5);
        assert_eq!(travel.clamp_minutes(600), 60);
    }
}
