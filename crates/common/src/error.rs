//! Unified error type for reachmap.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Openrouteservice API key is not set. Please configure it with `reachmap set-key`.")]
    MissingApiKey,

    #[error("Daily API request limit ({limit}) locally tracked has been met. Please try again tomorrow. Last reset: {last_reset}")]
    DailyQuotaExceeded { limit: u32, last_reset: String },

    #[error("Minute API request limit ({limit}) locally tracked has been met. Please try again in a minute.")]
    MinuteQuotaExceeded { limit: u32 },

    #[error("API Error: {status} - {message}")]
    OrsApi { status: u16, message: String },

    #[error("Network error or failed to fetch isochrone: {0}")]
    Network(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors only fixable by (re)configuring the API key.
    pub fn is_credential(&self) -> bool {
        match self {
            Error::MissingApiKey => true,
            Error::OrsApi { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    /// True for errors caused by a quota window, local or upstream.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Error::DailyQuotaExceeded { .. } | Error::MinuteQuotaExceeded { .. } => true,
            Error::OrsApi { status, .. } => *status == 429,
            _ => false,
        }
    }

    /// Whether this error should stop the remaining points of a batch.
    /// Transport blips do not poison a batch the way credential or quota
    /// errors do.
    pub fn halts_batch(&self) -> bool {
        self.is_credential() || self.is_rate_limit()
    }
}
