//! Configuration loader — merges env vars, .env file, and reachmap.toml.

use std::path::{Path, PathBuf};

use common::{AppConfig, Error};

fn parse_positive_u32(raw: &str, env_name: &str) -> Result<u32, Error> {
    let parsed = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.api.base_url.trim().is_empty() {
        issues.push("api.base_url must not be empty".into());
    }
    if config.api.profile.trim().is_empty() {
        issues.push("api.profile must not be empty".into());
    }
    if config.api.request_timeout_secs == 0 {
        issues.push("api.request_timeout_secs must be > 0".into());
    }
    if config.api.minute_limit == 0 {
        issues.push("api.minute_limit must be > 0".into());
    }
    if config.api.daily_limit == 0 {
        issues.push("api.daily_limit must be > 0".into());
    }

    if config.travel.min_minutes == 0 {
        issues.push("travel.min_minutes must be > 0".into());
    }
    if config.travel.max_minutes < config.travel.min_minutes {
        issues.push("travel.max_minutes must be >= travel.min_minutes".into());
    }
    if config.travel.default_minutes < config.travel.min_minutes
        || config.travel.default_minutes > config.travel.max_minutes
    {
        issues.push("travel.default_minutes must be within [min_minutes, max_minutes]".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load configuration from defaults, optional `reachmap.toml`, and env vars.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env from the working directory or a parent.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading reachmap.toml if it exists.
    let config_path = Path::new("reachmap.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read reachmap.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse reachmap.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(url) = std::env::var("ORS_BASE_URL") {
        if !url.trim().is_empty() {
            config.api.base_url = url;
        }
    }
    if let Ok(raw) = std::env::var("ORS_MINUTE_LIMIT") {
        config.api.minute_limit = parse_positive_u32(&raw, "ORS_MINUTE_LIMIT")?;
    }
    if let Ok(raw) = std::env::var("ORS_DAILY_LIMIT") {
        config.api.daily_limit = parse_positive_u32(&raw, "ORS_DAILY_LIMIT")?;
    }

    validate_config(&config)?;

    Ok(config)
}

/// Data directory for the key-value store; `REACHMAP_DATA_DIR` overrides.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("REACHMAP_DATA_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from("reachmap-data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_inverted_travel_bounds_rejected() {
        let mut config = AppConfig::default();
        config.travel.min_minutes = 30;
        config.travel.max_minutes = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [api]
            minute_limit = 5
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.api.minute_limit, 5);
        assert_eq!(config.api.daily_limit, 500);
        assert_eq!(config.travel.default_minutes, 5);
    }

    #[test]
    fn test_parse_positive_u32_rejects_zero_and_junk() {
        assert!(parse_positive_u32("0", "X").is_err());
        assert!(parse_positive_u32("abc", "X").is_err());
        assert_eq!(parse_positive_u32(" 42 ", "X").unwrap(), 42);
    }
}
