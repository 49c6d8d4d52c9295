//! Runtime settings read from the environment (and `.env`, loaded in `main`).
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::editor::autosave::AutosaveSettings;

#[derive(Clone, Debug)]
pub struct Config {
    /// JSON file the server keeps its routes in
    pub routes_file: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub autosave: AutosaveSettings,
    pub http_timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            routes_file: PathBuf::from("routes.json"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_dir: PathBuf::from("./logs"),
            autosave: AutosaveSettings::default(),
            http_timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Builds the config from any key lookup, unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            routes_file: lookup("ROUTES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.routes_file),
            bind_addr: parse_var(&lookup, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            log_dir: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            autosave: AutosaveSettings {
                quiet_period: parse_var(&lookup, "SAVE_QUIET_PERIOD_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.autosave.quiet_period),
                max_retries: parse_var(&lookup, "SAVE_MAX_RETRIES")?
                    .unwrap_or(defaults.autosave.max_retries),
                retry_backoff: parse_var(&lookup, "SAVE_RETRY_BACKOFF_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.autosave.retry_backoff),
            },
            http_timeout: parse_var(&lookup, "HTTP_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn unset_keys_use_defaults() -> Result<(), anyhow::Error> {
        let config = Config::from_lookup(lookup(&[]))?;

        assert_eq!(config.routes_file, PathBuf::from("routes.json"));
        assert_eq!(config.autosave.quiet_period, Duration::from_millis(600));
        assert_eq!(config.bind_addr.port(), 3000);

        Ok(())
    }

    #[test]
    fn set_keys_override_defaults() -> Result<(), anyhow::Error> {
        let config = Config::from_lookup(lookup(&[
            ("SAVE_QUIET_PERIOD_MS", "250"),
            ("SAVE_MAX_RETRIES", "0"),
            ("BIND_ADDR", "0.0.0.0:8080"),
        ]))?;

        assert_eq!(config.autosave.quiet_period, Duration::from_millis(250));
        assert_eq!(config.autosave.max_retries, 0);
        assert_eq!(config.bind_addr.port(), 8080);

        Ok(())
    }

    #[test]
    fn bad_numbers_are_reported_with_their_key() {
        let err = Config::from_lookup(lookup(&[("SAVE_MAX_RETRIES", "lots")])).unwrap_err();

        assert!(err.to_string().contains("SAVE_MAX_RETRIES"));
    }
}
