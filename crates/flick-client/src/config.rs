//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero
//! configuration. Invalid values are logged and ignored.

use std::path::PathBuf;
use std::time::Duration;

use flick_core::EngineConfig;
use flick_shared::constants::{
    CHUNK_SIZE, MAX_FILE_SIZE, NOTIFICATION_CAPACITY, PRESENCE_INTERVAL_MS, TRANSFER_IDLE_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Period of the presence broadcast.
    /// Env: `FLICK_PRESENCE_INTERVAL_MS`
    /// Default: 8 s
    pub presence_interval: Duration,

    /// Outbound file chunk size in bytes.
    /// Env: `FLICK_CHUNK_SIZE`
    /// Default: 64 KiB
    pub chunk_size: usize,

    /// Inbound transfers idle for longer than this are abandoned.
    /// Env: `FLICK_TRANSFER_IDLE_SECS`
    /// Default: 120 s
    pub transfer_idle_timeout: Duration,

    /// Directory holding `settings.json`.
    /// Env: `FLICK_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    pub notification_capacity: usize,

    pub max_file_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_millis(PRESENCE_INTERVAL_MS),
            chunk_size: CHUNK_SIZE,
            transfer_idle_timeout: Duration::from_secs(TRANSFER_IDLE_SECS),
            data_dir: None,
            notification_capacity: NOTIFICATION_CAPACITY,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_positive(&lookup, "FLICK_PRESENCE_INTERVAL_MS") {
            config.presence_interval = Duration::from_millis(ms);
        }

        if let Some(size) = parse_positive(&lookup, "FLICK_CHUNK_SIZE") {
            config.chunk_size = size as usize;
        }

        if let Some(secs) = parse_positive(&lookup, "FLICK_TRANSFER_IDLE_SECS") {
            config.transfer_idle_timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = lookup("FLICK_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// Presence period for the client loop. A zero interval falls back
    /// to the default.
    pub fn presence_period(&self) -> Duration {
        if self.presence_interval.is_zero() {
            tracing::warn!("Zero presence interval, using the default");
            return Duration::from_millis(PRESENCE_INTERVAL_MS);
        }
        self.presence_interval
    }

    /// The engine-facing subset of the configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_size: self.chunk_size,
            notification_capacity: self.notification_capacity,
            max_file_size: self.max_file_size,
        }
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.presence_interval, Duration::from_secs(8));
        assert_eq!(config.chunk_size, 64 * 1024);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("FLICK_PRESENCE_INTERVAL_MS", "250"),
            ("FLICK_CHUNK_SIZE", "1024"),
            ("FLICK_TRANSFER_IDLE_SECS", "5"),
            ("FLICK_DATA_DIR", "/tmp/flick"),
        ]);
        assert_eq!(config.presence_interval, Duration::from_millis(250));
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.transfer_idle_timeout, Duration::from_secs(5));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/flick")));
        assert_eq!(config.engine_config().chunk_size, 1024);
    }

    #[test]
    fn test_zero_presence_period_uses_default() {
        let config = ClientConfig {
            presence_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert_eq!(config.presence_period(), Duration::from_millis(PRESENCE_INTERVAL_MS));

        let config = from_pairs(&[("FLICK_PRESENCE_INTERVAL_MS", "250")]);
        assert_eq!(config.presence_period(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[("FLICK_CHUNK_SIZE", "0"), ("FLICK_PRESENCE_INTERVAL_MS", "soon")]);
        assert_eq!(config.chunk_size, CHUNK_SIZE);
        assert_eq!(config.presence_interval, Duration::from_millis(PRESENCE_INTERVAL_MS));
    }
}
