//! Configuration management for the request manager.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Manager and transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Interval between ticks when a `Ticker` drives the manager
    pub tick_interval_ms: u64,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// `User-Agent` sent with every request
    pub user_agent: String,
    /// Events buffered per sub-operation before the transfer is throttled
    pub event_buffer: usize,
    /// Prometheus exporter address, disabled when unset
    pub metrics_addr: Option<String>,
    /// Log filter (trace, debug, info, warn, error or an `EnvFilter` directive)
    pub log_level: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            request_timeout_secs: 60,
            connect_timeout_secs: 30,
            user_agent: format!("tickwire/{}", env!("CARGO_PKG_VERSION")),
            event_buffer: 32,
            metrics_addr: None,
            log_level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            tick_interval_ms: number("TICKWIRE_TICK_INTERVAL_MS", defaults.tick_interval_ms),
            request_timeout_secs: number(
                "TICKWIRE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            connect_timeout_secs: number(
                "TICKWIRE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            user_agent: lookup("TICKWIRE_USER_AGENT").unwrap_or(defaults.user_agent),
            event_buffer: lookup("TICKWIRE_EVENT_BUFFER")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.event_buffer),
            metrics_addr: lookup("TICKWIRE_METRICS_ADDR").filter(|s| !s.trim().is_empty()),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Tick interval as a duration.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parsed metrics address, if one is configured and valid.
    #[must_use]
    pub fn metrics_socket_addr(&self) -> Option<SocketAddr> {
        let addr = self.metrics_addr.as_deref()?;
        match addr.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(addr, error = %e, "Ignoring invalid metrics address");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ManagerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert!(config.user_agent.starts_with("tickwire/"));
    }

    #[test]
    fn test_values_are_read() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("TICKWIRE_TICK_INTERVAL_MS", "50"),
            ("TICKWIRE_REQUEST_TIMEOUT_SECS", "5"),
            ("TICKWIRE_USER_AGENT", "demo/1.0"),
            ("TICKWIRE_EVENT_BUFFER", "8"),
            ("TICKWIRE_METRICS_ADDR", "127.0.0.1:9100"),
            ("RUST_LOG", "debug"),
        ]));

        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.user_agent, "demo/1.0");
        assert_eq!(config.event_buffer, 8);
        assert_eq!(
            config.metrics_socket_addr(),
            Some("127.0.0.1:9100".parse().unwrap())
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = ManagerConfig::from_lookup(lookup(&[
            ("TICKWIRE_TICK_INTERVAL_MS", "soon"),
            ("TICKWIRE_EVENT_BUFFER", "0"),
            ("TICKWIRE_METRICS_ADDR", "not an address"),
        ]));

        assert_eq!(config.tick_interval_ms, 16);
        assert_eq!(config.event_buffer, 32);
        assert_eq!(config.metrics_socket_addr(), None);
    }
}
