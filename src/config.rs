//! Environment-driven configuration
//!
//! Every value falls back to its default when unset or unparsable, so a
//! bare environment runs the service against `data/`.

use crate::availability::ProbePolicy;
use crate::gateway::GatewayConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PRIMARY_DB_PATH: &str = "data/primary.db";
pub const DEFAULT_LEGACY_DSN: &str = "DSN=legacy;DATABASE=data/legacy.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub primary_db_path: PathBuf,
    pub legacy_dsn: String,
    pub rules_path: Option<PathBuf>,
    pub bind_addr: String,
    pub probe: ProbePolicy,
    pub gateway: GatewayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary_db_path: PathBuf::from(DEFAULT_PRIMARY_DB_PATH),
            legacy_dsn: DEFAULT_LEGACY_DSN.to_string(),
            rules_path: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            probe: ProbePolicy::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "on" | "ON")
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |name: &str| parse(name).and_then(|v| v.parse::<u64>().ok());
        let millis = |name: &str, default: Duration| {
            number(name)
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let probe = ProbePolicy {
            allow_degraded: parse("ALLOW_DEGRADED_MODE").map(|v| parse_flag(&v)).unwrap_or(false),
            attempts: number("STORE_PROBE_RETRIES")
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.probe.attempts),
            retry_delay: number("STORE_PROBE_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe.retry_delay),
            probe_timeout: millis("BACKEND_TIMEOUT_MS", defaults.probe.probe_timeout),
        };

        let gateway = GatewayConfig {
            cache_ttl: number("CACHE_TTL_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway.cache_ttl),
            cache_capacity: number("CACHE_MAX_ENTRIES")
                .map(|n| n as usize)
                .unwrap_or(defaults.gateway.cache_capacity),
            sweep_interval: number("CACHE_SWEEP_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway.sweep_interval),
            interactive_timeout: millis("REQUEST_TIMEOUT_MS", defaults.gateway.interactive_timeout),
            prefetch_timeout: millis("PREFETCH_TIMEOUT_MS", defaults.gateway.prefetch_timeout),
            export_timeout: millis("EXPORT_TIMEOUT_MS", defaults.gateway.export_timeout),
            backend_timeout: millis("BACKEND_TIMEOUT_MS", defaults.gateway.backend_timeout),
        };

        Self {
            primary_db_path: parse("PRIMARY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.primary_db_path),
            legacy_dsn: parse("LEGACY_DSN").unwrap_or(defaults.legacy_dsn),
            rules_path: parse("RULES_PATH").map(PathBuf::from),
            bind_addr: parse("BIND_ADDR").unwrap_or(defaults.bind_addr),
            probe,
            gateway,
        }
    }
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
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config.primary_db_path, PathBuf::from("data/primary.db"));
        assert_eq!(config.legacy_dsn, DEFAULT_LEGACY_DSN);
        assert!(!config.probe.allow_degraded);
        assert_eq!(config.probe.attempts, 3);
        assert_eq!(config.gateway.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.gateway.cache_capacity, 100);
        assert_eq!(config.gateway.prefetch_timeout, Duration::from_millis(5000));
        assert!(config.gateway.prefetch_timeout < config.gateway.interactive_timeout);
        assert_eq!(config.rules_path, None);
    }

    #[test]
    fn overrides_and_garbage() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ALLOW_DEGRADED_MODE", "on"),
            ("STORE_PROBE_RETRIES", "0"),
            ("CACHE_TTL_SECS", "30"),
            ("REQUEST_TIMEOUT_MS", "not-a-number"),
            ("EXPORT_TIMEOUT_MS", "0"),
            ("RULES_PATH", "rules.json"),
            ("LEGACY_DSN", "  "),
        ]));
        assert!(config.probe.allow_degraded);
        assert_eq!(config.probe.attempts, 1);
        assert_eq!(config.gateway.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.gateway.interactive_timeout, Duration::from_millis(8000));
        assert_eq!(config.gateway.export_timeout, Duration::from_millis(15000));
        assert_eq!(config.rules_path, Some(PathBuf::from("rules.json")));
        assert_eq!(config.legacy_dsn, DEFAULT_LEGACY_DSN);
    }

    #[test]
    fn flags() {
        for on in ["1", "true", "TRUE", "on", "ON"] {
            assert!(parse_flag(on));
        }
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("0"));
    }
}
