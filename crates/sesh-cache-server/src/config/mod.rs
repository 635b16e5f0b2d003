//! Configuration loading and resolution.
//!
//! Each setting resolves as: explicit CLI value, then environment variable,
//! then default.

use std::time::Duration;

use crate::types::{ServerError, ServerResult};

pub const ENV_ADDR: &str = "SESH_ADDR";
pub const ENV_REVALIDATE_SECS: &str = "SESH_REVALIDATE_SECS";
pub const ENV_LOOKUP_DELAY_MS: &str = "SESH_LOOKUP_DELAY_MS";
pub const ENV_LOG: &str = "SESH_LOG";

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_REVALIDATE_SECS: u64 = 60;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub addr: Option<String>,
    pub revalidate_secs: Option<u64>,
    pub lookup_delay_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Effective server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    /// Revalidation window of host cache entries.
    pub revalidate: Duration,
    /// Simulated latency of each user directory lookup.
    pub lookup_delay: Duration,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            revalidate: Duration::from_secs(DEFAULT_REVALIDATE_SECS),
            lookup_delay: Duration::ZERO,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: &ConfigOverrides) -> ServerResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable source.
    pub fn resolve_with<F>(overrides: &ConfigOverrides, env: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let addr = overrides
            .addr
            .clone()
            .or_else(|| env(ENV_ADDR))
            .unwrap_or(defaults.addr);

        let revalidate = match overrides.revalidate_secs {
            Some(secs) => Duration::from_secs(secs),
            None => parse_env(&env, ENV_REVALIDATE_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.revalidate),
        };

        let lookup_delay = match overrides.lookup_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_env(&env, ENV_LOOKUP_DELAY_MS)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lookup_delay),
        };

        let log_level = overrides
            .log_level
            .clone()
            .or_else(|| env(ENV_LOG))
            .unwrap_or(defaults.log_level);

        Ok(Self {
            addr,
            revalidate,
            lookup_delay,
            log_level,
        })
    }
}

fn parse_env<F>(env: &F, key: &str) -> ServerResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ServerError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::resolve_with(&ConfigOverrides::default(), env_from(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.revalidate, Duration::from_secs(60));
    }

    #[test]
    fn test_env_beats_default() {
        let env = env_from(&[
            (ENV_ADDR, "0.0.0.0:8080"),
            (ENV_REVALIDATE_SECS, "5"),
            (ENV_LOOKUP_DELAY_MS, "250"),
            (ENV_LOG, "debug"),
        ]);
        let config = ServerConfig::resolve_with(&ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.revalidate, Duration::from_secs(5));
        assert_eq!(config.lookup_delay, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_beats_env() {
        let env = env_from(&[(ENV_ADDR, "0.0.0.0:8080"), (ENV_REVALIDATE_SECS, "5")]);
        let overrides = ConfigOverrides {
            addr: Some("127.0.0.1:9999".into()),
            revalidate_secs: Some(1),
            ..Default::default()
        };
        let config = ServerConfig::resolve_with(&overrides, env).unwrap();
        assert_eq!(config.addr, "127.0.0.1:9999");
        assert_eq!(config.revalidate, Duration::from_secs(1));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let env = env_from(&[(ENV_REVALIDATE_SECS, "soon")]);
        let err = ServerConfig::resolve_with(&ConfigOverrides::default(), env).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
