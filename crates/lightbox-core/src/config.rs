use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::AppError;

/// Success-cache settings for an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub cache_ttl: Duration,
    /// `None` disables the background purge.
    pub purge_interval: Option<Duration>,
    pub max_entries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(300_000),
            purge_interval: Some(Duration::from_millis(60_000)),
            max_entries: 200,
        }
    }
}

impl OrchestratorConfig {
    /// Reads `LIGHTBOX_CACHE_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let cache_ttl = match parse_u64(&lookup, "LIGHTBOX_CACHE_TTL_MS")? {
            None => defaults.cache_ttl,
            Some(0) => {
                return Err(AppError::ConfigError(
                    "LIGHTBOX_CACHE_TTL_MS must be at least 1".into(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
        };

        let purge_interval = match parse_u64(&lookup, "LIGHTBOX_CACHE_PURGE_INTERVAL_MS")? {
            None => defaults.purge_interval,
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        };

        let max_entries = match parse_u64(&lookup, "LIGHTBOX_CACHE_MAX_ENTRIES")? {
            None => defaults.max_entries,
            Some(0) => {
                return Err(AppError::ConfigError(
                    "LIGHTBOX_CACHE_MAX_ENTRIES must be at least 1".into(),
                ));
            }
            Some(n) => n as usize,
        };

        Ok(Self {
            cache_ttl,
            purge_interval,
            max_entries,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
            purge_interval: self.purge_interval,
            max_entries: self.max_entries,
        }
    }
}

/// Defaults applied at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub default_timeout: Duration,
    pub default_max_retries: u32,
    /// Whether the GraphQL strategy is part of the primary chain.
    pub api_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(10_000),
            default_max_retries: 3,
            api_enabled: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let default_timeout = match parse_u64(&lookup, "LIGHTBOX_TIMEOUT_MS")? {
            None => defaults.default_timeout,
            Some(0) => {
                return Err(AppError::ConfigError(
                    "LIGHTBOX_TIMEOUT_MS must be at least 1".into(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
        };

        let default_max_retries = match parse_u64(&lookup, "LIGHTBOX_MAX_RETRIES")? {
            None => defaults.default_max_retries,
            Some(n) => u32::try_from(n).map_err(|_| {
                AppError::ConfigError(format!("LIGHTBOX_MAX_RETRIES '{n}' is too large"))
            })?,
        };

        let api_enabled = match lookup("LIGHTBOX_API_ENABLED") {
            None => defaults.api_enabled,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Invalid LIGHTBOX_API_ENABLED '{raw}': expected true/false"
                ))
            })?,
        };

        Ok(Self {
            default_timeout,
            default_max_retries,
            api_enabled,
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, AppError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
