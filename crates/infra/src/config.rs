//! Runtime configuration from environment variables.
//!
//! Every value has a default; an unparsable value is logged and replaced by
//! its default. Reads go through a lookup function so tests never touch the
//! process environment.

use std::time::Duration;

use tracing::warn;

use crate::projections::LookupFallback;
use crate::retry::RetryPolicy;

pub const COMMAND_MAX_RETRIES: &str = "TAGSTREAM_COMMAND_MAX_RETRIES";
pub const COMMAND_BACKOFF_MS: &str = "TAGSTREAM_COMMAND_BACKOFF_MS";
pub const PROJECTION_MAX_RETRIES: &str = "TAGSTREAM_PROJECTION_MAX_RETRIES";
pub const PROJECTION_BACKOFF_MS: &str = "TAGSTREAM_PROJECTION_BACKOFF_MS";
pub const BACKOFF_CAP_MS: &str = "TAGSTREAM_BACKOFF_CAP_MS";
pub const WORKER_TICK_MS: &str = "TAGSTREAM_WORKER_TICK_MS";
pub const WORKER_BATCH: &str = "TAGSTREAM_WORKER_BATCH";
pub const LOOKUP_PLACEHOLDER: &str = "TAGSTREAM_LOOKUP_PLACEHOLDER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Re-read/re-decide schedule after an append conflict.
    pub command_retry: RetryPolicy,
    /// Schedule for re-applying a failing event to a projection.
    pub projection_retry: RetryPolicy,
    pub worker_tick: Duration,
    pub worker_batch: usize,
    pub lookup_placeholder: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cap = Duration::from_millis(parse_or(&lookup, BACKOFF_CAP_MS, 2000u64));

        Self {
            command_retry: RetryPolicy::new(
                parse_or(&lookup, COMMAND_MAX_RETRIES, 3u32),
                Duration::from_millis(parse_or(&lookup, COMMAND_BACKOFF_MS, 10u64)),
                cap,
            ),
            projection_retry: RetryPolicy::new(
                parse_or(&lookup, PROJECTION_MAX_RETRIES, 5u32),
                Duration::from_millis(parse_or(&lookup, PROJECTION_BACKOFF_MS, 50u64)),
                cap,
            ),
            worker_tick: Duration::from_millis(parse_or(&lookup, WORKER_TICK_MS, 250u64).max(1)),
            worker_batch: parse_or(&lookup, WORKER_BATCH, 500usize).max(1),
            lookup_placeholder: lookup(LOOKUP_PLACEHOLDER)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// The placeholder policy projections use for unresolved lookups.
    pub fn lookup_fallback(&self) -> LookupFallback {
        LookupFallback::Placeholder(self.lookup_placeholder.clone())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "invalid configuration value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.command_retry.max_retries, 3);
        assert_eq!(cfg.command_retry.initial, Duration::from_millis(10));
        assert_eq!(cfg.projection_retry.max_retries, 5);
        assert_eq!(cfg.projection_retry.cap, Duration::from_secs(2));
        assert_eq!(cfg.worker_tick, Duration::from_millis(250));
        assert_eq!(cfg.worker_batch, 500);
        assert_eq!(cfg.lookup_fallback(), LookupFallback::Placeholder("unknown".to_string()));
    }

    #[test]
    fn values_are_read_through_the_lookup() {
        let cfg = RuntimeConfig::from_lookup(lookup(&[
            (COMMAND_MAX_RETRIES, "7"),
            (WORKER_BATCH, " 20 "),
            (LOOKUP_PLACEHOLDER, "n/a"),
        ]));
        assert_eq!(cfg.command_retry.max_retries, 7);
        assert_eq!(cfg.worker_batch, 20);
        assert_eq!(cfg.lookup_placeholder, "n/a");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = RuntimeConfig::from_lookup(lookup(&[
            (PROJECTION_BACKOFF_MS, "soon"),
            (WORKER_BATCH, "0"),
            (LOOKUP_PLACEHOLDER, "  "),
        ]));
        assert_eq!(cfg.projection_retry.initial, Duration::from_millis(50));
        assert_eq!(cfg.worker_batch, 1);
        assert_eq!(cfg.lookup_placeholder, "unknown");
    }
}
