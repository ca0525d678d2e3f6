//! Process settings read from the environment.
//!
//! Every variable has a default; a value that fails to parse is logged and
//! replaced by the default rather than aborting startup.

use std::str::FromStr;
use std::time::Duration;

use tracing::{Span, warn};

use medchain_events::RetryPolicy;
use medchain_purchasing::ReorderPolicy;

pub const PORT: &str = "PORT";
pub const REDIS_URL: &str = "REDIS_URL";
pub const BUS: &str = "MEDCHAIN_BUS";
pub const FORECAST_CONFIDENCE_THRESHOLD: &str = "MEDCHAIN_FORECAST_CONFIDENCE_THRESHOLD";
pub const MAX_DELIVERY_ATTEMPTS: &str = "MEDCHAIN_MAX_DELIVERY_ATTEMPTS";
pub const RETRY_BACKOFF_MS: &str = "MEDCHAIN_RETRY_BACKOFF_MS";
pub const SHUTDOWN_WINDOW_SECS: &str = "MEDCHAIN_SHUTDOWN_WINDOW_SECS";
pub const CERT_EXPIRY_WINDOW_DAYS: &str = "MEDCHAIN_CERT_EXPIRY_WINDOW_DAYS";

/// Which message-bus implementation the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Memory,
    Redis,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BusKind::Memory),
            "redis" => Ok(BusKind::Redis),
            other => Err(format!("unknown bus kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub redis_url: String,
    pub bus: BusKind,
    pub forecast_confidence_threshold: f64,
    pub max_delivery_attempts: u32,
    pub retry_backoff: Duration,
    pub shutdown_window: Duration,
    pub cert_expiry_window_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: "redis://127.0.0.1/".to_string(),
            bus: BusKind::Memory,
            forecast_confidence_threshold: medchain_purchasing::DEFAULT_CONFIDENCE_THRESHOLD,
            max_delivery_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            shutdown_window: Duration::from_secs(30),
            cert_expiry_window_days: medchain_suppliers::EXPIRY_WARNING_DAYS,
        }
    }
}

impl Settings {
    pub fn from_env(log: &Span) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), log)
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, log: &Span) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = Parser { lookup, log };

        let threshold = parse.or(FORECAST_CONFIDENCE_THRESHOLD, defaults.forecast_confidence_threshold);
        let forecast_confidence_threshold = if (0.0..=1.0).contains(&threshold) {
            threshold
        } else {
            warn!(
                parent: log,
                variable = FORECAST_CONFIDENCE_THRESHOLD,
                value = threshold,
                "confidence threshold must lie in [0, 1]; using default"
            );
            defaults.forecast_confidence_threshold
        };

        Self {
            port: parse.or(PORT, defaults.port),
            redis_url: (parse.lookup)(REDIS_URL).unwrap_or(defaults.redis_url),
            bus: parse.or(BUS, defaults.bus),
            forecast_confidence_threshold,
            max_delivery_attempts: parse.or(MAX_DELIVERY_ATTEMPTS, defaults.max_delivery_attempts).max(1),
            retry_backoff: Duration::from_millis(parse.or(RETRY_BACKOFF_MS, 200u64)),
            shutdown_window: Duration::from_secs(parse.or(SHUTDOWN_WINDOW_SECS, 30u64)),
            cert_expiry_window_days: parse.or(CERT_EXPIRY_WINDOW_DAYS, defaults.cert_expiry_window_days),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_delivery_attempts,
            initial_backoff: self.retry_backoff,
            ..RetryPolicy::default()
        }
    }

    pub fn reorder_policy(&self) -> ReorderPolicy {
        ReorderPolicy {
            confidence_threshold: self.forecast_confidence_threshold,
        }
    }

    pub fn cert_expiry_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.cert_expiry_window_days)
    }
}

struct Parser<'a, F> {
    lookup: F,
    log: &'a Span,
}

impl<F> Parser<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn or<T>(&self, variable: &'static str, default: T) -> T
    where
        T: FromStr + core::fmt::Debug,
        T::Err: core::fmt::Display,
    {
        let Some(raw) = (self.lookup)(variable) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    parent: self.log,
                    variable,
                    value = %raw,
                    error = %err,
                    default = ?default,
                    "invalid setting; using default"
                );
                default
            }
        }
    }
}
