use std::fmt;
use std::str::FromStr;

use reqtrail_core::policy::BodyLogging;
use reqtrail_core::token::TokenExtractor;

use crate::background::audit_retention;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for queued audit records to drain (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Audit pipeline settings.
    pub audit: AuditConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `HOST`                 | `0.0.0.0` |
    /// | `PORT`                 | `3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `10`      |
    ///
    /// See [`AuditConfig::from_env`] for the audit settings.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            request_timeout_secs,
            shutdown_timeout_secs,
            audit: AuditConfig::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit configuration
// ---------------------------------------------------------------------------

/// Default bounded queue size between request handlers and the writer.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default number of concurrent inserts.
const DEFAULT_WRITER_CONCURRENCY: usize = 4;
/// Default cap on captured request/response bodies.
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
/// Default retention for the periodic cleanup.
const DEFAULT_RETENTION_DAYS: i64 = 90;
/// Default cleanup interval: once a day.
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 86_400;

/// Immutable audit settings, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Capture request headers/body/query unless a route says otherwise.
    pub log_request_body: bool,
    /// Capture response payloads unless a route says otherwise.
    pub log_response_body: bool,
    /// Paths that bypass auditing; `*` wildcards or literal prefixes.
    pub exclude_routes: Vec<String>,
    /// Verbosity of the audit pipeline's own logging. No effect on capture.
    pub log_level: LogLevel,
    pub queue_capacity: usize,
    pub writer_concurrency: usize,
    /// Bodies larger than this are recorded as `"[TRUNCATED]"`.
    pub max_body_bytes: usize,
    /// Persist `"[REDACTED]"` instead of the extracted token.
    pub redact_token: bool,
    /// Age in days after which the periodic cleanup deletes records.
    pub retention_days: i64,
    pub cleanup_interval_secs: u64,
    /// Token lookup with any installation-specific overrides.
    pub token_extractor: TokenExtractor,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_request_body: false,
            log_response_body: false,
            exclude_routes: Vec::new(),
            log_level: LogLevel::Info,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            writer_concurrency: DEFAULT_WRITER_CONCURRENCY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            redact_token: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            token_extractor: TokenExtractor::default(),
        }
    }
}

impl AuditConfig {
    /// Load audit settings from environment variables.
    ///
    /// | Env Var                       | Default  |
    /// |-------------------------------|----------|
    /// | `AUDIT_LOG_REQUEST_BODY`      | `false`  |
    /// | `AUDIT_LOG_RESPONSE_BODY`     | `false`  |
    /// | `AUDIT_EXCLUDE_ROUTES`        | (empty)  |
    /// | `AUDIT_LOG_LEVEL`             | `info`   |
    /// | `AUDIT_QUEUE_CAPACITY`        | `1024`   |
    /// | `AUDIT_WRITER_CONCURRENCY`    | `4`      |
    /// | `AUDIT_MAX_BODY_BYTES`        | `65536`  |
    /// | `AUDIT_REDACT_TOKEN`          | `false`  |
    /// | `AUDIT_RETENTION_DAYS`        | `90`     |
    /// | `AUDIT_CLEANUP_INTERVAL_SECS` | `86400`  |
    ///
    /// # Panics
    ///
    /// Panics if any variable is set to an unparseable value, if
    /// `AUDIT_RETENTION_DAYS` is negative, or if the interval, queue capacity
    /// or writer concurrency is zero.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let exclude_routes = lookup("AUDIT_EXCLUDE_ROUTES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            log_request_body: parse_or(&lookup, "AUDIT_LOG_REQUEST_BODY", defaults.log_request_body),
            log_response_body: parse_or(
                &lookup,
                "AUDIT_LOG_RESPONSE_BODY",
                defaults.log_response_body,
            ),
            exclude_routes,
            log_level: parse_or(&lookup, "AUDIT_LOG_LEVEL", defaults.log_level),
            queue_capacity: parse_or(&lookup, "AUDIT_QUEUE_CAPACITY", defaults.queue_capacity),
            writer_concurrency: parse_or(
                &lookup,
                "AUDIT_WRITER_CONCURRENCY",
                defaults.writer_concurrency,
            ),
            max_body_bytes: parse_or(&lookup, "AUDIT_MAX_BODY_BYTES", defaults.max_body_bytes),
            redact_token: parse_or(&lookup, "AUDIT_REDACT_TOKEN", defaults.redact_token),
            retention_days: parse_or(&lookup, "AUDIT_RETENTION_DAYS", defaults.retention_days),
            cleanup_interval_secs: parse_or(
                &lookup,
                "AUDIT_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            ),
            token_extractor: defaults.token_extractor,
        };
        config.validate();
        config
    }

    /// Reject values that parse but cannot drive the pipeline.
    fn validate(&self) {
        assert!(
            audit_retention::cutoff_for(self.retention_days).is_some(),
            "AUDIT_RETENTION_DAYS must be a non-negative day count, got {}",
            self.retention_days
        );
        assert!(
            self.cleanup_interval_secs > 0,
            "AUDIT_CLEANUP_INTERVAL_SECS must be greater than zero"
        );
        assert!(
            self.queue_capacity > 0,
            "AUDIT_QUEUE_CAPACITY must be greater than zero"
        );
        assert!(
            self.writer_concurrency > 0,
            "AUDIT_WRITER_CONCURRENCY must be greater than zero"
        );
    }

    /// Install a token extractor with custom overrides.
    pub fn with_token_extractor(mut self, extractor: TokenExtractor) -> Self {
        self.token_extractor = extractor;
        self
    }

    /// Global body-logging defaults for policy resolution.
    pub fn body_logging(&self) -> BodyLogging {
        BodyLogging {
            request: self.log_request_body,
            response: self.log_response_body,
        }
    }
}

/// Parse `key` if set, otherwise return `default`. Fails fast on bad input.
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        None => default,
    }
}

// ---------------------------------------------------------------------------
// Log level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is not set.
    pub fn filter_directive(self) -> String {
        let level = self.as_str();
        format!("reqtrail_api={level},reqtrail_core={level},tower_http={level}")
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("expected debug|info|warn|error, got '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
