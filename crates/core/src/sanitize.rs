//! Redaction of credential-bearing request headers.

use std::collections::BTreeMap;

/// Replacement value for redacted headers.
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values are never persisted.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-token",
    "x-auth-token",
    "x-access-token",
    "api-key",
    "apikey",
];

/// Whether `key` (as given, or lower-cased) names a sensitive header.
pub fn is_sensitive_header(key: &str) -> bool {
    SENSITIVE_HEADERS.contains(&key) || SENSITIVE_HEADERS.contains(&key.to_lowercase().as_str())
}

/// Return a copy of `headers` with every sensitive value replaced by [`REDACTED`].
pub fn sanitize_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_header(key) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}
