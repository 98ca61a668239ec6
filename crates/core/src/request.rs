//! Plain request snapshot used by the capture pipeline.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::sanitize::sanitize_headers;

/// Marker stored in place of a body larger than the configured capture limit.
pub const TRUNCATED: &str = "[TRUNCATED]";

/// Everything the audit pipeline needs to know about an inbound request.
///
/// Populated once at the HTTP boundary. Header keys are expected to be
/// lower-case (as produced by `http::HeaderMap`), but lookups are
/// case-insensitive so hand-built values behave the same.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    pub method: String,
    /// Path without the query string; used for exclusion matching.
    pub path: String,
    /// Path plus query string, as persisted in the audit record.
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Present only when request-body capture is enabled for the route.
    pub body: Option<Value>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RequestInfo {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Build the persisted `request_data` payload: sanitized headers, body
    /// and query parameters.
    pub fn to_request_data(&self) -> Value {
        strip_nul(json!({
            "headers": sanitize_headers(&self.headers),
            "body": self.body.clone().unwrap_or(Value::Null),
            "query": self.query,
        }))
    }
}

/// Interpret a captured body: JSON when it parses, UTF-8 text otherwise.
///
/// Empty bodies become `null`; non-UTF-8 bodies are decoded lossily.
/// NUL characters are dropped, since `jsonb` cannot store them.
pub fn body_to_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let value = serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()));
    strip_nul(value)
}

/// Remove `\0` from every string and object key in `value`.
pub fn strip_nul(value: Value) -> Value {
    fn clean(s: String) -> String {
        if s.contains('\0') {
            s.replace('\0', "")
        } else {
            s
        }
    }

    match value {
        Value::String(s) => Value::String(clean(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (clean(k), strip_nul(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Like [`body_to_value`], but yields [`TRUNCATED`] when the body exceeds
/// `limit` bytes.
pub fn capture_body(bytes: &[u8], limit: usize) -> Value {
    if bytes.len() > limit {
        Value::String(TRUNCATED.to_string())
    } else {
        body_to_value(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestInfo {
        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), "Bearer abc".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());
        let mut query = BTreeMap::new();
        query.insert("page".to_string(), "2".to_string());
        RequestInfo {
            method: "POST".to_string(),
            path: "/orders".to_string(),
            endpoint: "/orders?page=2".to_string(),
            headers,
            query,
            body: Some(json!({"sku": "A-1"})),
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = request();
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn request_data_is_sanitized() {
        let data = request().to_request_data();
        assert_eq!(data["headers"]["authorization"], "[REDACTED]");
        assert_eq!(data["headers"]["content-type"], "application/json");
        assert_eq!(data["body"]["sku"], "A-1");
        assert_eq!(data["query"]["page"], "2");
    }

    #[test]
    fn missing_body_serializes_as_null() {
        let mut req = request();
        req.body = None;
        assert!(req.to_request_data()["body"].is_null());
    }

    #[test]
    fn body_parsing() {
        assert_eq!(body_to_value(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(body_to_value(b"plain text"), json!("plain text"));
        assert_eq!(body_to_value(b""), Value::Null);
    }

    #[test]
    fn nul_characters_are_dropped() {
        assert_eq!(body_to_value(b"ab\0cd"), json!("abcd"));
        assert_eq!(body_to_value(b"\xff\0x"), json!("\u{fffd}x"));
        assert_eq!(
            body_to_value(br#"{"k\u0000":["a\u0000b", 1]}"#),
            json!({"k": ["ab", 1]})
        );

        let mut req = request();
        req.query.insert("q".to_string(), "x\0y".to_string());
        assert_eq!(req.to_request_data()["query"]["q"], "xy");
    }

    #[test]
    fn oversized_body_is_truncated() {
        assert_eq!(capture_body(b"0123456789", 4), json!(TRUNCATED));
        assert_eq!(capture_body(b"42", 4), json!(42));
    }
}
