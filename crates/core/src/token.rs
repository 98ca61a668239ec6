//! Best-effort credential extraction and actor attribution.
//!
//! The token is located from a fixed priority list of request sources and,
//! when it looks like a JWT or a JSON object, its claims are read to recover
//! a user id and email. Nothing here verifies signatures: the result is
//! metadata for the audit trail, not an authentication decision.

use std::fmt;
use std::sync::{Arc, LazyLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};

use crate::request::RequestInfo;

/// Headers checked, in order, when `Authorization` is absent.
pub const TOKEN_HEADERS: &[&str] = &[
    "x-api-token",
    "x-auth-token",
    "x-access-token",
    "api-key",
    "apikey",
];

/// Query parameters checked, in order, when no header carries a token.
pub const TOKEN_QUERY_PARAMS: &[&str] = &["token", "apikey", "api_key", "access_token"];

/// Claim names that identify the user, highest priority first.
pub const USER_ID_CLAIMS: &[&str] = &["sub", "userId", "id", "user_id"];

/// Claim names that carry the user's email, highest priority first.
pub const USER_EMAIL_CLAIMS: &[&str] = &["email", "user_email", "userEmail"];

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^bearer\s+(.+)$").expect("valid regex"));

/// Replaces the built-in token lookup entirely.
pub type TokenLookup = Arc<dyn Fn(&RequestInfo) -> Option<String> + Send + Sync>;

/// Replaces the built-in claim decoding for one identity field.
pub type ClaimLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Result of token extraction. All fields are independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenInfo {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
}

/// Token extractor with optional installation-supplied overrides.
#[derive(Clone, Default)]
pub struct TokenExtractor {
    token_lookup: Option<TokenLookup>,
    user_id_lookup: Option<ClaimLookup>,
    user_email_lookup: Option<ClaimLookup>,
}

impl fmt::Debug for TokenExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExtractor")
            .field("custom_token", &self.token_lookup.is_some())
            .field("custom_user_id", &self.user_id_lookup.is_some())
            .field("custom_user_email", &self.user_email_lookup.is_some())
            .finish()
    }
}

impl TokenExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_lookup<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestInfo) -> Option<String> + Send + Sync + 'static,
    {
        self.token_lookup = Some(Arc::new(f));
        self
    }

    pub fn with_user_id_lookup<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.user_id_lookup = Some(Arc::new(f));
        self
    }

    pub fn with_user_email_lookup<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.user_email_lookup = Some(Arc::new(f));
        self
    }

    /// Locate the raw token and derive identity fields from it.
    pub fn extract(&self, request: &RequestInfo) -> TokenInfo {
        let token = match &self.token_lookup {
            Some(lookup) => lookup(request),
            None => find_token(request),
        };

        let Some(token) = token else {
            return TokenInfo::default();
        };

        // Only decode claims when a built-in lookup actually needs them.
        let claims = if self.user_id_lookup.is_none() || self.user_email_lookup.is_none() {
            decode_claims(&token)
        } else {
            None
        };

        let user_id = match &self.user_id_lookup {
            Some(lookup) => lookup(&token),
            None => claims.as_ref().and_then(|c| first_claim(c, USER_ID_CLAIMS)),
        };
        let user_email = match &self.user_email_lookup {
            Some(lookup) => lookup(&token),
            None => claims.as_ref().and_then(|c| first_claim(c, USER_EMAIL_CLAIMS)),
        };

        TokenInfo {
            token: Some(token),
            user_id,
            user_email,
        }
    }
}

/// Built-in token lookup: `Authorization`, then custom headers, then query
/// parameters. The first source present wins.
pub fn find_token(request: &RequestInfo) -> Option<String> {
    if let Some(auth) = request.header("authorization") {
        let token = match BEARER_RE.captures(auth) {
            Some(caps) => caps[1].to_string(),
            None => auth.to_string(),
        };
        return Some(token);
    }

    TOKEN_HEADERS
        .iter()
        .find_map(|name| request.header(name))
        .or_else(|| {
            TOKEN_QUERY_PARAMS
                .iter()
                .find_map(|name| request.query_param(name))
        })
        .map(str::to_string)
}

/// Decode the claims object carried by `token`, if any.
///
/// Three dot-separated parts are treated as a JWT whose middle part is
/// base64url JSON; a token starting with `{` is parsed as JSON directly.
/// Malformed input yields `None`.
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let parts: Vec<&str> = token.split('.').collect();

    let parsed = if parts.len() == 3 {
        let payload = parts[1].trim_end_matches('=');
        URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()))
    } else if token.starts_with('{') {
        serde_json::from_str::<Value>(token).map_err(|e| e.to_string())
    } else {
        return None;
    };

    match parsed {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Token payload could not be decoded");
            None
        }
    }
}

/// First non-empty claim among `names`, rendered as text.
fn first_claim(claims: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match claims.get(*name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
