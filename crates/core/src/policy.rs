//! Per-route audit policy and its resolution against global defaults.

use serde::{Deserialize, Serialize};

/// Audit marker attached to a route.
///
/// Every field is optional; unset body-logging flags fall back to the
/// global defaults at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPolicy {
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub log_request_body: Option<bool>,
    pub log_response_body: Option<bool>,
}

impl AuditPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn log_request_body(mut self, enabled: bool) -> Self {
        self.log_request_body = Some(enabled);
        self
    }

    pub fn log_response_body(mut self, enabled: bool) -> Self {
        self.log_response_body = Some(enabled);
        self
    }

    /// Merge this policy over the global defaults. Route-level values win.
    pub fn resolve(&self, defaults: &BodyLogging) -> EffectivePolicy {
        EffectivePolicy {
            service_name: self.service_name.clone(),
            description: self.description.clone(),
            log_request_body: self.log_request_body.unwrap_or(defaults.request),
            log_response_body: self.log_response_body.unwrap_or(defaults.response),
        }
    }
}

/// Global body-logging defaults. Both are off unless configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyLogging {
    pub request: bool,
    pub response: bool,
}

/// The policy actually applied to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub log_request_body: bool,
    pub log_response_body: bool,
}
