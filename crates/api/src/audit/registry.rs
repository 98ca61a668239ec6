//! Startup registry of audited routes.

use std::collections::HashMap;

use axum::http::Method;
use reqtrail_core::policy::AuditPolicy;

/// Maps `(method, route template)` to the route's [`AuditPolicy`].
///
/// Route templates are the full paths axum reports through `MatchedPath`,
/// e.g. `/admin/audit-logs` or `/orders/{id}`. Routes absent from the
/// registry are not audited.
#[derive(Debug, Clone, Default)]
pub struct AuditRegistry {
    routes: HashMap<String, HashMap<Method, AuditPolicy>>,
}

impl AuditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn register(mut self, method: Method, route: impl Into<String>, policy: AuditPolicy) -> Self {
        self.insert(method, route, policy);
        self
    }

    /// Mark a route as audited. A later registration replaces an earlier one.
    pub fn insert(&mut self, method: Method, route: impl Into<String>, policy: AuditPolicy) {
        self.routes
            .entry(route.into())
            .or_default()
            .insert(method, policy);
    }

    /// Merge another registry into this one.
    pub fn merge(mut self, other: AuditRegistry) -> Self {
        for (route, methods) in other.routes {
            self.routes.entry(route).or_default().extend(methods);
        }
        self
    }

    pub fn lookup(&self, method: &Method, route: &str) -> Option<&AuditPolicy> {
        self.routes.get(route)?.get(method)
    }

    /// Number of audited `(method, route)` pairs.
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
