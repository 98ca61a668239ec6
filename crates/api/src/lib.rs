//! Request-audit API server library.
//!
//! Exposes the audit interceptor, its asynchronous writer, the reporting
//! routes and the shared config/state/error types so integration tests and
//! the binary entrypoint can both access them.

pub mod audit;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
