//! Framework-agnostic building blocks of the request audit pipeline.
//!
//! Nothing in this crate touches HTTP framework types or the database; the
//! API crate converts requests into [`request::RequestInfo`] once at the
//! boundary and everything here operates on those plain values.

pub mod error;
pub mod exclusion;
pub mod policy;
pub mod query;
pub mod request;
pub mod sanitize;
pub mod token;
pub mod types;
