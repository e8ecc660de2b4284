//! RFC 7807 problem documents for HTTP error responses
//!
//! Converts failed requests into `application/problem+json` bodies instead of
//! HTML error pages. It includes:
//! - the Status-Link Table used for default `type` links (`TypeLinks`)
//! - the structured failure raised by handlers (`Problem`)
//! - the error writer invoked by the framework's error path (`ErrorWriter`)
//! - an axum integration behind the `axum` feature
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod document;
pub mod encoder;
pub mod problem;
pub mod reason;
pub mod type_links;
pub mod writer;

#[cfg(feature = "axum")]
pub mod axum;

// Re-export commonly used types
pub use config::{APPLICATION_PROBLEM_JSON, ConfigError, ProblemConfig};
pub use document::{Fields, ProblemDocument};
pub use encoder::{EncodeError, EncoderRegistry, FieldValue, SerializationPolicy};
pub use problem::Problem;
pub use type_links::TypeLinks;
pub use writer::{ErrorResponse, ErrorWriter, Failure};
