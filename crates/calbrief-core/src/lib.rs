//! Shared runtime setup for calbrief hosts.
//!
//! The `calbrief` binary, and any program embedding `calbrief-auth`, calls
//! [`init_tracing`] once before building a credential manager. The JSON
//! preset suits runs whose stderr is collected by a log pipeline.

pub mod tracing;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
