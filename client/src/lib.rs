//! querybench-client: HTTP client for the database under test
//!
//! Implements [`querybench_core::DatabaseClient`] on top of the server's HTTP
//! interface, streaming `JSONEachRowWithProgress` responses so the
//! orchestrator sees read progress while a query runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod http;
pub mod streaming;

pub use config::{ClientConfig, ConfigValidationError, DEFAULT_PORT};
pub use http::HttpDatabaseClient;
pub use streaming::{Line, LineBuffer, ProgressParser};
