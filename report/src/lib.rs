//! Report generation for benchmark results
//!
//! This crate turns finished tests into output:
//!
//! - Verbose JSON reports with host metadata and every requested metric
//! - Lite one-line-per-run summaries of the main metric

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod host;
pub mod output;

pub use builder::{ReportBuilder, RunReport, TestReport, TIME_FORMAT};
pub use host::HostInfo;
pub use output::{ReportMode, ReportWriter};

#[cfg(test)]
mod tests;
