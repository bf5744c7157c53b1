//! Orchestrator for test lifecycle management
//!
//! The Orchestrator drives one test at a time:
//! - Resolving the descriptor (settings, queries, metrics)
//! - Allocating the run grid
//! - Executing every (repetition, query) run and feeding stop conditions
//! - Handing the resolved test and its records to the report builder
//!
//! # Example
//!
//! ```ignore
//! use querybench_core::{Interrupt, OrchestratorBuilder};
//!
//! let interrupt = Interrupt::new();
//! interrupt.listen_for_ctrl_c();
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .client(client)
//!     .interrupt(interrupt)
//!     .build()?;
//!
//! let outcome = orchestrator.run_test(&spec).await?;
//! ```

mod builder;
mod executor;
mod resolve;

pub use builder::OrchestratorBuilder;
pub use executor::{Orchestrator, TestOutcome, TestState};
pub use resolve::{
    resolve, unescape_tsv, ResolvedTest, AVG_BYTES_SPEED_PRECISION, AVG_ROWS_SPEED_PRECISION,
};

#[cfg(test)]
mod tests;
