//! querybench-core: test descriptors, run bookkeeping and orchestration
//!
//! This crate provides everything needed to turn declarative benchmark
//! descriptors into measured runs, independent of the transport used to
//! reach the database:
//!
//! - Descriptors, profiles and descriptor filtering
//! - Preconditions and query template substitution
//! - Stop conditions, the run grid and per-run statistics
//! - The orchestrator and the database client trait
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod filter;
pub mod interrupt;
pub mod metrics;
pub mod orchestrator;
pub mod precondition;
pub mod profiles;
pub mod run;
pub mod stop_conditions;
pub mod substitution;
pub mod traits;

pub use descriptor::{DescriptorHeader, ExecutionType, QueryList, SubstitutionDimension, TestSpec};
pub use error::*;
pub use filter::{filter_specs, FilterCriteria, Selectable};
pub use interrupt::Interrupt;
pub use metrics::{Metric, MetricValue, QUANTILE_LEVELS};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, ResolvedTest, TestOutcome, TestState,
};
pub use precondition::{Precondition, PreconditionGate};
pub use profiles::Profiles;
pub use run::{RunGrid, RunRecord, RunSlot};
pub use stop_conditions::{StopConditionsTemplate, StopSignal, StopThresholds, TestStopConditions};
pub use substitution::{expand, expand_with_parameters, Expansion};
pub use traits::*;
