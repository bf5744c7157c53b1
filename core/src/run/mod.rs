//! Run grid and per-run statistics
//!
//! A test expands into `repetitions × queries` runs. Each run owns a
//! [`RunRecord`] holding its counters, stopwatches, latency sample and stop
//! condition state. The grid is rebuilt for every test.

mod grid;
mod record;
mod sampler;

pub use grid::{RunGrid, RunSlot};
pub use record::{RunRecord, SpeedPrecision, Stopwatch, DEFAULT_SPEED_PRECISION};
pub use sampler::{ReservoirSampler, DEFAULT_RESERVOIR_CAPACITY};
