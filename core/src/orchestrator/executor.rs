//! Orchestrator execution logic

use std::sync::Arc;

use crate::descriptor::{ExecutionType, TestSpec};
use crate::error::{BenchError, BenchResult};
use crate::interrupt::Interrupt;
use crate::profiles::Profiles;
use crate::run::{RunGrid, RunRecord};
use crate::stop_conditions::StopSignal;
use crate::traits::{ClientError, DatabaseClient, StreamEvent};

use super::resolve::{resolve, ResolvedTest};

/// Lifecycle of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    /// Descriptor being resolved
    Resolving,
    /// Run records allocated
    GridBuilt,
    /// Queries executing
    Running,
    /// Results handed to the report builder
    Reporting,
    /// Every run finished
    Done,
    /// Stopped by an interrupt; nothing else runs in this batch
    Interrupted,
}

/// Result of running one test
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Resolved descriptor
    pub test: ResolvedTest,
    /// Records of every run
    pub grid: RunGrid,
    /// Final state, [`TestState::Done`] or [`TestState::Interrupted`]
    pub state: TestState,
}

impl TestOutcome {
    /// Whether an interrupt stopped the test
    pub fn interrupted(&self) -> bool {
        self.state == TestState::Interrupted
    }
}

/// Runs tests one at a time against a database client
///
/// A single task drives every run. Progress events are handled on the same
/// task that reads the query stream, so run records need no locking.
pub struct Orchestrator {
    client: Arc<dyn DatabaseClient>,
    interrupt: Interrupt,
    profiles: Profiles,
    lite: bool,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        interrupt: Interrupt,
        profiles: Profiles,
        lite: bool,
    ) -> Self {
        Self {
            client,
            interrupt,
            profiles,
            lite,
        }
    }

    /// The interrupt token polled between runs
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// The database client used for every query
    pub fn client(&self) -> &Arc<dyn DatabaseClient> {
        &self.client
    }

    /// Resolve and run a test
    ///
    /// Configuration errors are returned before any query is sent. Query
    /// failures are stored in the failing run and do not abort the test.
    pub async fn run_test(&self, spec: &TestSpec) -> BenchResult<TestOutcome> {
        let mut state = TestState::Resolving;
        tracing::debug!(test = %spec.name, ?state, "Test state");

        let test = resolve(spec, &self.profiles, self.lite)?;
        let mut grid = RunGrid::allocate(
            test.repetitions,
            test.queries.len(),
            &test.stop_conditions,
        )
        .with_speed_precision(test.precision);
        state = TestState::GridBuilt;
        tracing::debug!(test = %test.name, ?state, runs = grid.len(), "Test state");

        tracing::info!(
            test = %test.name,
            execution = %test.execution,
            queries = test.queries.len(),
            repetitions = test.repetitions,
            "Running test"
        );
        state = TestState::Running;

        for repetition in 0..test.repetitions {
            if self.interrupt.is_triggered() {
                state = TestState::Interrupted;
                break;
            }

            for (query_index, expansion) in test.queries.iter().enumerate() {
                let index = grid.index(repetition, query_index);
                grid.reset(index);
                let record = grid.get_mut(index).ok_or_else(|| {
                    BenchError::orchestration(format!("run slot {} out of range", index))
                })?;

                tracing::debug!(
                    test = %test.name,
                    repetition,
                    query = query_index,
                    "Starting run"
                );
                self.run_one(&test, &expansion.query, record).await;
            }
        }

        if state != TestState::Interrupted && self.interrupt.is_triggered() {
            state = TestState::Interrupted;
        }
        if state == TestState::Running {
            state = TestState::Reporting;
            tracing::debug!(test = %test.name, ?state, "Test state");
            state = TestState::Done;
        }

        tracing::info!(test = %test.name, ?state, "Test finished");
        Ok(TestOutcome { test, grid, state })
    }

    async fn run_one(&self, test: &ResolvedTest, query: &str, record: &mut RunRecord) {
        if let Err(e) = self.execute_run(test, query, record).await {
            tracing::warn!(test = %test.name, error = %e, "Query failed");
            record.failure = Some(failure_message(&e));
        }
        record.ready = true;
    }

    async fn execute_run(
        &self,
        test: &ResolvedTest,
        query: &str,
        record: &mut RunRecord,
    ) -> Result<(), ClientError> {
        self.execute(test, query, record).await?;

        if test.execution == ExecutionType::Loop {
            let mut iteration = 1u64;
            while !self.interrupt.is_triggered() {
                record.stop_conditions.report(StopSignal::Iterations, iteration);
                if record.stop_conditions.fulfilled() {
                    break;
                }
                self.execute(test, query, record).await?;
                iteration += 1;
            }
        }

        Ok(())
    }

    async fn execute(
        &self,
        test: &ResolvedTest,
        query: &str,
        record: &mut RunRecord,
    ) -> Result<(), ClientError> {
        record.start_query();
        let result = self.consume(test, query, record).await;

        if result.is_ok() && !record.cancelled {
            record.finish_query();
            if let Some(min_time) = record.min_time_ms() {
                record.stop_conditions.report(StopSignal::MinTime, min_time);
            }
            let running = record.running_ms();
            record.stop_conditions.report(StopSignal::TotalTime, running);
        }
        record.set_total_time();

        result
    }

    async fn consume(
        &self,
        test: &ResolvedTest,
        query: &str,
        record: &mut RunRecord,
    ) -> Result<(), ClientError> {
        let mut stream = self.client.execute_streaming(query, &test.settings).await?;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Progress { rows, bytes } => {
                    if record.cancelled {
                        continue;
                    }
                    on_progress(record, rows, bytes);

                    if record.stop_conditions.fulfilled() || self.interrupt.is_triggered() {
                        record.cancelled = true;
                        stream.cancel();
                    }
                }
                StreamEvent::Data { rows } => {
                    tracing::trace!(rows, "Received data block");
                }
            }
        }

        Ok(())
    }
}

/// `Code: N. message`, without repeating a code the server already put in front
pub(crate) fn failure_message(error: &ClientError) -> String {
    match error {
        ClientError::Server { message, .. } if message.trim_start().starts_with("Code:") => {
            message.trim().to_string()
        }
        ClientError::Server { code, message } => format!("Code: {}. {}", code, message),
        other => format!("Code: {}. {}", other.code(), other),
    }
}

fn on_progress(record: &mut RunRecord, rows: u64, bytes: u64) {
    record.add(rows, bytes);

    let signals = [
        (StopSignal::RowsRead, record.total_rows_read()),
        (StopSignal::BytesRead, record.total_bytes_read()),
        (StopSignal::TotalTime, record.running_ms()),
        (StopSignal::MinTimeNotChangingFor, record.min_time_unchanged_ms()),
        (StopSignal::MaxSpeedNotChangingFor, record.max_speed_unchanged_ms()),
        (StopSignal::AverageSpeedNotChangingFor, record.avg_speed_unchanged_ms()),
    ];
    for (signal, value) in signals {
        record.stop_conditions.report(signal, value);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client", &self.client.endpoint())
            .field("interrupt", &self.interrupt.is_triggered())
            .field("profiles", &self.profiles.len())
            .field("lite", &self.lite)
            .finish()
    }
}
