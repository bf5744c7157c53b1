//! Per-test report assembly

use chrono::{DateTime, Local};
use querybench_core::{Expansion, MetricValue, TestOutcome};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::host::HostInfo;

/// Timestamp format used in reports
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Verbose report of one test
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    /// Host name
    pub hostname: String,
    /// Physical CPU cores
    pub num_cores: usize,
    /// Logical CPUs
    pub num_threads: usize,
    /// Total physical memory, bytes
    pub ram: u64,
    /// Version reported by the server
    pub server_version: String,
    /// Local time the report was built
    pub time: String,
    /// Test name
    pub test_name: String,
    /// Metric shown in lite output
    pub main_metric: String,
    /// Substitution dimensions and their values, when the test has any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// Ready runs ordered by query, then repetition
    pub runs: Vec<RunReport>,
}

/// One run inside a [`TestReport`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Query text as executed
    pub query: String,
    /// Error message when the query failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Substitution values applied to the query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// Requested metrics, by name
    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

/// Builds reports for finished tests
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    host: HostInfo,
    server_version: String,
}

impl ReportBuilder {
    /// Create a builder for the given host and server
    pub fn new(host: HostInfo, server_version: impl Into<String>) -> Self {
        Self {
            host,
            server_version: server_version.into(),
        }
    }

    /// Build the verbose report of a test, stamped with the current time
    pub fn build(&self, outcome: &TestOutcome) -> TestReport {
        self.build_at(outcome, Local::now())
    }

    /// Build the verbose report of a test with an explicit timestamp
    pub fn build_at(&self, outcome: &TestOutcome, time: DateTime<Local>) -> TestReport {
        let test = &outcome.test;

        let parameters = (!test.substitutions.is_empty()).then(|| {
            test.substitutions
                .iter()
                .map(|d| {
                    let values = d.values.iter().cloned().map(Value::String).collect();
                    (d.name.clone(), Value::Array(values))
                })
                .collect()
        });

        let runs = outcome
            .grid
            .by_query()
            .filter(|slot| slot.record.ready)
            .filter_map(|slot| {
                let expansion = test.queries.get(slot.query)?;
                let metrics = test
                    .metrics
                    .iter()
                    .map(|metric| {
                        (
                            metric.name().to_string(),
                            metric_json(slot.record.metric(*metric)),
                        )
                    })
                    .collect();

                Some(RunReport {
                    query: expansion.query.clone(),
                    exception: slot.record.failure.clone(),
                    parameters: applied_parameters(expansion),
                    metrics,
                })
            })
            .collect();

        TestReport {
            hostname: self.host.hostname.clone(),
            num_cores: self.host.num_cores,
            num_threads: self.host.num_threads,
            ram: self.host.ram,
            server_version: self.server_version.clone(),
            time: time.format(TIME_FORMAT).to_string(),
            test_name: test.name.clone(),
            main_metric: test.main_metric.name().to_string(),
            parameters,
            runs,
        }
    }

    /// Render the lite report of a test, one line per ready run
    pub fn render_lite(&self, outcome: &TestOutcome) -> String {
        let test = &outcome.test;
        let show_query = test.queries.len() > 1;
        let mut lines = Vec::new();

        for slot in outcome.grid.by_query() {
            if !slot.record.ready {
                continue;
            }
            let Some(expansion) = test.queries.get(slot.query) else {
                continue;
            };

            let mut line = String::new();
            if show_query {
                line.push_str(&format!("query \"{}\", ", expansion.query));
            }
            for (name, value) in &expansion.parameters {
                line.push_str(&format!("{} = {}, ", name, value));
            }
            line.push_str(&format!(
                "run {}: {} = {}",
                slot.repetition + 1,
                test.main_metric,
                slot.record.metric(test.main_metric)
            ));
            lines.push(line);
        }

        lines.join("\n")
    }
}

fn applied_parameters(expansion: &Expansion) -> Option<Map<String, Value>> {
    if expansion.parameters.is_empty() {
        return None;
    }
    Some(
        expansion
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn metric_json(value: MetricValue) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
