//! Tests for the Orchestrator module

use super::builder::OrchestratorBuilder;
use super::executor::{failure_message, Orchestrator, TestState};
use super::resolve::{resolve, unescape_tsv};
use crate::descriptor::TestSpec;
use crate::error::BenchError;
use crate::interrupt::Interrupt;
use crate::metrics::{Metric, MetricValue};
use crate::profiles::Profiles;
use crate::traits::{ClientError, DatabaseClient, QuerySettings, QueryStream, StreamEvent};

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock DatabaseClient
// ============================================================================

/// Streams a fixed number of progress events for every query
///
/// Queries containing `fail_on_start` are rejected by the "server", queries
/// containing `fail_mid_stream` break after the first progress event.
struct MockClient {
    progress_events: usize,
    rows_per_event: u64,
    bytes_per_event: u64,
    calls: Mutex<Vec<(String, QuerySettings)>>,
    polled: Arc<AtomicUsize>,
    trigger_after: Option<(Interrupt, usize)>,
}

impl MockClient {
    fn new(progress_events: usize) -> Self {
        Self {
            progress_events,
            rows_per_event: 10,
            bytes_per_event: 100,
            calls: Mutex::new(Vec::new()),
            polled: Arc::new(AtomicUsize::new(0)),
            trigger_after: None,
        }
    }

    fn with_interrupt_after(mut self, interrupt: Interrupt, events: usize) -> Self {
        self.trigger_after = Some((interrupt, events));
        self
    }

    fn queries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }

    fn settings(&self) -> Vec<QuerySettings> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DatabaseClient for MockClient {
    fn endpoint(&self) -> &str {
        "mock://server"
    }

    async fn server_version(&self) -> Result<String, ClientError> {
        Ok("23.8.1".into())
    }

    async fn execute_streaming(
        &self,
        query: &str,
        settings: &QuerySettings,
    ) -> Result<QueryStream, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), settings.clone()));

        if query.contains("fail_on_start") {
            return Err(ClientError::Server {
                code: 60,
                message: "Table default.missing doesn't exist".into(),
            });
        }

        let mut events: Vec<Result<StreamEvent, ClientError>> = (0..self.progress_events)
            .map(|_| {
                Ok(StreamEvent::Progress {
                    rows: self.rows_per_event,
                    bytes: self.bytes_per_event,
                })
            })
            .collect();
        if query.contains("fail_mid_stream") {
            events.insert(1, Err(ClientError::Protocol("connection reset".into())));
        }
        events.push(Ok(StreamEvent::Data { rows: 1 }));

        let polled = Arc::clone(&self.polled);
        let trigger = self.trigger_after.clone();
        let stream = futures::stream::iter(events).inspect(move |_| {
            let seen = polled.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((interrupt, after)) = &trigger {
                if seen == *after {
                    interrupt.trigger();
                }
            }
        });

        Ok(QueryStream::new(stream))
    }

    async fn exists_object(&self, _name: &str) -> Result<bool, ClientError> {
        Ok(true)
    }
}

fn orchestrator(client: Arc<MockClient>) -> Orchestrator {
    OrchestratorBuilder::new().client(client).build().unwrap()
}

fn spec(yaml: &str) -> TestSpec {
    TestSpec::from_yaml_str(yaml).unwrap()
}

const ONCE_WITH_SUBSTITUTIONS: &str = r#"
name: scan
type: once
times_to_run: 2
query: SELECT count() FROM {table}
substitutions:
  - name: table
    values: [hits, visits]
stop_conditions:
  any_of:
    total_time_ms: 60000
metrics: [max_rows_per_second, avg_rows_per_second]
"#;

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_requires_client() {
    let err = OrchestratorBuilder::new().build().unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("client"));
}

#[test]
fn test_builder_shares_interrupt() {
    let interrupt = Interrupt::new();
    let orchestrator = OrchestratorBuilder::new()
        .client(Arc::new(MockClient::new(1)))
        .interrupt(interrupt.clone())
        .build()
        .unwrap();

    interrupt.trigger();
    assert!(orchestrator.interrupt().is_triggered());
}

// ============================================================================
// Resolution Tests
// ============================================================================

#[tokio::test]
async fn test_query_and_query_file_both_set_is_fatal_before_any_call() {
    let client = Arc::new(MockClient::new(1));
    let spec = spec(
        r#"
name: both
type: once
query: SELECT 1
query_file: queries.tsv
stop_conditions: { any_of: { total_time_ms: 10 } }
metrics: [max_rows_per_second]
"#,
    );

    let err = orchestrator(client.clone()).run_test(&spec).await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_neither_query_nor_query_file_is_fatal() {
    let client = Arc::new(MockClient::new(1));
    let spec = spec(
        r#"
name: neither
type: once
stop_conditions: { any_of: { total_time_ms: 10 } }
metrics: [max_rows_per_second]
"#,
    );

    let err = orchestrator(client.clone()).run_test(&spec).await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(client.call_count(), 0);
}

#[test]
fn test_resolve_rejects_incomplete_descriptors() {
    let profiles = Profiles::new();
    let cases = [
        "name: t\nquery: SELECT 1\nstop_conditions: { any_of: { total_time_ms: 1 } }\nmetrics: [min_time]\n",
        "name: t\ntype: loop\ntimes_to_run: 0\nquery: SELECT 1\nstop_conditions: { any_of: { total_time_ms: 1 } }\nmetrics: [min_time]\n",
        "name: t\ntype: loop\nquery: SELECT 1\nmetrics: [min_time]\n",
        "name: t\ntype: loop\nquery: SELECT 1\nstop_conditions: { any_of: { total_time_ms: 1 } }\n",
        "name: t\ntype: loop\nquery: '  '\nstop_conditions: { any_of: { total_time_ms: 1 } }\nmetrics: [min_time]\n",
    ];

    for yaml in cases {
        let err = resolve(&spec(yaml), &profiles, false).unwrap_err();
        assert!(err.is_config(), "expected config error for {yaml}");
    }
}

#[test]
fn test_metric_mismatch_is_fatal() {
    let spec = spec(
        r#"
name: t
type: once
query: SELECT 1
stop_conditions: { any_of: { total_time_ms: 1 } }
metrics: [max_rows_per_second, min_time]
"#,
    );
    let err = resolve(&spec, &Profiles::new(), false).unwrap_err();
    assert!(err.to_string().contains("min_time"));
}

#[test]
fn test_main_metric_defaults_and_is_appended() {
    let mut spec = spec(
        r#"
name: t
type: loop
query: SELECT 1
stop_conditions: { any_of: { iteration_count: 1 } }
metrics: [quantiles, total_time]
"#,
    );
    let resolved = resolve(&spec, &Profiles::new(), false).unwrap();
    assert_eq!(resolved.main_metric, Metric::Quantiles);

    spec.main_metric = Some(Metric::MinTime);
    let resolved = resolve(&spec, &Profiles::new(), true).unwrap();
    assert_eq!(resolved.main_metric, Metric::MinTime);
    assert_eq!(
        resolved.metrics,
        vec![Metric::Quantiles, Metric::TotalTime, Metric::MinTime]
    );
}

#[test]
fn test_lite_requires_explicit_main_metric() {
    let spec = spec(
        r#"
name: t
type: loop
query: SELECT 1
stop_conditions: { any_of: { iteration_count: 1 } }
metrics: [min_time]
"#,
    );
    assert!(resolve(&spec, &Profiles::new(), false).is_ok());
    let err = resolve(&spec, &Profiles::new(), true).unwrap_err();
    assert!(err.to_string().contains("main_metric"));
}

#[test]
fn test_speed_precision_settings_are_consumed() {
    let spec = spec(
        r#"
name: t
type: once
query: SELECT 1
settings:
  average_rows_speed_precision: 0.05
  max_threads: 2
stop_conditions: { any_of: { total_time_ms: 1 } }
metrics: [avg_rows_per_second]
"#,
    );
    let resolved = resolve(&spec, &Profiles::new(), false).unwrap();
    assert_eq!(resolved.precision.rows, 0.05);
    assert_eq!(resolved.precision.bytes, 0.001);
    assert_eq!(resolved.settings.len(), 1);
    assert_eq!(resolved.settings["max_threads"], "2");
}

#[test]
fn test_tsv_query_file_relative_to_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("queries.tsv"),
        "SELECT 'a\\tb'\nSELECT 1\\nFROM t\n\nSELECT '\\\\'\n",
    )
    .unwrap();
    let path = dir.path().join("t.yaml");
    std::fs::write(
        &path,
        "name: t\ntype: once\nquery_file: queries.tsv\nstop_conditions: { any_of: { total_time_ms: 1 } }\nmetrics: [max_rows_per_second]\n",
    )
    .unwrap();

    let spec = TestSpec::load(&path).unwrap();
    let resolved = resolve(&spec, &Profiles::new(), false).unwrap();
    let queries: Vec<_> = resolved.queries.iter().map(|e| e.query.as_str()).collect();
    assert_eq!(queries, vec!["SELECT 'a\tb'", "SELECT 1\nFROM t", "SELECT '\\'"]);
}

#[test]
fn test_plain_query_file_is_one_query() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("big.sql");
    std::fs::write(&file, "SELECT 1\nUNION ALL\nSELECT 2\n").unwrap();

    let mut spec = TestSpec::new("t");
    spec.execution = Some(crate::descriptor::ExecutionType::Once);
    spec.query_file = Some(file);
    spec.stop_conditions.any_of.total_time_ms = Some(1);
    spec.metrics = vec![Metric::MaxRowsPerSecond];

    let resolved = resolve(&spec, &Profiles::new(), false).unwrap();
    assert_eq!(resolved.queries.len(), 1);
    assert!(resolved.queries[0].query.contains("UNION ALL"));
}

#[test]
fn test_missing_query_file() {
    let mut spec = TestSpec::new("t");
    spec.execution = Some(crate::descriptor::ExecutionType::Once);
    spec.query_file = Some("/nonexistent/queries.tsv".into());
    spec.stop_conditions.any_of.total_time_ms = Some(1);
    spec.metrics = vec![Metric::MaxRowsPerSecond];

    let err = resolve(&spec, &Profiles::new(), false).unwrap_err();
    assert!(matches!(err, BenchError::MissingFile(_)));
}

#[test]
fn test_unescape_tsv() {
    assert_eq!(unescape_tsv(r"a\tb\nc\\d"), "a\tb\nc\\d");
    assert_eq!(unescape_tsv(r"it\'s"), "it's");
    assert_eq!(unescape_tsv(r"\0\r"), "\0\r");
    assert_eq!(unescape_tsv("trailing\\"), "trailing\\");
    assert_eq!(unescape_tsv("plain"), "plain");
}

// ============================================================================
// Execution Tests
// ============================================================================

#[tokio::test]
async fn test_once_runs_every_slot_in_order() {
    let client = Arc::new(MockClient::new(3));
    let outcome = orchestrator(client.clone())
        .run_test(&spec(ONCE_WITH_SUBSTITUTIONS))
        .await
        .unwrap();

    assert_eq!(outcome.state, TestState::Done);
    assert!(!outcome.interrupted());
    assert_eq!(outcome.grid.len(), 4);
    assert_eq!(
        client.queries(),
        vec![
            "SELECT count() FROM hits",
            "SELECT count() FROM visits",
            "SELECT count() FROM hits",
            "SELECT count() FROM visits",
        ]
    );

    for slot in outcome.grid.by_query() {
        let record = slot.record;
        assert!(record.ready);
        assert!(!record.cancelled);
        assert!(record.failure.is_none());
        assert_eq!(record.total_rows_read(), 30);
        assert_eq!(record.total_bytes_read(), 300);
        assert_eq!(record.queries(), 1);
    }
    assert_eq!(
        outcome.test.queries[1].parameters,
        vec![("table".to_string(), "visits".to_string())]
    );
}

#[tokio::test]
async fn test_loop_iteration_count_executes_exactly() {
    let client = Arc::new(MockClient::new(1));
    let spec = spec(
        r#"
name: looped
type: loop
query: SELECT 1
stop_conditions:
  any_of:
    iteration_count: 3
metrics: [min_time, quantiles, queries_per_second]
"#,
    );

    let outcome = orchestrator(client.clone()).run_test(&spec).await.unwrap();

    assert_eq!(client.call_count(), 3);
    let record = outcome.grid.get(0).unwrap();
    assert!(record.ready);
    assert_eq!(record.queries(), 3);
    assert_eq!(record.total_rows_read(), 30);
    assert!(record.total_time() > 0.0);
    assert!(matches!(
        record.metric(Metric::Quantiles),
        MetricValue::Quantiles(_)
    ));
}

#[tokio::test]
async fn test_loop_all_of_needs_every_threshold() {
    let client = Arc::new(MockClient::new(1));
    let spec = spec(
        r#"
name: looped
type: loop
query: SELECT 1
stop_conditions:
  all_of:
    iteration_count: 2
    max_rows_to_read: 40
metrics: [min_time]
"#,
    );

    let outcome = orchestrator(client.clone()).run_test(&spec).await.unwrap();

    // rows reach 40 during the fourth execution, iterations were already past 2
    let record = outcome.grid.get(0).unwrap();
    assert!(record.cancelled);
    assert_eq!(client.call_count(), 4);
    assert_eq!(record.total_rows_read(), 40);
}

#[tokio::test]
async fn test_progress_fulfilling_stop_conditions_cancels_stream() {
    let client = Arc::new(MockClient::new(10));
    let spec = spec(
        r#"
name: capped
type: once
query: SELECT * FROM hits
stop_conditions:
  any_of:
    max_rows_to_read: 25
metrics: [max_rows_per_second]
"#,
    );

    let outcome = orchestrator(client.clone()).run_test(&spec).await.unwrap();
    let record = outcome.grid.get(0).unwrap();

    assert!(record.ready);
    assert!(record.cancelled);
    assert!(record.failure.is_none());
    assert_eq!(record.total_rows_read(), 30);
    assert_eq!(record.queries(), 0);
    assert_eq!(client.polled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failing_query_is_isolated() {
    let client = Arc::new(MockClient::new(2));
    let spec = spec(
        r#"
name: mixed
type: once
query:
  - SELECT * FROM fail_on_start
  - SELECT * FROM fail_mid_stream
  - SELECT 1
stop_conditions: { any_of: { total_time_ms: 60000 } }
metrics: [max_rows_per_second]
"#,
    );

    let outcome = orchestrator(client.clone()).run_test(&spec).await.unwrap();
    assert_eq!(outcome.state, TestState::Done);

    let rejected = outcome.grid.get(0).unwrap();
    assert!(rejected.ready);
    assert_eq!(
        rejected.failure.as_deref(),
        Some("Code: 60. Table default.missing doesn't exist")
    );

    let broken = outcome.grid.get(1).unwrap();
    assert!(broken.ready);
    assert!(broken.failure.is_some());
    assert_eq!(broken.total_rows_read(), 10);

    let healthy = outcome.grid.get(2).unwrap();
    assert!(healthy.ready);
    assert!(healthy.failure.is_none());
    assert_eq!(healthy.queries(), 1);
}

#[tokio::test]
async fn test_interrupt_before_start_runs_nothing() {
    let client = Arc::new(MockClient::new(1));
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let orchestrator = OrchestratorBuilder::new()
        .client(client.clone())
        .interrupt(interrupt)
        .build()
        .unwrap();
    let outcome = orchestrator
        .run_test(&spec(ONCE_WITH_SUBSTITUTIONS))
        .await
        .unwrap();

    assert!(outcome.interrupted());
    assert_eq!(client.call_count(), 0);
    assert!(outcome.grid.by_query().all(|slot| !slot.record.ready));
}

#[tokio::test]
async fn test_interrupt_during_stream_cancels_and_stops_repetitions() {
    let interrupt = Interrupt::new();
    let client = Arc::new(MockClient::new(5).with_interrupt_after(interrupt.clone(), 2));
    let spec = spec(
        r#"
name: interrupted
type: loop
times_to_run: 3
query: SELECT 1
stop_conditions: { any_of: { iteration_count: 100 } }
metrics: [min_time]
"#,
    );

    let orchestrator = OrchestratorBuilder::new()
        .client(client.clone())
        .interrupt(interrupt)
        .build()
        .unwrap();
    let outcome = orchestrator.run_test(&spec).await.unwrap();

    assert_eq!(outcome.state, TestState::Interrupted);
    assert_eq!(client.call_count(), 1);

    let first = outcome.grid.get(0).unwrap();
    assert!(first.ready);
    assert!(first.cancelled);
    assert_eq!(first.total_rows_read(), 20);
    assert!(!outcome.grid.get(1).unwrap().ready);
    assert!(!outcome.grid.get(2).unwrap().ready);
}

#[tokio::test]
async fn test_profile_settings_are_merged_and_forwarded() {
    let client = Arc::new(MockClient::new(1));
    let profiles = Profiles::new().with_profile(
        "fast",
        BTreeMap::from([
            ("max_threads".to_string(), "16".to_string()),
            ("use_uncompressed_cache".to_string(), "1".to_string()),
        ]),
    );
    let spec = spec(
        r#"
name: tuned
type: once
query: SELECT 1
settings:
  profile: fast
  max_threads: 4
  log_queries:
  average_bytes_speed_precision: 0.1
stop_conditions: { any_of: { total_time_ms: 60000 } }
metrics: [avg_bytes_per_second]
"#,
    );

    let orchestrator = OrchestratorBuilder::new()
        .client(client.clone())
        .profiles(profiles)
        .build()
        .unwrap();
    orchestrator.run_test(&spec).await.unwrap();

    let sent = &client.settings()[0];
    assert_eq!(sent["max_threads"], "4");
    assert_eq!(sent["use_uncompressed_cache"], "1");
    assert_eq!(sent["log_queries"], "true");
    assert!(!sent.contains_key("profile"));
    assert!(!sent.contains_key("average_bytes_speed_precision"));
}

#[tokio::test]
async fn test_empty_substitution_yields_no_runs() {
    let client = Arc::new(MockClient::new(1));
    let spec = spec(
        r#"
name: empty
type: once
query: SELECT * FROM {table}
substitutions:
  - name: table
    values: []
stop_conditions: { any_of: { total_time_ms: 1 } }
metrics: [max_rows_per_second]
"#,
    );

    let outcome = orchestrator(client.clone()).run_test(&spec).await.unwrap();
    assert!(outcome.grid.is_empty());
    assert_eq!(outcome.state, TestState::Done);
    assert_eq!(client.call_count(), 0);
}

#[test]
fn test_failure_message_carries_code_once() {
    let prefixed = ClientError::Server {
        code: 60,
        message: "Code: 60. DB::Exception: Table default.hits doesn't exist".into(),
    };
    assert_eq!(
        failure_message(&prefixed),
        "Code: 60. DB::Exception: Table default.hits doesn't exist"
    );

    let bare = ClientError::Server {
        code: 241,
        message: "Memory limit exceeded".into(),
    };
    assert_eq!(failure_message(&bare), "Code: 241. Memory limit exceeded");

    let garbled = ClientError::Protocol("unparseable response line".into());
    assert_eq!(
        failure_message(&garbled),
        "Code: 49. protocol error: unparseable response line"
    );
}
