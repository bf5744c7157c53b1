//! Tests for report assembly

use chrono::{Local, TimeZone};
use querybench_core::orchestrator::resolve;
use querybench_core::{Profiles, RunGrid, TestOutcome, TestSpec, TestState};
use serde_json::Value;

use super::*;

fn host() -> HostInfo {
    HostInfo {
        hostname: "bench-01".into(),
        num_cores: 8,
        num_threads: 16,
        ram: 64 * 1024 * 1024 * 1024,
    }
}

fn builder() -> ReportBuilder {
    ReportBuilder::new(host(), "23.8.2.7")
}

/// Resolve `yaml` and mark every run ready
fn outcome(yaml: &str, lite: bool) -> TestOutcome {
    let spec = TestSpec::from_yaml_str(yaml).unwrap();
    let test = resolve(&spec, &Profiles::new(), lite).unwrap();
    let mut grid = RunGrid::allocate(test.repetitions, test.queries.len(), &test.stop_conditions);
    for i in 0..grid.len() {
        let record = grid.get_mut(i).unwrap();
        record.add(100, 1000);
        record.ready = true;
    }
    TestOutcome {
        test,
        grid,
        state: TestState::Done,
    }
}

const SUBSTITUTED: &str = r#"
name: scan
type: loop
times_to_run: 2
query: SELECT count() FROM {table}
substitutions:
  - name: table
    values: [hits, visits]
stop_conditions: { any_of: { iteration_count: 1 } }
metrics: [total_time, min_time]
main_metric: total_time
"#;

const PLAIN: &str = r#"
name: single
type: loop
query: SELECT 1
stop_conditions: { any_of: { iteration_count: 1 } }
metrics: [quantiles]
main_metric: total_time
"#;

// ============================================================================
// Verbose Report Tests
// ============================================================================

#[test]
fn test_verbose_header_fields() {
    let time = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let report = builder().build_at(&outcome(PLAIN, false), time);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["hostname"], "bench-01");
    assert_eq!(json["num_cores"], 8);
    assert_eq!(json["num_threads"], 16);
    assert_eq!(json["server_version"], "23.8.2.7");
    assert_eq!(json["time"], "2024-01-02 03:04:05");
    assert_eq!(json["test_name"], "single");
    assert_eq!(json["main_metric"], "total_time");
    assert!(json.get("parameters").is_none());
}

#[test]
fn test_verbose_runs_ordered_by_query_then_repetition() {
    let mut outcome = outcome(SUBSTITUTED, false);
    outcome.grid.get_mut(2).unwrap().failure = Some("Code: 60. table is gone".into());

    let json = serde_json::to_value(builder().build(&outcome)).unwrap();

    assert_eq!(
        json["parameters"],
        serde_json::json!({ "table": ["hits", "visits"] })
    );

    let runs = json["runs"].as_array().unwrap();
    let queries: Vec<_> = runs.iter().map(|r| r["query"].as_str().unwrap()).collect();
    assert_eq!(
        queries,
        vec![
            "SELECT count() FROM hits",
            "SELECT count() FROM hits",
            "SELECT count() FROM visits",
            "SELECT count() FROM visits",
        ]
    );
    assert_eq!(runs[0]["parameters"], serde_json::json!({ "table": "hits" }));

    // grid slot 2 is (repetition 1, query 0)
    assert_eq!(runs[1]["exception"], "Code: 60. table is gone");
    assert!(runs[0].get("exception").is_none());

    assert_eq!(runs[0]["total_time"], 0.0);
    assert_eq!(runs[0]["min_time"], Value::Null);
}

#[test]
fn test_verbose_skips_runs_that_are_not_ready() {
    let mut outcome = outcome(SUBSTITUTED, false);
    outcome.grid.get_mut(3).unwrap().ready = false;

    let report = builder().build(&outcome);
    assert_eq!(report.runs.len(), 3);
}

#[test]
fn test_quantiles_render_as_ordered_object() {
    let mut outcome = outcome(PLAIN, false);
    outcome.grid.get_mut(0).unwrap().finish_query();

    let json = serde_json::to_string(&builder().build(&outcome)).unwrap();
    let first = json.find("\"0.1\"").unwrap();
    let median = json.find("\"0.5\"").unwrap();
    let tail = json.find("\"0.9999\"").unwrap();
    assert!(first < median && median < tail);
}

// ============================================================================
// Lite Report Tests
// ============================================================================

#[test]
fn test_lite_single_query() {
    let text = builder().render_lite(&outcome(PLAIN, true));
    assert_eq!(text, "run 1: total_time = 0");
}

#[test]
fn test_lite_multiple_queries_with_parameters() {
    let mut outcome = outcome(SUBSTITUTED, true);
    outcome.grid.get_mut(1).unwrap().ready = false;

    let text = builder().render_lite(&outcome);
    assert_eq!(
        text,
        "query \"SELECT count() FROM hits\", table = hits, run 1: total_time = 0\n\
         query \"SELECT count() FROM hits\", table = hits, run 2: total_time = 0\n\
         query \"SELECT count() FROM visits\", table = visits, run 2: total_time = 0"
    );
}

// ============================================================================
// Writer Tests
// ============================================================================

#[test]
fn test_writer_emits_json_array() {
    let mut writer = ReportWriter::new(Vec::new(), builder(), ReportMode::Verbose);
    writer.write_test(&outcome(PLAIN, false)).unwrap();
    writer.write_test(&outcome(SUBSTITUTED, false)).unwrap();
    assert_eq!(writer.written(), 2);

    let out = writer.finish().unwrap();
    let parsed: Value = serde_json::from_slice(&out).unwrap();
    let tests = parsed.as_array().unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[1]["test_name"], "scan");
}

#[test]
fn test_writer_empty_batch() {
    let writer = ReportWriter::new(Vec::new(), builder(), ReportMode::Verbose);
    let out = writer.finish().unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "[]\n");
}

#[test]
fn test_writer_lite_lines() {
    let mut writer = ReportWriter::new(Vec::new(), builder(), ReportMode::Lite);
    writer.write_test(&outcome(PLAIN, true)).unwrap();
    let out = writer.finish().unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "run 1: total_time = 0\n");
}
