//! Turning a descriptor into an executable test
//!
//! Everything that can be wrong with a descriptor is detected here, before
//! the grid is allocated or the server is contacted.

use std::path::{Path, PathBuf};

use crate::descriptor::{ExecutionType, SubstitutionDimension, TestSpec};
use crate::error::{BenchError, BenchResult};
use crate::metrics::Metric;
use crate::profiles::Profiles;
use crate::run::{SpeedPrecision, DEFAULT_SPEED_PRECISION};
use crate::stop_conditions::StopConditionsTemplate;
use crate::substitution::{empty_referenced_dimensions, expand_with_parameters, Expansion};
use crate::traits::QuerySettings;

/// Setting overriding the rows speed precision
pub const AVG_ROWS_SPEED_PRECISION: &str = "average_rows_speed_precision";
/// Setting overriding the bytes speed precision
pub const AVG_BYTES_SPEED_PRECISION: &str = "average_bytes_speed_precision";

/// A descriptor with every option resolved
#[derive(Debug, Clone)]
pub struct ResolvedTest {
    /// Test name
    pub name: String,
    /// Execution type
    pub execution: ExecutionType,
    /// Number of repetitions of the whole query set
    pub repetitions: usize,
    /// Settings sent with every query
    pub settings: QuerySettings,
    /// Precision of the average speed statistics
    pub precision: SpeedPrecision,
    /// Expanded queries with the substitution values applied to each
    pub queries: Vec<Expansion>,
    /// Substitution dimensions in declaration order
    pub substitutions: Vec<SubstitutionDimension>,
    /// Stop conditions instantiated for every run
    pub stop_conditions: StopConditionsTemplate,
    /// Metrics to report, all valid for `execution`
    pub metrics: Vec<Metric>,
    /// Metric used for lite output
    pub main_metric: Metric,
}

/// Resolve `spec` against the shared profiles
pub fn resolve(spec: &TestSpec, profiles: &Profiles, lite: bool) -> BenchResult<ResolvedTest> {
    let templates = load_queries(spec)?;

    let execution = spec.execution.ok_or_else(|| {
        BenchError::config(format!("test '{}': missing required field 'type'", spec.name))
    })?;

    if spec.times_to_run == 0 {
        return Err(BenchError::config(format!(
            "test '{}': times_to_run must be at least 1",
            spec.name
        )));
    }

    if spec.stop_conditions.is_empty() {
        return Err(BenchError::config(format!(
            "test '{}': no stop conditions were set",
            spec.name
        )));
    }

    let (metrics, main_metric) = resolve_metrics(spec, execution, lite)?;

    let mut settings = profiles.merge(&spec.settings)?;
    let precision = SpeedPrecision {
        rows: take_precision(&mut settings, AVG_ROWS_SPEED_PRECISION)?,
        bytes: take_precision(&mut settings, AVG_BYTES_SPEED_PRECISION)?,
    };

    let mut queries = Vec::new();
    for template in &templates {
        for dimension in empty_referenced_dimensions(template, &spec.substitutions) {
            tracing::warn!(
                test = %spec.name,
                dimension,
                "Substitution has no values, query produces no runs"
            );
        }
        queries.extend(expand_with_parameters(template, &spec.substitutions));
    }
    if queries.is_empty() {
        tracing::warn!(test = %spec.name, "No queries left after substitution");
    }

    Ok(ResolvedTest {
        name: spec.name.clone(),
        execution,
        repetitions: spec.times_to_run,
        settings,
        precision,
        queries,
        substitutions: spec.substitutions.clone(),
        stop_conditions: spec.stop_conditions.clone(),
        metrics,
        main_metric,
    })
}

fn resolve_metrics(
    spec: &TestSpec,
    execution: ExecutionType,
    lite: bool,
) -> BenchResult<(Vec<Metric>, Metric)> {
    let mut metrics = spec.metrics.clone();

    let main_metric = match spec.main_metric {
        Some(main) => {
            if !metrics.contains(&main) {
                metrics.push(main);
            }
            main
        }
        None if lite => {
            return Err(BenchError::config(format!(
                "test '{}': lite output requires 'main_metric'",
                spec.name
            )));
        }
        None => *metrics.first().ok_or_else(|| {
            BenchError::config(format!(
                "test '{}': neither metrics nor main_metric were set",
                spec.name
            ))
        })?,
    };

    if let Some(wrong) = metrics.iter().find(|m| !m.valid_for(execution)) {
        return Err(BenchError::config(format!(
            "test '{}': metric '{}' is not available for {} execution",
            spec.name, wrong, execution
        )));
    }

    Ok((metrics, main_metric))
}

fn take_precision(settings: &mut QuerySettings, key: &str) -> BenchResult<f64> {
    match settings.remove(key) {
        None => Ok(DEFAULT_SPEED_PRECISION),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p >= 0.0)
            .ok_or_else(|| BenchError::config(format!("invalid {} '{}'", key, raw))),
    }
}

fn load_queries(spec: &TestSpec) -> BenchResult<Vec<String>> {
    let queries = match (&spec.query, &spec.query_file) {
        (Some(_), Some(_)) => {
            return Err(BenchError::config(format!(
                "test '{}': 'query' and 'query_file' are mutually exclusive",
                spec.name
            )));
        }
        (None, None) => {
            return Err(BenchError::config(format!(
                "test '{}': one of 'query' or 'query_file' is required",
                spec.name
            )));
        }
        (Some(inline), None) => inline.to_vec(),
        (None, Some(file)) => read_query_file(&query_file_path(spec, file))?,
    };

    let queries: Vec<String> = queries
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .collect();

    if queries.is_empty() {
        return Err(BenchError::config(format!(
            "test '{}': did not find any query to execute",
            spec.name
        )));
    }
    Ok(queries)
}

fn query_file_path(spec: &TestSpec, file: &Path) -> PathBuf {
    match spec.base_dir() {
        Some(dir) if file.is_relative() => dir.join(file),
        _ => file.to_path_buf(),
    }
}

fn read_query_file(path: &Path) -> BenchResult<Vec<String>> {
    if !path.exists() {
        return Err(BenchError::MissingFile(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;

    let is_tsv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
    if is_tsv {
        Ok(content.lines().map(unescape_tsv).collect())
    } else {
        Ok(vec![content])
    }
}

/// Undo tab-separated escaping of one line
pub fn unescape_tsv(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('a') => out.push('\u{7}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
