//! Reportable metrics and their compatibility with execution types

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::descriptor::ExecutionType;

/// Quantile levels reported for the `quantiles` metric, with their keys
pub const QUANTILE_LEVELS: [(&str, f64); 13] = [
    ("0.1", 0.1),
    ("0.2", 0.2),
    ("0.3", 0.3),
    ("0.4", 0.4),
    ("0.5", 0.5),
    ("0.6", 0.6),
    ("0.7", 0.7),
    ("0.8", 0.8),
    ("0.9", 0.9),
    ("0.95", 0.95),
    ("0.99", 0.99),
    ("0.999", 0.999),
    ("0.9999", 0.9999),
];

/// A metric a descriptor can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fastest single query, seconds
    MinTime,
    /// Latency quantiles over loop iterations, seconds
    Quantiles,
    /// Wall time of the whole run, seconds
    TotalTime,
    /// Completed queries per second of run time
    QueriesPerSecond,
    /// Rows read per second of run time
    RowsPerSecond,
    /// Bytes read per second of run time
    BytesPerSecond,
    /// Peak rows speed observed from progress
    MaxRowsPerSecond,
    /// Peak bytes speed observed from progress
    MaxBytesPerSecond,
    /// Mean rows speed observed from progress
    AvgRowsPerSecond,
    /// Mean bytes speed observed from progress
    AvgBytesPerSecond,
}

impl Metric {
    /// Every metric, loop-mode ones first
    pub fn all() -> &'static [Metric] {
        &[
            Metric::MinTime,
            Metric::Quantiles,
            Metric::TotalTime,
            Metric::QueriesPerSecond,
            Metric::RowsPerSecond,
            Metric::BytesPerSecond,
            Metric::MaxRowsPerSecond,
            Metric::MaxBytesPerSecond,
            Metric::AvgRowsPerSecond,
            Metric::AvgBytesPerSecond,
        ]
    }

    /// Name as written in descriptors and reports
    pub fn name(&self) -> &'static str {
        match self {
            Metric::MinTime => "min_time",
            Metric::Quantiles => "quantiles",
            Metric::TotalTime => "total_time",
            Metric::QueriesPerSecond => "queries_per_second",
            Metric::RowsPerSecond => "rows_per_second",
            Metric::BytesPerSecond => "bytes_per_second",
            Metric::MaxRowsPerSecond => "max_rows_per_second",
            Metric::MaxBytesPerSecond => "max_bytes_per_second",
            Metric::AvgRowsPerSecond => "avg_rows_per_second",
            Metric::AvgBytesPerSecond => "avg_bytes_per_second",
        }
    }

    /// Execution type this metric is defined for
    pub fn execution_type(&self) -> ExecutionType {
        match self {
            Metric::MinTime
            | Metric::Quantiles
            | Metric::TotalTime
            | Metric::QueriesPerSecond
            | Metric::RowsPerSecond
            | Metric::BytesPerSecond => ExecutionType::Loop,
            Metric::MaxRowsPerSecond
            | Metric::MaxBytesPerSecond
            | Metric::AvgRowsPerSecond
            | Metric::AvgBytesPerSecond => ExecutionType::Once,
        }
    }

    /// Whether this metric may be requested for the given execution type
    pub fn valid_for(&self, exec_type: ExecutionType) -> bool {
        self.execution_type() == exec_type
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::all()
            .iter()
            .copied()
            .find(|metric| metric.name() == s)
            .ok_or_else(|| format!("Unknown metric: {}", s))
    }
}

/// Computed value of one metric for one run
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Single number
    Scalar(f64),
    /// Quantile key and value pairs in [`QUANTILE_LEVELS`] order
    Quantiles(Vec<(&'static str, f64)>),
    /// Nothing observed yet (e.g. min time of a run with no finished query)
    Unavailable,
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Scalar(value) => write!(f, "{}", value),
            MetricValue::Quantiles(values) => {
                f.write_str("{")?;
                for (i, (key, value)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value)?;
                }
                f.write_str("}")
            }
            MetricValue::Unavailable => f.write_str("null"),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Scalar(value) => serializer.serialize_f64(*value),
            MetricValue::Quantiles(values) => {
                let mut map = serializer.serialize_map(Some(values.len()))?;
                for (key, value) in values {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            MetricValue::Unavailable => serializer.serialize_none(),
        }
    }
}

/// Divide, yielding zero when nothing elapsed
pub(crate) fn per_second(amount: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        amount / seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_roundtrip_names() {
        for metric in Metric::all() {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), *metric);
            assert_eq!(
                serde_yaml::from_str::<Metric>(metric.name()).unwrap(),
                *metric
            );
        }
        assert!("p99".parse::<Metric>().is_err());
    }

    #[test]
    fn test_metric_execution_type_table() {
        let loop_metrics: Vec<_> = Metric::all()
            .iter()
            .filter(|m| m.valid_for(ExecutionType::Loop))
            .map(|m| m.name())
            .collect();
        assert_eq!(
            loop_metrics,
            vec![
                "min_time",
                "quantiles",
                "total_time",
                "queries_per_second",
                "rows_per_second",
                "bytes_per_second"
            ]
        );
        assert!(Metric::AvgRowsPerSecond.valid_for(ExecutionType::Once));
        assert!(!Metric::MinTime.valid_for(ExecutionType::Once));
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!(MetricValue::Scalar(0.25).to_string(), "0.25");
        assert_eq!(MetricValue::Unavailable.to_string(), "null");
        assert_eq!(
            MetricValue::Quantiles(vec![("0.5", 1.0), ("0.9", 2.5)]).to_string(),
            "{\"0.5\": 1, \"0.9\": 2.5}"
        );
    }

    #[test]
    fn test_metric_value_serialize() {
        assert_eq!(
            serde_json::to_value(MetricValue::Scalar(1.5)).unwrap(),
            serde_json::json!(1.5)
        );
        assert_eq!(
            serde_json::to_value(MetricValue::Unavailable).unwrap(),
            serde_json::Value::Null
        );
        assert_eq!(
            serde_json::to_string(&MetricValue::Quantiles(vec![("0.9", 2.0), ("0.1", 1.0)]))
                .unwrap(),
            "{\"0.9\":2.0,\"0.1\":1.0}"
        );
    }

    #[test]
    fn test_per_second_zero_elapsed() {
        assert_eq!(per_second(100.0, 0.0), 0.0);
        assert_eq!(per_second(100.0, 2.0), 50.0);
    }
}
