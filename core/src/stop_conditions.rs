//! Stop conditions that end a run
//!
//! A descriptor declares a template of thresholds split into `any_of` and
//! `all_of` groups. Every run slot gets its own [`TestStopConditions`] built
//! from that template; the orchestrator reports observed signals into it and
//! asks whether the run should stop.
//!
//! The set is fulfilled when any configured `any_of` threshold has been
//! crossed, or when `all_of` is non-empty and all of its thresholds have been
//! crossed. Unconfigured thresholds never contribute.

use serde::{Deserialize, Serialize};

/// Signal observed during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopSignal {
    /// Best single-query time so far, ms
    MinTime,
    /// Rows read during the run
    RowsRead,
    /// Uncompressed bytes read during the run
    BytesRead,
    /// Wall time of the whole run, ms
    TotalTime,
    /// Completed loop iterations
    Iterations,
    /// Time since the best query time last improved, ms
    MinTimeNotChangingFor,
    /// Time since the peak rows speed last changed, ms
    MaxSpeedNotChangingFor,
    /// Time since the average rows speed last drifted, ms
    AverageSpeedNotChangingFor,
}

impl StopSignal {
    /// Every signal, in slot order
    pub const ALL: [StopSignal; 8] = [
        StopSignal::MinTime,
        StopSignal::RowsRead,
        StopSignal::BytesRead,
        StopSignal::TotalTime,
        StopSignal::Iterations,
        StopSignal::MinTimeNotChangingFor,
        StopSignal::MaxSpeedNotChangingFor,
        StopSignal::AverageSpeedNotChangingFor,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Whether `value` crosses `threshold` for this signal
    ///
    /// Min time is crossed once the observed best time drops to the
    /// threshold; every other signal grows towards it.
    fn crossed(self, value: u64, threshold: u64) -> bool {
        match self {
            StopSignal::MinTime => value <= threshold,
            _ => value >= threshold,
        }
    }
}

/// Threshold options recognised in a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopThresholds {
    /// Stop once a single query finished within this many ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time_ms: Option<u64>,

    /// Stop after this many rows were read
    #[serde(default, alias = "rows_read", skip_serializing_if = "Option::is_none")]
    pub max_rows_to_read: Option<u64>,

    /// Stop after this many uncompressed bytes were read
    #[serde(
        default,
        alias = "bytes_read_uncompressed",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_bytes_to_read: Option<u64>,

    /// Stop after the run lasted this many ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<u64>,

    /// Stop after this many loop iterations
    #[serde(default, alias = "iterations", skip_serializing_if = "Option::is_none")]
    pub iteration_count: Option<u64>,

    /// Stop when the best query time did not improve for this many ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time_not_changing_for_ms: Option<u64>,

    /// Stop when the peak speed did not change for this many ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed_not_changing_for_ms: Option<u64>,

    /// Stop when the average speed did not drift for this many ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed_not_changing_for_ms: Option<u64>,
}

impl StopThresholds {
    fn threshold(&self, signal: StopSignal) -> Option<u64> {
        match signal {
            StopSignal::MinTime => self.min_time_ms,
            StopSignal::RowsRead => self.max_rows_to_read,
            StopSignal::BytesRead => self.max_bytes_to_read,
            StopSignal::TotalTime => self.total_time_ms,
            StopSignal::Iterations => self.iteration_count,
            StopSignal::MinTimeNotChangingFor => self.min_time_not_changing_for_ms,
            StopSignal::MaxSpeedNotChangingFor => self.max_speed_not_changing_for_ms,
            StopSignal::AverageSpeedNotChangingFor => self.average_speed_not_changing_for_ms,
        }
    }

    /// Whether no threshold is configured
    pub fn is_empty(&self) -> bool {
        StopSignal::ALL
            .iter()
            .all(|signal| self.threshold(*signal).is_none())
    }
}

/// Template declared under `stop_conditions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopConditionsTemplate {
    /// Thresholds that must all be crossed
    #[serde(default)]
    pub all_of: StopThresholds,

    /// Thresholds any one of which stops the run
    #[serde(default)]
    pub any_of: StopThresholds,
}

impl StopConditionsTemplate {
    /// Template with a single `any_of` group
    pub fn any_of(thresholds: StopThresholds) -> Self {
        Self {
            any_of: thresholds,
            ..Default::default()
        }
    }

    /// Whether no threshold is configured in either group
    pub fn is_empty(&self) -> bool {
        self.all_of.is_empty() && self.any_of.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Condition {
    threshold: u64,
    fulfilled: bool,
}

/// Mutable evaluation state for one group of thresholds
#[derive(Debug, Clone, Default)]
pub struct StopConditionsSet {
    conditions: [Option<Condition>; 8],
    initialized_count: usize,
    fulfilled_count: usize,
}

impl StopConditionsSet {
    /// Build the set from configured thresholds
    pub fn from_thresholds(thresholds: &StopThresholds) -> Self {
        let mut set = Self::default();
        for signal in StopSignal::ALL {
            if let Some(threshold) = thresholds.threshold(signal) {
                set.conditions[signal.slot()] = Some(Condition {
                    threshold,
                    fulfilled: false,
                });
                set.initialized_count += 1;
            }
        }
        set
    }

    /// Report an observed value; configured thresholds latch once crossed
    pub fn report(&mut self, signal: StopSignal, value: u64) {
        if let Some(condition) = &mut self.conditions[signal.slot()] {
            if !condition.fulfilled && signal.crossed(value, condition.threshold) {
                condition.fulfilled = true;
                self.fulfilled_count += 1;
            }
        }
    }

    /// Clear every latched threshold
    pub fn reset(&mut self) {
        for condition in self.conditions.iter_mut().flatten() {
            condition.fulfilled = false;
        }
        self.fulfilled_count = 0;
    }

    /// Number of configured thresholds
    pub fn initialized_count(&self) -> usize {
        self.initialized_count
    }

    /// At least one configured threshold crossed
    pub fn any_fulfilled(&self) -> bool {
        self.fulfilled_count > 0
    }

    /// Every configured threshold crossed (false when nothing is configured)
    pub fn all_fulfilled(&self) -> bool {
        self.initialized_count > 0 && self.fulfilled_count == self.initialized_count
    }
}

/// Per-run stop conditions built from a descriptor template
#[derive(Debug, Clone, Default)]
pub struct TestStopConditions {
    all_of: StopConditionsSet,
    any_of: StopConditionsSet,
}

impl TestStopConditions {
    /// Instantiate the template for one run
    pub fn from_template(template: &StopConditionsTemplate) -> Self {
        Self {
            all_of: StopConditionsSet::from_thresholds(&template.all_of),
            any_of: StopConditionsSet::from_thresholds(&template.any_of),
        }
    }

    /// Report an observed signal value to both groups
    pub fn report(&mut self, signal: StopSignal, value: u64) {
        self.all_of.report(signal, value);
        self.any_of.report(signal, value);
    }

    /// Whether the run should stop
    pub fn fulfilled(&self) -> bool {
        self.any_of.any_fulfilled() || self.all_of.all_fulfilled()
    }

    /// Forget observed values, keeping the thresholds
    pub fn reset(&mut self) {
        self.all_of.reset();
        self.any_of.reset();
    }

    /// Whether no threshold is configured
    pub fn is_empty(&self) -> bool {
        self.all_of.initialized_count() == 0 && self.any_of.initialized_count() == 0
    }
}
