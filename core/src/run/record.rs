//! Statistics of a single (query, repetition) run

use std::time::{Duration, Instant};

use crate::metrics::{per_second, Metric, MetricValue, QUANTILE_LEVELS};
use crate::run::sampler::ReservoirSampler;
use crate::stop_conditions::TestStopConditions;

/// Relative drift of the average speed that counts as a change
pub const DEFAULT_SPEED_PRECISION: f64 = 0.001;

/// Restartable monotonic timer
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}

impl Stopwatch {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Restart from zero
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Time since the last (re)start
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time since the last (re)start, seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Time since the last (re)start, whole milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// Precision used to decide whether the average speed moved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedPrecision {
    /// Precision for the rows speed
    pub rows: f64,
    /// Precision for the bytes speed
    pub bytes: f64,
}

impl Default for SpeedPrecision {
    fn default() -> Self {
        Self {
            rows: DEFAULT_SPEED_PRECISION,
            bytes: DEFAULT_SPEED_PRECISION,
        }
    }
}

/// Running mean of speed samples with a drift anchor
#[derive(Debug, Clone, Default)]
struct AverageSpeed {
    value: f64,
    samples: u64,
    anchor: f64,
    watch: Stopwatch,
}

impl AverageSpeed {
    fn update(&mut self, speed: f64, precision: f64) {
        self.value = (self.value * self.samples as f64 + speed) / (self.samples + 1) as f64;
        self.samples += 1;

        if self.anchor == 0.0 {
            self.anchor = self.value;
        }

        let (low, high) = if self.value < self.anchor {
            (self.value, self.anchor)
        } else {
            (self.anchor, self.value)
        };
        if high > 0.0 && 1.0 - low / high >= precision {
            self.anchor = self.value;
            self.watch.restart();
        }
    }
}

/// Peak of speed samples
#[derive(Debug, Clone, Default)]
struct PeakSpeed {
    value: f64,
    watch: Stopwatch,
}

impl PeakSpeed {
    fn update(&mut self, speed: f64) {
        if speed > self.value {
            self.value = speed;
            self.watch.restart();
        }
    }
}

/// Mutable state of one slot of the run grid
#[derive(Debug, Clone)]
pub struct RunRecord {
    total_rows_read: u64,
    total_bytes_read: u64,
    query_rows_read: u64,
    query_bytes_read: u64,

    query_watch: Stopwatch,
    total_watch: Stopwatch,
    min_time_watch: Stopwatch,

    min_time_ms: Option<u64>,
    max_rows_speed: PeakSpeed,
    max_bytes_speed: PeakSpeed,
    avg_rows_speed: AverageSpeed,
    avg_bytes_speed: AverageSpeed,
    precision: SpeedPrecision,

    queries: u64,
    sampler: ReservoirSampler,
    total_time: f64,

    /// Bookkeeping for this run finished; only ready runs are reported
    pub ready: bool,

    /// The run stopped early because its stop conditions or an interrupt fired
    pub cancelled: bool,

    /// Error message when executing the query failed
    pub failure: Option<String>,

    /// Stop conditions instantiated for this run
    pub stop_conditions: TestStopConditions,
}

impl RunRecord {
    /// Create a fresh record
    pub fn new(stop_conditions: TestStopConditions, precision: SpeedPrecision) -> Self {
        Self {
            total_rows_read: 0,
            total_bytes_read: 0,
            query_rows_read: 0,
            query_bytes_read: 0,
            query_watch: Stopwatch::start(),
            total_watch: Stopwatch::start(),
            min_time_watch: Stopwatch::start(),
            min_time_ms: None,
            max_rows_speed: PeakSpeed::default(),
            max_bytes_speed: PeakSpeed::default(),
            avg_rows_speed: AverageSpeed::default(),
            avg_bytes_speed: AverageSpeed::default(),
            precision,
            queries: 0,
            sampler: ReservoirSampler::default(),
            total_time: 0.0,
            ready: false,
            cancelled: false,
            failure: None,
            stop_conditions,
        }
    }

    /// Forget everything observed, restart every watch and reset stop conditions
    pub fn clear(&mut self) {
        let mut stop_conditions = std::mem::take(&mut self.stop_conditions);
        stop_conditions.reset();
        *self = Self::new(stop_conditions, self.precision);
    }

    /// Change the average speed precision
    pub fn set_precision(&mut self, precision: SpeedPrecision) {
        self.precision = precision;
    }

    /// Begin timing a new query execution
    pub fn start_query(&mut self) {
        self.query_watch.restart();
        self.query_rows_read = 0;
        self.query_bytes_read = 0;
    }

    /// Account a progress delta and update speed statistics
    pub fn add(&mut self, rows: u64, bytes: u64) {
        self.total_rows_read += rows;
        self.total_bytes_read += bytes;
        self.query_rows_read += rows;
        self.query_bytes_read += bytes;

        let elapsed = self.query_watch.elapsed_secs();
        let rows_speed = per_second(self.query_rows_read as f64, elapsed);
        let bytes_speed = per_second(self.query_bytes_read as f64, elapsed);

        self.max_rows_speed.update(rows_speed);
        self.max_bytes_speed.update(bytes_speed);
        self.avg_rows_speed.update(rows_speed, self.precision.rows);
        self.avg_bytes_speed.update(bytes_speed, self.precision.bytes);
    }

    /// Record the completion of the current query
    pub fn finish_query(&mut self) {
        self.queries += 1;
        self.sampler.insert(self.query_watch.elapsed_secs());

        let elapsed_ms = self.query_watch.elapsed_ms();
        if self.min_time_ms.map_or(true, |best| elapsed_ms < best) {
            self.min_time_ms = Some(elapsed_ms);
            self.min_time_watch.restart();
        }
    }

    /// Capture the whole-run elapsed time
    pub fn set_total_time(&mut self) {
        self.total_time = self.total_watch.elapsed_secs();
    }

    /// Rows read across every execution of this run
    pub fn total_rows_read(&self) -> u64 {
        self.total_rows_read
    }

    /// Uncompressed bytes read across every execution of this run
    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read
    }

    /// Completed query executions
    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Fastest completed execution, ms
    pub fn min_time_ms(&self) -> Option<u64> {
        self.min_time_ms
    }

    /// Whole-run time captured by [`set_total_time`](Self::set_total_time), seconds
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Time the run has been going, ms
    pub fn running_ms(&self) -> u64 {
        self.total_watch.elapsed_ms()
    }

    /// Time since the fastest execution last improved, ms
    pub fn min_time_unchanged_ms(&self) -> u64 {
        self.min_time_watch.elapsed_ms()
    }

    /// Time since the peak rows speed last changed, ms
    pub fn max_speed_unchanged_ms(&self) -> u64 {
        self.max_rows_speed.watch.elapsed_ms()
    }

    /// Time since the average rows speed last drifted, ms
    pub fn avg_speed_unchanged_ms(&self) -> u64 {
        self.avg_rows_speed.watch.elapsed_ms()
    }

    /// Compute a metric for this run
    pub fn metric(&self, metric: Metric) -> MetricValue {
        match metric {
            Metric::MinTime => self
                .min_time_ms
                .map(|ms| MetricValue::Scalar(ms as f64 / 1000.0))
                .unwrap_or(MetricValue::Unavailable),
            Metric::Quantiles => {
                let mut sampler = self.sampler.clone();
                let values: Option<Vec<_>> = QUANTILE_LEVELS
                    .iter()
                    .map(|(key, level)| sampler.quantile_interpolated(*level).map(|v| (*key, v)))
                    .collect();
                values
                    .map(MetricValue::Quantiles)
                    .unwrap_or(MetricValue::Unavailable)
            }
            Metric::TotalTime => MetricValue::Scalar(self.total_time),
            Metric::QueriesPerSecond => {
                MetricValue::Scalar(per_second(self.queries as f64, self.total_time))
            }
            Metric::RowsPerSecond => {
                MetricValue::Scalar(per_second(self.total_rows_read as f64, self.total_time))
            }
            Metric::BytesPerSecond => {
                MetricValue::Scalar(per_second(self.total_bytes_read as f64, self.total_time))
            }
            Metric::MaxRowsPerSecond => MetricValue::Scalar(self.max_rows_speed.value),
            Metric::MaxBytesPerSecond => MetricValue::Scalar(self.max_bytes_speed.value),
            Metric::AvgRowsPerSecond => MetricValue::Scalar(self.avg_rows_speed.value),
            Metric::AvgBytesPerSecond => MetricValue::Scalar(self.avg_bytes_speed.value),
        }
    }
}
