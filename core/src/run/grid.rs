//! Flat arena of run records indexed by (repetition, query)

use crate::run::record::{RunRecord, SpeedPrecision};
use crate::stop_conditions::{StopConditionsTemplate, TestStopConditions};

/// One slot of the grid as yielded by [`RunGrid::by_query`]
#[derive(Debug, Clone, Copy)]
pub struct RunSlot<'a> {
    /// Index of the query in the expanded query list
    pub query: usize,
    /// Repetition number, starting at 0
    pub repetition: usize,
    /// Record of this run
    pub record: &'a RunRecord,
}

/// Run records of one test
///
/// Slot `(rep, q)` lives at `rep * query_count + q`.
#[derive(Debug, Clone)]
pub struct RunGrid {
    records: Vec<RunRecord>,
    repetitions: usize,
    query_count: usize,
}

impl RunGrid {
    /// Allocate `repetitions * query_count` records from the template
    pub fn allocate(
        repetitions: usize,
        query_count: usize,
        template: &StopConditionsTemplate,
    ) -> Self {
        let records = (0..repetitions * query_count)
            .map(|_| {
                RunRecord::new(
                    TestStopConditions::from_template(template),
                    SpeedPrecision::default(),
                )
            })
            .collect();

        Self {
            records,
            repetitions,
            query_count,
        }
    }

    /// Use the given average speed precision for every record
    pub fn with_speed_precision(mut self, precision: SpeedPrecision) -> Self {
        for record in &mut self.records {
            record.set_precision(precision);
        }
        self
    }

    /// Slot index of `(repetition, query)`
    pub fn index(&self, repetition: usize, query: usize) -> usize {
        repetition * self.query_count + query
    }

    /// `(repetition, query)` of a slot index, `None` when out of range
    pub fn position(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.records.len() {
            return None;
        }
        Some((index / self.query_count, index % self.query_count))
    }

    /// Clear a record and its stop conditions before running it
    pub fn reset(&mut self, index: usize) {
        if let Some(record) = self.records.get_mut(index) {
            record.clear();
        }
    }

    /// Record at a slot index
    pub fn get(&self, index: usize) -> Option<&RunRecord> {
        self.records.get(index)
    }

    /// Mutable record at a slot index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut RunRecord> {
        self.records.get_mut(index)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the grid has no slots
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured repetitions
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Number of expanded queries
    pub fn query_count(&self) -> usize {
        self.query_count
    }

    /// Records ordered by query, then repetition
    pub fn by_query(&self) -> impl Iterator<Item = RunSlot<'_>> + '_ {
        (0..self.query_count).flat_map(move |query| {
            (0..self.repetitions).map(move |repetition| RunSlot {
                query,
                repetition,
                record: &self.records[repetition * self.query_count + query],
            })
        })
    }
}
