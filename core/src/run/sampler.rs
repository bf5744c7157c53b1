//! Bounded uniform sample of query latencies

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default number of latencies kept per run
pub const DEFAULT_RESERVOIR_CAPACITY: usize = 8192;

/// Reservoir sampler (algorithm R)
///
/// Keeps every value until `capacity` is reached, then replaces existing
/// samples so that each value seen so far is retained with equal probability.
#[derive(Debug, Clone)]
pub struct ReservoirSampler {
    samples: Vec<f64>,
    capacity: usize,
    seen: u64,
    sorted: bool,
    rng: StdRng,
}

impl Default for ReservoirSampler {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVOIR_CAPACITY)
    }
}

impl ReservoirSampler {
    /// Create an empty sampler
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::new(),
            capacity: capacity.max(1),
            seen: 0,
            sorted: true,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a sampler with a fixed random seed
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(capacity)
        }
    }

    /// Offer a value to the reservoir
    pub fn insert(&mut self, value: f64) {
        self.seen += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(value);
            self.sorted = false;
            return;
        }

        let slot = self.rng.gen_range(0..self.seen);
        if (slot as usize) < self.capacity {
            self.samples[slot as usize] = value;
            self.sorted = false;
        }
    }

    /// Values currently retained
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing was inserted
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total number of values offered
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Linearly interpolated quantile of the retained values
    ///
    /// `level` is clamped to `[0, 1]`. Returns `None` when empty.
    pub fn quantile_interpolated(&mut self, level: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        self.sort();

        let last = (self.samples.len() - 1) as f64;
        let index = (level * last).clamp(0.0, last);
        let left = index.floor() as usize;
        let right = left + 1;
        if right == self.samples.len() {
            return Some(self.samples[left]);
        }

        let weight = index - left as f64;
        Some(self.samples[left] * (1.0 - weight) + self.samples[right] * weight)
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.samples.clear();
        self.seen = 0;
        self.sorted = true;
    }

    fn sort(&mut self) {
        if !self.sorted {
            self.samples.sort_by(|a, b| a.total_cmp(b));
            self.sorted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_quantile() {
        let mut sampler = ReservoirSampler::default();
        assert!(sampler.is_empty());
        assert_eq!(sampler.quantile_interpolated(0.5), None);
    }

    #[test]
    fn test_quantiles_interpolate_between_samples() {
        let mut sampler = ReservoirSampler::default();
        for value in [4.0, 1.0, 3.0, 2.0] {
            sampler.insert(value);
        }

        assert_eq!(sampler.quantile_interpolated(0.0), Some(1.0));
        assert_eq!(sampler.quantile_interpolated(1.0), Some(4.0));
        assert_eq!(sampler.quantile_interpolated(0.5), Some(2.5));
        assert_eq!(sampler.quantile_interpolated(2.0), Some(4.0));
    }

    #[test]
    fn test_single_sample_for_every_level() {
        let mut sampler = ReservoirSampler::default();
        sampler.insert(0.125);
        for level in [0.1, 0.5, 0.9999] {
            assert_eq!(sampler.quantile_interpolated(level), Some(0.125));
        }
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut sampler = ReservoirSampler::with_seed(16, 7);
        for i in 0..1000 {
            sampler.insert(i as f64);
        }

        assert_eq!(sampler.len(), 16);
        assert_eq!(sampler.seen(), 1000);
        let median = sampler.quantile_interpolated(0.5).unwrap();
        assert!((0.0..1000.0).contains(&median));
    }

    #[test]
    fn test_clear() {
        let mut sampler = ReservoirSampler::default();
        sampler.insert(1.0);
        sampler.clear();
        assert!(sampler.is_empty());
        assert_eq!(sampler.seen(), 0);
    }
}
