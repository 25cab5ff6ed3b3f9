//! Running aggregation state for one tag tuple of one view.
//!
//! `MutableAggregation` is the plain single-threaded accumulator; `Aggregator`
//! puts it behind its own lock so that concurrent `add` calls on one tuple are
//! applied as indivisible steps and snapshots never see a half-applied update.
//!
//! Non-finite inputs are accepted and flow through ordinary float arithmetic:
//! a NaN poisons the sum or mean, an infinity saturates it.

use super::aggregation::{Aggregation, BucketBoundaries};
use super::data::{AggregationData, CountData, DistributionData, MeanData, SumData};
use parking_lot::Mutex;

/// Online mean/variance plus histogram state.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionState {
    count: i64,
    mean: f64,
    sum_of_squared_deviations: f64,
    bucket_boundaries: BucketBoundaries,
    bucket_counts: Vec<i64>,
}

impl DistributionState {
    fn new(bucket_boundaries: BucketBoundaries) -> Self {
        let bucket_counts = vec![0; bucket_boundaries.bucket_count()];
        DistributionState {
            count: 0,
            mean: 0.0,
            sum_of_squared_deviations: 0.0,
            bucket_boundaries,
            bucket_counts,
        }
    }

    #[inline]
    fn add(&mut self, value: f64) {
        // Welford: the update order here fixes the rounding of the variance.
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_of_squared_deviations += delta * (value - self.mean);

        let bucket = self.bucket_boundaries.bucket_index(value);
        self.bucket_counts[bucket] += 1;

        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// Verify all invariants hold for this distribution
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        debug_assert!(self.count >= 0, "Invariant violated: negative count");
        debug_assert_eq!(
            self.bucket_counts.len(),
            self.bucket_boundaries.bucket_count(),
            "Invariant violated: bucket count vector has wrong length"
        );
        debug_assert_eq!(
            self.bucket_counts.iter().sum::<i64>(),
            self.count,
            "Invariant violated: bucket counts do not sum to count"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    fn to_data(&self) -> DistributionData {
        DistributionData {
            mean: self.mean,
            count: self.count,
            sum_of_squared_deviations: self.sum_of_squared_deviations,
            bucket_boundaries: self.bucket_boundaries.as_slice().to_vec(),
            bucket_counts: self.bucket_counts.clone(),
        }
    }
}

/// Running aggregation state, one variant per aggregation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MutableAggregation {
    Sum { sum: f64 },
    Count { count: i64 },
    Mean { sum: f64, count: i64 },
    Distribution(DistributionState),
}

impl MutableAggregation {
    /// Fresh, empty state for the given descriptor.
    pub fn new(aggregation: &Aggregation) -> Self {
        match aggregation {
            Aggregation::Sum => MutableAggregation::Sum { sum: 0.0 },
            Aggregation::Count => MutableAggregation::Count { count: 0 },
            Aggregation::Mean => MutableAggregation::Mean { sum: 0.0, count: 0 },
            Aggregation::Distribution(bounds) => {
                MutableAggregation::Distribution(DistributionState::new(bounds.clone()))
            }
        }
    }

    /// Fold one value into the running state.
    #[inline]
    pub fn add(&mut self, value: f64) {
        match self {
            MutableAggregation::Sum { sum } => *sum += value,
            MutableAggregation::Count { count } => *count += 1,
            MutableAggregation::Mean { sum, count } => {
                *sum += value;
                *count += 1;
            }
            MutableAggregation::Distribution(dist) => dist.add(value),
        }
    }

    /// Copy the current state out as an immutable snapshot. Does not reset.
    pub fn to_snapshot(&self) -> AggregationData {
        match self {
            MutableAggregation::Sum { sum } => AggregationData::Sum(SumData { sum: *sum }),
            MutableAggregation::Count { count } => {
                AggregationData::Count(CountData { count: *count })
            }
            MutableAggregation::Mean { sum, count } => AggregationData::Mean(MeanData {
                mean: if *count == 0 { 0.0 } else { *sum / *count as f64 },
                count: *count,
            }),
            MutableAggregation::Distribution(dist) => {
                AggregationData::Distribution(dist.to_data())
            }
        }
    }
}

/// A `MutableAggregation` shared between recording threads.
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<MutableAggregation>,
}

impl Aggregator {
    pub fn new(aggregation: &Aggregation) -> Self {
        Aggregator {
            state: Mutex::new(MutableAggregation::new(aggregation)),
        }
    }

    #[inline]
    pub fn add(&self, value: f64) {
        self.state.lock().add(value);
    }

    /// Snapshot taken under the aggregator's lock.
    pub fn snapshot(&self) -> AggregationData {
        self.state.lock().to_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sum_and_count() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        let mut count = MutableAggregation::new(&Aggregation::Count);
        for v in [1.5, -0.5, 10.0] {
            sum.add(v);
            count.add(v);
        }
        assert_eq!(sum.to_snapshot(), AggregationData::Sum(SumData { sum: 11.0 }));
        assert_eq!(
            count.to_snapshot(),
            AggregationData::Count(CountData { count: 3 })
        );
    }

    #[test]
    fn test_mean_empty_is_zero() {
        let mut mean = MutableAggregation::new(&Aggregation::Mean);
        assert_eq!(
            mean.to_snapshot(),
            AggregationData::Mean(MeanData {
                mean: 0.0,
                count: 0
            })
        );
        mean.add(2.0);
        mean.add(4.0);
        assert_eq!(
            mean.to_snapshot(),
            AggregationData::Mean(MeanData {
                mean: 3.0,
                count: 2
            })
        );
    }

    #[test]
    fn test_distribution_welford() {
        let mut dist = MutableAggregation::new(&Aggregation::distribution(vec![]).unwrap());
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            dist.add(v);
        }
        let data = dist.to_snapshot();
        let data = data.as_distribution().unwrap();
        assert_eq!(data.count, 8);
        assert!((data.mean - 5.0).abs() < 1e-12);
        // population variance 4 => ssd 32
        assert!((data.sum_of_squared_deviations - 32.0).abs() < 1e-9);
        assert_eq!(data.bucket_counts, vec![8]);
    }

    #[test]
    fn test_distribution_boundary_values() {
        let agg = Aggregation::distribution(vec![0.0, 10.0]).unwrap();
        let mut dist = MutableAggregation::new(&agg);
        for v in [-1.0, 0.0, 5.0, 10.0, 100.0] {
            dist.add(v);
        }
        let data = dist.to_snapshot();
        let data = data.as_distribution().unwrap();
        assert_eq!(data.bucket_counts, vec![1, 2, 2]);
        assert_eq!(data.bucket_boundaries, vec![0.0, 10.0]);
        assert_eq!(data.bucket_counts.iter().sum::<i64>(), data.count);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        sum.add(1.0);
        let first = sum.to_snapshot();
        sum.add(1.0);
        assert_eq!(first, AggregationData::Sum(SumData { sum: 1.0 }));
        assert_eq!(sum.to_snapshot(), AggregationData::Sum(SumData { sum: 2.0 }));
    }

    #[test]
    fn test_non_finite_values_propagate() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        sum.add(1.0);
        sum.add(f64::NAN);
        assert!(sum.to_snapshot().as_sum().unwrap().sum.is_nan());

        let mut dist = MutableAggregation::new(&Aggregation::distribution(vec![0.0]).unwrap());
        dist.add(f64::INFINITY);
        let data = dist.to_snapshot();
        let data = data.as_distribution().unwrap();
        assert_eq!(data.count, 1);
        assert_eq!(data.bucket_counts, vec![0, 1]);
        assert!(data.mean.is_infinite());
    }

    #[test]
    fn test_aggregator_concurrent_count() {
        let aggregator = Arc::new(Aggregator::new(&Aggregation::Count));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        aggregator.add(1.0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(
            aggregator.snapshot(),
            AggregationData::Count(CountData { count: 80_000 })
        );
    }
}
