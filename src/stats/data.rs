//! Immutable aggregation snapshots handed to exporters.
//!
//! A snapshot is a plain value copied out of a live aggregator. It holds no
//! reference back to the aggregator, so exporters may keep it for as long as
//! they like while recording continues.

use super::aggregation::AggregationKind;
use serde::{Deserialize, Serialize};

/// Snapshot of a sum aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SumData {
    pub sum: f64,
}

/// Snapshot of a count aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountData {
    pub count: i64,
}

/// Snapshot of a mean aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanData {
    /// 0 when nothing has been recorded
    pub mean: f64,
    pub count: i64,
}

/// Snapshot of a distribution aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionData {
    /// 0 when nothing has been recorded
    pub mean: f64,
    pub count: i64,
    pub sum_of_squared_deviations: f64,
    /// Boundaries the buckets were counted against
    pub bucket_boundaries: Vec<f64>,
    /// One entry per bucket, `bucket_boundaries.len() + 1` in total
    pub bucket_counts: Vec<i64>,
}

impl DistributionData {
    /// Sample variance, or 0 with fewer than two values.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.sum_of_squared_deviations / (self.count - 1) as f64
        }
    }

    /// Sum of all values, reconstructed from mean and count.
    pub fn sum(&self) -> f64 {
        self.mean * self.count as f64
    }
}

/// Point-in-time aggregate of one tag tuple, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationData {
    Sum(SumData),
    Count(CountData),
    Mean(MeanData),
    Distribution(DistributionData),
}

impl AggregationData {
    pub fn kind(&self) -> AggregationKind {
        match self {
            AggregationData::Sum(_) => AggregationKind::Sum,
            AggregationData::Count(_) => AggregationKind::Count,
            AggregationData::Mean(_) => AggregationKind::Mean,
            AggregationData::Distribution(_) => AggregationKind::Distribution,
        }
    }

    pub fn as_sum(&self) -> Option<&SumData> {
        match self {
            AggregationData::Sum(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<&CountData> {
        match self {
            AggregationData::Count(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_mean(&self) -> Option<&MeanData> {
        match self {
            AggregationData::Mean(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&DistributionData> {
        match self {
            AggregationData::Distribution(data) => Some(data),
            _ => None,
        }
    }
}
