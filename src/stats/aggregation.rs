//! Aggregation descriptors: how the values recorded for a view are combined.

use super::error::StatsError;
use serde::{Deserialize, Serialize};

/// Kind of aggregation, without any parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationKind {
    /// Running sum of all values
    Sum,
    /// Number of values recorded
    Count,
    /// Arithmetic mean plus count
    Mean,
    /// Mean, variance and a bucketed histogram
    Distribution,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "sum",
            AggregationKind::Count => "count",
            AggregationKind::Mean => "mean",
            AggregationKind::Distribution => "distribution",
        }
    }
}

impl std::fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Histogram bucket boundaries for a distribution.
///
/// Boundaries are finite and strictly increasing. `n` boundaries describe
/// `n + 1` buckets; bucket `i` covers `[boundaries[i - 1], boundaries[i])`,
/// so a value equal to a boundary is counted in the bucket that starts at it.
/// No boundaries means a single bucket holding every value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BucketBoundaries {
    boundaries: Vec<f64>,
}

impl BucketBoundaries {
    /// Validate and wrap a boundary list.
    pub fn new(boundaries: Vec<f64>) -> Result<Self, StatsError> {
        for (index, bound) in boundaries.iter().enumerate() {
            if !bound.is_finite() {
                return Err(StatsError::InvalidBucketBoundaries {
                    index,
                    reason: "boundaries must be finite",
                });
            }
            if index > 0 && boundaries[index - 1] >= *bound {
                return Err(StatsError::InvalidBucketBoundaries {
                    index,
                    reason: "boundaries must be strictly increasing",
                });
            }
        }
        Ok(BucketBoundaries { boundaries })
    }

    /// A single implicit bucket covering all values.
    pub fn empty() -> Self {
        BucketBoundaries {
            boundaries: Vec::new(),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Number of histogram buckets (always `len() + 1`)
    pub fn bucket_count(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Bucket for `value`: the number of boundaries `<= value`.
    ///
    /// NaN compares false against every boundary and lands in bucket 0.
    #[inline]
    pub fn bucket_index(&self, value: f64) -> usize {
        self.boundaries.partition_point(|bound| *bound <= value)
    }
}

impl TryFrom<Vec<f64>> for BucketBoundaries {
    type Error = StatsError;

    fn try_from(boundaries: Vec<f64>) -> Result<Self, Self::Error> {
        BucketBoundaries::new(boundaries)
    }
}

impl From<BucketBoundaries> for Vec<f64> {
    fn from(bounds: BucketBoundaries) -> Self {
        bounds.boundaries
    }
}

/// Describes how to aggregate the values of one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Count,
    Mean,
    Distribution(BucketBoundaries),
}

impl Aggregation {
    /// Distribution with the given boundaries, validated.
    pub fn distribution(boundaries: Vec<f64>) -> Result<Self, StatsError> {
        Ok(Aggregation::Distribution(BucketBoundaries::new(boundaries)?))
    }

    pub fn kind(&self) -> AggregationKind {
        match self {
            Aggregation::Sum => AggregationKind::Sum,
            Aggregation::Count => AggregationKind::Count,
            Aggregation::Mean => AggregationKind::Mean,
            Aggregation::Distribution(_) => AggregationKind::Distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_must_increase() {
        assert!(BucketBoundaries::new(vec![0.0, 1.0, 5.0]).is_ok());
        assert_eq!(
            BucketBoundaries::new(vec![0.0, 5.0, 5.0]),
            Err(StatsError::InvalidBucketBoundaries {
                index: 2,
                reason: "boundaries must be strictly increasing",
            })
        );
        assert!(BucketBoundaries::new(vec![3.0, 1.0]).is_err());
    }

    #[test]
    fn test_boundaries_must_be_finite() {
        let err = BucketBoundaries::new(vec![0.0, f64::INFINITY]).unwrap_err();
        assert!(matches!(
            err,
            StatsError::InvalidBucketBoundaries { index: 1, .. }
        ));
        assert!(BucketBoundaries::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_bucket_index_lower_inclusive() {
        let bounds = BucketBoundaries::new(vec![0.0, 10.0]).unwrap();
        assert_eq!(bounds.bucket_count(), 3);
        assert_eq!(bounds.bucket_index(-1.0), 0);
        assert_eq!(bounds.bucket_index(0.0), 1);
        assert_eq!(bounds.bucket_index(5.0), 1);
        assert_eq!(bounds.bucket_index(10.0), 2);
        assert_eq!(bounds.bucket_index(100.0), 2);
        assert_eq!(bounds.bucket_index(f64::NAN), 0);
        assert_eq!(bounds.bucket_index(f64::NEG_INFINITY), 0);
        assert_eq!(bounds.bucket_index(f64::INFINITY), 2);
    }

    #[test]
    fn test_empty_boundaries_single_bucket() {
        let bounds = BucketBoundaries::empty();
        assert_eq!(bounds.bucket_count(), 1);
        assert_eq!(bounds.bucket_index(-1e300), 0);
        assert_eq!(bounds.bucket_index(1e300), 0);
    }

    #[test]
    fn test_aggregation_kind() {
        assert_eq!(Aggregation::Sum.kind(), AggregationKind::Sum);
        assert_eq!(Aggregation::Count.kind(), AggregationKind::Count);
        assert_eq!(Aggregation::Mean.kind(), AggregationKind::Mean);
        let dist = Aggregation::distribution(vec![1.0]).unwrap();
        assert_eq!(dist.kind(), AggregationKind::Distribution);
        assert_eq!(AggregationKind::Distribution.to_string(), "distribution");
    }

    #[test]
    fn test_deserialize_rejects_bad_boundaries() {
        let ok: BucketBoundaries = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(ok.as_slice(), &[1.0, 2.0]);
        assert!(serde_json::from_str::<BucketBoundaries>("[2.0, 1.0]").is_err());
    }
}
