//! Reference aggregation and tolerant comparison of snapshots.
//!
//! `create_aggregation_data` builds a snapshot in one pass from raw values;
//! incremental recording must agree with it. The `assert_*` functions return
//! a `MismatchError` describing the first difference instead of panicking,
//! and refuse to compare snapshots of different kinds.

use super::aggregation::{Aggregation, AggregationKind};
use super::data::AggregationData;
use super::mutable::MutableAggregation;
use super::tags::TagTuple;
use std::collections::HashMap;

/// Why two snapshots (or two snapshot maps) differ.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchError {
    /// Expected and actual snapshots have different aggregation kinds
    KindMismatch {
        tags: Option<TagTuple>,
        expected: AggregationKind,
        actual: AggregationKind,
    },
    /// The two maps do not have the same tag tuples
    KeySetMismatch {
        missing: Vec<TagTuple>,
        unexpected: Vec<TagTuple>,
    },
    /// A field differs beyond the tolerance (or at all, for integer fields)
    ValueMismatch {
        tags: Option<TagTuple>,
        field: &'static str,
        expected: String,
        actual: String,
    },
}

impl MismatchError {
    fn at(self, key: &TagTuple) -> Self {
        match self {
            MismatchError::KindMismatch {
                expected, actual, ..
            } => MismatchError::KindMismatch {
                tags: Some(key.clone()),
                expected,
                actual,
            },
            MismatchError::ValueMismatch {
                field,
                expected,
                actual,
                ..
            } => MismatchError::ValueMismatch {
                tags: Some(key.clone()),
                field,
                expected,
                actual,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for MismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchError::KindMismatch {
                tags,
                expected,
                actual,
            } => {
                write!(f, "aggregation kind mismatch: expected {}, got {}", expected, actual)?;
                if let Some(tags) = tags {
                    write!(f, " for tags {:?}", tags)?;
                }
                Ok(())
            }
            MismatchError::KeySetMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "tag tuple sets differ: missing {:?}, unexpected {:?}",
                missing, unexpected
            ),
            MismatchError::ValueMismatch {
                tags,
                field,
                expected,
                actual,
            } => {
                write!(f, "{} mismatch: expected {}, got {}", field, expected, actual)?;
                if let Some(tags) = tags {
                    write!(f, " for tags {:?}", tags)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MismatchError {}

/// Build a snapshot by adding `values`, in order, to a fresh aggregator.
pub fn create_aggregation_data(aggregation: &Aggregation, values: &[f64]) -> AggregationData {
    let mut mutable = MutableAggregation::new(aggregation);
    for value in values {
        mutable.add(*value);
    }
    mutable.to_snapshot()
}

/// NaN matches NaN and an infinity matches the same infinity; otherwise
/// the difference must be within `tolerance`.
fn within(expected: f64, actual: f64, tolerance: f64) -> bool {
    if expected.is_nan() || actual.is_nan() {
        return expected.is_nan() && actual.is_nan();
    }
    if expected.is_infinite() || actual.is_infinite() {
        return expected == actual;
    }
    (expected - actual).abs() <= tolerance
}

fn check_f64(field: &'static str, expected: f64, actual: f64, tolerance: f64) -> Result<(), MismatchError> {
    if within(expected, actual, tolerance) {
        Ok(())
    } else {
        Err(value_mismatch(field, expected, actual))
    }
}

fn check_exact<T: PartialEq + std::fmt::Debug>(
    field: &'static str,
    expected: T,
    actual: T,
) -> Result<(), MismatchError> {
    if expected == actual {
        Ok(())
    } else {
        Err(value_mismatch(field, expected, actual))
    }
}

fn value_mismatch<T: std::fmt::Debug>(field: &'static str, expected: T, actual: T) -> MismatchError {
    MismatchError::ValueMismatch {
        tags: None,
        field,
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
    }
}

/// Compare two snapshots: floating-point fields within `tolerance`,
/// counts and bucket layout exactly.
pub fn assert_aggregation_data_equals(
    expected: &AggregationData,
    actual: &AggregationData,
    tolerance: f64,
) -> Result<(), MismatchError> {
    match (expected, actual) {
        (AggregationData::Sum(e), AggregationData::Sum(a)) => {
            check_f64("sum", e.sum, a.sum, tolerance)
        }
        (AggregationData::Count(e), AggregationData::Count(a)) => {
            check_exact("count", e.count, a.count)
        }
        (AggregationData::Mean(e), AggregationData::Mean(a)) => {
            check_exact("count", e.count, a.count)?;
            check_f64("mean", e.mean, a.mean, tolerance)
        }
        (AggregationData::Distribution(e), AggregationData::Distribution(a)) => {
            check_exact("count", e.count, a.count)?;
            check_f64("mean", e.mean, a.mean, tolerance)?;
            check_f64(
                "sum_of_squared_deviations",
                e.sum_of_squared_deviations,
                a.sum_of_squared_deviations,
                tolerance,
            )?;
            check_exact("bucket_boundaries", &e.bucket_boundaries, &a.bucket_boundaries)?;
            check_exact("bucket_counts", &e.bucket_counts, &a.bucket_counts)
        }
        _ => Err(MismatchError::KindMismatch {
            tags: None,
            expected: expected.kind(),
            actual: actual.kind(),
        }),
    }
}

/// Compare two keyed snapshot collections: identical tag tuple sets, then
/// each entry with [`assert_aggregation_data_equals`].
pub fn assert_aggregation_map_equals<S1, S2>(
    expected: &HashMap<TagTuple, AggregationData, S1>,
    actual: &HashMap<TagTuple, AggregationData, S2>,
    tolerance: f64,
) -> Result<(), MismatchError>
where
    S1: std::hash::BuildHasher,
    S2: std::hash::BuildHasher,
{
    let mut missing: Vec<TagTuple> = expected
        .keys()
        .filter(|key| !actual.contains_key(*key))
        .cloned()
        .collect();
    let mut unexpected: Vec<TagTuple> = actual
        .keys()
        .filter(|key| !expected.contains_key(*key))
        .cloned()
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        missing.sort();
        unexpected.sort();
        return Err(MismatchError::KeySetMismatch {
            missing,
            unexpected,
        });
    }

    let mut keys: Vec<&TagTuple> = expected.keys().collect();
    keys.sort();
    for key in keys {
        if let (Some(e), Some(a)) = (expected.get(key), actual.get(key)) {
            assert_aggregation_data_equals(e, a, tolerance).map_err(|err| err.at(key))?;
        }
    }
    Ok(())
}
