//! Stats Aggregation Module
//!
//! Folds tagged measurements into per-view, per-tag-tuple aggregates:
//!
//! - **Aggregation descriptors** choose sum, count, mean or a bucketed distribution
//! - **Aggregators** hold the running state for one tag tuple behind their own lock
//! - **Aggregation maps** shard the tuple -> aggregator table so unrelated tuples don't contend
//! - **The recorder** routes a measurement to every view subscribed to it
//! - **Snapshots** are detached copies that exporters can keep while recording continues

mod aggregation;
mod aggregation_map;
mod data;
mod error;
mod mutable;
mod recorder;
mod tags;
mod view;

pub mod conformance;
pub mod dst;

pub use aggregation::{Aggregation, AggregationKind, BucketBoundaries};
pub use aggregation_map::{AggregationMap, DEFAULT_SHARD_COUNT};
pub use data::{AggregationData, CountData, DistributionData, MeanData, SumData};
pub use error::StatsError;
pub use mutable::{Aggregator, DistributionState, MutableAggregation};
pub use recorder::{MeasureBatch, StatsRecorder};
pub use tags::{TagContext, TagTuple, TagValue};
pub use view::{RegisteredView, View, ViewData, ViewRegistry};
