pub mod config;
pub mod observability;
pub mod stats;

pub use config::{ConfigError, StatsConfig};
pub use stats::{
    Aggregation, AggregationData, AggregationKind, AggregationMap, StatsError, StatsRecorder,
    TagContext, TagValue, View, ViewData, ViewRegistry,
};
