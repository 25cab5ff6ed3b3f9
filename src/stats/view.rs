//! Views and the registry that routes measurements to them.
//!
//! A view subscribes to one measure, groups by an ordered list of tag keys,
//! and applies one aggregation. The registry is owned by the caller and
//! injected into the recorder, so tests can build isolated registries.

use super::aggregation::Aggregation;
use super::aggregation_map::{AggregationMap, DEFAULT_SHARD_COUNT};
use super::data::AggregationData;
use super::error::StatsError;
use super::tags::{TagContext, TagTuple};
use crate::config::{ConfigError, StatsConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Definition of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Unique name (e.g., "rpc/client/latency")
    pub name: String,
    pub description: String,
    /// Measure this view consumes
    pub measure: String,
    pub aggregation: Aggregation,
    /// Tag keys to group by, in key order
    pub columns: Vec<String>,
}

impl View {
    pub fn new(
        name: impl Into<String>,
        measure: impl Into<String>,
        aggregation: Aggregation,
        columns: &[&str],
    ) -> Self {
        View {
            name: name.into(),
            description: String::new(),
            measure: measure.into(),
            aggregation,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the view's shape. Bucket boundaries are validated when the
    /// `Aggregation` is built, so only names and columns are checked here.
    pub fn validate(&self) -> Result<(), StatsError> {
        let invalid = |reason: &str| StatsError::InvalidView {
            view: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("view name must not be empty"));
        }
        if self.measure.is_empty() {
            return Err(invalid("measure name must not be empty"));
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.is_empty() {
                return Err(invalid("tag keys must not be empty"));
            }
            if !seen.insert(column.as_str()) {
                return Err(StatsError::InvalidView {
                    view: self.name.clone(),
                    reason: format!("duplicate tag key '{}'", column),
                });
            }
        }
        Ok(())
    }
}

/// A registered view and its live aggregation state.
#[derive(Debug)]
pub struct RegisteredView {
    view: View,
    map: AggregationMap,
    start: SystemTime,
}

impl RegisteredView {
    fn new(view: View, shard_count: usize, shard_capacity: usize) -> Self {
        let map = AggregationMap::with_shards(view.aggregation.clone(), shard_count, shard_capacity);
        RegisteredView {
            view,
            map,
            start: SystemTime::now(),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn aggregation_map(&self) -> &AggregationMap {
        &self.map
    }

    /// Project the context onto this view's columns and record the value.
    #[inline]
    pub fn record(&self, value: f64, tags: &TagContext) {
        let tuple = tags.project(&self.view.columns);
        self.map.record(&tuple, value);
    }

    /// Snapshot of every tuple recorded for this view.
    pub fn snapshot(&self) -> ViewData {
        let rows = self.map.snapshot_all();
        ViewData {
            view: self.view.clone(),
            rows,
            start: self.start,
            end: SystemTime::now(),
        }
    }
}

/// Exportable snapshot of one view: a cumulative window from registration
/// to the moment of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewData {
    pub view: View,
    #[serde(serialize_with = "serialize_rows")]
    pub rows: HashMap<TagTuple, AggregationData>,
    pub start: SystemTime,
    pub end: SystemTime,
}

/// Rows are keyed by tuples, which JSON-like formats cannot use as map keys.
fn serialize_rows<S>(
    rows: &HashMap<TagTuple, AggregationData>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(rows.iter())
}

/// Registry of views, indexed by name and by measure.
#[derive(Debug)]
pub struct ViewRegistry {
    inner: RwLock<RegistryInner>,
    shard_count: usize,
    shard_capacity: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<RegisteredView>, ahash::RandomState>,
    by_measure: HashMap<String, Vec<Arc<RegisteredView>>, ahash::RandomState>,
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewRegistry {
    pub fn new() -> Self {
        ViewRegistry {
            inner: RwLock::new(RegistryInner::default()),
            shard_count: DEFAULT_SHARD_COUNT,
            shard_capacity: 0,
        }
    }

    /// Registry whose aggregation maps are sized from `config`.
    ///
    /// The config is validated here so that an out-of-range shard count is
    /// reported before any view is registered.
    pub fn with_config(config: &StatsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ViewRegistry {
            inner: RwLock::new(RegistryInner::default()),
            shard_count: config.shard_count,
            shard_capacity: config.initial_shard_capacity,
        })
    }

    /// Register a view.
    ///
    /// Re-registering an identical definition is a no-op. A different
    /// definition under an existing name is rejected.
    pub fn register(&self, view: View) -> Result<(), StatsError> {
        view.validate()?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_name.get(&view.name) {
            if existing.view == view {
                return Ok(());
            }
            warn!(view = %view.name, "rejected conflicting view registration");
            return Err(StatsError::ViewAlreadyExists { view: view.name });
        }

        debug!(
            view = %view.name,
            measure = %view.measure,
            aggregation = %view.aggregation.kind(),
            columns = view.columns.len(),
            "registered view"
        );
        let registered = Arc::new(RegisteredView::new(
            view,
            self.shard_count,
            self.shard_capacity,
        ));
        inner
            .by_measure
            .entry(registered.view.measure.clone())
            .or_default()
            .push(registered.clone());
        inner
            .by_name
            .insert(registered.view.name.clone(), registered);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredView>> {
        self.inner.read().by_name.get(name).cloned()
    }

    /// Run `f` on every view subscribed to `measure`. Returns the number of views visited.
    #[inline]
    pub fn for_each_subscriber<F>(&self, measure: &str, mut f: F) -> usize
    where
        F: FnMut(&RegisteredView),
    {
        let inner = self.inner.read();
        match inner.by_measure.get(measure) {
            Some(views) => {
                for view in views {
                    f(view.as_ref());
                }
                views.len()
            }
            None => 0,
        }
    }

    /// Names of all registered views, sorted
    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }
}
