//! Recording pipeline: measurement + tag context -> aggregators.
//!
//! Recording never fails and never blocks on I/O. A measurement nobody
//! subscribes to is dropped silently.

use super::tags::TagContext;
use super::view::{ViewData, ViewRegistry};
use std::sync::Arc;
use tracing::trace;

/// Entry point for instrumented code.
#[derive(Debug, Clone)]
pub struct StatsRecorder {
    registry: Arc<ViewRegistry>,
}

impl StatsRecorder {
    pub fn new(registry: Arc<ViewRegistry>) -> Self {
        StatsRecorder { registry }
    }

    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }

    /// Record `value` for `measure` into every view subscribed to it.
    #[inline]
    pub fn record(&self, measure: &str, value: f64, tags: &TagContext) {
        let views = self
            .registry
            .for_each_subscriber(measure, |view| view.record(value, tags));
        if views == 0 {
            trace!(measure, "no view subscribed to measure; dropping value");
        }
    }

    /// Start a batch of measurements sharing one tag context.
    pub fn batch(&self) -> MeasureBatch<'_> {
        MeasureBatch {
            recorder: self,
            values: Vec::new(),
        }
    }

    /// Snapshot of one view, or `None` if no such view is registered.
    pub fn view_data(&self, view_name: &str) -> Option<ViewData> {
        self.registry.get(view_name).map(|view| view.snapshot())
    }

    /// Snapshots of every registered view, ordered by view name.
    pub fn all_view_data(&self) -> Vec<ViewData> {
        self.registry
            .view_names()
            .iter()
            .filter_map(|name| self.view_data(name))
            .collect()
    }
}

/// Measurements collected for a single `record` call.
#[derive(Debug)]
pub struct MeasureBatch<'a> {
    recorder: &'a StatsRecorder,
    values: Vec<(String, f64)>,
}

impl MeasureBatch<'_> {
    pub fn put(mut self, measure: impl Into<String>, value: f64) -> Self {
        self.values.push((measure.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Record every measurement, in insertion order, under `tags`.
    pub fn record(self, tags: &TagContext) {
        for (measure, value) in &self.values {
            self.recorder.record(measure, *value, tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregation::Aggregation;
    use crate::stats::data::{AggregationData, CountData, SumData};
    use crate::stats::tags::TagValue;
    use crate::stats::view::View;

    fn recorder() -> StatsRecorder {
        let registry = Arc::new(ViewRegistry::new());
        registry
            .register(View::new("bytes/sum", "bytes", Aggregation::Sum, &["route"]))
            .unwrap();
        registry
            .register(View::new("bytes/count", "bytes", Aggregation::Count, &[]))
            .unwrap();
        StatsRecorder::new(registry)
    }

    #[test]
    fn test_record_fans_out_to_all_views() {
        let recorder = recorder();
        let tags = TagContext::from_pairs(&[("route", "/a")]);
        recorder.record("bytes", 10.0, &tags);
        recorder.record("bytes", 5.0, &tags);
        recorder.record("bytes", 1.0, &TagContext::empty());

        let sum = recorder.view_data("bytes/sum").unwrap();
        assert_eq!(
            sum.rows[&vec![TagValue::new("/a")]],
            AggregationData::Sum(SumData { sum: 15.0 })
        );
        assert_eq!(
            sum.rows[&vec![TagValue::UNKNOWN]],
            AggregationData::Sum(SumData { sum: 1.0 })
        );

        let count = recorder.view_data("bytes/count").unwrap();
        assert_eq!(count.rows.len(), 1);
        assert_eq!(
            count.rows[&Vec::<TagValue>::new()],
            AggregationData::Count(CountData { count: 3 })
        );
    }

    #[test]
    fn test_unknown_measure_is_noop() {
        let recorder = recorder();
        recorder.record("nonexistent.metric", 5.0, &TagContext::empty());
        for data in recorder.all_view_data() {
            assert!(data.rows.is_empty());
        }
        assert!(recorder.view_data("nonexistent.view").is_none());
    }

    #[test]
    fn test_batch_records_each_measure() {
        let recorder = recorder();
        let batch = recorder.batch().put("bytes", 2.0).put("bytes", 3.0).put("other", 1.0);
        assert_eq!(batch.len(), 3);
        batch.record(&TagContext::from_pairs(&[("route", "/b")]));

        let sum = recorder.view_data("bytes/sum").unwrap();
        assert_eq!(
            sum.rows[&vec![TagValue::new("/b")]],
            AggregationData::Sum(SumData { sum: 5.0 })
        );
    }
}
