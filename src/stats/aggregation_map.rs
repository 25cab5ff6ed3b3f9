//! Tag tuple -> aggregator table for one view.
//!
//! The table is split into cache-padded shards, each behind its own
//! `RwLock`. Recording a value for an existing tuple takes only a shared lock
//! on one shard plus the aggregator's own mutex, so unrelated tuples do not
//! serialize against each other. A first-time tuple takes the shard's write
//! lock and goes through `entry`, which guarantees a single aggregator per
//! tuple even when several threads race to create it.

use super::aggregation::Aggregation;
use super::data::AggregationData;
use super::mutable::Aggregator;
use super::tags::{TagTuple, TagValue};
use crate::config::MAX_SHARD_COUNT;
use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Shard = HashMap<TagTuple, Arc<Aggregator>, ahash::RandomState>;

/// Default shard count; must be a power of two
pub const DEFAULT_SHARD_COUNT: usize = 16;

pub struct AggregationMap {
    aggregation: Aggregation,
    shards: Box<[CachePadded<RwLock<Shard>>]>,
    router: ahash::RandomState,
}

impl AggregationMap {
    pub fn new(aggregation: Aggregation) -> Self {
        Self::with_shards(aggregation, DEFAULT_SHARD_COUNT, 0)
    }

    /// Create a map with `shard_count` shards (clamped to
    /// `1..=MAX_SHARD_COUNT`, rounded up to a power of two) each pre-sized for
    /// `shard_capacity` tuples.
    pub fn with_shards(aggregation: Aggregation, shard_count: usize, shard_capacity: usize) -> Self {
        let shard_count = shard_count.clamp(1, MAX_SHARD_COUNT).next_power_of_two();
        debug!(
            aggregation = %aggregation.kind(),
            shards = shard_count,
            shard_capacity,
            "created aggregation map"
        );
        let shards = (0..shard_count)
            .map(|_| {
                CachePadded::new(RwLock::new(HashMap::with_capacity_and_hasher(
                    shard_capacity,
                    ahash::RandomState::new(),
                )))
            })
            .collect();
        AggregationMap {
            aggregation,
            shards,
            router: ahash::RandomState::new(),
        }
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, tags: &[TagValue]) -> &RwLock<Shard> {
        let idx = (self.router.hash_one(tags) as usize) & (self.shards.len() - 1);
        debug_assert!(idx < self.shards.len(), "Hash produced invalid shard index");
        &self.shards[idx]
    }

    /// Return the aggregator for `tags`, creating it on first use.
    pub fn get_or_create(&self, tags: &[TagValue]) -> Arc<Aggregator> {
        let shard = self.shard_for(tags);
        if let Some(existing) = shard.read().get(tags) {
            return existing.clone();
        }
        shard
            .write()
            .entry(tags.to_vec())
            .or_insert_with(|| Arc::new(Aggregator::new(&self.aggregation)))
            .clone()
    }

    /// Add `value` to the aggregator for `tags`.
    ///
    /// Hits stay under the shard's read lock, skipping the `Arc` round trip
    /// of `get_or_create`.
    #[inline]
    pub fn record(&self, tags: &[TagValue], value: f64) {
        let shard = self.shard_for(tags);
        if let Some(existing) = shard.read().get(tags) {
            existing.add(value);
            return;
        }
        self.get_or_create(tags).add(value);
    }

    /// Snapshot every tuple.
    ///
    /// Shards are visited one at a time and each entry is copied under its
    /// own lock, so entries are individually consistent but not taken at one
    /// common instant.
    pub fn snapshot_all(&self) -> HashMap<TagTuple, AggregationData> {
        let mut out = HashMap::with_capacity(self.len());
        for shard in self.shards.iter() {
            let shard = shard.read();
            for (tags, aggregator) in shard.iter() {
                out.insert(tags.clone(), aggregator.snapshot());
            }
        }
        out
    }

    /// Snapshot of a single tuple, if it has been recorded
    pub fn snapshot(&self, tags: &[TagValue]) -> Option<AggregationData> {
        self.shard_for(tags)
            .read()
            .get(tags)
            .map(|aggregator| aggregator.snapshot())
    }

    /// Number of distinct tuples seen so far
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

impl std::fmt::Debug for AggregationMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationMap")
            .field("aggregation", &self.aggregation)
            .field("shards", &self.shards.len())
            .field("tuples", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::data::{CountData, SumData};

    fn tuple(values: &[&str]) -> TagTuple {
        values.iter().map(|v| TagValue::new(*v)).collect()
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let map = AggregationMap::new(Aggregation::Sum);
        let a = map.get_or_create(&tuple(&["GET", "200"]));
        let b = map.get_or_create(&tuple(&["GET", "200"]));
        let c = map.get_or_create(&tuple(&["GET", "500"]));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_record_and_snapshot_all() {
        let map = AggregationMap::new(Aggregation::Sum);
        map.record(&tuple(&["a"]), 1.0);
        map.record(&tuple(&["a"]), 2.5);
        map.record(&tuple(&["b"]), -1.0);
        map.record(&[TagValue::UNKNOWN], 4.0);

        let all = map.snapshot_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&tuple(&["a"])], AggregationData::Sum(SumData { sum: 3.5 }));
        assert_eq!(all[&tuple(&["b"])], AggregationData::Sum(SumData { sum: -1.0 }));
        assert_eq!(
            all[&vec![TagValue::UNKNOWN]],
            AggregationData::Sum(SumData { sum: 4.0 })
        );
        assert!(map.snapshot(&tuple(&["c"])).is_none());
    }

    #[test]
    fn test_shard_count_rounds_to_power_of_two() {
        assert_eq!(AggregationMap::with_shards(Aggregation::Count, 0, 0).shard_count(), 1);
        assert_eq!(AggregationMap::with_shards(Aggregation::Count, 5, 0).shard_count(), 8);
        assert_eq!(AggregationMap::with_shards(Aggregation::Count, 16, 4).shard_count(), 16);
        assert_eq!(
            AggregationMap::with_shards(Aggregation::Count, 5_000, 0).shard_count(),
            MAX_SHARD_COUNT
        );
        assert_eq!(
            AggregationMap::with_shards(Aggregation::Count, usize::MAX / 2 + 2, 0).shard_count(),
            MAX_SHARD_COUNT
        );
    }

    #[test]
    fn test_snapshot_is_detached() {
        let map = AggregationMap::new(Aggregation::Count);
        map.record(&tuple(&["x"]), 1.0);
        let before = map.snapshot_all();
        map.record(&tuple(&["x"]), 1.0);
        assert_eq!(before[&tuple(&["x"])], AggregationData::Count(CountData { count: 1 }));
        assert_eq!(
            map.snapshot(&tuple(&["x"])),
            Some(AggregationData::Count(CountData { count: 2 }))
        );
    }

    #[test]
    fn test_concurrent_first_access_creates_one_aggregator() {
        let map = Arc::new(AggregationMap::with_shards(Aggregation::Count, 4, 0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        let idx = (i % 10).to_string();
                        map.record(&tuple(&["shared", idx.as_str()]), 1.0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let all = map.snapshot_all();
        assert_eq!(all.len(), 10);
        for data in all.values() {
            assert_eq!(data, &AggregationData::Count(CountData { count: 800 }));
        }
    }
}
