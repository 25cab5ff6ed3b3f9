//! Deterministic Simulation Testing for the aggregation engine
//!
//! Shadow-state harness that enables:
//! - Seeded generation of descriptors, tag tuples and values
//! - Incremental recording checked against the one-pass reference
//! - Invariant checking (bucket counts sum to count)
//! - Cross-tuple reordering checks
//! - Optional multi-threaded recording
//!
//! ## Design
//!
//! ```text
//! for seed in 0..100 {
//!     let mut harness = AggregationDSTHarness::new(AggregationDSTConfig::calm(seed));
//!     harness.run(500);
//!     harness.check_equivalence();
//!     harness.check_reordering();
//!     assert!(harness.result().is_success(), "seed {}", seed);
//! }
//! ```

use super::aggregation::{Aggregation, BucketBoundaries};
use super::aggregation_map::AggregationMap;
use super::conformance::{assert_aggregation_map_equals, create_aggregation_data};
use super::data::AggregationData;
use super::tags::{TagTuple, TagValue};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Smallest value range that leaves room for distinct bucket boundaries
const MIN_VALUE_RANGE: f64 = 4.0;
/// Largest value range whose span stays finite
const MAX_VALUE_RANGE: f64 = 1e12;

/// Configuration for aggregation DST
#[derive(Debug, Clone)]
pub struct AggregationDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct tag tuples values are spread over
    pub num_tuples: usize,
    /// Recording threads (1 = sequential, bit-exact comparison)
    pub threads: usize,
    /// Probability a value is drawn exactly from a bucket boundary
    pub boundary_hit_prob: f64,
    /// Values are drawn from `[-value_range, value_range)`
    pub value_range: f64,
}

impl Default for AggregationDSTConfig {
    fn default() -> Self {
        AggregationDSTConfig {
            seed: 0,
            num_tuples: 8,
            threads: 1,
            boundary_hit_prob: 0.0,
            value_range: 100.0,
        }
    }
}

impl AggregationDSTConfig {
    pub fn new(seed: u64) -> Self {
        AggregationDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm mode - sequential recording, plain values
    pub fn calm(seed: u64) -> Self {
        AggregationDSTConfig {
            seed,
            num_tuples: 8,
            threads: 1,
            boundary_hit_prob: 0.0,
            value_range: 100.0,
        }
    }

    /// Edge mode - many values land exactly on bucket boundaries
    pub fn edge(seed: u64) -> Self {
        AggregationDSTConfig {
            seed,
            num_tuples: 4,
            threads: 1,
            boundary_hit_prob: 0.4,
            value_range: 1_000.0,
        }
    }

    /// Concurrent mode - several threads record into the same map
    pub fn concurrent(seed: u64) -> Self {
        AggregationDSTConfig {
            seed,
            num_tuples: 3,
            threads: 4,
            boundary_hit_prob: 0.1,
            value_range: 100.0,
        }
    }

    /// Pull the generator knobs into ranges the RNG accepts.
    fn clamp(&mut self) {
        self.boundary_hit_prob = if self.boundary_hit_prob.is_nan() {
            0.0
        } else {
            self.boundary_hit_prob.clamp(0.0, 1.0)
        };
        self.value_range = if self.value_range.is_finite() {
            self.value_range.clamp(MIN_VALUE_RANGE, MAX_VALUE_RANGE)
        } else {
            AggregationDSTConfig::default().value_range
        };
    }

    /// Comparison tolerance: exact when the application order is fixed
    fn tolerance(&self) -> f64 {
        if self.threads > 1 {
            1e-4
        } else {
            0.0
        }
    }
}

/// Result of an aggregation DST run
#[derive(Debug, Clone)]
pub struct AggregationDSTResult {
    pub seed: u64,
    pub aggregation: Option<Aggregation>,
    pub total_operations: u64,
    pub tuples_seen: usize,
    pub invariant_violations: Vec<String>,
}

impl AggregationDSTResult {
    pub fn new(seed: u64) -> Self {
        AggregationDSTResult {
            seed,
            aggregation: None,
            total_operations: 0,
            tuples_seen: 0,
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        let kind = self
            .aggregation
            .as_ref()
            .map(|agg| agg.kind().as_str())
            .unwrap_or("none");
        format!(
            "Seed {}: {} {} ops over {} tuples, {} violations",
            self.seed,
            self.total_operations,
            kind,
            self.tuples_seen,
            self.invariant_violations.len()
        )
    }
}

/// DST harness driving one `AggregationMap`
pub struct AggregationDSTHarness {
    config: AggregationDSTConfig,
    rng: ChaCha8Rng,
    aggregation: Aggregation,
    tuples: Vec<TagTuple>,
    map: AggregationMap,
    /// Operations in generation order
    log: Vec<(usize, f64)>,
    result: AggregationDSTResult,
}

impl AggregationDSTHarness {
    pub fn new(mut config: AggregationDSTConfig) -> Self {
        config.clamp();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let aggregation = random_aggregation(&mut rng, config.value_range);
        let tuples = (0..config.num_tuples.max(1))
            .map(|i| vec![TagValue::new(format!("t{}", i)), TagValue::UNKNOWN])
            .collect();
        let map = AggregationMap::with_shards(aggregation.clone(), 4, 0);

        let mut result = AggregationDSTResult::new(config.seed);
        result.aggregation = Some(aggregation.clone());

        AggregationDSTHarness {
            config,
            rng,
            aggregation,
            tuples,
            map,
            log: Vec::new(),
            result,
        }
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    fn next_value(&mut self) -> f64 {
        if let Aggregation::Distribution(bounds) = &self.aggregation {
            if !bounds.is_empty() && self.rng.gen_bool(self.config.boundary_hit_prob) {
                if let Some(bound) = bounds.as_slice().choose(&mut self.rng) {
                    return *bound;
                }
            }
        }
        let range = self.config.value_range;
        self.rng.gen_range(-range..range)
    }

    /// Generate `operations` random (tuple, value) pairs and record them.
    pub fn run(&mut self, operations: usize) {
        let start = self.log.len();
        for _ in 0..operations {
            let tuple = self.rng.gen_range(0..self.tuples.len());
            let value = self.next_value();
            self.log.push((tuple, value));
        }
        let batch = &self.log[start..];

        if self.config.threads <= 1 {
            for (tuple, value) in batch {
                self.map.record(&self.tuples[*tuple], *value);
            }
        } else {
            let chunk = batch.len().div_ceil(self.config.threads).max(1);
            let map = &self.map;
            let tuples = &self.tuples;
            let joined = crossbeam::thread::scope(|scope| {
                for ops in batch.chunks(chunk) {
                    scope.spawn(move |_| {
                        for (tuple, value) in ops {
                            map.record(&tuples[*tuple], *value);
                        }
                    });
                }
            });
            if joined.is_err() {
                self.result
                    .invariant_violations
                    .push("recording thread panicked".to_string());
            }
        }

        self.result.total_operations += operations as u64;
        self.result.tuples_seen = self.map.len();
    }

    /// Values recorded per tuple, in generation order
    fn shadow(&self, order: &[(usize, f64)]) -> HashMap<TagTuple, Vec<f64>> {
        let mut shadow: HashMap<TagTuple, Vec<f64>> = HashMap::new();
        for (tuple, value) in order {
            shadow
                .entry(self.tuples[*tuple].clone())
                .or_default()
                .push(*value);
        }
        shadow
    }

    fn reference(&self, order: &[(usize, f64)]) -> HashMap<TagTuple, AggregationData> {
        self.shadow(order)
            .into_iter()
            .map(|(tags, values)| {
                let data = create_aggregation_data(&self.aggregation, &values);
                (tags, data)
            })
            .collect()
    }

    /// Incremental state must equal the one-pass reference, and every
    /// distribution must keep its bucket counts in step with its count.
    pub fn check_equivalence(&mut self) {
        let actual = self.map.snapshot_all();
        let expected = self.reference(&self.log);

        if let Err(err) = assert_aggregation_map_equals(&expected, &actual, self.config.tolerance()) {
            self.result
                .invariant_violations
                .push(format!("incremental != reference: {}", err));
        }

        for (tags, data) in &actual {
            if let AggregationData::Distribution(dist) = data {
                let bucket_total: i64 = dist.bucket_counts.iter().sum();
                if bucket_total != dist.count {
                    self.result.invariant_violations.push(format!(
                        "tuple {:?}: bucket counts sum to {} but count is {}",
                        tags, bucket_total, dist.count
                    ));
                }
            }
        }
    }

    /// Replaying the log with tuples interleaved differently, but each
    /// tuple's own values in the same order, must give identical results.
    pub fn check_reordering(&mut self) {
        let mut order: Vec<usize> = (0..self.tuples.len()).collect();
        order.shuffle(&mut self.rng);

        let replay = AggregationMap::with_shards(self.aggregation.clone(), 2, 0);
        for tuple in order {
            for (_, value) in self.log.iter().filter(|(t, _)| *t == tuple) {
                replay.record(&self.tuples[tuple], *value);
            }
        }

        let tolerance = self.config.tolerance();
        let original = if self.config.threads > 1 {
            self.reference(&self.log)
        } else {
            self.map.snapshot_all()
        };
        if let Err(err) = assert_aggregation_map_equals(&original, &replay.snapshot_all(), tolerance) {
            self.result
                .invariant_violations
                .push(format!("cross-tuple reordering changed results: {}", err));
        }
    }

    pub fn result(&self) -> &AggregationDSTResult {
        &self.result
    }

    pub fn into_result(self) -> AggregationDSTResult {
        self.result
    }
}

/// Pick an aggregation, with strictly increasing boundaries for distributions.
fn random_aggregation(rng: &mut ChaCha8Rng, value_range: f64) -> Aggregation {
    match rng.gen_range(0..4) {
        0 => Aggregation::Sum,
        1 => Aggregation::Count,
        2 => Aggregation::Mean,
        _ => {
            let num_bounds = rng.gen_range(0..6);
            let mut bound = -value_range;
            let mut bounds = Vec::with_capacity(num_bounds);
            for _ in 0..num_bounds {
                bound += rng.gen_range(1.0..value_range / 2.0).floor();
                bounds.push(bound);
            }
            // Strictly increasing by construction; fall back to a single bucket otherwise.
            Aggregation::Distribution(BucketBoundaries::new(bounds).unwrap_or_default())
        }
    }
}

/// Run a batch of aggregation DST tests
pub fn run_aggregation_batch(
    base_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: impl Fn(u64) -> AggregationDSTConfig,
) -> Vec<AggregationDSTResult> {
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let seed = base_seed + i as u64;
        let mut harness = AggregationDSTHarness::new(config_fn(seed));
        harness.run(ops_per_run);
        harness.check_equivalence();
        harness.check_reordering();
        results.push(harness.into_result());
    }

    results
}

/// Summarize batch results
pub fn summarize_batch(results: &[AggregationDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!("Batch: {}/{} passed, {} total ops", passed, total, total_ops);

    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }

    summary
}
