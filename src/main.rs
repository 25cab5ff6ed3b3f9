//! Stats aggregation demo
//!
//! Registers a few views, records synthetic RPC traffic from several threads
//! and logs the resulting snapshots.
//!
//! Usage:
//!   STATS_LOG=debug cargo run --bin census-stats-demo

use std::sync::Arc;

use census_stats::observability::init_logging;
use census_stats::{Aggregation, StatsConfig, StatsRecorder, TagContext, View, ViewRegistry};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

const WORKERS: u64 = 4;
const RECORDS_PER_WORKER: usize = 10_000;

fn register_views(registry: &ViewRegistry) -> Result<(), Box<dyn std::error::Error>> {
    registry.register(
        View::new(
            "rpc/client/latency",
            "rpc.latency_ms",
            Aggregation::distribution(vec![0.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])?,
            &["method", "status"],
        )
        .with_description("Client RPC latency in milliseconds"),
    )?;
    registry.register(View::new(
        "rpc/client/count",
        "rpc.latency_ms",
        Aggregation::Count,
        &["method"],
    ))?;
    registry.register(View::new(
        "rpc/client/bytes",
        "rpc.bytes",
        Aggregation::Sum,
        &["method"],
    ))?;
    registry.register(View::new(
        "rpc/client/mean_bytes",
        "rpc.bytes",
        Aggregation::Mean,
        &[],
    ))?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = StatsConfig::from_env();
    config.validate()?;
    init_logging(&config).map_err(|e| e as Box<dyn std::error::Error>)?;

    let registry = Arc::new(ViewRegistry::with_config(&config)?);
    register_views(&registry)?;
    let recorder = StatsRecorder::new(registry);

    info!(workers = WORKERS, records = RECORDS_PER_WORKER, "recording synthetic traffic");

    let methods = ["Get", "Put", "List"];
    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let recorder = recorder.clone();
            std::thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(worker);
                for _ in 0..RECORDS_PER_WORKER {
                    let method = methods[rng.gen_range(0..methods.len())];
                    let status = if rng.gen_bool(0.05) { "error" } else { "ok" };
                    let tags = TagContext::from_pairs(&[("method", method), ("status", status)]);
                    recorder
                        .batch()
                        .put("rpc.latency_ms", rng.gen_range(0.0..300.0))
                        .put("rpc.bytes", rng.gen_range(64.0..4096.0_f64).floor())
                        .record(&tags);
                }
                // Nobody subscribes to this one.
                recorder.record("rpc.retries", 1.0, &TagContext::empty());
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            return Err("recording worker panicked".into());
        }
    }

    for data in recorder.all_view_data() {
        info!(
            view = %data.view.name,
            rows = data.rows.len(),
            "snapshot:\n{}",
            serde_json::to_string_pretty(&data)?
        );
    }

    Ok(())
}
