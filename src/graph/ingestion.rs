//! Edge ingestion - async channel consumer for observed transitions
//!
//! Main loop:
//! 1. Receives `EdgeObservation`s from upstream segmentation via mpsc channel
//! 2. Routes each one by `(from, to, motion)` hash to one of `max_in_flight` shard workers
//! 3. Logs throughput and queue depth every 10 seconds
//!
//! A shard worker folds its queue one observation at a time, so every
//! observation of a triple is folded in the order it left the channel.
//! Elevation extrema and `updated_at` depend on that order. Different
//! triples hashed to different shards fold in parallel.

use super::aggregator::EdgeAggregator;
use super::error::GraphResult;
use super::types::{AggregatedEdge, EdgeKey, EdgeObservation};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

const THROUGHPUT_LOG_INTERVAL: Duration = Duration::from_secs(10);
const SHARD_BUFFER: usize = 64;

/// Outcome counts for one ingestion run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Observations folded and persisted
    pub folded: u64,
    /// Observations dropped as invalid
    pub rejected: u64,
    /// Observations lost to storage faults or worker panics
    pub failed: u64,
}

impl IngestionStats {
    pub fn total(&self) -> u64 {
        self.folded + self.rejected + self.failed
    }
}

/// Live counters shared by the shard workers
#[derive(Default)]
struct Counters {
    folded: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn absorb(&self, key: EdgeKey, result: GraphResult<AggregatedEdge>) {
        match result {
            Ok(_) => {
                self.folded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_invalid_observation() => {
                log::warn!("⚠️  Rejected observation for {}: {}", key, e);
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::error!("❌ Failed to fold observation for {}: {}", key, e);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> IngestionStats {
        IngestionStats {
            folded: self.folded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn shard_for(key: &EdgeKey, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn run_shard(
    shard: usize,
    mut rx: mpsc::Receiver<EdgeObservation>,
    aggregator: Arc<EdgeAggregator>,
    counters: Arc<Counters>,
) {
    while let Some(observation) = rx.recv().await {
        let key = observation.key();
        counters.absorb(key, aggregator.upsert_observation(observation).await);
    }
    log::debug!("🔄 Shard {} drained", shard);
}

/// Start edge ingestion from the observation channel
///
/// Runs until the channel is closed (every sender dropped), then waits for
/// every shard to fold what it has queued before returning.
pub async fn start_edge_ingestion(
    mut rx: mpsc::Receiver<EdgeObservation>,
    aggregator: Arc<EdgeAggregator>,
    max_in_flight: usize,
) -> IngestionStats {
    let shard_count = max_in_flight.max(1);

    log::info!("🚀 Starting edge ingestion");
    log::info!("   ├─ Shard workers: {}", shard_count);
    log::info!("   └─ Waiting for observations...");

    let counters = Arc::new(Counters::default());
    let mut shards: Vec<mpsc::Sender<EdgeObservation>> = Vec::with_capacity(shard_count);
    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(shard_count);

    for shard in 0..shard_count {
        let (tx, shard_rx) = mpsc::channel(SHARD_BUFFER);
        shards.push(tx);
        workers.push(tokio::spawn(run_shard(
            shard,
            shard_rx,
            aggregator.clone(),
            counters.clone(),
        )));
    }

    let mut received = 0u64;

    let mut throughput_timer = interval(THROUGHPUT_LOG_INTERVAL);
    throughput_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    throughput_timer.tick().await;

    let mut window_count = 0u64;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            incoming = rx.recv() => {
                let Some(observation) = incoming else {
                    log::warn!("⚠️  Observation channel closed, stopping ingestion");
                    break;
                };
                received += 1;
                window_count += 1;

                let shard = shard_for(&observation.key(), shard_count);
                // Awaiting a full shard applies backpressure to the upstream channel
                if let Err(e) = shards[shard].send(observation).await {
                    log::error!("❌ Shard {} stopped, dropping observation for {}", shard, e.0.key());
                }
            }

            _ = throughput_timer.tick() => {
                let elapsed = window_start.elapsed().as_secs_f64();
                if window_count > 0 && elapsed > 0.0 {
                    let stats = counters.snapshot();
                    let queued: usize = shards.iter().map(|tx| SHARD_BUFFER - tx.capacity()).sum();
                    log::info!(
                        "📊 Ingestion rate: {:.1} obs/sec | folded: {} rejected: {} failed: {} | queued: {} | channel: {}",
                        window_count as f64 / elapsed,
                        stats.folded,
                        stats.rejected,
                        stats.failed,
                        queued,
                        rx.len()
                    );
                }
                window_count = 0;
                window_start = Instant::now();
            }
        }
    }

    // Closing the shard queues lets each worker finish its backlog and exit
    drop(shards);
    for (shard, worker) in workers.into_iter().enumerate() {
        if let Err(e) = worker.await {
            log::error!("❌ Shard {} aborted: {}", shard, e);
        }
    }

    let mut stats = counters.snapshot();
    let lost = received.saturating_sub(stats.total());
    if lost > 0 {
        log::error!("❌ {} observations lost to stopped shards", lost);
        stats.failed += lost;
    }

    log::info!(
        "✅ Edge ingestion stopped (folded: {}, rejected: {}, failed: {})",
        stats.folded,
        stats.rejected,
        stats.failed
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::aggregator::tests::FlakyStore;
    use crate::graph::edge_store::{EdgeStore, MemoryEdgeStore};
    use crate::graph::types::MotionType;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn observation(from: i64, to: i64, delta_time: f64, secs: i64) -> EdgeObservation {
        EdgeObservation {
            from,
            to,
            motion: MotionType::Walking,
            delta_time,
            delta_distance: 10.0,
            delta_elevation: Some(0.5),
            observed_at: at(secs),
        }
    }

    #[tokio::test]
    async fn test_ingestion_folds_every_message() {
        let store = Arc::new(MemoryEdgeStore::new());
        let aggregator = Arc::new(EdgeAggregator::new(store.clone()));
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(start_edge_ingestion(rx, aggregator, 4));

        for i in 0..20 {
            tx.send(observation(1, 2, 1.0, 1_000 + i)).await.unwrap();
        }
        tx.send(observation(2, 3, 5.0, 2_000)).await.unwrap();
        tx.send(observation(2, 3, -5.0, 2_001)).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            IngestionStats {
                folded: 21,
                rejected: 1,
                failed: 0
            }
        );
        assert_eq!(stats.total(), 22);

        let edge = store
            .load(&EdgeKey::new(1, 2, MotionType::Walking))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.traverse_count, 20);
        assert_eq!(edge.sum_time, 20.0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingestion_counts_storage_failures() {
        let store = Arc::new(FlakyStore::default());
        store.fail_saves.store(true, Ordering::SeqCst);
        let aggregator = Arc::new(EdgeAggregator::new(store.clone()));
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(start_edge_ingestion(rx, aggregator, 2));
        for i in 0..3 {
            tx.send(observation(1, 2, 1.0, i)).await.unwrap();
        }
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.folded, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingestion_returns_on_empty_closed_channel() {
        let aggregator = Arc::new(EdgeAggregator::new(Arc::new(MemoryEdgeStore::new())));
        let (tx, rx) = mpsc::channel::<EdgeObservation>(1);
        drop(tx);

        let stats = start_edge_ingestion(rx, aggregator, 0).await;
        assert_eq!(stats, IngestionStats::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_triple_folds_in_channel_order() {
        let key = EdgeKey::new(4, 5, MotionType::Cycling);

        // Alternating climbs and drops make the cumulative extrema order-sensitive,
        // and a permuted clock makes updated_at order-sensitive too
        let observations: Vec<EdgeObservation> = (0..200i64)
            .map(|i| EdgeObservation {
                from: key.from,
                to: key.to,
                motion: key.motion,
                delta_time: 1.0 + (i % 5) as f64,
                delta_distance: 10.0,
                delta_elevation: Some(if i % 2 == 0 { 7.0 } else { -9.0 }),
                observed_at: at(1_000 + (i * 37) % 200),
            })
            .collect();

        let mut reference = AggregatedEdge::seed(key, observations[0].observed_at);
        for observation in &observations {
            reference.fold(observation);
        }

        for _ in 0..10 {
            let store = Arc::new(MemoryEdgeStore::new());
            let aggregator = Arc::new(EdgeAggregator::new(store.clone()));
            let (tx, rx) = mpsc::channel(256);

            let handle = tokio::spawn(start_edge_ingestion(rx, aggregator, 64));
            for observation in &observations {
                tx.send(*observation).await.unwrap();
            }
            drop(tx);

            let stats = handle.await.unwrap();
            assert_eq!(stats.folded, 200);

            let edge = store.load(&key).await.unwrap().unwrap();
            assert_eq!(edge.elevation, reference.elevation);
            assert_eq!(edge.updated_at, reference.updated_at);
            assert_eq!(edge.updated_at, observations[199].observed_at);
            assert_eq!(edge, reference);
        }
    }

    #[test]
    fn test_shard_routing_is_stable() {
        let key = EdgeKey::new(1, 2, MotionType::Walking);
        let shard = shard_for(&key, 8);

        assert!(shard < 8);
        assert_eq!(shard_for(&key, 8), shard);
        assert_eq!(shard_for(&key, 1), 0);
    }
}
