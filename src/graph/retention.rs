//! Periodic pruning of the observation log
//!
//! Aggregated edges are never pruned; only raw node observations age out.

use super::error::GraphResult;
use super::node_store::NodeRecorder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Delete observations captured before `now - retention`
pub async fn sweep_once(
    recorder: &dyn NodeRecorder,
    retention: Duration,
    now: DateTime<Utc>,
) -> GraphResult<u64> {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let deleted = recorder.delete_older_than(cutoff).await?;
    if deleted > 0 {
        log::info!("🧹 Pruned {} observations captured before {}", deleted, cutoff);
    } else {
        log::debug!("🧹 No observations older than {}", cutoff);
    }
    Ok(deleted)
}

/// Run `sweep_once` every `sweep_interval` until `shutdown` turns true
///
/// The first sweep runs immediately. Failed sweeps are logged and retried on
/// the next tick.
pub async fn start_retention_sweeper(
    recorder: Arc<dyn NodeRecorder>,
    retention: Duration,
    sweep_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("🚀 Starting retention sweeper");
    log::info!("   ├─ Retention: {}s", retention.as_secs());
    log::info!("   └─ Interval: {}ms", sweep_interval.as_millis());

    let mut timer = interval(sweep_interval.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = timer.tick() => {
                if let Err(e) = sweep_once(recorder.as_ref(), retention, Utc::now()).await {
                    log::error!("❌ Retention sweep failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender also means shutdown
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("✅ Retention sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_store::SqliteNodeRecorder;
    use crate::graph::types::MotionType;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sweep_once_uses_retention_window() {
        let dir = tempdir().unwrap();
        let recorder = SqliteNodeRecorder::open(dir.path().join("nodes.db")).unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let day = chrono::Duration::days(1);

        recorder.record(1, MotionType::Walking, now - day * 40).await.unwrap();
        recorder.record(2, MotionType::Walking, now - day * 30).await.unwrap();
        recorder.record(3, MotionType::Walking, now - day * 2).await.unwrap();

        let deleted = sweep_once(&recorder, DEFAULT_RETENTION, now).await.unwrap();
        // Exactly 30 days old is on the cutoff, so it stays
        assert_eq!(deleted, 1);
        assert_eq!(recorder.count().await.unwrap(), 2);

        assert_eq!(sweep_once(&recorder, DEFAULT_RETENTION, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_retention_deletes_nothing() {
        let dir = tempdir().unwrap();
        let recorder = SqliteNodeRecorder::open(dir.path().join("nodes.db")).unwrap();
        recorder
            .record(1, MotionType::Walking, Utc.timestamp_opt(0, 0).unwrap())
            .await
            .unwrap();

        let deleted = sweep_once(&recorder, Duration::MAX, Utc::now()).await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(SqliteNodeRecorder::open(dir.path().join("nodes.db")).unwrap());
        let old = Utc::now() - chrono::Duration::days(90);
        recorder.record(1, MotionType::Walking, old).await.unwrap();
        recorder.record(2, MotionType::Walking, Utc::now()).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(start_retention_sweeper(
            recorder.clone(),
            DEFAULT_RETENTION,
            Duration::from_millis(10),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.count().await.unwrap(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
