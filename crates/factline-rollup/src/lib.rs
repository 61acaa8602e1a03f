//! Batch rollup engine: reads one or more days of raw JSONL partitions,
//! deduplicates and aggregates them, and publishes idempotent Parquet
//! warehouse partitions. Two parameterizations — per-minute request metrics
//! and per-day service-event summaries — share the same lock and run
//! skeleton but aggregate independently.

pub mod aggregate;
pub mod error;
pub mod events;
pub mod lock;
pub mod parquet_encode;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use factline_storage::ObjectStore;

pub use aggregate::ScanStats;
pub use error::RollupError;
pub use lock::LockKind;

/// Which aggregation to run: request-fact metrics or service-event
/// summaries. Each variant owns its lock file so the two can run
/// concurrently against a shared output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupKind {
    Metrics,
    Events,
}

impl RollupKind {
    fn lock_kind(self) -> LockKind {
        match self {
            RollupKind::Metrics => LockKind::Metrics,
            RollupKind::Events => LockKind::Events,
        }
    }
}

/// Outcome of one day's rollup within a run.
#[derive(Debug, Clone)]
pub struct DayReport {
    pub day: NaiveDate,
    pub rows_written: usize,
    pub stats: ScanStats,
}

/// Runs the named rollup over an inclusive, ascending list of UTC days.
/// Acquires the exclusive output lock once for the whole invocation
/// (`Idle -> LockHeld`), then steps every day through
/// `Scanning -> Aggregating -> Writing -> Swapping`, returning to `Idle`
/// only once the lock is dropped at the end (on every exit path, including
/// error).
///
/// Errors during scanning/aggregating a single day never abort the run —
/// malformed input is logged and skipped. An error while writing or
/// swapping a day's output aborts the remaining days in this invocation;
/// the lock is still released.
pub async fn run(
    kind: RollupKind,
    store: Arc<dyn ObjectStore>,
    lock_dir: &Path,
    days: &[NaiveDate],
) -> Result<Vec<DayReport>, RollupError> {
    let _lock = lock::LockGuard::acquire(lock_dir, kind.lock_kind())?;

    let mut reports = Vec::with_capacity(days.len());
    for &day in days {
        tracing::info!(?day, kind = ?kind, "rollup day starting");
        let (rows_written, stats) = match kind {
            RollupKind::Metrics => aggregate::run_metrics_day(Arc::clone(&store), day).await?,
            RollupKind::Events => events::run_events_day(Arc::clone(&store), day).await?,
        };
        tracing::info!(
            ?day,
            rows_written,
            records_scanned = stats.records_scanned,
            malformed_skipped = stats.malformed_skipped,
            duplicates_skipped = stats.duplicates_skipped,
            "rollup day complete"
        );
        reports.push(DayReport { day, rows_written, stats });
    }

    Ok(reports)
}

/// Expands an inclusive `[start, end]` UTC day range for backfill
/// invocations.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        current = current.succ_opt().expect("date overflow in day_range");
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use factline_core::Cancellation;
    use factline_storage::OpenDalStore;
    use uuid::Uuid;

    fn store(dir: &tempfile::TempDir) -> Arc<dyn ObjectStore> {
        Arc::new(OpenDalStore::new_fs(dir.path().to_str().unwrap(), Cancellation::new()).unwrap())
    }

    fn fact_line(id: Uuid, time: &str, status: i32, latency: i64) -> String {
        format!(
            r#"{{"event_id":"{id}","event_time":"{time}","service":"api-service","method":"GET","path_template":"/users","status_code":{status},"latency_ms":{latency}}}"#
        )
    }

    #[tokio::test]
    async fn end_to_end_metrics_rollup_matches_worked_example() {
        let raw_dir = tempfile::tempdir().unwrap();
        let lock_dir = tempfile::tempdir().unwrap();
        let raw_store = store(&raw_dir);

        let lines = [
            fact_line(Uuid::now_v7(), "2025-01-15T10:30:00Z", 200, 10),
            fact_line(Uuid::now_v7(), "2025-01-15T10:30:05Z", 200, 20),
            fact_line(Uuid::now_v7(), "2025-01-15T10:30:10Z", 500, 30),
        ];
        let blob = lines.join("\n") + "\n";
        raw_store
            .put(
                "raw/request_facts/2025-01-15/10/batch_test.jsonl",
                Bytes::from(blob),
            )
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let reports = run(RollupKind::Metrics, Arc::clone(&raw_store), lock_dir.path(), &[day])
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rows_written, 1);
        assert_eq!(reports[0].stats.records_scanned, 3);

        let keys = raw_store.list("warehouse/request_metrics_minute/").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].contains("2025-01-15"));
    }

    #[tokio::test]
    async fn duplicate_event_id_counted_once() {
        let raw_dir = tempfile::tempdir().unwrap();
        let lock_dir = tempfile::tempdir().unwrap();
        let raw_store = store(&raw_dir);

        let shared_id = Uuid::now_v7();
        raw_store
            .put(
                "raw/request_facts/2025-01-15/10/batch_a.jsonl",
                Bytes::from(fact_line(shared_id, "2025-01-15T10:30:00Z", 200, 10) + "\n"),
            )
            .await
            .unwrap();
        raw_store
            .put(
                "raw/request_facts/2025-01-15/10/batch_b.jsonl",
                Bytes::from(fact_line(shared_id, "2025-01-15T10:30:00Z", 200, 10) + "\n"),
            )
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let reports = run(RollupKind::Metrics, raw_store, lock_dir.path(), &[day])
            .await
            .unwrap();

        assert_eq!(reports[0].rows_written, 1);
        assert_eq!(reports[0].stats.duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn rerun_is_idempotent_up_to_new_uuid() {
        let raw_dir = tempfile::tempdir().unwrap();
        let lock_dir = tempfile::tempdir().unwrap();
        let raw_store = store(&raw_dir);

        raw_store
            .put(
                "raw/request_facts/2025-01-15/10/batch.jsonl",
                Bytes::from(fact_line(Uuid::now_v7(), "2025-01-15T10:30:00Z", 200, 10) + "\n"),
            )
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        run(RollupKind::Metrics, Arc::clone(&raw_store), lock_dir.path(), &[day])
            .await
            .unwrap();
        run(RollupKind::Metrics, Arc::clone(&raw_store), lock_dir.path(), &[day])
            .await
            .unwrap();

        let keys = raw_store.list("warehouse/request_metrics_minute/").await.unwrap();
        assert_eq!(keys.len(), 1, "second run must replace, not duplicate, the first");
    }

    #[tokio::test]
    async fn empty_day_clears_existing_output() {
        let raw_dir = tempfile::tempdir().unwrap();
        let lock_dir = tempfile::tempdir().unwrap();
        let raw_store = store(&raw_dir);

        raw_store
            .put(
                "raw/request_facts/2025-01-15/10/batch.jsonl",
                Bytes::from(fact_line(Uuid::now_v7(), "2025-01-15T10:30:00Z", 200, 10) + "\n"),
            )
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        run(RollupKind::Metrics, Arc::clone(&raw_store), lock_dir.path(), &[day])
            .await
            .unwrap();

        raw_store
            .delete("raw/request_facts/2025-01-15/10/batch.jsonl")
            .await
            .unwrap();
        run(RollupKind::Metrics, Arc::clone(&raw_store), lock_dir.path(), &[day])
            .await
            .unwrap();

        let keys = raw_store.list("warehouse/request_metrics_minute/").await.unwrap_or_default();
        assert!(keys.is_empty());
    }

    #[test]
    fn day_range_is_inclusive_and_ascending() {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap().date_naive();
        let end = Utc.with_ymd_and_hms(2025, 1, 17, 0, 0, 0).unwrap().date_naive();
        let days = day_range(start, end);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0], start);
        assert_eq!(days[2], end);
    }
}
