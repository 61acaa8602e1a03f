use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use factline_core::validate::validate_service_event;
use factline_core::ServiceEvent;
use factline_storage::{ObjectStore, StorageError};
use uuid::Uuid;

use crate::aggregate::ScanStats;
use crate::error::RollupError;
use crate::parquet_encode;

/// One finalized row of `warehouse/service_events_daily`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsRow {
    pub event_day: String,
    pub service: String,
    pub event_type: String,
    pub event_count: i64,
}

async fn list_day_blobs(store: &dyn ObjectStore, day: NaiveDate) -> Vec<String> {
    let day_str = day.format("%Y-%m-%d").to_string();
    let mut keys = Vec::new();
    for hour in 0..24u32 {
        let prefix = format!("raw/service_events/{day_str}/{hour:02}/");
        match store.list(&prefix).await {
            Ok(found) => keys.extend(found.into_iter().filter(|k| k.ends_with(".jsonl"))),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "failed to list raw partition hour, skipping");
            }
        }
    }
    keys
}

pub async fn scan_and_aggregate_day(
    store: &dyn ObjectStore,
    day: NaiveDate,
) -> (Vec<EventsRow>, ScanStats) {
    let day_str = day.format("%Y-%m-%d").to_string();
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut groups: HashMap<(String, String), i64> = HashMap::new();
    let mut stats = ScanStats::default();

    for key in list_day_blobs(store, day).await {
        let bytes = match store.get(&key).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "could not read raw blob, skipping");
                continue;
            }
        };

        for line in bytes.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            stats.records_scanned += 1;

            let event: ServiceEvent = match serde_json::from_slice(line) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "malformed service event line, skipping");
                    stats.malformed_skipped += 1;
                    continue;
                }
            };
            if let Err(e) = validate_service_event(&event) {
                tracing::warn!(key = %key, error = %e, "invalid service event, skipping");
                stats.malformed_skipped += 1;
                continue;
            }
            if !seen.insert(event.event_id) {
                stats.duplicates_skipped += 1;
                continue;
            }
            if event.event_time.date_naive() != day {
                continue;
            }

            *groups.entry((event.service.clone(), event.event_type.clone())).or_insert(0) += 1;
        }
    }

    let mut rows: Vec<EventsRow> = groups
        .into_iter()
        .map(|((service, event_type), event_count)| EventsRow {
            event_day: day_str.clone(),
            service,
            event_type,
            event_count,
        })
        .collect();
    rows.sort_by(|a, b| a.service.cmp(&b.service).then_with(|| a.event_type.cmp(&b.event_type)));

    (rows, stats)
}

pub async fn run_events_day(
    store: Arc<dyn ObjectStore>,
    day: NaiveDate,
) -> Result<(usize, ScanStats), RollupError> {
    let (rows, stats) = scan_and_aggregate_day(store.as_ref(), day).await;
    let day_str = day.format("%Y-%m-%d").to_string();
    let prefix = "warehouse/service_events_daily/";

    if rows.is_empty() {
        parquet_encode::clear_day(store.as_ref(), prefix, &day_str).await?;
        return Ok((0, stats));
    }

    let batch = parquet_encode::build_events_batch(&rows).map_err(RollupError::Encode)?;
    let bytes = parquet_encode::encode_parquet(&batch).map_err(RollupError::Encode)?;
    let new_key = format!("{prefix}events_{}_{day_str}.parquet", Uuid::new_v4());

    store.put(&new_key, bytes.into()).await?;
    parquet_encode::cleanup_old_day(store.as_ref(), prefix, &day_str, &new_key).await;

    Ok((rows.len(), stats))
}
