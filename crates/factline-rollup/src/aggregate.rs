use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use factline_core::validate::validate_request_fact;
use factline_core::RequestFact;
use factline_storage::{ObjectStore, StorageError};
use uuid::Uuid;

use crate::error::RollupError;
use crate::parquet_encode;

/// One finalized row of `warehouse/request_metrics_minute`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub bucket_start: DateTime<Utc>,
    pub service: String,
    pub method: String,
    pub path_template: String,
    pub request_count: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub event_day: String,
}

#[derive(Debug, Default)]
struct GroupAcc {
    count: i64,
    errors: i64,
    latencies: Vec<i64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub records_scanned: usize,
    pub malformed_skipped: usize,
    pub duplicates_skipped: usize,
}

/// Truncates to the start of the minute containing `t`.
fn floor_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp() - t.timestamp().rem_euclid(60);
    Utc.timestamp_opt(secs, 0).single().unwrap_or(t)
}

/// Linear-interpolation quantile over an already-sorted sample, matching the
/// spec's literal worked example: index = q * (n - 1), interpolate between
/// the floor and ceil indices.
pub fn percentile(sorted: &[i64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let idx = q * (n - 1) as f64;
            let lower = idx.floor() as usize;
            let upper = idx.ceil() as usize;
            if lower == upper {
                sorted[lower] as f64
            } else {
                let frac = idx - lower as f64;
                sorted[lower] as f64 + frac * (sorted[upper] as f64 - sorted[lower] as f64)
            }
        }
    }
}

/// Lists every `*.jsonl` key under `raw/request_facts/<day>/`, across all 24
/// hour subdirectories, tolerating hours with no data.
async fn list_day_blobs(store: &dyn ObjectStore, day: NaiveDate) -> Vec<String> {
    let day_str = day.format("%Y-%m-%d").to_string();
    let mut keys = Vec::new();
    for hour in 0..24u32 {
        let prefix = format!("raw/request_facts/{day_str}/{hour:02}/");
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

/// Runs the full scan/dedup/filter/aggregate pipeline for one UTC day of
/// request facts. Malformed lines and unreadable blobs are logged and
/// skipped; they never abort the scan.
pub async fn scan_and_aggregate_day(
    store: &dyn ObjectStore,
    day: NaiveDate,
) -> (Vec<MetricsRow>, ScanStats) {
    let day_str = day.format("%Y-%m-%d").to_string();
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut groups: HashMap<(DateTime<Utc>, String, String, String), GroupAcc> = HashMap::new();
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

            let fact: RequestFact = match serde_json::from_slice(line) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "malformed request fact line, skipping");
                    stats.malformed_skipped += 1;
                    continue;
                }
            };
            if let Err(e) = validate_request_fact(&fact) {
                tracing::warn!(key = %key, error = %e, "invalid request fact, skipping");
                stats.malformed_skipped += 1;
                continue;
            }
            if !seen.insert(fact.event_id) {
                stats.duplicates_skipped += 1;
                continue;
            }
            if fact.event_time.date_naive() != day {
                continue;
            }

            let bucket_key = (
                floor_minute(fact.event_time),
                fact.service.clone(),
                fact.method.clone(),
                fact.path_template.clone(),
            );
            let acc = groups.entry(bucket_key).or_default();
            acc.count += 1;
            if fact.status_code >= 500 {
                acc.errors += 1;
            }
            acc.latencies.push(fact.latency_ms);
        }
    }

    let mut rows: Vec<MetricsRow> = groups
        .into_iter()
        .map(|((bucket_start, service, method, path_template), acc)| {
            let mut sorted = acc.latencies;
            sorted.sort_unstable();
            MetricsRow {
                bucket_start,
                service,
                method,
                path_template,
                request_count: acc.count,
                error_count: acc.errors,
                error_rate: if acc.count == 0 {
                    0.0
                } else {
                    acc.errors as f64 / acc.count as f64
                },
                p50_latency_ms: percentile(&sorted, 0.50),
                p95_latency_ms: percentile(&sorted, 0.95),
                p99_latency_ms: percentile(&sorted, 0.99),
                event_day: day_str.clone(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.bucket_start
            .cmp(&b.bucket_start)
            .then_with(|| a.service.cmp(&b.service))
    });

    (rows, stats)
}

/// Full per-day metrics rollup: scan, aggregate, encode, and swap the
/// `warehouse/request_metrics_minute` output for `day`.
pub async fn run_metrics_day(
    store: Arc<dyn ObjectStore>,
    day: NaiveDate,
) -> Result<(usize, ScanStats), RollupError> {
    let (rows, stats) = scan_and_aggregate_day(store.as_ref(), day).await;
    let day_str = day.format("%Y-%m-%d").to_string();
    let prefix = "warehouse/request_metrics_minute/";

    if rows.is_empty() {
        parquet_encode::clear_day(store.as_ref(), prefix, &day_str).await?;
        return Ok((0, stats));
    }

    let batch = parquet_encode::build_metrics_batch(&rows).map_err(RollupError::Encode)?;
    let bytes = parquet_encode::encode_parquet(&batch).map_err(RollupError::Encode)?;
    let new_key = format!("{prefix}metrics_{}_{day_str}.parquet", Uuid::new_v4());

    store.put(&new_key, bytes.into()).await?;
    parquet_encode::cleanup_old_day(store.as_ref(), prefix, &day_str, &new_key).await;

    Ok((rows.len(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_matches_worked_example() {
        let sorted = vec![10, 20, 30];
        assert_eq!(percentile(&sorted, 0.50), 20.0);
        assert_eq!(percentile(&sorted, 0.95), 29.0);
        assert!((percentile(&sorted, 0.99) - 29.8).abs() < 1e-9);
    }

    #[test]
    fn percentile_single_sample() {
        assert_eq!(percentile(&[42], 0.99), 42.0);
    }

    #[test]
    fn percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn floor_minute_truncates_seconds() {
        let t = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 47).unwrap();
        let floored = floor_minute(t);
        assert_eq!(floored, Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap());
    }
}
