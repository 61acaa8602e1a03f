use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::SecondsFormat;
use factline_storage::{ObjectStore, StorageError};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::aggregate::MetricsRow;
use crate::error::RollupError;
use crate::events::EventsRow;

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_compression(Compression::SNAPPY)
        .build()
}

pub fn build_metrics_batch(rows: &[MetricsRow]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("bucket_start", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("method", DataType::Utf8, false),
        Field::new("path_template", DataType::Utf8, false),
        Field::new("request_count", DataType::Int64, false),
        Field::new("error_count", DataType::Int64, false),
        Field::new("error_rate", DataType::Float64, false),
        Field::new("p50_latency_ms", DataType::Float64, false),
        Field::new("p95_latency_ms", DataType::Float64, false),
        Field::new("p99_latency_ms", DataType::Float64, false),
        Field::new("event_day", DataType::Utf8, false),
    ]));

    let bucket_start = StringArray::from(
        rows.iter()
            .map(|r| r.bucket_start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .collect::<Vec<_>>(),
    );
    let service = StringArray::from(rows.iter().map(|r| r.service.as_str()).collect::<Vec<_>>());
    let method = StringArray::from(rows.iter().map(|r| r.method.as_str()).collect::<Vec<_>>());
    let path_template =
        StringArray::from(rows.iter().map(|r| r.path_template.as_str()).collect::<Vec<_>>());
    let request_count = Int64Array::from(rows.iter().map(|r| r.request_count).collect::<Vec<_>>());
    let error_count = Int64Array::from(rows.iter().map(|r| r.error_count).collect::<Vec<_>>());
    let error_rate = Float64Array::from(rows.iter().map(|r| r.error_rate).collect::<Vec<_>>());
    let p50 = Float64Array::from(rows.iter().map(|r| r.p50_latency_ms).collect::<Vec<_>>());
    let p95 = Float64Array::from(rows.iter().map(|r| r.p95_latency_ms).collect::<Vec<_>>());
    let p99 = Float64Array::from(rows.iter().map(|r| r.p99_latency_ms).collect::<Vec<_>>());
    let event_day = StringArray::from(rows.iter().map(|r| r.event_day.as_str()).collect::<Vec<_>>());

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(bucket_start),
            Arc::new(service),
            Arc::new(method),
            Arc::new(path_template),
            Arc::new(request_count),
            Arc::new(error_count),
            Arc::new(error_rate),
            Arc::new(p50),
            Arc::new(p95),
            Arc::new(p99),
            Arc::new(event_day),
        ],
    )
    .context("failed to build request_metrics_minute record batch")
}

pub fn build_events_batch(rows: &[EventsRow]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("event_day", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("event_type", DataType::Utf8, false),
        Field::new("event_count", DataType::Int64, false),
    ]));

    let event_day = StringArray::from(rows.iter().map(|r| r.event_day.as_str()).collect::<Vec<_>>());
    let service = StringArray::from(rows.iter().map(|r| r.service.as_str()).collect::<Vec<_>>());
    let event_type =
        StringArray::from(rows.iter().map(|r| r.event_type.as_str()).collect::<Vec<_>>());
    let event_count = Int64Array::from(rows.iter().map(|r| r.event_count).collect::<Vec<_>>());

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(event_day),
            Arc::new(service),
            Arc::new(event_type),
            Arc::new(event_count),
        ],
    )
    .context("failed to build service_events_daily record batch")
}

/// Serializes a batch to Parquet bytes in memory.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(writer_properties()))
        .context("failed to construct parquet writer")?;
    writer.write(batch).context("failed to write record batch")?;
    writer.close().context("failed to finalize parquet file")?;
    Ok(buffer)
}

/// Write-then-delete swap: the new blob for `day_str` is already live by the
/// time this is called; this removes every other blob under `prefix`
/// belonging to the same day. Delete failures are logged, not propagated —
/// the overlap window they leave behind is tolerated by downstream readers.
pub async fn cleanup_old_day(store: &dyn ObjectStore, prefix: &str, day_str: &str, new_key: &str) {
    let existing = match store.list(prefix).await {
        Ok(keys) => keys,
        Err(StorageError::NotFound(_)) => return,
        Err(e) => {
            tracing::warn!(prefix = %prefix, error = %e, "failed to list warehouse prefix during swap cleanup");
            return;
        }
    };
    for key in existing {
        if key.contains(day_str) && key != new_key {
            if let Err(e) = store.delete(&key).await {
                tracing::error!(key = %key, error = %e, "failed to delete superseded warehouse blob");
            }
        }
    }
}

/// Idempotent clear: used when a day's aggregation produces no rows, so the
/// warehouse holds no stale partition for a day with no (or no longer any)
/// input.
pub async fn clear_day(store: &dyn ObjectStore, prefix: &str, day_str: &str) -> Result<(), RollupError> {
    cleanup_old_day(store, prefix, day_str, "").await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn metrics_batch_roundtrips_row_count() {
        let rows = vec![MetricsRow {
            bucket_start: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
            service: "api-service".into(),
            method: "GET".into(),
            path_template: "/users".into(),
            request_count: 3,
            error_count: 1,
            error_rate: 1.0 / 3.0,
            p50_latency_ms: 20.0,
            p95_latency_ms: 29.0,
            p99_latency_ms: 29.8,
            event_day: "2025-01-15".into(),
        }];
        let batch = build_metrics_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        let bytes = encode_parquet(&batch).unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");
    }

    #[test]
    fn events_batch_roundtrips_row_count() {
        let rows = vec![EventsRow {
            event_day: "2025-01-15".into(),
            service: "auth-service".into(),
            event_type: "deploy_started".into(),
            event_count: 4,
        }];
        let batch = build_events_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        let bytes = encode_parquet(&batch).unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");
    }
}
