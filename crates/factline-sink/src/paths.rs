use std::path::{Path, PathBuf};

use chrono::{DateTime, Timelike, Utc};
use factline_core::Topic;
use uuid::Uuid;

pub fn topic_dir(buffer_dir: &Path, topic: Topic) -> PathBuf {
    buffer_dir.join(topic.as_str())
}

pub fn active_file_path(buffer_dir: &Path, topic: Topic) -> PathBuf {
    topic_dir(buffer_dir, topic).join("current.jsonl")
}

/// `batch_<yyyymmddhhmmss>_<uuid>.jsonl`, the immutable rotated-batch name.
pub fn batch_file_name(rotated_at: DateTime<Utc>) -> String {
    format!(
        "batch_{}_{}.jsonl",
        rotated_at.format("%Y%m%d%H%M%S"),
        Uuid::new_v4()
    )
}

pub fn is_batch_file(name: &str) -> bool {
    name.starts_with("batch_") && name.ends_with(".jsonl")
}

/// `raw/<topic>/<YYYY-MM-DD>/<HH>/<basename>`, UTC day/hour derived from the
/// upload wall clock (or, for recovered batches, the file's mtime).
pub fn raw_key(topic: Topic, at: DateTime<Utc>, basename: &str) -> String {
    format!(
        "raw/{}/{}/{:02}/{}",
        topic,
        at.format("%Y-%m-%d"),
        at.hour(),
        basename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_key_matches_bit_exact_layout() {
        let ts = "2025-01-15T10:30:05Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(
            raw_key(Topic::RequestFacts, ts, "batch_x.jsonl"),
            "raw/request_facts/2025-01-15/10/batch_x.jsonl"
        );
    }

    #[test]
    fn recognizes_batch_files() {
        assert!(is_batch_file("batch_20250115103005_abc.jsonl"));
        assert!(!is_batch_file("current.jsonl"));
    }
}
