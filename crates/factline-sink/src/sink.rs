use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use factline_core::{Cancellation, Topic};
use factline_storage::ObjectStore;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::SinkError;
use crate::paths::{active_file_path, batch_file_name, is_batch_file, raw_key, topic_dir};

/// Crash-safe, at-least-once persistence of records grouped by topic, with
/// asynchronous migration from the local buffer to an [`ObjectStore`].
///
/// `write` is serialized by a single mutex guarding the per-topic active-file
/// map; rotation acquires the same mutex for the rename, upload runs outside
/// it.
pub struct Sink {
    buffer_dir: PathBuf,
    store: Arc<dyn ObjectStore>,
    active: Mutex<HashMap<Topic, File>>,
    cancel: Cancellation,
    ready: AtomicBool,
    rotation_interval: Duration,
    rotation_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Sink {
    /// Creates the buffer directory if missing, runs the startup recovery
    /// scan for orphaned batches, and starts the background rotation loop.
    pub async fn new(
        buffer_dir: PathBuf,
        store: Arc<dyn ObjectStore>,
        cancel: Cancellation,
        rotation_interval: Duration,
    ) -> Result<Arc<Self>, SinkError> {
        fs::create_dir_all(&buffer_dir)
            .await
            .map_err(|source| SinkError::BufferDirUnavailable {
                path: buffer_dir.display().to_string(),
                source,
            })?;

        let sink = Arc::new(Self {
            buffer_dir,
            store,
            active: Mutex::new(HashMap::new()),
            cancel,
            ready: AtomicBool::new(false),
            rotation_interval,
            rotation_task: std::sync::Mutex::new(None),
        });

        sink.recover_orphans().await;
        sink.ready.store(true, Ordering::SeqCst);

        let rotation_sink = Arc::clone(&sink);
        let handle = tokio::spawn(async move { rotation_sink.rotation_loop().await });
        *sink.rotation_task.lock().unwrap() = Some(handle);

        Ok(sink)
    }

    /// True once the buffer directory exists and the startup recovery scan
    /// has completed. Backs the `/ready` endpoint.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Appends `bytes` plus a newline to the topic's active buffer file and
    /// flushes to stable storage before returning. Returns success only if
    /// that flush succeeded.
    pub async fn write(&self, topic: Topic, bytes: &[u8]) -> Result<(), SinkError> {
        let mut active = self.active.lock().await;
        let file = match active.get_mut(&topic) {
            Some(f) => f,
            None => {
                let file = self.open_active_file(topic).await?;
                active.insert(topic, file);
                active.get_mut(&topic).expect("just inserted")
            }
        };

        let result: Result<(), std::io::Error> = async {
            file.write_all(bytes).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                metrics::counter!("factline_sink_write_failures_total", "topic" => topic.as_str())
                    .increment(1);
                Err(SinkError::WriteFailed(e))
            }
        }
    }

    /// Cancels background work and releases all open local files.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.rotation_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.active.lock().await.clear();
    }

    async fn open_active_file(&self, topic: Topic) -> Result<File, SinkError> {
        let dir = topic_dir(&self.buffer_dir, topic);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| SinkError::BufferDirUnavailable {
                path: dir.display().to_string(),
                source,
            })?;
        let path = active_file_path(&self.buffer_dir, topic);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::OpenFailed {
                path: path.display().to_string(),
                source,
            })
    }

    async fn rotation_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.rotation_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => {
                    tracing::info!("sink rotation loop exiting on cancellation");
                    return;
                }
            }

            let topics: Vec<Topic> = self.active.lock().await.keys().copied().collect();
            for topic in topics {
                self.rotate_topic(topic).await;
            }
        }
    }

    /// Rotates one topic's active buffer and, on success, spawns its upload
    /// as an independent task so a slow or failing upload never blocks
    /// rotation of the remaining topics.
    async fn rotate_topic(self: &Arc<Self>, topic: Topic) {
        let rotated_at = Utc::now();
        let active_path = active_file_path(&self.buffer_dir, topic);

        {
            let mut active = self.active.lock().await;
            active.remove(&topic);

            let size = match fs::metadata(&active_path).await {
                Ok(meta) => meta.len(),
                Err(_) => return,
            };
            if size == 0 {
                return;
            }

            let batch_name = batch_file_name(rotated_at);
            let batch_path = topic_dir(&self.buffer_dir, topic).join(&batch_name);
            if let Err(e) = fs::rename(&active_path, &batch_path).await {
                tracing::error!(topic = %topic, error = %e, "rotation rename failed, active buffer preserved");
                return;
            }
            drop(active);

            tracing::info!(topic = %topic, batch = %batch_name, "rotated active buffer");
            let sink = Arc::clone(self);
            tokio::spawn(async move { sink.upload_batch(topic, batch_path, rotated_at).await });
        }
    }

    async fn upload_batch(&self, topic: Topic, path: PathBuf, partition_time: DateTime<Utc>) {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let key = raw_key(topic, partition_time, &basename);

        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "could not read rotated batch for upload");
                return;
            }
        };

        match self.store.put(&key, Bytes::from(bytes)).await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&path).await {
                    tracing::error!(path = %path.display(), error = %e, "upload succeeded but local batch removal failed");
                } else {
                    tracing::info!(key = %key, "uploaded batch");
                }
                metrics::counter!("factline_sink_uploads_total", "topic" => topic.as_str(), "outcome" => "success").increment(1);
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "upload failed, local batch preserved for retry");
                metrics::counter!("factline_sink_uploads_total", "topic" => topic.as_str(), "outcome" => "failure").increment(1);
            }
        }
    }

    /// Enumerates `batch_*.jsonl` under every topic directory (ignoring
    /// `current.jsonl`) and attempts upload using each file's modification
    /// time as the destination-partition timestamp.
    async fn recover_orphans(&self) {
        for topic in [Topic::RequestFacts, Topic::ServiceEvents] {
            let dir = topic_dir(&self.buffer_dir, topic);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().to_string();
                if !is_batch_file(&name) {
                    continue;
                }
                let path = entry.path();
                let mtime = match entry.metadata().await.and_then(|m| m.modified()) {
                    Ok(t) => DateTime::<Utc>::from(t),
                    Err(_) => Utc::now(),
                };
                tracing::info!(path = %path.display(), "recovering orphaned batch from previous run");
                self.upload_batch(topic, path, mtime).await;
            }
        }
    }
}
