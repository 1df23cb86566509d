//! Analysis worker pool
//!
//! Consumes the scanner's candidate list and produces cache entries, bounded
//! by `max_workers`. One producer feeds a bounded channel (capacity
//! `2 × max_workers`) so backpressure flows from the workers to the feed.
//! Workers observe cancellation at every loop boundary: before pulling,
//! before extracting, and before writing. An in-flight extractor call runs to
//! completion, but its result is discarded after cancel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lofty::file::TaggedFileExt;
use lofty::prelude::{Accessor, AudioFile as LoftyAudioFile};
use lofty::probe::Probe;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use cueflow_common::models::{CacheEntry, TrackTags, ANALYSIS_VERSION};

use crate::extractor::{ExtractError, ExtractOptions, Extraction, FeatureExtractor};
use crate::store::Store;

/// Exponential backoff base for transient failures
const RETRY_BASE: Duration = Duration::from_millis(200);
/// Backoff ceiling
const RETRY_CAP: Duration = Duration::from_secs(3);
/// Attempts per file, first try included
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub analysis_timeout: Duration,
    /// Skip the cache-hit fast path and re-extract everything
    pub overwrite_cache: bool,
}

/// Terminal result for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    CacheHit,
    Analysed,
    Failed { code: String, message: String },
}

/// Progress feed from the workers to the task owner
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Started { path: PathBuf },
    Finished { path: PathBuf, outcome: FileOutcome },
}

/// Bounded-concurrency analysis pool
pub struct WorkerPool {
    store: Arc<Store>,
    extractor: Arc<dyn FeatureExtractor>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<Store>,
        extractor: Arc<dyn FeatureExtractor>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    /// Process `files`, emitting a [`WorkerEvent`] stream. Returns when every
    /// file is terminal or cancellation has drained the pool. Files make no
    /// ordering promise.
    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        cancel: CancellationToken,
        events: mpsc::Sender<WorkerEvent>,
    ) {
        let workers = self.config.max_workers.max(1);
        let (feed_tx, feed_rx) = mpsc::channel::<PathBuf>(workers * 2);
        let feed_rx = Arc::new(Mutex::new(feed_rx));

        let producer_cancel = cancel.clone();
        let producer = tokio::spawn(async move {
            for file in files {
                tokio::select! {
                    _ = producer_cancel.cancelled() => break,
                    sent = feed_tx.send(file) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            // Dropping feed_tx closes the channel and drains the workers.
        });

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let store = Arc::clone(&self.store);
            let extractor = Arc::clone(&self.extractor);
            let config = self.config.clone();
            let cancel = cancel.clone();
            let events = events.clone();
            let feed_rx = Arc::clone(&feed_rx);

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = {
                        let mut rx = feed_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            path = rx.recv() => path,
                        }
                    };
                    let Some(path) = next else {
                        break;
                    };

                    if events
                        .send(WorkerEvent::Started { path: path.clone() })
                        .await
                        .is_err()
                    {
                        break;
                    }

                    let outcome =
                        process_file(&store, &extractor, &config, &cancel, &path).await;

                    let Some(outcome) = outcome else {
                        // Cancelled mid-file: the result is discarded and the
                        // file stays non-terminal.
                        break;
                    };
                    tracing::debug!(
                        worker = worker_id,
                        path = %path.display(),
                        outcome = ?outcome,
                        "file terminal"
                    );
                    if events
                        .send(WorkerEvent::Finished { path, outcome })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        producer.abort();
    }
}

/// Per-file state machine: cache probe, extraction with bounded retries,
/// write. `None` means cancellation interrupted the file.
async fn process_file(
    store: &Store,
    extractor: &Arc<dyn FeatureExtractor>,
    config: &WorkerPoolConfig,
    cancel: &CancellationToken,
    path: &Path,
) -> Option<FileOutcome> {
    if !config.overwrite_cache {
        match store.lookup(path).await {
            Ok(Some(_)) => return Some(FileOutcome::CacheHit),
            Ok(None) => {}
            Err(err) => {
                return Some(FileOutcome::Failed {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    if cancel.is_cancelled() {
        return None;
    }

    let extraction = match extract_with_retries(extractor, config, cancel, path).await {
        Ok(Some(extraction)) => extraction,
        Ok(None) => return None,
        Err(err) => {
            let common: cueflow_common::Error = err.into();
            return Some(FileOutcome::Failed {
                code: common.code().to_string(),
                message: common.to_string(),
            });
        }
    };

    if cancel.is_cancelled() {
        return None;
    }

    match write_entry(store, path, extraction).await {
        Ok(()) => Some(FileOutcome::Analysed),
        Err(err) => Some(FileOutcome::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        }),
    }
}

/// Run the extractor on the blocking pool with exponential backoff over
/// transient failures. `Ok(None)` means cancellation during a backoff wait.
async fn extract_with_retries(
    extractor: &Arc<dyn FeatureExtractor>,
    config: &WorkerPoolConfig,
    cancel: &CancellationToken,
    path: &Path,
) -> Result<Option<Extraction>, ExtractError> {
    let options = ExtractOptions {
        analysis_timeout: config.analysis_timeout,
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let call_extractor = Arc::clone(extractor);
        let call_path = path.to_path_buf();
        let call_options = options.clone();
        // CPU-bound: run on the blocking pool. A backstop timeout above the
        // extractor's own budget catches a wedged implementation.
        let budget = config.analysis_timeout + Duration::from_secs(10);
        let call = tokio::task::spawn_blocking(move || {
            call_extractor.extract(&call_path, &call_options)
        });
        let result = match tokio::time::timeout(budget, call).await {
            Ok(joined) => joined.map_err(|err| {
                ExtractError::Internal(format!("extraction task failed: {err}"))
            })?,
            Err(_) => Err(ExtractError::Timeout(format!(
                "extractor exceeded backstop budget: {}",
                path.display()
            ))),
        };

        match result {
            Ok(extraction) => return Ok(Some(extraction)),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let backoff = RETRY_BASE
                    .saturating_mul(2u32.saturating_pow(attempt - 1))
                    .min(RETRY_CAP);
                tracing::warn!(
                    path = %path.display(),
                    attempt,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient extraction failure, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Build and persist the cache entry for a completed extraction
async fn write_entry(
    store: &Store,
    path: &Path,
    extraction: Extraction,
) -> cueflow_common::Result<()> {
    let content_id = Store::compute_content_id(path).await?;
    let (file_size, mtime) = Store::stat(path)?;
    let media = read_media_meta(path);

    let entry = CacheEntry {
        content_id,
        path_at_write: path.to_path_buf(),
        file_size,
        mtime,
        analysis_version: ANALYSIS_VERSION,
        analysed_at: Utc::now(),
        duration_seconds: extraction.duration_seconds,
        features: extraction.features,
        format: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        bitrate: media.bitrate,
        sample_rate: extraction.sample_rate.or(media.sample_rate),
        tags: media.tags,
    };
    store.insert(path, entry).await
}

struct MediaMeta {
    bitrate: Option<u32>,
    sample_rate: Option<u32>,
    tags: TrackTags,
}

/// Read embedded tags and stream properties. Best effort: files with broken
/// tag blocks still analyse.
fn read_media_meta(path: &Path) -> MediaMeta {
    let mut meta = MediaMeta {
        bitrate: None,
        sample_rate: None,
        tags: TrackTags::default(),
    };
    let tagged = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(tagged) => tagged,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "tag probe failed");
            return meta;
        }
    };

    let properties = tagged.properties();
    meta.bitrate = properties.audio_bitrate();
    meta.sample_rate = properties.sample_rate();

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        let non_empty = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        meta.tags = TrackTags {
            title: non_empty(tag.title().as_deref()),
            artist: non_empty(tag.artist().as_deref()),
            album: non_empty(tag.album().as_deref()),
            year: tag.year(),
        };
    }
    meta
}
