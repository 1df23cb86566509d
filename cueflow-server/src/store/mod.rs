//! Content-addressed feature store
//!
//! Features are keyed by `content_id` (hash of file bytes) so renames never
//! force re-analysis; a secondary path index carries a `(file_size, mtime)`
//! fingerprint for the fast-reject validation step. Entry files live under
//! `cache/by_content/<cid[0:2]>/<cid>.json` and are written with a temp-file
//! + rename swap. A single reader-writer lock guards the in-memory indexes;
//! a per-content-id mutex table serialises writers on the same key.

mod index;

pub use index::{Indexes, PathIndexEntry};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::UNIX_EPOCH;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use cueflow_common::models::{BoundedRange, CacheEntry, Track, ANALYSIS_VERSION};
use cueflow_common::mood::Mood;
use cueflow_common::theory::Camelot;
use cueflow_common::{Error, Result};

/// Filter applied by `List`
#[derive(Debug, Clone, Default)]
pub struct TrackFilter {
    /// Case-insensitive substring over artist, title, and filename
    pub search: Option<String>,
    pub keys: Option<Vec<cueflow_common::theory::MusicalKey>>,
    pub camelots: Option<Vec<Camelot>>,
    pub moods: Option<Vec<Mood>>,
    pub bpm: Option<BoundedRange>,
    pub energy: Option<BoundedRange>,
}

/// Sort key for `List`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Artist,
    Title,
    Bpm,
    Energy,
    Duration,
    AnalysedAt,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Store-level aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub track_count: usize,
    pub entry_count: usize,
    /// Integer-BPM bucket → count
    pub bpm_histogram: BTreeMap<u32, usize>,
    /// Mood tag → count
    pub mood_histogram: BTreeMap<String, usize>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Hits over consulted lookups since startup; 0.0 when nothing consulted
    pub cache_hit_rate: f64,
    pub cache_size_bytes: u64,
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed_entries: usize,
    pub freed_bytes: u64,
}

/// Outcome of a cache lookup, for hit-rate accounting
enum LookupOutcome {
    /// Valid entry returned
    Hit(CacheEntry),
    /// An entry existed but failed validation (stat, version, or TTL)
    Invalid,
    /// The store had never seen this content
    Absent,
}

/// Content-addressed feature store
pub struct Store {
    by_content_dir: PathBuf,
    index_path: PathBuf,
    exports_dir: PathBuf,
    presets_dir: PathBuf,
    ttl: Duration,
    indexes: RwLock<Indexes>,
    /// Per-content-id writer locks, evicted after each write
    write_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    dirty: AtomicBool,
}

impl Store {
    /// Open (or create) the store under `data_root`, loading both indexes.
    ///
    /// Fails if the data root cannot be created or is not writable.
    pub async fn init(data_root: &Path, ttl_days: i64) -> Result<Self> {
        let cache_dir = data_root.join("cache");
        let by_content_dir = cache_dir.join("by_content");
        let exports_dir = data_root.join("exports");
        let presets_dir = data_root.join("presets");
        for dir in [&cache_dir, &by_content_dir, &exports_dir, &presets_dir] {
            std::fs::create_dir_all(dir)?;
        }

        // Probe writability up front so startup fails loudly, not mid-task.
        let probe = cache_dir.join(".write_probe");
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)?;

        let index_path = cache_dir.join("index.json");
        let paths = Indexes::load_path_index(&index_path)?;
        let entries = Indexes::load_entries(&by_content_dir)?;

        tracing::info!(
            paths = paths.len(),
            entries = entries.len(),
            root = %data_root.display(),
            "feature store opened"
        );

        Ok(Self {
            by_content_dir,
            index_path,
            exports_dir,
            presets_dir,
            ttl: Duration::days(ttl_days.max(1)),
            indexes: RwLock::new(Indexes { paths, entries }),
            write_locks: StdMutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        })
    }

    /// Flush pending index writes. Bounded: one small JSON file.
    pub async fn shutdown(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            self.flush_index().await?;
        }
        tracing::info!("feature store closed");
        Ok(())
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    async fn flush_index(&self) -> Result<()> {
        let indexes = self.indexes.read().await;
        Indexes::save_path_index(&indexes.paths, &self.index_path)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Hash the file contents: leading 64 bits of SHA-256, lowercase hex.
    ///
    /// Runs on the blocking pool; files can be hundreds of megabytes.
    pub async fn compute_content_id(path: &Path) -> Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<String> {
            use std::io::Read;

            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; 1024 * 1024];
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            let digest = hasher.finalize();
            Ok(hex_prefix(&digest))
        })
        .await
        .map_err(|err| Error::Internal(format!("hash task failed: {err}")))?
    }

    pub(crate) fn stat(path: &Path) -> Result<(u64, i64)> {
        let meta = std::fs::metadata(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("file not found: {}", path.display()))
            } else {
                Error::Io(err)
            }
        })?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok((meta.len(), mtime))
    }

    fn entry_file(&self, content_id: &str) -> PathBuf {
        let shard = &content_id[..2.min(content_id.len())];
        self.by_content_dir.join(shard).join(format!("{content_id}.json"))
    }

    fn entry_is_current(&self, entry: &CacheEntry) -> bool {
        entry.analysis_version >= ANALYSIS_VERSION
            && Utc::now() - entry.analysed_at <= self.ttl
    }

    /// Resolve the content id for `path`: the stat fast path when the index
    /// fingerprint matches, a re-hash (and index refresh) otherwise.
    pub async fn resolve_content_id(&self, path: &Path) -> Result<String> {
        let canonical = canonicalise(path)?;
        let (file_size, mtime) = Self::stat(&canonical)?;

        {
            let indexes = self.indexes.read().await;
            if let Some(row) = indexes.paths.get(&canonical) {
                if row.matches_stat(file_size, mtime) {
                    return Ok(row.content_id.clone());
                }
            }
        }

        let content_id = Self::compute_content_id(&canonical).await?;
        {
            let mut indexes = self.indexes.write().await;
            indexes.paths.insert(
                canonical,
                PathIndexEntry {
                    content_id: content_id.clone(),
                    file_size,
                    mtime,
                    analysis_version: ANALYSIS_VERSION,
                },
            );
        }
        self.dirty.store(true, Ordering::Release);
        Ok(content_id)
    }

    async fn lookup_outcome(&self, path: &Path) -> Result<LookupOutcome> {
        let content_id = self.resolve_content_id(path).await?;

        let indexes = self.indexes.read().await;
        let Some(entry) = indexes.entries.get(&content_id) else {
            return Ok(LookupOutcome::Absent);
        };
        if !self.entry_is_current(entry) {
            return Ok(LookupOutcome::Invalid);
        }
        // Key/camelot disagreement in a stored entry means the store is
        // corrupt; surface it instead of serving bad data.
        if entry.features.key.camelot() != entry.features.camelot {
            return Err(Error::Internal(format!(
                "cache entry {content_id}: key {} disagrees with camelot {}",
                entry.features.key, entry.features.camelot
            )));
        }
        Ok(LookupOutcome::Hit(entry.clone()))
    }

    /// Read path: a valid entry for `path`, or `None` on a miss.
    ///
    /// Hit-rate accounting counts a hit for each valid entry served and a
    /// miss for each entry that failed validation; content the store has
    /// never seen counts as neither.
    pub async fn lookup(&self, path: &Path) -> Result<Option<CacheEntry>> {
        match self.lookup_outcome(path).await? {
            LookupOutcome::Hit(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry))
            }
            LookupOutcome::Invalid => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            LookupOutcome::Absent => Ok(None),
        }
    }

    /// Write path: persist `entry` for `path` and update both indexes.
    ///
    /// At most one write is in flight per content id; last commit wins when
    /// two tasks race on the same key.
    pub async fn insert(&self, path: &Path, entry: CacheEntry) -> Result<()> {
        entry.features.validate(entry.duration_seconds)?;

        let canonical = canonicalise(path)?;
        let content_id = entry.content_id.clone();
        let key_lock = self.writer_lock(&content_id);
        let _guard = key_lock.lock().await;

        let file = self.entry_file(&content_id);
        let parent = file
            .parent()
            .ok_or_else(|| Error::Internal("entry file has no parent".to_string()))?;
        std::fs::create_dir_all(parent)?;
        let tmp = parent.join(format!(".{content_id}.tmp"));
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|err| Error::Internal(format!("entry serialisation failed: {err}")))?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &file)?;

        {
            let mut indexes = self.indexes.write().await;
            indexes.paths.insert(
                canonical,
                PathIndexEntry {
                    content_id: content_id.clone(),
                    file_size: entry.file_size,
                    mtime: entry.mtime,
                    analysis_version: entry.analysis_version,
                },
            );
            indexes.entries.insert(content_id.clone(), entry);
        }
        self.dirty.store(true, Ordering::Release);
        self.flush_index().await?;

        drop(_guard);
        drop(key_lock);
        self.evict_writer_lock(&content_id);
        Ok(())
    }

    fn writer_lock(&self, content_id: &str) -> Arc<Mutex<()>> {
        let mut table = self.write_locks.lock().expect("writer lock table poisoned");
        table
            .entry(content_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn evict_writer_lock(&self, content_id: &str) {
        let mut table = self.write_locks.lock().expect("writer lock table poisoned");
        if let Some(lock) = table.get(content_id) {
            if Arc::strong_count(lock) == 1 {
                table.remove(content_id);
            }
        }
    }

    /// Drop path-index rows whose files vanished from under the scanned
    /// roots. Entry files stay for the retention window.
    pub async fn prune_missing(&self, roots: &[PathBuf], seen: &HashSet<PathBuf>) -> usize {
        let mut removed = 0;
        {
            let mut indexes = self.indexes.write().await;
            indexes.paths.retain(|path, _| {
                let under_root = roots.iter().any(|root| path.starts_with(root));
                if under_root && !seen.contains(path) && !path.exists() {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
            if let Err(err) = self.flush_index().await {
                tracing::warn!(error = %err, "index flush after prune failed");
            }
        }
        removed
    }

    /// Track view for `path`, features included. `NotFound` when the file is
    /// missing or has no valid cache entry.
    pub async fn get_by_path(&self, path: &Path) -> Result<Track> {
        let canonical = canonicalise(path)?;
        match self.lookup(&canonical).await? {
            Some(entry) => Ok(entry.to_track(&canonical)),
            None => Err(Error::NotFound(format!(
                "track not analysed: {}",
                path.display()
            ))),
        }
    }

    /// All current tracks, unfiltered. The playlist engine's candidate pool.
    pub async fn all_tracks(&self) -> Vec<Track> {
        let indexes = self.indexes.read().await;
        let mut tracks = Vec::new();
        for (path, row) in &indexes.paths {
            if let Some(entry) = indexes.entries.get(&row.content_id) {
                if self.entry_is_current(entry) {
                    tracks.push(entry.to_track(path));
                }
            }
        }
        tracks
    }

    /// Filtered, sorted, paginated listing with a deterministic total order.
    pub async fn list(
        &self,
        filter: &TrackFilter,
        sort: SortField,
        order: SortOrder,
        page: usize,
        per_page: usize,
    ) -> (Vec<Track>, usize) {
        let mut tracks: Vec<Track> = self
            .all_tracks()
            .await
            .into_iter()
            .filter(|t| filter_matches(filter, t))
            .collect();

        tracks.sort_by(|a, b| {
            let primary = compare_by(sort, a, b);
            let ord = match order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            // Tie-break with the default total order so pagination is stable.
            ord.then_with(|| default_order(a, b))
        });

        let total = tracks.len();
        let page = page.max(1);
        let start = (page - 1).saturating_mul(per_page);
        let items = if start >= tracks.len() {
            Vec::new()
        } else {
            tracks[start..(start + per_page).min(tracks.len())].to_vec()
        };
        (items, total)
    }

    /// k-nearest tracks by weighted feature distance.
    ///
    /// The vector is `(bpm_norm, energy, valence, danceability, mode,
    /// key_circle)`; `key_circle` is the circular Camelot-position distance so
    /// `12A` and `1A` read as adjacent.
    pub async fn similar(
        &self,
        path: &Path,
        k: usize,
        threshold: f64,
    ) -> Result<Vec<(Track, f64)>> {
        let target = self.get_by_path(path).await?;
        let target_features = target
            .features
            .as_ref()
            .ok_or_else(|| Error::Internal("track without features in store".to_string()))?
            .clone();

        let mut scored: Vec<(Track, f64)> = self
            .all_tracks()
            .await
            .into_iter()
            .filter(|t| t.path != target.path)
            .filter_map(|t| {
                let features = t.features.as_ref()?;
                let similarity = 1.0 - feature_distance(&target_features, features);
                Some((t, similarity))
            })
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();

        scored.sort_by(|(ta, a), (tb, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ta.path.cmp(&tb.path))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Aggregate statistics: counts, histograms, and the cache hit rate.
    pub async fn stats(&self) -> StoreStats {
        let tracks = self.all_tracks().await;
        let mut bpm_histogram = BTreeMap::new();
        let mut mood_histogram = BTreeMap::new();
        for track in &tracks {
            if let Some(features) = &track.features {
                *bpm_histogram
                    .entry(features.bpm.round() as u32)
                    .or_insert(0) += 1;
                *mood_histogram
                    .entry(features.mood.to_string())
                    .or_insert(0) += 1;
            }
        }

        let entry_count = self.indexes.read().await.entries.len();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let consulted = hits + misses;

        StoreStats {
            track_count: tracks.len(),
            entry_count,
            bpm_histogram,
            mood_histogram,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if consulted > 0 {
                hits as f64 / consulted as f64
            } else {
                0.0
            },
            cache_size_bytes: self.disk_usage(),
        }
    }

    fn disk_usage(&self) -> u64 {
        let mut total = 0;
        for entry in walkdir::WalkDir::new(&self.by_content_dir)
            .into_iter()
            .flatten()
        {
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        total
    }

    /// Remove entries older than `older_than_days` and, if `max_size_gb` is
    /// set, the oldest entries beyond that budget.
    pub async fn cleanup(
        &self,
        older_than_days: Option<i64>,
        max_size_gb: Option<f64>,
    ) -> Result<CleanupReport> {
        let mut doomed: Vec<String> = Vec::new();
        {
            let indexes = self.indexes.read().await;
            if let Some(days) = older_than_days {
                let cutoff = Utc::now() - Duration::days(days.max(0));
                for (cid, entry) in &indexes.entries {
                    if entry.analysed_at < cutoff {
                        doomed.push(cid.clone());
                    }
                }
            }
            if let Some(gb) = max_size_gb {
                let budget = (gb * 1024.0 * 1024.0 * 1024.0) as u64;
                let mut sized: Vec<(String, chrono::DateTime<Utc>, u64)> = indexes
                    .entries
                    .iter()
                    .filter(|(cid, _)| !doomed.contains(cid))
                    .map(|(cid, entry)| {
                        let size = std::fs::metadata(self.entry_file(cid))
                            .map(|m| m.len())
                            .unwrap_or(0);
                        (cid.clone(), entry.analysed_at, size)
                    })
                    .collect();
                let mut total: u64 = sized.iter().map(|(_, _, s)| s).sum();
                sized.sort_by_key(|(_, analysed_at, _)| *analysed_at);
                for (cid, _, size) in sized {
                    if total <= budget {
                        break;
                    }
                    total = total.saturating_sub(size);
                    doomed.push(cid);
                }
            }
        }

        let mut freed = 0;
        for cid in &doomed {
            let file = self.entry_file(cid);
            if let Ok(meta) = std::fs::metadata(&file) {
                freed += meta.len();
            }
            if let Err(err) = std::fs::remove_file(&file) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(content_id = %cid, error = %err, "entry removal failed");
                }
            }
        }

        {
            let mut indexes = self.indexes.write().await;
            for cid in &doomed {
                indexes.entries.remove(cid);
            }
            indexes
                .paths
                .retain(|_, row| !doomed.contains(&row.content_id));
        }
        self.dirty.store(true, Ordering::Release);
        self.flush_index().await?;

        tracing::info!(removed = doomed.len(), freed_bytes = freed, "cache cleanup");
        Ok(CleanupReport {
            removed_entries: doomed.len(),
            freed_bytes: freed,
        })
    }

    /// Empty the cache entirely.
    pub async fn clear(&self) -> Result<usize> {
        let removed;
        {
            let mut indexes = self.indexes.write().await;
            removed = indexes.entries.len();
            indexes.paths.clear();
            indexes.entries.clear();
        }
        if self.by_content_dir.exists() {
            std::fs::remove_dir_all(&self.by_content_dir)?;
        }
        std::fs::create_dir_all(&self.by_content_dir)?;
        self.dirty.store(true, Ordering::Release);
        self.flush_index().await?;
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }
}

/// Canonicalise, mapping a missing file to `NotFound`
fn canonicalise(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("file not found: {}", path.display()))
        } else {
            Error::Io(err)
        }
    })
}

fn hex_prefix(digest: &[u8]) -> String {
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn filter_matches(filter: &TrackFilter, track: &Track) -> bool {
    let Some(features) = &track.features else {
        return false;
    };
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let artist = track.tags.artist.as_deref().unwrap_or("").to_lowercase();
        let title = track.tags.title.as_deref().unwrap_or("").to_lowercase();
        let filename = track
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !artist.contains(&needle) && !title.contains(&needle) && !filename.contains(&needle) {
            return false;
        }
    }
    if let Some(keys) = &filter.keys {
        if !keys.contains(&features.key) {
            return false;
        }
    }
    if let Some(camelots) = &filter.camelots {
        if !camelots.contains(&features.camelot) {
            return false;
        }
    }
    if let Some(moods) = &filter.moods {
        if !moods.contains(&features.mood) {
            return false;
        }
    }
    if let Some(bpm) = &filter.bpm {
        if !bpm.contains(features.bpm) {
            return false;
        }
    }
    if let Some(energy) = &filter.energy {
        if !energy.contains(features.energy) {
            return false;
        }
    }
    true
}

/// The default total order: `(artist, title, path)`
fn default_order(a: &Track, b: &Track) -> std::cmp::Ordering {
    let artist_a = a.tags.artist.as_deref().unwrap_or("");
    let artist_b = b.tags.artist.as_deref().unwrap_or("");
    artist_a
        .cmp(artist_b)
        .then_with(|| {
            let title_a = a.tags.title.as_deref().unwrap_or("");
            let title_b = b.tags.title.as_deref().unwrap_or("");
            title_a.cmp(title_b)
        })
        .then_with(|| a.path.cmp(&b.path))
}

fn compare_by(sort: SortField, a: &Track, b: &Track) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let float = |fa: f64, fb: f64| fa.partial_cmp(&fb).unwrap_or(Ordering::Equal);
    match sort {
        SortField::Artist | SortField::Title => {
            let pick = |t: &Track| -> String {
                match sort {
                    SortField::Artist => t.tags.artist.clone().unwrap_or_default(),
                    _ => t.tags.title.clone().unwrap_or_default(),
                }
            };
            pick(a).cmp(&pick(b))
        }
        SortField::Bpm => float(
            a.features.as_ref().map(|f| f.bpm).unwrap_or(0.0),
            b.features.as_ref().map(|f| f.bpm).unwrap_or(0.0),
        ),
        SortField::Energy => float(
            a.features.as_ref().map(|f| f.energy).unwrap_or(0.0),
            b.features.as_ref().map(|f| f.energy).unwrap_or(0.0),
        ),
        SortField::Duration => float(a.duration_seconds, b.duration_seconds),
        SortField::AnalysedAt => a.analysed_at.cmp(&b.analysed_at),
        SortField::Path => a.path.cmp(&b.path),
    }
}

/// Weighted distance over the similarity feature vector, in `[0, 1]`
fn feature_distance(
    a: &cueflow_common::models::Features,
    b: &cueflow_common::models::Features,
) -> f64 {
    const W_BPM: f64 = 0.25;
    const W_ENERGY: f64 = 0.20;
    const W_VALENCE: f64 = 0.15;
    const W_DANCE: f64 = 0.15;
    const W_MODE: f64 = 0.10;
    const W_KEY: f64 = 0.15;

    let bpm_norm = |bpm: f64| ((bpm - 40.0) / 200.0).clamp(0.0, 1.0);
    let mode = |features: &cueflow_common::models::Features| -> f64 {
        if features.key.is_minor() {
            1.0
        } else {
            0.0
        }
    };
    let key_circle = a.camelot.position_distance(&b.camelot) as f64 / 6.0;

    W_BPM * (bpm_norm(a.bpm) - bpm_norm(b.bpm)).abs()
        + W_ENERGY * (a.energy - b.energy).abs()
        + W_VALENCE * (a.valence - b.valence).abs()
        + W_DANCE * (a.danceability - b.danceability).abs()
        + W_MODE * (mode(a) - mode(b)).abs()
        + W_KEY * key_circle
}
