//! Single-flight audio resolution cache.
//!
//! Each track id moves through `absent -> pending -> ready | failed`. The
//! transition to `pending` happens under the state lock, so concurrent
//! requests for the same id share one extraction. The extraction itself runs
//! on a spawned task outside the lock, and every caller waits for its outcome
//! on a watch channel. A `failed` entry behaves as absent for new requests.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::eviction::{EntryMeta, EvictionPolicy, NoEviction};
use super::models::{
    content_type_for, extension_for, AudioResource, CacheStats, EntryState, DEFAULT_CONTENT_TYPE,
};
use crate::providers::{AudioExtractor, CallPolicy, ExtractedAudio, ExtractionError};
use crate::server::metrics;

const PARTIAL_PREFIX: &str = ".partial-";
const FALLBACK_EXTENSION: &str = "bin";
/// Failed entries kept for inspection. Older failures are forgotten first.
const MAX_FAILED_ENTRIES: usize = 256;

type Outcome = Result<AudioResource, ExtractionError>;

#[derive(Debug, Clone)]
pub struct AudioCacheSettings {
    /// Directory holding materialised audio files.
    pub cache_dir: PathBuf,
    pub max_concurrent_extractions: usize,
    /// Timeout and retries for a single extraction.
    pub extraction_policy: CallPolicy,
    /// How long a caller waits for an in-flight extraction, queueing included.
    pub waiter_timeout: Duration,
}

impl Default for AudioCacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./audio_cache"),
            max_concurrent_extractions: 4,
            extraction_policy: CallPolicy::new(Duration::from_secs(60), 0),
            waiter_timeout: Duration::from_secs(120),
        }
    }
}

struct ReadyEntry {
    resource: AudioResource,
    inserted_at: Instant,
    last_access: Instant,
}

impl ReadyEntry {
    fn new(resource: AudioResource) -> Self {
        let now = Instant::now();
        Self {
            resource,
            inserted_at: now,
            last_access: now,
        }
    }

    fn meta(&self, track_id: &str) -> EntryMeta {
        EntryMeta {
            track_id: track_id.to_string(),
            inserted_at: self.inserted_at,
            last_access: self.last_access,
        }
    }
}

enum Slot {
    Pending(watch::Receiver<Option<Outcome>>),
    Ready(ReadyEntry),
    /// Sequence number of the failure, used to forget the oldest ones.
    Failed(u64),
}

enum Lookup {
    Hit(AudioResource),
    Join(watch::Receiver<Option<Outcome>>),
    Start,
}

enum Reservation {
    Hit(AudioResource),
    Wait(watch::Receiver<Option<Outcome>>),
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    extractions: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

struct Inner {
    entries: Mutex<HashMap<String, Slot>>,
    extractor: Arc<dyn AudioExtractor>,
    eviction: Box<dyn EvictionPolicy>,
    permits: Semaphore,
    counters: Counters,
    settings: AudioCacheSettings,
}

/// Maps track ids to playable audio, extracting each id at most once at a time.
#[derive(Clone)]
pub struct AudioCache {
    inner: Arc<Inner>,
}

impl AudioCache {
    pub fn new(extractor: Arc<dyn AudioExtractor>, settings: AudioCacheSettings) -> Self {
        Self::with_eviction(extractor, settings, Box::new(NoEviction))
    }

    pub fn with_eviction(
        extractor: Arc<dyn AudioExtractor>,
        settings: AudioCacheSettings,
        eviction: Box<dyn EvictionPolicy>,
    ) -> Self {
        info!(
            "Audio cache at {:?} using extractor '{}', eviction '{}', {} concurrent extractions",
            settings.cache_dir,
            extractor.id(),
            eviction.name(),
            settings.max_concurrent_extractions
        );
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                extractor,
                eviction,
                permits: Semaphore::new(settings.max_concurrent_extractions.max(1)),
                counters: Counters::default(),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &AudioCacheSettings {
        &self.inner.settings
    }

    /// Resolve `track_id` to a playable resource.
    ///
    /// Ready entries are returned without touching the extractor. Otherwise the
    /// caller joins the in-flight extraction for this id, starting one if
    /// there is none.
    pub async fn resolve(&self, track_id: &str) -> Result<AudioResource, ExtractionError> {
        let (reservation, stale) = self.lookup_or_reserve(track_id).await;
        if let Some(stale) = stale {
            remove_file_logged(&stale).await;
        }

        let mut receiver = match reservation {
            Reservation::Hit(resource) => return Ok(resource),
            Reservation::Wait(receiver) => receiver,
        };

        let waiter_timeout = self.inner.settings.waiter_timeout;
        // The borrowed outcome must not outlive `receiver`.
        let waited = tokio::time::timeout(waiter_timeout, receiver.wait_for(Option::is_some))
            .await
            .map(|changed| changed.map(|outcome| (*outcome).clone()));
        match waited {
            Ok(Ok(Some(result))) => result,
            Ok(Ok(None)) | Ok(Err(_)) => Err(ExtractionError::Abandoned),
            Err(_) => {
                warn!(
                    "Gave up waiting for {} after {:?}",
                    track_id, waiter_timeout
                );
                Err(ExtractionError::Timeout(waiter_timeout))
            }
        }
    }

    /// Look `track_id` up under the lock and reserve it when absent.
    ///
    /// Returns the reservation plus the file of an expired entry that has to be
    /// removed once the lock is released.
    async fn lookup_or_reserve(&self, track_id: &str) -> (Reservation, Option<PathBuf>) {
        let mut entries = self.inner.entries.lock().await;
        let now = Instant::now();

        let lookup = match entries.get_mut(track_id) {
            Some(Slot::Ready(entry))
                if !self.inner.eviction.is_expired(&entry.meta(track_id), now) =>
            {
                entry.last_access = now;
                Lookup::Hit(entry.resource.clone())
            }
            Some(Slot::Pending(receiver)) => Lookup::Join(receiver.clone()),
            _ => Lookup::Start,
        };

        match lookup {
            Lookup::Hit(resource) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_audio_cache_event("hit");
                (Reservation::Hit(resource), None)
            }
            Lookup::Join(receiver) => {
                debug!("Joining in-flight extraction of {}", track_id);
                metrics::record_audio_cache_event("join");
                (Reservation::Wait(receiver), None)
            }
            Lookup::Start => {
                let stale = match entries.remove(track_id) {
                    Some(Slot::Ready(expired)) => {
                        debug!("Cache entry for {} expired", track_id);
                        self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
                        metrics::record_audio_cache_event("eviction");
                        expired.resource.local_path().cloned()
                    }
                    _ => None,
                };

                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_audio_cache_event("miss");

                let (sender, receiver) = watch::channel(None);
                entries.insert(track_id.to_string(), Slot::Pending(receiver.clone()));
                self.spawn_extraction(track_id.to_string(), sender);
                (Reservation::Wait(receiver), stale)
            }
        }
    }

    /// Run the extraction on its own task so that a caller going away cannot
    /// leave the entry stuck in `pending`.
    fn spawn_extraction(&self, track_id: String, sender: watch::Sender<Option<Outcome>>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.extract(&track_id).await;
            let evicted = inner.complete(&track_id, &outcome).await;
            sender.send_replace(Some(outcome));
            for path in evicted {
                remove_file_logged(&path).await;
            }
        });
    }

    /// Drop a ready or failed entry, deleting its file. Pending entries are left alone.
    pub async fn invalidate(&self, track_id: &str) -> bool {
        let removed = {
            let mut entries = self.inner.entries.lock().await;
            match entries.get(track_id) {
                None | Some(Slot::Pending(_)) => None,
                Some(_) => entries.remove(track_id),
            }
        };

        match removed {
            Some(Slot::Ready(entry)) => {
                if let Some(path) = entry.resource.local_path() {
                    remove_file_logged(path).await;
                }
                info!("Invalidated cache entry for {}", track_id);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    pub async fn state(&self, track_id: &str) -> Option<EntryState> {
        let entries = self.inner.entries.lock().await;
        entries.get(track_id).map(|slot| match slot {
            Slot::Pending(_) => EntryState::Pending,
            Slot::Ready(_) => EntryState::Ready,
            Slot::Failed(_) => EntryState::Failed,
        })
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.lock().await;
        let mut stats = CacheStats::default();
        for slot in entries.values() {
            match slot {
                Slot::Pending(_) => stats.pending += 1,
                Slot::Ready(_) => stats.ready += 1,
                Slot::Failed(_) => stats.failed += 1,
            }
        }
        let counters = &self.inner.counters;
        stats.hits = counters.hits.load(Ordering::Relaxed);
        stats.misses = counters.misses.load(Ordering::Relaxed);
        stats.extractions = counters.extractions.load(Ordering::Relaxed);
        stats.failures = counters.failures.load(Ordering::Relaxed);
        stats.evictions = counters.evictions.load(Ordering::Relaxed);
        stats
    }

    /// Register the files already in the cache directory as ready entries.
    ///
    /// Leftover partial files from an interrupted write are deleted. Returns
    /// the number of entries loaded.
    pub async fn load_existing(&self) -> Result<usize> {
        let dir = &self.inner.settings.cache_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {:?}", dir))?;

        let mut found: HashMap<String, AudioResource> = HashMap::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Failed to scan {:?}", dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if file_name.starts_with(PARTIAL_PREFIX) {
                debug!("Removing stale partial file {:?}", path);
                remove_file_logged(&path).await;
                continue;
            }

            let Some((track_id, extension)) = parse_cache_file_name(file_name) else {
                warn!("Ignoring unexpected file in cache directory: {:?}", path);
                continue;
            };
            if found.contains_key(&track_id) {
                debug!("Removing duplicate cached file {:?}", path);
                remove_file_logged(&path).await;
                continue;
            }
            let size_bytes = entry_size(&path)?;
            let content_type = content_type_for(&extension).to_string();
            found.insert(
                track_id,
                AudioResource::LocalFile {
                    content_type,
                    path,
                    size_bytes,
                },
            );
        }

        let loaded = found.len();
        let mut entries = self.inner.entries.lock().await;
        for (track_id, resource) in found {
            entries.insert(track_id, Slot::Ready(ReadyEntry::new(resource)));
        }
        info!("Loaded {} cached audio files from {:?}", loaded, dir);
        Ok(loaded)
    }
}

impl Inner {
    async fn extract(&self, track_id: &str) -> Outcome {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractionError::Abandoned)?;

        self.counters.extractions.fetch_add(1, Ordering::Relaxed);
        metrics::record_audio_cache_event("extraction");
        let started = Instant::now();

        let label = format!("extract {}", track_id);
        let extracted = self
            .settings
            .extraction_policy
            .call(&label, || self.extractor.extract(track_id))
            .await?;

        let resource = match extracted {
            ExtractedAudio::Remote { url } => AudioResource::Remote { url },
            ExtractedAudio::Bytes { data, content_type } => {
                self.materialize(track_id, data, content_type).await?
            }
        };
        debug!("Extracted {} in {:?}", track_id, started.elapsed());
        Ok(resource)
    }

    /// Write `data` to the cache directory. The final file only appears once
    /// it is complete.
    async fn materialize(
        &self,
        track_id: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Outcome {
        if data.is_empty() {
            return Err(ExtractionError::Provider(format!(
                "extractor returned no audio for {}",
                track_id
            )));
        }

        let content_type = resolve_content_type(&data, content_type);
        let extension = extension_for(&content_type)
            .or_else(|| infer::get(&data).map(|kind| kind.extension()))
            .unwrap_or(FALLBACK_EXTENSION);

        let dir = &self.settings.cache_dir;
        tokio::fs::create_dir_all(dir).await?;

        // Every materialisation gets its own file, so removing a stale file of
        // this id never touches a newer one.
        let partial = dir.join(format!("{}{}", PARTIAL_PREFIX, uuid::Uuid::new_v4()));
        let target = dir.join(format!(
            "{}.{}.{}",
            urlencoding::encode(track_id),
            uuid::Uuid::new_v4().simple(),
            extension
        ));

        if let Err(e) = tokio::fs::write(&partial, &data).await {
            remove_file_logged(&partial).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            remove_file_logged(&partial).await;
            return Err(e.into());
        }

        debug!("Stored {} bytes for {} at {:?}", data.len(), track_id, target);
        Ok(AudioResource::LocalFile {
            path: target,
            size_bytes: data.len() as u64,
            content_type,
        })
    }

    /// Record the outcome of an extraction. Returns files of evicted entries.
    async fn complete(&self, track_id: &str, outcome: &Outcome) -> Vec<PathBuf> {
        let mut entries = self.entries.lock().await;
        match outcome {
            Ok(resource) => {
                entries.insert(
                    track_id.to_string(),
                    Slot::Ready(ReadyEntry::new(resource.clone())),
                );
                self.evict_locked(&mut entries)
            }
            Err(e) => {
                warn!("Audio extraction for {} failed: {}", track_id, e);
                let seq = self.counters.failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_audio_cache_event("failure");
                entries.insert(track_id.to_string(), Slot::Failed(seq));
                prune_failed_locked(&mut entries);
                Vec::new()
            }
        }
    }

    fn evict_locked(&self, entries: &mut HashMap<String, Slot>) -> Vec<PathBuf> {
        let ready: Vec<EntryMeta> = entries
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Ready(entry) => Some(entry.meta(id)),
                _ => None,
            })
            .collect();

        let mut files = Vec::new();
        for victim in self.eviction.select_victims(&ready, Instant::now()) {
            if !matches!(entries.get(&victim), Some(Slot::Ready(_))) {
                continue;
            }
            if let Some(Slot::Ready(entry)) = entries.remove(&victim) {
                debug!("Evicting cached audio for {}", victim);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_audio_cache_event("eviction");
                if let Some(path) = entry.resource.local_path() {
                    files.push(path.clone());
                }
            }
        }
        files
    }
}

/// Forget the oldest failed entries beyond [`MAX_FAILED_ENTRIES`].
fn prune_failed_locked(entries: &mut HashMap<String, Slot>) {
    let mut failed: Vec<(u64, String)> = entries
        .iter()
        .filter_map(|(id, slot)| match slot {
            Slot::Failed(seq) => Some((*seq, id.clone())),
            _ => None,
        })
        .collect();
    if failed.len() <= MAX_FAILED_ENTRIES {
        return;
    }

    failed.sort_unstable();
    let excess = failed.len() - MAX_FAILED_ENTRIES;
    for (_, id) in failed.into_iter().take(excess) {
        entries.remove(&id);
    }
}

/// Prefer an explicit audio content type, then sniff the bytes.
fn resolve_content_type(data: &[u8], declared: Option<String>) -> String {
    let declared = declared.filter(|ct| !ct.trim().is_empty());
    if let Some(ct) = declared.as_deref().filter(|ct| extension_for(ct).is_some()) {
        return ct.to_string();
    }
    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .or(declared)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Split `<url-encoded id>.<uuid>.<ext>` into the decoded id and the extension.
fn parse_cache_file_name(file_name: &str) -> Option<(String, String)> {
    let mut parts = file_name.rsplitn(3, '.');
    let extension = parts.next()?;
    let tag = parts.next()?;
    let encoded_id = parts.next()?;
    uuid::Uuid::try_parse(tag).ok()?;
    let track_id = urlencoding::decode(encoded_id).ok()?;
    if track_id.is_empty() || extension.is_empty() {
        return None;
    }
    Some((track_id.into_owned(), extension.to_string()))
}

fn entry_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {:?}", path))?
        .len())
}

async fn remove_file_logged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}
