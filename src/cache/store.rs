//! On-disk cache store
//!
//! A single JSON document mapping cache keys to committed images. Every
//! insert rewrites the document atomically (temp file + rename) while
//! holding the store lock, so concurrent inserts from independent chains
//! serialize cleanly.

use crate::cache::key::CacheKey;
use crate::error::{BoxerError, BoxerResult};
use crate::orchestration::ImageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const CACHE_FORMAT_VERSION: u32 = 1;

/// A recorded step result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Image committed by the step
    pub image: ImageRef,
    /// When the entry was recorded
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Which cache operations are honoured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lookups may report hits
    pub read: bool,
    /// Inserts are recorded
    pub write: bool,
}

impl CachePolicy {
    /// Normal caching
    pub fn enabled() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    /// Policy for a build with the given no-cache settings
    pub fn for_build(no_cache: bool, write_when_disabled: bool) -> Self {
        Self {
            read: !no_cache,
            write: !no_cache || write_when_disabled,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::enabled()
    }
}

/// Persistent key → image map
pub struct CacheStore {
    path: PathBuf,
    policy: CachePolicy,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Open the store at `path`; a missing file is an empty cache
    pub async fn open(path: impl Into<PathBuf>, policy: CachePolicy) -> BoxerResult<Self> {
        let path = path.into();
        let document = read_document(&path).await?;
        debug!(
            "Opened cache {} with {} entries",
            path.display(),
            document.entries.len()
        );

        Ok(Self {
            path,
            policy,
            entries: Mutex::new(document.entries),
        })
    }

    /// Replace the file at `path` with an empty cache without reading it
    ///
    /// Recovery path for a document that [`open`](Self::open) rejects.
    pub async fn reset(path: &Path) -> BoxerResult<()> {
        write_document(path, &BTreeMap::new()).await?;
        info!("Reset cache {}", path.display());
        Ok(())
    }

    /// Look up the image recorded for `key`
    ///
    /// Always a miss when the policy disables reads.
    pub async fn lookup(&self, key: &CacheKey) -> BoxerResult<Option<ImageRef>> {
        if !self.policy.read {
            return Ok(None);
        }

        let entries = self.entries.lock().await;
        Ok(entries.get(key.as_str()).map(|e| e.image.clone()))
    }

    /// Record `image` for `key`
    ///
    /// Returns whether a new entry was written. Existing keys are left as is.
    pub async fn insert(&self, key: &CacheKey, image: &ImageRef) -> BoxerResult<bool> {
        if !self.policy.write {
            debug!("Cache writes disabled, dropping entry {}", key);
            return Ok(false);
        }

        let mut entries = self.entries.lock().await;

        // Pick up entries written by other builds since we opened
        let mut merged = read_document(&self.path).await?.entries;
        merged.extend(std::mem::take(&mut *entries));

        if merged.contains_key(key.as_str()) {
            *entries = merged;
            return Ok(false);
        }

        merged.insert(
            key.to_string(),
            CacheEntry {
                image: image.clone(),
                created_at: Utc::now(),
            },
        );

        let written = write_document(&self.path, &merged).await;
        *entries = merged;
        written?;

        debug!("Cached {} -> {}", key, image.short());
        Ok(true)
    }

    /// Drop the entry for `key`, e.g. when its image has disappeared
    pub async fn evict(&self, key: &CacheKey) -> BoxerResult<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key.as_str()).is_some() {
            write_document(&self.path, &entries).await?;
            info!("Evicted stale cache entry {}", key);
        }
        Ok(())
    }

    /// All entries, ordered by key
    pub async fn entries(&self) -> Vec<(CacheKey, CacheEntry)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(k, v)| (CacheKey::from_hex(k.clone()), v.clone()))
            .collect()
    }

    /// Remove every entry, returning how many were dropped
    pub async fn clear(&self) -> BoxerResult<usize> {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        write_document(&self.path, &entries).await?;
        Ok(count)
    }
}

async fn read_document(path: &Path) -> BoxerResult<CacheDocument> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheDocument::default()),
        Err(e) => {
            return Err(BoxerError::CacheRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let document: CacheDocument =
        serde_json::from_str(&content).map_err(|e| BoxerError::CacheRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if document.version != CACHE_FORMAT_VERSION {
        return Err(BoxerError::CacheRead {
            path: path.to_path_buf(),
            reason: format!("unsupported cache format version {}", document.version),
        });
    }

    Ok(document)
}

async fn write_document(path: &Path, entries: &BTreeMap<String, CacheEntry>) -> BoxerResult<()> {
    let write_err = |reason: String| BoxerError::CacheWrite {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| write_err(e.to_string()))?;
    }

    let document = CacheDocument {
        version: CACHE_FORMAT_VERSION,
        entries: entries.clone(),
    };
    let content = serde_json::to_string_pretty(&document).map_err(|e| write_err(e.to_string()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "cache.json".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    fs::write(&tmp, content)
        .await
        .map_err(|e| write_err(e.to_string()))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(write_err(e.to_string()));
    }

    Ok(())
}
