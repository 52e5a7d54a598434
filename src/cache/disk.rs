// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Disk-backed execution cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/index.json                  — fingerprint -> entry (+ payload size)
//! <root>/objects/<hh>/<hash>        — content-addressed payload blobs
//! ```
//!
//! Every durable write is temp-then-rename, so concurrent readers and a
//! crashed writer can never observe a torn file. A damaged index or a
//! missing blob is treated as a miss and overwritten on the next put.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::cache::{CacheEntry, CacheLookup, CacheStats, ExecutionCache, PayloadRef};
use crate::errors::CacheError;
use crate::traits::OutputPayload;
use crate::utils::fs::write_atomic;

/// Tuning knobs for the disk cache.
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Entry-count cap; LRU beyond this.
    pub max_entries: usize,
    /// Byte budget across all payloads.
    pub max_bytes: u64,
    /// Payloads at or under this many bytes stay inline in the index.
    pub inline_limit: usize,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 256 * 1024 * 1024,
            inline_limit: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedEntry {
    #[serde(flatten)]
    entry: CacheEntry,
    size_bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: HashMap<String, IndexedEntry>,
}

struct DiskState {
    index: Index,
    hits: u64,
    misses: u64,
}

pub struct DiskCache {
    root: PathBuf,
    config: DiskCacheConfig,
    state: Mutex<DiskState>,
}

impl DiskCache {
    /// Open (or create) a cache rooted at `root`, loading the index.
    /// A damaged index starts empty rather than failing the open.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open_with_config(root, DiskCacheConfig::default())
    }

    pub fn open_with_config(
        root: impl Into<PathBuf>,
        config: DiskCacheConfig,
    ) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("objects")).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;

        let index_path = root.join("index.json");
        let index = match std::fs::read(&index_path) {
            Ok(bytes) => match serde_json::from_slice::<Index>(&bytes) {
                Ok(index) => index,
                Err(err) => {
                    tracing::warn!(path = %index_path.display(), error = %err, "cache index corrupt; starting empty");
                    Index::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Index::default(),
            Err(source) => {
                return Err(CacheError::Io {
                    path: index_path,
                    source,
                })
            }
        };

        Ok(Self {
            root,
            config,
            state: Mutex::new(DiskState {
                index,
                hits: 0,
                misses: 0,
            }),
        })
    }

    /// Flush the index and release the cache. Entries are also persisted on
    /// every `put`, so this is cheap; it exists so embedders get an explicit
    /// teardown edge to pair with [`DiskCache::open`].
    pub async fn close(&self) -> Result<(), CacheError> {
        let state = self.state.lock().await;
        self.persist_index(&state.index)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        let prefix = if hash.len() >= 2 { &hash[..2] } else { "00" };
        self.root.join("objects").join(prefix).join(hash)
    }

    fn persist_index(&self, index: &Index) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes).map_err(|source| CacheError::Io {
            path: self.index_path(),
            source,
        })
    }

    /// True when no other entry still references the blob.
    fn blob_unreferenced(index: &Index, hash: &str) -> bool {
        !index.entries.values().any(
            |indexed| matches!(&indexed.entry.payload, PayloadRef::Blob { hash: h } if h == hash),
        )
    }

    fn remove_blob_if_orphaned(&self, index: &Index, removed: &IndexedEntry) {
        if let PayloadRef::Blob { hash } = &removed.entry.payload {
            if Self::blob_unreferenced(index, hash) {
                let _ = std::fs::remove_file(self.blob_path(hash));
            }
        }
    }

    /// LRU eviction: drop oldest `produced_at` (ties by fingerprint) until
    /// both the entry cap and the byte budget hold.
    fn enforce_caps(&self, index: &mut Index) -> usize {
        let mut evicted = 0;
        loop {
            let total_bytes: u64 = index.entries.values().map(|e| e.size_bytes).sum();
            if index.entries.len() <= self.config.max_entries
                && total_bytes <= self.config.max_bytes
            {
                break;
            }

            let oldest = index
                .entries
                .iter()
                .min_by(|(fp_a, a), (fp_b, b)| {
                    a.entry
                        .produced_at
                        .cmp(&b.entry.produced_at)
                        .then_with(|| fp_a.cmp(fp_b))
                })
                .map(|(fp, _)| fp.clone());

            let Some(fingerprint) = oldest else { break };
            if let Some(removed) = index.entries.remove(&fingerprint) {
                self.remove_blob_if_orphaned(index, &removed);
                tracing::debug!(fingerprint = %fingerprint, "evicted cache entry past cap");
                evicted += 1;
            }
        }
        evicted
    }
}

#[async_trait]
impl ExecutionCache for DiskCache {
    async fn get(&self, fingerprint: &str) -> Result<CacheLookup, CacheError> {
        let mut state = self.state.lock().await;
        let Some(indexed) = state.index.entries.get(fingerprint).cloned() else {
            state.misses += 1;
            return Ok(CacheLookup::Miss);
        };

        // A blob entry whose file vanished is corruption: heal by dropping
        // the entry and reporting a corrupt miss.
        if let PayloadRef::Blob { hash } = &indexed.entry.payload {
            if !self.blob_path(hash).is_file() {
                tracing::warn!(fingerprint, blob = %hash, "cache blob missing; dropping entry");
                state.index.entries.remove(fingerprint);
                state.misses += 1;
                let _ = self.persist_index(&state.index);
                return Ok(CacheLookup::CorruptMiss);
            }
        }

        state.hits += 1;
        Ok(CacheLookup::Hit(indexed.entry))
    }

    async fn put(&self, fingerprint: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;

        // Spill large inline payloads to a content-addressed blob first so
        // the index never points at a blob that does not exist yet.
        let CacheEntry {
            output_hash,
            payload,
            produced_at,
            model_tier,
        } = entry;
        let (payload, size_bytes) = match payload {
            PayloadRef::Inline { text } if text.len() > self.config.inline_limit => {
                let hash = crate::hashing::hash_text(&text);
                let path = self.blob_path(&hash);
                let size = text.len() as u64;
                write_atomic(&path, text.as_bytes()).map_err(|source| CacheError::Io {
                    path,
                    source,
                })?;
                (PayloadRef::Blob { hash }, size)
            }
            PayloadRef::Inline { text } => {
                let size = text.len() as u64;
                (PayloadRef::Inline { text }, size)
            }
            PayloadRef::Blob { hash } => {
                let size = std::fs::metadata(self.blob_path(&hash))
                    .map(|m| m.len())
                    .unwrap_or(0);
                (PayloadRef::Blob { hash }, size)
            }
        };
        let entry = CacheEntry {
            output_hash,
            payload,
            produced_at,
            model_tier,
        };

        let replaced = state.index.entries.insert(
            fingerprint.to_string(),
            IndexedEntry { entry, size_bytes },
        );
        if let Some(old) = replaced {
            self.remove_blob_if_orphaned(&state.index, &old);
        }
        self.enforce_caps(&mut state.index);
        self.persist_index(&state.index)
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size_bytes: state.index.entries.values().map(|e| e.size_bytes).sum(),
            entry_count: state.index.entries.len(),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state.index.entries.clear();
        let objects = self.root.join("objects");
        let _ = std::fs::remove_dir_all(&objects);
        std::fs::create_dir_all(&objects).map_err(|source| CacheError::Io {
            path: objects,
            source,
        })?;
        self.persist_index(&state.index)
    }

    async fn evict(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str, &'a CacheEntry) -> bool + Send + Sync),
    ) -> Result<usize, CacheError> {
        let mut state = self.state.lock().await;
        let doomed: Vec<String> = state
            .index
            .entries
            .iter()
            .filter(|(fp, indexed)| predicate(fp, &indexed.entry))
            .map(|(fp, _)| fp.clone())
            .collect();

        for fingerprint in &doomed {
            if let Some(removed) = state.index.entries.remove(fingerprint) {
                self.remove_blob_if_orphaned(&state.index, &removed);
            }
        }
        if !doomed.is_empty() {
            self.persist_index(&state.index)?;
        }
        Ok(doomed.len())
    }

    fn payload_output(&self, entry: &CacheEntry) -> OutputPayload {
        match &entry.payload {
            PayloadRef::Inline { text } => OutputPayload::Inline(text.clone()),
            PayloadRef::Blob { hash } => OutputPayload::File(self.blob_path(hash)),
        }
    }
}
