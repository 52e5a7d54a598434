// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Content-addressed execution cache.
//!
//! Keyed by artifact fingerprint (contract + resolved requirement hashes),
//! the cache remembers what an execution produced so an unchanged artifact
//! is never produced twice. The disk implementation survives process
//! restarts; the memory implementation backs unit tests. Both are injected
//! behind [`ExecutionCache`], so the executor never knows which it holds.

mod disk;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CacheError;
use crate::traits::OutputPayload;

pub use disk::{DiskCache, DiskCacheConfig};
pub use memory::MemoryCache;

/// Where a cached payload lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadRef {
    /// Small outputs stored inline in the index.
    Inline { text: String },
    /// Larger outputs stored as a content-addressed blob file.
    Blob { hash: String },
}

/// One cached execution result. Write-once per fingerprint; a later `put`
/// under the same key logically replaces the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub output_hash: String,
    pub payload: PayloadRef,
    pub produced_at: DateTime<Utc>,
    pub model_tier: Option<String>,
}

impl CacheEntry {
    /// Entry holding its payload inline; disk implementations may spill it
    /// to a blob on `put`.
    pub fn inline(
        output_hash: impl Into<String>,
        payload: impl Into<String>,
        model_tier: Option<String>,
    ) -> Self {
        Self {
            output_hash: output_hash.into(),
            payload: PayloadRef::Inline {
                text: payload.into(),
            },
            produced_at: Utc::now(),
            model_tier,
        }
    }
}

/// Outcome of a cache lookup.
///
/// `CorruptMiss` is a miss caused by a damaged entry; the cache has already
/// healed itself (dropped the entry) and the caller should surface a
/// `cache_corruption_detected` event.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
    CorruptMiss,
}

/// Running counters plus current footprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size_bytes: u64,
    pub entry_count: usize,
}

/// Process-wide, content-addressed store of execution results.
///
/// All operations are safe under concurrent executor workers. A lookup must
/// not block longer than a file-system read; a `put` is atomic (readers
/// never see a partially written entry) and last-writer-wins under races.
#[async_trait]
pub trait ExecutionCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Result<CacheLookup, CacheError>;

    async fn put(&self, fingerprint: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn stats(&self) -> CacheStats;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Remove every entry the predicate selects. Returns how many went.
    async fn evict(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str, &'a CacheEntry) -> bool + Send + Sync),
    ) -> Result<usize, CacheError>;

    /// Resolve a cached payload to the form dependents consume.
    fn payload_output(&self, entry: &CacheEntry) -> OutputPayload;
}
