// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pure in-memory execution cache for unit tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::{CacheEntry, CacheLookup, CacheStats, ExecutionCache, PayloadRef};
use crate::errors::CacheError;
use crate::traits::OutputPayload;

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Trait-complete stand-in for [`super::DiskCache`] with no disk footprint.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionCache for MemoryCache {
    async fn get(&self, fingerprint: &str) -> Result<CacheLookup, CacheError> {
        let mut state = self.state.lock().await;
        match state.entries.get(fingerprint).cloned() {
            Some(entry) => {
                state.hits += 1;
                Ok(CacheLookup::Hit(entry))
            }
            None => {
                state.misses += 1;
                Ok(CacheLookup::Miss)
            }
        }
    }

    async fn put(&self, fingerprint: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state.entries.insert(fingerprint.to_string(), entry);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let size_bytes = state
            .entries
            .values()
            .map(|entry| match &entry.payload {
                PayloadRef::Inline { text } => text.len() as u64,
                PayloadRef::Blob { .. } => 0,
            })
            .sum();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size_bytes,
            entry_count: state.entries.len(),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.state.lock().await.entries.clear();
        Ok(())
    }

    async fn evict(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str, &'a CacheEntry) -> bool + Send + Sync),
    ) -> Result<usize, CacheError> {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|fp, entry| !predicate(fp, entry));
        Ok(before - state.entries.len())
    }

    fn payload_output(&self, entry: &CacheEntry) -> OutputPayload {
        match &entry.payload {
            PayloadRef::Inline { text } => OutputPayload::Inline(text.clone()),
            // Memory caches never spill, but honor a blob ref if a caller
            // stored one.
            PayloadRef::Blob { hash } => OutputPayload::File(PathBuf::from(hash)),
        }
    }
}
