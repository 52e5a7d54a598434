// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! File-system plan store.
//!
//! Records live at `<root>/<goal_hash>.json`, written temp-then-rename so a
//! reader never sees a torn record and a crashed writer leaves either the
//! prior version or an ignorable temp file. Same-goal writers are
//! serialized two ways: an in-process mutex per goal hash, and an advisory
//! `<goal_hash>.lock` file for writers in other processes. No file-lock
//! syscall wrapper is used; the lock file is `create_new` with bounded
//! retry and RAII removal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::store::{PlanStore, SavedExecution, SCHEMA_VERSION};
use crate::utils::fs::{is_temp_file, write_atomic};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const LOCK_RETRY_LIMIT: u32 = 200; // ~5 seconds

/// Removes the lock file on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    async fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        for _ in 0..LOCK_RETRY_LIMIT {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Err(StoreError::LockBusy { path })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct FsPlanStore {
    root: PathBuf,
    goal_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsPlanStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            goal_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn record_path(&self, goal_hash: &str) -> PathBuf {
        self.root.join(format!("{goal_hash}.json"))
    }

    /// Path of the append-only event trace for a goal.
    pub fn trace_path(&self, goal_hash: &str) -> PathBuf {
        self.root.join(format!("{goal_hash}.trace.jsonl"))
    }

    fn lock_path(&self, goal_hash: &str) -> PathBuf {
        self.root.join(format!("{goal_hash}.lock"))
    }

    async fn goal_lock(&self, goal_hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self.goal_locks.lock().await;
        locks
            .entry(goal_hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_record(path: &Path) -> Result<Option<SavedExecution>, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let saved: SavedExecution =
            serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        if saved.version > SCHEMA_VERSION || saved.version < 1 {
            return Err(StoreError::UnsupportedVersion {
                found: saved.version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(Some(saved))
    }
}

#[async_trait]
impl PlanStore for FsPlanStore {
    async fn save(&self, execution: &SavedExecution) -> Result<(), StoreError> {
        let goal_lock = self.goal_lock(&execution.goal_hash).await;
        let _in_process = goal_lock.lock().await;
        let _lock_file = LockFile::acquire(self.lock_path(&execution.goal_hash)).await?;

        let bytes = serde_json::to_vec_pretty(execution)?;
        let path = self.record_path(&execution.goal_hash);
        write_atomic(&path, &bytes).map_err(|source| StoreError::Io { path, source })
    }

    async fn load(&self, goal_hash: &str) -> Result<Option<SavedExecution>, StoreError> {
        Self::read_record(&self.record_path(goal_hash))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SavedExecution>, StoreError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true)
                || is_temp_file(&path)
                || path
                    .file_name()
                    .map(|n| n.to_string_lossy().ends_with(".trace.jsonl"))
                    .unwrap_or(false)
            {
                continue;
            }
            // A listing skips unreadable records instead of failing; the
            // direct load path is where corruption is fatal.
            match Self::read_record(&path) {
                Ok(Some(saved)) => records.push(saved),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable plan record");
                }
            }
        }

        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ArtifactGraph, ArtifactSpec};
    use crate::hashing::hash_text;
    use crate::store::RunStatus;

    fn sample(goal: &str) -> SavedExecution {
        let graph =
            ArtifactGraph::from_specs(vec![ArtifactSpec::new("a", "contract")]).unwrap();
        SavedExecution::new(goal, hash_text(goal), &graph)
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let saved = sample("goal one");
        store.save(&saved).await.unwrap();

        let loaded = store.load(&saved.goal_hash).await.unwrap().unwrap();
        assert_eq!(saved, loaded);
    }

    #[tokio::test]
    async fn test_load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();
        assert!(store.load("nothere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_goal_uses_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let saved = sample("incremental goal");
        store.save(&saved).await.unwrap();

        let found = store.find_by_goal("incremental goal").await.unwrap();
        assert_eq!(found, Some(saved));
        assert!(store.find_by_goal("different").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_fatal_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();
        std::fs::write(store.record_path("bad"), b"{torn write").unwrap();

        match store.load("bad").await {
            Err(StoreError::Corrupt { .. }) => {}
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_newer_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let mut saved = sample("future goal");
        saved.version = SCHEMA_VERSION + 1;
        let bytes = serde_json::to_vec(&saved).unwrap();
        std::fs::write(store.record_path(&saved.goal_hash), bytes).unwrap();

        match store.load(&saved.goal_hash).await {
            Err(StoreError::UnsupportedVersion { found, supported }) => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loader_ignores_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let saved = sample("real goal");
        store.save(&saved).await.unwrap();
        std::fs::write(dir.path().join("orphan.json.tmp.999"), b"garbage").unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].goal_hash, saved.goal_hash);
    }

    #[tokio::test]
    async fn test_list_recent_orders_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let mut older = sample("older");
        older.updated_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        let mut newer = sample("newer");
        newer.execution.status = RunStatus::Completed;

        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let recent = store.list_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].goal_hash, newer.goal_hash);
    }

    #[tokio::test]
    async fn test_stale_lock_makes_save_report_busy() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPlanStore::open(dir.path()).unwrap();

        let saved = sample("locked goal");
        std::fs::write(dir.path().join(format!("{}.lock", saved.goal_hash)), b"").unwrap();

        // Shrink the wait by racing the save against a timeout slightly
        // longer than the retry budget.
        let result = tokio::time::timeout(Duration::from_secs(10), store.save(&saved)).await;
        match result {
            Ok(Err(StoreError::LockBusy { .. })) => {}
            other => panic!("expected lock busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsPlanStore::open(dir.path()).unwrap());

        let saved = sample("contended goal");
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let mut copy = saved.clone();
            copy.updated_at = chrono::Utc::now();
            handles.push(tokio::spawn(async move { store.save(&copy).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(store.load(&saved.goal_hash).await.unwrap().is_some());
    }
}
