// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Durable plan records, keyed by goal fingerprint.
//!
//! One [`SavedExecution`] per goal. The file store writes atomically under
//! an advisory per-goal lock; the bus is not durable, so this record (plus
//! the trace JSONL alongside it) is the state resume works from.

mod fs;
mod memory;
mod record;
mod trace;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::hashing::hash_text;

pub use fs::FsPlanStore;
pub use memory::MemoryPlanStore;
pub use record::{
    CompletedArtifact, ExecutionRecord, GraphSnapshot, RunMetrics, RunStatus, SavedExecution,
    SCHEMA_VERSION,
};
pub use trace::TraceWriter;

/// Durable store of per-goal execution records.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Atomically persist the record, replacing any prior version for the
    /// same goal hash. Writers for the same goal are serialized.
    async fn save(&self, execution: &SavedExecution) -> Result<(), StoreError>;

    /// Load the record for a goal hash, or `None` when none was saved.
    async fn load(&self, goal_hash: &str) -> Result<Option<SavedExecution>, StoreError>;

    /// Load by goal text; the hash is derived with the same algorithm used
    /// at save time.
    async fn find_by_goal(&self, goal: &str) -> Result<Option<SavedExecution>, StoreError> {
        self.load(&hash_text(goal)).await
    }

    /// Most recently updated records, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SavedExecution>, StoreError>;
}
