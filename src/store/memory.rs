// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory plan store for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::store::{PlanStore, SavedExecution};

#[derive(Default)]
pub struct MemoryPlanStore {
    records: Mutex<HashMap<String, SavedExecution>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records; test helper.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn save(&self, execution: &SavedExecution) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(execution.goal_hash.clone(), execution.clone());
        Ok(())
    }

    async fn load(&self, goal_hash: &str) -> Result<Option<SavedExecution>, StoreError> {
        Ok(self.records.lock().await.get(goal_hash).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SavedExecution>, StoreError> {
        let mut records: Vec<SavedExecution> =
            self.records.lock().await.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }
}
