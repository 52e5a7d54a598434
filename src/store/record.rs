// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The schema-v1 saved-execution record.
//!
//! Field names here are the cross-language wire contract; the file is plain
//! JSON so other tooling can read plan state without this crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GraphError;
use crate::graph::{ArtifactGraph, ArtifactSpec};

/// Highest (and currently only) schema version this build reads or writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Lifecycle of a saved execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planned,
    InProgress,
    Paused,
    Completed,
    Failed,
}

/// Frozen-graph snapshot: the specs plus their wave layout at plan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub artifacts: BTreeMap<String, ArtifactSpec>,
    pub waves: Vec<Vec<String>>,
}

impl GraphSnapshot {
    pub fn of(graph: &ArtifactGraph) -> Self {
        Self {
            artifacts: graph
                .iter()
                .map(|spec| (spec.id.clone(), spec.clone()))
                .collect(),
            waves: graph.waves().to_vec(),
        }
    }

    /// Rebuild (and re-validate) the frozen graph from the snapshot.
    pub fn to_graph(&self) -> Result<ArtifactGraph, GraphError> {
        ArtifactGraph::from_specs(self.artifacts.values().cloned().collect())
    }
}

/// Terminal record for one completed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedArtifact {
    pub content_hash: String,
    pub model_tier: Option<String>,
    pub duration_ms: u64,
    pub verified: bool,
}

/// Progress portion of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: RunStatus,
    pub completed: BTreeMap<String, CompletedArtifact>,
    pub failed: BTreeMap<String, String>,
    pub skipped: Vec<String>,
}

impl ExecutionRecord {
    pub fn planned() -> Self {
        Self {
            status: RunStatus::Planned,
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }
}

/// Plan-quality and run metrics carried with the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_duration_ms: u64,
    pub model_distribution: BTreeMap<String, u64>,
    pub parallelism_factor: f64,
    pub depth: usize,
    pub score: f64,
}

/// The single persistent record per goal.
///
/// Created by the orchestrator, mutated only through the plan store API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedExecution {
    pub version: u32,
    pub goal: String,
    pub goal_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub graph: GraphSnapshot,
    pub execution: ExecutionRecord,
    pub metrics: RunMetrics,
}

impl SavedExecution {
    pub fn new(goal: impl Into<String>, goal_hash: impl Into<String>, graph: &ArtifactGraph) -> Self {
        let now = Utc::now();
        Self {
            version: SCHEMA_VERSION,
            goal: goal.into(),
            goal_hash: goal_hash.into(),
            created_at: now,
            updated_at: now,
            graph: GraphSnapshot::of(graph),
            execution: ExecutionRecord::planned(),
            metrics: RunMetrics::default(),
        }
    }
}
