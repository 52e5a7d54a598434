// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record on the session event stream.
///
/// `seq` is per-session and strictly increasing in publish order. The trace
/// log serializes events one per line, flattening the kind into an `event`
/// discriminator plus its payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub session_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The closed event taxonomy.
///
/// Serialized names are the wire contract for trace files and subscribers;
/// renaming a variant is a schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart {
        goal_hash: String,
    },
    SessionEnd,
    PlanningStart {
        goal_hash: String,
        candidates: usize,
    },
    PlanCandidate {
        index: usize,
        artifact_count: usize,
        score: f64,
    },
    PlanWinner {
        artifact_count: usize,
        depth: usize,
        score: f64,
    },
    PlanningFailed {
        error: String,
    },
    RunStart {
        goal_hash: String,
        artifact_count: usize,
    },
    WaveStart {
        wave_index: usize,
        artifact_ids: Vec<String>,
    },
    WaveComplete {
        wave_index: usize,
        completed: usize,
        failed: usize,
        skipped: usize,
    },
    ArtifactStart {
        artifact_id: String,
    },
    ArtifactComplete {
        artifact_id: String,
        content_hash: String,
        duration_ms: u64,
    },
    ArtifactFailed {
        artifact_id: String,
        error: String,
    },
    ArtifactSkipped {
        artifact_id: String,
        content_hash: String,
    },
    ArtifactBlocked {
        artifact_id: String,
        blocked_on: String,
    },
    CacheHit {
        artifact_id: String,
        fingerprint: String,
    },
    CacheMiss {
        artifact_id: String,
        fingerprint: String,
    },
    CacheCorruptionDetected {
        fingerprint: String,
    },
    Cancelled,
    RunComplete {
        completed: usize,
        skipped: usize,
        duration_ms: u64,
    },
    RunFailed {
        completed: usize,
        failed: usize,
        blocked: usize,
    },
    RunPaused {
        completed: usize,
    },
    ModelStart {
        artifact_id: String,
    },
    ModelTokens {
        artifact_id: String,
        chunk_count: usize,
        text_len: usize,
    },
    ModelThinking {
        artifact_id: String,
    },
    ModelComplete {
        artifact_id: String,
    },
    /// Inserted per-subscriber in place of events lost to a full buffer.
    BufferOverflow {
        dropped: u64,
    },
}

impl EventKind {
    /// The serialized discriminator, for log lines and assertions.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SessionStart { .. } => "session_start",
            EventKind::SessionEnd => "session_end",
            EventKind::PlanningStart { .. } => "planning_start",
            EventKind::PlanCandidate { .. } => "plan_candidate",
            EventKind::PlanWinner { .. } => "plan_winner",
            EventKind::PlanningFailed { .. } => "planning_failed",
            EventKind::RunStart { .. } => "run_start",
            EventKind::WaveStart { .. } => "wave_start",
            EventKind::WaveComplete { .. } => "wave_complete",
            EventKind::ArtifactStart { .. } => "artifact_start",
            EventKind::ArtifactComplete { .. } => "artifact_complete",
            EventKind::ArtifactFailed { .. } => "artifact_failed",
            EventKind::ArtifactSkipped { .. } => "artifact_skipped",
            EventKind::ArtifactBlocked { .. } => "artifact_blocked",
            EventKind::CacheHit { .. } => "cache_hit",
            EventKind::CacheMiss { .. } => "cache_miss",
            EventKind::CacheCorruptionDetected { .. } => "cache_corruption_detected",
            EventKind::Cancelled => "cancelled",
            EventKind::RunComplete { .. } => "run_complete",
            EventKind::RunFailed { .. } => "run_failed",
            EventKind::RunPaused { .. } => "run_paused",
            EventKind::ModelStart { .. } => "model_start",
            EventKind::ModelTokens { .. } => "model_tokens",
            EventKind::ModelThinking { .. } => "model_thinking",
            EventKind::ModelComplete { .. } => "model_complete",
            EventKind::BufferOverflow { .. } => "buffer_overflow",
        }
    }
}
