// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-artifact execution state and the aggregated wave-run report.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::traits::OutputPayload;

/// Lifecycle of one artifact within a run.
///
/// `PLANNED -> READY -> (RUNNING | SKIPPED) -> (COMPLETED | FAILED | BLOCKED)`
///
/// Skipped, Completed, Failed and Blocked are terminal. Blocked is reached
/// directly from Planned/Ready when a transitive requirement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Planned,
    Ready,
    Running,
    Skipped,
    Completed,
    Failed,
    Blocked,
}

impl ArtifactState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArtifactState::Skipped
                | ArtifactState::Completed
                | ArtifactState::Failed
                | ArtifactState::Blocked
        )
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition(&self, next: ArtifactState) -> bool {
        use ArtifactState::*;
        matches!(
            (self, next),
            (Planned, Ready)
                | (Planned, Blocked)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Ready, Blocked)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactState::Planned => "planned",
            ArtifactState::Ready => "ready",
            ArtifactState::Running => "running",
            ArtifactState::Skipped => "skipped",
            ArtifactState::Completed => "completed",
            ArtifactState::Failed => "failed",
            ArtifactState::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Result of one produced artifact, moved into the report on completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactResult {
    pub artifact_id: String,
    pub payload: OutputPayload,
    pub content_hash: String,
    pub model_tier: Option<String>,
    pub duration: Duration,
    pub verified: bool,
}

/// An artifact satisfied from the execution cache.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedArtifact {
    pub content_hash: String,
    pub model_tier: Option<String>,
}

/// Everything a wave run produced, keyed by artifact.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub completed: BTreeMap<String, ArtifactResult>,
    pub failed: BTreeMap<String, String>,
    pub skipped: BTreeMap<String, SkippedArtifact>,
    pub blocked: BTreeSet<String>,
    pub cancelled: bool,
    pub duration: Duration,
}

impl ExecutionReport {
    /// State of one artifact as recorded by this run. Artifacts the run
    /// never reached (cancellation) remain `Planned`.
    pub fn state_of(&self, id: &str) -> ArtifactState {
        if self.completed.contains_key(id) {
            ArtifactState::Completed
        } else if self.failed.contains_key(id) {
            ArtifactState::Failed
        } else if self.skipped.contains_key(id) {
            ArtifactState::Skipped
        } else if self.blocked.contains(id) {
            ArtifactState::Blocked
        } else {
            ArtifactState::Planned
        }
    }

    /// A run succeeded when nothing failed, nothing was blocked, and it was
    /// not cancelled.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && !self.cancelled
    }

    /// First failure in ID order, if any.
    pub fn first_error(&self) -> Option<(&str, &str)> {
        self.failed
            .iter()
            .next()
            .map(|(id, err)| (id.as_str(), err.as_str()))
    }
}
