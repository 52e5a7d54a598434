// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for wave executor lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Execution started over a (sub)graph.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutionStarted {
    pub artifact_count: usize,
    pub wave_count: usize,
    pub max_concurrency: usize,
}

impl Display for ExecutionStarted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Starting wave execution: {} artifacts in {} waves, max_concurrency={}",
            self.artifact_count, self.wave_count, self.max_concurrency
        )
    }
}

impl StructuredLog for ExecutionStarted {
    fn log(&self) {
        tracing::info!(
            artifact_count = self.artifact_count,
            wave_count = self.wave_count,
            max_concurrency = self.max_concurrency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "wave_execution",
            span_name = name,
            artifact_count = self.artifact_count,
            wave_count = self.wave_count,
            max_concurrency = self.max_concurrency,
        )
    }
}

/// A wave finished, successfully or not.
///
/// # Log Level
/// `info!` - Important operational event
pub struct WaveFinished {
    pub wave_index: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Display for WaveFinished {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Wave {} finished: {} completed, {} failed, {} skipped",
            self.wave_index, self.completed, self.failed, self.skipped
        )
    }
}

impl StructuredLog for WaveFinished {
    fn log(&self) {
        tracing::info!(
            wave_index = self.wave_index,
            completed = self.completed,
            failed = self.failed,
            skipped = self.skipped,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "wave_finished",
            span_name = name,
            wave_index = self.wave_index,
        )
    }
}

/// An artifact was blocked because a requirement never completed.
///
/// # Log Level
/// `warn!` - The artifact will not run this session
pub struct ArtifactBlocked<'a> {
    pub artifact_id: &'a str,
    pub blocked_on: &'a str,
}

impl Display for ArtifactBlocked<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Artifact '{}' blocked: requirement '{}' did not complete",
            self.artifact_id, self.blocked_on
        )
    }
}

impl StructuredLog for ArtifactBlocked<'_> {
    fn log(&self) {
        tracing::warn!(
            artifact_id = self.artifact_id,
            blocked_on = self.blocked_on,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "artifact_blocked",
            span_name = name,
            artifact_id = self.artifact_id,
        )
    }
}
