// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use thiserror::Error;

use crate::errors::CacheError;

/// Error returned by an artifact producer for a single artifact.
///
/// A produce failure never aborts sibling artifacts in the same wave; it
/// marks the artifact FAILED and blocks its transitive dependents.
#[derive(Error, Debug)]
pub enum ProduceError {
    /// The underlying tool reported a failure.
    #[error("produce failed: {message}")]
    Tool { message: String },

    /// The spec could not be turned into work (missing contract detail,
    /// unusable paths, and so on).
    #[error("invalid artifact spec: {message}")]
    InvalidSpec { message: String },

    /// File I/O while writing the artifact output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call exceeded the executor's per-produce deadline.
    #[error("produce timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The producer observed the cancellation token and stopped.
    #[error("produce cancelled")]
    Cancelled,
}

/// Errors that abort a wave execution outright.
///
/// Per-artifact failures are not represented here; they are captured in the
/// execution report and surfaced through `artifact_failed` events.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// An artifact ID from a wave was missing from the graph.
    #[error("artifact not found in graph: '{0}'")]
    ArtifactNotFound(String),

    /// The execution cache failed in a way that cannot be treated as a miss.
    #[error("execution cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invariant violation inside the executor.
    #[error("internal execution error: {message}")]
    Internal { message: String },
}
