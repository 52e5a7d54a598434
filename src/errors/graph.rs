// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur while building or freezing an artifact graph.
///
/// All of these are detected before any execution starts; none of them are
/// recoverable at this layer. A freeze failure aborts planning for the
/// candidate that produced the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Two artifact specs were added with the same ID
    DuplicateId {
        /// The duplicate artifact ID
        artifact_id: String,
    },
    /// An artifact requires an ID that is not present in the graph
    UnknownDependency {
        /// The artifact with the unresolved requirement
        artifact_id: String,
        /// The requirement that could not be resolved
        missing: String,
    },
    /// The `requires` relation contains a cycle
    Cycle {
        /// The cycle path, ending where it started
        cycle: Vec<String>,
    },
    /// Two artifacts in the same wave declare an overlapping `modifies` path
    Conflict {
        /// First artifact of the conflicting pair
        first: String,
        /// Second artifact of the conflicting pair
        second: String,
        /// The shared path
        path: String,
    },
    /// Two artifacts declare the same `produces_file`
    DuplicateProducedFile {
        first: String,
        second: String,
        path: String,
    },
    /// An operation referenced an artifact ID not present in the graph
    UnknownArtifact {
        artifact_id: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateId { artifact_id } => {
                write!(f, "Duplicate artifact ID: '{}'", artifact_id)
            }
            GraphError::UnknownDependency {
                artifact_id,
                missing,
            } => {
                write!(
                    f,
                    "Artifact '{}' requires '{}' which does not exist",
                    artifact_id, missing
                )
            }
            GraphError::Cycle { cycle } => {
                write!(f, "Cyclic requirement detected: {}", cycle.join(" -> "))
            }
            GraphError::Conflict {
                first,
                second,
                path,
            } => {
                write!(
                    f,
                    "Artifacts '{}' and '{}' would run in the same wave but both modify '{}'",
                    first, second, path
                )
            }
            GraphError::DuplicateProducedFile {
                first,
                second,
                path,
            } => {
                write!(
                    f,
                    "Artifacts '{}' and '{}' both declare produces_file '{}'",
                    first, second, path
                )
            }
            GraphError::UnknownArtifact { artifact_id } => {
                write!(f, "Unknown artifact ID: '{}'", artifact_id)
            }
        }
    }
}

impl std::error::Error for GraphError {}
