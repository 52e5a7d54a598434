// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::errors::{ExecutionError, GraphError, PlanningError, StoreError};

/// Top-level errors from `run` / `resume`.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// `resume` was asked for a goal hash with no saved record.
    #[error("no saved execution for goal hash '{goal_hash}'")]
    NoSavedExecution { goal_hash: String },
}
