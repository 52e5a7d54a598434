// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod execution;
mod graph;
mod model;
mod orchestrator;
mod planning;
mod storage;

pub use execution::{ExecutionError, ProduceError};
pub use graph::GraphError;
pub use model::ModelError;
pub use orchestrator::OrchestratorError;
pub use planning::PlanningError;
pub use storage::{CacheError, StoreError};
