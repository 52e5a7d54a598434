// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod state;
pub mod wave_executor;

pub use state::{ArtifactResult, ArtifactState, ExecutionReport, SkippedArtifact};
pub use wave_executor::{CheckpointSink, ExecutorConfig, WaveExecutor};
