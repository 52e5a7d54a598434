// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod artifact_graph;
mod spec;

pub use artifact_graph::{ArtifactGraph, GraphBuilder};
pub use spec::ArtifactSpec;
