// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod model;
pub mod producer;

pub use model::{collect_stream, ChunkStream, GenerateOptions, ModelBackend};
pub use producer::{ArtifactProducer, OutputPayload, OutputRef, ProduceContext, ProduceOutput};
