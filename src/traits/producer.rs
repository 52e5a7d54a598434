use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::ProduceError;
use crate::events::EventBus;
use crate::graph::ArtifactSpec;

/// Where a completed artifact's output lives.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPayload {
    /// The canonical file the artifact emitted.
    File(PathBuf),
    /// Inline text for artifacts without a produced file.
    Inline(String),
}

/// A completed requirement's output, as handed to dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRef {
    pub content_hash: String,
    pub payload: OutputPayload,
}

/// Per-call context for a producer invocation.
///
/// Producers that honor `cancel` should stop early and return
/// [`ProduceError::Cancelled`]; the executor also copes with producers that
/// ignore it and simply run to completion. Producers that drive a model
/// backend may pass `model_start`/`model_tokens`/`model_thinking`/
/// `model_complete` events through `events`.
#[derive(Clone)]
pub struct ProduceContext {
    pub session_id: String,
    pub wave_index: usize,
    pub cancel: CancellationToken,
    pub events: EventBus,
}

/// What a successful produce call hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct ProduceOutput {
    pub payload: OutputPayload,
    pub model_tier: Option<String>,
    pub verified: bool,
}

impl ProduceOutput {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            payload: OutputPayload::Inline(text.into()),
            model_tier: None,
            verified: false,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            payload: OutputPayload::File(path.into()),
            model_tier: None,
            verified: false,
        }
    }
}

/// The side-effecting collaborator that turns an artifact spec into output.
///
/// Implementations must be thread-safe: the executor calls `produce` from
/// many workers at once, and makes no assumptions about internal state.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    async fn produce(
        &self,
        spec: &ArtifactSpec,
        deps: &BTreeMap<String, OutputRef>,
        ctx: &ProduceContext,
    ) -> Result<ProduceOutput, ProduceError>;
}
