use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::errors::ModelError;
use crate::events::{EventBus, EventKind};

/// Options forwarded to the model backend on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// A lazy, finite sequence of partial-response chunks.
pub type ChunkStream = BoxStream<'static, Result<String, ModelError>>;

/// The opaque text-generation interface the core plans against.
///
/// The core never branches on which implementation it holds; it only uses
/// this capability set and the [`ModelError`] kinds.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a complete response for the prompt.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, ModelError>;

    /// Generate a streamed response. Backends without native streaming fall
    /// back to a single-chunk stream over `generate`.
    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<ChunkStream, ModelError> {
        let text = self.generate(prompt, opts).await?;
        Ok(futures::stream::once(async move { Ok(text) }).boxed())
    }
}

/// How many chunks accumulate before a `model_tokens` event is emitted.
const TOKEN_EVENT_CHUNK_BATCH: usize = 10;

/// Longest a buffered batch may age before it is flushed anyway.
const TOKEN_EVENT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Concatenate a chunk stream into the full response text, emitting batched
/// `model_tokens` progress events along the way.
///
/// Subscribers never see raw per-chunk events; a `model_tokens` event fires
/// every [`TOKEN_EVENT_CHUNK_BATCH`] chunks or [`TOKEN_EVENT_FLUSH_INTERVAL`],
/// whichever comes first, and once more for any tail.
pub async fn collect_stream(
    mut stream: ChunkStream,
    bus: &EventBus,
    artifact_id: &str,
) -> Result<String, ModelError> {
    bus.publish(EventKind::ModelStart {
        artifact_id: artifact_id.to_string(),
    });

    let mut text = String::new();
    let mut pending_chunks = 0usize;
    let mut last_flush = Instant::now();

    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
        pending_chunks += 1;

        if pending_chunks >= TOKEN_EVENT_CHUNK_BATCH
            || last_flush.elapsed() >= TOKEN_EVENT_FLUSH_INTERVAL
        {
            bus.publish(EventKind::ModelTokens {
                artifact_id: artifact_id.to_string(),
                chunk_count: pending_chunks,
                text_len: text.len(),
            });
            pending_chunks = 0;
            last_flush = Instant::now();
        }
    }

    if pending_chunks > 0 {
        bus.publish(EventKind::ModelTokens {
            artifact_id: artifact_id.to_string(),
            chunk_count: pending_chunks,
            text_len: text.len(),
        });
    }
    bus.publish(EventKind::ModelComplete {
        artifact_id: artifact_id.to_string(),
    });
    Ok(text)
}
