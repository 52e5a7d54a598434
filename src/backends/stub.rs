// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stub backends for testing the planner, executor and orchestrator, and
//! for the smoke binary.
//!
//! # Available Stubs
//!
//! ## StubModelBackend
//! Scripted responses handed out in call order (or one repeating
//! response), with optional chunked streaming:
//! - **Use Case**: Planner candidate batches without a real model
//! - **Behavior**: Pops the next scripted `Result<String, ModelError>`
//!
//! ## StubProducer
//! Deterministic producer that records every call:
//! - **Use Case**: Executor and orchestrator tests, incrementality asserts
//! - **Behavior**: Writes `produces_file` when declared, inline text otherwise
//!
//! ## FailingProducer
//! Fails a chosen set of artifact IDs:
//! - **Use Case**: Failure-isolation and blocked-propagation tests
//!
//! ## SlowProducer
//! Sleeps before answering:
//! - **Use Case**: Timeout and cancellation tests

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::errors::{ModelError, ProduceError};
use crate::graph::ArtifactSpec;
use crate::hashing::hash_text;
use crate::traits::{
    ArtifactProducer, ChunkStream, GenerateOptions, ModelBackend, OutputPayload, OutputRef,
    ProduceContext, ProduceOutput,
};

enum Script {
    Queue(Mutex<std::collections::VecDeque<Result<String, ModelError>>>),
    Repeating(String),
}

/// Scripted model backend.
pub struct StubModelBackend {
    script: Script,
    chunk_size: Option<usize>,
}

impl StubModelBackend {
    /// Responses handed out in call order; exhaustion is a transport error.
    pub fn scripted(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into())),
            chunk_size: None,
        }
    }

    /// The same response for every call.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            script: Script::Repeating(response.into()),
            chunk_size: None,
        }
    }

    /// Stream responses in chunks of `size` characters instead of one piece.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }
}

#[async_trait]
impl ModelBackend for StubModelBackend {
    async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> Result<String, ModelError> {
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".to_string()))),
            Script::Repeating(response) => Ok(response.clone()),
        }
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<ChunkStream, ModelError> {
        let text = self.generate(prompt, opts).await?;
        let Some(size) = self.chunk_size else {
            return Ok(futures::stream::once(async move { Ok(text) }).boxed());
        };

        let chunks: Vec<Result<String, ModelError>> = text
            .as_bytes()
            .chunks(size)
            .map(|chunk| Ok(String::from_utf8_lossy(chunk).into_owned()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// One recorded producer invocation.
#[derive(Debug, Clone)]
pub struct ProducerCall {
    pub artifact_id: String,
    pub dep_ids: Vec<String>,
    pub produced_hash: Option<String>,
}

type ProduceHook = Box<dyn Fn(&ArtifactSpec) + Send + Sync>;

/// Deterministic producer: `produces_file` artifacts get their file written,
/// everything else gets inline text, and every call is recorded.
#[derive(Default)]
pub struct StubProducer {
    calls: Mutex<Vec<ProducerCall>>,
    on_produce: Mutex<Option<ProduceHook>>,
}

impl StubProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The deterministic output text for an artifact.
    pub fn payload_for(spec: &ArtifactSpec) -> String {
        format!("output of {}\n", spec.id)
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn calls(&self) -> Vec<ProducerCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Hook invoked on every produce, before returning. Used to inject
    /// cancellation mid-run.
    pub fn set_on_produce<F>(&self, hook: F)
    where
        F: Fn(&ArtifactSpec) + Send + Sync + 'static,
    {
        *self
            .on_produce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Box::new(hook));
    }
}

#[async_trait]
impl ArtifactProducer for StubProducer {
    async fn produce(
        &self,
        spec: &ArtifactSpec,
        deps: &BTreeMap<String, OutputRef>,
        _ctx: &ProduceContext,
    ) -> Result<ProduceOutput, ProduceError> {
        let text = Self::payload_for(spec);
        let payload = match &spec.produces_file {
            Some(path) => {
                let path = std::path::PathBuf::from(path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, text.as_bytes())?;
                OutputPayload::File(path)
            }
            None => OutputPayload::Inline(text.clone()),
        };

        {
            let mut calls = self
                .calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            calls.push(ProducerCall {
                artifact_id: spec.id.clone(),
                dep_ids: deps.keys().cloned().collect(),
                produced_hash: Some(hash_text(&text)),
            });
        }
        if let Some(hook) = &*self
            .on_produce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
        {
            hook(spec);
        }

        Ok(ProduceOutput {
            payload,
            model_tier: Some("standard".to_string()),
            verified: true,
        })
    }
}

/// Fails the chosen IDs; produces the rest like [`StubProducer`].
pub struct FailingProducer {
    failing: Vec<String>,
    inner: StubProducer,
}

impl FailingProducer {
    pub fn failing_ids(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            inner: StubProducer::new(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.inner.call_count()
    }
}

#[async_trait]
impl ArtifactProducer for FailingProducer {
    async fn produce(
        &self,
        spec: &ArtifactSpec,
        deps: &BTreeMap<String, OutputRef>,
        ctx: &ProduceContext,
    ) -> Result<ProduceOutput, ProduceError> {
        if self.failing.contains(&spec.id) {
            self.inner
                .calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(ProducerCall {
                    artifact_id: spec.id.clone(),
                    dep_ids: deps.keys().cloned().collect(),
                    produced_hash: None,
                });
            return Err(ProduceError::Tool {
                message: format!("injected failure for '{}'", spec.id),
            });
        }
        self.inner.produce(spec, deps, ctx).await
    }
}

/// Sleeps before producing; pairs with executor timeouts.
pub struct SlowProducer {
    delay: Duration,
    inner: StubProducer,
}

impl SlowProducer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: StubProducer::new(),
        }
    }
}

#[async_trait]
impl ArtifactProducer for SlowProducer {
    async fn produce(
        &self,
        spec: &ArtifactSpec,
        deps: &BTreeMap<String, OutputRef>,
        ctx: &ProduceContext,
    ) -> Result<ProduceOutput, ProduceError> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = ctx.cancel.cancelled() => return Err(ProduceError::Cancelled),
        }
        self.inner.produce(spec, deps, ctx).await
    }
}
