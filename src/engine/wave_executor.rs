// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Wave-by-wave concurrent execution of a frozen artifact graph.
//!
//! Each topological wave runs as a batch: every artifact first consults the
//! execution cache by fingerprint, and the misses are dispatched as
//! concurrent `produce` calls bounded by a semaphore. A failure marks only
//! that artifact FAILED; siblings finish, and dependents are marked BLOCKED
//! when a later wave reaches them with an unsatisfied requirement.
//!
//! Cancellation is cooperative: in-flight producers get a child token and
//! are awaited; nothing new is dispatched afterwards, and artifacts never
//! reached stay non-terminal so a resumed run retries them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, CacheLookup, ExecutionCache, PayloadRef};
use crate::engine::state::{ArtifactResult, ExecutionReport, SkippedArtifact};
use crate::errors::{ExecutionError, ProduceError};
use crate::events::{EventBus, EventKind};
use crate::graph::{ArtifactGraph, ArtifactSpec};
use crate::hashing::{fingerprint, hash_file, hash_text};
use crate::observability::messages::engine::{ArtifactBlocked, ExecutionStarted, WaveFinished};
use crate::observability::messages::StructuredLog;
use crate::traits::{ArtifactProducer, OutputPayload, OutputRef, ProduceContext};

/// Receives the cumulative report at every wave boundary, so callers can
/// persist progress. Persistence failures are the sink's problem; the
/// executor keeps going.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn wave_complete(&self, report: &ExecutionReport);
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent `produce` calls per wave.
    pub concurrency: usize,
    /// Wall-clock limit per `produce` call; `None` means unbounded.
    pub produce_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            produce_timeout: None,
        }
    }
}

/// Logical CPUs clamped to [2, 16]; falls back to 4 when detection fails.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(2, 16)
}

enum TaskOutcome {
    /// Cancellation arrived before the producer started; stays non-terminal.
    NotStarted,
    Completed(ArtifactResult),
    Failed { error: String },
}

pub struct WaveExecutor {
    config: ExecutorConfig,
}

impl WaveExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let mut config = config;
        config.concurrency = config.concurrency.max(1);
        Self { config }
    }

    /// Execute every wave of `graph` in order.
    ///
    /// Artifacts in `force` never consult the cache: their fingerprint is
    /// unchanged but their on-disk output is known stale (externally
    /// modified), so only a fresh produce restores it. The returned report
    /// holds terminal states for every artifact the run reached; artifacts
    /// behind a cancellation stay out of the report.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        graph: &ArtifactGraph,
        producer: Arc<dyn ArtifactProducer>,
        cache: Arc<dyn ExecutionCache>,
        bus: &EventBus,
        cancel: CancellationToken,
        force: &BTreeSet<String>,
        checkpoint: Option<&dyn CheckpointSink>,
    ) -> Result<ExecutionReport, ExecutionError> {
        let started = Instant::now();
        let mut report = ExecutionReport::default();
        // Content hash + payload for every satisfied artifact, consumed by
        // dependent fingerprints and producer inputs. Append-only.
        let mut outputs: HashMap<String, OutputRef> = HashMap::new();

        ExecutionStarted {
            artifact_count: graph.len(),
            wave_count: graph.depth(),
            max_concurrency: self.config.concurrency,
        }
        .log();

        for (wave_index, wave) in graph.waves().iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                bus.publish(EventKind::Cancelled);
                break;
            }

            bus.publish(EventKind::WaveStart {
                wave_index,
                artifact_ids: wave.clone(),
            });

            let mut wave_completed = 0usize;
            let mut wave_failed = 0usize;
            let mut wave_skipped = 0usize;
            let mut dispatch: Vec<(ArtifactSpec, String, BTreeMap<String, OutputRef>)> =
                Vec::new();

            for id in wave {
                let spec = graph
                    .get(id)
                    .ok_or_else(|| ExecutionError::ArtifactNotFound(id.clone()))?;

                // A requirement without output failed or was blocked in an
                // earlier wave: this artifact is blocked, terminally.
                if let Some(missing) = spec
                    .requires
                    .iter()
                    .find(|req| !outputs.contains_key(req.as_str()))
                {
                    ArtifactBlocked {
                        artifact_id: id,
                        blocked_on: missing,
                    }
                    .log();
                    report.blocked.insert(id.clone());
                    bus.publish(EventKind::ArtifactBlocked {
                        artifact_id: id.clone(),
                        blocked_on: missing.clone(),
                    });
                    continue;
                }

                let resolved: BTreeMap<String, String> = spec
                    .requires
                    .iter()
                    .filter_map(|req| {
                        outputs
                            .get(req)
                            .map(|output| (req.clone(), output.content_hash.clone()))
                    })
                    .collect();
                let print = fingerprint(spec, &resolved);

                let lookup = if force.contains(id) {
                    CacheLookup::Miss
                } else {
                    cache.get(&print).await?
                };
                match lookup {
                    CacheLookup::Hit(entry) => {
                        bus.publish(EventKind::CacheHit {
                            artifact_id: id.clone(),
                            fingerprint: print.clone(),
                        });
                        let payload = match spec.produces_file.as_deref() {
                            Some(path) => OutputPayload::File(path.into()),
                            None => cache.payload_output(&entry),
                        };
                        outputs.insert(
                            id.clone(),
                            OutputRef {
                                content_hash: entry.output_hash.clone(),
                                payload,
                            },
                        );
                        report.skipped.insert(
                            id.clone(),
                            SkippedArtifact {
                                content_hash: entry.output_hash.clone(),
                                model_tier: entry.model_tier.clone(),
                            },
                        );
                        wave_skipped += 1;
                        bus.publish(EventKind::ArtifactSkipped {
                            artifact_id: id.clone(),
                            content_hash: entry.output_hash,
                        });
                    }
                    lookup => {
                        if lookup == CacheLookup::CorruptMiss {
                            bus.publish(EventKind::CacheCorruptionDetected {
                                fingerprint: print.clone(),
                            });
                        }
                        bus.publish(EventKind::CacheMiss {
                            artifact_id: id.clone(),
                            fingerprint: print.clone(),
                        });

                        let deps: BTreeMap<String, OutputRef> = spec
                            .requires
                            .iter()
                            .filter_map(|req| {
                                outputs.get(req).map(|output| (req.clone(), output.clone()))
                            })
                            .collect();
                        dispatch.push((spec.clone(), print, deps));
                    }
                }
            }

            let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
            let mut tasks = Vec::with_capacity(dispatch.len());
            for (spec, print, deps) in dispatch {
                if cancel.is_cancelled() {
                    // Stop dispatching; already-spawned tasks run out.
                    break;
                }
                tasks.push((
                    spec.id.clone(),
                    tokio::spawn(Self::run_one(
                        spec,
                        print,
                        deps,
                        producer.clone(),
                        cache.clone(),
                        bus.clone(),
                        cancel.clone(),
                        semaphore.clone(),
                        wave_index,
                        self.config.produce_timeout,
                    )),
                ));
            }

            for (id, task) in tasks {
                let outcome = task.await.map_err(|err| ExecutionError::Internal {
                    message: format!("artifact task for '{id}' panicked: {err}"),
                })?;
                match outcome {
                    TaskOutcome::NotStarted => {}
                    TaskOutcome::Completed(result) => {
                        outputs.insert(
                            id.clone(),
                            OutputRef {
                                content_hash: result.content_hash.clone(),
                                payload: result.payload.clone(),
                            },
                        );
                        report.completed.insert(id, result);
                        wave_completed += 1;
                    }
                    TaskOutcome::Failed { error } => {
                        report.failed.insert(id, error);
                        wave_failed += 1;
                    }
                }
            }

            WaveFinished {
                wave_index,
                completed: wave_completed,
                failed: wave_failed,
                skipped: wave_skipped,
            }
            .log();
            bus.publish(EventKind::WaveComplete {
                wave_index,
                completed: wave_completed,
                failed: wave_failed,
                skipped: wave_skipped,
            });

            report.duration = started.elapsed();
            if let Some(sink) = checkpoint {
                sink.wave_complete(&report).await;
            }

            if cancel.is_cancelled() {
                report.cancelled = true;
                bus.publish(EventKind::Cancelled);
                break;
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one(
        spec: ArtifactSpec,
        print: String,
        deps: BTreeMap<String, OutputRef>,
        producer: Arc<dyn ArtifactProducer>,
        cache: Arc<dyn ExecutionCache>,
        bus: EventBus,
        cancel: CancellationToken,
        semaphore: Arc<Semaphore>,
        wave_index: usize,
        produce_timeout: Option<Duration>,
    ) -> TaskOutcome {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return TaskOutcome::NotStarted;
        };
        if cancel.is_cancelled() {
            return TaskOutcome::NotStarted;
        }

        let artifact_id = spec.id.clone();
        bus.publish(EventKind::ArtifactStart {
            artifact_id: artifact_id.clone(),
        });
        let started = Instant::now();

        let ctx = ProduceContext {
            session_id: bus.session_id().to_string(),
            wave_index,
            cancel: cancel.child_token(),
            events: bus.clone(),
        };

        let produced = match produce_timeout {
            Some(limit) => match tokio::time::timeout(
                limit,
                producer.produce(&spec, &deps, &ctx),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProduceError::Timeout { elapsed: limit }),
            },
            None => producer.produce(&spec, &deps, &ctx).await,
        };

        match produced {
            Ok(output) => {
                let content_hash = match &output.payload {
                    OutputPayload::File(path) => hash_file(path),
                    OutputPayload::Inline(text) => hash_text(text),
                };

                // Remember the output so identical future fingerprints skip
                // the producer. Unreadable produced files just skip caching.
                let payload_text = match &output.payload {
                    OutputPayload::Inline(text) => Some(text.clone()),
                    OutputPayload::File(path) => std::fs::read_to_string(path).ok(),
                };
                if let Some(text) = payload_text {
                    let entry = CacheEntry {
                        output_hash: content_hash.clone(),
                        payload: PayloadRef::Inline { text },
                        produced_at: Utc::now(),
                        model_tier: output.model_tier.clone(),
                    };
                    if let Err(err) = cache.put(&print, entry).await {
                        tracing::warn!(
                            artifact_id = %artifact_id,
                            error = %err,
                            "failed to cache artifact output"
                        );
                    }
                }

                let duration = started.elapsed();
                bus.publish(EventKind::ArtifactComplete {
                    artifact_id: artifact_id.clone(),
                    content_hash: content_hash.clone(),
                    duration_ms: duration.as_millis() as u64,
                });
                TaskOutcome::Completed(ArtifactResult {
                    artifact_id,
                    payload: output.payload,
                    content_hash,
                    model_tier: output.model_tier,
                    duration,
                    verified: output.verified,
                })
            }
            Err(err) => {
                let error = err.to_string();
                bus.publish(EventKind::ArtifactFailed {
                    artifact_id,
                    error: error.clone(),
                });
                TaskOutcome::Failed { error }
            }
        }
    }
}

impl Default for WaveExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
