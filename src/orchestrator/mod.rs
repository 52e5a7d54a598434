// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Top-level plan-and-execute entry point.
//!
//! `run` ties the planner, change detector, wave executor, cache and plan
//! store together: load prior state, plan (or reuse the stored graph on
//! resume), compute the minimal rebuild set, execute its subgraph, and
//! persist progress at every wave boundary plus both terminal edges. The
//! saved record is owned exclusively by this module during a run; the store
//! serializes the actual writes.

#[cfg(test)]
mod integration_tests;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cache::ExecutionCache;
use crate::detect::{detect_changes, rebuild_set};
use crate::engine::{CheckpointSink, ExecutionReport, WaveExecutor};
use crate::errors::OrchestratorError;
use crate::events::{EventBus, EventKind};
use crate::graph::ArtifactGraph;
use crate::hashing::hash_text;
use crate::observability::messages::storage::PlanPersisted;
use crate::observability::messages::StructuredLog;
use crate::planner::{score_graph, HarmonicPlanner, PlanMetrics};
use crate::store::{CompletedArtifact, PlanStore, RunStatus, SavedExecution, TraceWriter};
use crate::traits::ArtifactProducer;

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reuse the stored graph snapshot instead of re-planning, when one
    /// exists.
    pub resume: bool,
    /// Extra context forwarded to the planner prompt.
    pub context: Option<String>,
    /// Cooperative cancellation; pausing persists partial state.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: false,
            context: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// What a run ended as.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub goal_hash: String,
    pub completed_count: usize,
    pub failed_count: usize,
    pub blocked_count: usize,
    pub skipped_count: usize,
    pub final_status: RunStatus,
    pub first_error: Option<String>,
}

pub struct Orchestrator {
    planner: HarmonicPlanner,
    producer: Arc<dyn ArtifactProducer>,
    cache: Arc<dyn ExecutionCache>,
    store: Arc<dyn PlanStore>,
    executor: WaveExecutor,
    trace_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        planner: HarmonicPlanner,
        producer: Arc<dyn ArtifactProducer>,
        cache: Arc<dyn ExecutionCache>,
        store: Arc<dyn PlanStore>,
    ) -> Self {
        Self {
            planner,
            producer,
            cache,
            store,
            executor: WaveExecutor::default(),
            trace_dir: None,
        }
    }

    pub fn with_executor(mut self, executor: WaveExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Write `<goal_hash>.trace.jsonl` under `dir` for every run.
    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    /// Plan and execute a goal end to end.
    pub async fn run(
        &self,
        goal: &str,
        options: RunOptions,
    ) -> Result<RunSummary, OrchestratorError> {
        let goal_hash = hash_text(goal);
        let session_id = format!("{}-{}", goal_hash, Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        let bus = EventBus::new(session_id);
        let trace = self
            .trace_dir
            .as_ref()
            .map(|dir| TraceWriter::spawn(&bus, dir.join(format!("{goal_hash}.trace.jsonl"))));

        bus.publish(EventKind::SessionStart {
            goal_hash: goal_hash.clone(),
        });
        let result = self.run_session(goal, &goal_hash, &options, &bus).await;
        bus.publish(EventKind::SessionEnd);
        bus.close();
        if let Some(trace) = trace {
            trace.finish().await;
        }
        result
    }

    /// Resume a previously saved goal by hash. Completed artifacts remain
    /// completed; failed, blocked and never-reached artifacts re-enter the
    /// rebuild set.
    pub async fn resume(
        &self,
        goal_hash: &str,
        cancel: CancellationToken,
    ) -> Result<RunSummary, OrchestratorError> {
        let saved = self.store.load(goal_hash).await?.ok_or_else(|| {
            OrchestratorError::NoSavedExecution {
                goal_hash: goal_hash.to_string(),
            }
        })?;
        let goal = saved.goal.clone();
        self.run(
            &goal,
            RunOptions {
                resume: true,
                context: None,
                cancel,
            },
        )
        .await
    }

    async fn run_session(
        &self,
        goal: &str,
        goal_hash: &str,
        options: &RunOptions,
        bus: &EventBus,
    ) -> Result<RunSummary, OrchestratorError> {
        let prior = self.store.load(goal_hash).await?;

        let (graph, plan_metrics) = match prior.as_ref() {
            Some(saved) if options.resume => {
                let graph = saved.graph.to_graph()?;
                let metrics = score_graph(&graph);
                (graph, metrics)
            }
            _ => {
                self.planner
                    .plan(goal, options.context.as_deref(), bus)
                    .await?
            }
        };

        let report = detect_changes(&graph, prior.as_ref());
        let rebuild = rebuild_set(&graph, &report, prior.as_ref());

        // Strict incrementality: nothing changed and the prior run finished.
        if rebuild.is_empty() {
            if let Some(prior) = prior
                .as_ref()
                .filter(|p| p.execution.status == RunStatus::Completed)
            {
                let completed_count = prior.execution.completed.len();
                bus.publish(EventKind::RunComplete {
                    completed: completed_count,
                    skipped: graph.len(),
                    duration_ms: 0,
                });
                return Ok(RunSummary {
                    goal_hash: goal_hash.to_string(),
                    completed_count,
                    failed_count: 0,
                    blocked_count: 0,
                    skipped_count: graph.len(),
                    final_status: RunStatus::Completed,
                    first_error: None,
                });
            }
        }

        let subgraph = if rebuild.is_empty() {
            ArtifactGraph::empty()
        } else {
            graph.subgraph(rebuild.iter().map(String::as_str))?
        };

        // Base record: the full planned graph plus every prior completed
        // artifact that survives outside the rebuild set.
        let mut saved = SavedExecution::new(goal, goal_hash, &graph);
        if let Some(prior) = prior.as_ref() {
            saved.created_at = prior.created_at;
            for (id, done) in &prior.execution.completed {
                if graph.contains(id) && !rebuild.contains(id) {
                    saved.execution.completed.insert(id.clone(), done.clone());
                }
            }
        }
        apply_plan_metrics(&mut saved, &plan_metrics);
        saved.execution.status = RunStatus::InProgress;
        saved.updated_at = Utc::now();
        self.store.save(&saved).await?;

        bus.publish(EventKind::RunStart {
            goal_hash: goal_hash.to_string(),
            artifact_count: subgraph.len(),
        });
        let run_started = Instant::now();

        // Only externally modified outputs bypass the cache; everything
        // else in the rebuild set re-fingerprints anyway, and closure-only
        // requirements are free to skip.
        let force: BTreeSet<String> = report
            .output_modified
            .iter()
            .filter(|id| subgraph.contains(id))
            .cloned()
            .collect();

        let sink = PersistSink {
            store: self.store.clone(),
            base: tokio::sync::Mutex::new(saved.clone()),
        };
        let exec_report = self
            .executor
            .execute(
                &subgraph,
                self.producer.clone(),
                self.cache.clone(),
                bus,
                options.cancel.clone(),
                &force,
                Some(&sink),
            )
            .await?;

        merge_report(&mut saved, &exec_report);
        let final_status = if exec_report.cancelled {
            RunStatus::Paused
        } else if !exec_report.failed.is_empty() || !exec_report.blocked.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        saved.execution.status = final_status;
        saved.metrics.total_duration_ms = run_started.elapsed().as_millis() as u64;
        saved.updated_at = Utc::now();
        self.store.save(&saved).await?;
        PlanPersisted {
            goal_hash,
            status: status_name(final_status),
        }
        .log();

        let completed_count = saved.execution.completed.len();
        match final_status {
            RunStatus::Completed => {
                bus.publish(EventKind::RunComplete {
                    completed: completed_count,
                    skipped: exec_report.skipped.len(),
                    duration_ms: saved.metrics.total_duration_ms,
                });
            }
            RunStatus::Failed => {
                bus.publish(EventKind::RunFailed {
                    completed: completed_count,
                    failed: exec_report.failed.len(),
                    blocked: exec_report.blocked.len(),
                });
            }
            _ => {
                bus.publish(EventKind::RunPaused {
                    completed: completed_count,
                });
            }
        }

        Ok(RunSummary {
            goal_hash: goal_hash.to_string(),
            completed_count,
            failed_count: exec_report.failed.len(),
            blocked_count: exec_report.blocked.len(),
            skipped_count: exec_report.skipped.len(),
            final_status,
            first_error: exec_report
                .first_error()
                .map(|(id, err)| format!("{id}: {err}")),
        })
    }
}

/// Persists the cumulative report after every wave. A failed save is logged
/// and the run continues; the terminal save will retry.
struct PersistSink {
    store: Arc<dyn PlanStore>,
    base: tokio::sync::Mutex<SavedExecution>,
}

#[async_trait]
impl CheckpointSink for PersistSink {
    async fn wave_complete(&self, report: &ExecutionReport) {
        let mut saved = self.base.lock().await;
        merge_report(&mut saved, report);
        saved.execution.status = RunStatus::InProgress;
        saved.updated_at = Utc::now();
        match self.store.save(&saved).await {
            Ok(()) => {
                PlanPersisted {
                    goal_hash: &saved.goal_hash,
                    status: "in_progress",
                }
                .log();
            }
            Err(err) => {
                tracing::warn!(goal_hash = %saved.goal_hash, error = %err, "wave checkpoint save failed");
            }
        }
    }
}

/// Fold an execution report into the saved record. Cache-skipped artifacts
/// count as completed (they are terminally satisfied) and are also listed
/// under `skipped`.
fn merge_report(saved: &mut SavedExecution, report: &ExecutionReport) {
    for (id, result) in &report.completed {
        saved.execution.completed.insert(
            id.clone(),
            CompletedArtifact {
                content_hash: result.content_hash.clone(),
                model_tier: result.model_tier.clone(),
                duration_ms: result.duration.as_millis() as u64,
                verified: result.verified,
            },
        );
    }
    for (id, skipped) in &report.skipped {
        saved.execution.completed.insert(
            id.clone(),
            CompletedArtifact {
                content_hash: skipped.content_hash.clone(),
                model_tier: skipped.model_tier.clone(),
                duration_ms: 0,
                verified: true,
            },
        );
    }
    saved.execution.failed = report.failed.clone();
    saved.execution.skipped = report.skipped.keys().cloned().collect();

    saved.metrics.model_distribution.clear();
    for done in saved.execution.completed.values() {
        let tier = done
            .model_tier
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        *saved.metrics.model_distribution.entry(tier).or_insert(0) += 1;
    }
}

fn apply_plan_metrics(saved: &mut SavedExecution, metrics: &PlanMetrics) {
    saved.metrics.parallelism_factor = metrics.parallelism_factor;
    saved.metrics.depth = metrics.depth;
    saved.metrics.score = metrics.score;
}

fn status_name(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Planned => "planned",
        RunStatus::InProgress => "in_progress",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}
