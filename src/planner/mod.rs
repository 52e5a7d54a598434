// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Harmonic planning: generate several plan candidates in parallel through
//! structured variance, score every graph that freezes, keep the best, and
//! optionally refine it while the score strictly improves.

mod candidate;
mod scoring;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::errors::{GraphError, ModelError, PlanningError};
use crate::events::{EventBus, EventKind};
use crate::graph::{ArtifactGraph, GraphBuilder};
use crate::hashing::hash_text;
use crate::observability::messages::planner::{CandidateDropped, RefinementAccepted};
use crate::observability::messages::StructuredLog;
use crate::traits::{collect_stream, GenerateOptions, ModelBackend};

pub use candidate::{
    build_prompt, build_refine_prompt, candidate_configs, parse_artifact_specs, CandidateConfig,
    PromptStyle, VariantAxis,
};
pub use scoring::{score_graph, weakest_metric_feedback, PlanMetrics};

/// Planner tuning. The variance axis is a fixed property of the planner
/// instance, not chosen per call.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub candidates: usize,
    pub refine_rounds: usize,
    pub axis: VariantAxis,
    pub base_temperature: f64,
    pub max_tokens: u32,
    /// Use the backend's streaming interface for candidate generation.
    pub stream: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            candidates: 5,
            refine_rounds: 0,
            axis: VariantAxis::PromptStyle,
            base_temperature: 0.7,
            max_tokens: 4096,
            stream: false,
        }
    }
}

struct Candidate {
    index: usize,
    graph: ArtifactGraph,
    metrics: PlanMetrics,
    sorted_ids: Vec<String>,
}

enum CandidateFailure {
    Model(ModelError),
    Parse(String),
    Freeze(GraphError),
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateFailure::Model(err) => write!(f, "model: {err}"),
            CandidateFailure::Parse(err) => write!(f, "parse: {err}"),
            CandidateFailure::Freeze(err) => write!(f, "freeze: {err}"),
        }
    }
}

pub struct HarmonicPlanner {
    backend: Arc<dyn ModelBackend>,
    config: PlannerConfig,
}

impl HarmonicPlanner {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self::with_config(backend, PlannerConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ModelBackend>, config: PlannerConfig) -> Self {
        Self { backend, config }
    }

    /// Plan a goal: N parallel candidates, one winner.
    ///
    /// Candidate failures (model errors, unparseable output, freeze
    /// rejections) never abort the batch; planning fails only when every
    /// candidate fails, after a `planning_failed` event.
    pub async fn plan(
        &self,
        goal: &str,
        context: Option<&str>,
        bus: &EventBus,
    ) -> Result<(ArtifactGraph, PlanMetrics), PlanningError> {
        if self.config.candidates == 0 {
            return Err(PlanningError::NoCandidates);
        }

        let goal_hash = hash_text(goal);
        bus.publish(EventKind::PlanningStart {
            goal_hash,
            candidates: self.config.candidates,
        });

        let configs = candidate_configs(
            self.config.axis,
            self.config.candidates,
            self.config.base_temperature,
        );

        let mut tasks = Vec::with_capacity(configs.len());
        for config in configs {
            let backend = self.backend.clone();
            let bus = bus.clone();
            let prompt = build_prompt(goal, context, &config);
            let opts = GenerateOptions {
                temperature: config.temperature,
                max_tokens: self.config.max_tokens,
            };
            let stream = self.config.stream;
            let index = config.index;

            tasks.push(tokio::spawn(async move {
                let result =
                    Self::generate_candidate(&*backend, &bus, &prompt, &opts, index, stream).await;
                (index, result)
            }));
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut attempted = 0usize;
        for task in tasks {
            let Ok((index, result)) = task.await else {
                attempted += 1;
                continue;
            };
            attempted += 1;
            match result {
                Ok(candidate) => {
                    bus.publish(EventKind::PlanCandidate {
                        index,
                        artifact_count: candidate.metrics.artifact_count,
                        score: candidate.metrics.score,
                    });
                    candidates.push(candidate);
                }
                Err(failure) => {
                    CandidateDropped {
                        index,
                        reason: &failure.to_string(),
                    }
                    .log();
                }
            }
        }

        let Some(mut best) = candidates.into_iter().reduce(|best, next| {
            if Self::is_better(&next, &best) {
                next
            } else {
                best
            }
        }) else {
            let error = format!("all {attempted} plan candidates failed");
            bus.publish(EventKind::PlanningFailed {
                error: error.clone(),
            });
            return Err(PlanningError::AllCandidatesFailed { attempted });
        };

        self.refine(goal, &mut best, bus).await;

        bus.publish(EventKind::PlanWinner {
            artifact_count: best.metrics.artifact_count,
            depth: best.metrics.depth,
            score: best.metrics.score,
        });
        Ok((best.graph, best.metrics))
    }

    async fn generate_candidate(
        backend: &dyn ModelBackend,
        bus: &EventBus,
        prompt: &str,
        opts: &GenerateOptions,
        index: usize,
        stream: bool,
    ) -> Result<Candidate, CandidateFailure> {
        let text = if stream {
            let chunks = backend
                .generate_stream(prompt, opts)
                .await
                .map_err(CandidateFailure::Model)?;
            collect_stream(chunks, bus, &format!("plan-candidate-{index}"))
                .await
                .map_err(CandidateFailure::Model)?
        } else {
            backend
                .generate(prompt, opts)
                .await
                .map_err(CandidateFailure::Model)?
        };

        let specs = parse_artifact_specs(&text).map_err(CandidateFailure::Parse)?;
        let mut builder = GraphBuilder::new();
        for spec in specs {
            builder.add(spec).map_err(CandidateFailure::Freeze)?;
        }
        let graph = builder.freeze().map_err(CandidateFailure::Freeze)?;
        let metrics = score_graph(&graph);
        let sorted_ids = graph.ids().cloned().collect();

        Ok(Candidate {
            index,
            graph,
            metrics,
            sorted_ids,
        })
    }

    /// Strictly-improving refinement: feed the winner plus feedback derived
    /// from its weakest metric back to the model, accept only a higher
    /// score, and stop at the first round that does not improve.
    async fn refine(&self, goal: &str, best: &mut Candidate, bus: &EventBus) {
        for round in 0..self.config.refine_rounds {
            let Ok(graph_json) = serde_json::to_string_pretty(
                &best.graph.iter().cloned().collect::<Vec<_>>(),
            ) else {
                break;
            };
            let feedback = weakest_metric_feedback(&best.metrics);
            let prompt = build_refine_prompt(goal, &graph_json, feedback);
            let opts = GenerateOptions {
                temperature: self.config.base_temperature,
                max_tokens: self.config.max_tokens,
            };

            let refined =
                Self::generate_candidate(&*self.backend, bus, &prompt, &opts, best.index, false)
                    .await;
            match refined {
                Ok(candidate) if candidate.metrics.score > best.metrics.score => {
                    RefinementAccepted {
                        round,
                        previous_score: best.metrics.score,
                        new_score: candidate.metrics.score,
                    }
                    .log();
                    bus.publish(EventKind::PlanCandidate {
                        index: candidate.index,
                        artifact_count: candidate.metrics.artifact_count,
                        score: candidate.metrics.score,
                    });
                    *best = candidate;
                }
                Ok(_) => break,
                Err(failure) => {
                    CandidateDropped {
                        index: best.index,
                        reason: &format!("refinement round {round}: {failure}"),
                    }
                    .log();
                    break;
                }
            }
        }
    }

    /// Ordering: higher score wins; ties break by fewer artifacts, then
    /// lower depth, then lexicographically smallest sorted ID list.
    fn is_better(a: &Candidate, b: &Candidate) -> bool {
        match a.metrics.score.partial_cmp(&b.metrics.score) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Less) => false,
            _ => {
                (a.metrics.artifact_count, a.metrics.depth, &a.sorted_ids)
                    < (b.metrics.artifact_count, b.metrics.depth, &b.sorted_ids)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubModelBackend;
    use crate::events::EventKind;

    fn specs_json(ids: &[(&str, &[&str])]) -> String {
        let specs: Vec<serde_json::Value> = ids
            .iter()
            .map(|(id, requires)| {
                serde_json::json!({
                    "id": id,
                    "description": format!("artifact {id}"),
                    "contract": format!("produce {id}"),
                    "requires": requires,
                })
            })
            .collect();
        serde_json::to_string(&specs).unwrap()
    }

    #[tokio::test]
    async fn test_plan_selects_highest_scoring_candidate() {
        // Candidate 1: a 3-deep chain. Candidate 2: three parallel leaves
        // (higher parallelism, higher score). The rest fail.
        let backend = StubModelBackend::scripted(vec![
            Ok(specs_json(&[("a", &[]), ("b", &["a"]), ("c", &["b"])])),
            Ok(specs_json(&[("x", &[]), ("y", &[]), ("z", &[])])),
            Err(ModelError::Timeout),
            Ok("not json at all".to_string()),
            Err(ModelError::Transport("boom".to_string())),
        ]);

        let planner = HarmonicPlanner::new(Arc::new(backend));
        let bus = EventBus::new("sess");
        let (graph, metrics) = planner.plan("build things", None, &bus).await.unwrap();

        assert_eq!(graph.depth(), 1);
        assert_eq!(graph.len(), 3);
        assert!(graph.contains("x"));
        assert!(metrics.score > 0.0);
    }

    #[tokio::test]
    async fn test_all_candidates_failing_is_planning_error() {
        let backend = StubModelBackend::scripted(vec![
            Err(ModelError::Timeout),
            Ok("no array here".to_string()),
            Err(ModelError::Refused("nope".to_string())),
            Err(ModelError::Transport("gone".to_string())),
            Ok("[]garbage".to_string()),
        ]);

        let planner = HarmonicPlanner::new(Arc::new(backend));
        let bus = EventBus::new("sess");
        let mut stream = bus.subscribe();

        let err = planner.plan("build things", None, &bus).await.unwrap_err();
        assert!(matches!(
            err,
            PlanningError::AllCandidatesFailed { attempted: 5 }
        ));

        bus.close();
        let mut saw_planning_failed = false;
        while let Some(event) = stream.next().await {
            if matches!(event.kind, EventKind::PlanningFailed { .. }) {
                saw_planning_failed = true;
            }
        }
        assert!(saw_planning_failed);
    }

    #[tokio::test]
    async fn test_unfreezable_candidate_is_dropped_not_fatal() {
        // First candidate has a cycle; second is valid.
        let backend = StubModelBackend::scripted(vec![
            Ok(specs_json(&[("a", &["b"]), ("b", &["a"])])),
            Ok(specs_json(&[("solo", &[])])),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
        ]);

        let planner = HarmonicPlanner::new(Arc::new(backend));
        let bus = EventBus::new("sess");
        let (graph, _) = planner.plan("build things", None, &bus).await.unwrap();
        assert!(graph.contains("solo"));
    }

    #[tokio::test]
    async fn test_refinement_accepts_only_strict_improvement() {
        // Initial candidates: one deep chain. Refinement answer: parallel
        // leaves with a strictly better score -> accepted.
        let backend = StubModelBackend::scripted(vec![
            Ok(specs_json(&[("a", &[]), ("b", &["a"]), ("c", &["b"])])),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            // refinement round
            Ok(specs_json(&[("x", &[]), ("y", &[]), ("z", &[])])),
        ]);

        let config = PlannerConfig {
            refine_rounds: 1,
            ..PlannerConfig::default()
        };
        let planner = HarmonicPlanner::with_config(Arc::new(backend), config);
        let bus = EventBus::new("sess");
        let (graph, _) = planner.plan("build things", None, &bus).await.unwrap();
        assert_eq!(graph.depth(), 1);
        assert!(graph.contains("x"));
    }

    #[tokio::test]
    async fn test_plan_with_streaming_backend() {
        let backend = StubModelBackend::repeating(specs_json(&[("a", &[]), ("b", &["a"])]))
            .with_chunk_size(16);
        let config = PlannerConfig {
            candidates: 2,
            stream: true,
            ..PlannerConfig::default()
        };
        let planner = HarmonicPlanner::with_config(Arc::new(backend), config);
        let bus = EventBus::new("sess");
        let mut stream = bus.subscribe();

        let (graph, _) = planner.plan("build things", None, &bus).await.unwrap();
        assert_eq!(graph.len(), 2);

        bus.close();
        let mut saw_model_tokens = false;
        while let Some(event) = stream.next().await {
            if matches!(event.kind, EventKind::ModelTokens { .. }) {
                saw_model_tokens = true;
            }
        }
        assert!(saw_model_tokens);
    }

    #[tokio::test]
    async fn test_refinement_rejects_worse_plan() {
        let backend = StubModelBackend::scripted(vec![
            Ok(specs_json(&[("x", &[]), ("y", &[]), ("z", &[])])),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            Err(ModelError::Timeout),
            // refinement answer is a worse (deep) plan
            Ok(specs_json(&[("a", &[]), ("b", &["a"]), ("c", &["b"])])),
        ]);

        let config = PlannerConfig {
            refine_rounds: 3,
            ..PlannerConfig::default()
        };
        let planner = HarmonicPlanner::with_config(Arc::new(backend), config);
        let bus = EventBus::new("sess");
        let (graph, _) = planner.plan("build things", None, &bus).await.unwrap();
        // Original winner kept; refinement stopped after the first worse round.
        assert!(graph.contains("x"));
        assert_eq!(graph.depth(), 1);
    }
}
