// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end orchestrator scenarios over stub backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backends::stub::{FailingProducer, StubModelBackend, StubProducer};
use crate::cache::MemoryCache;
use crate::errors::{OrchestratorError, PlanningError, ProduceError};
use crate::graph::ArtifactSpec;
use crate::orchestrator::{Orchestrator, RunOptions};
use crate::planner::{HarmonicPlanner, PlannerConfig};
use crate::store::{MemoryPlanStore, PlanStore, RunStatus};
use crate::traits::{ArtifactProducer, OutputPayload, OutputRef, ProduceContext, ProduceOutput};

fn spec_value(id: &str, requires: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "description": format!("artifact {id}"),
        "contract": format!("produce {id}"),
        "requires": requires,
    })
}

fn plan_json(specs: &[serde_json::Value]) -> String {
    serde_json::to_string(&specs.to_vec()).unwrap()
}

fn orchestrator(
    backend: StubModelBackend,
    producer: Arc<dyn ArtifactProducer>,
    cache: Arc<MemoryCache>,
    store: Arc<MemoryPlanStore>,
) -> Orchestrator {
    let planner = HarmonicPlanner::with_config(
        Arc::new(backend),
        PlannerConfig {
            candidates: 1,
            ..PlannerConfig::default()
        },
    );
    Orchestrator::new(planner, producer, cache, store)
}

#[tokio::test]
async fn test_parallel_leaves_single_wave() {
    let mut a = spec_value("a", &[]);
    a["modifies"] = serde_json::json!(["fa"]);
    let mut b = spec_value("b", &[]);
    b["modifies"] = serde_json::json!(["fb"]);
    let mut c = spec_value("c", &[]);
    c["modifies"] = serde_json::json!(["fc"]);

    let producer = Arc::new(StubProducer::new());
    let store = Arc::new(MemoryPlanStore::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan_json(&[a, b, c])),
        producer.clone(),
        Arc::new(MemoryCache::new()),
        store.clone(),
    );

    let summary = orch.run("three leaves", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(summary.completed_count, 3);
    assert_eq!(producer.call_count(), 3);

    let saved = store.find_by_goal("three leaves").await.unwrap().unwrap();
    assert_eq!(saved.graph.waves.len(), 1);
    assert_eq!(saved.graph.waves[0].len(), 3);
}

#[tokio::test]
async fn test_deep_chain_sequential_completion() {
    let plan = plan_json(&[
        spec_value("a", &[]),
        spec_value("b", &["a"]),
        spec_value("c", &["b"]),
        spec_value("d", &["c"]),
    ]);

    let producer = Arc::new(StubProducer::new());
    let store = Arc::new(MemoryPlanStore::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        producer.clone(),
        Arc::new(MemoryCache::new()),
        store.clone(),
    );

    let summary = orch.run("deep chain", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);

    let order: Vec<String> = producer
        .calls()
        .iter()
        .map(|call| call.artifact_id.clone())
        .collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);

    let saved = store.find_by_goal("deep chain").await.unwrap().unwrap();
    assert_eq!(saved.graph.waves.len(), 4);
}

#[tokio::test]
async fn test_modifies_conflict_fails_planning() {
    let mut x = spec_value("x", &[]);
    x["modifies"] = serde_json::json!(["f"]);
    let mut y = spec_value("y", &[]);
    y["modifies"] = serde_json::json!(["f"]);

    let orch = orchestrator(
        StubModelBackend::repeating(plan_json(&[x, y])),
        Arc::new(StubProducer::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryPlanStore::new()),
    );

    let err = orch
        .run("conflicting plan", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Planning(PlanningError::AllCandidatesFailed { attempted: 1 })
    ));
}

#[tokio::test]
async fn test_incremental_noop_rerun() {
    let plan = plan_json(&[
        spec_value("f1", &[]),
        spec_value("f2", &["f1"]),
    ]);
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryPlanStore::new());

    let first_producer = Arc::new(StubProducer::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        first_producer.clone(),
        cache.clone(),
        store.clone(),
    );
    let summary = orch.run("goal g", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(first_producer.call_count(), 2);
    let prior = store.find_by_goal("goal g").await.unwrap().unwrap();

    // Identical goal, no model change, no file edits: empty rebuild set,
    // zero produce calls, state untouched.
    let second_producer = Arc::new(StubProducer::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        second_producer.clone(),
        cache,
        store.clone(),
    );
    let summary = orch.run("goal g", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(second_producer.call_count(), 0);
    assert_eq!(summary.completed_count, 2);

    let after = store.find_by_goal("goal g").await.unwrap().unwrap();
    assert_eq!(after.execution.completed, prior.execution.completed);
    assert_eq!(after.updated_at, prior.updated_at);
}

/// Producer whose output changes when `bump` is called, standing in for a
/// model that regenerates differently.
struct VersionedProducer {
    version: std::sync::atomic::AtomicU32,
    calls: std::sync::Mutex<Vec<String>>,
}

impl VersionedProducer {
    fn new() -> Self {
        Self {
            version: std::sync::atomic::AtomicU32::new(1),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn bump(&self) {
        self.version
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ArtifactProducer for VersionedProducer {
    async fn produce(
        &self,
        spec: &ArtifactSpec,
        _deps: &BTreeMap<String, OutputRef>,
        _ctx: &ProduceContext,
    ) -> Result<ProduceOutput, ProduceError> {
        let version = self.version.load(std::sync::atomic::Ordering::SeqCst);
        self.calls.lock().unwrap().push(spec.id.clone());

        let text = format!("{} v{version}\n", spec.id);
        let payload = match &spec.produces_file {
            Some(path) => {
                std::fs::write(path, text.as_bytes())?;
                OutputPayload::File(path.into())
            }
            None => OutputPayload::Inline(text),
        };
        Ok(ProduceOutput {
            payload,
            model_tier: Some("standard".to_string()),
            verified: true,
        })
    }
}

#[tokio::test]
async fn test_external_edit_cascades_through_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let path_of = |id: &str| dir.path().join(format!("{id}.txt")).to_string_lossy().into_owned();

    let mut p = spec_value("p", &[]);
    p["produces_file"] = serde_json::json!(path_of("p"));
    let mut q = spec_value("q", &["p"]);
    q["produces_file"] = serde_json::json!(path_of("q"));
    let mut r = spec_value("r", &["q"]);
    r["produces_file"] = serde_json::json!(path_of("r"));
    let plan = plan_json(&[p, q, r]);

    let producer = Arc::new(VersionedProducer::new());
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryPlanStore::new());

    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        producer.clone(),
        cache.clone(),
        store.clone(),
    );
    let summary = orch.run("cascade goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(producer.calls(), vec!["p", "q", "r"]);

    // Tamper with p's produced file; the model also regenerates differently.
    std::fs::write(dir.path().join("p.txt"), b"hand edited").unwrap();
    producer.bump();

    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        producer.clone(),
        cache,
        store.clone(),
    );
    let summary = orch.run("cascade goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);

    // All three re-produced, in requirement order.
    assert_eq!(producer.calls(), vec!["p", "q", "r", "p", "q", "r"]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("p.txt")).unwrap(),
        "p v2\n"
    );
}

#[tokio::test]
async fn test_failure_blocks_dependents_and_fails_run() {
    // a -> b -> d, a -> c
    let plan = plan_json(&[
        spec_value("a", &[]),
        spec_value("b", &["a"]),
        spec_value("c", &["a"]),
        spec_value("d", &["b"]),
    ]);

    let producer = Arc::new(FailingProducer::failing_ids(&["a"]));
    let store = Arc::new(MemoryPlanStore::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        producer.clone(),
        Arc::new(MemoryCache::new()),
        store.clone(),
    );

    let summary = orch.run("doomed goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Failed);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.blocked_count, 3);
    assert_eq!(summary.completed_count, 0);
    assert!(summary.first_error.unwrap().starts_with("a:"));
    // Only the failing artifact was ever attempted.
    assert_eq!(producer.call_count(), 1);

    let saved = store.find_by_goal("doomed goal").await.unwrap().unwrap();
    assert_eq!(saved.execution.status, RunStatus::Failed);
    assert!(saved.execution.failed.contains_key("a"));
    assert!(saved.execution.completed.is_empty());
}

#[tokio::test]
async fn test_failed_run_resumes_and_completes() {
    let plan = plan_json(&[spec_value("a", &[]), spec_value("b", &["a"])]);
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryPlanStore::new());

    // First attempt: "a" fails, "b" blocked.
    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        Arc::new(FailingProducer::failing_ids(&["a"])),
        cache.clone(),
        store.clone(),
    );
    let summary = orch.run("flaky goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Failed);
    let goal_hash = summary.goal_hash.clone();

    // Resume with a healthy producer: both artifacts finish.
    let producer = Arc::new(StubProducer::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        producer.clone(),
        cache,
        store.clone(),
    );
    let summary = orch
        .resume(&goal_hash, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(summary.completed_count, 2);
    assert_eq!(producer.call_count(), 2);

    let saved = store.load(&goal_hash).await.unwrap().unwrap();
    assert!(saved.execution.failed.is_empty());
}

#[tokio::test]
async fn test_pause_resume_matches_uninterrupted_run() {
    let plan = plan_json(&[spec_value("first", &[]), spec_value("second", &["first"])]);

    // Straight run.
    let straight_store = Arc::new(MemoryPlanStore::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        Arc::new(StubProducer::new()),
        Arc::new(MemoryCache::new()),
        straight_store.clone(),
    );
    let summary = orch.run("pausable goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    let straight = straight_store
        .find_by_goal("pausable goal")
        .await
        .unwrap()
        .unwrap();

    // Interrupted run: cancel after the first wave, then resume.
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryPlanStore::new());
    let cancel = CancellationToken::new();
    let producer = Arc::new(StubProducer::new());
    producer.set_on_produce({
        let cancel = cancel.clone();
        move |_| cancel.cancel()
    });
    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        producer,
        cache.clone(),
        store.clone(),
    );
    let summary = orch
        .run(
            "pausable goal",
            RunOptions {
                cancel,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.final_status, RunStatus::Paused);
    assert_eq!(summary.completed_count, 1);

    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        Arc::new(StubProducer::new()),
        cache,
        store.clone(),
    );
    let summary = orch
        .resume(&summary.goal_hash, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);

    // Same terminal state as the uninterrupted run.
    let resumed = store.find_by_goal("pausable goal").await.unwrap().unwrap();
    assert_eq!(resumed.execution.completed, straight.execution.completed);
    assert_eq!(resumed.execution.status, straight.execution.status);
}

#[tokio::test]
async fn test_empty_plan_completes_immediately() {
    let producer = Arc::new(StubProducer::new());
    let orch = orchestrator(
        StubModelBackend::repeating("[]"),
        producer.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryPlanStore::new()),
    );

    let summary = orch.run("nothing to build", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(summary.completed_count, 0);
    assert_eq!(producer.call_count(), 0);
}

#[tokio::test]
async fn test_all_cached_rebuild_skips_everything() {
    // Cache survives but the plan record was lost: everything re-plans as
    // "added", yet every fingerprint hits the cache and no produce runs.
    let plan = plan_json(&[spec_value("a", &[]), spec_value("b", &["a"])]);
    let cache = Arc::new(MemoryCache::new());

    let first = Arc::new(StubProducer::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan.clone()),
        first.clone(),
        cache.clone(),
        Arc::new(MemoryPlanStore::new()),
    );
    orch.run("cached goal", RunOptions::default()).await.unwrap();
    assert_eq!(first.call_count(), 2);

    let second = Arc::new(StubProducer::new());
    let fresh_store = Arc::new(MemoryPlanStore::new());
    let orch = orchestrator(
        StubModelBackend::repeating(plan),
        second.clone(),
        cache,
        fresh_store,
    );
    let summary = orch.run("cached goal", RunOptions::default()).await.unwrap();
    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(second.call_count(), 0);
    assert_eq!(summary.skipped_count, 2);
    assert_eq!(summary.completed_count, 2);
}

#[tokio::test]
async fn test_trace_file_written() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_json(&[spec_value("a", &[])]);
    let store = Arc::new(MemoryPlanStore::new());

    let planner = HarmonicPlanner::with_config(
        Arc::new(StubModelBackend::repeating(plan)),
        PlannerConfig {
            candidates: 1,
            ..PlannerConfig::default()
        },
    );
    let orch = Orchestrator::new(
        planner,
        Arc::new(StubProducer::new()),
        Arc::new(MemoryCache::new()),
        store,
    )
    .with_trace_dir(dir.path());

    let summary = orch.run("traced goal", RunOptions::default()).await.unwrap();

    let trace_path = dir
        .path()
        .join(format!("{}.trace.jsonl", summary.goal_hash));
    let contents = std::fs::read_to_string(trace_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert!(lines.len() >= 6);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["event"], "session_start");
    let last: serde_json::Value = serde_json::from_str(lines.last().unwrap()).unwrap();
    assert_eq!(last["event"], "session_end");

    // Sequences strictly increase through the whole trace.
    let mut prev = -1i64;
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        let seq = value["seq"].as_i64().unwrap();
        assert!(seq > prev);
        prev = seq;
    }
}
