// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Smoke entry point: plan and execute a goal against the stub backends.
//!
//! Exit codes: 0 success, 1 planning failed, 2 execution failed, 3 paused
//! by cancellation, 130 interrupted by signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use artificer::backends::stub::{StubModelBackend, StubProducer};
use artificer::cache::DiskCache;
use artificer::config::Settings;
use artificer::engine::{ExecutorConfig, WaveExecutor};
use artificer::errors::OrchestratorError;
use artificer::orchestrator::{Orchestrator, RunOptions};
use artificer::planner::HarmonicPlanner;
use artificer::store::{FsPlanStore, RunStatus};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <goal text>", args[0]);
        eprintln!("Example: {} \"write the release notes\"", args[0]);
        std::process::exit(1);
    }
    let goal = args[1..].join(" ");

    let settings = Settings::from_env();
    init_tracing(&settings.log_level);

    let interrupted = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
        });
    }

    let code = match run(&goal, &settings, cancel).await {
        Ok(status) => match status {
            RunStatus::Completed => 0,
            RunStatus::Failed => 2,
            RunStatus::Paused => {
                if interrupted.load(Ordering::SeqCst) {
                    130
                } else {
                    3
                }
            }
            RunStatus::Planned | RunStatus::InProgress => 2,
        },
        Err(err) => {
            eprintln!("error: {err:#}");
            if err
                .downcast_ref::<OrchestratorError>()
                .map(|e| matches!(e, OrchestratorError::Planning(_)))
                .unwrap_or(false)
            {
                1
            } else {
                2
            }
        }
    };
    std::process::exit(code);
}

async fn run(
    goal: &str,
    settings: &Settings,
    cancel: CancellationToken,
) -> anyhow::Result<RunStatus> {
    let cache = DiskCache::open(&settings.cache_dir)
        .with_context(|| format!("opening cache at {}", settings.cache_dir.display()))?;
    let store = FsPlanStore::open(&settings.plan_dir)
        .with_context(|| format!("opening plan store at {}", settings.plan_dir.display()))?;

    // The smoke backend answers every candidate with a one-artifact plan
    // for the goal; real model and producer integrations are wired by the
    // embedding application.
    let demo_plan = serde_json::to_string(&serde_json::json!([{
        "id": "deliverable",
        "description": goal,
        "contract": goal,
        "requires": [],
    }]))?;
    let planner = HarmonicPlanner::new(Arc::new(StubModelBackend::repeating(demo_plan)));

    let orchestrator = Orchestrator::new(
        planner,
        Arc::new(StubProducer::new()),
        Arc::new(cache),
        Arc::new(store),
    )
    .with_executor(WaveExecutor::new(ExecutorConfig {
        concurrency: settings.max_workers,
        produce_timeout: None,
    }))
    .with_trace_dir(&settings.plan_dir);

    let summary = orchestrator
        .run(
            goal,
            RunOptions {
                resume: false,
                context: None,
                cancel,
            },
        )
        .await?;

    println!(
        "{}: {} completed, {} failed, {} blocked, {} skipped",
        status_label(summary.final_status),
        summary.completed_count,
        summary.failed_count,
        summary.blocked_count,
        summary.skipped_count,
    );
    if let Some(first_error) = &summary.first_error {
        eprintln!("first error: {first_error}");
    }
    Ok(summary.final_status)
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Planned => "planned",
        RunStatus::InProgress => "in progress",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
