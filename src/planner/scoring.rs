// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Composite plan scoring.
//!
//! `score = 40·parallelism + 30·balance + 20·(1/depth) + 10·(1/(1+conflicts))`
//!
//! where parallelism is the leaf share of the graph, balance is width over
//! depth, and conflicts counts artifact pairs that write the same path.
//! Same-wave collisions are impossible after freeze, so the conflict term
//! penalizes plans that force sequential writes to one file.

use std::collections::HashMap;

use serde::Serialize;

use crate::graph::ArtifactGraph;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanMetrics {
    pub artifact_count: usize,
    pub leaves: usize,
    pub depth: usize,
    pub width: usize,
    pub parallelism_factor: f64,
    pub balance_factor: f64,
    pub file_conflicts: usize,
    pub score: f64,
}

/// Score a frozen graph. An empty graph scores zero.
pub fn score_graph(graph: &ArtifactGraph) -> PlanMetrics {
    let artifact_count = graph.len();
    if artifact_count == 0 {
        return PlanMetrics::default();
    }

    let leaves = graph.leaves().len();
    let depth = graph.depth();
    let width = graph.width();
    let file_conflicts = count_file_conflicts(graph);

    let parallelism_factor = leaves as f64 / artifact_count as f64;
    let balance_factor = width as f64 / depth as f64;
    let score = 40.0 * parallelism_factor
        + 30.0 * balance_factor
        + 20.0 * (1.0 / depth as f64)
        + 10.0 * (1.0 / (1.0 + file_conflicts as f64));

    PlanMetrics {
        artifact_count,
        leaves,
        depth,
        width,
        parallelism_factor,
        balance_factor,
        file_conflicts,
        score,
    }
}

/// Unordered artifact pairs sharing a `modifies` path: a path with `k`
/// writers contributes `k·(k-1)/2`.
fn count_file_conflicts(graph: &ArtifactGraph) -> usize {
    let mut writers: HashMap<&str, usize> = HashMap::new();
    for spec in graph.iter() {
        for path in &spec.modifies {
            *writers.entry(path.as_str()).or_insert(0) += 1;
        }
    }
    writers.values().map(|&k| k * (k - 1) / 2).sum()
}

/// Feedback for the refinement prompt, derived from the weakest weighted
/// term of the composite score.
pub fn weakest_metric_feedback(metrics: &PlanMetrics) -> &'static str {
    let terms = [
        (
            40.0 * metrics.parallelism_factor,
            "Too few artifacts can start immediately. Restructure so more artifacts have no requirements and can run in the first wave.",
        ),
        (
            30.0 * metrics.balance_factor,
            "The plan is narrow relative to its depth. Widen the middle waves so more artifacts run concurrently.",
        ),
        (
            20.0 * (1.0 / metrics.depth.max(1) as f64),
            "The requirement chains are too long. Shorten the longest chain by merging or decoupling intermediate artifacts.",
        ),
        (
            10.0 * (1.0 / (1.0 + metrics.file_conflicts as f64)),
            "Several artifacts write the same files. Give artifacts disjoint output paths so they stop serializing on shared files.",
        ),
    ];

    terms
        .iter()
        .min_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, feedback)| *feedback)
        .unwrap_or(terms[0].1)
}
