// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Minimal-rebuild computation.
//!
//! Given the freshly planned graph and the prior saved execution for the
//! same goal, [`detect_changes`] classifies every artifact into disjoint
//! change sets, and [`rebuild_set`] closes the union over the dependents
//! relation (breadth-first) and adds anything the prior run left
//! non-terminal. Executing exactly the rebuild set leaves every other
//! artifact's stored hash equal to what a fresh execution would produce.

use std::collections::BTreeSet;

use crate::graph::ArtifactGraph;
use crate::hashing::hash_file;
use crate::store::SavedExecution;

/// Disjoint classification of artifacts between two plans of one goal.
///
/// An artifact lands in at most one set; precedence when several apply is
/// contract > requirements > output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeReport {
    /// In the new graph, absent from the saved one.
    pub added: BTreeSet<String>,
    /// In the saved graph, absent from the new one.
    pub removed: BTreeSet<String>,
    /// Present in both with a different contract.
    pub contract_changed: BTreeSet<String>,
    /// Present in both with a different `requires` set.
    pub deps_changed: BTreeSet<String>,
    /// Identical spec, but the produced file on disk no longer hashes to
    /// the stored content hash.
    pub output_modified: BTreeSet<String>,
}

impl ChangeReport {
    /// Union of every change set.
    pub fn all_changed(&self) -> BTreeSet<String> {
        let mut all = BTreeSet::new();
        all.extend(self.added.iter().cloned());
        all.extend(self.removed.iter().cloned());
        all.extend(self.contract_changed.iter().cloned());
        all.extend(self.deps_changed.iter().cloned());
        all.extend(self.output_modified.iter().cloned());
        all
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.contract_changed.is_empty()
            && self.deps_changed.is_empty()
            && self.output_modified.is_empty()
    }
}

/// Classify every artifact of `graph` against the saved execution.
/// With no saved record, everything is `added`.
pub fn detect_changes(graph: &ArtifactGraph, saved: Option<&SavedExecution>) -> ChangeReport {
    let mut report = ChangeReport::default();

    let Some(saved) = saved else {
        report.added = graph.ids().cloned().collect();
        return report;
    };

    for spec in graph.iter() {
        let Some(prior) = saved.graph.artifacts.get(&spec.id) else {
            report.added.insert(spec.id.clone());
            continue;
        };

        if prior.contract != spec.contract || prior.contract_hash != spec.contract_hash {
            report.contract_changed.insert(spec.id.clone());
            continue;
        }

        let prior_requires: BTreeSet<&String> = prior.requires.iter().collect();
        let new_requires: BTreeSet<&String> = spec.requires.iter().collect();
        if prior_requires != new_requires {
            report.deps_changed.insert(spec.id.clone());
            continue;
        }

        if let (Some(path), Some(completed)) = (
            spec.produces_file.as_deref(),
            saved.execution.completed.get(&spec.id),
        ) {
            if hash_file(path) != completed.content_hash {
                report.output_modified.insert(spec.id.clone());
            }
        }
    }

    for id in saved.graph.artifacts.keys() {
        if !graph.contains(id) {
            report.removed.insert(id.clone());
        }
    }

    tracing::debug!(
        added = report.added.len(),
        removed = report.removed.len(),
        contract_changed = report.contract_changed.len(),
        deps_changed = report.deps_changed.len(),
        output_modified = report.output_modified.len(),
        "change detection complete"
    );
    report
}

/// The minimum set of artifacts that must execute: the transitive closure
/// of `all_changed` under dependents, plus every artifact the saved record
/// does not mark completed. IDs not present in the new graph (removed
/// artifacts) contribute nothing to the traversal.
pub fn rebuild_set(
    graph: &ArtifactGraph,
    report: &ChangeReport,
    saved: Option<&SavedExecution>,
) -> BTreeSet<String> {
    let all_changed = report.all_changed();
    let changed: Vec<&str> = all_changed
        .iter()
        .filter(|id| graph.contains(id))
        .map(String::as_str)
        .collect();

    let mut rebuild: BTreeSet<String> = changed.iter().map(|id| id.to_string()).collect();
    rebuild.extend(graph.transitive_dependents(changed.iter().copied()));

    for id in graph.ids() {
        let completed = saved
            .map(|s| s.execution.completed.contains_key(id))
            .unwrap_or(false);
        if !completed {
            rebuild.insert(id.clone());
        }
    }
    rebuild
}
