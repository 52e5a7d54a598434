// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The artifact DAG and its freeze-time invariants.
//!
//! A [`GraphBuilder`] accumulates specs; [`GraphBuilder::freeze`] validates
//! the whole graph and returns an immutable [`ArtifactGraph`] with the
//! topological waves and the dependents index precomputed. The frozen graph
//! is shared read-only across executor workers, so nothing here mutates
//! after freeze.
//!
//! Wave semantics: wave `k` holds every artifact whose longest requirement
//! chain down to a leaf has length `k`. All members of a wave may execute
//! concurrently, which is why freeze rejects overlapping `modifies` sets
//! within a wave. Within a wave, order is lexicographic by ID so wave
//! layouts are identical across runs and implementations.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::errors::GraphError;
use crate::graph::ArtifactSpec;

/// Mutable accumulation stage of a graph.
#[derive(Debug, Default, Clone)]
pub struct GraphBuilder {
    specs: BTreeMap<String, ArtifactSpec>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec. Fails immediately on a duplicate ID; unresolved
    /// requirements are only detected at freeze time, so specs may be added
    /// in any order.
    pub fn add(&mut self, spec: ArtifactSpec) -> Result<(), GraphError> {
        if self.specs.contains_key(&spec.id) {
            return Err(GraphError::DuplicateId {
                artifact_id: spec.id,
            });
        }
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validate every invariant and produce the immutable graph.
    ///
    /// Checks, in order: every requirement resolves; the `requires` relation
    /// is acyclic (the error names one offending cycle); `produces_file` is
    /// unique graph-wide; and within every computed wave all `modifies` sets
    /// are pairwise disjoint.
    pub fn freeze(self) -> Result<ArtifactGraph, GraphError> {
        for spec in self.specs.values() {
            for req in &spec.requires {
                if !self.specs.contains_key(req) {
                    return Err(GraphError::UnknownDependency {
                        artifact_id: spec.id.clone(),
                        missing: req.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(GraphError::Cycle { cycle });
        }

        let mut produced: HashMap<&str, &str> = HashMap::new();
        for spec in self.specs.values() {
            if let Some(path) = &spec.produces_file {
                if let Some(prior) = produced.insert(path.as_str(), spec.id.as_str()) {
                    return Err(GraphError::DuplicateProducedFile {
                        first: prior.to_string(),
                        second: spec.id.clone(),
                        path: path.clone(),
                    });
                }
            }
        }

        let waves = self.compute_waves();
        Self::check_wave_conflicts(&self.specs, &waves)?;

        let mut dependents: BTreeMap<String, BTreeSet<String>> = self
            .specs
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        for spec in self.specs.values() {
            for req in &spec.requires {
                if let Some(set) = dependents.get_mut(req) {
                    set.insert(spec.id.clone());
                }
            }
        }

        let mut wave_index = HashMap::with_capacity(self.specs.len());
        for (index, wave) in waves.iter().enumerate() {
            for id in wave {
                wave_index.insert(id.clone(), index);
            }
        }

        Ok(ArtifactGraph {
            specs: self.specs,
            waves,
            wave_index,
            dependents,
        })
    }

    /// DFS three-color cycle search over the `requires` relation.
    /// Returns one offending cycle path, ending where it started.
    fn find_cycle(&self) -> Option<Vec<String>> {
        const UNVISITED: u8 = 0;
        const VISITING: u8 = 1;
        const VISITED: u8 = 2;

        fn dfs(
            specs: &BTreeMap<String, ArtifactSpec>,
            node: &str,
            state: &mut HashMap<String, u8>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match state.get(node).copied().unwrap_or(UNVISITED) {
                VISITING => {
                    // Back edge: the cycle is the path suffix from the first
                    // occurrence of `node`, closed back on itself.
                    let start = path.iter().position(|p| p == node).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                VISITED => return None,
                _ => {}
            }

            state.insert(node.to_string(), VISITING);
            path.push(node.to_string());
            if let Some(spec) = specs.get(node) {
                for req in &spec.requires {
                    if let Some(cycle) = dfs(specs, req, state, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            state.insert(node.to_string(), VISITED);
            None
        }

        let mut state = HashMap::new();
        let mut path = Vec::new();
        for id in self.specs.keys() {
            if state.get(id.as_str()).copied().unwrap_or(UNVISITED) == UNVISITED {
                if let Some(cycle) = dfs(&self.specs, id, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Level-by-level Kahn's algorithm over requirement counts.
    ///
    /// Leaves form wave 0; each pass decrements the in-degree of dependents
    /// of the wave just emitted, and the nodes that reach zero form the next
    /// wave. Because a node is emitted only after its last requirement, its
    /// wave equals its longest path to any leaf. Only called on acyclic
    /// input, so the loop always drains.
    fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .specs
            .values()
            .map(|spec| (spec.id.as_str(), spec.requires.len()))
            .collect();

        let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
        for spec in self.specs.values() {
            for req in &spec.requires {
                forward
                    .entry(req.as_str())
                    .or_default()
                    .push(spec.id.as_str());
            }
        }

        let mut waves: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(id, _)| *id)
            .collect();
        current.sort_unstable();

        let mut queue: VecDeque<&str> = VecDeque::new();
        while !current.is_empty() {
            waves.push(current.iter().map(|id| id.to_string()).collect());
            queue.extend(current.iter());
            current.clear();

            let wave_size = queue.len();
            for _ in 0..wave_size {
                if let Some(done) = queue.pop_front() {
                    if let Some(dependents) = forward.get(done) {
                        for &dependent in dependents {
                            if let Some(degree) = in_degree.get_mut(dependent) {
                                *degree -= 1;
                                if *degree == 0 {
                                    current.push(dependent);
                                }
                            }
                        }
                    }
                }
            }
            current.sort_unstable();
        }

        waves
    }

    /// Scan each wave for a pair of specs with intersecting `modifies` sets.
    fn check_wave_conflicts(
        specs: &BTreeMap<String, ArtifactSpec>,
        waves: &[Vec<String>],
    ) -> Result<(), GraphError> {
        for wave in waves {
            let mut writers: HashMap<&str, &str> = HashMap::new();
            for id in wave {
                let Some(spec) = specs.get(id) else { continue };
                let mut paths: Vec<&String> = spec.modifies.iter().collect();
                paths.sort_unstable();
                for path in paths {
                    if let Some(prior) = writers.insert(path.as_str(), id.as_str()) {
                        return Err(GraphError::Conflict {
                            first: prior.to_string(),
                            second: id.clone(),
                            path: path.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Immutable artifact DAG with precomputed waves and dependents index.
#[derive(Debug, Clone)]
pub struct ArtifactGraph {
    specs: BTreeMap<String, ArtifactSpec>,
    waves: Vec<Vec<String>>,
    wave_index: HashMap<String, usize>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl ArtifactGraph {
    /// Freeze an empty graph. Used for the no-op run path.
    pub fn empty() -> Self {
        Self {
            specs: BTreeMap::new(),
            waves: Vec::new(),
            wave_index: HashMap::new(),
            dependents: BTreeMap::new(),
        }
    }

    /// Convenience: build and freeze from a list of specs.
    pub fn from_specs(specs: Vec<ArtifactSpec>) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        for spec in specs {
            builder.add(spec)?;
        }
        builder.freeze()
    }

    pub fn get(&self, id: &str) -> Option<&ArtifactSpec> {
        self.specs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    /// Iterate specs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.specs.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.specs.keys()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Artifacts with no requirements; identical to wave 0.
    pub fn leaves(&self) -> Vec<&str> {
        self.specs
            .values()
            .filter(|spec| spec.requires.is_empty())
            .map(|spec| spec.id.as_str())
            .collect()
    }

    /// Stable topological levels; wave `k` holds nodes whose longest path
    /// to a leaf is `k`. Lexicographic within a wave.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Number of waves.
    pub fn depth(&self) -> usize {
        self.waves.len()
    }

    /// Size of the largest wave.
    pub fn width(&self) -> usize {
        self.waves.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Wave position of an artifact.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.wave_index.get(id).copied()
    }

    /// Direct dependents of `id` (reverse of `requires`). Computed once at
    /// freeze; empty for unknown IDs.
    pub fn dependents(&self, id: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.dependents.get(id).unwrap_or(&EMPTY)
    }

    /// Every artifact reachable from `start` by following dependents edges,
    /// excluding the start set itself. Breadth-first.
    pub fn transitive_dependents<'a, I>(&self, start: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<&str> = start.into_iter().collect();
        let origin: BTreeSet<&str> = queue.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for dependent in self.dependents(id) {
                if !origin.contains(dependent.as_str()) && reached.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        reached
    }

    /// Closure of `start` under `requires`, including the start set.
    pub fn transitive_requires<'a, I>(&self, start: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for id in start {
            if self.specs.contains_key(id) && closure.insert(id.to_string()) {
                queue.push_back(id);
            }
        }

        while let Some(id) = queue.pop_front() {
            if let Some(spec) = self.specs.get(id) {
                for req in &spec.requires {
                    if closure.insert(req.clone()) {
                        queue.push_back(req);
                    }
                }
            }
        }
        closure
    }

    /// Extract the subgraph containing the closure of `ids` under
    /// `requires`, with waves recomputed. Because the closure carries every
    /// requirement chain intact, each member keeps the wave position it had
    /// in this graph (modulo trailing waves that become empty and drop).
    pub fn subgraph<'a, I>(&self, ids: I) -> Result<ArtifactGraph, GraphError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut requested: Vec<&str> = Vec::new();
        for id in ids {
            if !self.specs.contains_key(id) {
                return Err(GraphError::UnknownArtifact {
                    artifact_id: id.to_string(),
                });
            }
            requested.push(id);
        }

        let closure = self.transitive_requires(requested.iter().copied());
        let mut builder = GraphBuilder::new();
        for id in &closure {
            if let Some(spec) = self.specs.get(id) {
                builder.add(spec.clone())?;
            }
        }
        builder.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freeze(specs: Vec<ArtifactSpec>) -> ArtifactGraph {
        ArtifactGraph::from_specs(specs).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let graph = ArtifactGraph::empty();
        assert!(graph.waves().is_empty());
        assert_eq!(graph.depth(), 0);
        assert_eq!(graph.width(), 0);
        assert!(graph.leaves().is_empty());
    }

    #[test]
    fn test_single_artifact() {
        let graph = freeze(vec![ArtifactSpec::new("only", "c")]);
        assert_eq!(graph.waves(), &[vec!["only".to_string()]]);
        assert_eq!(graph.wave_of("only"), Some(0));
    }

    #[test]
    fn test_duplicate_id_rejected_at_add() {
        let mut builder = GraphBuilder::new();
        builder.add(ArtifactSpec::new("a", "c")).unwrap();
        let err = builder.add(ArtifactSpec::new("a", "c2")).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateId {
                artifact_id: "a".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_dependency_rejected_at_freeze() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ArtifactSpec::new("a", "c").with_requires(&["ghost"]))
            .unwrap();
        let err = builder.freeze().unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                artifact_id: "a".to_string(),
                missing: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_cycle_detection_names_the_cycle() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ArtifactSpec::new("a", "c").with_requires(&["b"]))
            .unwrap();
        builder
            .add(ArtifactSpec::new("b", "c").with_requires(&["c"]))
            .unwrap();
        builder
            .add(ArtifactSpec::new("c", "c").with_requires(&["a"]))
            .unwrap();

        match builder.freeze().unwrap_err() {
            GraphError::Cycle { cycle } => {
                assert!(cycle.len() >= 4);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_diamond_waves() {
        // a -> [b, c] -> d in requirement direction: b and c require a,
        // d requires both.
        let graph = freeze(vec![
            ArtifactSpec::new("a", "c"),
            ArtifactSpec::new("b", "c").with_requires(&["a"]),
            ArtifactSpec::new("c", "c").with_requires(&["a"]),
            ArtifactSpec::new("d", "c").with_requires(&["b", "c"]),
        ]);

        assert_eq!(
            graph.waves(),
            &[
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
        assert_eq!(graph.depth(), 3);
        assert_eq!(graph.width(), 2);
    }

    #[test]
    fn test_wave_is_longest_path_not_shortest() {
        // d requires both a (wave 0) and c (wave 1): longest chain wins.
        let graph = freeze(vec![
            ArtifactSpec::new("a", "c"),
            ArtifactSpec::new("b", "c"),
            ArtifactSpec::new("c", "c").with_requires(&["b"]),
            ArtifactSpec::new("d", "c").with_requires(&["a", "c"]),
        ]);
        assert_eq!(graph.wave_of("d"), Some(2));
    }

    #[test]
    fn test_wave_order_is_lexicographic() {
        let graph = freeze(vec![
            ArtifactSpec::new("zeta", "c"),
            ArtifactSpec::new("alpha", "c"),
            ArtifactSpec::new("mid", "c"),
        ]);
        assert_eq!(
            graph.waves()[0],
            vec!["alpha".to_string(), "mid".to_string(), "zeta".to_string()]
        );
    }

    #[test]
    fn test_same_wave_modifies_conflict() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ArtifactSpec::new("x", "c").with_modifies(&["f"]))
            .unwrap();
        builder
            .add(ArtifactSpec::new("y", "c").with_modifies(&["f"]))
            .unwrap();

        let err = builder.freeze().unwrap_err();
        assert_eq!(
            err,
            GraphError::Conflict {
                first: "x".to_string(),
                second: "y".to_string(),
                path: "f".to_string()
            }
        );
    }

    #[test]
    fn test_cross_wave_modifies_is_allowed() {
        let graph = freeze(vec![
            ArtifactSpec::new("first", "c").with_modifies(&["f"]),
            ArtifactSpec::new("second", "c")
                .with_requires(&["first"])
                .with_modifies(&["f"]),
        ]);
        assert_eq!(graph.depth(), 2);
    }

    #[test]
    fn test_duplicate_produces_file_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ArtifactSpec::new("a", "c").with_produces_file("out.txt"))
            .unwrap();
        builder
            .add(ArtifactSpec::new("b", "c").with_produces_file("out.txt"))
            .unwrap();

        match builder.freeze().unwrap_err() {
            GraphError::DuplicateProducedFile { path, .. } => assert_eq!(path, "out.txt"),
            other => panic!("expected duplicate produces_file, got {other}"),
        }
    }

    #[test]
    fn test_dependents_index() {
        let graph = freeze(vec![
            ArtifactSpec::new("a", "c"),
            ArtifactSpec::new("b", "c").with_requires(&["a"]),
            ArtifactSpec::new("c", "c").with_requires(&["a"]),
        ]);

        let deps: Vec<&String> = graph.dependents("a").iter().collect();
        assert_eq!(deps, vec!["b", "c"]);
        assert!(graph.dependents("b").is_empty());
        assert!(graph.dependents("missing").is_empty());
    }

    #[test]
    fn test_transitive_dependents_cascade() {
        let graph = freeze(vec![
            ArtifactSpec::new("p", "c"),
            ArtifactSpec::new("q", "c").with_requires(&["p"]),
            ArtifactSpec::new("r", "c").with_requires(&["q"]),
            ArtifactSpec::new("s", "c"),
        ]);

        let reached = graph.transitive_dependents(["p"]);
        assert_eq!(
            reached,
            ["q", "r"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_subgraph_closure_and_wave_positions() {
        let graph = freeze(vec![
            ArtifactSpec::new("a", "c"),
            ArtifactSpec::new("b", "c").with_requires(&["a"]),
            ArtifactSpec::new("c", "c").with_requires(&["b"]),
            ArtifactSpec::new("other", "c"),
        ]);

        let sub = graph.subgraph(["c"]).unwrap();
        assert_eq!(sub.len(), 3);
        assert!(!sub.contains("other"));
        // Wave positions survive extraction.
        for id in ["a", "b", "c"] {
            assert_eq!(sub.wave_of(id), graph.wave_of(id));
        }
    }

    #[test]
    fn test_subgraph_unknown_id() {
        let graph = freeze(vec![ArtifactSpec::new("a", "c")]);
        assert_eq!(
            graph.subgraph(["nope"]).unwrap_err(),
            GraphError::UnknownArtifact {
                artifact_id: "nope".to_string()
            }
        );
    }
}
