// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// A single planned unit of work: one tangible output with a contract.
///
/// Specs are plain data. They arrive from the planner (parsed out of model
/// output), live immutably inside a frozen [`super::ArtifactGraph`], and are
/// persisted verbatim in the saved-execution record, so the field names here
/// are part of the on-disk schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Globally unique, stable across runs.
    pub id: String,

    /// Human description of the artifact.
    pub description: String,

    /// What a completed artifact must satisfy. Part of the fingerprint.
    pub contract: String,

    /// IDs of artifacts this one depends on.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Paths this artifact may write. Two artifacts in the same wave must
    /// never share one.
    #[serde(default)]
    pub modifies: Vec<String>,

    /// The canonical file this artifact emits, if any. Unique graph-wide.
    #[serde(default)]
    pub produces_file: Option<String>,

    /// Optional domain tag (e.g. "code", "doc", "config").
    #[serde(default)]
    pub domain_type: Option<String>,

    /// Fingerprint of the spec itself, when the planner supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_hash: Option<String>,
}

impl ArtifactSpec {
    /// Minimal spec with just an ID and contract; everything else default.
    pub fn new(id: impl Into<String>, contract: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            contract: contract.into(),
            requires: Vec::new(),
            modifies: Vec::new(),
            produces_file: None,
            domain_type: None,
            contract_hash: None,
        }
    }

    /// Builder-style helper used heavily in tests.
    pub fn with_requires(mut self, requires: &[&str]) -> Self {
        self.requires = requires.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_modifies(mut self, modifies: &[&str]) -> Self {
        self.modifies = modifies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_produces_file(mut self, path: impl Into<String>) -> Self {
        self.produces_file = Some(path.into());
        self
    }
}
