// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors that end a planning run.
///
/// Individual candidate failures (model errors, unparseable JSON, freeze
/// rejections) are swallowed and logged; planning only fails once every
/// candidate has failed.
#[derive(Error, Debug)]
pub enum PlanningError {
    /// Every candidate configuration failed to yield a valid graph.
    #[error("all {attempted} plan candidates failed")]
    AllCandidatesFailed { attempted: usize },

    /// The planner was configured with zero candidates.
    #[error("planner configured with no candidate configurations")]
    NoCandidates,
}
