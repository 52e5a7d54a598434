// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for plan candidate generation and selection.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A candidate configuration failed and was dropped from the batch.
///
/// # Log Level
/// `warn!` - Expected under normal operation; only fatal if all drop
pub struct CandidateDropped<'a> {
    pub index: usize,
    pub reason: &'a str,
}

impl Display for CandidateDropped<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plan candidate {} dropped: {}", self.index, self.reason)
    }
}

impl StructuredLog for CandidateDropped<'_> {
    fn log(&self) {
        tracing::warn!(candidate = self.index, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("candidate_dropped", span_name = name, candidate = self.index)
    }
}

/// A refinement round produced a strictly better plan.
pub struct RefinementAccepted {
    pub round: usize,
    pub previous_score: f64,
    pub new_score: f64,
}

impl Display for RefinementAccepted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Refinement round {} accepted: score {:.2} -> {:.2}",
            self.round, self.previous_score, self.new_score
        )
    }
}

impl StructuredLog for RefinementAccepted {
    fn log(&self) {
        tracing::info!(
            round = self.round,
            previous_score = self.previous_score,
            new_score = self.new_score,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("refinement_accepted", span_name = name, round = self.round)
    }
}
