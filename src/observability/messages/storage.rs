// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for cache and plan-store maintenance events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Plan state was persisted at a wave boundary or terminal transition.
///
/// # Log Level
/// `debug!` - High-frequency bookkeeping
pub struct PlanPersisted<'a> {
    pub goal_hash: &'a str,
    pub status: &'a str,
}

impl Display for PlanPersisted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Persisted plan state for goal {} (status: {})",
            self.goal_hash, self.status
        )
    }
}

impl StructuredLog for PlanPersisted<'_> {
    fn log(&self) {
        tracing::debug!(goal_hash = self.goal_hash, status = self.status, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("plan_persisted", span_name = name, goal_hash = self.goal_hash)
    }
}
