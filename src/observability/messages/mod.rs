// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.

pub mod engine;
pub mod planner;
pub mod storage;

use tracing::Span;

/// Trait for messages that support structured logging and tracing.
///
/// `log()` emits the event at the message's natural level with
/// machine-readable fields; `span()` creates a span carrying the same
/// fields as attributes.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}
