// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with `Display` plus a
//! [`messages::StructuredLog`] implementation, keeping log strings out of
//! the execution code and emitting machine-readable fields alongside the
//! human-readable line.
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - wave executor lifecycle events
//! * `messages::planner` - candidate generation and selection
//! * `messages::storage` - cache and plan-store maintenance

pub mod messages;
