// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors surfaced by a model backend.
///
/// The core never branches on which backend produced the error; it only
/// distinguishes the kinds below. During candidate generation every kind is
/// recoverable (the candidate is dropped); elsewhere the error propagates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The backend did not answer within its own deadline.
    #[error("model request timed out")]
    Timeout,

    /// The backend declined to generate for this prompt.
    #[error("model refused: {0}")]
    Refused(String),

    /// The backend answered with text the caller could not use.
    #[error("model produced invalid output: {0}")]
    InvalidOutput(String),

    /// The request never reached the backend or the connection dropped.
    #[error("model transport error: {0}")]
    Transport(String),
}
