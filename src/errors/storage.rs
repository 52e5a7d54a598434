// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the execution cache.
///
/// Corruption of an individual entry is deliberately NOT an error: the cache
/// self-heals by treating the entry as a miss. These variants cover failures
/// of the store itself (unwritable directory, failed index write).
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache index serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the plan store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("plan store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record exists but cannot be decoded. Resume must refuse.
    #[error("corrupt plan record at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The record was written by a newer (or unsupported) schema.
    #[error("unsupported plan schema version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Another writer holds the advisory lock and did not release it in time.
    #[error("plan record lock busy: {path}")]
    LockBusy { path: PathBuf },

    #[error("plan record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
