// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Write-to-temp-then-rename helpers shared by the cache and the plan store.
//!
//! Readers must never observe a partially written file, so every durable
//! write lands in a sibling temp file first and is renamed into place. The
//! temp file is removed on every exit path, including unwinds, via a drop
//! guard.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Removes the temp file on drop unless the rename succeeded.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Temp-file name for `path`, unique per process.
///
/// A crashed writer leaves this file behind; loaders ignore anything with a
/// `.tmp.` infix, and the next successful write replaces the target.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    path.with_file_name(format!("{}.tmp.{}", name, std::process::id()))
}

/// Atomically replace `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    let mut guard = TempGuard {
        path: tmp.clone(),
        armed: true,
    };

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    guard.armed = false;
    Ok(())
}

/// True when a directory entry is one of our in-flight temp files.
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(".tmp."))
        .unwrap_or(false)
}
