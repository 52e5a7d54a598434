// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Deterministic content fingerprinting.
//!
//! Every identity in the system — goal hashes, artifact fingerprints, output
//! hashes, blob names — is a SHA-256 digest truncated to 80 bits and rendered
//! as 20 lowercase hex characters. Truncation keeps cache keys and persisted
//! records compact while leaving birthday-collision probability negligible
//! for realistic populations.
//!
//! The fingerprint input is a canonical serialization: the contract line
//! followed by each resolved requirement hash on its own line in sorted
//! order, so the result is invariant under any permutation of `requires`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::graph::ArtifactSpec;

/// Width of every hash in this crate, in hex characters (80 bits).
pub const HASH_HEX_LEN: usize = 20;

/// Sentinel hash for inputs that do not exist on disk.
pub const ZERO_HASH: &str = "00000000000000000000";

/// Hash arbitrary bytes to the truncated hex form.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_HEX_LEN);
    hex
}

/// Hash a text value (goal text, inline payloads).
pub fn hash_text(text: &str) -> String {
    short_hash(text.as_bytes())
}

/// Compute the execution-cache fingerprint for an artifact spec.
///
/// `resolved` maps each entry of `spec.requires` to the content hash of that
/// requirement's output. Requirements missing from the map contribute the
/// [`ZERO_HASH`] sentinel; the caller decides whether that is acceptable.
pub fn fingerprint<S: AsRef<str>>(
    spec: &ArtifactSpec,
    resolved: &std::collections::BTreeMap<String, S>,
) -> String {
    let mut dep_hashes: Vec<&str> = spec
        .requires
        .iter()
        .map(|id| resolved.get(id).map(AsRef::as_ref).unwrap_or(ZERO_HASH))
        .collect();
    dep_hashes.sort_unstable();

    let mut canonical = String::with_capacity(
        spec.contract.len() + (HASH_HEX_LEN + 1) * dep_hashes.len() + 1,
    );
    canonical.push_str(&spec.contract);
    canonical.push('\n');
    for hash in dep_hashes {
        canonical.push_str(hash);
        canonical.push('\n');
    }
    short_hash(canonical.as_bytes())
}

/// Hash the contents of a file, streaming in 64 KiB chunks.
///
/// Missing or unreadable files hash to [`ZERO_HASH`]; this function never
/// fails. Whether a zero hash is an error is the caller's decision.
pub fn hash_file<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "unreadable input file hashes to zero");
            }
            return ZERO_HASH.to_string();
        }
    };

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "read failure while hashing; hashing to zero");
                return ZERO_HASH.to_string();
            }
        }
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(HASH_HEX_LEN);
    hex
}
