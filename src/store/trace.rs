// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Append-only event trace.
//!
//! A [`TraceWriter`] subscribes to the session bus and appends every event
//! as one JSON object per line next to the plan record. The trace is the
//! durable event record; the bus itself persists nothing.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::events::EventBus;

pub struct TraceWriter {
    handle: JoinHandle<()>,
}

impl TraceWriter {
    /// Subscribe to the bus and stream events into `path` until the session
    /// closes. The subscription is registered before this returns, so no
    /// event published afterwards is missed.
    pub fn spawn(bus: &EventBus, path: PathBuf) -> Self {
        let mut stream = bus.subscribe();
        let handle = tokio::spawn(async move {
            let file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "trace file unavailable; events not persisted");
                    // Drain the stream anyway so the subscriber slot drops
                    // when the session closes.
                    while stream.next().await.is_some() {}
                    return;
                }
            };

            let mut writer = tokio::io::BufWriter::new(file);
            while let Some(event) = stream.next().await {
                match serde_json::to_string(&*event) {
                    Ok(line) => {
                        if writer.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                        if writer.write_all(b"\n").await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "unserializable event skipped in trace");
                    }
                }
            }
            let _ = writer.flush().await;
        });
        Self { handle }
    }

    /// Wait for the writer to drain and flush. Call after closing the bus.
    pub async fn finish(self) {
        let _ = self.handle.await;
    }
}
