// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-session event bus: ordered, at-most-once, bounded, drop-oldest.
//!
//! Producers never block. Each subscriber owns a bounded queue; when a slow
//! subscriber falls more than `capacity` events behind, the oldest queued
//! event is dropped and replaced with a coalesced [`EventKind::BufferOverflow`]
//! marker carrying the number of dropped events. The marker takes the
//! sequence number of the first event it replaced, so the sequence numbers a
//! subscriber observes are always strictly increasing.
//!
//! One mutex guards all bus state and is never held across an await point.
//! The bus does not persist anything; the trace writer (a subscriber) is the
//! durable record.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;

use crate::events::{Event, EventKind};

/// Default per-subscriber buffer length.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

struct SubscriberSlot {
    id: u64,
    buf: VecDeque<Arc<Event>>,
    notify: Arc<Notify>,
}

struct BusInner {
    next_seq: u64,
    next_subscriber_id: u64,
    closed: bool,
    subscribers: Vec<SubscriberSlot>,
}

struct Shared {
    session_id: String,
    capacity: usize,
    inner: Mutex<BusInner>,
}

/// Cheaply clonable handle to one session's event stream.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_capacity(session_id, DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_capacity(session_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                capacity: capacity.max(2),
                inner: Mutex::new(BusInner {
                    next_seq: 0,
                    next_subscriber_id: 0,
                    closed: false,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Publish an event to every live subscriber. Never blocks; returns the
    /// assigned sequence number. Publishing after `close` is a no-op.
    pub fn publish(&self, kind: EventKind) -> u64 {
        let mut inner = lock(&self.shared.inner);
        if inner.closed {
            return inner.next_seq;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let event = Arc::new(Event {
            seq,
            ts: Utc::now(),
            session_id: self.shared.session_id.clone(),
            kind,
        });

        let capacity = self.shared.capacity;
        for slot in &mut inner.subscribers {
            // Keep the queue within capacity after the push. The first drop
            // converts the oldest real event into a marker (no net change);
            // every further drop absorbs one more event into the marker.
            while slot.buf.len() >= capacity {
                Self::drop_oldest(slot);
                if slot.buf.len() < 2 {
                    break;
                }
            }
            slot.buf.push_back(event.clone());
            slot.notify.notify_one();
        }
        seq
    }

    /// Drop the oldest real event from a full queue, coalescing into a
    /// single overflow marker at the front.
    fn drop_oldest(slot: &mut SubscriberSlot) {
        let Some(oldest) = slot.buf.pop_front() else {
            return;
        };

        let marker = match &oldest.kind {
            EventKind::BufferOverflow { dropped } => {
                // Already a marker: absorb the next real event into it.
                let absorbed = slot.buf.pop_front();
                let extra = u64::from(absorbed.is_some());
                Event {
                    seq: oldest.seq,
                    ts: oldest.ts,
                    session_id: oldest.session_id.clone(),
                    kind: EventKind::BufferOverflow {
                        dropped: dropped + extra,
                    },
                }
            }
            _ => Event {
                seq: oldest.seq,
                ts: oldest.ts,
                session_id: oldest.session_id.clone(),
                kind: EventKind::BufferOverflow { dropped: 1 },
            },
        };
        slot.buf.push_front(Arc::new(marker));
    }

    /// Register a subscriber. The stream yields events in publish order
    /// until the session closes and the queue drains.
    pub fn subscribe(&self) -> EventStream {
        let mut inner = lock(&self.shared.inner);
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        let notify = Arc::new(Notify::new());
        if !inner.closed {
            inner.subscribers.push(SubscriberSlot {
                id,
                buf: VecDeque::new(),
                notify: notify.clone(),
            });
        }
        EventStream {
            shared: self.shared.clone(),
            id,
            notify,
        }
    }

    /// End the session: no further events are accepted, and every stream
    /// terminates once its remaining buffer is drained.
    pub fn close(&self) {
        let mut inner = lock(&self.shared.inner);
        inner.closed = true;
        for slot in &inner.subscribers {
            slot.notify.notify_one();
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        lock(&self.shared.inner).subscribers.len()
    }
}

/// A lazy sequence of session events for one subscriber.
pub struct EventStream {
    shared: Arc<Shared>,
    id: u64,
    notify: Arc<Notify>,
}

impl EventStream {
    /// Next event in publish order, or `None` once the session has closed
    /// and the buffer is drained (or this handle was detached).
    pub async fn next(&mut self) -> Option<Arc<Event>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = lock(&self.shared.inner);
                let closed = inner.closed;
                match inner.subscribers.iter_mut().find(|s| s.id == self.id) {
                    Some(slot) => {
                        if let Some(event) = slot.buf.pop_front() {
                            return Some(event);
                        }
                        if closed {
                            return None;
                        }
                    }
                    None => return None,
                }
            }
            notified.await;
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared.inner);
        inner.subscribers.retain(|s| s.id != self.id);
    }
}

fn lock(mutex: &Mutex<BusInner>) -> std::sync::MutexGuard<'_, BusInner> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
