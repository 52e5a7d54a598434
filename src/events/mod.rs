// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod bus;
mod types;

pub use bus::{EventBus, EventStream, DEFAULT_SUBSCRIBER_BUFFER};
pub use types::{Event, EventKind};
