// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Completion events for the vela GPU runtime.
//!
//! An event tracks one unit of asynchronous work through
//! `NotReady → Queued → Submitted → Running → Complete` (or a terminal
//! error). Events depend on each other through parent/child edges built by
//! [`EventBuilder`]; an [`EventsRegistry`] owns the events of one device and
//! refreshes them from the engine's completion tag.

pub mod builder;
pub mod event;
mod graph;
pub mod registry;

pub use builder::EventBuilder;
pub use event::{
    CallbackTarget, EventCallback, EventId, EventKind, ExecutionStatus, NewEvent, PendingCommand,
    ProfilingTimestamps, WaitError, EVENT_ABORTED,
};
pub use registry::{EventRef, EventsRegistry};
