// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event vocabulary: identifiers, execution status, callbacks and the
//! description an event is created from.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use vela_common::{TaskCount, TASK_COUNT_NOT_READY};
use vela_gpu::EngineStatus;

/// Status an event is forced into when it is released before completing.
pub const EVENT_ABORTED: i32 = -1;

/// Stable handle of an event in its registry's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution status, ordered by completion progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    NotReady,
    Queued,
    Submitted,
    Running,
    Complete,
    /// Absorbing error state; the code is negative.
    Terminated(i32),
}

impl ExecutionStatus {
    /// Position in the completion order. Termination ranks with `Complete`.
    pub fn rank(self) -> u8 {
        match self {
            Self::NotReady => 0,
            Self::Queued => 1,
            Self::Submitted => 2,
            Self::Running => 3,
            Self::Complete | Self::Terminated(_) => 4,
        }
    }

    /// `Complete` or terminated.
    pub fn is_completed(self) -> bool {
        self.rank() == 4
    }

    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "not-ready"),
            Self::Queued => write!(f, "queued"),
            Self::Submitted => write!(f, "submitted"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Terminated(code) => write!(f, "terminated({})", code),
        }
    }
}

/// Status a callback waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallbackTarget {
    Queued,
    Submitted,
    Running,
    Complete,
}

impl CallbackTarget {
    pub(crate) const COUNT: usize = 4;

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Highest target satisfied by `status`. Terminated satisfies every target.
    pub(crate) fn reached_by(status: ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::NotReady => None,
            ExecutionStatus::Queued => Some(Self::Queued),
            ExecutionStatus::Submitted => Some(Self::Submitted),
            ExecutionStatus::Running => Some(Self::Running),
            ExecutionStatus::Complete | ExecutionStatus::Terminated(_) => Some(Self::Complete),
        }
    }
}

/// Completion callback. Receives the event and the status that fired it.
pub type EventCallback = Box<dyn FnOnce(EventId, ExecutionStatus) + Send>;

/// Work held back until the event is unblocked.
///
/// Called with the task level the event was unblocked at and whether the
/// work must be abandoned (a parent terminated). Returns the task count the
/// work was submitted under.
pub type PendingCommand = Box<dyn FnOnce(TaskCount, bool) -> TaskCount + Send>;

/// CPU timestamps in nanoseconds since the registry was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilingTimestamps {
    pub queued: Option<u64>,
    pub submit: Option<u64>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// What an event stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Work submitted to an engine, now or once unblocked.
    Command,
    /// Completes once everything submitted to the engine before it completes.
    Marker,
    /// Completed by the application.
    User,
}

/// Description of an event to create.
pub struct NewEvent {
    pub(crate) kind: EventKind,
    pub(crate) task_level: TaskCount,
    pub(crate) task_count: TaskCount,
    pub(crate) engine: Option<Arc<EngineStatus>>,
    pub(crate) command: Option<PendingCommand>,
    pub(crate) profiling: Option<bool>,
    pub(crate) cpu_profiling_path: bool,
}

impl NewEvent {
    fn with_kind(kind: EventKind, engine: Option<Arc<EngineStatus>>) -> Self {
        Self {
            kind,
            task_level: TASK_COUNT_NOT_READY,
            task_count: TASK_COUNT_NOT_READY,
            engine,
            command: None,
            profiling: None,
            cpu_profiling_path: false,
        }
    }

    /// Event for work already flushed as `task_count`.
    pub fn submitted(engine: Arc<EngineStatus>, task_level: TaskCount, task_count: TaskCount) -> Self {
        Self {
            task_level,
            task_count,
            ..Self::with_kind(EventKind::Command, Some(engine))
        }
    }

    /// Event whose work runs once all of its parents are satisfied.
    pub fn deferred(engine: Arc<EngineStatus>, command: PendingCommand) -> Self {
        Self {
            command: Some(command),
            ..Self::with_kind(EventKind::Command, Some(engine))
        }
    }

    /// Marker over everything submitted to `engine` before it is unblocked.
    pub fn marker(engine: Arc<EngineStatus>) -> Self {
        Self::with_kind(EventKind::Marker, Some(engine))
    }

    /// Application-completed event. Starts `Queued`.
    pub fn user() -> Self {
        Self::with_kind(EventKind::User, None)
    }

    /// Override the registry's profiling setting for this event.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = Some(enabled);
        self
    }

    /// Record start at submission and end at completion on the CPU.
    pub fn with_cpu_profiling_path(mut self) -> Self {
        self.cpu_profiling_path = true;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Debug for NewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewEvent")
            .field("kind", &self.kind)
            .field("task_level", &self.task_level)
            .field("task_count", &self.task_count)
            .field("has_engine", &self.engine.is_some())
            .field("has_command", &self.command.is_some())
            .finish()
    }
}

/// Failure of a multi-event wait.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("event {event} in the wait list terminated with status {code}")]
    ExecStatusErrorForEventsInWaitList { event: EventId, code: i32 },
}
