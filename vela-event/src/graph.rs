// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event arena and the status state machine.
//!
//! Events live in a map keyed by [`EventId`]. A dependency edge is a child id
//! in the parent's list plus one pending parent on the child; the parent
//! holds an internal reference on each child until it unblocks it. The
//! registry's live events form a doubly linked list threaded through the
//! nodes, so an update walk can resume from any node it has visited.
//!
//! Callbacks never run under the graph lock. Every operation that fires
//! them collects them into [`Effects`] and the caller runs those once the
//! lock is released. Pending commands do run under the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace};

use vela_common::{TaskCount, TASK_COUNT_NOT_READY};
use vela_gpu::EngineStatus;

use crate::event::{
    CallbackTarget, EventCallback, EventId, EventKind, ExecutionStatus, NewEvent, PendingCommand,
    ProfilingTimestamps, EVENT_ABORTED,
};

/// Callbacks collected while the graph was locked.
#[derive(Default)]
pub(crate) struct Effects {
    callbacks: Vec<(EventCallback, EventId, ExecutionStatus)>,
}

impl Effects {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub(crate) fn run(self) {
        for (callback, id, status) in self.callbacks {
            callback(id, status);
        }
    }
}

/// One event in the arena.
pub(crate) struct EventNode {
    kind: EventKind,
    status: ExecutionStatus,
    task_level: TaskCount,
    task_count: TaskCount,
    engine: Option<Arc<EngineStatus>>,
    command: Option<PendingCommand>,
    parent_count: u32,
    children: Vec<EventId>,
    parents: Vec<EventId>,
    callbacks: [Vec<EventCallback>; CallbackTarget::COUNT],
    profiling: bool,
    cpu_profiling_path: bool,
    timestamps: ProfilingTimestamps,
    internal_refs: u32,
    linked: bool,
    prev: Option<EventId>,
    next: Option<EventId>,
}

impl EventNode {
    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub(crate) fn task_level(&self) -> TaskCount {
        self.task_level
    }

    pub(crate) fn task_count(&self) -> TaskCount {
        self.task_count
    }

    pub(crate) fn parent_count(&self) -> u32 {
        self.parent_count
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.parent_count > 0
    }

    pub(crate) fn parents(&self) -> &[EventId] {
        &self.parents
    }

    pub(crate) fn timestamps(&self) -> ProfilingTimestamps {
        self.timestamps
    }

    pub(crate) fn internal_refs(&self) -> u32 {
        self.internal_refs
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.linked
    }

    /// Task level a completed event hands to its children when it has none.
    fn own_task_level(&self) -> TaskCount {
        match self.kind {
            EventKind::User if self.status == ExecutionStatus::Complete => 0,
            EventKind::User => TASK_COUNT_NOT_READY,
            _ => self.task_level,
        }
    }
}

impl fmt::Debug for EventNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNode")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("task_level", &self.task_level)
            .field("task_count", &self.task_count)
            .field("parent_count", &self.parent_count)
            .field("children", &self.children)
            .field("internal_refs", &self.internal_refs)
            .field("linked", &self.linked)
            .finish()
    }
}

fn elapsed_ns(epoch: Instant) -> u64 {
    epoch.elapsed().as_nanos() as u64
}

/// All events of one registry.
pub(crate) struct EventGraph {
    nodes: HashMap<EventId, EventNode>,
    next_id: u64,
    head: Option<EventId>,
    linked: usize,
    epoch: Instant,
    profiling: bool,
    track_parents: bool,
}

impl EventGraph {
    pub(crate) fn new(profiling: bool, track_parents: bool) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            head: None,
            linked: 0,
            epoch: Instant::now(),
            profiling,
            track_parents,
        }
    }

    // ── Arena ──

    /// Add an event holding one internal reference. It is not linked yet.
    pub(crate) fn insert(&mut self, desc: NewEvent) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;

        let profiling = desc.profiling.unwrap_or(self.profiling);
        let mut timestamps = ProfilingTimestamps::default();
        if profiling {
            timestamps.queued = Some(elapsed_ns(self.epoch));
        }
        let status = match desc.kind {
            EventKind::User => ExecutionStatus::Queued,
            _ => ExecutionStatus::NotReady,
        };

        trace!(
            "event {}: created {:?} level=0x{:X} count=0x{:X}",
            id,
            desc.kind,
            desc.task_level,
            desc.task_count
        );
        self.nodes.insert(
            id,
            EventNode {
                kind: desc.kind,
                status,
                task_level: desc.task_level,
                task_count: desc.task_count,
                engine: desc.engine,
                command: desc.command,
                parent_count: 0,
                children: Vec::new(),
                parents: Vec::new(),
                callbacks: Default::default(),
                profiling,
                cpu_profiling_path: desc.cpu_profiling_path,
                timestamps,
                internal_refs: 1,
                linked: false,
                prev: None,
                next: None,
            },
        );
        id
    }

    pub(crate) fn get(&self, id: EventId) -> Option<&EventNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn contains(&self, id: EventId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Events in the arena, linked or not.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Events on the live list.
    pub(crate) fn linked_count(&self) -> usize {
        self.linked
    }

    pub(crate) fn head(&self) -> Option<EventId> {
        self.head
    }

    pub(crate) fn next_linked(&self, id: EventId) -> Option<EventId> {
        self.nodes.get(&id).and_then(|node| node.next)
    }

    /// Push `id` at the front of the live list.
    pub(crate) fn link(&mut self, id: EventId) {
        let old_head = self.head;
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.linked {
            return;
        }
        node.linked = true;
        node.prev = None;
        node.next = old_head;
        if let Some(old) = old_head.and_then(|h| self.nodes.get_mut(&h)) {
            old.prev = Some(id);
        }
        self.head = Some(id);
        self.linked += 1;
    }

    /// Take `id` off the live list. Returns whether it was on it.
    pub(crate) fn unlink(&mut self, id: EventId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if !node.linked {
            return false;
        }
        node.linked = false;
        let prev = node.prev.take();
        let next = node.next.take();

        match prev.and_then(|p| self.nodes.get_mut(&p)) {
            Some(prev_node) => prev_node.next = next,
            None => self.head = next,
        }
        if let Some(next_node) = next.and_then(|n| self.nodes.get_mut(&n)) {
            next_node.prev = prev;
        }
        self.linked -= 1;
        true
    }

    pub(crate) fn inc_ref(&mut self, id: EventId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.internal_refs += 1;
        }
    }

    /// Drop one internal reference; the last one destroys the event.
    pub(crate) fn dec_ref(&mut self, id: EventId, fx: &mut Effects) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        debug_assert!(node.internal_refs > 0, "event {} over-released", id);
        node.internal_refs = node.internal_refs.saturating_sub(1);
        if node.internal_refs == 0 {
            self.destroy(id, fx);
        }
    }

    fn destroy(&mut self, id: EventId, fx: &mut Effects) {
        if self.unlink(id) {
            debug!("event {}: destroyed while still registered", id);
        }
        self.submit_command(id, true);

        let Some(status) = self.nodes.get(&id).map(|n| n.status) else {
            return;
        };
        let status = if status.is_completed() {
            status
        } else {
            let aborted = ExecutionStatus::Terminated(EVENT_ABORTED);
            self.transition(id, aborted);
            aborted
        };
        // Children not notified yet still wait on this event.
        self.unblock_children(id, status, fx);

        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };
        for list in node.callbacks.iter_mut() {
            for callback in list.drain(..) {
                fx.callbacks.push((callback, id, status));
            }
        }
        trace!("event {}: destroyed ({})", id, status);
    }

    // ── Status ──

    /// Move `id` to `status`. Rejected once completed, for the current
    /// status, for a less complete status, and for anything but termination
    /// while the event still waits on parents.
    pub(crate) fn set_status(&mut self, id: EventId, status: ExecutionStatus, fx: &mut Effects) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let previous = node.status;
        if previous.is_completed() || status == previous || status.rank() < previous.rank() {
            return false;
        }
        if node.is_blocked() && !status.is_terminated() {
            return false;
        }

        let releases_children = status == ExecutionStatus::Submitted || status.is_completed();
        if releases_children {
            self.submit_command(id, status.is_terminated());
        }
        self.transition(id, status);
        if releases_children {
            self.unblock_children(id, status, fx);
        }
        self.queue_callbacks(id, status, fx);
        true
    }

    /// Re-derive the status of `id` from its parents and its engine's tag.
    pub(crate) fn update_execution_status(&mut self, id: EventId, fx: &mut Effects) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if node.task_level == TASK_COUNT_NOT_READY {
            return;
        }
        let status = node.status;
        if status.is_completed() {
            self.queue_callbacks(id, status, fx);
            return;
        }
        if node.is_blocked() {
            self.transition(id, ExecutionStatus::Queued);
            self.queue_callbacks(id, ExecutionStatus::Queued, fx);
            return;
        }

        if status.rank() <= ExecutionStatus::Queued.rank() {
            self.submit_command(id, false);
            self.transition(id, ExecutionStatus::Submitted);
            self.queue_callbacks(id, ExecutionStatus::Submitted, fx);
            self.unblock_children(id, ExecutionStatus::Submitted, fx);
        }

        match self.device_progress(id) {
            Some(ExecutionStatus::Complete) => {
                self.transition(id, ExecutionStatus::Complete);
                self.queue_callbacks(id, ExecutionStatus::Complete, fx);
                self.unblock_children(id, ExecutionStatus::Complete, fx);
            }
            Some(ExecutionStatus::Running) => {
                self.transition(id, ExecutionStatus::Running);
                self.queue_callbacks(id, ExecutionStatus::Running, fx);
            }
            _ => {}
        }
    }

    /// Status the engine's counters imply for `id`, if they imply one.
    fn device_progress(&self, id: EventId) -> Option<ExecutionStatus> {
        let node = self.nodes.get(&id)?;
        let engine = node.engine.as_ref()?;
        if node.task_count == TASK_COUNT_NOT_READY {
            return None;
        }
        let completed = engine.completed_task_count();
        if completed >= node.task_count {
            Some(ExecutionStatus::Complete)
        } else if engine.latest_flushed_task_count() >= node.task_count
            && completed.saturating_add(1) >= node.task_count
        {
            // Flushed and next in line on an in-order engine.
            Some(ExecutionStatus::Running)
        } else {
            None
        }
    }

    /// Forward-only status change plus profiling stamps.
    fn transition(&mut self, id: EventId, status: ExecutionStatus) {
        let now = elapsed_ns(self.epoch);
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.status.is_completed() || status.rank() <= node.status.rank() {
            return;
        }
        let previous = node.status;
        node.status = status;

        if node.profiling {
            let ts = &mut node.timestamps;
            match status {
                ExecutionStatus::Submitted => {
                    ts.submit.get_or_insert(now);
                }
                ExecutionStatus::Running => {
                    ts.submit.get_or_insert(now);
                    ts.start.get_or_insert(now);
                }
                ExecutionStatus::Complete | ExecutionStatus::Terminated(_) => {
                    ts.submit.get_or_insert(now);
                    ts.start.get_or_insert(now);
                    ts.end.get_or_insert(now);
                }
                ExecutionStatus::NotReady | ExecutionStatus::Queued => {}
            }
        }
        trace!("event {}: {} -> {}", id, previous, status);
    }

    /// Run the pending command of `id`, if any.
    fn submit_command(&mut self, id: EventId, abort: bool) {
        let now = elapsed_ns(self.epoch);
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if let Some(command) = node.command.take() {
            if node.profiling {
                node.timestamps.submit = Some(now);
                if node.cpu_profiling_path {
                    node.timestamps.start = Some(now);
                }
            }
            let task_count = command(node.task_level, abort);
            debug!(
                "event {}: command ran at level 0x{:X} as task {} (abort={})",
                id, node.task_level, task_count, abort
            );
            node.task_count = task_count;
        }
        if node.kind == EventKind::Marker && node.task_count == TASK_COUNT_NOT_READY && !abort {
            if let Some(engine) = &node.engine {
                node.task_count = engine.task_count();
            }
        }
    }

    fn queue_callbacks(&mut self, id: EventId, status: ExecutionStatus, fx: &mut Effects) {
        let Some(target) = CallbackTarget::reached_by(status) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        for list in node.callbacks[..=target.index()].iter_mut() {
            for callback in list.drain(..) {
                fx.callbacks.push((callback, id, status));
            }
        }
    }

    // ── Dependencies ──

    /// Make `child` wait on `parent`. A parent that already completed
    /// releases the child at once.
    pub(crate) fn add_child(&mut self, parent: EventId, child: EventId, fx: &mut Effects) {
        if !self.nodes.contains_key(&parent) {
            return;
        }
        let track_parents = self.track_parents;
        let Some(child_node) = self.nodes.get_mut(&child) else {
            return;
        };
        child_node.parent_count += 1;
        child_node.internal_refs += 1;
        if track_parents {
            child_node.parents.push(parent);
        }

        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return;
        };
        parent_node.children.push(child);
        let status = parent_node.status;
        trace!("event {}: child {} added", parent, child);

        if status.is_completed() {
            self.unblock_children(parent, status, fx);
        }
    }

    fn unblock_children(&mut self, id: EventId, status: ExecutionStatus, fx: &mut Effects) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let level = if status.is_terminated() {
            TASK_COUNT_NOT_READY
        } else if node.task_level == TASK_COUNT_NOT_READY {
            node.task_level = node.own_task_level();
            node.task_level
        } else {
            node.task_level.saturating_add(1)
        };

        let children = std::mem::take(&mut node.children);
        for child in children {
            self.unblock_by(child, id, level, status, fx);
            self.dec_ref(child, fx);
        }
    }

    fn unblock_by(
        &mut self,
        id: EventId,
        parent: EventId,
        level: TaskCount,
        status: ExecutionStatus,
        fx: &mut Effects,
    ) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        debug_assert!(node.parent_count > 0, "event {} unblocked too often", id);
        node.parent_count = node.parent_count.saturating_sub(1);
        if node.parent_count > 0 && !status.is_terminated() {
            return;
        }
        trace!("event {}: unblocked by {} ({})", id, parent, status);

        node.task_level = if node.task_level == TASK_COUNT_NOT_READY {
            let engine_level = node.engine.as_ref().map_or(0, |e| e.task_count());
            engine_level.max(level)
        } else {
            node.task_level.max(level)
        };

        let propagated = if status.is_terminated() {
            status
        } else {
            ExecutionStatus::Submitted
        };
        self.set_status(id, propagated, fx);
        self.update_execution_status(id, fx);
    }

    /// Whether an event waiting to be built must be added as a child of
    /// `parent` rather than relying on submission order.
    pub(crate) fn needs_edge(&self, parent: EventId) -> bool {
        self.nodes.get(&parent).is_some_and(|node| {
            node.is_blocked() || node.task_level == TASK_COUNT_NOT_READY || node.command.is_some()
        })
    }

    /// Whether `id` still needs a parent to hand it a task level.
    pub(crate) fn awaits_task_level(&self, id: EventId) -> bool {
        self.nodes.get(&id).is_some_and(|node| {
            node.kind != EventKind::User
                && node.task_level == TASK_COUNT_NOT_READY
                && !node.status.is_completed()
        })
    }

    // ── Per-event settings ──

    /// Register `callback` and fire it at once if `id` is already past `target`.
    pub(crate) fn add_callback(
        &mut self,
        id: EventId,
        target: CallbackTarget,
        callback: EventCallback,
        fx: &mut Effects,
    ) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.callbacks[target.index()].push(callback);
        self.update_execution_status(id, fx);
        if let Some(status) = self.nodes.get(&id).map(|n| n.status) {
            self.queue_callbacks(id, status, fx);
        }
    }

    pub(crate) fn set_cpu_profiling_path(&mut self, id: EventId, enabled: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.cpu_profiling_path = enabled;
        }
    }
}
