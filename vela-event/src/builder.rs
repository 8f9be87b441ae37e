// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event builder.
//!
//! Collects the parents of a new event and wires the event into the graph
//! exactly once, either on [`EventBuilder::finalize`] or when the builder is
//! dropped.

use crate::event::{EventId, ExecutionStatus, NewEvent};
use crate::registry::{EventRef, EventsRegistry};

pub struct EventBuilder<'r> {
    registry: &'r EventsRegistry,
    event: Option<EventRef>,
    parents: Vec<EventId>,
    finalized: bool,
}

impl<'r> EventBuilder<'r> {
    pub fn new(registry: &'r EventsRegistry) -> Self {
        Self {
            registry,
            event: None,
            parents: Vec::new(),
            finalized: false,
        }
    }

    /// Create the event being built.
    pub fn create(&mut self, desc: NewEvent) -> &EventRef {
        debug_assert!(self.event.is_none(), "EventBuilder already owns an event");
        let event = self.registry.create_event(desc);
        self.event.insert(event)
    }

    pub fn event(&self) -> Option<&EventRef> {
        self.event.as_ref()
    }

    /// Make the event wait on `parent`. Each parent is held once.
    pub fn add_parent(&mut self, parent: &EventRef) {
        debug_assert!(
            std::sync::Arc::ptr_eq(parent.shared(), self.registry.shared()),
            "parent event belongs to another registry"
        );
        let id = parent.id();
        if self.parents.contains(&id) {
            return;
        }
        parent.inc_ref_internal();
        self.parents.push(id);
    }

    pub fn add_parents(&mut self, parents: &[EventRef]) {
        for parent in parents {
            self.add_parent(parent);
        }
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Wire the event under its parents. Only the first call has an effect.
    ///
    /// A sentinel user event is made the first parent so the event cannot be
    /// released while the remaining edges are added; completing it releases
    /// the event if no other parent holds it back. Parents that are already
    /// ordered before the event by submission order get no edge.
    pub fn finalize(&mut self) {
        let Some(event_id) = self.event.as_ref().map(|e| e.id()) else {
            self.clear();
            return;
        };
        if self.finalized {
            self.clear();
            return;
        }

        let parents = &self.parents;
        self.registry.shared().with_graph(|graph, fx| {
            if parents.is_empty() && !graph.awaits_task_level(event_id) {
                return;
            }
            let sentinel = graph.insert(NewEvent::user());
            graph.add_child(sentinel, event_id, fx);
            for &parent in parents {
                if graph.needs_edge(parent) {
                    graph.add_child(parent, event_id, fx);
                }
            }
            graph.set_status(sentinel, ExecutionStatus::Complete, fx);
            graph.dec_ref(sentinel, fx);
        });

        self.clear();
        self.finalized = true;
    }

    /// Finalize and hand the event to the caller.
    pub fn finalize_and_release(mut self) -> Option<EventRef> {
        self.finalize();
        self.event.take()
    }

    /// Release the parents.
    fn clear(&mut self) {
        if self.parents.is_empty() {
            return;
        }
        let parents = std::mem::take(&mut self.parents);
        self.registry.shared().with_graph(|graph, fx| {
            for parent in parents {
                graph.dec_ref(parent, fx);
            }
        });
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.event.is_some() || self.finalized || self.parents.is_empty(),
                "EventBuilder dropped with parents but no event"
            );
        }
        if !self.finalized {
            self.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vela_common::{Settings, TASK_COUNT_NOT_READY};
    use vela_gpu::{Device, EngineStatus, TagAddress};

    fn engine() -> Arc<EngineStatus> {
        Arc::new(EngineStatus::new(TagAddress::detached()))
    }

    #[test]
    fn test_parents_are_deduplicated() {
        let registry = EventsRegistry::new();
        let parent = registry.create_user_event();
        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parent(&parent);
        builder.add_parent(&parent);
        assert_eq!(builder.parent_count(), 1);
        assert_eq!(parent.internal_ref_count(), 2);
        builder.finalize();
        assert_eq!(parent.internal_ref_count(), 1);
    }

    #[test]
    fn test_finalize_twice_releases_parents_once() {
        let registry = EventsRegistry::new();
        let a = registry.create_user_event();
        let b = registry.create_user_event();
        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parents(&[a.clone(), b.clone()]);

        builder.finalize();
        let after_first = (a.internal_ref_count(), b.internal_ref_count());
        let child_parents = builder.event().unwrap().parent_count();
        builder.finalize();
        assert_eq!((a.internal_ref_count(), b.internal_ref_count()), after_first);
        assert_eq!(builder.event().unwrap().parent_count(), child_parents);
        assert!(builder.is_finalized());
    }

    #[test]
    fn test_only_pending_parent_gets_the_event() {
        let registry = EventsRegistry::new();
        let pending = registry.create_user_event();
        let done = registry.create_user_event();
        done.set_status(ExecutionStatus::Complete);
        assert_eq!(pending.task_level(), TASK_COUNT_NOT_READY);

        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parents(&[pending.clone(), done.clone()]);
        let event = builder.finalize_and_release().unwrap();

        assert_eq!(event.parent_count(), 1);
        assert!(event.is_blocked());
        // Edge from `pending` holds one reference on the event.
        assert_eq!(event.internal_ref_count(), 2);
        assert_eq!(done.internal_ref_count(), 1);
        assert_eq!(pending.internal_ref_count(), 1);

        pending.set_status(ExecutionStatus::Complete);
        assert!(!event.is_blocked());
        assert_eq!(event.status(), ExecutionStatus::Complete);
        assert_eq!(event.internal_ref_count(), 1);
    }

    #[test]
    fn test_event_without_pending_parents_is_released() {
        let registry = EventsRegistry::new();
        let done = registry.create_user_event();
        done.set_status(ExecutionStatus::Complete);

        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parent(&done);
        let event = builder.finalize_and_release().unwrap();
        assert_eq!(event.parent_count(), 0);
        assert_eq!(event.status(), ExecutionStatus::Complete);
        assert_eq!(event.task_count(), 0);
    }

    #[test]
    fn test_drop_finalizes() {
        let registry = EventsRegistry::new();
        let gate = registry.create_user_event();
        let event = {
            let mut builder = EventBuilder::new(&registry);
            let event = builder.create(NewEvent::marker(engine())).clone();
            builder.add_parent(&gate);
            event
        };
        assert!(event.is_blocked());
        assert_eq!(gate.internal_ref_count(), 1);
        gate.set_status(ExecutionStatus::Complete);
        assert_eq!(event.status(), ExecutionStatus::Complete);
    }

    #[test]
    fn test_without_event_only_parents_are_released() {
        let registry = EventsRegistry::new();
        let parent = registry.create_user_event();
        let mut builder = EventBuilder::new(&registry);
        builder.add_parent(&parent);
        builder.finalize();
        assert_eq!(parent.internal_ref_count(), 1);
        assert_eq!(builder.parent_count(), 0);
        assert!(builder.finalize_and_release().is_none());
    }

    #[test]
    fn test_terminated_parent_aborts_built_event() {
        let registry = EventsRegistry::new();
        let gate = registry.create_user_event();
        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parent(&gate);
        let event = builder.finalize_and_release().unwrap();

        gate.terminate(-3);
        assert_eq!(event.status(), ExecutionStatus::Terminated(-3));
        assert!(event.wait(false));
    }

    #[test]
    fn test_released_event_survives_until_parent_completes() {
        let registry = EventsRegistry::new();
        let gate = registry.create_user_event();
        let mut builder = EventBuilder::new(&registry);
        builder.create(NewEvent::marker(engine()));
        builder.add_parent(&gate);
        drop(builder.finalize_and_release());

        assert_eq!(registry.live_event_count(), 1);
        assert_eq!(registry.event_count(), 2);
        gate.set_status(ExecutionStatus::Complete);
        assert_eq!(registry.event_count(), 1);
    }

    #[test]
    fn test_builder_with_simulated_device() {
        let device = Arc::new(Device::simulated(Settings::default()).unwrap());
        let registry = EventsRegistry::for_device(device);
        let gate = registry.create_user_event();
        let event = registry
            .enqueue(vec![0u8; 32], Vec::new(), vela_gpu::SubmissionFlags::empty(), &[gate.clone()])
            .unwrap();
        assert!(!event.wait(false));
        gate.set_status(ExecutionStatus::Complete);
        assert!(event.wait(false));
        assert_eq!(event.task_count(), 1);
    }
}
