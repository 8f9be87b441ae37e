// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Events registry.
//!
//! Owns the event arena of one device and the list of live events that
//! [`EventsRegistry::broadcast_update_all`] walks. Callbacks fired during the
//! walk may release events; the walking thread cannot unlink them under its
//! own feet, so their removal is queued and carried out once the walk is
//! done. Releases from other threads wait for the walk instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use vela_common::{Settings, TaskCount, TASK_COUNT_NOT_READY};
use vela_gpu::{AllocationRef, Device, EngineStatus, SubmissionFlags, WaitToken};

use crate::builder::EventBuilder;
use crate::event::{
    CallbackTarget, EventId, EventKind, ExecutionStatus, NewEvent, PendingCommand,
    ProfilingTimestamps, WaitError,
};
use crate::graph::{Effects, EventGraph};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Identity of the calling thread. Never 0.
fn current_thread() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

const NO_OWNER: u64 = 0;

pub(crate) struct RegistryShared {
    graph: Mutex<EventGraph>,
    /// Held while walking or releasing events.
    processing: Mutex<()>,
    /// Thread holding `processing`, or `NO_OWNER`.
    lock_owner: AtomicU64,
    /// Thread holding `graph`, or `NO_OWNER`.
    graph_owner: AtomicU64,
    deferred: Mutex<Vec<EventId>>,
    device: Mutex<Option<Arc<Device>>>,
}

impl RegistryShared {
    fn new(settings: &Settings) -> Self {
        Self {
            graph: Mutex::new(EventGraph::new(settings.profiling, settings.events_debug)),
            processing: Mutex::new(()),
            lock_owner: AtomicU64::new(NO_OWNER),
            graph_owner: AtomicU64::new(NO_OWNER),
            deferred: Mutex::new(Vec::new()),
            device: Mutex::new(None),
        }
    }

    fn owns_processing(&self) -> bool {
        self.lock_owner.load(Ordering::Acquire) == current_thread()
    }

    fn owns_graph(&self) -> bool {
        self.graph_owner.load(Ordering::Acquire) == current_thread()
    }

    // ── Graph access ──

    fn locked_graph<R>(&self, f: impl FnOnce(&mut EventGraph, &mut Effects) -> R) -> (R, Effects) {
        let mut fx = Effects::default();
        let mut graph = self.graph.lock();
        self.graph_owner.store(current_thread(), Ordering::Release);
        let result = f(&mut graph, &mut fx);
        self.graph_owner.store(NO_OWNER, Ordering::Release);
        drop(graph);
        (result, fx)
    }

    /// Run `f` on the graph, then its callbacks, then any releases they queued.
    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&mut EventGraph, &mut Effects) -> R) -> R {
        let (result, fx) = self.locked_graph(f);
        fx.run();
        self.flush_deferred_if_idle();
        result
    }

    /// Read-only graph access. No callbacks can fire.
    pub(crate) fn read_graph<R>(&self, f: impl FnOnce(&EventGraph) -> R) -> R {
        f(&self.graph.lock())
    }

    // ── Processing lock ──

    /// Run `f` holding the processing lock with this thread recorded as its
    /// owner, then release everything queued meanwhile.
    fn while_processing(&self, f: impl FnOnce(&Self)) {
        let _guard = self.processing.lock();
        self.lock_owner.store(current_thread(), Ordering::Release);
        f(self);
        self.release_deferred();
        self.lock_owner.store(NO_OWNER, Ordering::Release);
    }

    fn flush_deferred_if_idle(&self) {
        if self.owns_processing() || self.deferred.lock().is_empty() {
            return;
        }
        self.while_processing(|_| {});
    }

    /// Caller owns the processing lock.
    fn release_deferred(&self) {
        loop {
            let pending = std::mem::take(&mut *self.deferred.lock());
            if pending.is_empty() {
                break;
            }
            debug!("EventsRegistry: releasing {} deferred events", pending.len());
            for id in pending {
                self.release_registration(id);
            }
        }
    }

    /// Unlink `id` and drop the registration's reference. Caller owns the
    /// processing lock.
    fn release_registration(&self, id: EventId) {
        let (_, fx) = self.locked_graph(|graph, fx| {
            graph.unlink(id);
            graph.dec_ref(id, fx);
        });
        fx.run();
    }

    /// Called when the last handle to `id` goes away.
    fn unregister_event(&self, id: EventId) {
        if self.owns_processing() || self.owns_graph() {
            trace!("EventsRegistry: deferring release of event {}", id);
            self.deferred.lock().push(id);
            return;
        }
        self.while_processing(|shared| shared.release_registration(id));
    }

    fn device(&self) -> Option<Arc<Device>> {
        self.device.lock().clone()
    }
}

/// Registry of the events of one device.
pub struct EventsRegistry {
    shared: Arc<RegistryShared>,
}

impl EventsRegistry {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    /// Registry taking its profiling and parent tracking defaults from `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            shared: Arc::new(RegistryShared::new(settings)),
        }
    }

    /// Registry attached to `device`, configured from the device's settings.
    pub fn for_device(device: Arc<Device>) -> Self {
        let registry = Self::with_settings(device.settings());
        registry.set_device(device);
        registry
    }

    pub(crate) fn shared(&self) -> &Arc<RegistryShared> {
        &self.shared
    }

    /// Attach the device. The registry keeps it alive until it is dropped.
    pub fn set_device(&self, device: Arc<Device>) {
        *self.shared.device.lock() = Some(device);
    }

    pub fn device(&self) -> Option<Arc<Device>> {
        self.shared.device()
    }

    /// Counters of the attached device's engine.
    pub fn engine_status(&self) -> Option<Arc<EngineStatus>> {
        self.shared.device().map(|d| d.engine_status().clone())
    }

    /// Create and register an event.
    pub fn create_event(&self, desc: NewEvent) -> EventRef {
        let id = self.shared.with_graph(|graph, _| {
            let id = graph.insert(desc);
            graph.link(id);
            id
        });
        EventRef::new(self.shared.clone(), id)
    }

    pub fn create_user_event(&self) -> EventRef {
        self.create_event(NewEvent::user())
    }

    /// Submit `commands` once every event in `wait_list` allows it.
    ///
    /// Returns `None` without a device.
    pub fn enqueue(
        &self,
        commands: Vec<u8>,
        surfaces: Vec<AllocationRef>,
        flags: SubmissionFlags,
        wait_list: &[EventRef],
    ) -> Option<EventRef> {
        let device = self.device()?;
        let engine = device.engine_status().clone();
        let command: PendingCommand = Box::new(move |task_level: TaskCount, abort: bool| {
            if abort {
                debug!("EventsRegistry: dropping command at level 0x{:X}", task_level);
                return device.engine_status().task_count();
            }
            match device.submit(&surfaces, &commands, flags) {
                Some(stamp) => stamp.task_count,
                None => {
                    warn!("EventsRegistry: no command buffer for {} bytes", commands.len());
                    device.engine_status().task_count()
                }
            }
        });

        let mut builder = EventBuilder::new(self);
        builder.create(NewEvent::deferred(engine, command));
        builder.add_parents(wait_list);
        builder.finalize_and_release()
    }

    /// Refresh every live event.
    pub fn broadcast_update_all(&self) {
        if self.shared.owns_processing() {
            trace!("EventsRegistry: update requested from inside an update");
            return;
        }
        self.shared.while_processing(|shared| {
            shared.release_deferred();
            let mut cursor = shared.read_graph(|graph| graph.head());
            while let Some(id) = cursor {
                let (next, fx) = shared.locked_graph(|graph, fx| {
                    graph.update_execution_status(id, fx);
                    graph.next_linked(id)
                });
                fx.run();
                cursor = next;
            }
        });
    }

    /// Block until every event in `events` completes.
    pub fn wait_for_events(&self, events: &[EventRef]) -> Result<(), WaitError> {
        for event in events {
            event.wait(true);
        }
        match events.iter().find_map(|e| match e.status() {
            ExecutionStatus::Terminated(code) => Some((e.id(), code)),
            _ => None,
        }) {
            Some((event, code)) => Err(WaitError::ExecStatusErrorForEventsInWaitList { event, code }),
            None => Ok(()),
        }
    }

    /// Events on the live list.
    pub fn live_event_count(&self) -> usize {
        self.shared.read_graph(|graph| graph.linked_count())
    }

    /// Events still allocated, including released ones other events depend on.
    pub fn event_count(&self) -> usize {
        self.shared.read_graph(|graph| graph.len())
    }

    /// Releases waiting for the current update walk.
    pub fn deferred_count(&self) -> usize {
        self.shared.deferred.lock().len()
    }
}

impl Default for EventsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventsRegistry {
    fn drop(&mut self) {
        let live = self.live_event_count();
        if live > 0 {
            warn!("EventsRegistry: dropped with {} live events", live);
        }
        self.shared.device.lock().take();
    }
}

struct Registration {
    shared: Arc<RegistryShared>,
    id: EventId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.unregister_event(self.id);
    }
}

/// Counted handle to a registered event. The event is unregistered when the
/// last clone is dropped; it stays allocated while other events depend on it.
#[derive(Clone)]
pub struct EventRef {
    registration: Arc<Registration>,
}

impl EventRef {
    fn new(shared: Arc<RegistryShared>, id: EventId) -> Self {
        Self {
            registration: Arc::new(Registration { shared, id }),
        }
    }

    pub fn id(&self) -> EventId {
        self.registration.id
    }

    pub(crate) fn shared(&self) -> &Arc<RegistryShared> {
        &self.registration.shared
    }

    fn read<R>(&self, default: R, f: impl FnOnce(&crate::graph::EventNode) -> R) -> R {
        let id = self.id();
        self.shared().read_graph(|graph| graph.get(id).map_or(default, f))
    }

    fn update<R>(&self, f: impl FnOnce(&mut EventGraph, EventId, &mut Effects) -> R) -> R {
        let id = self.id();
        self.shared().with_graph(|graph, fx| f(graph, id, fx))
    }

    // ── State ──

    pub fn kind(&self) -> EventKind {
        self.read(EventKind::User, |n| n.kind())
    }

    pub fn status(&self) -> ExecutionStatus {
        self.read(ExecutionStatus::NotReady, |n| n.status())
    }

    pub fn task_level(&self) -> TaskCount {
        self.read(TASK_COUNT_NOT_READY, |n| n.task_level())
    }

    pub fn task_count(&self) -> TaskCount {
        self.read(TASK_COUNT_NOT_READY, |n| n.task_count())
    }

    pub fn is_blocked(&self) -> bool {
        self.read(false, |n| n.is_blocked())
    }

    pub fn parent_count(&self) -> u32 {
        self.read(0, |n| n.parent_count())
    }

    /// Parents this event was made to wait on. Recorded only with
    /// `events_debug` set.
    pub fn parents(&self) -> Vec<EventId> {
        self.read(Vec::new(), |n| n.parents().to_vec())
    }

    pub fn is_registered(&self) -> bool {
        self.read(false, |n| n.is_linked())
    }

    pub fn timestamps(&self) -> ProfilingTimestamps {
        self.read(ProfilingTimestamps::default(), |n| n.timestamps())
    }

    // ── Transitions ──

    pub fn set_status(&self, status: ExecutionStatus) -> bool {
        self.update(|graph, id, fx| graph.set_status(id, status, fx))
    }

    /// Force the event into the error state `code` (negative).
    pub fn terminate(&self, code: i32) -> bool {
        debug_assert!(code < 0, "termination codes are negative");
        self.set_status(ExecutionStatus::Terminated(code))
    }

    pub fn update_execution_status(&self) {
        self.update(|graph, id, fx| graph.update_execution_status(id, fx));
    }

    pub fn update_status_and_check_completion(&self) -> bool {
        self.update_execution_status();
        self.status().is_completed()
    }

    /// Wait for completion. Without `blocking` only one refresh is made.
    pub fn wait(&self, blocking: bool) -> bool {
        self.wait_until(blocking, None)
    }

    /// Blocking wait that `token` can cancel or bound.
    pub fn wait_with_token(&self, token: &WaitToken) -> bool {
        self.wait_until(true, Some(token))
    }

    fn wait_until(&self, blocking: bool, token: Option<&WaitToken>) -> bool {
        let mut iterations = 0u64;
        loop {
            if self.update_status_and_check_completion() {
                return true;
            }
            if !blocking || token.is_some_and(|t| t.should_stop(iterations)) {
                return false;
            }
            self.flush_pending_submission();
            std::hint::spin_loop();
            iterations += 1;
        }
    }

    /// Batched engines hold work back until flushed; waiting must not.
    fn flush_pending_submission(&self) {
        let task_count = self.task_count();
        if task_count == TASK_COUNT_NOT_READY {
            return;
        }
        if let Some(device) = self.shared().device() {
            if device.engine_status().latest_flushed_task_count() < task_count {
                device.flush();
            }
        }
    }

    /// Run `callback` once the event reaches `target` (or terminates).
    pub fn add_callback(
        &self,
        target: CallbackTarget,
        callback: impl FnOnce(EventId, ExecutionStatus) + Send + 'static,
    ) {
        self.update(|graph, id, fx| graph.add_callback(id, target, Box::new(callback), fx));
    }

    /// Take start at submission and end at completion on the CPU clock.
    pub fn set_cpu_profiling_path(&self, enabled: bool) {
        self.update(|graph, id, _| graph.set_cpu_profiling_path(id, enabled));
    }

    // ── Reference counting ──

    pub fn inc_ref_internal(&self) {
        self.update(|graph, id, _| graph.inc_ref(id));
    }

    pub fn dec_ref_internal(&self) {
        self.update(|graph, id, fx| graph.dec_ref(id, fx));
    }

    pub fn internal_ref_count(&self) -> u32 {
        self.read(0, |n| n.internal_refs())
    }

    /// Live clones of this handle.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.registration)
    }
}

impl fmt::Debug for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventRef").field(&self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use vela_gpu::backend::{DeviceControl, ManualBackend};
    use vela_gpu::{HostMemoryManager, ReceiverRegistry};

    fn manual_device(settings: Settings) -> (Arc<Device>, DeviceControl) {
        let mm = HostMemoryManager::new().into_shared();
        let (backend, control) = ManualBackend::new();
        let device = Device::new(
            &ReceiverRegistry::with_default_families(),
            settings,
            mm,
            Box::new(backend),
        )
        .unwrap();
        (Arc::new(device), control)
    }

    #[test]
    fn test_user_event_lifecycle() {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        assert_eq!(event.status(), ExecutionStatus::Queued);
        assert_eq!(registry.live_event_count(), 1);
        assert!(event.is_registered());

        assert!(!event.wait(false));
        assert!(event.set_status(ExecutionStatus::Complete));
        assert!(event.wait(false));

        drop(event);
        assert_eq!(registry.live_event_count(), 0);
        assert_eq!(registry.event_count(), 0);
    }

    #[test]
    fn test_status_sequence_is_monotonic() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        let attempts = [
            ExecutionStatus::Running,
            ExecutionStatus::Submitted,
            ExecutionStatus::Queued,
            ExecutionStatus::Complete,
            ExecutionStatus::Running,
            ExecutionStatus::Terminated(-1),
        ];
        let mut observed = vec![event.status()];
        for status in attempts {
            event.set_status(status);
            observed.push(event.status());
        }
        for pair in observed.windows(2) {
            assert!(pair[0].rank() <= pair[1].rank());
        }
        assert_eq!(event.status(), ExecutionStatus::Complete);
    }

    #[test]
    fn test_clones_share_one_registration() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        let other = event.clone();
        assert_eq!(event.handle_count(), 2);
        drop(event);
        assert_eq!(registry.live_event_count(), 1);
        assert_eq!(other.handle_count(), 1);
        drop(other);
        assert_eq!(registry.live_event_count(), 0);
    }

    #[test]
    fn test_internal_reference_outlives_handles() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        event.inc_ref_internal();
        assert_eq!(event.internal_ref_count(), 2);
        let id = event.id();

        drop(event);
        assert_eq!(registry.live_event_count(), 0);
        assert_eq!(registry.event_count(), 1);

        registry.shared().with_graph(|g, fx| g.dec_ref(id, fx));
        assert_eq!(registry.event_count(), 0);
    }

    #[test]
    fn test_submitted_event_completes_with_device() {
        let (device, control) = manual_device(Settings::default());
        let registry = EventsRegistry::for_device(device.clone());
        let stamp = device.submit(&[], &[0u8; 8], SubmissionFlags::empty()).unwrap();
        let event = registry.create_event(NewEvent::submitted(
            registry.engine_status().unwrap(),
            0,
            stamp.task_count,
        ));

        registry.broadcast_update_all();
        assert_eq!(event.status(), ExecutionStatus::Running);

        control.complete(stamp.task_count);
        registry.broadcast_update_all();
        assert_eq!(event.status(), ExecutionStatus::Complete);
        assert!(event.wait(true));
    }

    #[test]
    fn test_release_from_callback_during_broadcast_is_deferred() {
        let (device, control) = manual_device(Settings::default());
        let registry = EventsRegistry::for_device(device.clone());
        let engine = registry.engine_status().unwrap();
        let stamp = device.submit(&[], &[0u8; 8], SubmissionFlags::empty()).unwrap();

        let watched = registry.create_event(NewEvent::submitted(engine.clone(), 0, stamp.task_count));
        let victims: Vec<EventRef> = (0..3)
            .map(|_| registry.create_event(NewEvent::submitted(engine.clone(), 0, stamp.task_count)))
            .collect();
        let victim_ids: Vec<EventId> = victims.iter().map(|v| v.id()).collect();

        let deferred_seen = Arc::new(AtomicU32::new(0));
        let seen = deferred_seen.clone();
        let shared = registry.shared().clone();
        watched.add_callback(CallbackTarget::Complete, move |_, _| {
            drop(victims);
            seen.store(shared.deferred.lock().len() as u32, Ordering::SeqCst);
        });
        assert_eq!(registry.live_event_count(), 4);

        control.complete_all();
        registry.broadcast_update_all();

        assert_eq!(deferred_seen.load(Ordering::SeqCst), 3);
        assert_eq!(registry.deferred_count(), 0);
        assert_eq!(registry.live_event_count(), 1);
        for id in victim_ids {
            assert!(!registry.shared().read_graph(|g| g.contains(id)));
        }
        assert_eq!(watched.status(), ExecutionStatus::Complete);
    }

    #[test]
    fn test_release_from_other_thread() {
        let registry = EventsRegistry::new();
        let events: Vec<EventRef> = (0..8).map(|_| registry.create_user_event()).collect();
        let handle = std::thread::spawn(move || drop(events));
        registry.broadcast_update_all();
        handle.join().unwrap();
        assert_eq!(registry.live_event_count(), 0);
        assert_eq!(registry.event_count(), 0);
    }

    #[test]
    fn test_callback_fires_once_when_registered_late() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        event.set_status(ExecutionStatus::Complete);

        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        event.add_callback(CallbackTarget::Submitted, move |_, status| {
            assert_eq!(status, ExecutionStatus::Complete);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        event.update_execution_status();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_terminated_event_fires_complete_callbacks_with_error() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        let result = Arc::new(Mutex::new(None));
        let slot = result.clone();
        event.add_callback(CallbackTarget::Complete, move |_, status| {
            *slot.lock() = Some(status);
        });
        assert!(event.terminate(-5));
        assert_eq!(*result.lock(), Some(ExecutionStatus::Terminated(-5)));
    }

    #[test]
    fn test_wait_for_events_reports_termination() {
        let registry = EventsRegistry::new();
        let ok = registry.create_user_event();
        let failed = registry.create_user_event();
        ok.set_status(ExecutionStatus::Complete);
        failed.terminate(-14);

        let result = registry.wait_for_events(&[ok.clone(), failed.clone()]);
        assert_eq!(
            result,
            Err(WaitError::ExecStatusErrorForEventsInWaitList {
                event: failed.id(),
                code: -14
            })
        );
        assert_eq!(registry.wait_for_events(&[ok]), Ok(()));
    }

    #[test]
    fn test_wait_with_token_gives_up() {
        let registry = EventsRegistry::new();
        let event = registry.create_user_event();
        assert!(!event.wait_with_token(&WaitToken::with_iteration_limit(5)));
    }

    #[test]
    fn test_enqueue_waits_for_user_event() {
        let (device, control) = manual_device(Settings::default());
        let registry = EventsRegistry::for_device(device.clone());
        let gate = registry.create_user_event();

        let event = registry
            .enqueue(vec![0u8; 16], Vec::new(), SubmissionFlags::empty(), &[gate.clone()])
            .unwrap();
        assert!(event.is_blocked());
        assert_eq!(event.status(), ExecutionStatus::NotReady);
        assert_eq!(control.submissions().len(), 0);

        gate.set_status(ExecutionStatus::Complete);
        assert!(!event.is_blocked());
        assert_eq!(control.submissions().len(), 1);
        assert_eq!(event.task_count(), 1);

        control.complete_all();
        assert!(event.wait(true));
    }

    #[test]
    fn test_enqueue_aborted_by_terminated_parent() {
        let (device, control) = manual_device(Settings::default());
        let registry = EventsRegistry::for_device(device);
        let gate = registry.create_user_event();
        let event = registry
            .enqueue(vec![0u8; 16], Vec::new(), SubmissionFlags::empty(), &[gate.clone()])
            .unwrap();

        gate.terminate(-1);
        assert_eq!(event.status(), ExecutionStatus::Terminated(-1));
        assert!(control.submissions().is_empty());
    }

    #[test]
    fn test_wait_flushes_batched_submission() {
        let settings = Settings {
            dispatch_mode: vela_common::DispatchMode::Batched,
            ..Settings::default()
        };
        let (device, control) = manual_device(settings);
        let registry = EventsRegistry::for_device(device.clone());
        let event = registry
            .enqueue(vec![0u8; 16], Vec::new(), SubmissionFlags::empty(), &[])
            .unwrap();
        assert!(control.submissions().is_empty());

        let token = WaitToken::with_iteration_limit(4);
        assert!(!event.wait_with_token(&token));
        assert_eq!(control.submissions().len(), 1);
        assert_eq!(device.engine_status().latest_flushed_task_count(), 1);

        control.complete_all();
        assert!(event.wait(true));
    }

    #[test]
    fn test_parents_tracked_with_events_debug() {
        let settings = Settings {
            events_debug: true,
            ..Settings::default()
        };
        let registry = EventsRegistry::with_settings(&settings);
        let parent = registry.create_user_event();
        let child = registry.create_event(NewEvent::user());
        registry
            .shared()
            .with_graph(|g, fx| g.add_child(parent.id(), child.id(), fx));
        assert_eq!(child.parents(), vec![parent.id()]);
        assert_eq!(child.parent_count(), 1);
        parent.set_status(ExecutionStatus::Complete);
    }

    #[test]
    fn test_registry_releases_device_on_drop() {
        let device = Arc::new(Device::simulated(Settings::default()).unwrap());
        let registry = EventsRegistry::for_device(device.clone());
        assert_eq!(Arc::strong_count(&device), 2);
        drop(registry);
        assert_eq!(Arc::strong_count(&device), 1);
    }
}
