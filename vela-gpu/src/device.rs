// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device context.
//!
//! Owns the memory manager and the engine's submission receiver. The
//! receiver sits behind a mutex so any thread can submit; the engine's
//! counters are also published through an [`EngineStatus`] that events read
//! without taking that lock.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use vela_common::{HwFamily, RuntimeError, RuntimeResult, Settings, PAGE_SIZE};

use crate::allocation::AllocationRef;
use crate::backend::{GpuBackend, SimulatedBackend};
use crate::command_stream_receiver::{
    CompletionObserver, CompletionStamp, EngineStatus, ReceiverParams, SubmissionFlags,
};
use crate::hw::SubmissionEngine;
use crate::memory_manager::{HostMemoryManager, SharedMemoryManager};
use crate::registry::ReceiverRegistry;

/// One GPU device with a single engine.
pub struct Device {
    settings: Settings,
    memory_manager: SharedMemoryManager,
    engine: Mutex<Box<dyn SubmissionEngine>>,
    status: Arc<EngineStatus>,
}

impl Device {
    /// Create the receiver for `settings.hw_family` and initialize its tag.
    pub fn new(
        registry: &ReceiverRegistry,
        settings: Settings,
        memory_manager: SharedMemoryManager,
        backend: Box<dyn GpuBackend>,
    ) -> RuntimeResult<Self> {
        Self::with_observer(registry, settings, memory_manager, backend, None)
    }

    /// `new`, with a profiling hook notified of confirmed completions.
    pub fn with_observer(
        registry: &ReceiverRegistry,
        settings: Settings,
        memory_manager: SharedMemoryManager,
        backend: Box<dyn GpuBackend>,
        observer: Option<Arc<dyn CompletionObserver>>,
    ) -> RuntimeResult<Self> {
        let mut params = ReceiverParams::new(memory_manager.clone(), backend, settings.clone());
        params.observer = observer;
        let mut engine = registry.create(settings.hw_family, params)?;

        if !engine.receiver_mut().initialize_tag_allocation() {
            return Err(RuntimeError::OutOfMemory { size: PAGE_SIZE });
        }
        let status = match engine.receiver().status() {
            Some(status) => status.clone(),
            None => return Err(RuntimeError::OutOfMemory { size: PAGE_SIZE }),
        };

        log::info!(
            "Device: {} engine on '{}' backend, {:?} dispatch",
            settings.hw_family,
            engine.receiver().backend_name(),
            settings.dispatch_mode
        );
        Ok(Self {
            settings,
            memory_manager,
            engine: Mutex::new(engine),
            status,
        })
    }

    /// Device backed by host memory and the simulated backend.
    pub fn simulated(settings: Settings) -> RuntimeResult<Self> {
        let memory_manager = HostMemoryManager::new().into_shared();
        let backend = Box::new(SimulatedBackend::new(memory_manager.clone()));
        Self::new(
            &ReceiverRegistry::with_default_families(),
            settings,
            memory_manager,
            backend,
        )
    }

    pub fn family(&self) -> HwFamily {
        self.settings.hw_family
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn memory_manager(&self) -> &SharedMemoryManager {
        &self.memory_manager
    }

    /// Counters of the engine, shared with events.
    pub fn engine_status(&self) -> &Arc<EngineStatus> {
        &self.status
    }

    /// Exclusive access to the engine's receiver.
    pub fn engine(&self) -> MutexGuard<'_, Box<dyn SubmissionEngine>> {
        self.engine.lock()
    }

    /// Make `surfaces` resident, append `commands` and flush them as one task.
    /// `None` when no command buffer could be obtained.
    pub fn submit(
        &self,
        surfaces: &[AllocationRef],
        commands: &[u8],
        flags: SubmissionFlags,
    ) -> Option<CompletionStamp> {
        let mut engine = self.engine.lock();
        for surface in surfaces {
            engine.make_resident(surface);
        }
        engine.get_cs(commands.len())?.emit(commands);
        engine.flush_task(flags)
    }

    /// Submit every queued batch.
    pub fn flush(&self) -> bool {
        self.engine.lock().receiver_mut().flush_batched_submissions()
    }

    /// Wait for everything submitted so far, using the configured timeout.
    pub fn finish(&self) -> bool {
        let mut engine = self.engine.lock();
        let task_count = engine.receiver().task_count();
        engine.wait_for_completion_with_timeout(
            self.settings.enable_timeout,
            self.settings.wait_timeout_us,
            task_count,
        )
    }
}
