// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command stream receiver.
//!
//! One receiver owns the submission pipeline of one device engine:
//!
//! - the active command buffer ([`LinearStream`]) and its recycling,
//! - the monotonic task counters (`task_count`, `latest_sent_task_count`,
//!   `latest_flushed_task_count`),
//! - residency bookkeeping for every allocation a submission touches,
//! - the completion tag the device writes, and busy-poll waits on it.
//!
//! Family specific encoding lives in [`crate::hw`]; this type holds the
//! state and logic every family shares.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use vela_common::{
    align_up_usize, DispatchMode, FlushStamp, Settings, TaskCount, CACHE_LINE_SIZE,
    CS_OVERFETCH_SIZE, PAGE_SIZE, TASK_COUNT_ANY,
};

use crate::allocation::{AllocationProperties, AllocationRef, AllocationType};
use crate::backend::GpuBackend;
use crate::linear_stream::LinearStream;
use crate::memory_manager::{AllocationUsage, SharedMemoryManager};
use crate::poll::{self, PollConfig, WaitToken};
use crate::tag::{TagAddress, INITIAL_TAG_VALUE};

// ---------------------------------------------------------------------------
// Submission types
// ---------------------------------------------------------------------------

bitflags! {
    /// Per-submission options passed to `flush_task`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubmissionFlags: u32 {
        /// The caller waits right after flushing; bypasses batching.
        const BLOCKING = 1 << 0;
        /// The batch's residency is made host-coherent once a wait sees it
        /// complete.
        const COHERENT = 1 << 1;
    }
}

/// One closed range of commands handed to the device.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    pub command_buffer: AllocationRef,
    pub start_offset: usize,
    pub used_size: usize,
    pub task_count: TaskCount,
    pub flags: SubmissionFlags,
}

impl BatchBuffer {
    /// GPU address of the first command.
    pub fn gpu_start(&self) -> u64 {
        self.command_buffer.gpu_address() + self.start_offset as u64
    }
}

/// Result of `flush_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStamp {
    pub task_count: TaskCount,
    pub flush_stamp: FlushStamp,
}

/// Profiling hook notified when a wait confirms a task count complete.
pub trait CompletionObserver: Send + Sync {
    fn task_count_completed(&self, task_count: TaskCount);
}

/// Counters of one engine, readable without holding the receiver.
#[derive(Debug)]
pub struct EngineStatus {
    tag: TagAddress,
    task_count: AtomicU32,
    latest_flushed_task_count: AtomicU32,
}

impl EngineStatus {
    pub fn new(tag: TagAddress) -> Self {
        Self {
            tag,
            task_count: AtomicU32::new(0),
            latest_flushed_task_count: AtomicU32::new(0),
        }
    }

    pub fn tag(&self) -> &TagAddress {
        &self.tag
    }

    /// Latest task count the device reported complete.
    pub fn completed_task_count(&self) -> TaskCount {
        self.tag.read()
    }

    /// Task count of the most recent `flush_task`.
    pub fn task_count(&self) -> TaskCount {
        self.task_count.load(Ordering::Acquire)
    }

    pub fn latest_flushed_task_count(&self) -> TaskCount {
        self.latest_flushed_task_count.load(Ordering::Acquire)
    }

    pub fn is_completed(&self, task_count: TaskCount) -> bool {
        self.tag.has_reached(task_count)
    }

    fn publish(&self, task_count: TaskCount, latest_flushed: TaskCount) {
        self.task_count.store(task_count, Ordering::Release);
        self.latest_flushed_task_count
            .store(latest_flushed, Ordering::Release);
    }
}

/// Everything a receiver needs at construction.
pub struct ReceiverParams {
    pub memory_manager: SharedMemoryManager,
    pub backend: Box<dyn GpuBackend>,
    pub settings: Settings,
    pub observer: Option<Arc<dyn CompletionObserver>>,
}

impl ReceiverParams {
    pub fn new(memory_manager: SharedMemoryManager, backend: Box<dyn GpuBackend>, settings: Settings) -> Self {
        Self {
            memory_manager,
            backend,
            settings,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

struct PendingBatch {
    batch: BatchBuffer,
    residency: Vec<AllocationRef>,
}

/// Residency of a `COHERENT` batch, kept until the batch completes.
struct CoherentBatch {
    task_count: TaskCount,
    residency: Vec<AllocationRef>,
}

// ---------------------------------------------------------------------------
// CommandStreamReceiver
// ---------------------------------------------------------------------------

/// Submission state shared by every hardware family.
pub struct CommandStreamReceiver {
    memory_manager: SharedMemoryManager,
    backend: Box<dyn GpuBackend>,
    observer: Option<Arc<dyn CompletionObserver>>,
    dispatch_mode: DispatchMode,
    poll: PollConfig,

    command_stream: LinearStream,
    /// Offset of the first command not yet closed by `flush_task`.
    batch_start: usize,
    pending: Vec<PendingBatch>,
    coherent: Vec<CoherentBatch>,

    task_count: TaskCount,
    latest_sent_task_count: TaskCount,
    latest_flushed_task_count: TaskCount,
    flush_stamp: FlushStamp,

    tag: Option<TagAddress>,
    status: Option<Arc<EngineStatus>>,

    total_memory_used: usize,
    residency_budget: usize,
    disable_l3_cache: bool,
    debug_surface: Option<AllocationRef>,
    scratch_allocation: Option<AllocationRef>,
    cleaned_up: bool,
}

impl CommandStreamReceiver {
    pub fn new(params: ReceiverParams) -> Self {
        Self {
            memory_manager: params.memory_manager,
            backend: params.backend,
            observer: params.observer,
            dispatch_mode: params.settings.dispatch_mode,
            poll: PollConfig::from_settings(&params.settings),
            command_stream: LinearStream::new(),
            batch_start: 0,
            pending: Vec::new(),
            coherent: Vec::new(),
            task_count: 0,
            latest_sent_task_count: 0,
            latest_flushed_task_count: 0,
            flush_stamp: 0,
            tag: None,
            status: None,
            total_memory_used: 0,
            residency_budget: params.settings.residency_budget,
            disable_l3_cache: false,
            debug_surface: None,
            scratch_allocation: None,
            cleaned_up: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn memory_manager(&self) -> &SharedMemoryManager {
        &self.memory_manager
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn task_count(&self) -> TaskCount {
        self.task_count
    }

    pub fn latest_sent_task_count(&self) -> TaskCount {
        self.latest_sent_task_count
    }

    pub fn latest_flushed_task_count(&self) -> TaskCount {
        self.latest_flushed_task_count
    }

    /// Bytes currently made resident through this receiver.
    pub fn total_memory_used(&self) -> usize {
        self.total_memory_used
    }

    /// Set once an allocation that cannot live in L3 was made resident.
    pub fn is_l3_cache_disabled(&self) -> bool {
        self.disable_l3_cache
    }

    pub fn tag_address(&self) -> Option<&TagAddress> {
        self.tag.as_ref()
    }

    pub fn status(&self) -> Option<&Arc<EngineStatus>> {
        self.status.as_ref()
    }

    /// Tag value, or the initial value when no tag is configured.
    pub fn completed_task_count(&self) -> TaskCount {
        self.tag.as_ref().map_or(INITIAL_TAG_VALUE, |tag| tag.read())
    }

    pub fn pending_batch_count(&self) -> usize {
        self.pending.len()
    }

    pub fn command_stream(&self) -> &LinearStream {
        &self.command_stream
    }

    pub fn debug_surface(&self) -> Option<&AllocationRef> {
        self.debug_surface.as_ref()
    }

    pub fn scratch_allocation(&self) -> Option<&AllocationRef> {
        self.scratch_allocation.as_ref()
    }

    // ── Tag ──────────────────────────────────────────────────────────────

    /// Allocate the tag buffer and bind the completion tag to it.
    pub fn initialize_tag_allocation(&mut self) -> bool {
        let allocation = self
            .memory_manager
            .lock()
            .allocate(AllocationProperties::new(PAGE_SIZE, AllocationType::TagBuffer));
        match allocation {
            Some(allocation) => {
                log::debug!("csr: tag allocation at gpu 0x{:X}", allocation.gpu_address());
                self.set_tag_address(TagAddress::new(allocation));
                true
            }
            None => {
                log::warn!("csr: failed to allocate the tag buffer");
                false
            }
        }
    }

    /// Bind an existing tag. The backend receives its write side.
    pub fn set_tag_address(&mut self, tag: TagAddress) {
        debug_assert!(self.tag.is_none(), "tag address configured twice");
        self.backend.bind_tag(tag.writer());
        let status = Arc::new(EngineStatus::new(tag.clone()));
        status.publish(self.task_count, self.latest_flushed_task_count);
        self.status = Some(status);
        self.tag = Some(tag);
    }

    // ── Command buffer ───────────────────────────────────────────────────

    /// Command stream with at least `min_required_size` writable bytes and
    /// room for the batch terminator. `None` if no buffer could be obtained.
    pub fn get_cs(&mut self, min_required_size: usize) -> Option<&mut LinearStream> {
        if self.command_stream.allocation().is_none()
            || self.command_stream.available_space() < min_required_size
        {
            if !self.replace_command_buffer(min_required_size) {
                return None;
            }
        }
        Some(&mut self.command_stream)
    }

    /// Switch to a buffer with room for `min_required_size` more bytes. Commands
    /// written since the last flush move to the new buffer; the old buffer goes
    /// to the reusable list.
    fn replace_command_buffer(&mut self, min_required_size: usize) -> bool {
        let open_len = if self.command_stream.used() > self.command_stream.capacity() {
            0
        } else {
            self.command_stream.used() - self.batch_start
        };
        let required = min_required_size + open_len;
        let usable = align_up_usize(required + CACHE_LINE_SIZE, PAGE_SIZE) - CACHE_LINE_SIZE;
        let allocation_size = usable + CACHE_LINE_SIZE + CS_OVERFETCH_SIZE;
        let completed = self.completed_task_count();

        let mut mm = self.memory_manager.lock();
        let allocation = match mm.obtain_reusable_allocation(allocation_size, completed) {
            Some(allocation) => allocation,
            None => match mm.allocate(AllocationProperties::new(
                allocation_size,
                AllocationType::CommandBuffer,
            )) {
                Some(allocation) => allocation,
                None => {
                    log::warn!(
                        "csr: cannot obtain a command buffer of 0x{:X} bytes",
                        allocation_size
                    );
                    return false;
                }
            },
        };

        let carried = if open_len > 0 {
            self.command_stream.copy_out(self.batch_start, open_len)
        } else {
            Vec::new()
        };
        if let Some(previous) = self.command_stream.take_allocation() {
            mm.store_allocation(previous, AllocationUsage::Reusable);
        }
        drop(mm);

        let capacity = allocation.size() - CACHE_LINE_SIZE - CS_OVERFETCH_SIZE;
        log::debug!(
            "csr: command buffer {} size=0x{:X} usable=0x{:X} (carried 0x{:X} bytes)",
            allocation.id().0,
            allocation.size(),
            capacity,
            carried.len()
        );
        self.command_stream
            .replace_buffer(allocation, capacity, CACHE_LINE_SIZE);
        self.batch_start = 0;
        if !carried.is_empty() {
            self.command_stream.emit(&carried);
        }
        true
    }

    // ── Residency ────────────────────────────────────────────────────────

    /// Pin `allocation` for the next submission.
    pub fn make_resident(&mut self, allocation: &AllocationRef) {
        let submission_task_count = self.task_count + 1;
        if allocation.is_residency_task_count_below(submission_task_count) {
            self.memory_manager
                .lock()
                .push_for_residency(allocation.clone());
            allocation.update_task_count(submission_task_count);
            if !allocation.is_resident() {
                self.total_memory_used += allocation.size();
            }
        }
        allocation.set_residency_task_count(submission_task_count);
        log::trace!(
            "csr: resident {} for task count {}",
            allocation.id().0,
            submission_task_count
        );
    }

    /// Unpin `allocation`, queueing it for eviction if it was resident.
    pub fn make_non_resident(&mut self, allocation: &AllocationRef) {
        if allocation.is_resident() {
            self.backend.make_coherent(allocation);
            let mut mm = self.memory_manager.lock();
            mm.push_for_eviction(allocation.clone());
            mm.remove_from_residency(allocation);
            self.total_memory_used = self.total_memory_used.saturating_sub(allocation.size());
        }
        allocation.release_residency();
        log::trace!("csr: non-resident {}", allocation.id().0);
    }

    /// Unpin every allocation of `surfaces`, or of the residency container when
    /// `None`, then process the eviction list. The consumed list is left empty.
    pub fn make_surface_pack_non_resident(&mut self, surfaces: Option<&mut Vec<AllocationRef>>) {
        let surfaces = match surfaces {
            Some(list) => std::mem::take(list),
            None => self.memory_manager.lock().take_residency_allocations(),
        };
        for surface in &surfaces {
            self.make_non_resident(surface);
        }
        self.process_eviction();
    }

    /// Hand the eviction list to the backend and clear it.
    pub fn process_eviction(&mut self) {
        let evictions = self.memory_manager.lock().eviction_allocations().to_vec();
        if !evictions.is_empty() {
            self.backend.evict(&evictions);
        }
        self.memory_manager.lock().clear_eviction_allocations();
    }

    /// Evict resident allocations the device is done with and no queued
    /// submission needs. The active command buffer and the tag stay resident.
    pub fn evict_completed_allocations(&mut self) -> usize {
        let completed = self.completed_task_count();
        let active_buffer = self.command_stream.allocation().cloned();
        let tag_buffer = self.tag.as_ref().and_then(|t| t.allocation()).cloned();
        let is_pinned = |a: &AllocationRef| {
            [&active_buffer, &tag_buffer]
                .into_iter()
                .flatten()
                .any(|p| Arc::ptr_eq(p, a))
        };

        let candidates: Vec<AllocationRef> = self
            .memory_manager
            .lock()
            .residency_allocations()
            .iter()
            .filter(|a| {
                a.residency_task_count() <= self.task_count && a.is_idle(completed) && !is_pinned(a)
            })
            .cloned()
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        log::debug!(
            "csr: evicting {} allocations completed at task count {}",
            candidates.len(),
            completed
        );
        for allocation in &candidates {
            self.make_non_resident(allocation);
        }
        self.process_eviction();
        candidates.len()
    }

    /// Make the residency of every completed `COHERENT` batch host-coherent.
    fn make_completed_batches_coherent(&mut self) {
        if self.coherent.is_empty() {
            return;
        }
        let completed = self.completed_task_count();
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.coherent)
            .into_iter()
            .partition(|c| c.task_count <= completed);
        self.coherent = waiting;
        for batch in &done {
            log::trace!("csr: making task count {} coherent", batch.task_count);
            for allocation in &batch.residency {
                self.backend.make_coherent(allocation);
            }
        }
    }

    /// Allocate `size` bytes for host memory at `address` and make it resident.
    /// With `add_to_deferred_delete_list` the allocation is freed once its
    /// submission completes. `None` when the memory manager is exhausted.
    pub fn create_allocation_and_handle_residency(
        &mut self,
        address: u64,
        size: usize,
        add_to_deferred_delete_list: bool,
    ) -> Option<AllocationRef> {
        let allocation = self
            .memory_manager
            .lock()
            .allocate(AllocationProperties::host_ptr(address, size));
        let Some(allocation) = allocation else {
            log::warn!(
                "csr: host allocation of 0x{:X} bytes at 0x{:X} failed",
                size,
                address
            );
            return None;
        };

        self.make_resident(&allocation);
        if add_to_deferred_delete_list {
            self.memory_manager
                .lock()
                .store_allocation(allocation.clone(), AllocationUsage::Temporary);
        }
        if !allocation.is_cacheable() {
            self.disable_l3_cache = true;
        }
        Some(allocation)
    }

    // ── Auxiliary surfaces ───────────────────────────────────────────────

    /// Debug surface, allocated on first use.
    pub fn allocate_debug_surface(&mut self, size: usize) -> Option<AllocationRef> {
        if let Some(surface) = &self.debug_surface {
            return Some(surface.clone());
        }
        let surface = self
            .memory_manager
            .lock()
            .allocate(AllocationProperties::new(size, AllocationType::DebugSurface))?;
        self.debug_surface = Some(surface.clone());
        Some(surface)
    }

    /// Scratch buffer of at least `required_size` bytes. A smaller previous
    /// buffer is released once its last submission completes.
    pub fn ensure_scratch_space(&mut self, required_size: usize) -> Option<AllocationRef> {
        match &self.scratch_allocation {
            Some(scratch) if scratch.size() >= required_size => return Some(scratch.clone()),
            _ => {}
        }
        let mut mm = self.memory_manager.lock();
        let scratch = mm.allocate(AllocationProperties::new(required_size, AllocationType::Scratch))?;
        if let Some(previous) = self.scratch_allocation.replace(scratch.clone()) {
            mm.store_allocation(previous, AllocationUsage::Temporary);
        }
        Some(scratch)
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Close the commands written since the last flush with `terminator` and
    /// submit them (or queue them in batched mode).
    pub(crate) fn flush_task_with(
        &mut self,
        terminator: impl FnOnce(usize) -> Vec<u8>,
        flags: SubmissionFlags,
    ) -> Option<CompletionStamp> {
        let Some(tag) = self.tag.clone() else {
            panic!("flush_task called before a tag address was configured");
        };
        if self.command_stream.allocation().is_none()
            || self.command_stream.used() > self.command_stream.capacity()
        {
            if !self.replace_command_buffer(0) {
                return None;
            }
        }

        let end = terminator(self.command_stream.used());
        self.command_stream.emit_terminator(&end);
        let command_buffer = self.command_stream.allocation()?.clone();

        self.make_resident(&command_buffer);
        if let Some(tag_buffer) = tag.allocation() {
            self.make_resident(tag_buffer);
        }

        if self.residency_budget != 0 && self.total_memory_used > self.residency_budget {
            log::debug!(
                "csr: 0x{:X} resident bytes over budget 0x{:X}",
                self.total_memory_used,
                self.residency_budget
            );
            self.evict_completed_allocations();
        }

        let task_count = self.task_count + 1;
        let batch = BatchBuffer {
            command_buffer,
            start_offset: self.batch_start,
            used_size: self.command_stream.used() - self.batch_start,
            task_count,
            flags,
        };
        let residency = self.memory_manager.lock().residency_allocations().to_vec();
        log::debug!(
            "csr: flush task count {} ({} bytes, {} resident)",
            task_count,
            batch.used_size,
            residency.len()
        );

        self.batch_start = self.command_stream.used();
        self.latest_sent_task_count = task_count;
        self.task_count = task_count;
        if flags.contains(SubmissionFlags::COHERENT) {
            self.coherent.push(CoherentBatch {
                task_count,
                residency: residency.clone(),
            });
        }
        self.pending.push(PendingBatch { batch, residency });

        if self.dispatch_mode == DispatchMode::Immediate || flags.contains(SubmissionFlags::BLOCKING) {
            self.flush_batched_submissions();
        } else {
            self.publish_status();
        }

        Some(CompletionStamp {
            task_count,
            flush_stamp: self.flush_stamp,
        })
    }

    /// Submit queued batches in order. Returns false if the backend rejected
    /// one; it and every later batch stay queued.
    pub fn flush_batched_submissions(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        log::debug!("csr: submitting {} queued batches", self.pending.len());

        let mut queue = std::mem::take(&mut self.pending).into_iter();
        let mut ok = true;
        while let Some(entry) = queue.next() {
            if !self.backend.submit(&entry.batch, &entry.residency) {
                log::warn!(
                    "csr: backend '{}' rejected task count {}",
                    self.backend.name(),
                    entry.batch.task_count
                );
                self.pending.push(entry);
                self.pending.extend(queue);
                ok = false;
                break;
            }
            self.flush_stamp += 1;
            self.latest_flushed_task_count = entry.batch.task_count;
        }
        self.publish_status();
        ok
    }

    fn publish_status(&self) {
        if let Some(status) = &self.status {
            status.publish(self.task_count, self.latest_flushed_task_count);
        }
    }

    // ── Waiting ──────────────────────────────────────────────────────────

    /// Wait for `task_count_to_wait`, bounded by `timeout_us` when
    /// `enable_timeout` is set. Returns whether the device reached it.
    pub fn wait_for_completion_with_timeout(
        &mut self,
        enable_timeout: bool,
        timeout_us: i64,
        task_count_to_wait: TaskCount,
    ) -> bool {
        self.wait_for_completion_with_token(enable_timeout, timeout_us, task_count_to_wait, None)
    }

    /// `wait_for_completion_with_timeout` that `token` can cancel or bound.
    /// A successful wait also retires what the device finished with: the
    /// residency of completed `COHERENT` batches is made coherent and
    /// completed allocations are evicted.
    pub fn wait_for_completion_with_token(
        &mut self,
        enable_timeout: bool,
        timeout_us: i64,
        task_count_to_wait: TaskCount,
        token: Option<&WaitToken>,
    ) -> bool {
        if self.latest_flushed_task_count < task_count_to_wait {
            self.flush_batched_submissions();
        }
        let Some(tag) = self.tag.clone() else {
            panic!("wait_for_completion_with_timeout called without a tag address");
        };

        let timeout = enable_timeout.then(|| Duration::from_micros(timeout_us.max(0) as u64));
        let ready = poll::wait_for_task_count(&tag, task_count_to_wait, timeout, &self.poll, token);
        if ready {
            if let Some(observer) = &self.observer {
                observer.task_count_completed(task_count_to_wait);
            }
            self.make_completed_batches_coherent();
            self.evict_completed_allocations();
        } else {
            log::warn!(
                "csr: wait for task count {} gave up at tag {}",
                task_count_to_wait,
                tag.read()
            );
        }
        ready
    }

    /// Wait until the device passes `required_task_count`, then reclaim the
    /// entries of `usage` it is done with.
    pub fn wait_for_task_count_and_clean_allocation_list(
        &mut self,
        required_task_count: TaskCount,
        usage: AllocationUsage,
    ) {
        if required_task_count != TASK_COUNT_ANY {
            if self.latest_flushed_task_count < required_task_count {
                self.flush_batched_submissions();
            }
            if let Some(tag) = &self.tag {
                poll::wait_for_task_count(tag, required_task_count, None, &self.poll, None);
            }
        }
        self.memory_manager
            .lock()
            .clean_allocation_list(required_task_count, usage);
    }

    // ── Teardown ─────────────────────────────────────────────────────────

    /// Drain deferred lists up to the last flushed submission and release
    /// every allocation the receiver owns. Runs once.
    pub fn cleanup_resources(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        if !self.pending.is_empty() {
            log::warn!(
                "csr: dropping {} batches that were never submitted",
                self.pending.len()
            );
            self.pending.clear();
        }

        let flushed = self.latest_flushed_task_count;
        self.wait_for_task_count_and_clean_allocation_list(flushed, AllocationUsage::Temporary);
        self.wait_for_task_count_and_clean_allocation_list(flushed, AllocationUsage::Reusable);
        self.make_completed_batches_coherent();
        self.coherent.clear();

        let mut mm = self.memory_manager.lock();
        for allocation in [
            self.debug_surface.take(),
            self.scratch_allocation.take(),
            self.command_stream.take_allocation(),
            self.tag.take().and_then(|tag| tag.allocation().cloned()),
        ]
        .into_iter()
        .flatten()
        {
            mm.free(&allocation);
        }
        log::debug!("csr: resources released at task count {}", flushed);
    }
}

impl Drop for CommandStreamReceiver {
    fn drop(&mut self) {
        self.cleanup_resources();
        let mut mm = self.memory_manager.lock();
        mm.clean_allocation_list(TASK_COUNT_ANY, AllocationUsage::Temporary);
        mm.clean_allocation_list(TASK_COUNT_ANY, AllocationUsage::Reusable);
    }
}
