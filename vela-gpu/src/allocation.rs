// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Graphics allocations.
//!
//! A `GraphicsAllocation` is a block of memory visible to both the host
//! (CPU address) and the device (GPU virtual address). Allocations are created
//! and destroyed only by a [`MemoryManager`](crate::memory_manager::MemoryManager);
//! the residency fields are written only by the command stream receiver.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use vela_common::{GpuAddress, TaskCount, NOT_RESIDENT, OBJECT_NOT_USED};

/// Shared handle to an allocation.
pub type AllocationRef = Arc<GraphicsAllocation>;

/// Stable identifier assigned by the memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(pub u32);

/// What an allocation is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationType {
    CommandBuffer,
    TagBuffer,
    Buffer,
    HostPtr,
    Scratch,
    DebugSurface,
}

/// Parameters for [`MemoryManager::allocate`](crate::memory_manager::MemoryManager::allocate).
#[derive(Debug, Clone, Copy)]
pub struct AllocationProperties {
    pub size: usize,
    /// Requested GPU VA alignment; `0` means page alignment.
    pub alignment: usize,
    pub allocation_type: AllocationType,
    /// Whether the allocation may be cached in the device L3.
    pub cacheable: bool,
    /// Host address the allocation mirrors, for host-pointer allocations.
    pub host_address: Option<u64>,
}

impl AllocationProperties {
    pub fn new(size: usize, allocation_type: AllocationType) -> Self {
        Self {
            size,
            alignment: 0,
            allocation_type,
            cacheable: true,
            host_address: None,
        }
    }

    /// Allocation wrapping caller-owned host memory at `address`.
    pub fn host_ptr(address: u64, size: usize) -> Self {
        Self {
            host_address: Some(address),
            // Misaligned host memory cannot be cached in L3.
            cacheable: address % vela_common::CACHE_LINE_SIZE as u64 == 0
                && size % vela_common::CACHE_LINE_SIZE == 0,
            ..Self::new(size, AllocationType::HostPtr)
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn uncacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// A memory block with a CPU and a GPU address plus residency bookkeeping.
pub struct GraphicsAllocation {
    id: AllocationId,
    allocation_type: AllocationType,
    gpu_address: GpuAddress,
    host_address: Option<u64>,
    size: usize,
    cacheable: bool,
    /// Submission that last required residency, or `NOT_RESIDENT`.
    residency_task_count: AtomicU32,
    /// Last submission that referenced the allocation, or `OBJECT_NOT_USED`.
    task_count: AtomicU32,
    memory: Mutex<Box<[u8]>>,
}

impl GraphicsAllocation {
    pub(crate) fn new(id: AllocationId, props: &AllocationProperties, gpu_address: GpuAddress) -> Self {
        Self {
            id,
            allocation_type: props.allocation_type,
            gpu_address,
            host_address: props.host_address,
            size: props.size,
            cacheable: props.cacheable,
            residency_task_count: AtomicU32::new(NOT_RESIDENT),
            task_count: AtomicU32::new(OBJECT_NOT_USED),
            memory: Mutex::new(vec![0u8; props.size].into_boxed_slice()),
        }
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn allocation_type(&self) -> AllocationType {
        self.allocation_type
    }

    pub fn gpu_address(&self) -> GpuAddress {
        self.gpu_address
    }

    /// GPU address one past the last byte.
    pub fn gpu_end(&self) -> GpuAddress {
        self.gpu_address + self.size as u64
    }

    /// Host-visible address: the wrapped host pointer, or the backing store.
    pub fn cpu_address(&self) -> u64 {
        match self.host_address {
            Some(address) => address,
            None => self.memory.lock().as_ptr() as u64,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    // ── Residency ────────────────────────────────────────────────────────

    pub fn residency_task_count(&self) -> TaskCount {
        self.residency_task_count.load(Ordering::Acquire)
    }

    pub fn set_residency_task_count(&self, task_count: TaskCount) {
        self.residency_task_count.store(task_count, Ordering::Release);
    }

    pub fn is_resident(&self) -> bool {
        self.residency_task_count() != NOT_RESIDENT
    }

    /// True when the allocation has to be pushed for residency again before
    /// submission `task_count` can use it.
    pub fn is_residency_task_count_below(&self, task_count: TaskCount) -> bool {
        !self.is_resident() || self.residency_task_count() < task_count
    }

    pub fn release_residency(&self) {
        self.set_residency_task_count(NOT_RESIDENT);
    }

    // ── Usage ────────────────────────────────────────────────────────────

    pub fn task_count(&self) -> TaskCount {
        self.task_count.load(Ordering::Acquire)
    }

    pub fn update_task_count(&self, task_count: TaskCount) {
        self.task_count.store(task_count, Ordering::Release);
    }

    /// Whether any submission has referenced this allocation.
    pub fn is_used(&self) -> bool {
        self.task_count() != OBJECT_NOT_USED
    }

    /// True once the device is done with every submission that used this
    /// allocation.
    pub fn is_idle(&self, completed_task_count: TaskCount) -> bool {
        !self.is_used() || self.task_count() <= completed_task_count
    }

    // ── Contents ─────────────────────────────────────────────────────────

    /// Copy `data` into the allocation at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) {
        let mut memory = self.memory.lock();
        assert!(
            offset + data.len() <= memory.len(),
            "allocation {}: write 0x{:X}+0x{:X} past end 0x{:X}",
            self.id.0,
            offset,
            data.len(),
            memory.len()
        );
        memory[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Copy bytes at `offset` into `dst`.
    pub fn read(&self, offset: usize, dst: &mut [u8]) {
        let memory = self.memory.lock();
        assert!(
            offset + dst.len() <= memory.len(),
            "allocation {}: read 0x{:X}+0x{:X} past end 0x{:X}",
            self.id.0,
            offset,
            dst.len(),
            memory.len()
        );
        dst.copy_from_slice(&memory[offset..offset + dst.len()]);
    }

    /// Little-endian dword at `offset`.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        self.read(offset, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Raise the dword at `offset` to at least `value`. Returns the previous
    /// contents.
    pub fn fetch_max_u32(&self, offset: usize, value: u32) -> u32 {
        let mut memory = self.memory.lock();
        assert!(
            offset + 4 <= memory.len(),
            "allocation {}: dword at 0x{:X} past end 0x{:X}",
            self.id.0,
            offset,
            memory.len()
        );
        let word = &mut memory[offset..offset + 4];
        let previous = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        if value > previous {
            word.copy_from_slice(&value.to_le_bytes());
        }
        previous
    }
}

impl std::fmt::Debug for GraphicsAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsAllocation")
            .field("id", &self.id.0)
            .field("type", &self.allocation_type)
            .field("gpu_address", &format_args!("0x{:X}", self.gpu_address))
            .field("size", &format_args!("0x{:X}", self.size))
            .field("residency_task_count", &self.residency_task_count())
            .field("task_count", &self.task_count())
            .finish()
    }
}
