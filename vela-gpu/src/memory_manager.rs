// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Graphics memory manager.
//!
//! Owns every [`GraphicsAllocation`] and the lists the command stream
//! receiver works with:
//!
//! - the residency container (allocations pinned for the next submission),
//! - the eviction list (allocations to unpin on the next eviction pass),
//! - the temporary list (freed once their last submission completes),
//! - the reusable list (command buffers waiting to be recycled).
//!
//! The manager performs no locking of its own. It is shared as a
//! [`SharedMemoryManager`] and callers serialize access per device.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use vela_common::{GpuAddress, TaskCount};

use crate::address_space::GpuAddressSpace;
use crate::allocation::{AllocationId, AllocationProperties, AllocationRef, GraphicsAllocation};

/// Memory manager shared between a device and its receivers.
pub type SharedMemoryManager = Arc<Mutex<dyn MemoryManager>>;

/// Which deferred-release list an allocation is stored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationUsage {
    /// Freed once the device passes its task count.
    Temporary,
    /// Kept for reuse as a command buffer once the device passes its task count.
    Reusable,
}

/// Allocation and residency-list operations consumed by the command stream receiver.
pub trait MemoryManager: Send {
    /// Allocate a new block. Returns `None` when memory is exhausted.
    fn allocate(&mut self, props: AllocationProperties) -> Option<AllocationRef>;

    /// Release an allocation and drop it from every list.
    fn free(&mut self, allocation: &AllocationRef);

    /// Add to the residency container. Pushing an allocation twice is a no-op.
    fn push_for_residency(&mut self, allocation: AllocationRef);

    /// Drop a single allocation from the residency container.
    fn remove_from_residency(&mut self, allocation: &AllocationRef);

    fn residency_allocations(&self) -> &[AllocationRef];

    /// Empty the residency container, returning its contents.
    fn take_residency_allocations(&mut self) -> Vec<AllocationRef>;

    fn clear_residency_allocations(&mut self);

    fn push_for_eviction(&mut self, allocation: AllocationRef);

    fn eviction_allocations(&self) -> &[AllocationRef];

    fn clear_eviction_allocations(&mut self);

    /// Take a reusable allocation of at least `min_size` bytes that the device
    /// no longer uses at `completed_task_count`.
    fn obtain_reusable_allocation(
        &mut self,
        min_size: usize,
        completed_task_count: TaskCount,
    ) -> Option<AllocationRef>;

    fn store_allocation(&mut self, allocation: AllocationRef, usage: AllocationUsage);

    fn allocation_list(&self, usage: AllocationUsage) -> &[AllocationRef];

    /// Free every entry of `usage` whose task count is at most `completed_task_count`.
    fn clean_allocation_list(&mut self, completed_task_count: TaskCount, usage: AllocationUsage);

    /// Find the allocation and offset backing `gpu_va`.
    fn resolve(&self, gpu_va: GpuAddress) -> Option<ResolvedAddress>;
}

/// Result of resolving a GPU virtual address.
#[derive(Debug, Clone)]
pub struct ResolvedAddress {
    pub allocation: AllocationRef,
    pub offset: usize,
}

/// Memory manager backed by host memory with a simulated GPU VA space.
pub struct HostMemoryManager {
    address_space: GpuAddressSpace,
    live: HashMap<AllocationId, AllocationRef>,
    next_id: u32,
    /// Optional cap on live bytes, for exercising allocation failure.
    budget: Option<usize>,
    allocated_bytes: usize,
    residency: Vec<AllocationRef>,
    eviction: Vec<AllocationRef>,
    temporary: Vec<AllocationRef>,
    reusable: Vec<AllocationRef>,
}

impl HostMemoryManager {
    pub fn new() -> Self {
        Self {
            address_space: GpuAddressSpace::new(),
            live: HashMap::new(),
            next_id: 1,
            budget: None,
            allocated_bytes: 0,
            residency: Vec::new(),
            eviction: Vec::new(),
            temporary: Vec::new(),
            reusable: Vec::new(),
        }
    }

    /// Manager that fails allocations once `budget` live bytes are reached.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Wrap into the shared handle used by devices and receivers.
    pub fn into_shared(self) -> SharedMemoryManager {
        Arc::new(Mutex::new(self))
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    fn list_mut(&mut self, usage: AllocationUsage) -> &mut Vec<AllocationRef> {
        match usage {
            AllocationUsage::Temporary => &mut self.temporary,
            AllocationUsage::Reusable => &mut self.reusable,
        }
    }
}

impl Default for HostMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for HostMemoryManager {
    fn allocate(&mut self, props: AllocationProperties) -> Option<AllocationRef> {
        if let Some(budget) = self.budget {
            if self.allocated_bytes + props.size > budget {
                log::warn!(
                    "memory_manager: allocation of 0x{:X} bytes exceeds budget 0x{:X} (0x{:X} in use)",
                    props.size,
                    budget,
                    self.allocated_bytes
                );
                return None;
            }
        }

        let id = AllocationId(self.next_id);
        let gpu_address =
            self.address_space
                .allocate(id, props.size as u64, props.alignment as u64)?;
        self.next_id += 1;

        let allocation = Arc::new(GraphicsAllocation::new(id, &props, gpu_address));
        self.allocated_bytes += props.size;
        self.live.insert(id, allocation.clone());
        log::trace!(
            "memory_manager: allocated {} {:?} size=0x{:X} gpu=0x{:X}",
            id.0,
            props.allocation_type,
            props.size,
            gpu_address
        );
        Some(allocation)
    }

    fn free(&mut self, allocation: &AllocationRef) {
        if self.live.remove(&allocation.id()).is_none() {
            log::warn!("memory_manager: double free of allocation {}", allocation.id().0);
            return;
        }
        self.address_space
            .unmap(allocation.gpu_address(), allocation.size() as u64);
        self.allocated_bytes -= allocation.size();
        for list in [
            &mut self.residency,
            &mut self.eviction,
            &mut self.temporary,
            &mut self.reusable,
        ] {
            list.retain(|a| !Arc::ptr_eq(a, allocation));
        }
        log::trace!("memory_manager: freed {}", allocation.id().0);
    }

    fn push_for_residency(&mut self, allocation: AllocationRef) {
        if !self.residency.iter().any(|a| Arc::ptr_eq(a, &allocation)) {
            self.residency.push(allocation);
        }
    }

    fn remove_from_residency(&mut self, allocation: &AllocationRef) {
        self.residency.retain(|a| !Arc::ptr_eq(a, allocation));
    }

    fn residency_allocations(&self) -> &[AllocationRef] {
        &self.residency
    }

    fn take_residency_allocations(&mut self) -> Vec<AllocationRef> {
        std::mem::take(&mut self.residency)
    }

    fn clear_residency_allocations(&mut self) {
        self.residency.clear();
    }

    fn push_for_eviction(&mut self, allocation: AllocationRef) {
        self.eviction.push(allocation);
    }

    fn eviction_allocations(&self) -> &[AllocationRef] {
        &self.eviction
    }

    fn clear_eviction_allocations(&mut self) {
        self.eviction.clear();
    }

    fn obtain_reusable_allocation(
        &mut self,
        min_size: usize,
        completed_task_count: TaskCount,
    ) -> Option<AllocationRef> {
        let index = self
            .reusable
            .iter()
            .position(|a| a.size() >= min_size && a.is_idle(completed_task_count))?;
        let allocation = self.reusable.remove(index);
        log::trace!(
            "memory_manager: reusing allocation {} (size=0x{:X})",
            allocation.id().0,
            allocation.size()
        );
        Some(allocation)
    }

    fn store_allocation(&mut self, allocation: AllocationRef, usage: AllocationUsage) {
        self.list_mut(usage).push(allocation);
    }

    fn allocation_list(&self, usage: AllocationUsage) -> &[AllocationRef] {
        match usage {
            AllocationUsage::Temporary => &self.temporary,
            AllocationUsage::Reusable => &self.reusable,
        }
    }

    fn clean_allocation_list(&mut self, completed_task_count: TaskCount, usage: AllocationUsage) {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(self.list_mut(usage))
            .into_iter()
            .partition(|a| a.is_idle(completed_task_count));
        *self.list_mut(usage) = pending;
        if !done.is_empty() {
            log::debug!(
                "memory_manager: cleaning {} {:?} allocations up to task count {}",
                done.len(),
                usage,
                completed_task_count
            );
        }
        for allocation in &done {
            self.free(allocation);
        }
    }

    fn resolve(&self, gpu_va: GpuAddress) -> Option<ResolvedAddress> {
        let id = self.address_space.translate(gpu_va)?;
        let allocation = self.live.get(&id)?;
        let offset = gpu_va.checked_sub(allocation.gpu_address())? as usize;
        if offset >= allocation.size() {
            return None;
        }
        Some(ResolvedAddress {
            allocation: allocation.clone(),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationType;
    use vela_common::TASK_COUNT_ANY;

    fn alloc(mm: &mut HostMemoryManager, size: usize) -> AllocationRef {
        mm.allocate(AllocationProperties::new(size, AllocationType::Buffer))
            .unwrap()
    }

    #[test]
    fn test_allocate_and_free() {
        let mut mm = HostMemoryManager::new();
        let a = alloc(&mut mm, 0x1000);
        let b = alloc(&mut mm, 0x800);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.gpu_address(), b.gpu_address());
        assert_eq!(mm.allocated_bytes(), 0x1800);

        mm.free(&a);
        assert_eq!(mm.live_allocations(), 1);
        assert_eq!(mm.allocated_bytes(), 0x800);
        assert!(mm.resolve(a.gpu_address()).is_none());
    }

    #[test]
    fn test_budget_exhaustion_returns_none() {
        let mut mm = HostMemoryManager::with_budget(0x2000);
        assert!(mm
            .allocate(AllocationProperties::new(0x2000, AllocationType::Buffer))
            .is_some());
        assert!(mm
            .allocate(AllocationProperties::new(0x10, AllocationType::Buffer))
            .is_none());
    }

    #[test]
    fn test_resolve_gpu_address() {
        let mut mm = HostMemoryManager::new();
        let a = alloc(&mut mm, 0x2000);
        let resolved = mm.resolve(a.gpu_address() + 0x1234).unwrap();
        assert!(Arc::ptr_eq(&resolved.allocation, &a));
        assert_eq!(resolved.offset, 0x1234);
        // Inside the mapped page but past the allocation's size.
        let small = alloc(&mut mm, 0x10);
        assert!(mm.resolve(small.gpu_address() + 0x20).is_none());
    }

    #[test]
    fn test_residency_container_is_a_set() {
        let mut mm = HostMemoryManager::new();
        let a = alloc(&mut mm, 0x100);
        mm.push_for_residency(a.clone());
        mm.push_for_residency(a.clone());
        assert_eq!(mm.residency_allocations().len(), 1);
        mm.remove_from_residency(&a);
        assert!(mm.residency_allocations().is_empty());
    }

    #[test]
    fn test_obtain_reusable_respects_size_and_completion() {
        let mut mm = HostMemoryManager::new();
        let small = alloc(&mut mm, 0x1000);
        let busy = alloc(&mut mm, 0x4000);
        let idle = alloc(&mut mm, 0x4000);
        busy.update_task_count(10);
        idle.update_task_count(3);
        mm.store_allocation(small, AllocationUsage::Reusable);
        mm.store_allocation(busy, AllocationUsage::Reusable);
        mm.store_allocation(idle.clone(), AllocationUsage::Reusable);

        let got = mm.obtain_reusable_allocation(0x2000, 5).unwrap();
        assert!(Arc::ptr_eq(&got, &idle));
        assert!(mm.obtain_reusable_allocation(0x2000, 5).is_none());
        assert_eq!(mm.allocation_list(AllocationUsage::Reusable).len(), 2);
    }

    #[test]
    fn test_clean_allocation_list() {
        let mut mm = HostMemoryManager::new();
        let done = alloc(&mut mm, 0x100);
        let pending = alloc(&mut mm, 0x100);
        done.update_task_count(2);
        pending.update_task_count(7);
        mm.store_allocation(done, AllocationUsage::Temporary);
        mm.store_allocation(pending, AllocationUsage::Temporary);

        mm.clean_allocation_list(5, AllocationUsage::Temporary);
        assert_eq!(mm.allocation_list(AllocationUsage::Temporary).len(), 1);
        assert_eq!(mm.live_allocations(), 1);

        mm.clean_allocation_list(TASK_COUNT_ANY, AllocationUsage::Temporary);
        assert!(mm.allocation_list(AllocationUsage::Temporary).is_empty());
        assert_eq!(mm.live_allocations(), 0);
    }

    #[test]
    fn test_free_drops_list_membership() {
        let mut mm = HostMemoryManager::new();
        let a = alloc(&mut mm, 0x100);
        mm.push_for_residency(a.clone());
        mm.push_for_eviction(a.clone());
        mm.free(&a);
        assert!(mm.residency_allocations().is_empty());
        assert!(mm.eviction_allocations().is_empty());
    }
}
