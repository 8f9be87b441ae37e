// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GPU virtual address space.
//!
//! Hands out GPU virtual addresses (40-bit, 1 TiB) from a bump allocator and
//! records which allocation backs each 4 KB page in a 2-level page table.
//!
//! Layout: `[L0: 14 bits][L1: 14 bits][Offset: 12 bits]` = 40 bits total.

use vela_common::{align_up, GpuAddress, PAGE_SHIFT, PAGE_SIZE_U64};

use crate::allocation::AllocationId;

const L1_BITS: u32 = 14;
const L0_BITS: u32 = 14;
const L1_SIZE: usize = 1 << L1_BITS; // 16384 entries per L1 table

/// Sentinel for unmapped pages.
const INVALID_ENTRY: u64 = u64::MAX;

/// Total GPU address space: 40 bits = 1 TiB.
pub const GPU_VA_BITS: u32 = L0_BITS + L1_BITS + PAGE_SHIFT;
pub const GPU_VA_SIZE: u64 = 1 << GPU_VA_BITS;

/// First address handed out; keeps the zero page region unused.
const GPU_VA_BASE: GpuAddress = 0x0400_0000;

/// GPU virtual address space with a 2-level page table of allocation ids.
pub struct GpuAddressSpace {
    /// L0 table: each entry is an optional L1 page table.
    page_table: Vec<Option<Box<[u64; L1_SIZE]>>>,
    /// Next free GPU VA for bump allocation.
    next_alloc: GpuAddress,
}

impl GpuAddressSpace {
    pub fn new() -> Self {
        let l0_size = 1 << L0_BITS;
        let mut page_table = Vec::with_capacity(l0_size);
        for _ in 0..l0_size {
            page_table.push(None);
        }
        Self {
            page_table,
            next_alloc: GPU_VA_BASE,
        }
    }

    /// Reserve `size` bytes of GPU VA at `alignment` (at least a page) and map
    /// them to `id`. Returns `None` once the address space is exhausted.
    pub fn allocate(&mut self, id: AllocationId, size: u64, alignment: u64) -> Option<GpuAddress> {
        let alignment = alignment.max(PAGE_SIZE_U64).next_power_of_two();
        let aligned_size = align_up(size.max(1), PAGE_SIZE_U64);
        let gpu_va = align_up(self.next_alloc, alignment);
        if gpu_va.checked_add(aligned_size)? > GPU_VA_SIZE {
            log::warn!("gpu_va: address space exhausted (requested 0x{:X})", aligned_size);
            return None;
        }
        self.next_alloc = gpu_va + aligned_size;
        self.map(gpu_va, aligned_size, id);
        Some(gpu_va)
    }

    /// Map a contiguous range of GPU VA to an allocation.
    pub fn map(&mut self, gpu_va: GpuAddress, size: u64, id: AllocationId) {
        let mut offset = 0u64;
        while offset < size {
            self.set_entry(gpu_va + offset, u64::from(id.0));
            offset += PAGE_SIZE_U64;
        }
        log::trace!(
            "gpu_va: map 0x{:X}..0x{:X} -> allocation {}",
            gpu_va,
            gpu_va + size,
            id.0
        );
    }

    /// Unmap a contiguous GPU VA range.
    pub fn unmap(&mut self, gpu_va: GpuAddress, size: u64) {
        let size = align_up(size.max(1), PAGE_SIZE_U64);
        let mut offset = 0u64;
        while offset < size {
            self.set_entry(gpu_va + offset, INVALID_ENTRY);
            offset += PAGE_SIZE_U64;
        }
        log::trace!("gpu_va: unmap 0x{:X}..0x{:X}", gpu_va, gpu_va + size);
    }

    /// Allocation backing the page that contains `gpu_va`.
    pub fn translate(&self, gpu_va: GpuAddress) -> Option<AllocationId> {
        if gpu_va >= GPU_VA_SIZE {
            return None;
        }
        match self.get_entry(gpu_va) {
            INVALID_ENTRY => None,
            entry => Some(AllocationId(entry as u32)),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn l0_index(gpu_va: u64) -> usize {
        ((gpu_va >> (L1_BITS + PAGE_SHIFT)) & ((1 << L0_BITS) - 1)) as usize
    }

    fn l1_index(gpu_va: u64) -> usize {
        ((gpu_va >> PAGE_SHIFT) & ((1 << L1_BITS) - 1)) as usize
    }

    fn set_entry(&mut self, gpu_va: u64, entry: u64) {
        let l0 = Self::l0_index(gpu_va);
        let l1 = Self::l1_index(gpu_va);

        let table = match &mut self.page_table[l0] {
            Some(table) => table,
            // No L1 table and we're unmapping: nothing to do.
            None if entry == INVALID_ENTRY => return,
            slot => slot.insert(Box::new([INVALID_ENTRY; L1_SIZE])),
        };
        table[l1] = entry;
    }

    fn get_entry(&self, gpu_va: u64) -> u64 {
        let l0 = Self::l0_index(gpu_va);
        let l1 = Self::l1_index(gpu_va);

        match &self.page_table[l0] {
            Some(table) => table[l1],
            None => INVALID_ENTRY,
        }
    }
}

impl Default for GpuAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_translate() {
        let mut space = GpuAddressSpace::new();
        let va = space.allocate(AllocationId(7), 0x2000, 0).unwrap();
        assert_eq!(va, GPU_VA_BASE);
        assert_eq!(space.translate(va), Some(AllocationId(7)));
        assert_eq!(space.translate(va + 0x1FFF), Some(AllocationId(7)));
        assert_eq!(space.translate(va + 0x2000), None);
    }

    #[test]
    fn test_bump_allocation_is_page_granular() {
        let mut space = GpuAddressSpace::new();
        let va1 = space.allocate(AllocationId(1), 0x10, 0).unwrap();
        let va2 = space.allocate(AllocationId(2), 0x1000, 0).unwrap();
        assert_eq!(va2, va1 + 0x1000);
    }

    #[test]
    fn test_alignment_is_honoured() {
        let mut space = GpuAddressSpace::new();
        space.allocate(AllocationId(1), 0x1000, 0).unwrap();
        let va = space.allocate(AllocationId(2), 0x1000, 0x10_0000).unwrap();
        assert_eq!(va % 0x10_0000, 0);
    }

    #[test]
    fn test_unmap() {
        let mut space = GpuAddressSpace::new();
        let va = space.allocate(AllocationId(3), 0x1000, 0).unwrap();
        space.unmap(va, 0x1000);
        assert_eq!(space.translate(va), None);
    }

    #[test]
    fn test_unmapped_and_out_of_range() {
        let space = GpuAddressSpace::new();
        assert_eq!(space.translate(0), None);
        assert_eq!(space.translate(GPU_VA_SIZE + 0x1000), None);
    }
}
