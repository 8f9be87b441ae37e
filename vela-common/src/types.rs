// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Submission index assigned by a command stream receiver (monotonic per engine).
pub type TaskCount = u32;

/// GPU virtual address.
pub type GpuAddress = u64;

/// Identifier of one backend flush, used by profiling consumers.
pub type FlushStamp = u64;

/// Page size (4 KiB).
pub const PAGE_SIZE: usize = 0x1000;

/// Page size as u64 for address math.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Page shift (log2 of PAGE_SIZE).
pub const PAGE_SHIFT: u32 = 12;

/// Page mask for alignment checks.
pub const PAGE_MASK: u64 = PAGE_SIZE_U64 - 1;

/// Device cache line size.
pub const CACHE_LINE_SIZE: usize = 64;

/// Bytes the command streamer may prefetch past the end of a batch.
pub const CS_OVERFETCH_SIZE: usize = PAGE_SIZE;

/// `residency_task_count` of an allocation that is not resident.
pub const NOT_RESIDENT: TaskCount = u32::MAX;

/// `task_count` of an allocation no submission has referenced yet.
pub const OBJECT_NOT_USED: TaskCount = u32::MAX;

/// Task level / task count of an event that is not orderable yet.
pub const TASK_COUNT_NOT_READY: TaskCount = 0xFFFF_FFF0;

/// "Don't care" task count: skips waiting, and cleaning with it reclaims everything.
pub const TASK_COUNT_ANY: TaskCount = u32::MAX;

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    value & !(alignment - 1)
}

/// `align_up` for buffer sizes.
#[inline]
pub const fn align_up_usize(value: usize, alignment: usize) -> usize {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Check if a value is page-aligned.
#[inline]
pub const fn is_page_aligned(value: u64) -> bool {
    value & PAGE_MASK == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, PAGE_SIZE_U64), 0);
        assert_eq!(align_up(1, PAGE_SIZE_U64), PAGE_SIZE_U64);
        assert_eq!(align_up(PAGE_SIZE_U64, PAGE_SIZE_U64), PAGE_SIZE_U64);
        assert_eq!(align_up(PAGE_SIZE_U64 + 1, PAGE_SIZE_U64), PAGE_SIZE_U64 * 2);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0, PAGE_SIZE_U64), 0);
        assert_eq!(align_down(1, PAGE_SIZE_U64), 0);
        assert_eq!(align_down(PAGE_SIZE_U64 + 1, PAGE_SIZE_U64), PAGE_SIZE_U64);
    }

    #[test]
    fn test_align_up_usize_cache_line() {
        assert_eq!(align_up_usize(1, CACHE_LINE_SIZE), 64);
        assert_eq!(align_up_usize(64, CACHE_LINE_SIZE), 64);
        assert_eq!(align_up_usize(65, CACHE_LINE_SIZE), 128);
    }

    #[test]
    fn test_is_page_aligned() {
        assert!(is_page_aligned(0));
        assert!(is_page_aligned(PAGE_SIZE_U64 * 100));
        assert!(!is_page_aligned(PAGE_SIZE_U64 + 1));
    }

    #[test]
    fn test_sentinels_are_distinct_from_not_ready() {
        assert_ne!(TASK_COUNT_NOT_READY, NOT_RESIDENT);
        assert!(TASK_COUNT_NOT_READY < TASK_COUNT_ANY);
    }
}
