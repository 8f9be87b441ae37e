// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Completion tag.
//!
//! The device writes the task count of every submission it completes into a
//! single 32-bit word. The word only ever grows, so once it reads `N` every
//! submission up to and including `N` is done. Host code only reads it.
//! The word is the first dword of the tag buffer, so anything that writes
//! that GPU address completes work the same way [`TagWriter`] does.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use vela_common::{GpuAddress, TaskCount};

use crate::allocation::AllocationRef;

/// Value of a fresh tag: no submission has completed.
pub const INITIAL_TAG_VALUE: TaskCount = 0;

/// Byte offset of the tag word inside the tag buffer.
pub const TAG_OFFSET: usize = 0;

/// Storage of the tag word.
#[derive(Debug, Clone)]
enum TagWord {
    /// First dword of the tag buffer, where the device writes it.
    Allocation(AllocationRef),
    Detached(Arc<AtomicU32>),
}

impl TagWord {
    fn load(&self) -> TaskCount {
        match self {
            Self::Allocation(allocation) => allocation.read_u32(TAG_OFFSET),
            Self::Detached(word) => word.load(Ordering::Acquire),
        }
    }

    fn fetch_max(&self, task_count: TaskCount) -> TaskCount {
        match self {
            Self::Allocation(allocation) => allocation.fetch_max_u32(TAG_OFFSET, task_count),
            Self::Detached(word) => word.fetch_max(task_count, Ordering::AcqRel),
        }
    }
}

/// Read side of the completion tag, shared by the receiver and its events.
#[derive(Debug, Clone)]
pub struct TagAddress {
    word: TagWord,
}

impl TagAddress {
    /// Tag stored in the first dword of `allocation`, which is reset to
    /// [`INITIAL_TAG_VALUE`].
    pub fn new(allocation: AllocationRef) -> Self {
        allocation.write(TAG_OFFSET, &INITIAL_TAG_VALUE.to_le_bytes());
        Self {
            word: TagWord::Allocation(allocation),
        }
    }

    /// Tag with no backing allocation.
    pub fn detached() -> Self {
        Self {
            word: TagWord::Detached(Arc::new(AtomicU32::new(INITIAL_TAG_VALUE))),
        }
    }

    /// Current completed task count.
    pub fn read(&self) -> TaskCount {
        self.word.load()
    }

    /// Whether submission `task_count` has completed.
    pub fn has_reached(&self, task_count: TaskCount) -> bool {
        task_count_reached(self.read(), task_count)
    }

    pub fn allocation(&self) -> Option<&AllocationRef> {
        match &self.word {
            TagWord::Allocation(allocation) => Some(allocation),
            TagWord::Detached(_) => None,
        }
    }

    /// GPU address the device writes completions to.
    pub fn gpu_address(&self) -> Option<GpuAddress> {
        self.allocation()
            .map(|a| a.gpu_address() + TAG_OFFSET as GpuAddress)
    }

    /// Write side, for the device (or a simulator standing in for it).
    pub fn writer(&self) -> TagWriter {
        TagWriter {
            word: self.word.clone(),
        }
    }
}

/// Device side of the completion tag.
#[derive(Debug, Clone)]
pub struct TagWriter {
    word: TagWord,
}

impl TagWriter {
    /// Publish completion of `task_count`. Never moves the tag backwards.
    pub fn complete(&self, task_count: TaskCount) {
        let previous = self.word.fetch_max(task_count);
        if task_count > previous {
            log::trace!("tag: completed task count {}", task_count);
        }
    }

    pub fn current(&self) -> TaskCount {
        self.word.load()
    }
}

/// Completion check. Task counts are not expected to wrap.
#[inline]
fn task_count_reached(value: TaskCount, target: TaskCount) -> bool {
    value >= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationId, AllocationProperties, AllocationType, GraphicsAllocation};

    #[test]
    fn test_initial_value() {
        let tag = TagAddress::detached();
        assert_eq!(tag.read(), INITIAL_TAG_VALUE);
        assert!(tag.has_reached(0));
        assert!(!tag.has_reached(1));
        assert!(tag.gpu_address().is_none());
    }

    #[test]
    fn test_writer_is_visible_to_clones() {
        let tag = TagAddress::detached();
        let copy = tag.clone();
        tag.writer().complete(3);
        assert_eq!(copy.read(), 3);
        assert!(copy.has_reached(2));
    }

    #[test]
    fn test_tag_never_regresses() {
        let tag = TagAddress::detached();
        let writer = tag.writer();
        writer.complete(5);
        writer.complete(2);
        assert_eq!(tag.read(), 5);
        assert_eq!(writer.current(), 5);
    }

    #[test]
    fn test_cross_thread_completion() {
        let tag = TagAddress::detached();
        let writer = tag.writer();
        let handle = std::thread::spawn(move || {
            for n in 1..=100 {
                writer.complete(n);
            }
        });
        handle.join().unwrap();
        assert_eq!(tag.read(), 100);
    }

    fn tag_buffer() -> AllocationRef {
        Arc::new(GraphicsAllocation::new(
            AllocationId(7),
            &AllocationProperties::new(0x1000, AllocationType::TagBuffer),
            0x0010_0000,
        ))
    }

    #[test]
    fn test_tag_word_lives_in_tag_buffer() {
        let buffer = tag_buffer();
        let tag = TagAddress::new(buffer.clone());
        assert_eq!(tag.gpu_address(), Some(0x0010_0000));

        tag.writer().complete(4);
        assert_eq!(buffer.read_u32(TAG_OFFSET), 4);

        // A device store straight into the buffer is seen by readers.
        buffer.write(TAG_OFFSET, &9u32.to_le_bytes());
        assert_eq!(tag.read(), 9);
        assert!(tag.has_reached(9));
        tag.writer().complete(6);
        assert_eq!(buffer.read_u32(TAG_OFFSET), 9);
    }

    #[test]
    fn test_new_tag_resets_stale_buffer() {
        let buffer = tag_buffer();
        buffer.write(TAG_OFFSET, &42u32.to_le_bytes());
        let tag = TagAddress::new(buffer);
        assert_eq!(tag.read(), INITIAL_TAG_VALUE);
    }
}
