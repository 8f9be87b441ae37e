// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Linear command stream over a command buffer allocation.

use crate::allocation::AllocationRef;

/// Append-only writer over one command buffer allocation.
///
/// `capacity` bytes are available to command encoders; a further `reserve`
/// bytes past it are kept back for the batch terminator written at flush.
#[derive(Debug, Default)]
pub struct LinearStream {
    allocation: Option<AllocationRef>,
    capacity: usize,
    reserve: usize,
    used: usize,
}

impl LinearStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the stream at a new buffer and reset the write offset.
    pub fn replace_buffer(&mut self, allocation: AllocationRef, capacity: usize, reserve: usize) {
        debug_assert!(capacity + reserve <= allocation.size());
        self.allocation = Some(allocation);
        self.capacity = capacity;
        self.reserve = reserve;
        self.used = 0;
    }

    /// Detach the current buffer, leaving the stream empty.
    pub fn take_allocation(&mut self) -> Option<AllocationRef> {
        self.capacity = 0;
        self.reserve = 0;
        self.used = 0;
        self.allocation.take()
    }

    pub fn allocation(&self) -> Option<&AllocationRef> {
        self.allocation.as_ref()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_space(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    /// Append encoded commands.
    pub fn emit(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.available_space(),
            "command stream overflow: 0x{:X} bytes requested, 0x{:X} available",
            bytes.len(),
            self.available_space()
        );
        self.write_at_cursor(bytes);
    }

    pub fn emit_u32(&mut self, dword: u32) {
        self.emit(&dword.to_le_bytes());
    }

    /// Append a terminator, which may spill into the reserved tail.
    pub(crate) fn emit_terminator(&mut self, bytes: &[u8]) {
        assert!(
            self.used + bytes.len() <= self.capacity + self.reserve,
            "command stream terminator does not fit in reserved space"
        );
        self.write_at_cursor(bytes);
    }

    /// Copy `len` already-written bytes starting at `offset`.
    pub(crate) fn copy_out(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        if let Some(allocation) = &self.allocation {
            allocation.read(offset, &mut bytes);
        }
        bytes
    }

    fn write_at_cursor(&mut self, bytes: &[u8]) {
        let Some(allocation) = &self.allocation else {
            panic!("command stream has no backing buffer");
        };
        allocation.write(self.used, bytes);
        self.used += bytes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationProperties, AllocationType};
    use crate::memory_manager::{HostMemoryManager, MemoryManager};

    fn stream(capacity: usize, reserve: usize) -> LinearStream {
        let mut mm = HostMemoryManager::new();
        let alloc = mm
            .allocate(AllocationProperties::new(
                capacity + reserve,
                AllocationType::CommandBuffer,
            ))
            .unwrap();
        let mut stream = LinearStream::new();
        stream.replace_buffer(alloc, capacity, reserve);
        stream
    }

    #[test]
    fn test_emit_advances() {
        let mut s = stream(16, 8);
        s.emit_u32(0x1234_5678);
        assert_eq!(s.used(), 4);
        assert_eq!(s.available_space(), 12);
        assert_eq!(s.allocation().unwrap().read_u32(0), 0x1234_5678);
    }

    #[test]
    fn test_terminator_uses_reserve() {
        let mut s = stream(8, 8);
        s.emit(&[0u8; 8]);
        assert_eq!(s.available_space(), 0);
        s.emit_terminator(&[0xFFu8; 8]);
        assert_eq!(s.used(), 16);
        assert_eq!(s.available_space(), 0);
    }

    #[test]
    #[should_panic(expected = "command stream overflow")]
    fn test_emit_overflow_panics() {
        let mut s = stream(4, 4);
        s.emit(&[0u8; 8]);
    }

    #[test]
    fn test_take_allocation_resets() {
        let mut s = stream(16, 0);
        s.emit_u32(1);
        assert!(s.take_allocation().is_some());
        assert_eq!(s.used(), 0);
        assert_eq!(s.available_space(), 0);
        assert!(s.allocation().is_none());
    }
}
