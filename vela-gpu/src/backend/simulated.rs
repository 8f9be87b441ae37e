// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Simulated device: executes batches synchronously on submit.

use std::sync::Arc;

use super::GpuBackend;
use crate::allocation::AllocationRef;
use crate::command_stream_receiver::BatchBuffer;
use crate::hw::MI_BATCH_BUFFER_END;
use crate::memory_manager::SharedMemoryManager;
use crate::tag::TagWriter;

/// Reads every batch by GPU address up to its terminator, then completes it.
pub struct SimulatedBackend {
    memory_manager: SharedMemoryManager,
    tag: Option<TagWriter>,
    submissions: u64,
    dwords_executed: u64,
}

impl SimulatedBackend {
    pub fn new(memory_manager: SharedMemoryManager) -> Self {
        Self {
            memory_manager,
            tag: None,
            submissions: 0,
            dwords_executed: 0,
        }
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn dwords_executed(&self) -> u64 {
        self.dwords_executed
    }

    /// Walk the batch dword by dword. Returns the number of dwords up to and
    /// including the terminator, or `None` if the batch runs off mapped memory
    /// or has no terminator.
    fn execute(&self, batch: &BatchBuffer) -> Option<u64> {
        let mm = self.memory_manager.lock();
        let start = batch.gpu_start();
        let mut executed = 0u64;
        for offset in (0..batch.used_size).step_by(4) {
            let gpu_va = start + offset as u64;
            let Some(resolved) = mm.resolve(gpu_va) else {
                log::warn!("simulated: batch reads unmapped GPU VA 0x{:X}", gpu_va);
                return None;
            };
            let dword = resolved.allocation.read_u32(resolved.offset);
            executed += 1;
            if dword == MI_BATCH_BUFFER_END {
                return Some(executed);
            }
        }
        None
    }
}

impl GpuBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn bind_tag(&mut self, tag: TagWriter) {
        self.tag = Some(tag);
    }

    fn submit(&mut self, batch: &BatchBuffer, residency: &[AllocationRef]) -> bool {
        let Some(tag) = self.tag.clone() else {
            log::warn!("simulated: submit before a tag was bound");
            return false;
        };
        if !residency
            .iter()
            .any(|a| Arc::ptr_eq(a, &batch.command_buffer))
        {
            log::warn!(
                "simulated: command buffer {} is not resident",
                batch.command_buffer.id().0
            );
            return false;
        }

        let Some(executed) = self.execute(batch) else {
            log::warn!(
                "simulated: task count {} has no batch terminator",
                batch.task_count
            );
            return false;
        };

        self.submissions += 1;
        self.dwords_executed += executed;
        log::trace!(
            "simulated: task count {} executed {} dwords",
            batch.task_count,
            executed
        );
        tag.complete(batch.task_count);
        true
    }
}
