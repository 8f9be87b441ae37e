// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Submission backends.
//!
//! A backend is the device side of a command stream receiver: it accepts
//! closed batches and eventually writes their task counts to the completion
//! tag. Two backends ship with the runtime:
//!
//! - [`SimulatedBackend`] walks each batch through the GPU address space and
//!   completes it on the spot.
//! - [`ManualBackend`] only records batches; a [`DeviceControl`] handle
//!   decides when they complete.

pub mod manual;
pub mod simulated;

pub use manual::{DeviceControl, ManualBackend, SubmissionRecord};
pub use simulated::SimulatedBackend;

use crate::allocation::AllocationRef;
use crate::command_stream_receiver::BatchBuffer;
use crate::tag::TagWriter;

/// Device side of a command stream receiver.
///
/// Only `name`, `bind_tag` and `submit` are required; residency hooks
/// default to no-ops.
pub trait GpuBackend: Send {
    fn name(&self) -> &str;

    /// Receive the write side of the completion tag.
    fn bind_tag(&mut self, tag: TagWriter);

    /// Execute `batch` with `residency` pinned. Returns false if the batch
    /// could not be accepted.
    fn submit(&mut self, batch: &BatchBuffer, residency: &[AllocationRef]) -> bool;

    /// Make device writes to `allocation` visible to the host.
    fn make_coherent(&mut self, _allocation: &AllocationRef) {}

    /// Unpin evicted allocations.
    fn evict(&mut self, _allocations: &[AllocationRef]) {}
}
