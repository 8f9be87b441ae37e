// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host-side submission engine for the vela GPU runtime.
//!
//! Allocations and their residency, command buffers, per-family command
//! stream receivers and the completion tag they wait on.

pub mod address_space;
pub mod allocation;
pub mod backend;
pub mod command_stream_receiver;
pub mod device;
pub mod hw;
pub mod linear_stream;
pub mod memory_manager;
pub mod poll;
pub mod registry;
pub mod tag;

pub use allocation::{AllocationId, AllocationProperties, AllocationRef, AllocationType, GraphicsAllocation};
pub use command_stream_receiver::{
    BatchBuffer, CommandStreamReceiver, CompletionObserver, CompletionStamp, EngineStatus,
    ReceiverParams, SubmissionFlags,
};
pub use device::Device;
pub use hw::{GfxFamily, HwCommandStreamReceiver, SubmissionEngine};
pub use linear_stream::LinearStream;
pub use memory_manager::{AllocationUsage, HostMemoryManager, MemoryManager, SharedMemoryManager};
pub use poll::{PollConfig, WaitToken};
pub use registry::ReceiverRegistry;
pub use tag::{TagAddress, TagWriter};
