// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-generation command stream receivers.
//!
//! Each hardware family implements [`GfxFamily`] with its encoding
//! constants. [`HwCommandStreamReceiver`] combines a family with the shared
//! [`CommandStreamReceiver`] state and exposes it as a [`SubmissionEngine`],
//! the interface devices and events work against.

use std::marker::PhantomData;

use vela_common::{align_up_usize, HwFamily, TaskCount};

use crate::allocation::AllocationRef;
use crate::command_stream_receiver::{
    CommandStreamReceiver, CompletionStamp, ReceiverParams, SubmissionFlags,
};
use crate::linear_stream::LinearStream;

/// `MI_BATCH_BUFFER_END`: ends the batch and returns to the ring.
pub const MI_BATCH_BUFFER_END: u32 = 0x0500_0000;

/// `MI_NOOP`.
pub const MI_NOOP: u32 = 0x0000_0000;

/// Encoding details of one hardware generation.
pub trait GfxFamily: Send + 'static {
    const FAMILY: HwFamily;
    const BATCH_BUFFER_END: u32 = MI_BATCH_BUFFER_END;
    const NOOP: u32 = MI_NOOP;
    /// Alignment the next batch must start at.
    const BATCH_ALIGNMENT: usize;

    /// Bytes closing a batch whose last command ends at `used`: dword padding,
    /// the batch end and no-ops up to `BATCH_ALIGNMENT`.
    fn batch_terminator(used: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; align_up_usize(used, 4) - used];
        bytes.extend_from_slice(&Self::BATCH_BUFFER_END.to_le_bytes());
        while (used + bytes.len()) % Self::BATCH_ALIGNMENT != 0 {
            bytes.extend_from_slice(&Self::NOOP.to_le_bytes());
        }
        bytes
    }
}

pub struct Gen9;
pub struct Gen11;
pub struct Gen12Lp;

impl GfxFamily for Gen9 {
    const FAMILY: HwFamily = HwFamily::Gen9;
    const BATCH_ALIGNMENT: usize = 8;
}

impl GfxFamily for Gen11 {
    const FAMILY: HwFamily = HwFamily::Gen11;
    const BATCH_ALIGNMENT: usize = 16;
}

impl GfxFamily for Gen12Lp {
    const FAMILY: HwFamily = HwFamily::Gen12Lp;
    const BATCH_ALIGNMENT: usize = 32;
}

/// Capabilities a device engine exposes, independent of its generation.
pub trait SubmissionEngine: Send {
    fn family(&self) -> HwFamily;

    /// See [`CommandStreamReceiver::get_cs`].
    fn get_cs(&mut self, min_required_size: usize) -> Option<&mut LinearStream>;

    /// See [`CommandStreamReceiver::make_resident`].
    fn make_resident(&mut self, allocation: &AllocationRef);

    /// Close and submit the commands written since the last flush.
    fn flush_task(&mut self, flags: SubmissionFlags) -> Option<CompletionStamp>;

    /// See [`CommandStreamReceiver::wait_for_completion_with_timeout`].
    fn wait_for_completion_with_timeout(
        &mut self,
        enable_timeout: bool,
        timeout_us: i64,
        task_count_to_wait: TaskCount,
    ) -> bool;

    fn receiver(&self) -> &CommandStreamReceiver;

    fn receiver_mut(&mut self) -> &mut CommandStreamReceiver;
}

/// Command stream receiver for family `G`.
pub struct HwCommandStreamReceiver<G: GfxFamily> {
    base: CommandStreamReceiver,
    _family: PhantomData<fn() -> G>,
}

impl<G: GfxFamily> HwCommandStreamReceiver<G> {
    pub fn new(params: ReceiverParams) -> Self {
        log::debug!("csr: creating {} receiver", G::FAMILY);
        Self {
            base: CommandStreamReceiver::new(params),
            _family: PhantomData,
        }
    }

    /// Factory entry for [`ReceiverRegistry`](crate::registry::ReceiverRegistry).
    pub fn create(params: ReceiverParams) -> Box<dyn SubmissionEngine> {
        Box::new(Self::new(params))
    }
}

impl<G: GfxFamily> SubmissionEngine for HwCommandStreamReceiver<G> {
    fn family(&self) -> HwFamily {
        G::FAMILY
    }

    fn get_cs(&mut self, min_required_size: usize) -> Option<&mut LinearStream> {
        self.base.get_cs(min_required_size)
    }

    fn make_resident(&mut self, allocation: &AllocationRef) {
        self.base.make_resident(allocation);
    }

    fn flush_task(&mut self, flags: SubmissionFlags) -> Option<CompletionStamp> {
        self.base.flush_task_with(G::batch_terminator, flags)
    }

    fn wait_for_completion_with_timeout(
        &mut self,
        enable_timeout: bool,
        timeout_us: i64,
        task_count_to_wait: TaskCount,
    ) -> bool {
        self.base
            .wait_for_completion_with_timeout(enable_timeout, timeout_us, task_count_to_wait)
    }

    fn receiver(&self) -> &CommandStreamReceiver {
        &self.base
    }

    fn receiver_mut(&mut self) -> &mut CommandStreamReceiver {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_aligned_start() {
        let bytes = Gen9::batch_terminator(0);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &MI_BATCH_BUFFER_END.to_le_bytes());
        assert_eq!(&bytes[4..], &MI_NOOP.to_le_bytes());
    }

    #[test]
    fn test_terminator_pads_partial_dword() {
        let bytes = Gen11::batch_terminator(6);
        // 2 bytes of padding, batch end at 8, no-ops up to 16.
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..2], &[0, 0]);
        assert_eq!(&bytes[2..6], &MI_BATCH_BUFFER_END.to_le_bytes());
    }

    #[test]
    fn test_terminator_fits_in_cache_line() {
        for used in 0..256 {
            let len = Gen12Lp::batch_terminator(used).len();
            assert!(len <= vela_common::CACHE_LINE_SIZE, "used={} len={}", used, len);
            assert_eq!((used + len) % Gen12Lp::BATCH_ALIGNMENT, 0);
        }
    }
}
