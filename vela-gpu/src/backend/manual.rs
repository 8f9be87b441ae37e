// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device whose completions are driven from outside.

use std::sync::Arc;

use parking_lot::Mutex;

use vela_common::TaskCount;

use super::GpuBackend;
use crate::allocation::{AllocationId, AllocationRef};
use crate::command_stream_receiver::{BatchBuffer, SubmissionFlags};
use crate::tag::TagWriter;

/// What the device saw for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub task_count: TaskCount,
    pub gpu_address: u64,
    pub used_size: usize,
    pub flags: SubmissionFlags,
    pub residency: Vec<AllocationId>,
}

#[derive(Default)]
struct ManualState {
    tag: Option<TagWriter>,
    submissions: Vec<SubmissionRecord>,
    evicted: Vec<AllocationId>,
    made_coherent: Vec<AllocationId>,
    reject_submissions: bool,
}

/// Backend that records submissions and never completes them by itself.
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

/// Controls a [`ManualBackend`] after it was handed to a receiver.
#[derive(Clone)]
pub struct DeviceControl {
    state: Arc<Mutex<ManualState>>,
}

impl ManualBackend {
    pub fn new() -> (Self, DeviceControl) {
        let state = Arc::new(Mutex::new(ManualState::default()));
        (
            Self {
                state: state.clone(),
            },
            DeviceControl { state },
        )
    }
}

impl GpuBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn bind_tag(&mut self, tag: TagWriter) {
        self.state.lock().tag = Some(tag);
    }

    fn submit(&mut self, batch: &BatchBuffer, residency: &[AllocationRef]) -> bool {
        let mut state = self.state.lock();
        if state.reject_submissions {
            return false;
        }
        state.submissions.push(SubmissionRecord {
            task_count: batch.task_count,
            gpu_address: batch.gpu_start(),
            used_size: batch.used_size,
            flags: batch.flags,
            residency: residency.iter().map(|a| a.id()).collect(),
        });
        true
    }

    fn make_coherent(&mut self, allocation: &AllocationRef) {
        self.state.lock().made_coherent.push(allocation.id());
    }

    fn evict(&mut self, allocations: &[AllocationRef]) {
        self.state
            .lock()
            .evicted
            .extend(allocations.iter().map(|a| a.id()));
    }
}

impl DeviceControl {
    /// Write `task_count` to the completion tag.
    pub fn complete(&self, task_count: TaskCount) {
        match &self.state.lock().tag {
            Some(tag) => tag.complete(task_count),
            None => log::warn!("manual: complete({}) before a tag was bound", task_count),
        }
    }

    /// Complete everything submitted so far.
    pub fn complete_all(&self) {
        if let Some(last) = self.last_submitted_task_count() {
            self.complete(last);
        }
    }

    pub fn tag_value(&self) -> Option<TaskCount> {
        self.state.lock().tag.as_ref().map(|t| t.current())
    }

    pub fn last_submitted_task_count(&self) -> Option<TaskCount> {
        self.state.lock().submissions.last().map(|s| s.task_count)
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    pub fn evicted(&self) -> Vec<AllocationId> {
        self.state.lock().evicted.clone()
    }

    pub fn made_coherent(&self) -> Vec<AllocationId> {
        self.state.lock().made_coherent.clone()
    }

    /// Make the device refuse new batches, as if its ring were full.
    pub fn set_reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }
}
