// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::debug;

use crate::{Backend, InvariantViolation};

/// Synchronization bounding one in-flight submission.
pub struct FrameSlot<B: Backend> {
    /// Raised by the display subsystem once the acquired image can be drawn to.
    pub available: B::Semaphore,
    /// Raised when this slot's GPU work completes; presentation waits on it.
    pub finished: B::Semaphore,
    /// CPU-visible completion. Created signalled so the first wait never blocks.
    pub ready: B::Fence,
}

impl<B: Backend> Clone for FrameSlot<B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for FrameSlot<B> {}

impl<B: Backend> std::fmt::Debug for FrameSlot<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("available", &self.available)
            .field("finished", &self.finished)
            .field("ready", &self.ready)
            .finish()
    }
}

/// Fixed ring of frame slots. Sized once, independent of the image count.
pub struct FramePool<B: Backend> {
    slots: Vec<FrameSlot<B>>,
}

impl<B: Backend> FramePool<B> {
    /// Create `count` slots. If any primitive fails to allocate, everything
    /// created so far is released before the error is returned.
    pub fn new(backend: &mut B, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(InvariantViolation::EmptySlotPool.into());
        }
        let mut pool = Self {
            slots: Vec::with_capacity(count),
        };
        for i in 0..count {
            match create_slot(backend) {
                Ok(slot) => pool.slots.push(slot),
                Err(e) => {
                    pool.release(backend);
                    return Err(e.context(format!("frame slot {i} of {count}")));
                }
            }
        }
        debug!("frame slot pool ready ({count} slots)");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &FrameSlot<B> {
        &self.slots[index]
    }

    /// Next slot index in the ring.
    pub fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    pub fn ready_fences(&self) -> Vec<B::Fence> {
        self.slots.iter().map(|s| s.ready).collect()
    }

    /// Block until no submission made through any slot is still executing.
    pub fn drain(&self, backend: &mut B, timeout_ns: u64) -> Result<()> {
        let fences = self.ready_fences();
        if fences.is_empty() {
            return Ok(());
        }
        backend
            .wait_for_fences(&fences, timeout_ns)
            .context("wait_for_fences(all frame slots)")
    }

    /// Wait on each slot's ready gate, then destroy its primitives. The pool
    /// is empty afterwards.
    pub fn destroy(&mut self, backend: &mut B, timeout_ns: u64) -> Result<()> {
        let drained = self.drain(backend, timeout_ns);
        self.release(backend);
        drained
    }

    fn release(&mut self, backend: &mut B) {
        for slot in self.slots.drain(..) {
            backend.destroy_fence(slot.ready);
            backend.destroy_semaphore(slot.finished);
            backend.destroy_semaphore(slot.available);
        }
    }
}

fn create_slot<B: Backend>(backend: &mut B) -> Result<FrameSlot<B>> {
    let available = backend.create_semaphore().context("create_semaphore(available)")?;
    let finished = match backend.create_semaphore() {
        Ok(s) => s,
        Err(e) => {
            backend.destroy_semaphore(available);
            return Err(e.context("create_semaphore(finished)"));
        }
    };
    let ready = match backend.create_fence(true) {
        Ok(f) => f,
        Err(e) => {
            backend.destroy_semaphore(finished);
            backend.destroy_semaphore(available);
            return Err(e.context("create_fence(ready)"));
        }
    };
    Ok(FrameSlot {
        available,
        finished,
        ready,
    })
}
