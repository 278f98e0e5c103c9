//! Frame ring bookkeeping.
//!
//! [`FrameRing`] tracks which frame slot is current, where the frame is in
//! its cycle and the timeline value each slot's fence must reach before the
//! slot can be reused. It holds no GPU objects; the frame manager drives it
//! and performs the matching Vulkan calls.
//!
//! ```text
//! Idle -> Recording -> Submitted -> Presented -> WaitingForSlot -> Idle
//! ```

use tracing::trace;

use crate::error::{RendererError, RendererResult};

/// Where the current frame is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Presented,
    WaitingForSlot,
}

/// Fence wait the caller must perform before calling
/// [`FrameRing::finish_wait`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotWait {
    pub slot: usize,
    /// Timeline value the slot's fence must reach. Zero means the slot was
    /// never submitted and nothing needs waiting for.
    pub value: u64,
}

/// Per-slot fence targets plus the frame state machine.
#[derive(Debug)]
pub struct FrameRing {
    state: FrameState,
    slot: usize,
    targets: Vec<u64>,
    frame_number: u64,
}

impl FrameRing {
    /// Creates a ring of `frame_count` slots, every fence target at 0.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Config`] if `frame_count` is zero.
    pub fn new(frame_count: usize) -> RendererResult<Self> {
        if frame_count == 0 {
            return Err(RendererError::Config(
                "frame ring needs at least one slot".to_string(),
            ));
        }
        Ok(Self {
            state: FrameState::Idle,
            slot: 0,
            targets: vec![0; frame_count],
            frame_number: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index of the current frame slot.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.targets.len()
    }

    /// Frames completed since creation.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Last value signaled (or to be signaled) for `slot`.
    pub fn target(&self, slot: usize) -> Option<u64> {
        self.targets.get(slot).copied()
    }

    /// Every slot with the value its fence must reach. Used at shutdown to
    /// drain all in-flight work.
    pub fn pending_waits(&self) -> impl Iterator<Item = SlotWait> + '_ {
        self.targets
            .iter()
            .enumerate()
            .map(|(slot, &value)| SlotWait { slot, value })
    }

    /// `Idle -> Recording`. Returns the slot to record into.
    ///
    /// The slot's previous submission is known to be complete: it was waited
    /// for when the ring last entered this slot.
    pub fn begin_recording(&mut self) -> RendererResult<usize> {
        self.transition("begin_recording", FrameState::Idle, FrameState::Recording)?;
        trace!(
            "Frame {} recording into slot {}",
            self.frame_number, self.slot
        );
        Ok(self.slot)
    }

    /// `Recording -> Submitted`. Bumps the slot's fence target and returns the
    /// value the submission must signal.
    pub fn submit(&mut self) -> RendererResult<u64> {
        self.transition("submit", FrameState::Recording, FrameState::Submitted)?;
        let target = &mut self.targets[self.slot];
        *target += 1;
        Ok(*target)
    }

    /// Runs `queue` with the value the submission must signal, then moves
    /// `Recording -> Submitted`.
    ///
    /// `queue` only runs from the `Recording` state, and the ring is left
    /// untouched if it fails.
    pub fn submit_with<F>(&mut self, queue: F) -> RendererResult<u64>
    where
        F: FnOnce(u64) -> RendererResult<()>,
    {
        self.expect_state("submit", FrameState::Recording)?;
        queue(self.targets[self.slot] + 1)?;
        self.submit()
    }

    /// `Submitted -> Presented`.
    pub fn present(&mut self) -> RendererResult<()> {
        self.transition("present", FrameState::Submitted, FrameState::Presented)
    }

    /// `Presented -> WaitingForSlot`. Moves to the next slot and returns the
    /// fence value to wait for before that slot is reused.
    pub fn advance(&mut self) -> RendererResult<SlotWait> {
        self.transition("advance", FrameState::Presented, FrameState::WaitingForSlot)?;
        self.slot = (self.slot + 1) % self.targets.len();
        Ok(SlotWait {
            slot: self.slot,
            value: self.targets[self.slot],
        })
    }

    /// `WaitingForSlot -> Idle`, once the wait returned by
    /// [`advance`](Self::advance) has completed.
    pub fn finish_wait(&mut self) -> RendererResult<()> {
        self.transition("finish_wait", FrameState::WaitingForSlot, FrameState::Idle)?;
        self.frame_number += 1;
        Ok(())
    }

    fn transition(
        &mut self,
        operation: &'static str,
        from: FrameState,
        to: FrameState,
    ) -> RendererResult<()> {
        self.expect_state(operation, from)?;
        self.state = to;
        Ok(())
    }

    fn expect_state(&self, operation: &'static str, expected: FrameState) -> RendererResult<()> {
        if self.state != expected {
            return Err(RendererError::FrameState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}
