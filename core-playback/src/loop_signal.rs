//! # Loop Signal
//!
//! Loop points are positions authored into the media. The decoder finds out
//! it crossed one in the middle of a `decode()` call; the engine must only
//! react at the top of its next iteration. The decoder therefore never
//! touches engine state directly: it asks [`LoopState::on_boundary`] what to
//! do and, when the answer is [`LoopDecision::Loop`], a [`LoopSignal`] is
//! raised for the driving task to pick up.
//!
//! ## Policy
//!
//! | requested `n` | at a boundary                                       |
//! |---------------|-----------------------------------------------------|
//! | `n < 0`       | always loop                                         |
//! | `n = 0`       | end of media                                        |
//! | `n > 0`       | loop until the counter reaches `n`, then play past  |

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the decoder should do at a loop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopDecision {
    /// Jump back to the loop start.
    Loop,
    /// Stop here; the next `decode()` reports end of media.
    End,
    /// Ignore the loop point and keep playing.
    PassThrough,
}

/// Pending-loop flag shared between a decoder and the driving task.
///
/// Cloning shares the flag, so a decoder that renders on a thread of its own
/// can keep a clone and raise it from there.
#[derive(Debug, Clone, Default)]
pub struct LoopSignal {
    pending: Arc<AtomicBool>,
}

impl LoopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Requested loop count, loops taken so far and the pending flag.
#[derive(Debug, Clone)]
pub struct LoopState {
    requested: i32,
    counter: u32,
    signal: LoopSignal,
}

impl LoopState {
    pub fn new(requested: i32) -> Self {
        Self {
            requested,
            counter: 0,
            signal: LoopSignal::new(),
        }
    }

    pub fn requested(&self) -> i32 {
        self.requested
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn signal(&self) -> &LoopSignal {
        &self.signal
    }

    /// Adopt a new target. The counter restarts when the target is below one
    /// or the counter has already reached it; otherwise loops taken so far
    /// still count towards the new target.
    pub fn set_num_loops(&mut self, n: i32) {
        if n < 1 || i64::from(self.counter) >= i64::from(n) {
            self.counter = 0;
        }
        self.requested = n;
    }

    /// Forget loops taken and any pending notification (load, seek, subsong switch).
    pub fn reset(&mut self) {
        self.counter = 0;
        self.signal.clear();
    }

    /// Evaluate the policy at a boundary. [`LoopDecision::Loop`] counts the
    /// loop and raises the signal.
    pub fn on_boundary(&mut self) -> LoopDecision {
        let decision = match self.requested {
            n if n < 0 => LoopDecision::Loop,
            0 => LoopDecision::End,
            n if i64::from(self.counter) < i64::from(n) => LoopDecision::Loop,
            _ => LoopDecision::PassThrough,
        };

        if decision == LoopDecision::Loop {
            self.counter = self.counter.saturating_add(1);
            self.signal.raise();
        }

        decision
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new(0)
    }
}
