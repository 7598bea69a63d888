//! Cooperative cancellation for field jobs.
//!
//! A [`CancelToken`] is shared between the handle that submitted a job and
//! the worker running it. Its state only ever moves forward out of
//! `PENDING`, either to `CANCELLED` (the caller gave up) or to `DELIVERED`
//! (the worker claimed the right to emit a terminal event). Whichever
//! transition wins, the other fails, so a job cancelled before its result
//! is sent can never deliver that result.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const DELIVERED: u8 = 2;

/// Polled by long-running computations between units of work.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

/// Any `Fn() -> bool` works as a cancellation hook.
impl<F> Cancellation for F
where
    F: Fn() -> bool,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// A hook that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancel/deliver state for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the job is (now or already) cancelled, `false` if
    /// the worker had already claimed delivery.
    pub fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    /// Claim the right to emit the job's terminal event. Fails once the
    /// token is cancelled or already claimed.
    pub fn claim_delivery(&self) -> bool {
        self.state
            .compare_exchange(PENDING, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_delivered(&self) -> bool {
        self.state.load(Ordering::Acquire) == DELIVERED
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}
