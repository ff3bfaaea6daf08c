//! A single-shot deadline timer layered on the context's timer queue.

use crate::runtime::clock::Clock;
use crate::runtime::context::{Context, WeakContext};
use crate::runtime::error::{Error, TimerResult};
use crate::runtime::op::Attempt;
use crate::runtime::timer_queue::TimerId;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A timer bound to a context.
///
/// Only one wait is tracked at a time: calling `async_wait` again, or
/// changing the deadline, cancels whichever wait is currently pending
/// before starting the new one, matching the usual expectation that
/// resetting a timer invalidates what it was previously waiting for.
///
/// A `Timer` holds only a non-owning reference to its context (see
/// [`WeakContext`]); it never keeps the context alive on its own.
pub struct Timer {
    ctx: WeakContext,
    deadline: Mutex<Clock>,
    pending: Mutex<Option<TimerId>>,
}

impl Timer {
    /// Creates a timer bound to `ctx` with its deadline set to now.
    pub fn new(ctx: &Context) -> Timer {
        Timer {
            ctx: ctx.downgrade(),
            deadline: Mutex::new(Instant::now()),
            pending: Mutex::new(None),
        }
    }

    /// Sets the deadline to `duration` from now, canceling any wait
    /// currently pending on the previous deadline.
    pub fn expires_after(&self, duration: Duration) {
        self.set_deadline(Instant::now() + duration);
    }

    /// Sets the deadline to an absolute point in time, canceling any wait
    /// currently pending on the previous deadline.
    pub fn expires_at(&self, deadline: Clock) {
        self.set_deadline(deadline);
    }

    fn set_deadline(&self, deadline: Clock) {
        *self.deadline.lock().unwrap() = deadline;
        self.cancel();
    }

    /// Blocks the calling thread until the deadline passes. Independent of
    /// any context's pump loop: this does not consume an `async_wait` slot
    /// and does not touch the work count.
    pub fn wait(&self) {
        let deadline = *self.deadline.lock().unwrap();
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }

    /// Queues `handler` to run when the deadline passes, or with
    /// `Error::Aborted` if the timer is canceled or reset first.
    ///
    /// If this timer has outlived its context, `handler` is invoked
    /// immediately with `Error::Aborted`.
    pub fn async_wait<H>(&self, handler: H)
    where
        H: FnOnce(TimerResult) + Send + 'static,
    {
        let Some(ctx) = self.ctx.upgrade() else {
            handler(Err(Error::Aborted));
            return;
        };
        let executor = ctx.executor();
        let deadline = *self.deadline.lock().unwrap();
        let operation = ctx.make_operation(
            // Timer operations never attempt inline: they are only ever
            // completed by `TimerQueue::expire_due` or canceled.
            || Attempt::WouldBlock,
            move |result| {
                let result: TimerResult = result.map(|_| ());
                executor.post(Box::new(move || handler(result)));
            },
        );
        let id = ctx.schedule_timer(deadline, operation);
        *self.pending.lock().unwrap() = Some(id);
    }

    /// Cancels the pending wait, if any. Returns the number canceled (`0`
    /// or `1`): a timer only ever has one wait outstanding.
    ///
    /// The handler, if one is pending, is invoked with `Error::Aborted`
    /// through its associated executor; this call never runs it
    /// synchronously.
    pub fn cancel(&self) -> usize {
        let Some(id) = self.pending.lock().unwrap().take() else {
            return 0;
        };
        let Some(ctx) = self.ctx.upgrade() else {
            return 0;
        };
        ctx.cancel_timer(id)
    }
}
