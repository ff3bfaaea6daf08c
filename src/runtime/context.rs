//! The execution context: owns the reactor, timer queue, and task queue,
//! and exposes the `run`/`run_one`/`poll`/`stop`/`restart` pump API.

use crate::runtime::clock::remaining;
use crate::runtime::error::Error;
use crate::runtime::handler::{Executor, ExecutorCore, RunningGuard};
use crate::runtime::op::Operation;
use crate::runtime::reactor::{Direction, Reactor, WAKE_TOKEN};
use crate::runtime::task_queue::{Task, TaskQueue};
use crate::runtime::timer_queue::{TimerId, TimerQueue};
use crate::{event, Token, Waker};
use log::trace;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Maximum number of tasks a single pump iteration drains before returning,
/// so `run()` periodically gets the chance to notice `stop()`.
const TASK_BATCH: usize = 128;

struct Inner {
    reactor: Reactor,
    timers: TimerQueue,
    tasks: TaskQueue,
    waker: Waker,
    /// Outstanding reasons to keep running: live work guards, pending
    /// operations, pending timers. `run()` exits once this reaches zero.
    work_count: AtomicI64,
    stopped: AtomicBool,
}

impl ExecutorCore for Inner {
    fn post_task(&self, task: Task) {
        if self.tasks.push(task) {
            // Queue was idle; a pumping thread may already be blocked in
            // the reactor wait, so make sure it notices. Coalescing makes
            // this safe to call unconditionally even when no one is
            // waiting.
            let _ = self.waker.wake();
        }
    }
}

/// The I/O execution context: an event loop, task queue, wake-up mechanism,
/// and run-control API, built on a [`Reactor`] and a [`TimerQueue`].
///
/// A `Context` is the root of ownership for every I/O object and operation
/// created against it; I/O objects hold only a non-owning reference.
/// Destroying a `Context` cancels every still-queued operation, invoking its
/// handler with [`Error::Aborted`] before destruction completes.
pub struct Context {
    inner: Arc<Inner>,
}

/// A non-owning reference to a [`Context`], held by I/O objects and timers
/// so that a handler capturing its object does not, transitively, keep the
/// context it belongs to alive. See the module-level ownership discussion.
#[derive(Clone)]
pub(crate) struct WeakContext {
    inner: Weak<Inner>,
}

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl Context {
    /// Creates a new, empty context.
    pub fn new() -> io::Result<Context> {
        let reactor = Reactor::new()?;
        let waker = Waker::new(reactor.registry(), WAKE_TOKEN)?;
        let inner = Arc::new(Inner {
            reactor,
            timers: TimerQueue::new(),
            tasks: TaskQueue::new(),
            waker,
            work_count: AtomicI64::new(0),
            stopped: AtomicBool::new(false),
        });
        Ok(Context { inner })
    }

    /// Returns a non-owning handle to this context, suitable for an I/O
    /// object or timer to hold without keeping the context alive or
    /// participating in [`Drop`]'s owning-handle count.
    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns an [`Executor`] handle bound to this context: the default
    /// associated executor for any I/O object constructed with it.
    pub fn executor(&self) -> Executor {
        Executor::new(self.inner.clone())
    }

    /// A RAII work-count increment: keeps [`run`](Context::run) from
    /// returning for as long as the guard (or any clone of it) is alive.
    pub fn make_work_guard(&self) -> WorkGuard {
        self.inner.work_count.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            inner: self.inner.clone(),
        }
    }

    /// Pumps until the work count reaches zero or [`stop`](Context::stop) is
    /// called. Returns the number of handlers invoked on the calling
    /// thread.
    pub fn run(&self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            let n = self.run_impl(true, TASK_BATCH)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Pumps exactly one handler, blocking as needed. Returns `1`, or `0`
    /// if the context was already stopped or no work remains.
    pub fn run_one(&self) -> io::Result<usize> {
        self.run_impl(true, 1)
    }

    /// Like [`run`](Context::run) but never blocks: performs only work
    /// that is already ready.
    pub fn poll(&self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            let n = self.run_impl(false, TASK_BATCH)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Like [`run_one`](Context::run_one) but never blocks.
    pub fn poll_one(&self) -> io::Result<usize> {
        self.run_impl(false, 1)
    }

    /// Sets the stopped flag and interrupts the wake primitive. Every
    /// `run*` call on every thread pumping this context returns as soon as
    /// it reaches its next pump point.
    pub fn stop(&self) {
        trace!("context stopping");
        self.inner.stopped.store(true, Ordering::SeqCst);
        let _ = self.inner.waker.wake();
    }

    /// True if [`stop`](Context::stop) has been called and no
    /// [`restart`](Context::restart) has happened since.
    pub fn stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Clears the stopped flag so `run()` may be called again.
    ///
    /// Must not be called while any thread is inside `run*`; this is a
    /// documented precondition, not something enforced at runtime.
    pub fn restart(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
    }

    /// Registers an I/O source, returning the [`Token`] the reactor will
    /// use to report its readiness.
    pub(crate) fn register_io<S: event::Source>(&self, source: &mut S) -> io::Result<Token> {
        self.inner.reactor.register_descriptor(source)
    }

    pub(crate) fn deregister_io<S: event::Source>(
        &self,
        source: &mut S,
        token: Token,
    ) -> io::Result<()> {
        self.inner.reactor.deregister_descriptor(source, token)
    }

    /// Cancels every pending operation on `token`. Per-operation handlers
    /// are invoked with `Error::Aborted` through their associated executor;
    /// this call itself never runs a handler synchronously.
    pub(crate) fn cancel_io(&self, token: Token) {
        for op in self.inner.reactor.cancel_ops(token) {
            op.cancel();
        }
    }

    pub(crate) fn start_io_op(&self, token: Token, direction: Direction, op: Operation) {
        self.inner.reactor.start_op(token, direction, op);
    }

    pub(crate) fn schedule_timer(&self, deadline: Instant, op: Operation) -> TimerId {
        let (id, is_new_minimum) = self.inner.timers.schedule(deadline, op);
        if is_new_minimum {
            let _ = self.inner.waker.wake();
        }
        id
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) -> usize {
        match self.inner.timers.cancel(id) {
            Some(op) => {
                op.cancel();
                1
            }
            None => 0,
        }
    }

    /// Builds an [`Operation`] whose completion routine first decrements
    /// this context's work count, then runs `complete`. Every initiating
    /// function (read/write/connect/timer wait) constructs its operation
    /// through this so the work count always balances: one increment when
    /// the operation is created, one decrement when it completes, is
    /// canceled, or the context tears down.
    pub(crate) fn make_operation<A, C>(&self, attempt: A, complete: C) -> Operation
    where
        A: FnMut() -> crate::runtime::op::Attempt + Send + 'static,
        C: FnOnce(crate::runtime::error::IoResult) + Send + 'static,
    {
        self.inner.work_count.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        Operation::new(attempt, move |result| {
            inner.work_count.fetch_sub(1, Ordering::SeqCst);
            complete(result);
        })
    }

    /// One pump iteration as described for the execution context: drain
    /// ready tasks, else wait on the reactor bounded by the nearest timer
    /// deadline, converting whatever that produces into tasks, then retry
    /// once more (for blocking calls) before reporting no work done.
    fn run_impl(&self, may_block: bool, limit: usize) -> io::Result<usize> {
        loop {
            if self.inner.stopped.load(Ordering::SeqCst) {
                return Ok(0);
            }

            let ran = self.drain_tasks(limit);
            if ran > 0 {
                return Ok(ran);
            }

            // Firing a timer (like completing a reactor op) only posts its
            // handler onto the task queue; it does not invoke it. Loop back
            // around so the `drain_tasks` above picks it up, rather than
            // reporting work done here and under-running the handler count
            // a caller gets back from this function.
            if self.expire_due_timers() > 0 {
                continue;
            }

            if self.inner.work_count.load(Ordering::SeqCst) <= 0 && self.inner.tasks.is_empty() {
                return Ok(0);
            }

            if !may_block {
                // Always give the reactor a chance to notice ready I/O
                // before reporting no work done, even when neither the
                // task queue nor the timer queue has anything pending --
                // an outstanding read/write with no timer attached must
                // still be observed by a `poll()`-driven caller.
                self.inner.reactor.run_once(Some(Duration::ZERO))?;
                return Ok(self.drain_tasks(limit));
            }

            let bound = self.wait_bound();
            self.inner.reactor.run_once(bound)?;
        }
    }

    /// Completes every timer due by now, returning how many fired.
    fn expire_due_timers(&self) -> usize {
        let expired = self.inner.timers.expire_due(Instant::now());
        let n = expired.len();
        for op in expired {
            op.complete(Ok(0));
        }
        n
    }

    fn drain_tasks(&self, limit: usize) -> usize {
        let batch = self.inner.tasks.try_pop_batch(limit);
        let n = batch.len();
        if n == 0 {
            return 0;
        }
        let _guard = RunningGuard::enter(self.id());
        for task in batch {
            task();
        }
        n
    }

    /// Computes how long a blocking wait may run for: until the next timer
    /// deadline, or indefinitely if none is scheduled.
    fn wait_bound(&self) -> Option<Duration> {
        match self.inner.timers.next_deadline() {
            Some(deadline) => Some(remaining(Instant::now(), deadline)),
            None => None,
        }
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Only the last owning handle tears down reactor/timer state; I/O
        // objects only ever hold a non-owning reference, so by the time a
        // `Context` drops there is nothing else keeping it alive.
        if Arc::strong_count(&self.inner) == 1 {
            trace!("context dropping, canceling outstanding operations");
            self.inner.stopped.store(true, Ordering::SeqCst);
            for op in self.inner.timers.cancel_all() {
                op.cancel();
            }
            for op in self.inner.reactor.cancel_all() {
                op.cancel();
            }
            // `cancel()` above only posts each handler's invocation (see
            // `make_operation`'s executor-post wrapping); drain and run
            // those tasks now so every handler has genuinely run, with an
            // aborted result, before this function returns.
            self.inner.tasks.cancel_all();
        }
    }
}

/// RAII holder that increments the context's work count while alive,
/// keeping [`Context::run`] from returning purely for lack of queued
/// operations.
pub struct WorkGuard {
    inner: Arc<Inner>,
}

impl Clone for WorkGuard {
    fn clone(&self) -> WorkGuard {
        self.inner.work_count.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.inner.work_count.fetch_sub(1, Ordering::SeqCst);
        let _ = self.inner.waker.wake();
    }
}

#[allow(dead_code)]
fn assert_send_sync() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<Context>();
    is_send_sync::<AtomicUsize>();
}
