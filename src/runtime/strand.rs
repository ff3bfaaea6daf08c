//! A serial sub-executor guaranteeing non-concurrent, FIFO execution of a
//! group of handlers, layered over a parent [`Executor`].

use crate::runtime::handler::{Executor, ExecutorCore, RunningGuard};
use crate::runtime::task_queue::Task;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Bounds how many queued handlers a single trampoline run drains before
/// re-posting itself, so one busy strand cannot starve the rest of the
/// context on a thread pumping many strands.
const DRAIN_BATCH: usize = 256;

#[derive(Default)]
struct State {
    pending: VecDeque<Task>,
    /// `true` while a trampoline task is actively draining this strand (or
    /// is scheduled to). New work posted while this is set does not need a
    /// new trampoline: the running one will pick it up before it unlocks.
    locked: bool,
}

struct Inner {
    parent: Executor,
    state: Mutex<State>,
}

impl ExecutorCore for Inner {
    fn post_task(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(task);
        if !state.locked {
            state.locked = true;
            drop(state);
            self.spawn_trampoline();
        }
    }
}

impl Inner {
    fn spawn_trampoline(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.parent.post(Box::new(move || this.drain()));
    }

    /// Runs while holding the strand's serialization lock: drains a bounded
    /// batch of pending handlers, one at a time, then either re-posts
    /// itself (more work remains) or releases the lock.
    fn drain(self: Arc<Self>) {
        let id = Arc::as_ptr(&self) as *const () as usize;
        let _guard = RunningGuard::enter(id);
        for _ in 0..DRAIN_BATCH {
            let next = self.state.lock().unwrap().pending.pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }

        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            state.locked = false;
        } else {
            drop(state);
            self.spawn_trampoline();
        }
    }
}

/// A serial executor: handlers posted or dispatched through the same
/// `Strand` never run concurrently with one another, and run in the exact
/// order they were submitted, regardless of how many threads are pumping
/// the parent context.
///
/// `Strand` is a shallow, cloneable handle; the underlying queue and lock
/// are shared and kept alive by any outstanding handle plus any work still
/// scheduled on it.
#[derive(Clone)]
pub struct Strand {
    inner: Arc<Inner>,
    executor: Executor,
}

impl Strand {
    /// Creates a new strand layered over `parent`.
    pub fn new(parent: Executor) -> Strand {
        let inner = Arc::new(Inner {
            parent,
            state: Mutex::new(State::default()),
        });
        let executor = Executor::new(inner.clone());
        Strand { inner, executor }
    }

    /// Returns an [`Executor`] handle for this strand, suitable for
    /// anywhere a context's executor is accepted.
    pub fn executor(&self) -> Executor {
        self.executor.clone()
    }

    /// Enqueues `handler`. Never runs it inline.
    pub fn post<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.post(Box::new(handler));
    }

    /// Runs `handler` immediately if the calling thread is already draining
    /// this exact strand; otherwise behaves like [`post`](Strand::post).
    pub fn dispatch<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.dispatch(Box::new(handler));
    }

    /// Like [`post`](Strand::post), hinting the handler continues a chain
    /// on the same thread where possible.
    pub fn defer<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.defer(Box::new(handler));
    }
}
