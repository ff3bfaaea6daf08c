//! The portable descriptor demultiplexer: a thin layer of per-descriptor,
//! per-direction operation queues over the OS-specific [`Poll`]/[`Registry`]
//! selector.
//!
//! Registration happens once per descriptor with both directions of
//! interest armed; every supported backend (epoll, kqueue, `poll(2)`,
//! IOCP) is driven edge-triggered by the lower `sys` layer, so there is no
//! separate arm/disarm step to track here. What *is* tracked is a small
//! cache of "was this direction last reported ready", which lets a newly
//! submitted operation attempt its syscall inline instead of waiting for
//! another edge.

use crate::event;
use crate::event::Events;
use crate::runtime::op::{Attempt, Operation};
use crate::{Interest, Poll, Registry, Token};
use log::trace;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which half of a descriptor's traffic an operation belongs to.
///
/// `connect`/`accept` initiations are modeled as `Write` operations (the
/// descriptor becomes writable once a connection completes or a listener
/// has a pending connection), matching the two directions guaranteed
/// present on every backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) enum Direction {
    Read,
    Write,
}

struct DescriptorState {
    read_queue: Mutex<VecDeque<Operation>>,
    write_queue: Mutex<VecDeque<Operation>>,
    read_ready: AtomicBool,
    write_ready: AtomicBool,
}

impl DescriptorState {
    fn new() -> DescriptorState {
        DescriptorState {
            read_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            // Optimistically assume both directions ready until the first
            // `WouldBlock` proves otherwise; avoids waiting for an initial
            // edge on a descriptor that is already readable/writable (e.g.
            // a freshly connected socket with data already buffered).
            read_ready: AtomicBool::new(true),
            write_ready: AtomicBool::new(true),
        }
    }

    fn queue(&self, dir: Direction) -> &Mutex<VecDeque<Operation>> {
        match dir {
            Direction::Read => &self.read_queue,
            Direction::Write => &self.write_queue,
        }
    }

    fn ready(&self, dir: Direction) -> &AtomicBool {
        match dir {
            Direction::Read => &self.read_ready,
            Direction::Write => &self.write_ready,
        }
    }
}

/// The reactor: owns the OS selector and every registered descriptor's
/// queued operations.
pub(crate) struct Reactor {
    poll: Mutex<Poll>,
    registry: Registry,
    descriptors: Mutex<HashMap<Token, Arc<DescriptorState>>>,
    next_token: AtomicUsize,
}

/// Reserved for the context's cross-thread wake-up handle; no descriptor is
/// ever assigned this token.
pub(crate) const WAKE_TOKEN: Token = Token(usize::MAX);

impl Reactor {
    pub(crate) fn new() -> io::Result<Reactor> {
        let poll = Poll::new()?;
        let registry = poll.registry().clone();
        Ok(Reactor {
            poll: Mutex::new(poll),
            registry,
            descriptors: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(0),
        })
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers `source`, creating its per-direction queues. Fails if the
    /// underlying OS registration fails; never reuses a token.
    pub(crate) fn register_descriptor<S>(&self, source: &mut S) -> io::Result<Token>
    where
        S: event::Source,
    {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry
            .register(source, token, Interest::READABLE | Interest::WRITABLE)?;
        self.descriptors
            .lock()
            .unwrap()
            .insert(token, Arc::new(DescriptorState::new()));
        trace!("registered descriptor {:?} with reactor", token);
        Ok(token)
    }

    /// Cancels every queued operation on `token`'s descriptor, then removes
    /// its bookkeeping and deregisters it from the OS selector.
    pub(crate) fn deregister_descriptor<S>(&self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: event::Source,
    {
        for op in self.cancel_ops(token) {
            op.cancel();
        }
        self.descriptors.lock().unwrap().remove(&token);
        trace!("deregistered descriptor {:?} from reactor", token);
        self.registry.deregister(source)
    }

    /// Enqueues `op` for `(token, direction)`. If the direction's queue is
    /// currently empty and its readiness cache says it is ready, attempts
    /// `op`'s syscall inline before queuing, completing it immediately on
    /// success.
    pub(crate) fn start_op(&self, token: Token, direction: Direction, mut op: Operation) {
        let Some(state) = self.descriptors.lock().unwrap().get(&token).cloned() else {
            op.cancel();
            return;
        };
        let queue = state.queue(direction);
        let ready = state.ready(direction);

        let mut q = queue.lock().unwrap();
        if q.is_empty() && ready.load(Ordering::Acquire) {
            match op.attempt() {
                Attempt::Done(result) => {
                    drop(q);
                    op.complete(result);
                    return;
                }
                Attempt::WouldBlock => ready.store(false, Ordering::Release),
            }
        }
        q.push_back(op);
    }

    /// Removes every queued operation on `token`, both directions, for the
    /// caller to cancel. Idempotent: an unknown or already-idle descriptor
    /// yields an empty `Vec`.
    pub(crate) fn cancel_ops(&self, token: Token) -> Vec<Operation> {
        let Some(state) = self.descriptors.lock().unwrap().get(&token).cloned() else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        for direction in [Direction::Read, Direction::Write] {
            drained.extend(state.queue(direction).lock().unwrap().drain(..));
        }
        drained
    }

    /// Removes every queued operation on every registered descriptor, for
    /// context teardown.
    pub(crate) fn cancel_all(&self) -> Vec<Operation> {
        let descriptors = self.descriptors.lock().unwrap();
        let mut drained = Vec::new();
        for state in descriptors.values() {
            for direction in [Direction::Read, Direction::Write] {
                drained.extend(state.queue(direction).lock().unwrap().drain(..));
            }
        }
        drained
    }

    /// Waits up to `timeout` for OS readiness events and attempts every op
    /// they unblock. Returns the number of operations completed (not
    /// counting ones left re-queued after a `WouldBlock`).
    pub(crate) fn run_once(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut events = Events::with_capacity(256);
        {
            let mut poll = self.poll.lock().unwrap();
            poll.poll(&mut events, timeout)?;
        }

        let mut completed = 0;
        for event in events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }
            let Some(state) = self.descriptors.lock().unwrap().get(&token).cloned() else {
                continue;
            };

            // A hang-up or error is surfaced to both direction queues so
            // pending reads and writes both get a chance to observe it.
            let broadcast_error = event.is_error() || event.is_read_closed() || event.is_write_closed();

            if event.is_readable() || broadcast_error {
                state.read_ready.store(true, Ordering::Release);
                completed += self.drain_direction(&state, Direction::Read);
            }
            if event.is_writable() || broadcast_error {
                state.write_ready.store(true, Ordering::Release);
                completed += self.drain_direction(&state, Direction::Write);
            }
        }
        Ok(completed)
    }

    fn drain_direction(&self, state: &DescriptorState, direction: Direction) -> usize {
        let queue = state.queue(direction);
        let ready = state.ready(direction);
        let mut completed = 0;
        loop {
            let mut q = queue.lock().unwrap();
            let Some(mut op) = q.pop_front() else {
                break;
            };
            match op.attempt() {
                Attempt::Done(result) => {
                    drop(q);
                    op.complete(result);
                    completed += 1;
                }
                Attempt::WouldBlock => {
                    ready.store(false, Ordering::Release);
                    q.push_front(op);
                    break;
                }
            }
        }
        completed
    }
}
