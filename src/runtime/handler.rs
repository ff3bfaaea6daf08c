//! The handler invocation protocol: associated executor, associated
//! allocator, and the `dispatch`/`post`/`defer` primitives that differ only
//! in *when* a handler runs relative to the calling thread.

use crate::runtime::task_queue::Task;
use std::cell::Cell;
use std::sync::Arc;

/// Maximum number of nested inline `dispatch` calls permitted within a
/// single pump iteration before further `dispatch` calls degrade to `post`.
///
/// Bounds the stack depth a chain of composed operations can reach purely
/// through inline dispatch, since each link in the chain may itself
/// `dispatch` its continuation.
const MAX_DISPATCH_DEPTH: u32 = 64;

thread_local! {
    /// Identities (see [`Executor::id`]) of the executors the calling
    /// thread is currently running a handler for, innermost last.
    static RUNNING_ON: std::cell::RefCell<Vec<usize>> = const { std::cell::RefCell::new(Vec::new()) };
    static DISPATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the calling thread as executing inside the executor identified by
/// `id` for the lifetime of the guard. Pump loops hold one of these while
/// running a batch of work bound to a context or a strand.
pub(crate) struct RunningGuard {
    id: usize,
}

impl RunningGuard {
    pub(crate) fn enter(id: usize) -> RunningGuard {
        RUNNING_ON.with(|r| r.borrow_mut().push(id));
        RunningGuard { id }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        RUNNING_ON.with(|r| {
            let mut r = r.borrow_mut();
            if r.last() == Some(&self.id) {
                r.pop();
            }
        });
    }
}

fn is_running_on(id: usize) -> bool {
    RUNNING_ON.with(|r| r.borrow().contains(&id))
}

/// Runs `task` while counting it against the thread's inline dispatch depth,
/// so a chain of nested `dispatch` calls can detect when it has gone deep
/// enough to force the next link to `post` instead.
fn run_with_depth(task: Task) {
    DISPATCH_DEPTH.with(|d| d.set(d.get() + 1));
    task();
    DISPATCH_DEPTH.with(|d| d.set(d.get() - 1));
}

fn depth_below_limit() -> bool {
    DISPATCH_DEPTH.with(|d| d.get() < MAX_DISPATCH_DEPTH)
}

/// Something a handler can be scheduled on: a context, or a strand layered
/// over one.
///
/// Implementors provide only [`post_task`]; `dispatch`/`defer` and identity
/// tracking are derived from it.
///
/// [`post_task`]: ExecutorCore::post_task
pub(crate) trait ExecutorCore: Send + Sync {
    fn post_task(&self, task: Task);

    /// Hints that `task` continues a chain on the same thread if possible.
    /// The default behaves like `post`; a strand overrides this to run the
    /// deferred continuation as part of its current drain batch when safe.
    fn defer_task(&self, task: Task) {
        self.post_task(task);
    }
}

/// A value-semantic, cloneable handle to an [`ExecutorCore`].
///
/// Two `Executor` values compare equal (for the purpose of `dispatch`'s
/// "am I already running on this executor" check) exactly when they were
/// cloned from the same underlying core.
#[derive(Clone)]
pub struct Executor {
    core: Arc<dyn ExecutorCore>,
}

impl Executor {
    pub(crate) fn new(core: Arc<dyn ExecutorCore>) -> Executor {
        Executor { core }
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.core) as *const () as usize
    }

    /// Always enqueues `task` on the associated executor; never runs it
    /// inline on the calling thread.
    pub fn post(&self, task: Task) {
        self.core.post_task(task);
    }

    /// Like [`post`](Executor::post), but hints that `task` continues a
    /// chain on the same thread if the executor can arrange that cheaply.
    pub fn defer(&self, task: Task) {
        self.core.defer_task(task);
    }

    /// Runs `task` immediately if the calling thread is already executing
    /// inside this executor (the pumping thread for its context, or a
    /// thread currently draining its strand) and the inline dispatch depth
    /// has not been exhausted; otherwise behaves like [`post`](Executor::post).
    pub fn dispatch(&self, task: Task) {
        if is_running_on(self.id()) && depth_below_limit() {
            run_with_depth(task);
        } else {
            self.post(task);
        }
    }

    pub(crate) fn running_guard(&self) -> RunningGuard {
        RunningGuard::enter(self.id())
    }
}

/// A type used to allocate the memory backing a pending operation
/// (captured handler plus parameters).
///
/// The runtime never hard-codes the system allocator: every internal
/// allocation attributable to an operation goes through the handler's
/// associated allocator, defaulting to [`SystemAllocator`]. Composed
/// operations must propagate the *final* handler's allocator to every
/// sub-operation they drive; see [`Allocator::id`] for how tests verify
/// that.
pub trait Allocator: Send + Sync {
    /// An identity distinguishing this allocator from any other, so
    /// propagation can be asserted in tests without comparing trait
    /// objects directly.
    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }
}

/// The default associated allocator: Rust's global allocator, reached
/// through ordinary `Box`/`Vec` allocation.
#[derive(Default)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {}
