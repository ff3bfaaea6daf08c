use std::collections::VecDeque;
use std::sync::Mutex;

pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// FIFO, multi-producer queue of ready-to-run closures.
///
/// Any number of threads may [`push`] concurrently; a pumping thread calls
/// [`try_pop_batch`] to drain work for invocation. Ordering is only
/// guaranteed within a single producer thread: pushes from one thread are
/// observed by any consumer in the order they were made, but interleavings
/// between producer threads are unspecified.
///
/// [`push`]: TaskQueue::push
/// [`try_pop_batch`]: TaskQueue::try_pop_batch
#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub(crate) fn new() -> TaskQueue {
        TaskQueue {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends `task`. Returns `true` if the queue was empty beforehand,
    /// i.e. the context may have been idle and should be interrupted so a
    /// blocked reactor wait notices the new work.
    pub(crate) fn push(&self, task: Task) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let was_empty = tasks.is_empty();
        tasks.push_back(task);
        was_empty
    }

    /// Removes up to `max` entries in FIFO order for invocation by the
    /// caller. Does not invoke them itself: dropping the lock before running
    /// arbitrary user code avoids holding it across a handler.
    pub(crate) fn try_pop_batch(&self, max: usize) -> Vec<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let n = max.min(tasks.len());
        tasks.drain(..n).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Drains every remaining entry and runs it. Used on context teardown;
    /// entries queued at that point are already-decided completions (e.g.
    /// operations canceled by the reactor or timer queue), so running them
    /// is exactly "invoke the cancellation path".
    pub(crate) fn cancel_all(&self) {
        let drained: Vec<Task> = {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.drain(..).collect()
        };
        for task in drained {
            task();
        }
    }
}
