use crate::runtime::error::IoResult;

/// What happened when an [`Operation`] attempted its non-blocking syscall.
pub(crate) enum Attempt {
    /// The operation finished; the stored result should be delivered to the
    /// handler.
    Done(IoResult),
    /// The syscall would have blocked; the operation stays queued and
    /// interest remains armed for its direction.
    WouldBlock,
}

/// A polymorphic unit of queued work.
///
/// An `Operation` is opaque to the reactor: it only knows how to `attempt`
/// its syscall and, once a result is known, how to `complete` by handing the
/// result to whatever invoked it. Once posted into a per-descriptor queue it
/// is owned by the reactor; once handed to a task queue for completion it is
/// owned by the pump thread; after `complete` runs the operation is dropped.
///
/// Operations never migrate across contexts.
pub(crate) struct Operation {
    attempt: Box<dyn FnMut() -> Attempt + Send>,
    complete: Box<dyn FnOnce(IoResult) + Send>,
}

impl Operation {
    pub(crate) fn new<A, C>(attempt: A, complete: C) -> Operation
    where
        A: FnMut() -> Attempt + Send + 'static,
        C: FnOnce(IoResult) + Send + 'static,
    {
        Operation {
            attempt: Box::new(attempt),
            complete: Box::new(complete),
        }
    }

    /// Runs the attempt routine once.
    pub(crate) fn attempt(&mut self) -> Attempt {
        (self.attempt)()
    }

    /// Consumes the operation, delivering `result` to its completion
    /// routine. This is the only way an `Operation`'s handler ever runs.
    pub(crate) fn complete(self, result: IoResult) {
        (self.complete)(result)
    }

    /// Cancels the operation: delivers [`Error::Aborted`] instead of
    /// attempting the syscall again.
    ///
    /// [`Error::Aborted`]: crate::runtime::error::Error::Aborted
    pub(crate) fn cancel(self) {
        use crate::runtime::error::Error;
        self.complete(Err(Error::Aborted));
    }
}
