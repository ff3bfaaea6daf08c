//! The binding between a user-facing I/O object (a socket, a pipe, ...) and
//! its context: registers the descriptor on construction, cancels every
//! pending operation and deregisters on drop.
//!
//! Per the crate's ownership discipline, an `IoObject` holds only a
//! non-owning ([`WeakContext`]) reference to the context it was built
//! against, even though a handler submitted through it commonly owns the
//! object (directly or via `Arc`) for the operation's duration. This breaks
//! the handler → object → context → operation → handler cycle that an
//! owning reference would otherwise create.

use crate::event;
use crate::runtime::context::{Context, WeakContext};
use crate::runtime::error::{Error, IoResult};
use crate::runtime::handler::Executor;
use crate::runtime::op::Attempt;
use crate::runtime::reactor::Direction;
use crate::Token;
use std::io;
use std::sync::{Arc, Mutex};

/// Couples an OS handle (anything implementing [`event::Source`]) to a
/// [`Context`]: the reactor registration, per-descriptor operation queues,
/// and the associated executor handlers submitted through this object run
/// on by default.
///
/// Moving an `IoObject` is only safe when no operation is outstanding on
/// it; this is a documented precondition, not something enforced at
/// compile time.
pub struct IoObject<T> {
    ctx: WeakContext,
    token: Token,
    io: Arc<Mutex<T>>,
}

impl<T: event::Source> IoObject<T> {
    /// Registers `io` with `ctx`'s reactor.
    pub fn new(ctx: &Context, mut io: T) -> io::Result<IoObject<T>> {
        let token = ctx.register_io(&mut io)?;
        Ok(IoObject {
            ctx: ctx.downgrade(),
            token,
            io: Arc::new(Mutex::new(io)),
        })
    }

    /// The executor handlers submitted through this object run on unless a
    /// composed operation overrides it.
    ///
    /// Panics if this object has outlived its context; callers that need
    /// to tolerate that should go through `async_read_some`/
    /// `async_write_some` instead, which fail soft with `Error::Aborted`.
    pub fn executor(&self) -> Executor {
        self.ctx
            .upgrade()
            .expect("IoObject::executor called after its context was dropped")
            .executor()
    }

    /// Runs `f` against the underlying handle. Callers must not perform I/O
    /// through this that bypasses the reactor's readiness tracking (e.g. a
    /// blocking call on a non-blocking descriptor is fine; closing the
    /// handle out from under the reactor is not).
    pub fn with_inner<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.io.lock().unwrap())
    }

    /// Cancels every operation pending on this object. Handlers are invoked
    /// with [`Error::Aborted`] through their associated executor; this call
    /// never runs a handler synchronously.
    pub fn cancel(&self) {
        if let Some(ctx) = self.ctx.upgrade() {
            ctx.cancel_io(self.token);
        }
    }

    /// Starts an operation in `direction`. `attempt` performs the
    /// non-blocking syscall against the locked handle and owns `buf` for
    /// the duration of any retries; `handler` receives the final result
    /// together with `buf` on this object's associated executor.
    ///
    /// If this object has outlived its context, `handler` is invoked
    /// immediately with `Error::Aborted` -- there is no executor left to
    /// post through.
    pub(crate) fn start_with_buffer<F, H>(
        &self,
        direction: Direction,
        buf: Vec<u8>,
        mut op: F,
        handler: H,
    ) where
        F: FnMut(&mut T, &mut Vec<u8>) -> io::Result<usize> + Send + 'static,
        H: FnOnce(IoResult, Vec<u8>) + Send + 'static,
        T: Send + 'static,
    {
        let Some(ctx) = self.ctx.upgrade() else {
            handler(Err(Error::Aborted), buf);
            return;
        };
        let io = self.io.clone();
        let executor = ctx.executor();
        let buf_slot = Arc::new(Mutex::new(Some(buf)));
        let complete_slot = buf_slot.clone();

        let operation = ctx.make_operation(
            move || {
                let mut slot = buf_slot.lock().unwrap();
                let buf = slot.as_mut().expect("attempt called after completion");
                match op(&mut io.lock().unwrap(), buf) {
                    Ok(n) => Attempt::Done(Ok(n)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Attempt::WouldBlock,
                    Err(e) => Attempt::Done(Err(Error::Os(e))),
                }
            },
            move |result| {
                let buf = complete_slot.lock().unwrap().take().unwrap();
                executor.post(Box::new(move || handler(result, buf)));
            },
        );
        ctx.start_io_op(self.token, direction, operation);
    }

    /// Queues a read of up to `buf.len()` bytes. `handler` receives the
    /// number of bytes read (`0` is a valid result: it is up to the
    /// caller's protocol, not this layer, to treat it as EOF) and `buf`
    /// back.
    pub fn async_read_some<H>(&self, buf: Vec<u8>, handler: H)
    where
        T: io::Read + Send + 'static,
        H: FnOnce(IoResult, Vec<u8>) + Send + 'static,
    {
        self.start_with_buffer(Direction::Read, buf, |io, buf| io.read(buf), handler);
    }

    /// Queues a write of `buf`'s full contents attempted as a single
    /// non-blocking syscall (i.e. `write`, not `write_all`; see
    /// [`crate::runtime::write_all`] for the composed version).
    pub fn async_write_some<H>(&self, buf: Vec<u8>, handler: H)
    where
        T: io::Write + Send + 'static,
        H: FnOnce(IoResult, Vec<u8>) + Send + 'static,
    {
        self.start_with_buffer(Direction::Write, buf, |io, buf| io.write(buf), handler);
    }
}

impl<T: event::Source> Drop for IoObject<T> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.upgrade() {
            let mut io = self.io.lock().unwrap();
            let _ = ctx.deregister_io(&mut *io, self.token);
        }
    }
}
