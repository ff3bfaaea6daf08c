//! A proactor-style asynchronous I/O runtime built directly on this crate's
//! [`Poll`](crate::Poll) selector.
//!
//! The pieces compose the same way as the lower-level readiness API, just
//! one layer up: a [`Context`] owns a [`Reactor`](reactor::Reactor) the way
//! an application owns a `Poll`; I/O objects built on [`IoObject`] register
//! themselves with it the way a raw socket registers with a `Registry`; and
//! operations queued against those objects run to completion through the
//! [`Executor`] associated with whichever handler started them.
//!
//! ```no_run
//! use proactor_core::runtime::{Context, Timer};
//! use std::time::Duration;
//!
//! # fn main() -> std::io::Result<()> {
//! let ctx = Context::new()?;
//! let timer = Timer::new(&ctx);
//! timer.expires_after(Duration::from_millis(10));
//! timer.async_wait(|_result| println!("fired"));
//! ctx.run()?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod composed;
mod context;
mod error;
mod handler;
mod io_object;
mod op;
mod reactor;
mod strand;
mod task_queue;
mod timer;
mod timer_queue;

pub use crate::runtime::composed::{
    read_until, read_with_condition, transfer_all, transfer_at_least, write_all, CompletionCondition,
};
pub use crate::runtime::context::{Context, WorkGuard};
pub use crate::runtime::error::{Error, IoResult, TimerResult};
pub use crate::runtime::handler::{Allocator, Executor, SystemAllocator};
pub use crate::runtime::io_object::IoObject;
pub use crate::runtime::strand::Strand;
pub use crate::runtime::timer::Timer;
