//! A proactor-style asynchronous I/O runtime core.
//!
//! This crate provides the low-level machinery an async I/O runtime is built
//! on: an OS readiness multiplexer ([`Poll`]/[`Registry`]), a deadline-ordered
//! timer queue, a cross-thread task queue, an execution context that drives
//! both, a strand for serializing handler execution without locks, and a
//! composed-operation framework for building multi-step I/O algorithms (e.g.
//! "read until delimiter") out of single-step ones.
//!
//! It deliberately does not provide: a CPU thread pool scheduler, a
//! fiber/coroutine runtime, or a wire protocol. Those belong in higher-level
//! crates built on top of this one.
//!
//! # Platform support
//!
//! This crate compiles everywhere but only supports non-blocking I/O where
//! the OS provides a suitable backend:
//!
//! * epoll on Linux and Android.
//! * kqueue on BSDs, iOS, and macOS.
//! * `poll(2)` on Solaris and a few niche Unixes.
//! * IOCP on Windows.
//! * `wasm32-wasip2`'s socket/poll APIs.
//!
//! On unsupported platforms the reactor compiles but fails at registration
//! time. See [`event::Source`] for more.
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

mod interest;
mod poll;
mod sys;
mod token;
mod waker;

pub mod event;

cfg_net! {
    pub mod net;
}

cfg_io_source! {
    mod io_source;
}

cfg_os_poll! {
    pub use crate::poll::{Poll, Registry};
}

pub use crate::interest::Interest;
pub use crate::token::Token;

cfg_os_poll! {
    cfg_any_os_ext! {
        pub use crate::waker::Waker;
    }
}

#[cfg(unix)]
cfg_any_os_util! {
    pub use crate::sys::SourceFd;
}

pub mod runtime;

/// Re-exports of the features enabled in this build, for documentation.
///
/// This module is purely informational, it has no content other than this
/// documentation.
pub mod features {
    /// # `os-poll`
    ///
    /// Enables `Poll`, `Registry` and `Waker`.
    #[cfg(feature = "os-poll")]
    pub mod os_poll {}

    /// # `os-ext`
    ///
    /// Enables additional OS specific facilities, such as `SourceFd` and
    /// `pipe`.
    #[cfg(feature = "os-ext")]
    pub mod os_ext {}

    /// # `net`
    ///
    /// Enables `proactor_core::net`: `TcpListener`, `TcpStream` and, on Unix, the
    /// `UnixListener`/`UnixStream`/`UnixDatagram` family.
    #[cfg(feature = "net")]
    pub mod net {}
}
