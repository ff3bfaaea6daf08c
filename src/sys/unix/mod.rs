//! Unix backend: epoll on Linux/Android, kqueue on the BSDs/macOS, falling
//! back to `poll(2)` wherever neither is available.

macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

mod selector;
pub(crate) use self::selector::{event, Event, Events, Selector};

mod waker;
pub(crate) use self::waker::Waker;

mod sourcefd;
pub use self::sourcefd::SourceFd;

mod net;
mod socket;

pub(crate) mod tcp;
pub(crate) mod uds;

cfg_io_source! {
    mod io_source_state;
    pub(crate) use io_source_state::IoSourceState;
}
