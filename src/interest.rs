use std::fmt;
use std::num::NonZeroU8;

const READABLE: u8 = 0b0001;
const WRITABLE: u8 = 0b0010;
// The following are not available on all platforms.
const AIO: u8 = 0b0100;
const LIO: u8 = 0b1000;
const PRIORITY: u8 = 0b1_0000;

/// Interest used in registering.
///
/// Interest is used in registering [`Waker`] and [`event::Source`]s with
/// [`Poll`], it indicates what readiness should be monitored for. For
/// example if a socket is registered with [`READABLE`] and the socket
/// becomes writable, no event will be returned from a call to [`poll`].
///
/// [`Waker`]: crate::Waker
/// [`event::Source`]: crate::event::Source
/// [`Poll`]: crate::Poll
/// [`READABLE`]: Interest::READABLE
/// [`poll`]: crate::Poll::poll
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Interest(NonZeroU8);

impl Interest {
    /// Interest for readable readiness.
    pub const READABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(READABLE) });
    /// Interest for writable readiness.
    pub const WRITABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(WRITABLE) });
    /// Interest for AIO completion readiness.
    #[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
    pub const AIO: Interest = Interest(unsafe { NonZeroU8::new_unchecked(AIO) });
    /// Interest for LIO completion readiness.
    #[cfg(target_os = "freebsd")]
    pub const LIO: Interest = Interest(unsafe { NonZeroU8::new_unchecked(LIO) });
    /// Interest for high priority readable readiness, e.g. TCP out-of-band
    /// data.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub const PRIORITY: Interest = Interest(unsafe { NonZeroU8::new_unchecked(PRIORITY) });

    /// Add together two `Interest`s, returning a new `Interest` set
    /// representing both readiness sets together.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    #[allow(clippy::should_implement_trait)]
    pub const fn add(self, other: Interest) -> Interest {
        Interest(unsafe { NonZeroU8::new_unchecked(self.0.get() | other.0.get()) })
    }

    /// Removes `other` `Interest` from `self`, returning `None` if the
    /// result is empty.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn remove(self, other: Interest) -> Option<Interest> {
        NonZeroU8::new(self.0.get() & !other.0.get()).map(Interest)
    }

    /// Returns true if the value includes readable readiness.
    pub const fn is_readable(self) -> bool {
        (self.0.get() & READABLE) != 0
    }

    /// Returns true if the value includes writable readiness.
    pub const fn is_writable(self) -> bool {
        (self.0.get() & WRITABLE) != 0
    }

    /// Returns true if `Interest` contains AIO readiness.
    pub const fn is_aio(self) -> bool {
        (self.0.get() & AIO) != 0
    }

    /// Returns true if `Interest` contains LIO readiness.
    pub const fn is_lio(self) -> bool {
        (self.0.get() & LIO) != 0
    }

    /// Returns true if `Interest` contains priority readiness.
    pub const fn is_priority(self) -> bool {
        (self.0.get() & PRIORITY) != 0
    }
}

impl std::ops::BitOr for Interest {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        self.add(other)
    }
}

impl std::ops::BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, other: Self) {
        self.0 = (*self | other).0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one_flag_written = false;
        if self.is_readable() {
            write!(f, "READABLE")?;
            one_flag_written = true;
        }
        if self.is_writable() {
            if one_flag_written {
                write!(f, "|")?;
            }
            write!(f, "WRITABLE")?;
            one_flag_written = true;
        }
        #[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
        if self.is_aio() {
            if one_flag_written {
                write!(f, "|")?;
            }
            write!(f, "AIO")?;
            one_flag_written = true;
        }
        #[cfg(target_os = "freebsd")]
        if self.is_lio() {
            if one_flag_written {
                write!(f, "|")?;
            }
            write!(f, "LIO")?;
            one_flag_written = true;
        }
        #[cfg(any(target_os = "linux", target_os = "android"))]
        if self.is_priority() {
            if one_flag_written {
                write!(f, "|")?;
            }
            write!(f, "PRIORITY")?;
            one_flag_written = true;
        }
        debug_assert!(one_flag_written, "printing empty interests");
        Ok(())
    }
}
