use std::fmt;
use std::io;

/// The outcome of a completed asynchronous operation.
///
/// Every completion handler receives one of these as its error indication.
/// `Would-block` is never surfaced here: it is handled internally by the
/// reactor, which simply re-arms interest and waits for the next event.
#[derive(Debug)]
pub enum Error {
    /// The operation was canceled, its I/O object was closed, or its
    /// context was stopped. Distinguishes "we canceled this" from any
    /// error the peer produced.
    Aborted,
    /// An orderly close: a read returned zero bytes.
    Eof,
    /// The OS reported a descriptor-level error (hang-up, `ECONNRESET`,
    /// etc.) or an operation attempt returned an OS error other than
    /// `WouldBlock`.
    Os(io::Error),
}

impl Error {
    /// True if this is [`Error::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// True if this is [`Error::Eof`].
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Aborted => write!(f, "operation aborted"),
            Error::Eof => write!(f, "end of stream"),
            Error::Os(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Os(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Os(e)
    }
}

/// The result delivered to a completion handler of an I/O operation: a byte
/// count on success, or the reason it did not complete successfully.
pub type IoResult = Result<usize, Error>;

/// The result delivered to a completion handler of a timer wait.
pub type TimerResult = Result<(), Error>;
