//! Composed operations: handlers that are themselves driven by one or more
//! primitive operations, re-entering the I/O object from inside their own
//! completion routine until some combined stop condition is met.
//!
//! Each of these takes its I/O object behind an `Arc` rather than a plain
//! reference, since the composed op's own completion closure must own a
//! handle to the object across an arbitrary number of re-entries -- the
//! same "handler shares the object" ownership shape documented on
//! [`IoObject`].

use crate::runtime::error::{Error, IoResult};
use crate::runtime::io_object::IoObject;
use std::io;
use std::sync::{Arc, Mutex};

/// Completion condition: given the result of the most recent primitive op
/// and the total bytes transferred so far, returns whether the composed
/// operation should stop (successfully or on error) rather than issue
/// another primitive op.
pub trait CompletionCondition: FnMut(&IoResult, usize) -> bool + Send + 'static {}
impl<F: FnMut(&IoResult, usize) -> bool + Send + 'static> CompletionCondition for F {}

/// A completion condition satisfied only once the whole buffer has been
/// transferred (i.e. on any error, or once `total` reaches `len`).
pub fn transfer_all(len: usize) -> impl CompletionCondition {
    move |result: &IoResult, total: usize| result.is_err() || total >= len
}

/// A completion condition satisfied once at least `minimum` bytes have
/// been transferred, or on any error.
pub fn transfer_at_least(minimum: usize) -> impl CompletionCondition {
    move |result: &IoResult, total: usize| result.is_err() || total >= minimum
}

/// Reads into `buf` until `condition` is satisfied, by default (via
/// [`transfer_all`]) until `buf` is completely full.
///
/// `handler` is called exactly once, with the total bytes transferred on
/// success.
pub fn read_with_condition<T, C, H>(
    obj: Arc<IoObject<T>>,
    buf: Vec<u8>,
    condition: C,
    handler: H,
) where
    T: io::Read + Send + 'static,
    C: CompletionCondition,
    H: FnOnce(IoResult) + Send + 'static,
{
    read_step(obj, buf, 0, condition, handler);
}

fn read_step<T, C, H>(obj: Arc<IoObject<T>>, buf: Vec<u8>, total: usize, mut condition: C, handler: H)
where
    T: io::Read + Send + 'static,
    C: CompletionCondition,
    H: FnOnce(IoResult) + Send + 'static,
{
    if total >= buf.len() {
        handler(Ok(total));
        return;
    }
    // `async_read_some` needs a buffer to hand to the syscall; give it only
    // the unfilled tail and splice the result back in on completion.
    let chunk = vec![0u8; buf.len() - total];
    let obj2 = obj.clone();
    obj.async_read_some(chunk, move |result, chunk| {
        let mut buf = buf;
        let n = *result.as_ref().unwrap_or(&0);
        if result.is_ok() {
            buf[total..total + n].copy_from_slice(&chunk[..n]);
        }
        let total = total + n;
        if condition(&result, total) {
            match result {
                Ok(_) => handler(Ok(total)),
                Err(e) => handler(Err(e)),
            }
        } else {
            read_step(obj2, buf, total, condition, handler);
        }
    });
}

/// Writes all of `buf`, looping over [`IoObject::async_write_some`] until
/// every byte has been accepted or an error occurs.
///
/// Grounded in the same transfer-all loop as [`read_with_condition`], just
/// for the write direction; a zero-length write with bytes still remaining
/// is treated as a broken connection (`Error::Eof`), matching the
/// convention a `read` of zero uses for orderly close.
pub fn write_all<T, H>(obj: Arc<IoObject<T>>, buf: Vec<u8>, handler: H)
where
    T: io::Write + Send + 'static,
    H: FnOnce(IoResult) + Send + 'static,
{
    write_step(obj, buf, 0, handler);
}

fn write_step<T, H>(obj: Arc<IoObject<T>>, buf: Vec<u8>, written: usize, handler: H)
where
    T: io::Write + Send + 'static,
    H: FnOnce(IoResult) + Send + 'static,
{
    if written >= buf.len() {
        handler(Ok(written));
        return;
    }
    let chunk = buf[written..].to_vec();
    let obj2 = obj.clone();
    obj.async_write_some(chunk, move |result, _chunk| match result {
        Ok(0) => handler(Err(Error::Eof)),
        Ok(n) => write_step(obj2, buf, written + n, handler),
        Err(e) => handler(Err(e)),
    });
}

/// Reads until `delimiter` is found in `dyn_buf`, issuing further reads
/// as needed. `dyn_buf` accumulates every byte read, including any past
/// the delimiter: only `bytes_transferred` (the handler's `Ok` payload)
/// marks where the match ends, leaving whatever follows in `dyn_buf` for
/// a subsequent call to pick up without losing read-ahead data.
pub fn read_until<T, H>(obj: Arc<IoObject<T>>, dyn_buf: Arc<Mutex<Vec<u8>>>, delimiter: u8, handler: H)
where
    T: io::Read + Send + 'static,
    H: FnOnce(IoResult) + Send + 'static,
{
    if let Some(pos) = dyn_buf.lock().unwrap().iter().position(|&b| b == delimiter) {
        handler(Ok(pos + 1));
        return;
    }
    read_until_step(obj, dyn_buf, delimiter, handler);
}

const READ_UNTIL_CHUNK: usize = 512;

fn read_until_step<T, H>(
    obj: Arc<IoObject<T>>,
    dyn_buf: Arc<Mutex<Vec<u8>>>,
    delimiter: u8,
    handler: H,
) where
    T: io::Read + Send + 'static,
    H: FnOnce(IoResult) + Send + 'static,
{
    let obj2 = obj.clone();
    let dyn_buf2 = dyn_buf.clone();
    obj.async_read_some(vec![0u8; READ_UNTIL_CHUNK], move |result, chunk| {
        let n = match result {
            Ok(0) => {
                handler(Err(Error::Eof));
                return;
            }
            Ok(n) => n,
            Err(e) => {
                handler(Err(e));
                return;
            }
        };
        let mut buf = dyn_buf2.lock().unwrap();
        buf.extend_from_slice(&chunk[..n]);
        let found = buf.iter().position(|&b| b == delimiter);
        drop(buf);
        match found {
            Some(pos) => handler(Ok(pos + 1)),
            None => read_until_step(obj2, dyn_buf2, delimiter, handler),
        }
    });
}
