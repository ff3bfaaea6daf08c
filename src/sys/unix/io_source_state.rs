use crate::{Interest, Registry, Token};
use std::io;

/// Epoll and kqueue are both level/edge-triggered through the fd itself;
/// neither selector backend needs to track extra per-source state between
/// `do_io` calls, so this is a zero-sized passthrough.
pub(crate) struct IoSourceState;

impl IoSourceState {
    pub fn new() -> IoSourceState {
        IoSourceState
    }

    pub fn do_io<T, F, R>(&self, f: F, io: &mut T) -> io::Result<R>
    where
        F: FnOnce(&mut T) -> io::Result<R>,
    {
        f(io)
    }

    #[allow(dead_code)]
    pub fn register(
        &mut self,
        _registry: &Registry,
        _token: Token,
        _interests: Interest,
    ) -> io::Result<()> {
        Ok(())
    }
}
