//! WASI preview 2 backend.
//!
//! WASIp1's socket/poll story never stabilized; this crate only targets
//! `wasm32-wasip2`.

mod p2;

pub(crate) use p2::*;
