//! The management control-channel engine.
//!
//! `session` owns the socket and the `MgmtSession`; `commands` and
//! `dispatcher` are the outbound and inbound halves of that session,
//! `codec` the pure frame layer, `registry` the per-controller state and
//! `protocol` the wire constants.

pub mod codec;
pub mod protocol;
pub mod registry;
pub mod session;

mod commands;
mod dispatcher;

#[cfg(test)]
pub(crate) mod testutil;
