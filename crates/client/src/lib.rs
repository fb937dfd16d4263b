#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_client` is the `xcp` client core: the portal routine that
//! negotiates a transfer and drives it to completion, and the channel
//! routine each opened data connection runs.
//!
//! # Modules
//!
//! - [`portal`]: connects to the server, negotiates a version, opens every
//!   advertised channel, exchanges the transfer request/response, and
//!   drives the transfer to completion. [`portal::run`] is the entry point
//!   `xcp`'s CLI layer calls once per invocation.
//! - [`channel`]: one channel connection's lifecycle — connect, greet, wait
//!   for the portal-ready gate, run the block loop.
//! - [`session`]: the transfer's client-side state — channel handles,
//!   gates, and teardown.
//! - [`conn_io`]: adapts [`xcp_net::Connection`] to `Read`/`Write`.
//!
//! # Invariants
//!
//! - [`portal::run`] opens the local source (for an upload) before dialing
//!   the server at all, so an invalid local path never wastes a connection
//!   attempt.
//! - A channel that fails to connect reduces the transfer's channel count;
//!   it does not fail the transfer outright.

mod channel;
mod conn_io;
mod error;
mod portal;
mod session;

pub use error::ClientError;
pub use portal::{run, TransferRequest};
