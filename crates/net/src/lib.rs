#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_net` is the blocking TCP socket layer every portal and channel
//! connection is built on: connect/bind/listen/accept, vectored sends,
//! zero-copy `send_file`, and a `recv_exact` that never returns a short
//! read. Nothing above this crate touches a raw file descriptor or
//! `SocketAddr` directly.
//!
//! # Design
//!
//! - [`Listener`] wraps a bound, listening socket configured with
//!   `SO_REUSEADDR`, `SO_REUSEPORT` where available, `TCP_NODELAY`,
//!   `SO_KEEPALIVE`, dual-stack IPv6, and best-effort `TCP_FASTOPEN`.
//! - [`Connection`] wraps one accepted or dialed socket with the same
//!   configuration, plus [`Connection::send_file`] (Linux `sendfile(2)`,
//!   a portable read/write fallback elsewhere) and
//!   [`Connection::connect_and_send`] (Linux `TCP_FASTOPEN_CONNECT`,
//!   falling back transparently to `connect()` + `send_all`).
//! - All operations are blocking, thread-per-connection: there is no
//!   non-blocking mode, no event loop.
//!
//! # Invariants
//!
//! - [`Connection::send_vectored`] and [`Connection::send_file`] report a
//!   partial completion as [`NetError::ShortWrite`] rather than retrying;
//!   only `EINTR` is retried transparently.
//! - [`Connection::dispose`] is safe to call from any thread, any number of
//!   times, concurrently with a blocking call on the same connection from
//!   another thread — that call observes the shutdown and returns an
//!   error instead of hanging.
//!
//! # Errors
//!
//! All operations return [`NetError`]: recoverable connection/I/O errors
//! the caller handles (retry next address, fail one channel), never
//! process-fatal on their own.

mod error;
#[cfg(target_os = "linux")]
mod fastopen;
mod sendfile;
mod socket;

pub use error::NetError;
pub use socket::{Connection, Listener};
