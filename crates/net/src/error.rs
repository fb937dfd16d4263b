//! Errors produced by the socket layer.

use std::io;

/// Failure from any blocking socket operation.
///
/// Every variant here is a *connection error* or *I/O error*: recoverable
/// at the call site (fall through to the next address, fail the one
/// channel/portal it occurred on) and never fatal to the whole process.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The underlying OS call failed.
    #[error("socket i/o error: {0}")]
    Io(#[from] io::Error),
    /// A vectored or `sendfile`-style write completed with fewer bytes than
    /// requested and the kernel reported no error — treated as a failure
    /// rather than retried.
    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually written.
        sent: u64,
        /// Bytes the caller asked to write.
        expected: u64,
    },
    /// Every candidate address for a connect attempt refused or was
    /// unreachable.
    #[error("no candidate address accepted the connection (tried {attempts})")]
    AllAddressesFailed {
        /// Number of addresses tried.
        attempts: usize,
    },
}

impl NetError {
    /// Wraps a short-write condition, the common case across
    /// `send_vectored`/`send_file`/`TransmitFile` backends.
    #[must_use]
    pub fn short_write(sent: u64, expected: u64) -> Self {
        Self::ShortWrite { sent, expected }
    }
}
