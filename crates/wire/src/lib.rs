#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_wire` is the wire protocol: the greeting/role/version preamble, the
//! framed control-message codec, the control messages themselves, and the
//! 16-byte transfer-block header. Nothing in this crate performs I/O beyond
//! reading from and writing to anything implementing [`std::io::Read`] /
//! [`std::io::Write`] — the socket layer lives in `xcp-net`.
//!
//! # Design
//!
//! - [`codec`] implements a small portable binary format (booleans, fixed
//!   width integers, length-prefixed strings, 1-byte-tagged options, tuples,
//!   sequences) with every multi-byte integer big-endian, matching what a
//!   `bincode`-style format would give us but pinned to a stable,
//!   hand-written layout so client and server never have to agree on a
//!   third-party format version.
//! - [`greeting`] models the fixed-magic preamble that starts every portal
//!   and channel connection.
//! - [`message`] defines the four framed control messages and their
//!   `[type u32][length u32][payload]` envelope.
//! - [`block`] defines the 16-byte transfer-block header and its
//!   end-of-stream sentinel value.
//!
//! # Invariants
//!
//! - Every length prefix (string, sequence) is checked against
//!   [`codec::MAX_LENGTH`] before an allocation is attempted.
//! - [`message::MessageType`] on the wire is a `u32`; an unrecognized or
//!   mismatched type is always a [`WireError`], never silently skipped.
//!
//! # Errors
//!
//! All decode failures are reported through [`WireError`]. Per the spec,
//! callers treat I/O errors (`WireError::Io`) as recoverable per-connection
//! failures and decode errors (`WireError::Decode`) as protocol violations
//! that should close the connection; the process itself keeps running.

pub mod block;
pub mod codec;
pub mod greeting;
pub mod message;

pub use block::{TransferBlockHeader, BLOCK_HEADER_LEN};
pub use greeting::{ChannelGreeting, PortalGreeting, Role, GREETING_MAGIC_1, GREETING_MAGIC_2};
pub use message::{
    BasicDirInfo, BasicFileInfo, ClientTransferRequest, Message, MessageType,
    ServerInformation, ServerTransferResponse, TransferDestinationFinished, TransferInfo,
    UserInfo,
};

/// Errors produced while encoding or decoding anything on the wire.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The underlying transport failed.
    #[error("wire i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes read did not form a valid payload.
    #[error("wire decode error: {0}")]
    Decode(String),
    /// A received [`message::MessageType`] did not match what the caller
    /// expected.
    #[error("unexpected message type: expected {expected:?}, got {actual:?}")]
    UnexpectedType {
        /// The type the caller asked to receive.
        expected: MessageType,
        /// The type actually found in the frame header.
        actual: u32,
    },
}
