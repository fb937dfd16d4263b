#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_engine` is the transfer engine: everything between "a connection is
//! open" and "the requested bytes are on disk at the other end". It owns no
//! network accept/connect logic (that is [`xcp_net`]) and no control-message
//! framing (that is [`xcp_wire`]); it consumes both to drive one transfer's
//! file enumeration, block partitioning, and disk I/O.
//!
//! # Modules
//!
//! - [`source`]: enumerates the files under a transfer root and runs the
//!   per-channel block-sending loop.
//! - [`destination`]: resolves the destination path, creates and
//!   memory-maps every file, and runs the per-channel block-receiving loop.
//! - [`adaptive`]: the pure block-size-adjustment function both sides use.
//! - [`progress`]: the rate-limited progress callback shared by both sides.
//! - [`mmap`]: the `Sync` wrapper around a writable memory map that lets
//!   disjoint channel threads write into it without locking.
//! - [`conn_io`]: adapts [`xcp_net::Connection`] to `Read`/`Write` for
//!   [`xcp_wire::Message`].
//! - [`error`]: [`EngineError`] and its `errno`-style [`ErrorKind`].

mod adaptive;
mod conn_io;
mod destination;
mod error;
mod mmap;
mod progress;
mod source;

pub use adaptive::{
    adjust_block_size, round_and_clamp, ADAPTIVE_START, BLOCK_SIZE_UNIT, MAX_TRANSFER_BLOCK_SIZE,
    MIN_BLOCK_SIZE,
};
pub use destination::TransferDestination;
pub use error::{EngineError, ErrorKind};
pub use progress::{ProgressCallback, ProgressReporter};
pub use source::TransferSource;
