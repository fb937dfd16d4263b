#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_identity` defines the small set of value types that name a transfer
//! and the TCP endpoints it connects to, shared unchanged between the
//! client, the daemon, and the wire codec.
//!
//! # Design
//!
//! - [`Identity`] is a 16-byte opaque token minted once per client transfer
//!   and carried verbatim on every portal and channel connection so the
//!   server can route a channel to the right client-instance.
//! - [`Endpoint`] wraps a resolved [`std::net::SocketAddr`] with the display
//!   and "is any address" helpers the session layer needs.
//! - [`RequestedEndpoint`] is the not-yet-resolved form produced by parsing a
//!   `host[:port][@multiplicity]` CLI argument; it owns the list of
//!   addresses a hostname resolved to.
//! - [`ProtocolVersion`] is the 16-bit negotiated version number, with `0`
//!   reserved to mean "negotiation failed".
//!
//! # Invariants
//!
//! - `Identity` equality and hashing operate on the raw 16 bytes; no field is
//!   more significant than another.
//! - `ProtocolVersion::INVALID` is never a value a successful negotiation
//!   produces.
//!
//! # Errors
//!
//! This crate does not perform I/O and only reports parse failures (invalid
//! endpoint syntax) via [`EndpointParseError`].

mod endpoint;
mod identity;
mod version;

pub use endpoint::{Endpoint, EndpointParseError, RequestedEndpoint};
pub use identity::Identity;
pub use version::ProtocolVersion;
