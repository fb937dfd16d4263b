#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_config` holds the two plain-data configuration objects the core
//! consumes: [`ServerConfig`] for `xcpd`, [`ClientConfig`] for `xcp`. Parsing
//! `clap` arguments into these lives in `xcp-cli`; this crate only knows
//! about the resulting values and their defaults/clamps.
//!
//! # Design
//!
//! A plain `ClientConfig`/`ServerConfig` data struct, no builder type:
//! the option surface here is a handful of fields, not a hundred-odd
//! flags.
//!
//! # Invariants
//!
//! - [`ClientConfig::block_size`] is always either `0` (adaptive) or a
//!   value in `[1, MAX_TRANSFER_BLOCK_SIZE]` — [`ClientConfig::clamp_block_size`]
//!   enforces this once, at construction time, so nothing downstream needs
//!   to re-check it.

use xcp_identity::RequestedEndpoint;

/// Default TCP port for the portal connection, both ends.
pub const DEFAULT_PORTAL_PORT: u16 = 62_581;

/// Hard ceiling on a fixed or adaptive transfer block size (1 GiB), per
/// spec §4.3.
pub const MAX_TRANSFER_BLOCK_SIZE: u64 = 1 << 30;

/// Verbosity as a signed delta from the default log level: each `-v`
/// increments, each `-q` decrements. `xcp-logging` maps this to a
/// `tracing::Level`.
pub type VerbosityDelta = i32;

/// Configuration for the `xcpd` server process.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// The portal listener: `host[:port][@n]`. When `@n` is present, the
    /// portal is also configured to accept `n` channel connections per
    /// resolved address (spec §9, "reuse portal as channel").
    pub portal: RequestedEndpoint,
    /// Channel listeners, one entry per `-C` flag.
    pub channels: Vec<RequestedEndpoint>,
    /// `-v`/`-q` delta from the default log level.
    pub verbosity: VerbosityDelta,
}

impl ServerConfig {
    /// Returns the portal's declared self-channel multiplicity, if any.
    #[must_use]
    pub fn portal_channel_multiplicity(&self) -> Option<u32> {
        self.portal.multiplicity()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            portal: RequestedEndpoint::from_parts("[::]", Some(DEFAULT_PORTAL_PORT), None),
            channels: Vec::new(),
            verbosity: 0,
        }
    }
}

/// Configuration for the `xcp` client process, describing exactly one
/// copy operation.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The `from` operand, already classified by the CLI layer as local or
    /// `[user@]host:path`.
    pub from: Endpoint,
    /// The `to` operand, in the same form.
    pub to: Endpoint,
    /// Server portal port, when not embedded in the remote operand.
    pub port: u16,
    /// User whose home directory anchors a relative server-side path.
    pub user: Option<String>,
    /// `0` for adaptive sizing, otherwise a fixed block size clamped to
    /// `[1, MAX_TRANSFER_BLOCK_SIZE]` by [`ClientConfig::clamp_block_size`].
    pub block_size: u64,
    /// Whether a directory source may be copied (`-r`).
    pub recursive: bool,
    /// `-v`/`-q` delta from the default log level.
    pub verbosity: VerbosityDelta,
}

impl ClientConfig {
    /// Clamps a raw `-B` value to `[1, MAX_TRANSFER_BLOCK_SIZE]`, leaving
    /// `0` (adaptive) untouched.
    #[must_use]
    pub fn clamp_block_size(raw: u64) -> u64 {
        if raw == 0 {
            0
        } else {
            raw.clamp(1, MAX_TRANSFER_BLOCK_SIZE)
        }
    }
}

/// One side of a copy operation: a local filesystem path, or a path on a
/// named remote host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// A path on the machine running `xcp`.
    Local(String),
    /// A path on a remote host, reached over the portal at `host`.
    Remote {
        /// Optional `user@` prefix, overriding [`ClientConfig::user`] for
        /// this operand specifically.
        user: Option<String>,
        /// The remote host name or address.
        host: String,
        /// The path on the remote host, to be resolved against the
        /// requested user's home directory if relative.
        path: String,
    },
}

impl Endpoint {
    /// Returns `true` if this operand names a remote host.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_size_stays_adaptive() {
        assert_eq!(ClientConfig::clamp_block_size(0), 0);
    }

    #[test]
    fn oversized_block_size_is_clamped() {
        assert_eq!(
            ClientConfig::clamp_block_size(u64::MAX),
            MAX_TRANSFER_BLOCK_SIZE
        );
    }

    #[test]
    fn undersized_nonzero_block_size_is_clamped_up() {
        assert_eq!(ClientConfig::clamp_block_size(1), 1);
    }

    #[test]
    fn default_server_config_listens_on_documented_port() {
        let config = ServerConfig::default();
        assert_eq!(config.portal.port(), Some(DEFAULT_PORTAL_PORT));
    }

    #[test]
    fn endpoint_remote_detection() {
        let local = Endpoint::Local("/tmp/a".to_string());
        let remote = Endpoint::Remote {
            user: None,
            host: "server".to_string(),
            path: "/tmp/a".to_string(),
        };
        assert!(!local.is_remote());
        assert!(remote.is_remote());
    }
}
