//! `clap` argument definitions for `xcp` and `xcpd`, and their conversion
//! into [`xcp_config::ClientConfig`]/[`xcp_config::ServerConfig`].

use clap::Parser;
use xcp_config::{ClientConfig, ServerConfig};
use xcp_identity::RequestedEndpoint;

use crate::error::CliError;

/// `xcp`: copies a file or (with `-r`) a directory tree between a local
/// path and `[user@]host:path` on a running `xcpd` (spec §6, client CLI
/// surface).
#[derive(Parser, Debug)]
#[command(name = "xcp", version, about = "Parallel-channel file and directory copy to or from an xcpd server")]
pub struct ClientArgs {
    /// Source: a local path, or `[user@]host:path`.
    pub from: String,
    /// Destination: a local path, or `[user@]host:path`.
    pub to: String,
    /// Server portal port, used when the remote operand names a host with
    /// no embedded port.
    #[arg(short = 'P', long = "port", default_value_t = xcp_config::DEFAULT_PORTAL_PORT)]
    pub port: u16,
    /// User whose home directory anchors a relative server-side path.
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,
    /// Fixed transfer block size in bytes; `0` (default) enables adaptive
    /// sizing. Clamped to `[1, 1 GiB]`.
    #[arg(short = 'B', long = "block", default_value_t = 0)]
    pub block: u64,
    /// Allow the source to be a directory, copying it recursively.
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,
    /// Increase logging verbosity; stackable.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Decrease logging verbosity; stackable.
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl ClientArgs {
    /// The `-v`/`-q` delta, positive for more verbose.
    #[must_use]
    pub fn verbosity(&self) -> i32 {
        i32::from(self.verbose) - i32::from(self.quiet)
    }

    /// Builds the [`ClientConfig`] this invocation describes, without yet
    /// resolving either operand's direction or host addresses (that is
    /// [`crate::client::run_transfer`]'s job, since it needs the parsed
    /// [`xcp_config::Endpoint`]s rather than the raw strings).
    #[must_use]
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig {
            from: crate::operand::parse_operand(&self.from),
            to: crate::operand::parse_operand(&self.to),
            port: self.port,
            user: self.user.clone(),
            block_size: ClientConfig::clamp_block_size(self.block),
            recursive: self.recursive,
            verbosity: self.verbosity(),
        }
    }
}

/// `xcpd`: the long-running server, listening for a portal connection and
/// any number of channel connections per transfer (spec §6, server CLI
/// surface).
#[derive(Parser, Debug)]
#[command(name = "xcpd", version, about = "xcp's server: accepts portal and channel connections and runs transfers")]
pub struct ServerArgs {
    /// Portal listen endpoint: `host[:port][@n]`. `@n` also accepts `n`
    /// channel connections on the same listener (spec §9, "reuse portal
    /// as channel").
    #[arg(short = 'p', long = "portal", default_value = "[::]:62581")]
    pub portal: String,
    /// A channel listen endpoint: `host[:port][@n]`, repeatable.
    #[arg(short = 'C', long = "channel")]
    pub channel: Vec<String>,
    /// Increase logging verbosity; stackable.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Decrease logging verbosity; stackable.
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl ServerArgs {
    /// The `-v`/`-q` delta, positive for more verbose.
    #[must_use]
    pub fn verbosity(&self) -> i32 {
        i32::from(self.verbose) - i32::from(self.quiet)
    }

    /// Parses every endpoint string into a [`ServerConfig`].
    pub fn to_config(&self) -> Result<ServerConfig, CliError> {
        let portal = RequestedEndpoint::parse(&self.portal)?;
        let channels = self
            .channel
            .iter()
            .map(|s| RequestedEndpoint::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ServerConfig {
            portal,
            channels,
            verbosity: self.verbosity(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_nets_stacked_flags() {
        let args = ClientArgs::parse_from(["xcp", "-vv", "-q", "a", "server:b"]);
        assert_eq!(args.verbosity(), 1);
    }

    #[test]
    fn client_block_size_is_clamped_through_config() {
        let args = ClientArgs::parse_from(["xcp", "-B", "7", "a", "server:b"]);
        assert_eq!(args.to_config().block_size, 7);
    }

    #[test]
    fn server_config_parses_repeated_channel_flags() {
        let args = ServerArgs::parse_from(["xcpd", "-C", "127.0.0.1:0@4", "-C", "127.0.0.1:9100"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].multiplicity(), Some(4));
    }

    #[test]
    fn default_portal_matches_documented_default() {
        let args = ServerArgs::parse_from(["xcpd"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.portal.port(), Some(xcp_config::DEFAULT_PORTAL_PORT));
    }
}
