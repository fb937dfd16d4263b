//! Errors surfaced by the CLI layer itself, above the client/daemon cores.

/// A failure the CLI layer can report before or around a transfer, beyond
/// whatever [`xcp_client::ClientError`] or [`xcp_daemon::DaemonError`]
/// already covers.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// An operand or flag combination the CLI rejects outright (spec §7,
    /// "configuration error"): both operands local, both remote, or a
    /// remote operand with no resolvable address.
    #[error("{0}")]
    InvalidArgument(String),
    /// Resolving a requested host to a socket address failed (spec §7,
    /// "resolution error").
    #[error("resolving {host:?}: {source}")]
    Resolution {
        /// The host string that failed to resolve.
        host: String,
        /// The underlying resolver error.
        #[source]
        source: std::io::Error,
    },
    /// An endpoint string (`-p`/`-C`) did not parse.
    #[error(transparent)]
    Endpoint(#[from] xcp_identity::EndpointParseError),
    /// The client transfer itself failed.
    #[error(transparent)]
    Client(#[from] xcp_client::ClientError),
    /// The server failed to bind or encountered a fatal dispatch error.
    #[error(transparent)]
    Daemon(#[from] xcp_daemon::DaemonError),
}
