//! Errors produced by the client core.

/// A failure anywhere in the client's portal/channel state machine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Every candidate address for the portal or a channel refused the
    /// connection.
    #[error("connection error: {0}")]
    Net(#[from] xcp_net::NetError),
    /// A malformed preamble or control message.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The transfer engine failed to prepare or run a transfer.
    #[error("engine error: {0}")]
    Engine(#[from] xcp_engine::EngineError),
    /// The wire codec rejected a message.
    #[error("wire error: {0}")]
    Wire(#[from] xcp_wire::WireError),
    /// The request was structurally invalid before any socket was opened
    /// (e.g. neither operand names a remote host).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The server rejected the transfer request.
    #[error("server reported error {code}: {message}")]
    ServerReported {
        /// The server's numeric error code.
        code: i32,
        /// The server's human-readable detail.
        message: String,
    },
    /// The server and client protocol-version ranges did not overlap.
    #[error("protocol version negotiation failed")]
    VersionNegotiationFailed,
}
