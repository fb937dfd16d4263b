//! Errors produced by the daemon core.

/// A failure in the accept dispatcher or a client-instance's state machine.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Binding or accepting on a configured listener failed.
    #[error("net error: {0}")]
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
}
