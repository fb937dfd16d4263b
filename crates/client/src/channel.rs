//! The client-side channel routine. Runs to completion on the dedicated
//! thread the portal routine spawns for each channel connection it opens.

use std::net::SocketAddr;
use std::sync::Arc;

use xcp_identity::Identity;
use xcp_net::Connection;
use xcp_wire::greeting::ChannelGreeting;

use crate::session::ClientSession;
use crate::ClientError;

/// Opens a channel connection to `addr` and sends its greeting, preferring
/// TCP Fast Open (the greeting is bundled into the connect call) and
/// falling back transparently to connect-then-send when the platform or
/// kernel doesn't support it.
pub fn connect(addr: SocketAddr, identity: Identity) -> Result<Connection, ClientError> {
    let greeting = ChannelGreeting { identity }.to_bytes();
    Ok(Connection::connect_and_send(addr, &greeting)?)
}

/// Waits for the portal to signal readiness (or for disposal to force that
/// gate open early), then runs the transfer's block loop.
#[tracing::instrument(skip_all, fields(identity = ?session.identity()))]
pub fn run(session: Arc<ClientSession>, conn: Arc<Connection>) {
    session.wait_portal_ready();

    if session.is_closing() {
        tracing::debug!("session disposed before this channel could start transferring");
        return;
    }

    let Some(transfer) = session.transfer() else {
        tracing::warn!("portal ready signaled but no transfer installed; session is disposing");
        return;
    };

    if let Err(err) = transfer.invoke_channel(&conn) {
        tracing::warn!(%err, "channel transfer loop failed");
        session.set_result_if_unknown(false);
        session.dispose_async();
    }
}
