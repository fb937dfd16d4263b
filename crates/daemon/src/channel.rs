//! The server-side channel routine. Runs to completion on the dedicated
//! thread the accept dispatcher spawns for a channel connection.

use std::sync::Arc;

use xcp_net::Connection;

use crate::instance::ClientInstance;

/// Signals that this channel has connected, waits for the portal to be
/// ready (or for disposal to force that gate open early), then runs the
/// transfer's block loop.
#[tracing::instrument(skip_all, fields(identity = ?instance.identity()))]
pub fn run(instance: Arc<ClientInstance>, conn: Arc<Connection>) {
    instance.signal_channel_connected();
    instance.wait_portal_ready();

    if instance.is_closing() {
        tracing::debug!("instance disposed before this channel could start transferring");
        return;
    }

    let Some(transfer) = instance.transfer() else {
        tracing::warn!("portal ready signaled but no transfer installed; instance is disposing");
        return;
    };

    if let Err(err) = transfer.invoke_channel(&conn) {
        tracing::warn!(%err, "channel transfer loop failed");
        instance.set_result_if_unknown(false);
        instance.dispose_async();
    }
}
