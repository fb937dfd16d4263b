//! The accept dispatcher: the single uniform handler every portal and
//! channel listener routes accepted connections through.

use std::sync::Arc;

use xcp_identity::{Endpoint, Identity, ProtocolVersion};
use xcp_net::Connection;
use xcp_wire::greeting::{read_magics_and_role, ChannelGreeting, PortalGreeting, Role};

use crate::identity_map::IdentityMap;
use crate::instance::ClientInstance;
use crate::{channel, portal};

/// Everything a connection handler needs that is shared across every
/// listener: the identity map, the advertised channel list, and how many
/// channel connections a transfer is expected to accumulate before the
/// portal proceeds.
pub struct DispatchContext {
    /// The shared identity → client-instance map.
    pub identity_map: Arc<IdentityMap>,
    /// Advertised in `SERVER_INFORMATION`: every channel endpoint this
    /// daemon listens on, paired with its configured multiplicity.
    pub server_channels: Vec<(Endpoint, u64)>,
    /// Sum of every channel endpoint's multiplicity: the number of channel
    /// connections a single transfer is expected to accumulate.
    pub expected_channels: u64,
}

/// Handles one freshly accepted connection: reads the common preamble,
/// checks the role is allowed on this listener, and dispatches to the
/// portal or channel routine. Errors reading the preamble close the
/// connection without mutating any shared state.
#[tracing::instrument(skip_all)]
pub fn handle_accepted(conn: Connection, allow_channel_role: bool, ctx: Arc<DispatchContext>) {
    let raw_role = match read_magics_and_role(&mut crate::conn_io::ConnReader(&conn)) {
        Ok(role) => role,
        Err(err) => {
            tracing::debug!(%err, "rejecting connection with invalid greeting");
            return;
        }
    };

    match Role::from_raw(raw_role) {
        Some(Role::Portal) => handle_portal(conn, ctx),
        Some(Role::Channel) if allow_channel_role => handle_channel(conn, ctx),
        Some(Role::Channel) => {
            tracing::debug!("channel role not permitted on this listener, closing");
        }
        None => {
            tracing::debug!(raw_role, "unrecognized role, closing");
        }
    }
}

fn handle_portal(conn: Connection, ctx: Arc<DispatchContext>) {
    let (identity, client_min, client_max) =
        match PortalGreeting::read_after_role(&mut crate::conn_io::ConnReader(&conn)) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::debug!(%err, "malformed portal greeting, closing");
                return;
            }
        };

    let chosen = ProtocolVersion::negotiate(
        ProtocolVersion::MIN_SUPPORTED,
        ProtocolVersion::MAX_SUPPORTED,
        client_min,
        client_max,
    );

    let mut version_bytes = [0u8; 2];
    version_bytes.copy_from_slice(&chosen.as_raw().to_be_bytes());
    if conn.send_all(&version_bytes).is_err() {
        return;
    }
    if chosen.is_invalid() {
        tracing::info!(?identity, "version negotiation failed, closing portal connection");
        return;
    }

    let instance = Arc::new(ClientInstance::new(identity, ctx.expected_channels));
    let Some(instance) = ctx.identity_map.insert(instance) else {
        tracing::info!("daemon is shutting down, refusing new portal connection");
        return;
    };

    let conn = Arc::new(conn);
    instance.set_portal_connection(Arc::clone(&conn));
    portal::run(instance, conn, ctx);
}

fn handle_channel(conn: Connection, ctx: Arc<DispatchContext>) {
    let identity = match ChannelGreeting::read_after_role(&mut crate::conn_io::ConnReader(&conn)) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(%err, "malformed channel greeting, closing");
            return;
        }
    };

    let Some(instance) = ctx.identity_map.get(identity) else {
        tracing::debug!(?identity, "channel connection for unknown identity, closing");
        return;
    };

    let conn = Arc::new(conn);
    let handle = {
        let instance = Arc::clone(&instance);
        let conn = Arc::clone(&conn);
        std::thread::spawn(move || channel::run(instance, conn))
    };

    if !instance.try_register_channel(Arc::clone(&conn), handle) {
        tracing::debug!(?identity, "instance disposing, channel thread will exit promptly");
    }
}
