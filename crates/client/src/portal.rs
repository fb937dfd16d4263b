//! The client-side portal routine: negotiates a protocol version, learns
//! the server's channel topology, opens every channel connection,
//! exchanges the transfer request/response, and drives the transfer to
//! completion.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xcp_engine::{ProgressCallback, TransferDestination, TransferSource};
use xcp_identity::{Identity, ProtocolVersion};
use xcp_net::Connection;
use xcp_wire::greeting::PortalGreeting;
use xcp_wire::{ClientTransferRequest, Message, ServerInformation, ServerTransferResponse, UserInfo};

use crate::session::{ClientSession, ClientTransferKind};
use crate::{channel, ClientError};

/// The number of channel connections a client opens before it starts
/// pacing subsequent opens.
const UNPACED_CHANNEL_BURST: u32 = 16;
/// Sleep interval between channel connects once the burst threshold is
/// exceeded, to avoid a SYN flood against the server.
const CHANNEL_PACING_DELAY: Duration = Duration::from_millis(5);

/// Everything the caller has already decided about the requested transfer,
/// independent of how the server responds.
pub struct TransferRequest<'a> {
    /// Candidate addresses for the server's portal, tried in order.
    pub server_addrs: &'a [SocketAddr],
    /// `true` for server→client (download), `false` for client→server.
    pub is_from_server_to_client: bool,
    /// The path on the server, possibly relative to the requested user's
    /// home directory.
    pub server_path: &'a str,
    /// The local filesystem path: the upload source or download
    /// destination.
    pub local_path: &'a Path,
    /// `0` for adaptive sizing, otherwise a fixed block size in bytes.
    pub block_size: u64,
    /// Whether `local_path`/`server_path` may be a directory.
    pub recursive: bool,
    /// The user whose home directory anchors a relative `server_path`.
    pub user_name: Option<&'a str>,
    /// Rate-limited progress callback, shared across every channel.
    pub progress: Option<ProgressCallback>,
}

/// Runs one transfer end to end: connects the portal, drives the full
/// handshake, opens every channel, and waits for the transfer to finish.
/// Returns `Ok(())` only if the transfer itself succeeded.
#[tracing::instrument(skip_all)]
pub fn run(request: &TransferRequest<'_>) -> Result<(), ClientError> {
    let identity = Identity::new();
    let session = Arc::new(ClientSession::new(identity));

    // Built before any socket is opened: if the local source is invalid
    // there is no point dialing the server at all.
    let local_source = if request.is_from_server_to_client {
        None
    } else {
        Some(TransferSource::new(
            request.local_path,
            request.recursive,
            request.block_size,
            request.progress.clone(),
        )?)
    };

    let conn = connect_portal(request.server_addrs, identity)?;
    let conn = Arc::new(conn);
    session.set_portal_connection(Arc::clone(&conn));

    let outcome = run_inner(&session, &conn, request, local_source);
    match &outcome {
        Ok(()) => session.set_result_if_unknown(true),
        Err(err) => {
            tracing::warn!(%err, "portal routine failed");
            session.set_result_if_unknown(false);
        }
    }
    session.dispose();
    outcome
}

fn connect_portal(addrs: &[SocketAddr], identity: Identity) -> Result<Connection, ClientError> {
    let greeting = PortalGreeting {
        identity,
        min_version: ProtocolVersion::MIN_SUPPORTED,
        max_version: ProtocolVersion::MAX_SUPPORTED,
    }
    .to_bytes();

    let mut last_err = None;
    for addr in addrs {
        match Connection::connect_and_send(*addr, &greeting) {
            Ok(conn) => return Ok(conn),
            Err(err) => {
                tracing::debug!(%addr, %err, "portal address refused connection, trying next");
                last_err = Some(err);
            }
        }
    }
    Err(last_err
        .map(ClientError::from)
        .unwrap_or_else(|| ClientError::InvalidArgument("no server portal addresses to try".into())))
}

fn run_inner(
    session: &Arc<ClientSession>,
    conn: &Arc<Connection>,
    request: &TransferRequest<'_>,
    local_source: Option<TransferSource>,
) -> Result<(), ClientError> {
    let peer_ip = conn.peer_addr()?.ip();

    let mut version_bytes = [0u8; 2];
    conn.recv_exact(&mut version_bytes)?;
    let chosen = ProtocolVersion::from_raw(u16::from_be_bytes(version_bytes));
    if chosen.is_invalid() {
        return Err(ClientError::VersionNegotiationFailed);
    }

    let info = ServerInformation::recv(&mut crate::conn_io::ConnReader(conn))?;

    let opened = open_channels(session, &info.server_channels, peer_ip, session.identity());

    let transfer_info = local_source.as_ref().map(|s| s.manifest().clone());
    let request_msg = ClientTransferRequest {
        is_from_server_to_client: request.is_from_server_to_client,
        server_path: request.server_path.to_string(),
        transfer_block_size: request.block_size,
        is_recursive: request.recursive,
        user: UserInfo {
            user_name: request.user_name.unwrap_or_default().to_string(),
            domain_user_name: String::new(),
            user_sid: String::new(),
        },
        transfer_info,
    };
    request_msg.send(&mut crate::conn_io::ConnWriter(conn))?;

    let response = ServerTransferResponse::recv(&mut crate::conn_io::ConnReader(conn))?;
    if response.error_code != 0 {
        return Err(ClientError::ServerReported {
            code: response.error_code,
            message: response.error_message,
        });
    }

    let transfer = if request.is_from_server_to_client {
        let manifest = response
            .transfer_info
            .ok_or_else(|| ClientError::Protocol("download response carried no manifest".into()))?;
        let mut destination = TransferDestination::new(request.local_path, request.progress.clone());
        destination.init_transfer_info(&manifest, u64::from(opened))?;
        ClientTransferKind::Destination(destination)
    } else {
        ClientTransferKind::Source(
            local_source.expect("upload path always constructs a local source up front"),
        )
    };
    session.set_transfer(transfer);

    session.signal_portal_ready();

    session
        .transfer()
        .expect("installed above on every success path")
        .invoke_portal(conn)
        .map_err(ClientError::from)
}

/// Opens every channel connection the server advertised, pacing opens past
/// the first [`UNPACED_CHANNEL_BURST`] to avoid a SYN burst. Returns the
/// number of channels that actually connected: a channel
/// that fails to connect simply does not participate in the work-stealing
/// block partition, it does not fail the transfer.
fn open_channels(
    session: &Arc<ClientSession>,
    server_channels: &[(xcp_identity::Endpoint, u64)],
    peer_ip: std::net::IpAddr,
    identity: Identity,
) -> u32 {
    let opened = AtomicU32::new(0);
    for (endpoint, multiplicity) in server_channels {
        let addr = endpoint.resolved_against(peer_ip).addr();
        for _ in 0..*multiplicity {
            let count = opened.load(Ordering::Relaxed);
            if count >= UNPACED_CHANNEL_BURST {
                std::thread::sleep(CHANNEL_PACING_DELAY);
            }
            match channel::connect(addr, identity) {
                Ok(conn) => {
                    let conn = Arc::new(conn);
                    let handle = {
                        let session = Arc::clone(session);
                        let conn = Arc::clone(&conn);
                        std::thread::spawn(move || channel::run(session, conn))
                    };
                    if session.try_register_channel(Arc::clone(&conn), handle) {
                        opened.fetch_add(1, Ordering::Relaxed);
                    } else {
                        conn.dispose();
                    }
                }
                Err(err) => {
                    tracing::warn!(%addr, %err, "channel connection failed, continuing with fewer channels");
                }
            }
        }
    }
    opened.load(Ordering::Relaxed)
}
