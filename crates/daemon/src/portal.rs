//! The server-side portal routine (spec §4.4, "Client-instance portal
//! routine"). Runs to completion on the dedicated thread the accept
//! dispatcher spawns for a portal connection.

use std::sync::Arc;

use xcp_engine::{EngineError, TransferDestination, TransferSource};
use xcp_net::Connection;
use xcp_wire::{ClientTransferRequest, Message, ServerInformation, ServerTransferResponse};

use crate::dispatch::DispatchContext;
use crate::instance::{ClientInstance, TransferKind};
use crate::userinfo::resolve_server_path;

/// Runs the full portal routine: advertise channels, receive the transfer
/// request, construct and prepare the transfer, release channels to start
/// working, then wait for the destination side to report completion.
#[tracing::instrument(skip_all, fields(identity = ?instance.identity()))]
pub fn run(instance: Arc<ClientInstance>, conn: Arc<Connection>, ctx: Arc<DispatchContext>) {
    let outcome = run_inner(&instance, &conn, &ctx);
    match &outcome {
        Ok(()) => instance.set_result_if_unknown(true),
        Err(err) => {
            tracing::warn!(%err, "portal routine failed");
            instance.set_result_if_unknown(false);
        }
    }
    ctx.identity_map.remove(instance.identity());
    instance.dispose();
}

fn run_inner(
    instance: &ClientInstance,
    conn: &Connection,
    ctx: &DispatchContext,
) -> Result<(), EngineError> {
    let info = ServerInformation {
        server_channels: ctx.server_channels.clone(),
    };
    info.send(&mut crate::conn_io::ConnWriter(conn))?;

    let request = ClientTransferRequest::recv(&mut crate::conn_io::ConnReader(conn))?;

    let prepared = prepare_transfer(instance, &request, ctx.expected_channels);
    let (transfer_kind, response_manifest, prepare_err) = match prepared {
        Ok((kind, manifest)) => (Some(kind), manifest, None),
        Err(err) => (None, None, Some(err)),
    };

    if let Some(kind) = transfer_kind {
        instance.set_transfer(kind);
    }

    if let Some(err) = prepare_err {
        let response = ServerTransferResponse {
            error_code: err.error_code(),
            error_message: err.to_string(),
            transfer_info: None,
        };
        response.send(&mut crate::conn_io::ConnWriter(conn))?;
        return Err(err);
    }

    instance.wait_all_channels_connected();

    let response = ServerTransferResponse {
        error_code: 0,
        error_message: String::new(),
        transfer_info: response_manifest,
    };
    response.send(&mut crate::conn_io::ConnWriter(conn))?;

    instance.signal_portal_ready();

    let transfer = instance
        .transfer()
        .expect("transfer was installed above on every success path");
    transfer.invoke_portal(conn)
}

fn prepare_transfer(
    instance: &ClientInstance,
    request: &ClientTransferRequest,
    total_channel_multiplicity: u64,
) -> Result<(TransferKind, Option<xcp_wire::TransferInfo>), EngineError> {
    let _ = instance;
    let path = resolve_server_path(&request.server_path, &request.user.user_name)?;

    if request.is_from_server_to_client {
        let source = TransferSource::new(&path, request.is_recursive, request.transfer_block_size, None)?;
        let manifest = source.manifest().clone();
        Ok((TransferKind::Source(source), Some(manifest)))
    } else {
        let manifest = request.transfer_info.clone().ok_or_else(|| {
            EngineError::invalid_argument("upload request carried no transfer manifest")
        })?;
        let mut destination = TransferDestination::new(&path, None);
        destination.init_transfer_info(&manifest, total_channel_multiplicity)?;
        Ok((TransferKind::Destination(destination), None))
    }
}
