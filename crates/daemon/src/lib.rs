#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_daemon` is the `xcpd` server core: the accept dispatcher (spec
//! §4.4, "Server accept dispatcher"), the per-client state machine
//! ([`instance::ClientInstance`]), and the top-level [`Server`] that binds
//! every configured listener and routes accepted connections through it.
//!
//! # Modules
//!
//! - [`dispatch`]: the single handler every listener's accepted connections
//!   pass through — reads the greeting, decides portal vs. channel, and
//!   runs the matching routine.
//! - [`portal`] / [`channel`]: the server-side portal and channel routines.
//! - [`instance`]: one client's state — its transfer, gates, and teardown.
//! - [`identity_map`]: the `identity → ClientInstance` map every accepted
//!   channel connection is routed through.
//! - [`userinfo`]: resolves a requested user's home directory for a
//!   relative `server_path`.
//! - [`conn_io`]: adapts [`xcp_net::Connection`] to `Read`/`Write`.
//!
//! # Invariants
//!
//! - Exactly one portal listener and zero or more channel listeners are
//!   bound; each runs its own accept loop on a dedicated thread.
//! - [`Server::shutdown`] disposes every tracked client-instance and
//!   refuses new ones, per spec §4.5.

mod channel;
mod conn_io;
mod dispatch;
mod error;
mod identity_map;
mod instance;
mod portal;
mod userinfo;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub use error::DaemonError;
pub use identity_map::IdentityMap;
pub use instance::{ClientInstance, TransferKind, TransferResult};

use xcp_config::ServerConfig;
use xcp_identity::Endpoint;
use xcp_net::Listener;

use crate::dispatch::DispatchContext;

struct BoundListener {
    endpoint: Endpoint,
    listener: Listener,
    allow_channel_role: bool,
}

/// The running `xcpd` server: every bound listener, the shared identity
/// map, and the accept threads currently servicing them.
///
/// Construction (binding every configured address) is separated from
/// [`Server::serve`] (running the accept loops) so the caller can report
/// the resolved listen addresses — useful for tests that bind port `0` and
/// need to learn the assigned port before connecting a client.
pub struct Server {
    identity_map: Arc<IdentityMap>,
    ctx: Arc<DispatchContext>,
    bound: Vec<BoundListener>,
    exit_requested: Arc<AtomicBool>,
}

impl Server {
    /// Resolves and binds the portal listener and every channel listener
    /// named in `config`. No connections are accepted until
    /// [`Server::serve`] runs.
    pub fn bind(config: &ServerConfig) -> Result<Self, DaemonError> {
        let mut bound = Vec::new();
        let mut server_channels = Vec::new();

        let portal_addrs = config
            .portal
            .resolve(xcp_config::DEFAULT_PORTAL_PORT)
            .map_err(|err| DaemonError::Protocol(format!("resolving portal address: {err}")))?;
        let portal_addr = *portal_addrs
            .first()
            .ok_or_else(|| DaemonError::Protocol("portal endpoint resolved to no addresses".into()))?;
        let portal_listener = Listener::bind(portal_addr)?.listen(128)?;
        let portal_local = Endpoint::new(portal_listener.local_addr()?);

        let portal_also_channel = config.portal_channel_multiplicity();
        if let Some(n) = portal_also_channel {
            server_channels.push((portal_local, u64::from(n)));
        }
        bound.push(BoundListener {
            endpoint: portal_local,
            listener: portal_listener,
            allow_channel_role: portal_also_channel.is_some(),
        });

        for requested in &config.channels {
            let multiplicity = u64::from(requested.multiplicity().unwrap_or(1));
            let addrs = requested
                .resolve(0)
                .map_err(|err| DaemonError::Protocol(format!("resolving channel address: {err}")))?;
            for addr in addrs {
                let listener = Listener::bind(addr)?.listen(128)?;
                let local = Endpoint::new(listener.local_addr()?);
                server_channels.push((local, multiplicity));
                bound.push(BoundListener {
                    endpoint: local,
                    listener,
                    allow_channel_role: true,
                });
            }
        }

        let expected_channels = server_channels.iter().map(|(_, m)| m).sum();
        let ctx = Arc::new(DispatchContext {
            identity_map: Arc::new(IdentityMap::new()),
            server_channels,
            expected_channels,
        });

        Ok(Self {
            identity_map: Arc::clone(&ctx.identity_map),
            ctx,
            bound,
            exit_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The address the portal listener ended up bound to (useful when the
    /// configured port was `0`).
    #[must_use]
    pub fn portal_addr(&self) -> SocketAddr {
        self.bound[0].endpoint.addr()
    }

    /// Spawns one accept-loop thread per bound listener and returns
    /// immediately with their join handles; the caller decides whether to
    /// join them or let the process exit around them.
    #[must_use]
    pub fn serve(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.bound.len());
        for bound in self.bound {
            let ctx = Arc::clone(&self.ctx);
            let exit_requested = Arc::clone(&self.exit_requested);
            let allow_channel_role = bound.allow_channel_role;
            let endpoint = bound.endpoint;
            let listener = bound.listener;
            handles.push(std::thread::spawn(move || {
                accept_loop(listener, endpoint, allow_channel_role, ctx, exit_requested);
            }));
        }
        handles
    }

    /// A handle that [`Server::request_shutdown`] can be called on from a
    /// thread other than the one running [`Server::serve`]'s returned join
    /// handles — a signal handler, say.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            identity_map: Arc::clone(&self.identity_map),
            exit_requested: Arc::clone(&self.exit_requested),
            endpoints: self.bound.iter().map(|b| b.endpoint).collect(),
        }
    }

    /// Tears down every tracked transfer and marks the identity map closed
    /// to new portal connections. Equivalent to
    /// `self.shutdown_handle().request_shutdown()`; see that method for how
    /// blocked accept loops are woken.
    pub fn shutdown(&self) {
        self.shutdown_handle().request_shutdown();
    }
}

/// A cloneable, thread-safe way to ask a running [`Server`] to stop, kept
/// separate from `Server` itself since `serve()` consumes it.
#[derive(Clone)]
pub struct ShutdownHandle {
    identity_map: Arc<IdentityMap>,
    exit_requested: Arc<AtomicBool>,
    endpoints: Vec<Endpoint>,
}

impl ShutdownHandle {
    /// Disposes every tracked transfer, marks the identity map closed to
    /// new portal connections, and wakes every accept loop blocked in
    /// `accept()` by dialing its own listener once — the accept thread
    /// observes `exit_requested` immediately after that call returns and
    /// exits instead of dispatching the connection (spec §5: cancellation
    /// is "coarse", driven by closing/perturbing the sockets a blocked call
    /// is using).
    pub fn request_shutdown(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
        self.identity_map.shutdown();
        for endpoint in &self.endpoints {
            if let Ok(conn) = xcp_net::Connection::connect_tcp(endpoint.addr()) {
                conn.dispose();
            }
        }
    }
}

fn accept_loop(
    listener: Listener,
    endpoint: Endpoint,
    allow_channel_role: bool,
    ctx: Arc<DispatchContext>,
    exit_requested: Arc<AtomicBool>,
) {
    loop {
        match listener.accept() {
            Ok((conn, peer)) => {
                if exit_requested.load(Ordering::SeqCst) {
                    tracing::debug!(?endpoint, "shutdown requested, exiting accept loop");
                    conn.dispose();
                    return;
                }
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    tracing::debug!(%peer, "accepted connection");
                    dispatch::handle_accepted(conn, allow_channel_role, ctx);
                });
            }
            Err(err) => {
                if exit_requested.load(Ordering::SeqCst) {
                    return;
                }
                tracing::warn!(%err, ?endpoint, "accept failed, retrying");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use xcp_identity::RequestedEndpoint;

    fn loopback_config(channel_multiplicity: Option<u32>) -> ServerConfig {
        ServerConfig {
            portal: RequestedEndpoint::from_parts("127.0.0.1", Some(0), channel_multiplicity),
            channels: vec![RequestedEndpoint::from_parts("127.0.0.1", Some(0), Some(1))],
            verbosity: 0,
        }
    }

    #[test]
    fn binding_port_zero_assigns_a_real_port() {
        let server = Server::bind(&loopback_config(None)).unwrap();
        let addr = server.portal_addr();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn portal_reused_as_channel_is_advertised_in_server_channels() {
        let server = Server::bind(&loopback_config(Some(4))).unwrap();
        assert!(server
            .ctx
            .server_channels
            .iter()
            .any(|(ep, mult)| ep.addr() == server.portal_addr() && *mult == 4));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let server = Server::bind(&loopback_config(None)).unwrap();
        server.shutdown();
        server.shutdown();
    }

    #[test]
    fn shutdown_wakes_blocked_accept_loops() {
        let server = Server::bind(&loopback_config(None)).unwrap();
        let handle = server.shutdown_handle();
        let joins = server.serve();

        handle.request_shutdown();
        for join in joins {
            join.join().unwrap();
        }
    }
}
