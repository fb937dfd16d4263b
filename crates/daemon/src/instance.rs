//! A single client's server-side state: the transfer it is running, the
//! gates that order the portal and channel routines against each other, and
//! the teardown that cascades across all of them.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use xcp_engine::{EngineError, TransferDestination, TransferSource};
use xcp_identity::Identity;
use xcp_net::Connection;
use xcp_rundown::{Disposer, LazyGate, Rundown};

/// Either half of a transfer, dispatched to uniformly from the channel and
/// portal routines regardless of direction.
pub enum TransferKind {
    /// This server is sending file content (client requested
    /// `is_from_server_to_client = true`).
    Source(TransferSource),
    /// This server is receiving file content.
    Destination(TransferDestination),
}

impl TransferKind {
    /// Runs the block loop for one channel connection.
    pub fn invoke_channel(&self, conn: &Connection) -> Result<(), EngineError> {
        match self {
            Self::Source(s) => s.invoke_channel(conn),
            Self::Destination(d) => d.invoke_channel(conn),
        }
    }

    /// Runs the portal-side finish handshake.
    pub fn invoke_portal(&self, conn: &Connection) -> Result<(), EngineError> {
        match self {
            Self::Source(s) => s.invoke_portal(conn),
            Self::Destination(d) => d.invoke_portal(conn),
        }
    }
}

/// The final outcome of a transfer, set at most once by compare-and-swap
/// from [`TransferResult::Unknown`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TransferResult {
    /// Not yet determined.
    Unknown = 0,
    /// The transfer completed without error.
    Succeeded = 1,
    /// The transfer failed.
    Failed = 2,
}

struct ChannelHandle {
    conn: Arc<Connection>,
    handle: JoinHandle<()>,
}

/// One client's worth of server-side state, keyed by [`Identity`] in the
/// daemon's identity map.
pub struct ClientInstance {
    identity: Identity,
    channels_connected: LazyGate,
    portal_ready: LazyGate,
    disposer: Disposer,
    closing: AtomicBool,
    channels: Rundown<Vec<ChannelHandle>>,
    portal_conn: Mutex<Option<Arc<Connection>>>,
    result: AtomicU8,
    transfer: OnceLock<TransferKind>,
}

impl ClientInstance {
    /// Creates a new instance, initializing both gates immediately:
    /// `expected_channels` is known from the daemon's own listener
    /// configuration, not from anything the client has sent yet.
    #[must_use]
    pub fn new(identity: Identity, expected_channels: u64) -> Self {
        let channels_connected = LazyGate::uninit();
        channels_connected.init(expected_channels);
        let portal_ready = LazyGate::uninit();
        portal_ready.init(1);

        Self {
            identity,
            channels_connected,
            portal_ready,
            disposer: Disposer::new(),
            closing: AtomicBool::new(false),
            channels: Rundown::new(Vec::new()),
            portal_conn: Mutex::new(None),
            result: AtomicU8::new(TransferResult::Unknown as u8),
            transfer: OnceLock::new(),
        }
    }

    /// This instance's identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Records the portal connection so disposal can force-close it.
    pub fn set_portal_connection(&self, conn: Arc<Connection>) {
        *self.portal_conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn);
    }


    /// Installs the transfer this instance will run. Called exactly once,
    /// from the portal routine, before the "all channels connected" wait
    /// completes on the server side in practice (construction happens
    /// before the response is sent, per spec §5 ordering guarantee).
    pub fn set_transfer(&self, transfer: TransferKind) {
        let _ = self.transfer.set(transfer);
    }

    /// The installed transfer, if [`ClientInstance::set_transfer`] has run.
    #[must_use]
    pub fn transfer(&self) -> Option<&TransferKind> {
        self.transfer.get()
    }

    /// Registers a newly accepted channel connection and its worker thread,
    /// unless this instance is already being disposed — in which case the
    /// caller must close `conn` itself and not run the channel routine.
    #[must_use]
    pub fn try_register_channel(&self, conn: Arc<Connection>, handle: JoinHandle<()>) -> bool {
        match self.channels.acquire_unique() {
            Some(mut guard) => {
                guard.push(ChannelHandle { conn, handle });
                true
            }
            None => false,
        }
    }

    /// Signals that one channel connection has completed its handshake.
    pub fn signal_channel_connected(&self) {
        self.channels_connected.signal();
    }

    /// Blocks until every expected channel has connected.
    pub fn wait_all_channels_connected(&self) {
        self.channels_connected.wait();
    }

    /// Signals that the portal is ready for channels to begin transferring.
    pub fn signal_portal_ready(&self) {
        self.portal_ready.signal();
    }

    /// Blocks until the portal signals readiness, or disposal force-opens
    /// the gate early.
    pub fn wait_portal_ready(&self) {
        self.portal_ready.wait();
    }

    /// `true` once [`ClientInstance::dispose`] has begun.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Sets the final result if it has not already been set; later calls
    /// (from a different routine observing a different outcome) are
    /// ignored, matching spec §5's "compare-and-swap from unknown".
    pub fn set_result_if_unknown(&self, succeeded: bool) {
        let target = if succeeded {
            TransferResult::Succeeded
        } else {
            TransferResult::Failed
        };
        let _ = self.result.compare_exchange(
            TransferResult::Unknown as u8,
            target as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// The transfer's current result.
    #[must_use]
    pub fn result(&self) -> TransferResult {
        match self.result.load(Ordering::Acquire) {
            1 => TransferResult::Succeeded,
            2 => TransferResult::Failed,
            _ => TransferResult::Unknown,
        }
    }

    /// Spawns a detached thread that calls [`ClientInstance::dispose`].
    ///
    /// A channel thread that hits a transfer-loop error is itself one of
    /// the threads [`ClientInstance::dispose`] joins; calling `dispose`
    /// directly from there would join its own thread and deadlock. Spec
    /// §4.5's `async_dispose` exists for exactly this case.
    pub fn dispose_async(self: &Arc<Self>) {
        let instance = Arc::clone(self);
        std::thread::spawn(move || instance.dispose());
    }

    /// Tears this instance down: force-opens both gates so any thread
    /// blocked on them wakes, closes the portal and every channel socket,
    /// then joins every channel thread. Idempotent and safe to call from
    /// any thread, including one this instance itself owns.
    pub fn dispose(&self) {
        self.disposer.dispose(|| {
            self.closing.store(true, Ordering::Release);
            self.channels_connected.force_signal_all();
            self.portal_ready.force_signal_all();

            if let Some(conn) = self.portal_conn.lock().unwrap_or_else(|e| e.into_inner()).take() {
                conn.dispose();
            }

            let handles = {
                let mut guard = self.channels.begin();
                std::mem::take(&mut *guard)
            };
            for ch in &handles {
                ch.conn.dispose();
            }
            for ch in handles {
                let _ = ch.handle.join();
            }
            // The portal thread is not joined here: it is the thread that
            // most commonly calls `dispose()` itself (right after its
            // routine returns), and a thread cannot join itself.
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_is_set_once_by_compare_and_swap() {
        let instance = ClientInstance::new(Identity::new(), 0);
        assert_eq!(instance.result(), TransferResult::Unknown);
        instance.set_result_if_unknown(true);
        instance.set_result_if_unknown(false);
        assert_eq!(instance.result(), TransferResult::Succeeded);
    }

    #[test]
    fn zero_expected_channels_releases_the_gate_immediately() {
        let instance = ClientInstance::new(Identity::new(), 0);
        instance.wait_all_channels_connected();
    }

    #[test]
    fn dispose_is_idempotent_and_releases_waiters() {
        let instance = Arc::new(ClientInstance::new(Identity::new(), 5));
        let waiter = {
            let instance = Arc::clone(&instance);
            std::thread::spawn(move || instance.wait_all_channels_connected())
        };
        instance.dispose();
        instance.dispose();
        waiter.join().unwrap();
        assert!(instance.is_closing());
    }

    #[test]
    fn channel_registered_after_dispose_is_refused() {
        use std::net::Ipv4Addr;
        use xcp_net::{Connection, Listener};

        let listener = Listener::bind(std::net::SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
            .unwrap()
            .listen(16)
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Connection::connect_tcp(addr).unwrap();
        let (server, _peer) = listener.accept().unwrap();
        drop(client);

        let instance = Arc::new(ClientInstance::new(Identity::new(), 1));
        instance.dispose();
        let conn = Arc::new(server);
        let handle = std::thread::spawn(|| {});
        assert!(!instance.try_register_channel(conn, handle));
    }
}
