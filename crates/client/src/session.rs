//! A single transfer's client-side state: the channel connections this
//! client opened, the gate that orders them against the portal routine, and
//! the teardown that cascades across both.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use xcp_engine::{EngineError, TransferDestination, TransferSource};
use xcp_identity::Identity;
use xcp_net::Connection;
use xcp_rundown::{Disposer, LazyGate, Rundown};

/// Either half of a transfer, dispatched to uniformly from the channel and
/// portal routines regardless of direction.
pub enum ClientTransferKind {
    /// This client is receiving file content (download).
    Destination(TransferDestination),
    /// This client is sending file content (upload).
    Source(TransferSource),
}

impl ClientTransferKind {
    /// Runs the block loop for one channel connection.
    pub fn invoke_channel(&self, conn: &Connection) -> Result<(), EngineError> {
        match self {
            Self::Destination(d) => d.invoke_channel(conn),
            Self::Source(s) => s.invoke_channel(conn),
        }
    }

    /// Runs the portal-side finish handshake.
    pub fn invoke_portal(&self, conn: &Connection) -> Result<(), EngineError> {
        match self {
            Self::Destination(d) => d.invoke_portal(conn),
            Self::Source(s) => s.invoke_portal(conn),
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

/// One transfer's worth of client-side state.
///
/// Unlike the daemon's `ClientInstance`, there is no "all channels
/// connected" gate here: the portal routine itself opens every channel
/// connection synchronously, so by the time it signals
/// `portal_ready` every channel thread already exists and is simply
/// blocked waiting on that gate.
pub struct ClientSession {
    identity: Identity,
    portal_ready: LazyGate,
    disposer: Disposer,
    closing: AtomicBool,
    channels: Rundown<Vec<ChannelHandle>>,
    portal_conn: std::sync::Mutex<Option<Arc<Connection>>>,
    result: AtomicU8,
    transfer: OnceLock<ClientTransferKind>,
}

impl ClientSession {
    /// Creates a new session for `identity`, with the portal-ready gate
    /// initialized to release after a single signal.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        let portal_ready = LazyGate::uninit();
        portal_ready.init(1);

        Self {
            identity,
            portal_ready,
            disposer: Disposer::new(),
            closing: AtomicBool::new(false),
            channels: Rundown::new(Vec::new()),
            portal_conn: std::sync::Mutex::new(None),
            result: AtomicU8::new(TransferResult::Unknown as u8),
            transfer: OnceLock::new(),
        }
    }

    /// This session's identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Records the portal connection so disposal can force-close it.
    pub fn set_portal_connection(&self, conn: Arc<Connection>) {
        *self.portal_conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn);
    }

    /// Installs the transfer this session will run. Called exactly once,
    /// from the portal routine, before any channel's `invoke_channel` runs.
    pub fn set_transfer(&self, transfer: ClientTransferKind) {
        let _ = self.transfer.set(transfer);
    }

    /// The installed transfer, if [`ClientSession::set_transfer`] has run.
    #[must_use]
    pub fn transfer(&self) -> Option<&ClientTransferKind> {
        self.transfer.get()
    }

    /// Registers a newly opened channel connection and its worker thread,
    /// unless this session is already being disposed — in which case the
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

    /// Signals that the portal is ready for channels to begin transferring.
    pub fn signal_portal_ready(&self) {
        self.portal_ready.signal();
    }

    /// Blocks until the portal signals readiness, or disposal force-opens
    /// the gate early.
    pub fn wait_portal_ready(&self) {
        self.portal_ready.wait();
    }

    /// `true` once [`ClientSession::dispose`] has begun.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Sets the final result if it has not already been set; later calls
    /// (from a different routine observing a different outcome) are
    /// ignored: the result is a compare-and-swap from unknown, not a
    /// last-write-wins value.
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

    /// Spawns a detached thread that calls [`ClientSession::dispose`].
    ///
    /// A channel thread that hits a transfer-loop error is itself one of
    /// the threads [`ClientSession::dispose`] joins; calling `dispose`
    /// directly from there would join its own thread and deadlock.
    pub fn dispose_async(self: &Arc<Self>) {
        let session = Arc::clone(self);
        std::thread::spawn(move || session.dispose());
    }

    /// Tears this session down: force-opens the portal-ready gate so any
    /// channel thread blocked on it wakes, closes the portal and every
    /// channel socket, then joins every channel thread. Idempotent and safe
    /// to call from any thread, including one this session itself owns.
    pub fn dispose(&self) {
        self.disposer.dispose(|| {
            self.closing.store(true, Ordering::Release);
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
            // The calling thread is usually the portal routine itself, so
            // like the daemon's instance it is not joined here.
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_is_set_once_by_compare_and_swap() {
        let session = ClientSession::new(Identity::new());
        assert_eq!(session.result(), TransferResult::Unknown);
        session.set_result_if_unknown(true);
        session.set_result_if_unknown(false);
        assert_eq!(session.result(), TransferResult::Succeeded);
    }

    #[test]
    fn dispose_is_idempotent_and_releases_waiters() {
        let session = Arc::new(ClientSession::new(Identity::new()));
        let waiter = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.wait_portal_ready())
        };
        session.dispose();
        session.dispose();
        waiter.join().unwrap();
        assert!(session.is_closing());
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

        let session = Arc::new(ClientSession::new(Identity::new()));
        session.dispose();
        let conn = Arc::new(server);
        let handle = std::thread::spawn(|| {});
        assert!(!session.try_register_channel(conn, handle));
    }
}
