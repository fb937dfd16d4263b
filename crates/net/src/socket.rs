//! The blocking TCP connection and listener types.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::NetError;
use crate::sendfile;

/// How long [`Listener::accept`] callers should wait between accept
/// attempts when the OS reports a transient error (`EINTR`-class); kept
/// tiny since it only guards a retry loop, not real backoff.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(1);

fn configure_common(socket: &Socket) -> Result<(), NetError> {
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris")))]
    {
        // Not every Unix exposes SO_REUSEPORT; failing to set it is a
        // deployment nicety, not correctness, so this is best-effort.
        if let Err(err) = socket.set_reuse_port(true) {
            tracing::warn!(%err, "SO_REUSEPORT unavailable, continuing without it");
        }
    }
    socket.set_nodelay(true)?;
    socket.set_keepalive(true)?;
    Ok(())
}

fn enable_fast_open_listener(socket: &Socket) {
    #[cfg(target_os = "linux")]
    {
        // Queue length hint for the SYN-cookie-backed TFO pending-request
        // table; any positive value is fine since Linux clamps it.
        const QLEN: libc::c_int = 16;
        let rc = unsafe {
            libc::setsockopt(
                std::os::unix::io::AsRawFd::as_raw_fd(socket),
                libc::IPPROTO_TCP,
                libc::TCP_FASTOPEN,
                (&QLEN as *const libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            tracing::warn!(%err, "TCP_FASTOPEN unavailable on listener, continuing without it");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = socket;
    }
}

/// A bound, listening TCP socket.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds to `addr`. Configures `SO_REUSEADDR`/`SO_REUSEPORT` before
    /// binding so restarting the daemon on the same port doesn't race a
    /// lingering socket in `TIME_WAIT`. For IPv6 addresses, clears
    /// `IPV6_V6ONLY` so dual-stack clients can reach this listener over
    /// IPv4-mapped addresses too.
    pub fn bind(addr: SocketAddr) -> Result<Self, NetError> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        configure_common(&socket)?;
        if addr.is_ipv6() {
            if let Err(err) = socket.set_only_v6(false) {
                tracing::warn!(%err, "could not clear IPV6_V6ONLY, dual-stack disabled");
            }
        }
        socket.bind(&addr.into())?;
        Ok(Self { inner: socket.into() })
    }

    /// Starts listening with the given backlog and attempts to enable
    /// `TCP_FASTOPEN` (warn-only on failure).
    pub fn listen(self, backlog: i32) -> Result<Self, NetError> {
        let socket = Socket::from(self.inner);
        socket.listen(backlog)?;
        enable_fast_open_listener(&socket);
        Ok(Self { inner: socket.into() })
    }

    /// The address this listener is actually bound to (useful when the
    /// caller requested port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.inner.local_addr()?)
    }

    /// Blocks until a connection arrives, configuring it the same way an
    /// outbound [`Connection`] is configured.
    pub fn accept(&self) -> Result<(Connection, SocketAddr), NetError> {
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    let socket = Socket::from(stream);
                    configure_common(&socket)?;
                    return Ok((Connection { inner: socket.into() }, peer));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {
                    std::thread::sleep(ACCEPT_RETRY_DELAY);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// A connected TCP socket, configured with the same keepalive/Nagle/
/// reuse settings as every [`Listener`]-accepted connection.
pub struct Connection {
    inner: TcpStream,
}

impl Connection {
    /// Plain `connect()`, configuring the socket first.
    pub fn connect_tcp(addr: SocketAddr) -> Result<Self, NetError> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        configure_common(&socket)?;
        socket.connect(&addr.into())?;
        Ok(Self { inner: socket.into() })
    }

    /// Connects to `addr` and sends `bytes` as part of the handshake,
    /// preferring TCP Fast Open where the platform supports it and falling
    /// back transparently to `connect()` + [`Connection::send_all`] when it
    /// doesn't (unsupported kernel, disabled sysctl, or any other
    /// `EOPNOTSUPP`/`EINVAL`-class failure).
    pub fn connect_and_send(addr: SocketAddr, bytes: &[u8]) -> Result<Self, NetError> {
        #[cfg(target_os = "linux")]
        {
            if let Some(conn) = crate::fastopen::try_connect_and_send(addr, bytes)? {
                return Ok(conn);
            }
        }
        let conn = Self::connect_tcp(addr)?;
        conn.send_all(bytes)?;
        Ok(conn)
    }

    pub(crate) fn from_stream(inner: TcpStream) -> Self {
        Self { inner }
    }

    /// The address of the peer this connection is talking to.
    pub fn peer_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.inner.peer_addr()?)
    }

    /// Writes the entire buffer, looping past short writes the OS might
    /// otherwise hand back for a large blocking send.
    pub fn send_all(&self, mut buf: &[u8]) -> Result<(), NetError> {
        let mut stream = &self.inner;
        while !buf.is_empty() {
            match stream.write(buf) {
                Ok(0) => {
                    return Err(NetError::ShortWrite {
                        sent: 0,
                        expected: buf.len() as u64,
                    })
                }
                Ok(n) => buf = &buf[n..],
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Writes every buffer in `bufs` as a single vectored write
    /// (`writev`/`WSASend`). A partial completion — the OS accepting fewer
    /// bytes than the sum of all buffers without reporting an error — is a
    /// failure, not something this retries.
    pub fn send_vectored(&self, bufs: &[&[u8]]) -> Result<(), NetError> {
        let expected: usize = bufs.iter().map(|b| b.len()).sum();
        let io_slices: Vec<std::io::IoSlice<'_>> =
            bufs.iter().map(|b| std::io::IoSlice::new(b)).collect();
        let mut stream = &self.inner;
        loop {
            match stream.write_vectored(&io_slices) {
                Ok(n) if n == expected => return Ok(()),
                Ok(n) => {
                    return Err(NetError::ShortWrite {
                        sent: n as u64,
                        expected: expected as u64,
                    })
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Sends `length` bytes of `file` starting at `offset` using the
    /// kernel's zero-copy path (`sendfile` on Linux, a portable read/send
    /// loop elsewhere), optionally preceded by `header`. The total bytes
    /// written must equal `header.len() + length`; any mismatch is a
    /// [`NetError::ShortWrite`].
    pub fn send_file(
        &self,
        file: &std::fs::File,
        offset: u64,
        length: u64,
        header: Option<&[u8]>,
    ) -> Result<(), NetError> {
        sendfile::send_file(&self.inner, file, offset, length, header)
    }

    /// Reads exactly `buf.len()` bytes, blocking until they arrive or the
    /// connection closes/errors.
    pub fn recv_exact(&self, mut buf: &mut [u8]) -> Result<(), NetError> {
        let mut stream = &self.inner;
        while !buf.is_empty() {
            match stream.read(buf) {
                Ok(0) => {
                    return Err(NetError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "peer closed connection before sending all expected bytes",
                    )))
                }
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Half-shuts-down then lets `Drop` close the descriptor. Idempotent
    /// and safe to call concurrently with a blocking call on another
    /// thread: that call observes the shutdown and returns an error rather
    /// than blocking forever.
    pub fn dispose(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Both) {
            tracing::debug!(%err, "socket shutdown returned an error (likely already closed)");
        }
    }
}

impl Read for &Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&self.inner).read(buf)
    }
}

impl Write for &Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&self.inner).write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        (&self.inner).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback_pair() -> (Listener, Connection, Connection) {
        let listener = Listener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
            .unwrap()
            .listen(16)
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Connection::connect_tcp(addr).unwrap();
        let (server, _peer) = listener.accept().unwrap();
        (listener, client, server)
    }

    #[test]
    fn send_all_and_recv_exact_round_trip() {
        let (_listener, client, server) = loopback_pair();
        client.send_all(b"hello, channel").unwrap();
        let mut buf = [0u8; 14];
        server.recv_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello, channel");
    }

    #[test]
    fn send_vectored_concatenates_buffers() {
        let (_listener, client, server) = loopback_pair();
        client.send_vectored(&[b"abc", b"defg"]).unwrap();
        let mut buf = [0u8; 7];
        server.recv_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcdefg");
    }

    #[test]
    fn recv_exact_reports_eof_as_error() {
        let (_listener, client, server) = loopback_pair();
        drop(client);
        let mut buf = [0u8; 4];
        assert!(server.recv_exact(&mut buf).is_err());
    }

    #[test]
    fn dispose_is_idempotent() {
        let (_listener, client, _server) = loopback_pair();
        client.dispose();
        client.dispose();
    }

    #[test]
    fn listener_local_addr_reports_assigned_port() {
        let listener = Listener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
            .unwrap()
            .listen(16)
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
