//! Adapts [`Connection`]'s `&self`-based blocking I/O to the
//! [`std::io::Read`]/[`std::io::Write`] traits `xcp_wire::Message` is
//! generic over.

use std::io;

use xcp_net::{Connection, NetError};

fn net_err_to_io(err: NetError) -> io::Error {
    match err {
        NetError::Io(io_err) => io_err,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Reads framed messages off a [`Connection`].
pub struct ConnReader<'a>(pub &'a Connection);

impl io::Read for ConnReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv_exact(buf).map_err(net_err_to_io)?;
        Ok(buf.len())
    }
}

/// Writes framed messages to a [`Connection`] using a single
/// [`Connection::send_all`] call per `write`.
pub struct ConnWriter<'a>(pub &'a Connection);

impl io::Write for ConnWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.send_all(buf).map_err(net_err_to_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
