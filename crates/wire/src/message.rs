//! The four framed control messages exchanged over the portal connection,
//! and the `[type u32][length u32][payload]` envelope they travel in.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use xcp_identity::Endpoint;

use crate::codec::{Reader, Writer};
use crate::WireError;

/// Discriminant placed in the frame header ahead of every message payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum MessageType {
    /// [`ServerInformation`].
    ServerInformation = 0,
    /// [`ClientTransferRequest`].
    ClientTransferRequest = 1,
    /// [`ServerTransferResponse`].
    ServerTransferResponse = 2,
    /// [`TransferDestinationFinished`].
    TransferDestinationFinished = 3,
}

impl MessageType {
    fn as_raw(self) -> u32 {
        self as u32
    }
}

/// A control message that can be framed and sent over the portal
/// connection.
pub trait Message: Sized {
    /// The discriminant this message is framed with.
    const TYPE: MessageType;

    /// Serializes the payload (not including the frame header).
    fn encode(&self, w: &mut Writer);

    /// Deserializes the payload (not including the frame header).
    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError>;

    /// Encodes the full frame (`[type][length][payload]`) and writes it to
    /// `w` in a single call.
    fn send(&self, w: &mut impl Write) -> Result<(), WireError> {
        let mut payload = Writer::new();
        self.encode(&mut payload);
        let payload = payload.into_bytes();

        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&Self::TYPE.as_raw().to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        w.write_all(&frame)?;
        Ok(())
    }

    /// Reads one frame from `r`, verifying the header's type matches
    /// [`Message::TYPE`], and decodes the payload. A type mismatch or
    /// oversized length prefix is a [`WireError`], not a skip.
    fn recv(r: &mut impl Read) -> Result<Self, WireError> {
        let mut header = [0u8; 8];
        r.read_exact(&mut header)?;
        let actual_type = u32::from_be_bytes(header[0..4].try_into().unwrap());
        if actual_type != Self::TYPE.as_raw() {
            return Err(WireError::UnexpectedType {
                expected: Self::TYPE,
                actual: actual_type,
            });
        }
        let len = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if len > crate::codec::MAX_LENGTH {
            return Err(WireError::Decode(format!(
                "frame length {len} exceeds maximum of {}",
                crate::codec::MAX_LENGTH
            )));
        }
        let mut payload = vec![0u8; len as usize];
        r.read_exact(&mut payload)?;
        let mut reader = Reader::new(&payload);
        Self::decode(&mut reader)
    }
}

fn write_endpoint(w: &mut Writer, ep: &Endpoint) {
    match ep.addr().ip() {
        IpAddr::V4(v4) => {
            w.write_bool(false);
            w.buf_extend(&v4.octets());
        }
        IpAddr::V6(v6) => {
            w.write_bool(true);
            w.buf_extend(&v6.octets());
        }
    }
    w.write_u16(ep.port());
}

fn read_endpoint(r: &mut Reader<'_>) -> Result<Endpoint, WireError> {
    let is_v6 = r.read_bool()?;
    let ip = if is_v6 {
        let mut octets = [0u8; 16];
        r.read_into(&mut octets)?;
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        let mut octets = [0u8; 4];
        r.read_into(&mut octets)?;
        IpAddr::V4(Ipv4Addr::from(octets))
    };
    let port = r.read_u16()?;
    Ok(Endpoint::new(SocketAddr::new(ip, port)))
}

/// `{ relative_path, size, posix_perm }` — one regular file in a transfer
/// manifest. `posix_perm == 0` means "apply the default 0644".
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BasicFileInfo {
    /// POSIX-style path, relative to the transfer root.
    pub relative_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Low 12 bits of the POSIX permission mode; `0` means "use 0644".
    pub posix_perm: u16,
}

/// `{ relative_path, posix_perm }` — one directory in a transfer manifest.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BasicDirInfo {
    /// POSIX-style path, relative to the transfer root.
    pub relative_path: String,
    /// Low 12 bits of the POSIX permission mode.
    pub posix_perm: u16,
}

/// The full manifest of a transfer: whether the root is a directory, its
/// directory entries (root first, if a directory), and its file entries.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TransferInfo {
    /// `true` if the transfer root is a directory tree rather than a single
    /// file.
    pub source_is_directory: bool,
    /// Directory entries, root-first when `source_is_directory` is set.
    pub directories: Vec<BasicDirInfo>,
    /// File entries.
    pub files: Vec<BasicFileInfo>,
}

impl TransferInfo {
    fn encode(&self, w: &mut Writer) {
        w.write_bool(self.source_is_directory);
        w.write_seq(&self.directories, |w, d| {
            w.write_string(&d.relative_path);
            w.write_u16(d.posix_perm);
        });
        w.write_seq(&self.files, |w, f| {
            w.write_string(&f.relative_path);
            w.write_u64(f.size);
            w.write_u16(f.posix_perm);
        });
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let source_is_directory = r.read_bool()?;
        let directories = r.read_seq(|r| {
            Ok(BasicDirInfo {
                relative_path: r.read_string()?,
                posix_perm: r.read_u16()?,
            })
        })?;
        let files = r.read_seq(|r| {
            Ok(BasicFileInfo {
                relative_path: r.read_string()?,
                size: r.read_u64()?,
                posix_perm: r.read_u16()?,
            })
        })?;
        Ok(Self {
            source_is_directory,
            directories,
            files,
        })
    }
}

/// The requesting user's identity, forwarded so the server can resolve a
/// relative `server_path` against that user's home directory.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct UserInfo {
    /// Unix-style user name, if known.
    pub user_name: String,
    /// Windows-style `DOMAIN\user` name, if known.
    pub domain_user_name: String,
    /// Windows SID string, if known.
    pub user_sid: String,
}

/// Sent by the server after version negotiation: every channel endpoint it
/// listens on, and how many channels the client should open to each.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ServerInformation {
    /// `(endpoint, multiplicity)` pairs, one per configured channel
    /// listener (including the portal endpoint, if it is also configured to
    /// accept channels).
    pub server_channels: Vec<(Endpoint, u64)>,
}

impl Message for ServerInformation {
    const TYPE: MessageType = MessageType::ServerInformation;

    fn encode(&self, w: &mut Writer) {
        w.write_seq(&self.server_channels, |w, (ep, mult)| {
            write_endpoint(w, ep);
            w.write_u64(*mult);
        });
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let server_channels = r.read_seq(|r| {
            let ep = read_endpoint(r)?;
            let mult = r.read_u64()?;
            Ok((ep, mult))
        })?;
        Ok(Self { server_channels })
    }
}

/// Sent by the client once all channels are open, describing the transfer
/// it wants performed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClientTransferRequest {
    /// `true` for server→client (download), `false` for client→server
    /// (upload).
    pub is_from_server_to_client: bool,
    /// The path on the server, possibly relative to the requested user's
    /// home directory.
    pub server_path: String,
    /// `0` for adaptive sizing, otherwise a fixed block size in bytes.
    pub transfer_block_size: u64,
    /// Whether `server_path` may be a directory.
    pub is_recursive: bool,
    /// The user whose home directory anchors a relative `server_path`.
    pub user: UserInfo,
    /// The source manifest, present iff this is an upload
    /// (`!is_from_server_to_client`).
    pub transfer_info: Option<TransferInfo>,
}

impl Message for ClientTransferRequest {
    const TYPE: MessageType = MessageType::ClientTransferRequest;

    fn encode(&self, w: &mut Writer) {
        w.write_bool(self.is_from_server_to_client);
        w.write_string(&self.server_path);
        w.write_u64(self.transfer_block_size);
        w.write_bool(self.is_recursive);
        w.write_string(&self.user.user_name);
        w.write_string(&self.user.domain_user_name);
        w.write_string(&self.user.user_sid);
        w.write_option(&self.transfer_info, |w, info| info.encode(w));
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let is_from_server_to_client = r.read_bool()?;
        let server_path = r.read_string()?;
        let transfer_block_size = r.read_u64()?;
        let is_recursive = r.read_bool()?;
        let user = UserInfo {
            user_name: r.read_string()?,
            domain_user_name: r.read_string()?,
            user_sid: r.read_string()?,
        };
        let transfer_info = r.read_option(TransferInfo::decode)?;
        Ok(Self {
            is_from_server_to_client,
            server_path,
            transfer_block_size,
            is_recursive,
            user,
            transfer_info,
        })
    }
}

/// Sent by the server in reply to [`ClientTransferRequest`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerTransferResponse {
    /// `0` on success; an `errno`-style code on failure.
    pub error_code: i32,
    /// Human-readable detail, always present, empty on success.
    pub error_message: String,
    /// The manifest the client needs, present iff this is a download
    /// (`is_from_server_to_client`) and `error_code == 0`.
    pub transfer_info: Option<TransferInfo>,
}

impl Message for ServerTransferResponse {
    const TYPE: MessageType = MessageType::ServerTransferResponse;

    fn encode(&self, w: &mut Writer) {
        w.write_i32(self.error_code);
        w.write_string(&self.error_message);
        w.write_option(&self.transfer_info, |w, info| info.encode(w));
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            error_code: r.read_i32()?,
            error_message: r.read_string()?,
            transfer_info: r.read_option(TransferInfo::decode)?,
        })
    }
}

/// Sent by the destination-side portal once every channel has finished.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransferDestinationFinished {
    /// `0` on success; non-zero propagates a failure to the source side.
    pub error_code: i32,
    /// Human-readable detail, always present, empty on success.
    pub error_message: String,
}

impl Message for TransferDestinationFinished {
    const TYPE: MessageType = MessageType::TransferDestinationFinished;

    fn encode(&self, w: &mut Writer) {
        w.write_i32(self.error_code);
        w.write_string(&self.error_message);
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            error_code: r.read_i32()?,
            error_message: r.read_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip<M: Message + PartialEq + std::fmt::Debug>(msg: M) {
        let mut buf = Vec::new();
        msg.send(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = M::recv(&mut cursor).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn server_information_round_trips() {
        round_trip(ServerInformation {
            server_channels: vec![
                (Endpoint::new("10.0.0.1:9000".parse().unwrap()), 8),
                (Endpoint::new("[::1]:9001".parse().unwrap()), 1),
            ],
        });
    }

    #[test]
    fn client_transfer_request_round_trips_with_manifest() {
        round_trip(ClientTransferRequest {
            is_from_server_to_client: false,
            server_path: "reports/q3.dat".to_string(),
            transfer_block_size: 0,
            is_recursive: true,
            user: UserInfo {
                user_name: "alice".to_string(),
                domain_user_name: String::new(),
                user_sid: String::new(),
            },
            transfer_info: Some(TransferInfo {
                source_is_directory: true,
                directories: vec![BasicDirInfo {
                    relative_path: "reports".to_string(),
                    posix_perm: 0o755,
                }],
                files: vec![BasicFileInfo {
                    relative_path: "reports/q3.dat".to_string(),
                    size: 4096,
                    posix_perm: 0,
                }],
            }),
        });
    }

    #[test]
    fn server_transfer_response_round_trips_without_manifest() {
        round_trip(ServerTransferResponse {
            error_code: 22,
            error_message: "invalid argument".to_string(),
            transfer_info: None,
        });
    }

    #[test]
    fn transfer_destination_finished_round_trips() {
        round_trip(TransferDestinationFinished {
            error_code: 0,
            error_message: String::new(),
        });
    }

    #[test]
    fn mismatched_message_type_is_rejected() {
        let mut buf = Vec::new();
        TransferDestinationFinished {
            error_code: 0,
            error_message: String::new(),
        }
        .send(&mut buf)
        .unwrap();
        let mut cursor = Cursor::new(buf);
        let err = ServerInformation::recv(&mut cursor).unwrap_err();
        assert!(matches!(err, WireError::UnexpectedType { .. }));
    }
}
