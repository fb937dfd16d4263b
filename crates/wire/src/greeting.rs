//! The fixed-magic preamble that opens every portal and channel connection.

use std::io::{self, Read, Write};

use xcp_identity::{Identity, ProtocolVersion};

/// First magic word every connection must present, byte-for-byte.
pub const GREETING_MAGIC_1: u32 = 0x31c1_b3f6;
/// Second magic word every connection must present, byte-for-byte.
pub const GREETING_MAGIC_2: u32 = 0xe5fd_020e;

const ROLE_PORTAL: u32 = 0x8739_e779;
const ROLE_CHANNEL: u32 = 0x7fbc_389b;

/// The role a connection announces itself as immediately after the magics.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    /// The control connection for a transfer.
    Portal,
    /// A data connection for a transfer.
    Channel,
}

impl Role {
    fn as_raw(self) -> u32 {
        match self {
            Role::Portal => ROLE_PORTAL,
            Role::Channel => ROLE_CHANNEL,
        }
    }

    /// Maps a raw role word to a [`Role`], or `None` if it matches neither
    /// fixed constant.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            ROLE_PORTAL => Some(Role::Portal),
            ROLE_CHANNEL => Some(Role::Channel),
            _ => None,
        }
    }
}

fn write_magics_and_role(w: &mut impl Write, role: Role) -> io::Result<()> {
    w.write_all(&GREETING_MAGIC_1.to_be_bytes())?;
    w.write_all(&GREETING_MAGIC_2.to_be_bytes())?;
    w.write_all(&role.as_raw().to_be_bytes())
}

/// Reads and validates the 12-byte `[magic1][magic2][role]` preamble common
/// to both portal and channel connections.
///
/// Returns the raw role word so the caller can decide whether it is allowed
/// on this listener (spec §4.4: a channel listener only accepts
/// `ROLE_CHANNEL`; the portal listener may accept both when configured to
/// also serve as a channel).
pub fn read_magics_and_role(r: &mut impl Read) -> io::Result<u32> {
    let mut hdr = [0u8; 12];
    r.read_exact(&mut hdr)?;
    let magic1 = u32::from_be_bytes(hdr[0..4].try_into().unwrap());
    let magic2 = u32::from_be_bytes(hdr[4..8].try_into().unwrap());
    if magic1 != GREETING_MAGIC_1 || magic2 != GREETING_MAGIC_2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "greeting magic mismatch",
        ));
    }
    Ok(u32::from_be_bytes(hdr[8..12].try_into().unwrap()))
}

/// The full preamble sent by a client opening the portal connection:
/// magics, `ROLE_PORTAL`, its identity, and its supported version range.
#[derive(Clone, Copy, Debug)]
pub struct PortalGreeting {
    /// The identity naming this client's transfer.
    pub identity: Identity,
    /// Lowest protocol version the client supports.
    pub min_version: ProtocolVersion,
    /// Highest protocol version the client supports.
    pub max_version: ProtocolVersion,
}

impl PortalGreeting {
    /// Serializes the full preamble (magics through version range) into one
    /// contiguous buffer, suitable for a single `send_all`/vectored write.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + 16 + 4);
        buf.extend_from_slice(&GREETING_MAGIC_1.to_be_bytes());
        buf.extend_from_slice(&GREETING_MAGIC_2.to_be_bytes());
        buf.extend_from_slice(&Role::Portal.as_raw().to_be_bytes());
        buf.extend_from_slice(self.identity.as_bytes());
        buf.extend_from_slice(&self.min_version.as_raw().to_be_bytes());
        buf.extend_from_slice(&self.max_version.as_raw().to_be_bytes());
        buf
    }

    /// Writes the preamble to `w` in one call.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Reads the identity and version range that follow an
    /// already-validated `[magics][ROLE_PORTAL]` prefix.
    pub fn read_after_role(r: &mut impl Read) -> io::Result<(Identity, ProtocolVersion, ProtocolVersion)> {
        let mut id_bytes = [0u8; 16];
        r.read_exact(&mut id_bytes)?;
        let mut ver_bytes = [0u8; 4];
        r.read_exact(&mut ver_bytes)?;
        let min = ProtocolVersion::from_raw(u16::from_be_bytes(ver_bytes[0..2].try_into().unwrap()));
        let max = ProtocolVersion::from_raw(u16::from_be_bytes(ver_bytes[2..4].try_into().unwrap()));
        Ok((Identity::from_bytes(id_bytes), min, max))
    }
}

/// The preamble sent by a client opening a channel connection: magics,
/// `ROLE_CHANNEL`, and its identity (no version range — the portal already
/// negotiated one for this client).
#[derive(Clone, Copy, Debug)]
pub struct ChannelGreeting {
    /// The identity naming this client's transfer.
    pub identity: Identity,
}

impl ChannelGreeting {
    /// Serializes the full preamble into one contiguous buffer.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + 16);
        buf.extend_from_slice(&GREETING_MAGIC_1.to_be_bytes());
        buf.extend_from_slice(&GREETING_MAGIC_2.to_be_bytes());
        buf.extend_from_slice(&Role::Channel.as_raw().to_be_bytes());
        buf.extend_from_slice(self.identity.as_bytes());
        buf
    }

    /// Writes the preamble to `w` in one call.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Reads the identity that follows an already-validated
    /// `[magics][ROLE_CHANNEL]` prefix.
    pub fn read_after_role(r: &mut impl Read) -> io::Result<Identity> {
        let mut id_bytes = [0u8; 16];
        r.read_exact(&mut id_bytes)?;
        Ok(Identity::from_bytes(id_bytes))
    }
}

// Kept so `write_magics_and_role` is exercised directly by tests even though
// `PortalGreeting`/`ChannelGreeting` inline the same bytes for a single
// contiguous write.
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::from_raw(ROLE_PORTAL), Some(Role::Portal));
        assert_eq!(Role::from_raw(ROLE_CHANNEL), Some(Role::Channel));
        assert_eq!(Role::from_raw(0), None);
    }

    #[test]
    fn portal_greeting_round_trips() {
        let greeting = PortalGreeting {
            identity: Identity::new(),
            min_version: ProtocolVersion::V1,
            max_version: ProtocolVersion::V1,
        };
        let bytes = greeting.to_bytes();
        let mut cursor = Cursor::new(bytes);
        let role = read_magics_and_role(&mut cursor).unwrap();
        assert_eq!(Role::from_raw(role), Some(Role::Portal));
        let (id, min, max) = PortalGreeting::read_after_role(&mut cursor).unwrap();
        assert_eq!(id, greeting.identity);
        assert_eq!(min, ProtocolVersion::V1);
        assert_eq!(max, ProtocolVersion::V1);
    }

    #[test]
    fn channel_greeting_round_trips() {
        let greeting = ChannelGreeting {
            identity: Identity::new(),
        };
        let bytes = greeting.to_bytes();
        let mut cursor = Cursor::new(bytes);
        let role = read_magics_and_role(&mut cursor).unwrap();
        assert_eq!(Role::from_raw(role), Some(Role::Channel));
        let id = ChannelGreeting::read_after_role(&mut cursor).unwrap();
        assert_eq!(id, greeting.identity);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&ROLE_PORTAL.to_be_bytes());
        let mut cursor = Cursor::new(bytes);
        assert!(read_magics_and_role(&mut cursor).is_err());
    }

    #[test]
    fn write_magics_and_role_matches_greeting_prefix() {
        let mut buf = Vec::new();
        write_magics_and_role(&mut buf, Role::Channel).unwrap();
        assert_eq!(&buf[..], &ChannelGreeting {
            identity: Identity::from_bytes([0; 16]),
        }
        .to_bytes()[..12]);
    }
}
