use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// Size in bytes of a client [`Identity`] on the wire.
pub const IDENTITY_LEN: usize = 16;

/// A 16-byte opaque token that names one client's transfer for the lifetime
/// of a server process.
///
/// The first 8 bytes are a monotonic timestamp (nanoseconds since the first
/// call to [`Identity::new`] in this process); the last 8 bytes are random.
/// Neither half is meaningful on its own — callers must treat the whole
/// value as an opaque byte string, compared and hashed byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    /// Mints a fresh identity using the process-monotonic clock and the
    /// thread-local random number generator.
    #[must_use]
    pub fn new() -> Self {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        let nanos = epoch.elapsed().as_nanos() as u64;

        let mut bytes = [0u8; IDENTITY_LEN];
        bytes[..8].copy_from_slice(&nanos.to_be_bytes());
        bytes[8..].copy_from_slice(&rand::random::<u64>().to_be_bytes());
        Self(bytes)
    }

    /// Wraps a raw 16-byte token received from the wire.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes to place on the wire.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_identities_are_distinct() {
        let a = Identity::new();
        let b = Identity::new();
        assert_ne!(a, b, "two freshly minted identities should never collide");
    }

    #[test]
    fn round_trips_through_bytes() {
        let a = Identity::new();
        let bytes = *a.as_bytes();
        let b = Identity::from_bytes(bytes);
        assert_eq!(a, b);
    }

    #[test]
    fn hashes_are_stable_for_equal_values() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let id = Identity::new();
        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        id.hash(&mut h1);
        id.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }
}
