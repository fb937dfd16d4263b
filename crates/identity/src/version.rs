/// A 16-bit negotiated protocol version.
///
/// `0` is reserved by the wire protocol to mean "negotiation failed"; it is
/// never produced by a successful handshake.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    /// Sentinel sent back when no overlapping version exists.
    pub const INVALID: Self = Self(0);

    /// The only protocol version this workspace implements today. Future
    /// versions are anticipated, hence the negotiation machinery in
    /// `xcp-daemon`/`xcp-client` rather than a hardcoded constant.
    pub const V1: Self = Self(1);

    /// The lowest version this build supports.
    pub const MIN_SUPPORTED: Self = Self::V1;
    /// The highest version this build supports.
    pub const MAX_SUPPORTED: Self = Self::V1;

    /// Wraps a raw version number read from the wire.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw 16-bit value to place on the wire.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if this is the [`ProtocolVersion::INVALID`] sentinel.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }

    /// Negotiates a version given both sides' supported `[min, max]` ranges.
    ///
    /// Returns [`ProtocolVersion::INVALID`] when the ranges do not overlap,
    /// or when either side reports an inverted range (`min > max`).
    #[must_use]
    pub fn negotiate(
        server_min: Self,
        server_max: Self,
        client_min: Self,
        client_max: Self,
    ) -> Self {
        if server_min > server_max || client_min > client_max {
            return Self::INVALID;
        }
        let lo = server_min.max(client_min);
        let hi = server_max.min(client_max);
        if lo > hi {
            Self::INVALID
        } else {
            hi
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProtocolVersion as V;

    #[test]
    fn negotiates_to_the_higher_of_the_overlap() {
        let chosen = V::negotiate(V::from_raw(1), V::from_raw(3), V::from_raw(2), V::from_raw(5));
        assert_eq!(chosen, V::from_raw(3));
    }

    #[test]
    fn disjoint_ranges_fail() {
        let chosen = V::negotiate(V::from_raw(1), V::from_raw(1), V::from_raw(2), V::from_raw(2));
        assert!(chosen.is_invalid());
    }

    #[test]
    fn inverted_range_fails() {
        let chosen = V::negotiate(V::from_raw(2), V::from_raw(1), V::from_raw(1), V::from_raw(5));
        assert!(chosen.is_invalid());
    }

    #[test]
    fn matches_single_supported_version() {
        let chosen = V::negotiate(V::V1, V::V1, V::MIN_SUPPORTED, V::MAX_SUPPORTED);
        assert_eq!(chosen, V::V1);
    }
}
