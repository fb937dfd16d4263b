use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// A resolved IPv4 or IPv6 socket address, with the helpers the session
/// layer needs beyond what [`SocketAddr`] itself offers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Wraps an already-resolved address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Returns the underlying [`SocketAddr`].
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.0
    }

    /// Returns the port component.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns `true` for the "unspecified address" wildcards `0.0.0.0` and
    /// `::`, which the client must rewrite to the portal's observed peer
    /// address before dialing a channel.
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.0.ip().is_unspecified()
    }

    /// Returns this endpoint with its address replaced by `peer_ip` when
    /// [`Self::is_unspecified`] is true, keeping the original port. Used by
    /// the client portal routine to turn a server's advertised "any
    /// address" channel endpoint into something dialable.
    #[must_use]
    pub fn resolved_against(&self, peer_ip: IpAddr) -> Self {
        if self.is_unspecified() {
            Self(SocketAddr::new(peer_ip, self.port()))
        } else {
            *self
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// An endpoint as requested on the command line, before DNS resolution:
/// `host[:port][@multiplicity]`.
///
/// `port = None` or `Some(0)` both mean "let the OS pick a port" for a
/// listener, or "use the caller-supplied default" for a dial target.
/// `multiplicity = None` means "one channel per resolved address".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestedEndpoint {
    host: String,
    port: Option<u16>,
    multiplicity: Option<u32>,
}

/// Failure parsing a `host[:port][@multiplicity]` endpoint string.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointParseError {
    /// The string was empty.
    #[error("endpoint string is empty")]
    Empty,
    /// The `@multiplicity` suffix was not a positive integer.
    #[error("invalid channel multiplicity {0:?}")]
    InvalidMultiplicity(String),
    /// The `:port` suffix was not a valid `u16`.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    /// A `[...]` bracketed host had no closing bracket.
    #[error("unterminated bracketed host in {0:?}")]
    UnterminatedBracket(String),
    /// The host portion was empty.
    #[error("empty host in {0:?}")]
    EmptyHost(String),
}

impl RequestedEndpoint {
    /// Parses `host[:port][@multiplicity]`, e.g. `127.0.0.1:0@8`,
    /// `[::]:62581`, or `storage-01`.
    pub fn parse(input: &str) -> Result<Self, EndpointParseError> {
        if input.is_empty() {
            return Err(EndpointParseError::Empty);
        }

        let (rest, multiplicity) = match input.rsplit_once('@') {
            Some((head, tail)) => {
                let n = tail
                    .parse::<u32>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| EndpointParseError::InvalidMultiplicity(tail.to_string()))?;
                (head, Some(n))
            }
            None => (input, None),
        };

        let (host, port) = if let Some(bracket_rest) = rest.strip_prefix('[') {
            let close = bracket_rest
                .find(']')
                .ok_or_else(|| EndpointParseError::UnterminatedBracket(input.to_string()))?;
            let host = &bracket_rest[..close];
            let after = &bracket_rest[close + 1..];
            let port = match after.strip_prefix(':') {
                Some(port_str) => Some(
                    port_str
                        .parse::<u16>()
                        .map_err(|_| EndpointParseError::InvalidPort(port_str.to_string()))?,
                ),
                None => None,
            };
            (host.to_string(), port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, port_str)) => {
                    let port = port_str
                        .parse::<u16>()
                        .map_err(|_| EndpointParseError::InvalidPort(port_str.to_string()))?;
                    (host.to_string(), Some(port))
                }
                None => (rest.to_string(), None),
            }
        };

        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost(input.to_string()));
        }

        Ok(Self {
            host,
            port,
            multiplicity,
        })
    }

    /// Builds a requested endpoint directly from parts, skipping parsing.
    #[must_use]
    pub fn from_parts(host: impl Into<String>, port: Option<u16>, multiplicity: Option<u32>) -> Self {
        Self {
            host: host.into(),
            port,
            multiplicity,
        }
    }

    /// The unresolved host string.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The requested port, or `None`/`Some(0)` for "any".
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The requested channel multiplicity, if any was given.
    #[must_use]
    pub fn multiplicity(&self) -> Option<u32> {
        self.multiplicity
    }

    /// Resolves the host to its candidate [`SocketAddr`]s via the system
    /// resolver, using `default_port` when none was specified.
    pub fn resolve(&self, default_port: u16) -> std::io::Result<Vec<SocketAddr>> {
        let port = self.port.unwrap_or(default_port);
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }
        (self.host.as_str(), port).to_socket_addrs().map(Iterator::collect)
    }
}

impl fmt::Display for RequestedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(n) = self.multiplicity {
            write!(f, "@{n}")?;
        }
        Ok(())
    }
}
