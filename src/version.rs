//! HTTP protocol versions advertised by a profile.

use std::fmt;

/// Application-layer protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// HTTP/1.1 ("http/1.1").
    Http1_1,
    /// HTTP/2 over TLS ("h2").
    Http2,
}

impl ProtocolVersion {
    /// Human-readable version string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http1_1 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
        }
    }

    /// ALPN protocol identifier.
    pub fn alpn_id(&self) -> &'static [u8] {
        match self {
            Self::Http1_1 => b"http/1.1",
            Self::Http2 => b"h2",
        }
    }

    /// Map a negotiated ALPN identifier back to a version.
    pub fn from_alpn(id: &[u8]) -> Option<Self> {
        match id {
            b"h2" => Some(Self::Http2),
            b"http/1.1" => Some(Self::Http1_1),
            _ => None,
        }
    }

    /// Parse a version as reported by a remote probe.
    ///
    /// Accepts ALPN ids ("h2"), status-line forms ("HTTP/1.1") and the
    /// "HTTP/2.0" spelling some services use.
    pub fn parse_reported(reported: &str) -> Option<Self> {
        match reported.trim().to_ascii_lowercase().as_str() {
            "h2" | "http/2" | "http/2.0" | "http2" => Some(Self::Http2),
            "http/1.1" | "http1.1" | "http/1" | "http/1.0" => Some(Self::Http1_1),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a preference list in ALPN wire format (length-prefixed ids).
pub fn alpn_wire(versions: &[ProtocolVersion]) -> Vec<u8> {
    let mut wire = Vec::new();
    for version in versions {
        let id = version.alpn_id();
        wire.push(id.len() as u8);
        wire.extend_from_slice(id);
    }
    wire
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpn_wire_matches_browser_preference() {
        let wire = alpn_wire(&[ProtocolVersion::Http2, ProtocolVersion::Http1_1]);
        assert_eq!(wire, b"\x02h2\x08http/1.1");
    }

    #[test]
    fn test_parse_reported() {
        assert_eq!(ProtocolVersion::parse_reported("h2"), Some(ProtocolVersion::Http2));
        assert_eq!(ProtocolVersion::parse_reported("HTTP/2.0"), Some(ProtocolVersion::Http2));
        assert_eq!(ProtocolVersion::parse_reported("HTTP/1.1"), Some(ProtocolVersion::Http1_1));
        assert_eq!(ProtocolVersion::parse_reported("h3"), None);
    }
}
