//! TCP/IP stack fingerprinting for browser impersonation.
//!
//! Configures socket options that a passive observer sees before the TLS
//! handshake (p0f-style): initial TTL and buffer sizes (which drive the
//! advertised window).

use std::io;

/// TCP/IP fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFingerprint {
    /// Initial receive window size (bytes), set through the socket buffers.
    pub window_size: u32,
    /// Initial TTL for IPv4 packets.
    /// macOS: 64, Linux: 64, Windows: 128
    pub ttl: u8,
}

impl Default for TcpFingerprint {
    fn default() -> Self {
        Self::macos()
    }
}

impl TcpFingerprint {
    /// macOS network stack.
    pub fn macos() -> Self {
        Self {
            window_size: 65535,
            ttl: 64,
        }
    }

    /// Windows network stack.
    pub fn windows() -> Self {
        Self {
            window_size: 64240,
            ttl: 128,
        }
    }
}

/// Configure a TCP socket with fingerprint settings.
///
/// MSS, window scaling, SACK and timestamps are negotiated by the OS and
/// cannot be set through portable socket options.
pub fn configure_tcp_socket(socket: &socket2::Socket, fp: &TcpFingerprint) -> io::Result<()> {
    socket.set_recv_buffer_size(fp.window_size as usize)?;
    socket.set_send_buffer_size(fp.window_size as usize)?;
    socket.set_ttl(fp.ttl as u32)?;
    Ok(())
}
