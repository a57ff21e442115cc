//! BoringSSL-backed engine.
//!
//! Every binding builds its own `SslConnector` from the profile, so cipher
//! order, groups, signature algorithms, GREASE, extension permutation,
//! certificate compression and ALPN all match the identity being presented.

use std::io;
use std::io::Read;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVersion};
use boring::x509::X509;
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use http::Uri;
use std::os::raw::c_int;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::tcp::configure_tcp_socket;
use crate::fingerprint::tls::{CertCompression, TlsFingerprint, TlsVersion};
use crate::fingerprint::Profile;
use crate::response::Response;
use crate::transport::engine::{Binding, Engine, OutboundRequest};
use crate::transport::h1::H1Connection;
use crate::transport::h2::H2Connection;
use crate::version::{alpn_wire, ProtocolVersion};

/// Brotli certificate decompression callback for BoringSSL.
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, 4096);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => {
            store_crypto_buffer(out, &decompressed)
        }
        _ => 0,
    }
}

/// Zlib certificate decompression callback for BoringSSL.
unsafe extern "C" fn decompress_zlib_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => {
            store_crypto_buffer(out, &decompressed)
        }
        _ => 0,
    }
}

/// CRYPTO_BUFFER_new copies `data`; the caller keeps ownership of the Vec.
unsafe fn store_crypto_buffer(out: *mut *mut CRYPTO_BUFFER, data: &[u8]) -> c_int {
    let buffer = boring_sys::CRYPTO_BUFFER_new(data.as_ptr(), data.len(), std::ptr::null_mut());
    if buffer.is_null() {
        return 0;
    }
    *out = buffer;
    1
}

fn ssl_version(version: TlsVersion) -> SslVersion {
    match version {
        TlsVersion::Tls1_0 => SslVersion::TLS1,
        TlsVersion::Tls1_2 => SslVersion::TLS1_2,
        TlsVersion::Tls1_3 => SslVersion::TLS1_3,
    }
}

/// TLS 1.3 suites are not configurable in BoringSSL.
fn is_tls13_suite(name: &str) -> bool {
    matches!(
        name,
        "TLS_AES_128_GCM_SHA256" | "TLS_AES_256_GCM_SHA384" | "TLS_CHACHA20_POLY1305_SHA256"
    )
}

/// Build the TLS connector for one profile.
///
/// Any parameter BoringSSL rejects is reported as a configuration failure
/// for that profile, before a socket is opened.
pub(crate) fn build_ssl_connector(
    profile: &Profile,
    root_certs: &[Vec<u8>],
) -> Result<SslConnector> {
    let name = profile.name.as_str();
    let fp: &TlsFingerprint = &profile.tls;
    let config_err = |what: &str, e: boring::error::ErrorStack| {
        Error::transport_config(name, format!("{}: {}", what, e))
    };

    let mut builder = SslConnector::builder(SslMethod::tls_client())
        .map_err(|e| config_err("create SSL connector", e))?;

    for cert_bytes in root_certs {
        let cert = X509::from_der(cert_bytes).or_else(|_| X509::from_pem(cert_bytes));
        match cert {
            Ok(cert) => {
                if let Err(e) = builder.cert_store_mut().add_cert(cert) {
                    tracing::warn!(profile = name, error = %e, "ignoring root certificate");
                }
            }
            Err(e) => tracing::warn!(profile = name, error = %e, "unparseable root certificate"),
        }
    }

    let tls12_ciphers: Vec<&str> = fp
        .cipher_list
        .iter()
        .copied()
        .filter(|c| !is_tls13_suite(c))
        .collect();
    if !tls12_ciphers.is_empty() {
        builder
            .set_cipher_list(&tls12_ciphers.join(":"))
            .map_err(|e| config_err("cipher list", e))?;
    }
    if !fp.curves.is_empty() {
        builder
            .set_curves_list(&fp.curves.join(":"))
            .map_err(|e| config_err("curves", e))?;
    }
    if !fp.sigalgs.is_empty() {
        builder
            .set_sigalgs_list(&fp.sigalgs.join(":"))
            .map_err(|e| config_err("signature algorithms", e))?;
    }

    builder.set_grease_enabled(fp.grease);
    builder.set_permute_extensions(fp.permute_extensions);

    // Only decompression is registered; a client never compresses certificates.
    let ctx = builder.as_ptr() as *mut SSL_CTX;
    let registered = unsafe {
        match fp.cert_compression {
            CertCompression::Brotli => boring_sys::SSL_CTX_add_cert_compression_alg(
                ctx,
                boring_sys::TLSEXT_cert_compression_brotli as u16,
                None,
                Some(decompress_brotli_cert),
            ),
            CertCompression::Zlib => boring_sys::SSL_CTX_add_cert_compression_alg(
                ctx,
                boring_sys::TLSEXT_cert_compression_zlib as u16,
                None,
                Some(decompress_zlib_cert),
            ),
            CertCompression::None => 1,
        }
    };
    if registered != 1 {
        return Err(Error::transport_config(
            name,
            "certificate compression rejected",
        ));
    }

    if fp.min_version > fp.max_version {
        return Err(Error::transport_config(
            name,
            "minimum TLS version above maximum",
        ));
    }
    builder
        .set_min_proto_version(Some(ssl_version(fp.min_version)))
        .map_err(|e| config_err("min TLS version", e))?;
    builder
        .set_max_proto_version(Some(ssl_version(fp.max_version)))
        .map_err(|e| config_err("max TLS version", e))?;

    builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

    if profile.protocols.is_empty() {
        return Err(Error::transport_config(name, "no ALPN protocols"));
    }
    builder
        .set_alpn_protos(&alpn_wire(&profile.protocols))
        .map_err(|e| config_err("ALPN", e))?;

    Ok(builder.build())
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    Http(TcpStream),
    Https(SslStream<TcpStream>),
}

impl MaybeHttpsStream {
    /// Protocol selected by ALPN. Plain TCP and servers that ignore ALPN
    /// both mean HTTP/1.1.
    pub fn negotiated(&self) -> ProtocolVersion {
        match self {
            MaybeHttpsStream::Http(_) => ProtocolVersion::Http1_1,
            MaybeHttpsStream::Https(stream) => stream
                .ssl()
                .selected_alpn_protocol()
                .and_then(ProtocolVersion::from_alpn)
                .unwrap_or(ProtocolVersion::Http1_1),
        }
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Engine that speaks real TLS through BoringSSL.
#[derive(Debug, Clone)]
pub struct BoringEngine {
    root_certs: Vec<Vec<u8>>,
    tcp_fingerprinting: bool,
}

impl Default for BoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BoringEngine {
    pub fn new() -> Self {
        Self {
            root_certs: Vec::new(),
            tcp_fingerprinting: true,
        }
    }

    /// Add custom root certificates (DER or PEM).
    pub fn with_root_certificates(mut self, certs: Vec<Vec<u8>>) -> Self {
        self.root_certs = certs;
        self
    }

    /// Toggle TTL and socket buffer shaping. Some sandboxes refuse these options.
    pub fn with_tcp_fingerprinting(mut self, enabled: bool) -> Self {
        self.tcp_fingerprinting = enabled;
        self
    }
}

impl Engine for BoringEngine {
    type Binding = BoringBinding;

    fn bind(&self, profile: &Arc<Profile>) -> Result<BoringBinding> {
        let ssl = build_ssl_connector(profile, &self.root_certs)?;
        tracing::debug!(profile = %profile.name, "transport bound");
        Ok(BoringBinding {
            profile: Arc::clone(profile),
            ssl,
            tcp_fingerprinting: self.tcp_fingerprinting,
            conn: None,
            bound_at: Instant::now(),
        })
    }
}

enum Connection {
    H1(H1Connection),
    H2(H2Connection),
}

/// Transport bound to one profile. Closes its connection on drop.
pub struct BoringBinding {
    profile: Arc<Profile>,
    ssl: SslConnector,
    tcp_fingerprinting: bool,
    conn: Option<Connection>,
    bound_at: Instant,
}

impl BoringBinding {
    async fn open_tcp(&self, addr: SocketAddr) -> Result<TcpStream> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| Error::connection(format!("Failed to create socket: {}", e)))?;

        if self.tcp_fingerprinting {
            let sock_ref = socket2::SockRef::from(&socket);
            if let Err(e) = configure_tcp_socket(&sock_ref, &self.profile.tcp) {
                tracing::warn!(profile = %self.profile.name, error = %e, "TCP fingerprint not applied");
            }
        }

        socket.connect(addr).await.map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused(addr.to_string()),
            _ => Error::connection(format!("Failed to connect to {}: {}", addr, e)),
        })
    }

    /// DNS, TCP and (for https) the TLS handshake.
    async fn connect(&self, uri: &Uri) -> Result<MaybeHttpsStream> {
        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidUrl(format!("missing host in {}", uri)))?;
        let https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let target = format!("{}:{}", host.trim_start_matches('[').trim_end_matches(']'), port);

        let addrs: Vec<SocketAddr> = lookup_host(&target)
            .await
            .map_err(|e| Error::connection(format!("DNS resolution failed for {}: {}", target, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::connection(format!("No addresses found for {}", target)));
        }

        let mut last_err = None;
        let mut tcp = None;
        for addr in addrs {
            match self.open_tcp(addr).await {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let tcp = match (tcp, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(e),
            (None, None) => return Err(Error::connection(format!("No route to {}", target))),
        };
        let _ = tcp.set_nodelay(true);

        if !https {
            return Ok(MaybeHttpsStream::Http(tcp));
        }

        let config = self
            .ssl
            .configure()
            .map_err(|e| Error::tls(format!("Failed to configure SSL: {}", e)))?;
        let stream = tokio_boring::connect(config, host, tcp)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;
        Ok(MaybeHttpsStream::Https(stream))
    }

    async fn ensure_connected(&mut self, request: &OutboundRequest) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = match request.timeouts.connect {
            Some(limit) => tokio::time::timeout(limit, self.connect(&request.uri))
                .await
                .map_err(|_| Error::ConnectTimeout(limit))??,
            None => self.connect(&request.uri).await?,
        };

        let negotiated = stream.negotiated();
        if !self.profile.protocols.contains(&negotiated) {
            tracing::warn!(
                profile = %self.profile.name,
                negotiated = %negotiated,
                "server selected a protocol the profile does not advertise"
            );
        }
        tracing::debug!(profile = %self.profile.name, protocol = %negotiated, "connected");

        self.conn = Some(match negotiated {
            ProtocolVersion::Http2 => {
                Connection::H2(H2Connection::handshake(stream, &self.profile.http2).await?)
            }
            ProtocolVersion::Http1_1 => Connection::H1(H1Connection::new(stream)),
        });
        Ok(())
    }
}

impl Binding for BoringBinding {
    fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    async fn send(&mut self, request: OutboundRequest) -> Result<Response> {
        self.ensure_connected(&request).await?;
        match self.conn.as_mut() {
            Some(Connection::H1(conn)) => {
                let result = conn.send_request(&request).await;
                if conn.should_close() || result.is_err() {
                    self.conn = None;
                }
                result
            }
            Some(Connection::H2(conn)) => conn.send_request(&request).await,
            None => Err(Error::connection("connection lost")),
        }
    }
}

impl Drop for BoringBinding {
    fn drop(&mut self) {
        tracing::debug!(
            profile = %self.profile.name,
            held_ms = self.bound_at.elapsed().as_millis() as u64,
            "transport released"
        );
    }
}
