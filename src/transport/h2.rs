//! HTTP/2 via hyper, configured from the profile's SETTINGS.
//!
//! hyper exposes window sizes, frame size, header table and header list
//! limits. SETTINGS order and pseudo-header order stay hyper's own; the
//! validator reports any resulting Akamai mismatch.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::fingerprint::http2::Http2Settings;
use crate::headers::normalize;
use crate::response::Response;
use crate::transport::connector::MaybeHttpsStream;
use crate::transport::engine::OutboundRequest;
use crate::version::ProtocolVersion;

/// Default connection-level window before any WINDOW_UPDATE (RFC 9113).
const DEFAULT_CONNECTION_WINDOW: u32 = 65_535;

/// An HTTP/2 connection. The driver task is aborted on drop.
pub struct H2Connection {
    sender: http2::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl H2Connection {
    /// Send the preface and SETTINGS, then wait for the server's SETTINGS.
    pub async fn handshake(stream: MaybeHttpsStream, settings: &Http2Settings) -> Result<Self> {
        let mut builder = http2::Builder::new(TokioExecutor::new());
        builder
            .initial_stream_window_size(settings.initial_window_size)
            .initial_connection_window_size(
                DEFAULT_CONNECTION_WINDOW.saturating_add(settings.initial_window_update),
            )
            .max_frame_size(settings.max_frame_size)
            .header_table_size(settings.header_table_size);
        if settings.max_header_list_size > 0 {
            builder.max_header_list_size(settings.max_header_list_size);
        }

        let handshake = builder.handshake::<_, Full<Bytes>>(TokioIo::new(stream));
        let (sender, conn) = match settings.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| Error::http_protocol("HTTP/2 handshake timed out"))?,
            None => handshake.await,
        }
        .map_err(|e| Error::http_protocol(format!("HTTP/2 handshake failed: {}", e)))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "HTTP/2 connection closed with error");
            }
        });

        Ok(Self { sender, driver })
    }

    pub async fn send_request(&mut self, request: &OutboundRequest) -> Result<Response> {
        let mut builder = http::Request::builder()
            .method(request.method.clone())
            .uri(request.uri.clone());

        // HTTP/2 forbids connection-specific fields and requires lowercase names
        for (name, value) in normalize(request.headers.iter()) {
            builder = builder.header(name, value);
        }

        let body = Full::new(request.body.clone().unwrap_or_default());
        let req = builder
            .body(body)
            .map_err(|e| Error::http_protocol(format!("Failed to build request: {}", e)))?;

        self.sender
            .ready()
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 connection not ready: {}", e)))?;
        let resp = self
            .sender
            .send_request(req)
            .await
            .map_err(|e| Error::http_protocol(format!("HTTP/2 request failed: {}", e)))?;

        let (parts, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to read body: {}", e)))?
            .to_bytes();

        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(Response::new(
            parts.status.as_u16(),
            headers,
            body,
            ProtocolVersion::Http2,
        ))
    }
}

impl Drop for H2Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
