//! HTTP/1.1 over a raw stream.
//!
//! Request heads are serialized by hand so header order and casing on the
//! wire are exactly what composition produced; hyper would normalize both.
//! Responses are parsed with httparse.

use bytes::{Buf, Bytes, BytesMut};
use http::{Method, Uri};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::headers::OrderedHeaders;
use crate::response::Response;
use crate::transport::connector::MaybeHttpsStream;
use crate::transport::engine::OutboundRequest;
use crate::version::ProtocolVersion;

/// Response heads larger than this are rejected.
const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

const READ_CHUNK: usize = 8192;

/// How the response body is delimited (RFC 9112 Section 6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// One HTTP/1.1 connection, used for one request at a time.
pub struct H1Connection {
    stream: MaybeHttpsStream,
    buf: BytesMut,
    should_close: bool,
}

impl H1Connection {
    pub fn new(stream: MaybeHttpsStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            should_close: false,
        }
    }

    /// Whether the peer asked to close, or the body was close-delimited.
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    pub async fn send_request(&mut self, request: &OutboundRequest) -> Result<Response> {
        let head = build_request(
            &request.method,
            &request.uri,
            &request.headers,
            request.body.as_ref(),
        )?;
        self.write(&head).await?;
        if let Some(body) = &request.body {
            self.write(body).await?;
        }
        self.stream
            .flush()
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to flush request: {}", e)))?;

        // Interim 1xx responses are skipped
        loop {
            let (status, headers) = self.read_head().await?;
            if (100..200).contains(&status) && status != 101 {
                continue;
            }

            if header_value(&headers, "connection")
                .is_some_and(|v| v.to_ascii_lowercase().contains("close"))
            {
                self.should_close = true;
            }

            let framing = framing(status, &request.method, &headers)?;
            let body = match framing {
                Framing::Empty => Bytes::new(),
                Framing::Length(len) => self.read_exact(len).await?,
                Framing::Chunked => self.read_chunked().await?,
                Framing::UntilClose => {
                    self.should_close = true;
                    self.read_to_close().await?
                }
            };
            return Ok(Response::new(status, headers, body, ProtocolVersion::Http1_1));
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to write request: {}", e)))
    }

    /// Pull more bytes into the buffer. Returns false at EOF.
    async fn fill(&mut self) -> Result<bool> {
        self.buf.reserve(READ_CHUNK);
        let n = self
            .stream
            .read_buf(&mut self.buf)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to read response: {}", e)))?;
        Ok(n > 0)
    }

    async fn fill_or_fail(&mut self, context: &str) -> Result<()> {
        if self.fill().await? {
            Ok(())
        } else {
            Err(Error::http_protocol(format!("Connection closed {}", context)))
        }
    }

    async fn read_head(&mut self) -> Result<(u16, Vec<(String, String)>)> {
        loop {
            let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Response::new(&mut slots);
            match parsed
                .parse(&self.buf)
                .map_err(|e| Error::http_protocol(format!("Malformed response head: {}", e)))?
            {
                httparse::Status::Complete(len) => {
                    let status = parsed
                        .code
                        .ok_or_else(|| Error::http_protocol("Missing status code"))?;
                    let headers = parsed
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect();
                    self.buf.advance(len);
                    return Ok((status, headers));
                }
                httparse::Status::Partial => {
                    if self.buf.len() >= MAX_HEAD_SIZE {
                        return Err(Error::http_protocol("Response head too large"));
                    }
                }
            }
            self.fill_or_fail("before response head").await?;
        }
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        while self.buf.len() < len {
            if !self.fill().await? {
                return Err(Error::http_protocol(format!(
                    "Connection closed after {} of {} body bytes",
                    self.buf.len(),
                    len
                )));
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    /// One CRLF-terminated line, without the CRLF.
    async fn read_line(&mut self) -> Result<Bytes> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance(2);
                return Ok(line);
            }
            if self.buf.len() >= MAX_HEAD_SIZE {
                return Err(Error::http_protocol("Chunk line too long"));
            }
            self.fill_or_fail("inside chunked body").await?;
        }
    }

    /// RFC 9112 Section 7.1. Trailers are read and discarded.
    async fn read_chunked(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line().await?;
            let size = parse_chunk_size(&line)?;
            if size == 0 {
                while !self.read_line().await?.is_empty() {}
                return Ok(body.freeze());
            }
            let chunk = self.read_exact(size).await?;
            body.extend_from_slice(&chunk);
            if !self.read_line().await?.is_empty() {
                return Err(Error::http_protocol("Missing CRLF after chunk data"));
            }
        }
    }

    async fn read_to_close(&mut self) -> Result<Bytes> {
        while self.fill().await? {}
        Ok(self.buf.split().freeze())
    }
}

fn framing(status: u16, method: &Method, headers: &[(String, String)]) -> Result<Framing> {
    if *method == Method::HEAD || matches!(status, 100..=199 | 204 | 304) {
        return Ok(Framing::Empty);
    }
    // Transfer-Encoding wins over Content-Length
    if let Some(te) = header_value(headers, "transfer-encoding") {
        let last = te.rsplit(',').next().unwrap_or_default().trim();
        return Ok(if last.eq_ignore_ascii_case("chunked") {
            Framing::Chunked
        } else {
            Framing::UntilClose
        });
    }
    match header_value(headers, "content-length") {
        Some(raw) => parse_content_length(raw).map(Framing::Length),
        None => Ok(Framing::UntilClose),
    }
}

/// Serialize the request head.
///
/// Host goes first, as every browser sends it. The composed headers follow
/// byte-for-byte in their given order and casing. Connection and
/// Content-Length are only added when the composition lacks them.
fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &OrderedHeaders,
    body: Option<&Bytes>,
) -> Result<Vec<u8>> {
    let host = uri
        .host()
        .ok_or_else(|| Error::InvalidUrl(format!("missing host in {}", uri)))?;
    let authority = match uri.port() {
        Some(port) => format!("{}:{}", host, port.as_str()),
        None => host.to_string(),
    };
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut lines = vec![format!("{} {} HTTP/1.1", method, target)];
    lines.push(format!("Host: {}", authority));
    lines.extend(
        headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
            .map(|(name, value)| format!("{}: {}", name, value)),
    );

    if headers.get("connection").is_none() {
        lines.push("Connection: keep-alive".to_string());
    }
    let framed = headers.get("content-length").is_some() || headers.get("transfer-encoding").is_some();
    match body {
        Some(body) if !framed => lines.push(format!("Content-Length: {}", body.len())),
        None if !framed && matches!(*method, Method::POST | Method::PUT | Method::PATCH) => {
            lines.push("Content-Length: 0".to_string())
        }
        _ => {}
    }

    let mut head = lines.join("\r\n");
    head.push_str("\r\n\r\n");
    Ok(head.into_bytes())
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Hex size, chunk extensions ignored.
fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::http_protocol("Non-ASCII chunk size"))?;
    let digits = text.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(digits, 16)
        .map_err(|_| Error::http_protocol(format!("Invalid chunk size: {:?}", text)))
}

/// Repeated identical values are allowed; anything else is an error.
fn parse_content_length(raw: &str) -> Result<usize> {
    let mut values = raw.split(',').map(|v| {
        v.trim()
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("Invalid Content-Length: {}", raw)))
    });
    let first = values
        .next()
        .ok_or_else(|| Error::http_protocol("Empty Content-Length"))??;
    for value in values {
        if value? != first {
            return Err(Error::http_protocol(format!(
                "Conflicting Content-Length values: {}",
                raw
            )));
        }
    }
    Ok(first)
}
