//! HTTP response handling with explicit decompression.

use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::version::ProtocolVersion;

/// Response to one dispatched request.
///
/// Returned for every status the server sends; deciding whether a status
/// means "blocked" is up to the rotation controller.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Header fields in wire order, names as the server sent them.
    pub headers: Vec<(String, String)>,
    body: Bytes,
    protocol: ProtocolVersion,
    profile: String,
}

impl Response {
    pub fn new(
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        protocol: ProtocolVersion,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            protocol,
            profile: String::new(),
        }
    }

    /// Tag the response with the profile that produced it.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Protocol version actually negotiated.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Name of the profile used for this exchange.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Every `Set-Cookie` value, for callers keeping their own cookie state.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.get_headers("Set-Cookie")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.get_header("Content-Encoding")
    }

    /// Decode body based on Content-Encoding (gzip, deflate, br, zstd).
    pub fn decoded_body(&self) -> Result<Bytes> {
        match self.content_encoding().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => decode_gzip(&self.body),
            Some("deflate") => decode_deflate(&self.body),
            Some("br") => decode_brotli(&self.body),
            Some("zstd") => decode_zstd(&self.body),
            _ => {
                // Some servers compress without saying so
                if self.body.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
                    return decode_zstd(&self.body);
                }
                if self.body.starts_with(&[0x1f, 0x8b]) {
                    return decode_gzip(&self.body);
                }
                Ok(self.body.clone())
            }
        }
    }

    pub fn text(&self) -> Result<String> {
        let decoded = self.decoded_body()?;
        String::from_utf8(decoded.to_vec())
            .map_err(|e| Error::Decompression(format!("UTF-8 decode error: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let decoded = self.decoded_body()?;
        serde_json::from_slice(&decoded).map_err(Error::from)
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::Decompression(format!("zstd: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn response(headers: &[(&str, &str)], body: Vec<u8>) -> Response {
        Response::new(
            200,
            headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Bytes::from(body),
            ProtocolVersion::Http1_1,
        )
    }

    #[test]
    fn test_gzip_body_decoded() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"{\"ok\":true}").unwrap();
        let body = encoder.finish().unwrap();

        let resp = response(&[("Content-Encoding", "gzip")], body);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_undeclared_gzip_sniffed() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello").unwrap();
        let resp = response(&[], encoder.finish().unwrap());
        assert_eq!(resp.text().unwrap(), "hello");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = response(
            &[("set-cookie", "a=1"), ("Content-Type", "text/plain"), ("Set-Cookie", "b=2")],
            b"x".to_vec(),
        );
        assert_eq!(resp.content_type(), Some("text/plain"));
        assert_eq!(resp.set_cookies(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let resp = response(&[], b"<html>".to_vec());
        assert!(matches!(resp.json::<serde_json::Value>(), Err(Error::Json(_))));
    }
}
