//! Error types for guise crate.

use std::io;
use std::time::Duration;

use crate::response::Response;
use crate::rotation::AttemptLog;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while impersonating, dispatching or validating.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No profile registered under this name.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// A profile with this name is already registered.
    #[error("Duplicate profile: {0}")]
    DuplicateProfile(String),

    /// Caller-supplied header cannot be sent as a single header line.
    #[error("Invalid header {name:?}: {reason}")]
    InvalidHeaderValue { name: String, reason: String },

    /// The TLS engine rejected the profile's parameter set.
    ///
    /// Profile-specific and never retried with the same profile.
    #[error("Transport configuration rejected for profile {profile}: {reason}")]
    TransportConfig { profile: String, reason: String },

    /// Attempt deadline exceeded; the in-flight request was cancelled.
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Connect timeout (TCP + TLS handshake).
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// Target actively refused the TCP connection.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Target address is not an absolute http(s) URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid retry policy, timeout or registry configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Decompression error.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Every attempt of a rotated operation failed.
    #[error("All attempts failed: {attempts}")]
    Exhausted {
        attempts: AttemptLog,
        /// Last blocked response, when the final failure was a retryable status.
        last_response: Option<Box<Response>>,
    },
}

impl Error {
    /// Create an invalid header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeaderValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport configuration error for a profile.
    pub fn transport_config(profile: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportConfig {
            profile: profile.into(),
            reason: reason.into(),
        }
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Attempt history of an exhausted operation.
    pub fn attempts(&self) -> Option<&AttemptLog> {
        match self {
            Self::Exhausted { attempts, .. } => Some(attempts),
            _ => None,
        }
    }
}
