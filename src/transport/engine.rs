//! Seam between request dispatch and the network.
//!
//! An [`Engine`] turns a profile into a [`Binding`]: a transport whose TLS
//! handshake, HTTP/2 SETTINGS and TCP options all come from that one
//! profile. Bindings are scoped to a single attempt and release their
//! connection when dropped, on every exit path.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Uri};

use crate::error::Result;
use crate::fingerprint::Profile;
use crate::headers::OrderedHeaders;
use crate::response::Response;
use crate::timeouts::Timeouts;

/// Fully composed request, ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    /// Headers in the exact order they must be written.
    pub headers: OrderedHeaders,
    pub body: Option<Bytes>,
    pub timeouts: Timeouts,
}

/// Factory for profile-bound transports.
pub trait Engine: Send + Sync + 'static {
    type Binding: Binding;

    /// Configure a transport for `profile`.
    ///
    /// Fails with [`Error::TransportConfig`](crate::Error::TransportConfig)
    /// when the engine cannot express the profile's parameters.
    fn bind(&self, profile: &Arc<Profile>) -> Result<Self::Binding>;
}

/// A transport configured for exactly one profile.
pub trait Binding: Send {
    /// Profile this binding was configured from.
    fn profile(&self) -> &Arc<Profile>;

    /// Send one request and read the whole response.
    fn send(&mut self, request: OutboundRequest) -> impl Future<Output = Result<Response>> + Send;
}
