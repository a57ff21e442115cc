//! Request intents: what the caller wants fetched, independent of identity.

use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::error::Result;
use crate::headers::HeaderOverrides;
use crate::timeouts::Timeouts;

/// One logical request.
///
/// The intent names the target, method, body and caller overrides. The
/// browser identity comes from a profile chosen at dispatch time, either the
/// one pinned here or one picked by the rotation controller.
#[derive(Debug, Clone)]
pub struct RequestIntent {
    pub url: String,
    pub method: Method,
    pub body: Option<Bytes>,
    pub headers: HeaderOverrides,
    /// Preferred profile name.
    pub profile: Option<String>,
    pub timeouts: Timeouts,
}

impl RequestIntent {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: HeaderOverrides::new(),
            profile: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Override (or add) one header. Validated when headers are composed.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// URL-encoded form body.
    pub fn form<'a>(mut self, fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers
            .set("Content-Type", "application/x-www-form-urlencoded");
        self.body = Some(Bytes::from(encoded));
        self
    }

    /// JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Pin a profile by name.
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
