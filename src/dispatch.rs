//! Single-attempt request execution.
//!
//! The dispatcher binds a transport for one profile, composes that profile's
//! headers, sends the request and enforces the attempt deadline. It never
//! retries; classifying failures and choosing the next identity is the
//! rotation controller's job.

use std::sync::Arc;
use std::time::Instant;

use http::Uri;

use crate::error::{Error, Result};
use crate::fingerprint::Profile;
use crate::headers::compose;
use crate::intent::RequestIntent;
use crate::response::Response;
use crate::transport::engine::{Binding, Engine, OutboundRequest};

/// Executes one attempt of a [`RequestIntent`] under one profile.
pub struct Dispatcher<E> {
    engine: Arc<E>,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: Engine> Dispatcher<E> {
    pub fn new(engine: E) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    pub fn from_arc(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one attempt.
    ///
    /// Every response is returned as-is, whatever its status. The binding is
    /// dropped before this returns, on success, error and timeout alike.
    pub async fn execute(&self, intent: &RequestIntent, profile: &Arc<Profile>) -> Result<Response> {
        intent.timeouts.validate()?;
        let uri = parse_target(&intent.url)?;
        let headers = compose(profile, &intent.headers)?;

        let mut binding = self.engine.bind(profile)?;
        if binding.profile().name != profile.name {
            return Err(Error::transport_config(
                &profile.name,
                format!("engine bound profile {} instead", binding.profile().name),
            ));
        }
        let request = OutboundRequest {
            method: intent.method.clone(),
            uri,
            headers,
            body: intent.body.clone(),
            timeouts: intent.timeouts.clone(),
        };

        let started = Instant::now();
        let total = intent.timeouts.total;
        let result = match tokio::time::timeout(total, binding.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(total)),
        };
        drop(binding);

        match &result {
            Ok(resp) => tracing::debug!(
                profile = %profile.name,
                status = resp.status,
                protocol = %resp.protocol(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "attempt completed"
            ),
            Err(e) => tracing::debug!(
                profile = %profile.name,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "attempt failed"
            ),
        }

        result.map(|resp| resp.with_profile(profile.name.clone()))
    }
}

/// Accept absolute http(s) URLs only.
pub(crate) fn parse_target(target: &str) -> Result<Uri> {
    let url = url::Url::parse(target)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(Error::InvalidUrl(format!("unsupported scheme {:?}", other))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidUrl(format!("missing host in {}", target)));
    }
    url.as_str()
        .parse::<Uri>()
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", target, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(Arc<Profile>);

    struct FixedBinding(Arc<Profile>);

    impl Engine for FixedEngine {
        type Binding = FixedBinding;

        fn bind(&self, _profile: &Arc<Profile>) -> Result<FixedBinding> {
            Ok(FixedBinding(Arc::clone(&self.0)))
        }
    }

    impl Binding for FixedBinding {
        fn profile(&self) -> &Arc<Profile> {
            &self.0
        }

        async fn send(&mut self, _request: OutboundRequest) -> Result<Response> {
            Err(Error::connection("not reached"))
        }
    }

    #[tokio::test]
    async fn test_binding_for_another_profile_is_rejected() {
        let other = Arc::new(Profile::builder("other").build().unwrap());
        let wanted = Arc::new(Profile::builder("wanted").build().unwrap());
        let dispatcher = Dispatcher::new(FixedEngine(other));

        let err = dispatcher
            .execute(&RequestIntent::get("https://example.com/"), &wanted)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportConfig { ref profile, .. } if profile == "wanted"));
    }

    #[test]
    fn test_parse_target_accepts_http_and_https() {
        let uri = parse_target("https://tls.peet.ws/api/all").unwrap();
        assert_eq!(uri.host(), Some("tls.peet.ws"));
        assert_eq!(uri.path(), "/api/all");
        assert!(parse_target("http://127.0.0.1:8080/x?y=1").is_ok());
    }

    #[test]
    fn test_parse_target_rejects_other_schemes() {
        assert!(matches!(parse_target("ftp://example.com"), Err(Error::InvalidUrl(_))));
        assert!(matches!(parse_target("not a url"), Err(Error::UrlParse(_))));
    }
}
