//! Browser fingerprint profiles and the registry that serves them.
//!
//! A [`Profile`] bundles everything one identity needs: advertised protocol
//! versions, default headers with their canonical order, the TLS handshake
//! parameters, HTTP/2 SETTINGS and TCP options. Profiles are immutable once
//! built and shared as `Arc<Profile>`; a request never mixes parts of two
//! profiles.
//!
//! Note: Chrome randomizes TLS extension order since v110, so JA3 hashes
//! vary per connection. Validation relies on the JA4 prefix instead, which
//! sorts extensions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::http2::Http2Settings;
use super::tcp::TcpFingerprint;
use super::tls::TlsFingerprint;
use crate::error::{Error, Result};
use crate::headers::{self, headers_to_owned};
use crate::version::ProtocolVersion;

/// A named browser identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Unique registry key, e.g. `chrome120`.
    pub name: String,
    /// ALPN preference list. The first entry is the declared target version.
    pub protocols: Vec<ProtocolVersion>,
    /// Default headers.
    pub headers: Vec<(String, String)>,
    /// Canonical header order, including optional slots without defaults.
    pub header_order: Vec<String>,
    pub tls: TlsFingerprint,
    pub http2: Http2Settings,
    pub tcp: TcpFingerprint,
}

impl Profile {
    /// Start building a custom profile.
    pub fn builder(name: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder::new(name)
    }

    /// Protocol version this identity is expected to negotiate.
    pub fn target_protocol(&self) -> ProtocolVersion {
        self.protocols
            .first()
            .copied()
            .unwrap_or(ProtocolVersion::Http1_1)
    }

    /// Get the User-Agent string for this profile.
    pub fn user_agent(&self) -> Option<&str> {
        self.default_header("User-Agent")
    }

    /// Default value of a header (case-insensitive).
    pub fn default_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The naive static-header client: a pasted user agent, alphabetical
    /// headers, HTTP/1.1 only and the engine's default handshake. Not part of
    /// the built-in catalog; useful as the "detected" baseline.
    pub fn static_headers() -> Self {
        let headers = headers_to_owned(&headers::static_scraper_headers());
        Self {
            name: "baseline".to_string(),
            protocols: vec![ProtocolVersion::Http1_1],
            header_order: headers.iter().map(|(k, _)| k.clone()).collect(),
            headers,
            tls: TlsFingerprint::default(),
            http2: Http2Settings::default(),
            tcp: TcpFingerprint::default(),
        }
    }
}

/// Builder for [`Profile`].
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    name: String,
    protocols: Vec<ProtocolVersion>,
    headers: Vec<(String, String)>,
    header_order: Option<Vec<String>>,
    tls: TlsFingerprint,
    http2: Http2Settings,
    tcp: TcpFingerprint,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocols: vec![ProtocolVersion::Http2, ProtocolVersion::Http1_1],
            headers: Vec::new(),
            header_order: None,
            tls: TlsFingerprint::default(),
            http2: Http2Settings::default(),
            tcp: TcpFingerprint::default(),
        }
    }

    /// ALPN preference list; the first entry is the declared target.
    pub fn protocols(mut self, protocols: &[ProtocolVersion]) -> Self {
        self.protocols = protocols.to_vec();
        self
    }

    /// Default headers, in the browser's order.
    pub fn headers(mut self, headers: &[(&'static str, &'static str)]) -> Self {
        self.headers = headers_to_owned(headers);
        self
    }

    /// Add or replace one default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Canonical header order. Defaults to the order of the default headers.
    pub fn header_order(mut self, order: &[&str]) -> Self {
        self.header_order = Some(order.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn tls(mut self, tls: TlsFingerprint) -> Self {
        self.tls = tls;
        self
    }

    pub fn http2(mut self, http2: Http2Settings) -> Self {
        self.http2 = http2;
        self
    }

    pub fn tcp(mut self, tcp: TcpFingerprint) -> Self {
        self.tcp = tcp;
        self
    }

    /// Build the profile.
    ///
    /// Default headers missing from an explicit order are appended to it, so
    /// every default has exactly one slot.
    pub fn build(self) -> Result<Profile> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_config("profile name must not be empty"));
        }
        if self.protocols.is_empty() {
            return Err(Error::invalid_config(format!(
                "profile {} advertises no protocol version",
                self.name
            )));
        }

        let mut order = self
            .header_order
            .unwrap_or_else(|| self.headers.iter().map(|(k, _)| k.clone()).collect());
        for (name, _) in &self.headers {
            if !order.iter().any(|slot| slot.eq_ignore_ascii_case(name)) {
                order.push(name.clone());
            }
        }
        let mut deduped: Vec<String> = Vec::with_capacity(order.len());
        for slot in order {
            if !deduped.iter().any(|s| s.eq_ignore_ascii_case(&slot)) {
                deduped.push(slot);
            }
        }

        Ok(Profile {
            name: self.name,
            protocols: self.protocols,
            headers: self.headers,
            header_order: deduped,
            tls: self.tls,
            http2: self.http2,
            tcp: self.tcp,
        })
    }
}

/// Immutable catalog of profiles, looked up by name.
///
/// Registration order is the default rotation order.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: Vec<Arc<Profile>>,
    index: HashMap<String, usize>,
}

impl ProfileRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from profiles, rejecting duplicate names.
    pub fn from_profiles(profiles: impl IntoIterator<Item = Profile>) -> Result<Self> {
        let mut registry = Self::new();
        for profile in profiles {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// The built-in browser catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in builtin_specs() {
            let name = spec.name.clone();
            if let Err(e) = spec.build().and_then(|profile| registry.register(profile)) {
                tracing::warn!(profile = %name, error = %e, "built-in profile rejected, skipped");
            }
        }
        registry
    }

    /// Add a profile. Only possible before the registry is shared.
    pub fn register(&mut self, profile: Profile) -> Result<()> {
        if self.index.contains_key(&profile.name) {
            return Err(Error::DuplicateProfile(profile.name));
        }
        self.index.insert(profile.name.clone(), self.profiles.len());
        self.profiles.push(Arc::new(profile));
        Ok(())
    }

    /// Look up a profile by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Profile>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.profiles[i]))
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    /// Profile names in registration order.
    pub fn list_names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Shared, hot-swappable registry.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep it for a whole
/// operation; [`publish`](Self::publish) replaces the registry in one step,
/// so no reader ever observes a partially updated catalog.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<ProfileRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: ProfileRegistry) -> Self {
        Self::from_arc(Arc::new(registry))
    }

    pub fn from_arc(registry: Arc<ProfileRegistry>) -> Self {
        Self {
            current: RwLock::new(registry),
        }
    }

    /// Current registry.
    pub fn snapshot(&self) -> Arc<ProfileRegistry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the registry. Operations already running keep their snapshot.
    pub fn publish(&self, registry: ProfileRegistry) {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
        tracing::info!(profiles = guard.len(), "published profile registry");
    }
}

fn builtin_specs() -> Vec<ProfileBuilder> {
    let http2_first = [ProtocolVersion::Http2, ProtocolVersion::Http1_1];
    vec![
        ProfileBuilder::new("chrome120")
            .protocols(&http2_first)
            .headers(&headers::chrome_120_headers())
            .header_order(headers::CHROME_HEADER_ORDER)
            .tls(TlsFingerprint::chrome_120())
            .http2(Http2Settings::chrome())
            .tcp(TcpFingerprint::macos()),
        ProfileBuilder::new("firefox117")
            .protocols(&http2_first)
            .headers(&headers::firefox_117_headers())
            .header_order(headers::FIREFOX_HEADER_ORDER)
            .tls(TlsFingerprint::firefox_117())
            .http2(Http2Settings::firefox())
            .tcp(TcpFingerprint::macos()),
        ProfileBuilder::new("safari16_0")
            .protocols(&http2_first)
            .headers(&headers::safari_16_headers())
            .header_order(headers::SAFARI_HEADER_ORDER)
            .tls(TlsFingerprint::safari_16())
            .http2(Http2Settings::safari())
            .tcp(TcpFingerprint::macos()),
        ProfileBuilder::new("edge101")
            .protocols(&http2_first)
            .headers(&headers::edge_101_headers())
            .header_order(headers::CHROME_HEADER_ORDER)
            .tls(TlsFingerprint::edge_101())
            .http2(Http2Settings::chrome_legacy())
            .tcp(TcpFingerprint::windows()),
        ProfileBuilder::new("chrome131")
            .protocols(&http2_first)
            .headers(&headers::chrome_131_headers())
            .header_order(headers::CHROME_HEADER_ORDER)
            .tls(TlsFingerprint::chrome_131())
            .http2(Http2Settings::chrome())
            .tcp(TcpFingerprint::macos()),
        ProfileBuilder::new("firefox133")
            .protocols(&http2_first)
            .headers(&headers::firefox_133_headers())
            .header_order(headers::FIREFOX_HEADER_ORDER)
            .tls(TlsFingerprint::firefox_133())
            .http2(Http2Settings::firefox())
            .tcp(TcpFingerprint::macos()),
    ]
}
