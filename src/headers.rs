//! Browser header presets and order-preserving composition.
//!
//! Each browser sends its headers in a fixed order. A request that carries
//! the right values in the wrong order is as detectable as one with the
//! wrong values, so composition always lays headers out in the profile's
//! canonical order, whatever order the caller supplied overrides in.

use crate::error::{Error, Result};
use crate::fingerprint::profiles::Profile;

/// Headers in the exact order they go on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaders {
    headers: Vec<(String, String)>,
}

impl OrderedHeaders {
    /// Wrap an already-ordered header list.
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    /// Headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Header names in wire order.
    pub fn names(&self) -> Vec<&str> {
        self.headers.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Position of a header (case-insensitive).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> Vec<(String, String)> {
        self.headers
    }
}

/// Caller-supplied headers layered over a profile's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverrides {
    entries: Vec<(String, String)>,
}

impl HeaderOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header. A later call for the same name (case-insensitive) replaces the value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderOverrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut overrides = Self::new();
        for (k, v) in iter {
            overrides.set(k, v);
        }
        overrides
    }
}

/// Compose the final header set for one request.
///
/// Caller values win on collision, but position always follows the
/// profile's canonical order and the profile's name casing is kept.
/// Overrides the profile has no slot for go last, in caller order.
pub fn compose(profile: &Profile, overrides: &HeaderOverrides) -> Result<OrderedHeaders> {
    for (name, value) in overrides.iter() {
        validate_header_name(name)?;
        validate_header_value(name, value)?;
    }

    let mut composed = Vec::with_capacity(profile.header_order.len() + overrides.entries.len());
    for slot in &profile.header_order {
        let value = overrides
            .get(slot)
            .or_else(|| profile.default_header(slot));
        if let Some(value) = value {
            composed.push((slot.clone(), value.to_string()));
        }
    }

    for (name, value) in overrides.iter() {
        let has_slot = profile
            .header_order
            .iter()
            .any(|slot| slot.eq_ignore_ascii_case(name));
        if !has_slot {
            composed.push((name.to_string(), value.to_string()));
        }
    }

    Ok(OrderedHeaders::new(composed))
}

/// Headers that transports add, rewrite or strip on their own. They say
/// nothing about the composed identity and are ignored when comparing
/// what a peer echoed back.
pub const TRANSPORT_MANAGED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "te",
];

/// Normalized form used for comparisons: lowercase names, trimmed values,
/// transport-managed headers dropped, original order kept.
pub fn normalize<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| !TRANSPORT_MANAGED_HEADERS.contains(&k.as_str()))
        .collect()
}

/// Validate a header name per RFC 9110 Section 5.1.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_header(name, "empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::invalid_header(name, "header name is not a token"));
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must fit on one line: no CR, LF, NUL or other controls
/// (horizontal tab is allowed).
fn validate_header_value(name: &str, value: &str) -> Result<()> {
    if let Some(b) = value.bytes().find(|&b| (b < 0x20 && b != b'\t') || b == 0x7f) {
        return Err(Error::invalid_header(
            name,
            format!("control character 0x{:02x} in value", b),
        ));
    }
    Ok(())
}

/// Convert static headers to owned.
pub fn headers_to_owned(headers: &[(&'static str, &'static str)]) -> Vec<(String, String)> {
    headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Chrome navigation header order over HTTP/1.1, including the optional slots
/// Chrome fills for forms, cookies and referrers.
pub const CHROME_HEADER_ORDER: &[&str] = &[
    "Connection",
    "Content-Length",
    "Cache-Control",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
    "Upgrade-Insecure-Requests",
    "Origin",
    "Content-Type",
    "User-Agent",
    "Accept",
    "Sec-Fetch-Site",
    "Sec-Fetch-Mode",
    "Sec-Fetch-User",
    "Sec-Fetch-Dest",
    "Referer",
    "Accept-Encoding",
    "Accept-Language",
    "Cookie",
    "Priority",
];

/// Firefox navigation header order.
pub const FIREFOX_HEADER_ORDER: &[&str] = &[
    "User-Agent",
    "Accept",
    "Accept-Language",
    "Accept-Encoding",
    "Content-Type",
    "Content-Length",
    "Origin",
    "Connection",
    "Referer",
    "Cookie",
    "Upgrade-Insecure-Requests",
    "Sec-Fetch-Dest",
    "Sec-Fetch-Mode",
    "Sec-Fetch-Site",
    "Sec-Fetch-User",
    "Priority",
];

/// Safari navigation header order.
pub const SAFARI_HEADER_ORDER: &[&str] = &[
    "Content-Type",
    "Origin",
    "Accept",
    "Content-Length",
    "Cookie",
    "User-Agent",
    "Referer",
    "Accept-Language",
    "Accept-Encoding",
    "Connection",
];

pub const CHROME_120_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const CHROME_131_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
pub const EDGE_101_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36 Edg/101.0.1210.47";
pub const FIREFOX_117_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/117.0";
pub const FIREFOX_133_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0";
pub const SAFARI_16_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Safari/605.1.15";

const CHROMIUM_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Chrome 120 headers for page navigation.
pub fn chrome_120_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Connection", "keep-alive"),
        ("sec-ch-ua", r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""macOS""#),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", CHROME_120_USER_AGENT),
        ("Accept", CHROMIUM_ACCEPT),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-User", "?1"),
        ("Sec-Fetch-Dest", "document"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Accept-Language", "en-US,en;q=0.9"),
    ]
}

/// Chrome 131 headers for page navigation.
pub fn chrome_131_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Connection", "keep-alive"),
        ("sec-ch-ua", r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""macOS""#),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", CHROME_131_USER_AGENT),
        ("Accept", CHROMIUM_ACCEPT),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-User", "?1"),
        ("Sec-Fetch-Dest", "document"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Priority", "u=0, i"),
    ]
}

/// Edge 101 on Windows.
pub fn edge_101_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Connection", "keep-alive"),
        ("sec-ch-ua", r#"" Not A;Brand";v="99", "Chromium";v="101", "Microsoft Edge";v="101""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", EDGE_101_USER_AGENT),
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-User", "?1"),
        ("Sec-Fetch-Dest", "document"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Accept-Language", "en-US,en;q=0.9"),
    ]
}

/// Firefox 117 headers for page navigation.
pub fn firefox_117_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("User-Agent", FIREFOX_117_USER_AGENT),
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ]
}

/// Firefox 133 headers for page navigation.
pub fn firefox_133_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("User-Agent", FIREFOX_133_USER_AGENT),
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Priority", "u=0, i"),
    ]
}

/// Safari 16.0 headers for page navigation. Safari 16.0 predates Fetch Metadata.
pub fn safari_16_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        ("User-Agent", SAFARI_16_USER_AGENT),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
    ]
}

/// The static header set a naive scraper sends: a browser user agent pasted
/// over a non-browser client, alphabetical order.
pub fn static_scraper_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        ("Accept-Encoding", "gzip, deflate"),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::profiles::ProfileRegistry;

    #[test]
    fn test_compose_without_overrides_is_deterministic() {
        let registry = ProfileRegistry::builtin();
        for name in registry.list_names() {
            let profile = registry.lookup(name).unwrap();
            let first = compose(&profile, &HeaderOverrides::new()).unwrap();
            let second = compose(&profile, &HeaderOverrides::new()).unwrap();
            assert_eq!(first, second, "{} composed differently", name);
            assert!(!first.is_empty());
        }
    }

    #[test]
    fn test_override_keeps_canonical_position() {
        let registry = ProfileRegistry::builtin();
        for name in registry.list_names() {
            let profile = registry.lookup(name).unwrap();
            let base = compose(&profile, &HeaderOverrides::new()).unwrap();

            for key in base.names() {
                let overrides = HeaderOverrides::new().with(key.to_ascii_lowercase(), "replaced");
                let composed = compose(&profile, &overrides).unwrap();

                assert_eq!(composed.get(key), Some("replaced"), "{}: {}", name, key);
                assert_eq!(composed.position(key), base.position(key), "{}: {}", name, key);
                // Profile casing wins over caller casing
                assert!(composed.names().contains(&key), "{}: {}", name, key);
                assert_eq!(composed.len(), base.len(), "{}: {}", name, key);
            }
        }
    }

    #[test]
    fn test_optional_slot_is_placed_canonically() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup("chrome131").unwrap();
        let overrides = HeaderOverrides::new()
            .with("Cookie", "session=abc")
            .with("Referer", "https://example.com/");
        let composed = compose(&profile, &overrides).unwrap();

        let referer = composed.position("Referer").unwrap();
        let encoding = composed.position("Accept-Encoding").unwrap();
        let cookie = composed.position("Cookie").unwrap();
        let dest = composed.position("Sec-Fetch-Dest").unwrap();
        assert!(dest < referer && referer < encoding);
        assert!(cookie > encoding);
    }

    #[test]
    fn test_unknown_overrides_are_appended_in_caller_order() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup("firefox117").unwrap();
        let overrides = HeaderOverrides::new()
            .with("X-Second", "2")
            .with("Authorization", "Bearer token")
            .with("Accept", "application/json");
        let composed = compose(&profile, &overrides).unwrap();

        let names = composed.names();
        let n = names.len();
        assert_eq!(&names[n - 2..], &["X-Second", "Authorization"]);
        assert_eq!(composed.position("Accept"), Some(1));
        assert_eq!(composed.get("Accept"), Some("application/json"));
    }

    #[test]
    fn test_override_with_crlf_is_rejected() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup("chrome120").unwrap();
        let overrides = HeaderOverrides::new().with("X-Evil", "a\r\nInjected: yes");
        let err = compose(&profile, &overrides).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderValue { .. }));
    }

    #[test]
    fn test_override_with_control_character_is_rejected() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup("chrome120").unwrap();
        for value in ["nul\0byte", "bell\x07", "del\x7f"] {
            let overrides = HeaderOverrides::new().with("X-Test", value);
            assert!(compose(&profile, &overrides).is_err(), "{:?} accepted", value);
        }
        let tab = HeaderOverrides::new().with("X-Test", "a\tb");
        assert!(compose(&profile, &tab).is_ok());
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup("chrome120").unwrap();
        let overrides = HeaderOverrides::new().with("Bad Name", "x");
        assert!(matches!(
            compose(&profile, &overrides),
            Err(Error::InvalidHeaderValue { .. })
        ));
    }

    #[test]
    fn test_chrome_and_firefox_orders_differ() {
        let registry = ProfileRegistry::builtin();
        let chrome = compose(&registry.lookup("chrome131").unwrap(), &HeaderOverrides::new()).unwrap();
        let firefox = compose(&registry.lookup("firefox133").unwrap(), &HeaderOverrides::new()).unwrap();
        assert_eq!(firefox.names()[0], "User-Agent");
        assert_ne!(chrome.names()[0], "User-Agent");
    }

    #[test]
    fn test_normalize_drops_transport_headers() {
        let normalized = normalize(vec![
            ("Host", "example.com"),
            ("User-Agent", " ua "),
            ("Connection", "keep-alive"),
        ]);
        assert_eq!(normalized, vec![("user-agent".to_string(), "ua".to_string())]);
    }
}
