//! Fingerprint validation against a remote probe.
//!
//! A probe service reports what it observed about our request: negotiated
//! protocol, TLS digests, HTTP/2 SETTINGS and the header list it received.
//! [`Validator::validate`] sends one probe under one profile and compares the
//! report with what that profile should have produced. A mismatch is a
//! normal result, not an error.
//!
//! Understood report shapes:
//! - tls.peet.ws `/api/all` (`http_version`, `tls`, `http2.sent_frames`, `http1.headers`)
//! - tls.browserleaks.com `/json` (`ja3_hash`, `ja4`, `akamai_text`, `user_agent`)
//! - httpbin `/headers` (`headers` object, unordered)
//!
//! Missing or oddly typed fields become [`Observed::Unknown`] and are not compared.

use std::fmt;

use serde_json::Value;

use crate::error::Result;
use crate::fingerprint::http2::strip_grease_settings;
use crate::fingerprint::tls::AUTOMATION_JA3_HASHES;
use crate::fingerprint::Profile;
use crate::headers::{compose, normalize, OrderedHeaders};
use crate::intent::RequestIntent;
use crate::rotation::{AttemptLog, Backoff, Controller, RetryPolicy};
use crate::timeouts::Timeouts;
use crate::transport::engine::Engine;
use crate::version::ProtocolVersion;

/// Default probe: reports TLS, HTTP/2 and header details in one document.
pub const DEFAULT_PROBE_URL: &str = "https://tls.peet.ws/api/all";

/// A value the probe may or may not have reported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Observed<T> {
    Known(T),
    #[default]
    Unknown,
}

impl<T> Observed<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Observed::Known(v) => Some(v),
            Observed::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Observed::Known(_))
    }
}

impl<T> From<Option<T>> for Observed<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Observed::Unknown, Observed::Known)
    }
}

/// What the probe says it saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintObservation {
    pub protocol: Observed<ProtocolVersion>,
    pub ja3_hash: Observed<String>,
    pub ja4: Observed<String>,
    /// Akamai HTTP/2 fingerprint (`settings|window_update|priority|pseudo_order`).
    pub akamai: Observed<String>,
    pub user_agent: Observed<String>,
    /// Echoed headers, pseudo-headers excluded.
    pub headers: Observed<Vec<(String, String)>>,
    /// Whether `headers` preserves the order the probe received them in.
    pub headers_ordered: bool,
}

impl FingerprintObservation {
    /// Parse a probe report. Never fails; unrecognized parts are `Unknown`.
    pub fn from_json(report: &Value) -> Self {
        let protocol = match str_at(report, &["http_version"]) {
            Some(raw) => match ProtocolVersion::parse_reported(raw) {
                Some(v) => Observed::Known(v),
                None => {
                    tracing::warn!(reported = raw, "unrecognized protocol version in probe report");
                    Observed::Unknown
                }
            },
            None => Observed::Unknown,
        };

        let (headers, headers_ordered) = echoed_headers(report);
        let user_agent = str_at(report, &["user_agent"])
            .map(str::to_string)
            .or_else(|| {
                headers.known().and_then(|h| {
                    h.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
                        .map(|(_, v)| v.clone())
                })
            });

        Self {
            protocol,
            ja3_hash: first_str(report, &[&["tls", "ja3_hash"], &["ja3_hash"]]).into(),
            ja4: first_str(report, &[&["tls", "ja4"], &["ja4"]]).into(),
            akamai: first_str(report, &[&["http2", "akamai_fingerprint"], &["akamai_text"]])
                .filter(|s| !s.is_empty() && s != "-")
                .into(),
            user_agent: user_agent.into(),
            headers,
            headers_ordered,
        }
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    match cur {
        Value::String(s) => Some(s.as_str()),
        Value::Null => None,
        other => {
            tracing::warn!(field = %path.join("."), value = %other, "unexpected type in probe report");
            None
        }
    }
}

fn first_str(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| str_at(value, path))
        .map(str::to_string)
}

/// `"Name: value"` lines, as peet reports them.
fn parse_header_lines(lines: &[Value]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|line| line.split_once(':'))
        .filter_map(|(k, v)| {
            // ":method: GET" splits on the leading colon
            if k.is_empty() {
                return None;
            }
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn echoed_headers(report: &Value) -> (Observed<Vec<(String, String)>>, bool) {
    if let Some(lines) = report.pointer("/http1/headers").and_then(Value::as_array) {
        return (Observed::Known(parse_header_lines(lines)), true);
    }

    if let Some(frames) = report.pointer("/http2/sent_frames").and_then(Value::as_array) {
        let headers_frame = frames.iter().find(|f| {
            f.get("frame_type").and_then(Value::as_str) == Some("HEADERS")
        });
        if let Some(lines) = headers_frame
            .and_then(|f| f.get("headers"))
            .and_then(Value::as_array)
        {
            return (Observed::Known(parse_header_lines(lines)), true);
        }
    }

    if let Some(map) = report.get("headers").and_then(Value::as_object) {
        let headers = map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();
        return (Observed::Known(headers), false);
    }

    (Observed::Unknown, false)
}

/// One field that disagreed with the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub field: &'static str,
    pub expected: String,
    pub observed: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, observed {}", self.field, self.expected, self.observed)
    }
}

/// Outcome of comparing a probe report with a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Consistent,
    Inconsistent(Vec<Mismatch>),
}

impl ValidationResult {
    pub fn is_consistent(&self) -> bool {
        matches!(self, ValidationResult::Consistent)
    }

    /// Names of the fields that disagreed, in check order.
    pub fn mismatched_fields(&self) -> Vec<&'static str> {
        match self {
            ValidationResult::Consistent => Vec::new(),
            ValidationResult::Inconsistent(m) => m.iter().map(|m| m.field).collect(),
        }
    }
}

/// Compare an observation with what `profile` sent as `composed` headers.
///
/// Fields the probe did not report are skipped.
pub fn check(
    profile: &Profile,
    composed: &OrderedHeaders,
    observation: &FingerprintObservation,
) -> ValidationResult {
    let mut mismatches = Vec::new();
    let mut mismatch = |field: &'static str, expected: String, observed: String| {
        mismatches.push(Mismatch {
            field,
            expected,
            observed,
        })
    };

    let target = profile.target_protocol();
    if let Some(observed) = observation.protocol.known() {
        if *observed != target {
            mismatch("protocol_version", target.to_string(), observed.to_string());
        }
    }

    if let Some(ja3) = observation.ja3_hash.known() {
        if AUTOMATION_JA3_HASHES.contains(&ja3.as_str()) {
            mismatch("handshake", "browser JA3".to_string(), format!("automation JA3 {}", ja3));
        }
    }
    if let (Some(ja4), Some(expected)) = (
        observation.ja4.known(),
        profile.tls.ja4_prefix(profile.protocols.first().copied()),
    ) {
        let observed = ja4.split('_').next().unwrap_or_default();
        if observed != expected {
            mismatch("handshake", expected, observed.to_string());
        }
    }

    if let Some(akamai) = observation.akamai.known() {
        if profile.protocols.contains(&ProtocolVersion::Http2) {
            let mut sections = akamai.split('|');
            let settings = strip_grease_settings(sections.next().unwrap_or_default());
            let window = sections.next().unwrap_or_default().trim().to_string();
            let expected_settings = profile.http2.akamai_settings();
            let expected_window = profile.http2.initial_window_update.to_string();
            if settings != expected_settings || window != expected_window {
                mismatch(
                    "http2_settings",
                    format!("{}|{}", expected_settings, expected_window),
                    format!("{}|{}", settings, window),
                );
            }
        }
    }

    if let (Some(observed), Some(expected)) =
        (observation.user_agent.known(), composed.get("user-agent"))
    {
        if observed.trim() != expected.trim() {
            mismatch("user_agent", expected.to_string(), observed.clone());
        }
    }

    if let Some(echoed) = observation.headers.known() {
        let expected = normalize(composed.iter());
        let observed = normalize(echoed.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let differing: Vec<String> = expected
            .iter()
            .filter(|(name, value)| {
                observed
                    .iter()
                    .find(|(k, _)| k == name)
                    .map_or(true, |(_, v)| v != value)
            })
            .map(|(name, _)| name.clone())
            .collect();
        if !differing.is_empty() {
            mismatch(
                "headers",
                expected.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(","),
                format!("missing or different: {}", differing.join(",")),
            );
        }

        if observation.headers_ordered {
            let expected_order: Vec<&str> = expected.iter().map(|(k, _)| k.as_str()).collect();
            let observed_order: Vec<&str> = observed
                .iter()
                .map(|(k, _)| k.as_str())
                .filter(|k| expected_order.contains(k))
                .collect();
            let comparable: Vec<&str> = expected_order
                .iter()
                .copied()
                .filter(|k| observed_order.contains(k))
                .collect();
            if observed_order != comparable {
                mismatch("header_order", comparable.join(","), observed_order.join(","));
            }
        }
    }

    if mismatches.is_empty() {
        ValidationResult::Consistent
    } else {
        ValidationResult::Inconsistent(mismatches)
    }
}

/// Probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub probe_url: String,
    pub timeouts: Timeouts,
    /// Attempts with the same profile before giving up.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_url: DEFAULT_PROBE_URL.to_string(),
            timeouts: Timeouts::probe_defaults(),
            max_attempts: 2,
            backoff: Backoff::Fixed(std::time::Duration::from_secs(1)),
        }
    }
}

impl ValidatorConfig {
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = url.into();
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Full validation outcome, with what was observed.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub profile: String,
    pub status: u16,
    pub observation: FingerprintObservation,
    pub result: ValidationResult,
    pub attempts: AttemptLog,
}

/// Checks that a profile's impersonation survives contact with a probe.
pub struct Validator<E> {
    controller: Controller<E>,
    config: ValidatorConfig,
}

impl<E> Clone for Validator<E> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E: Engine> Validator<E> {
    pub fn new(controller: Controller<E>, config: ValidatorConfig) -> Self {
        Self { controller, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Probe with `profile_name` and compare.
    pub async fn validate(&self, profile_name: &str) -> Result<ValidationResult> {
        Ok(self.validate_report(profile_name).await?.result)
    }

    /// Like [`validate`](Self::validate), keeping the observation and attempts.
    pub async fn validate_report(&self, profile_name: &str) -> Result<ValidationReport> {
        let intent = RequestIntent::get(self.config.probe_url.clone())
            .profile(profile_name)
            .timeouts(self.config.timeouts.clone());
        let policy = RetryPolicy::new(self.config.max_attempts).backoff(self.config.backoff.clone());

        // Single-element sequence: no rotation while validating one identity
        let outcome = self
            .controller
            .run(&intent, &[profile_name], &policy)
            .await?;

        let report: Value = outcome.response.json().map_err(|e| {
            tracing::warn!(profile = profile_name, status = outcome.response.status, "probe returned a non-JSON body");
            e
        })?;
        let observation = FingerprintObservation::from_json(&report);
        // Compare against the profile the run dispatched, not a fresh lookup
        let profile = &outcome.profile;
        let composed = compose(profile, &intent.headers)?;
        let result = check(profile, &composed, &observation);

        match &result {
            ValidationResult::Consistent => {
                tracing::info!(profile = profile_name, "fingerprint consistent")
            }
            ValidationResult::Inconsistent(mismatches) => {
                for m in mismatches {
                    tracing::info!(profile = profile_name, field = m.field, expected = %m.expected, observed = %m.observed, "fingerprint mismatch");
                }
            }
        }

        Ok(ValidationReport {
            profile: profile_name.to_string(),
            status: outcome.response.status,
            observation,
            result,
            attempts: outcome.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ProfileRegistry;
    use crate::headers::HeaderOverrides;
    use serde_json::json;

    fn chrome() -> (std::sync::Arc<Profile>, OrderedHeaders) {
        let profile = ProfileRegistry::builtin().lookup("chrome131").unwrap();
        let composed = compose(&profile, &HeaderOverrides::new()).unwrap();
        (profile, composed)
    }

    fn http2_lines(composed: &OrderedHeaders) -> Vec<String> {
        let mut lines = vec![
            ":method: GET".to_string(),
            ":authority: tls.peet.ws".to_string(),
            ":scheme: https".to_string(),
            ":path: /api/all".to_string(),
        ];
        lines.extend(
            composed
                .iter()
                .map(|(k, v)| format!("{}: {}", k.to_ascii_lowercase(), v)),
        );
        lines
    }

    #[test]
    fn test_matching_peet_report_is_consistent() {
        let (profile, composed) = chrome();
        let report = json!({
            "http_version": "h2",
            "user_agent": profile.user_agent().unwrap(),
            "tls": { "ja3_hash": "0123", "ja4": "t13d1516h2_8daaf6152771_02713d6af862" },
            "http2": {
                "akamai_fingerprint": "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p",
                "sent_frames": [
                    { "frame_type": "SETTINGS" },
                    { "frame_type": "HEADERS", "headers": http2_lines(&composed) }
                ]
            }
        });
        let obs = FingerprintObservation::from_json(&report);
        assert!(obs.headers_ordered);
        assert_eq!(check(&profile, &composed, &obs), ValidationResult::Consistent);
    }

    #[test]
    fn test_protocol_downgrade_reported() {
        let (profile, composed) = chrome();
        let obs = FingerprintObservation::from_json(&json!({ "http_version": "HTTP/1.1" }));
        assert_eq!(
            check(&profile, &composed, &obs).mismatched_fields(),
            vec!["protocol_version"]
        );
    }

    #[test]
    fn test_missing_fields_are_unknown() {
        let obs = FingerprintObservation::from_json(&json!({ "ip": "1.2.3.4", "tls": 7 }));
        assert_eq!(obs, FingerprintObservation::default());
        let (profile, composed) = chrome();
        assert!(check(&profile, &composed, &obs).is_consistent());
    }

    #[test]
    fn test_automation_ja3_flagged() {
        let (profile, composed) = chrome();
        let obs = FingerprintObservation::from_json(&json!({
            "ja3_hash": AUTOMATION_JA3_HASHES[0],
        }));
        assert_eq!(check(&profile, &composed, &obs).mismatched_fields(), vec!["handshake"]);
    }

    #[test]
    fn test_grease_setting_ignored_but_window_checked() {
        let (profile, composed) = chrome();
        let grease = FingerprintObservation::from_json(&json!({
            "akamai_text": "1:65536;2:0;4:6291456;6:262144;43690:0|15663105|0|m,a,s,p"
        }));
        assert!(check(&profile, &composed, &grease).is_consistent());

        let wrong_window = FingerprintObservation::from_json(&json!({
            "akamai_text": "1:65536;2:0;4:6291456;6:262144|65535|0|m,a,s,p"
        }));
        assert_eq!(
            check(&profile, &composed, &wrong_window).mismatched_fields(),
            vec!["http2_settings"]
        );
    }

    #[test]
    fn test_reordered_headers_flagged() {
        let (profile, composed) = chrome();
        let mut lines: Vec<String> = composed.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        lines.reverse();
        let obs = FingerprintObservation::from_json(&json!({ "http1": { "headers": lines } }));
        assert_eq!(check(&profile, &composed, &obs).mismatched_fields(), vec!["header_order"]);
    }

    #[test]
    fn test_httpbin_headers_are_unordered() {
        let (profile, composed) = chrome();
        let mut map = serde_json::Map::new();
        for (k, v) in composed.iter() {
            map.insert(k.to_string(), json!(v));
        }
        map.insert("X-Amzn-Trace-Id".into(), json!("Root=1-abc"));
        let obs = FingerprintObservation::from_json(&json!({ "headers": map }));
        assert!(!obs.headers_ordered);
        assert_eq!(obs.user_agent.known().map(String::as_str), profile.user_agent());
        assert!(check(&profile, &composed, &obs).is_consistent());
    }

    #[test]
    fn test_changed_header_value_flagged() {
        let (profile, composed) = chrome();
        let lines: Vec<String> = composed
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("accept-language") {
                    format!("{}: de-DE", k)
                } else {
                    format!("{}: {}", k, v)
                }
            })
            .collect();
        let obs = FingerprintObservation::from_json(&json!({ "http1": { "headers": lines } }));
        let result = check(&profile, &composed, &obs);
        assert_eq!(result.mismatched_fields(), vec!["headers"]);
        if let ValidationResult::Inconsistent(m) = result {
            assert!(m[0].observed.contains("accept-language"));
        }
    }
}
