//! Profile rotation across retried attempts.
//!
//! [`Controller::run`] drives one logical operation through an explicit state
//! machine:
//!
//! ```text
//! SelectingProfile -> Attempting -> Succeeded
//!        ^                |
//!        |                +-> BackingOff -> SelectingProfile
//!        |                +-> (misconfigured profile removed) -> SelectingProfile
//!        +----------------+-> Exhausted
//! ```
//!
//! Attempts run strictly one after another. The attempt budget is mandatory
//! and finite; a profile whose transport configuration is rejected is dropped
//! from the candidate set without consuming a slot.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::fingerprint::{Profile, ProfileRegistry, RegistryHandle};
use crate::intent::RequestIntent;
use crate::response::Response;
use crate::transport::engine::Engine;

/// Statuses that usually mean "this identity was blocked or throttled".
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[403, 429, 503];

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * factor^(n-1)`, capped at `max`.
    Exponential {
        base: Duration,
        factor: u32,
        max: Duration,
    },
}

impl Backoff {
    /// Doubling backoff with a cap.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            factor: 2,
            max,
        }
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, factor, max } => {
                let exp = retry.saturating_sub(1);
                factor
                    .checked_pow(exp)
                    .and_then(|mult| base.checked_mul(mult))
                    .map_or(*max, |d| d.min(*max))
            }
        }
    }
}

/// Attempt budget, backoff and the statuses worth rotating on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts, one second apart, rotating on 403/429/503.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retryable_statuses(mut self, statuses: &[u16]) -> Self {
        self.retryable_statuses = statuses.to_vec();
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    ConnectionRefused,
    /// The engine rejected the profile. Not counted against the budget.
    TransportConfig(String),
    /// A response with a retryable status.
    RemoteError(u16),
    /// Other transport failure: TLS, reset, protocol error.
    Transport(String),
}

impl AttemptOutcome {
    /// Whether the attempt used up a slot of the budget.
    pub fn is_counted(&self) -> bool {
        !matches!(self, AttemptOutcome::TransportConfig(_))
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Timeout => f.write_str("timeout"),
            AttemptOutcome::ConnectionRefused => f.write_str("connection refused"),
            AttemptOutcome::TransportConfig(reason) => write!(f, "transport config: {}", reason),
            AttemptOutcome::RemoteError(status) => write!(f, "remote error {}", status),
            AttemptOutcome::Transport(reason) => write!(f, "transport: {}", reason),
        }
    }
}

/// One attempt of a logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub profile: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub status: Option<u16>,
}

/// Ordered attempt history of one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLog {
    records: Vec<AttemptRecord>,
}

impl AttemptLog {
    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Attempts that consumed budget.
    pub fn counted(&self) -> u32 {
        self.records.iter().filter(|r| r.outcome.is_counted()).count() as u32
    }

    pub fn outcomes(&self) -> Vec<&AttemptOutcome> {
        self.records.iter().map(|r| &r.outcome).collect()
    }

    pub fn profiles(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.profile.as_str()).collect()
    }

    fn push(&mut self, record: AttemptRecord) {
        self.records.push(record);
    }
}

impl fmt::Display for AttemptLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return f.write_str("no attempts");
        }
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(
                f,
                "#{} {} {} ({}ms)",
                i + 1,
                record.profile,
                record.outcome,
                record.elapsed.as_millis()
            )?;
        }
        Ok(())
    }
}

/// Successful result of a rotated operation.
#[derive(Debug)]
pub struct RunOutcome {
    pub response: Response,
    /// The profile that produced `response`, from the run's own snapshot.
    pub profile: Arc<Profile>,
    pub attempts: AttemptLog,
}

/// Candidate profiles and the rotation cursor for one operation.
struct Rotation {
    candidates: Vec<Arc<Profile>>,
    cursor: usize,
    last_failed: Option<String>,
}

impl Rotation {
    fn new(candidates: Vec<Arc<Profile>>) -> Self {
        Self {
            candidates,
            cursor: 0,
            last_failed: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Next profile in sequence order, wrapping. A profile that just failed
    /// is skipped while any other candidate remains.
    fn next(&mut self) -> Option<Arc<Profile>> {
        let len = self.candidates.len();
        if len == 0 {
            return None;
        }
        let mut pick = self.cursor % len;
        // Kept until the next counted attempt; a bind rejection in between
        // must not let the failed profile through
        if let Some(failed) = self.last_failed.as_deref() {
            if let Some(offset) = (0..len).find(|o| self.candidates[(pick + o) % len].name != failed) {
                pick = (pick + offset) % len;
            }
        }
        self.cursor = pick + 1;
        Some(Arc::clone(&self.candidates[pick]))
    }

    /// Record the outcome of a counted attempt.
    fn failed(&mut self, name: &str) {
        self.last_failed = Some(name.to_string());
    }

    fn succeeded(&mut self) {
        self.last_failed = None;
    }

    /// Drop every occurrence of `name`, keeping the cursor on the same
    /// upcoming candidate.
    fn remove(&mut self, name: &str) {
        let upto = self.cursor.min(self.candidates.len());
        let before = self.candidates[..upto]
            .iter()
            .filter(|p| p.name == name)
            .count();
        self.candidates.retain(|p| p.name != name);
        self.cursor = upto - before;
    }
}

enum Classified {
    Success(Response),
    Blocked(Response),
    Retryable(AttemptOutcome),
    Misconfigured(String),
    Fatal(Error),
}

fn classify(result: Result<Response>, policy: &RetryPolicy) -> Classified {
    match result {
        Ok(resp) if policy.is_retryable_status(resp.status) => Classified::Blocked(resp),
        Ok(resp) => Classified::Success(resp),
        Err(Error::Timeout(_)) | Err(Error::ConnectTimeout(_)) => {
            Classified::Retryable(AttemptOutcome::Timeout)
        }
        Err(Error::ConnectionRefused(_)) => Classified::Retryable(AttemptOutcome::ConnectionRefused),
        Err(Error::TransportConfig { reason, .. }) => Classified::Misconfigured(reason),
        Err(
            e @ (Error::Connection(_)
            | Error::Tls(_)
            | Error::HttpProtocol(_)
            | Error::Io(_)
            | Error::Decompression(_)),
        ) => Classified::Retryable(AttemptOutcome::Transport(e.to_string())),
        // Caller errors fail the same way under every profile
        Err(e) => Classified::Fatal(e),
    }
}

enum State {
    SelectingProfile,
    Attempting(Arc<Profile>),
    BackingOff(Duration),
    Succeeded(Response, Arc<Profile>),
    Exhausted,
}

/// Runs logical operations with profile rotation.
///
/// Cloning is cheap; clones share the engine and the registry handle. Each
/// `run` takes one registry snapshot and keeps it until it returns.
pub struct Controller<E> {
    dispatcher: Dispatcher<E>,
    registry: Arc<RegistryHandle>,
}

impl<E> Clone for Controller<E> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: Engine> Controller<E> {
    pub fn new(engine: E, registry: ProfileRegistry) -> Self {
        Self::with_dispatcher(
            Dispatcher::new(engine),
            Arc::new(RegistryHandle::new(registry)),
        )
    }

    /// Share an engine and a hot-reloadable registry.
    pub fn with_dispatcher(dispatcher: Dispatcher<E>, registry: Arc<RegistryHandle>) -> Self {
        Self {
            dispatcher,
            registry,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    pub fn registry_handle(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    /// Current registry snapshot.
    pub fn registry(&self) -> Arc<ProfileRegistry> {
        self.registry.snapshot()
    }

    /// Execute `intent`, rotating through `sequence` on retryable failures.
    ///
    /// An empty `sequence` means the intent's pinned profile, or failing that
    /// the registry order. A pinned profile is always tried first.
    ///
    /// Returns the first non-retryable response. Fails with
    /// [`Error::Exhausted`] once `policy.max_attempts` attempts were made or
    /// no usable profile remains; caller errors (unknown profile, invalid
    /// header, invalid URL) abort immediately.
    pub async fn run<S: AsRef<str>>(
        &self,
        intent: &RequestIntent,
        sequence: &[S],
        policy: &RetryPolicy,
    ) -> Result<RunOutcome> {
        policy.validate()?;
        intent.timeouts.validate()?;

        let registry = self.registry.snapshot();
        let names = resolve_sequence(intent, sequence, &registry);
        let candidates = names
            .iter()
            .map(|name| registry.lookup(name))
            .collect::<Result<Vec<_>>>()?;
        if candidates.is_empty() {
            return Err(Error::invalid_config("no profiles to rotate through"));
        }

        let mut rotation = Rotation::new(candidates);
        let mut log = AttemptLog::default();
        let mut last_blocked: Option<Response> = None;
        let mut state = State::SelectingProfile;

        loop {
            state = match state {
                State::SelectingProfile => {
                    if log.counted() >= policy.max_attempts {
                        State::Exhausted
                    } else {
                        match rotation.next() {
                            Some(profile) => State::Attempting(profile),
                            None => State::Exhausted,
                        }
                    }
                }

                State::Attempting(profile) => {
                    let attempt = log.counted() + 1;
                    tracing::debug!(profile = %profile.name, attempt, "attempting");
                    let started = Instant::now();
                    let result = self.dispatcher.execute(intent, &profile).await;
                    let elapsed = started.elapsed();

                    let record = |outcome: AttemptOutcome, status: Option<u16>| AttemptRecord {
                        profile: profile.name.clone(),
                        outcome,
                        elapsed,
                        status,
                    };

                    let failure = match classify(result, policy) {
                        Classified::Success(resp) => {
                            log.push(record(AttemptOutcome::Success, Some(resp.status)));
                            rotation.succeeded();
                            tracing::info!(profile = %profile.name, attempt, status = resp.status, "succeeded");
                            state = State::Succeeded(resp, Arc::clone(&profile));
                            continue;
                        }
                        Classified::Misconfigured(reason) => {
                            tracing::warn!(profile = %profile.name, reason = %reason, "profile rejected by transport, removed from rotation");
                            log.push(record(AttemptOutcome::TransportConfig(reason), None));
                            rotation.remove(&profile.name);
                            state = State::SelectingProfile;
                            continue;
                        }
                        Classified::Fatal(e) => return Err(e),
                        Classified::Blocked(resp) => {
                            let status = resp.status;
                            last_blocked = Some(resp);
                            record(AttemptOutcome::RemoteError(status), Some(status))
                        }
                        Classified::Retryable(outcome) => {
                            last_blocked = None;
                            record(outcome, None)
                        }
                    };

                    tracing::info!(
                        profile = %profile.name,
                        attempt,
                        outcome = %failure.outcome,
                        "attempt failed, rotating"
                    );
                    log.push(failure);
                    rotation.failed(&profile.name);

                    if log.counted() >= policy.max_attempts || rotation.is_empty() {
                        State::Exhausted
                    } else {
                        State::BackingOff(policy.backoff.delay(log.counted()))
                    }
                }

                State::BackingOff(delay) => {
                    if !delay.is_zero() {
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off");
                        tokio::time::sleep(delay).await;
                    }
                    State::SelectingProfile
                }

                State::Succeeded(response, profile) => {
                    return Ok(RunOutcome {
                        response,
                        profile,
                        attempts: log,
                    });
                }

                State::Exhausted => {
                    tracing::warn!(attempts = log.len(), "rotation exhausted");
                    return Err(Error::Exhausted {
                        attempts: log,
                        last_response: last_blocked.map(Box::new),
                    });
                }
            };
        }
    }
}

fn resolve_sequence<S: AsRef<str>>(
    intent: &RequestIntent,
    sequence: &[S],
    registry: &ProfileRegistry,
) -> Vec<String> {
    let explicit: Vec<String> = sequence.iter().map(|s| s.as_ref().to_string()).collect();
    match (&intent.profile, explicit.is_empty()) {
        (Some(pinned), false) => {
            let mut names = vec![pinned.clone()];
            names.extend(explicit.into_iter().filter(|n| n != pinned));
            names
        }
        (None, false) => explicit,
        (Some(pinned), true) => vec![pinned.clone()],
        (None, true) => registry.list_names().into_iter().map(String::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles(names: &[&str]) -> Vec<Arc<Profile>> {
        names
            .iter()
            .map(|n| Arc::new(Profile::builder(*n).build().unwrap()))
            .collect()
    }

    fn pick(rotation: &mut Rotation) -> String {
        rotation.next().unwrap().name.clone()
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(64), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_and_no_backoff() {
        assert_eq!(Backoff::Fixed(Duration::from_secs(1)).delay(7), Duration::from_secs(1));
        assert_eq!(Backoff::None.delay(1), Duration::ZERO);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut rotation = Rotation::new(profiles(&["a", "b"]));
        assert_eq!(pick(&mut rotation), "a");
        assert_eq!(pick(&mut rotation), "b");
        assert_eq!(pick(&mut rotation), "a");
    }

    #[test]
    fn test_rotation_skips_profile_that_just_failed() {
        let mut rotation = Rotation::new(profiles(&["a", "a", "b"]));
        assert_eq!(pick(&mut rotation), "a");
        rotation.failed("a");
        assert_eq!(pick(&mut rotation), "b");
    }

    #[test]
    fn test_rotation_skip_survives_bind_rejection() {
        let mut rotation = Rotation::new(profiles(&["x", "y", "x", "z"]));
        assert_eq!(pick(&mut rotation), "x");
        rotation.failed("x");
        assert_eq!(pick(&mut rotation), "y");
        rotation.remove("y");
        assert_eq!(pick(&mut rotation), "z");
    }

    #[test]
    fn test_rotation_reuses_single_profile() {
        let mut rotation = Rotation::new(profiles(&["a"]));
        assert_eq!(pick(&mut rotation), "a");
        rotation.failed("a");
        assert_eq!(pick(&mut rotation), "a");
    }

    #[test]
    fn test_rotation_remove_keeps_cursor() {
        let mut rotation = Rotation::new(profiles(&["a", "b", "c", "b"]));
        assert_eq!(pick(&mut rotation), "a");
        assert_eq!(pick(&mut rotation), "b");
        rotation.remove("b");
        assert_eq!(pick(&mut rotation), "c");
        assert_eq!(pick(&mut rotation), "a");
        assert_eq!(pick(&mut rotation), "c");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(RetryPolicy::new(0).validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_resolve_sequence() {
        let registry = ProfileRegistry::builtin();
        let intent = RequestIntent::get("https://example.com");
        assert_eq!(
            resolve_sequence(&intent, &["x", "y"], &registry),
            vec!["x", "y"]
        );
        assert_eq!(
            resolve_sequence::<&str>(&intent, &[], &registry),
            registry.list_names()
        );

        let pinned = intent.profile("y");
        assert_eq!(
            resolve_sequence(&pinned, &["x", "y", "z"], &registry),
            vec!["y", "x", "z"]
        );
        assert_eq!(resolve_sequence::<&str>(&pinned, &[], &registry), vec!["y"]);
    }

    #[test]
    fn test_attempt_log_display() {
        let mut log = AttemptLog::default();
        log.push(AttemptRecord {
            profile: "chrome120".into(),
            outcome: AttemptOutcome::RemoteError(429),
            elapsed: Duration::from_millis(12),
            status: Some(429),
        });
        log.push(AttemptRecord {
            profile: "edge101".into(),
            outcome: AttemptOutcome::TransportConfig("cipher list".into()),
            elapsed: Duration::ZERO,
            status: None,
        });
        assert_eq!(
            log.to_string(),
            "#1 chrome120 remote error 429 (12ms); #2 edge101 transport config: cipher list (0ms)"
        );
        assert_eq!(log.counted(), 1);
    }
}
