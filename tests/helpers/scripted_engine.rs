use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use guise::{Binding, Engine, Error, OutboundRequest, Profile, Response};

/// Scripted behaviour of one attempt.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Answer with this status.
    Respond(u16),
    /// Never answer; the attempt deadline fires.
    Hang,
    Refused,
    /// Reject the profile at bind time.
    RejectConfig,
}

/// What the engine was asked to do, in order.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Bound(String),
    Sent { profile: String, user_agent: Option<String> },
    Released(String),
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    events: Mutex<Vec<Event>>,
    live: AtomicUsize,
}

/// Engine double: no network, outcomes scripted per profile.
///
/// A profile with no script left answers 200.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    shared: Arc<Shared>,
}

#[allow(dead_code)]
impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, profile: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.shared
            .scripts
            .lock()
            .unwrap()
            .entry(profile.to_string())
            .or_default()
            .extend(steps);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    /// Profiles in the order they were bound.
    pub fn bound(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Bound(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Bindings not yet released.
    pub fn live_bindings(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    fn next_step(&self, profile: &str) -> Step {
        self.shared
            .scripts
            .lock()
            .unwrap()
            .get_mut(profile)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Respond(200))
    }

    fn record(&self, event: Event) {
        self.shared.events.lock().unwrap().push(event);
    }
}

impl Engine for ScriptedEngine {
    type Binding = ScriptedBinding;

    fn bind(&self, profile: &Arc<Profile>) -> guise::Result<ScriptedBinding> {
        let step = self.next_step(&profile.name);
        if step == Step::RejectConfig {
            return Err(Error::transport_config(&profile.name, "unsupported cipher list"));
        }
        self.record(Event::Bound(profile.name.clone()));
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedBinding {
            engine: self.clone(),
            profile: Arc::clone(profile),
            step,
        })
    }
}

pub struct ScriptedBinding {
    engine: ScriptedEngine,
    profile: Arc<Profile>,
    step: Step,
}

impl Binding for ScriptedBinding {
    fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    async fn send(&mut self, request: OutboundRequest) -> guise::Result<Response> {
        self.engine.record(Event::Sent {
            profile: self.profile.name.clone(),
            user_agent: request.headers.get("user-agent").map(str::to_string),
        });
        match self.step {
            Step::Respond(status) => Ok(Response::new(
                status,
                vec![("Content-Type".to_string(), "text/plain".to_string())],
                Bytes::from_static(b"ok"),
                self.profile.target_protocol(),
            )),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::connection("hung connection closed"))
            }
            Step::Refused => Err(Error::ConnectionRefused("127.0.0.1:9".to_string())),
            Step::RejectConfig => Err(Error::transport_config(&self.profile.name, "rejected")),
        }
    }
}

impl Drop for ScriptedBinding {
    fn drop(&mut self) {
        self.engine.shared.live.fetch_sub(1, Ordering::SeqCst);
        self.engine.record(Event::Released(self.profile.name.clone()));
    }
}
