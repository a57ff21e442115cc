//! # Guise
//!
//! HTTP client that wears a browser identity.
//!
//! A [`Profile`] bundles one browser's TLS handshake (cipher, group and
//! signature-algorithm order, GREASE, extension permutation, certificate
//! compression), its HTTP/2 SETTINGS, TCP options and its default headers in
//! canonical order. Every attempt uses exactly one profile end to end.
//!
//! - [`Dispatcher`] runs one attempt under one profile, with a deadline.
//! - [`Controller`] rotates profiles across retried attempts.
//! - [`Validator`] asks a fingerprint probe what it saw and compares.
//!
//! ```no_run
//! use guise::{BoringEngine, Controller, ProfileRegistry, RequestIntent, RetryPolicy};
//!
//! # async fn demo() -> guise::Result<()> {
//! let controller = Controller::new(BoringEngine::new(), ProfileRegistry::builtin());
//! let intent = RequestIntent::get("https://example.com/");
//! let outcome = controller
//!     .run(&intent, &["chrome131", "firefox133"], &RetryPolicy::new(3))
//!     .await?;
//! println!("{} via {}", outcome.response.status, outcome.response.profile());
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod headers;
pub mod intent;
pub mod response;
pub mod rotation;
pub mod timeouts;
pub mod transport;
pub mod validate;
pub mod version;

pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use fingerprint::{Profile, ProfileBuilder, ProfileRegistry, RegistryHandle};
pub use headers::{compose, HeaderOverrides, OrderedHeaders};
pub use intent::RequestIntent;
pub use response::Response;
pub use rotation::{
    AttemptLog, AttemptOutcome, AttemptRecord, Backoff, Controller, RetryPolicy, RunOutcome,
};
pub use timeouts::Timeouts;
pub use transport::{Binding, BoringEngine, Engine, OutboundRequest};
pub use validate::{
    FingerprintObservation, Mismatch, Observed, ValidationReport, ValidationResult, Validator,
    ValidatorConfig,
};
pub use version::ProtocolVersion;
