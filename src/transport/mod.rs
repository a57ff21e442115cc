//! Profile-bound transports.
//!
//! - [`engine`]: the `Engine`/`Binding` seam dispatch is written against
//! - [`connector`]: BoringSSL engine (TLS, TCP options, ALPN)
//! - HTTP/1.1 with raw header serialization, HTTP/2 via hyper

pub mod connector;
pub mod engine;
pub mod h1;
pub mod h2;

pub use connector::{BoringBinding, BoringEngine};
pub use engine::{Binding, Engine, OutboundRequest};
