//! TLS, HTTP/2 and TCP fingerprinting configuration.

pub mod http2;
pub mod profiles;
pub mod tcp;
pub mod tls;

pub use http2::Http2Settings;
pub use profiles::{Profile, ProfileBuilder, ProfileRegistry, RegistryHandle};
pub use tcp::TcpFingerprint;
pub use tls::{CertCompression, TlsFingerprint, TlsVersion};
