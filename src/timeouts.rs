//! Per-attempt timeout configuration.
//!
//! Timeouts apply to a single dispatch attempt. A caller with an overall
//! deadline splits it into per-attempt budgets before handing a
//! [`RequestIntent`](crate::intent::RequestIntent) to the controller.
//!
//! # Timeout Types
//!
//! - **connect**: TCP + TLS handshake
//! - **total**: Absolute deadline for the attempt (connect, send, full response)
//!
//! # Usage
//!
//! ```rust
//! use guise::Timeouts;
//! use std::time::Duration;
//!
//! let t = Timeouts::api_defaults().connect(Duration::from_secs(3));
//! assert_eq!(t.total, Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Timeout configuration for one attempt.
///
/// `connect` is optional; `total` is always enforced so an attempt can never
/// hang a rotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for establishing the connection (DNS + TCP + TLS handshake).
    pub connect: Option<Duration>,

    /// Deadline for the whole attempt. Does NOT reset.
    pub total: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::api_defaults()
    }
}

impl Timeouts {
    /// Create timeouts with only a total deadline.
    pub fn new(total: Duration) -> Self {
        Self {
            connect: None,
            total,
        }
    }

    /// Sensible defaults for normal requests.
    ///
    /// - connect: 10s
    /// - total: 30s
    pub fn api_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            total: Duration::from_secs(30),
        }
    }

    /// Defaults for fingerprint probes.
    ///
    /// - connect: 5s
    /// - total: 10s
    pub fn probe_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(5)),
            total: Duration::from_secs(10),
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set total attempt deadline.
    pub fn total(mut self, timeout: Duration) -> Self {
        self.total = timeout;
        self
    }

    /// Disable connect timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.total.is_zero() {
            return Err(Error::invalid_config("total attempt timeout must be non-zero"));
        }
        Ok(())
    }
}
