//! TLS fingerprint configuration (JA3/JA4).
//!
//! Cipher suites, groups and signature algorithms are handed to BoringSSL
//! in the listed order. TLS 1.3 suites are fixed by BoringSSL and only
//! count toward the JA4 prefix.

use crate::version::ProtocolVersion;

/// Chrome (110+) cipher suites in exact order, GREASE excluded.
pub const CHROME_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chrome signature algorithms.
pub const CHROME_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chrome supported groups.
pub const CHROME_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Chrome 120 extension IDs (sorted, GREASE excluded). 17513 is ALPS.
pub const CHROME_120_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 18, 23, 27, 35, 43, 45, 51, 17513, 65037, 65281,
];

/// Chrome 131 extension IDs. ALPS moved to the 17613 codepoint.
pub const CHROME_131_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 18, 23, 27, 35, 43, 45, 51, 17613, 65037, 65281,
];

/// Chromium 101 (Edge 101) extension IDs, before ECH GREASE.
pub const EDGE_101_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 18, 21, 23, 27, 35, 43, 45, 51, 17513, 65281,
];

/// Firefox cipher suites. ChaCha20 is preferred over AES-256.
pub const FIREFOX_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Firefox signature algorithms (includes the SHA-1 fallbacks Firefox still offers).
pub const FIREFOX_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_secp521r1_sha512",
    "rsa_pss_rsae_sha256",
    "rsa_pss_rsae_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha256",
    "rsa_pkcs1_sha384",
    "rsa_pkcs1_sha512",
    "ecdsa_sha1",
    "rsa_pkcs1_sha1",
];

/// Firefox supported groups, including P-521.
pub const FIREFOX_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Firefox 117 extension IDs. 28 is record_size_limit, 34 delegated_credentials.
pub const FIREFOX_117_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 23, 28, 34, 35, 43, 45, 51, 65037, 65281,
];

/// Firefox 133 extension IDs (adds compress_certificate).
pub const FIREFOX_133_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 23, 27, 28, 34, 35, 43, 45, 51, 65037, 65281,
];

/// Safari 16 cipher suites, including the legacy CBC and 3DES tail.
pub const SAFARI_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA256",
    "TLS_RSA_WITH_AES_128_CBC_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_3DES_EDE_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
    "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
];

/// Safari signature algorithms.
pub const SAFARI_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_sha1",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
    "rsa_pkcs1_sha1",
];

/// Safari supported groups.
pub const SAFARI_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Safari 16 extension IDs.
pub const SAFARI_16_EXTENSION_IDS: &[u16] = &[
    0, 5, 10, 11, 13, 16, 18, 21, 23, 27, 43, 45, 51, 65281,
];

/// JA3 hashes of well-known automation stacks. A probe reporting one of
/// these means the impersonation did not take effect.
pub const AUTOMATION_JA3_HASHES: &[&str] = &[
    // python-requests / urllib3 on OpenSSL
    "8d9f7747675e24454cd9b7ed35c58707",
    // cURL 7.x
    "e7d705a3286e19ea42f587b344ee6865",
];

/// Certificate compression algorithm advertised in compress_certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertCompression {
    /// Chrome, Edge.
    Brotli,
    /// Safari.
    Zlib,
    #[default]
    None,
}

/// TLS protocol version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls1_0,
    Tls1_2,
    Tls1_3,
}

/// TLS fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Extension IDs the browser sends (for JA4 counting).
    pub extensions: Vec<u16>,
    /// Enable GREASE values.
    pub grease: bool,
    /// Randomize extension order per connection (Chrome 110+).
    pub permute_extensions: bool,
    /// Certificate compression algorithm.
    pub cert_compression: CertCompression,
    /// Lowest version offered.
    pub min_version: TlsVersion,
    /// Highest version offered.
    pub max_version: TlsVersion,
}

impl Default for TlsFingerprint {
    fn default() -> Self {
        Self {
            cipher_list: vec![],
            sigalgs: vec![],
            curves: vec![],
            extensions: vec![],
            grease: false,
            permute_extensions: false,
            cert_compression: CertCompression::None,
            min_version: TlsVersion::Tls1_2,
            max_version: TlsVersion::Tls1_3,
        }
    }
}

impl TlsFingerprint {
    /// Chrome 120.
    pub fn chrome_120() -> Self {
        Self {
            cipher_list: CHROME_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROME_CURVES.to_vec(),
            extensions: CHROME_120_EXTENSION_IDS.to_vec(),
            grease: true,
            permute_extensions: true,
            cert_compression: CertCompression::Brotli,
            ..Self::default()
        }
    }

    /// Chrome 131.
    pub fn chrome_131() -> Self {
        Self {
            extensions: CHROME_131_EXTENSION_IDS.to_vec(),
            ..Self::chrome_120()
        }
    }

    /// Edge 101 (Chromium 101, static extension order).
    pub fn edge_101() -> Self {
        Self {
            extensions: EDGE_101_EXTENSION_IDS.to_vec(),
            permute_extensions: false,
            ..Self::chrome_120()
        }
    }

    /// Firefox 117. No GREASE.
    pub fn firefox_117() -> Self {
        Self {
            cipher_list: FIREFOX_CIPHER_SUITES.to_vec(),
            sigalgs: FIREFOX_SIGNATURE_ALGORITHMS.to_vec(),
            curves: FIREFOX_CURVES.to_vec(),
            extensions: FIREFOX_117_EXTENSION_IDS.to_vec(),
            grease: false,
            permute_extensions: false,
            cert_compression: CertCompression::None,
            ..Self::default()
        }
    }

    /// Firefox 133. Randomizes extension order, still no GREASE.
    pub fn firefox_133() -> Self {
        Self {
            extensions: FIREFOX_133_EXTENSION_IDS.to_vec(),
            permute_extensions: true,
            cert_compression: CertCompression::Zlib,
            ..Self::firefox_117()
        }
    }

    /// Safari 16.0 on macOS.
    pub fn safari_16() -> Self {
        Self {
            cipher_list: SAFARI_CIPHER_SUITES.to_vec(),
            sigalgs: SAFARI_SIGNATURE_ALGORITHMS.to_vec(),
            curves: SAFARI_CURVES.to_vec(),
            extensions: SAFARI_16_EXTENSION_IDS.to_vec(),
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::Zlib,
            min_version: TlsVersion::Tls1_0,
            max_version: TlsVersion::Tls1_3,
        }
    }

    /// JA4 "a" section this fingerprint produces for a domain SNI:
    /// protocol, version, SNI marker, cipher count, extension count, ALPN.
    ///
    /// `None` when the fingerprint leaves ciphers to the engine default.
    pub fn ja4_prefix(&self, alpn: Option<ProtocolVersion>) -> Option<String> {
        if self.cipher_list.is_empty() {
            return None;
        }
        let version = match self.max_version {
            TlsVersion::Tls1_3 => "13",
            TlsVersion::Tls1_2 => "12",
            TlsVersion::Tls1_0 => "10",
        };
        let alpn = match alpn {
            Some(ProtocolVersion::Http2) => "h2",
            Some(ProtocolVersion::Http1_1) => "h1",
            None => "00",
        };
        Some(format!(
            "t{}d{:02}{:02}{}",
            version,
            self.cipher_list.len().min(99),
            self.extensions.len().min(99),
            alpn
        ))
    }
}
