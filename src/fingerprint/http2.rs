//! HTTP/2 fingerprint configuration (SETTINGS frame).

use std::time::Duration;

/// SETTINGS_HEADER_TABLE_SIZE
pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 1;
/// SETTINGS_ENABLE_PUSH
pub const SETTINGS_ENABLE_PUSH: u16 = 2;
/// SETTINGS_MAX_CONCURRENT_STREAMS
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 3;
/// SETTINGS_INITIAL_WINDOW_SIZE
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 4;
/// SETTINGS_MAX_FRAME_SIZE
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 5;
/// SETTINGS_MAX_HEADER_LIST_SIZE
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 6;

/// HTTP/2 SETTINGS for fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
    /// Connection-level WINDOW_UPDATE increment sent after the preface.
    pub initial_window_update: u32,
    /// SETTINGS identifiers the browser actually sends, in order.
    pub sent_settings: Vec<u16>,
    /// Pseudo-header order in Akamai notation (m=method, a=authority, s=scheme, p=path).
    pub pseudo_order: &'static str,
    /// Handshake timeout for waiting for server SETTINGS frame.
    pub handshake_timeout: Option<Duration>,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self::chrome()
    }
}

impl Http2Settings {
    /// Chrome 106+ (and Chromium Edge).
    pub fn chrome() -> Self {
        Self {
            header_table_size: 65536,
            enable_push: false,
            max_concurrent_streams: 1000,
            initial_window_size: 6291456,
            max_frame_size: 16384,
            max_header_list_size: 262144,
            initial_window_update: 15663105,
            sent_settings: vec![
                SETTINGS_HEADER_TABLE_SIZE,
                SETTINGS_ENABLE_PUSH,
                SETTINGS_INITIAL_WINDOW_SIZE,
                SETTINGS_MAX_HEADER_LIST_SIZE,
            ],
            pseudo_order: "m,a,s,p",
            handshake_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Chromium 101, which still announced MAX_CONCURRENT_STREAMS.
    pub fn chrome_legacy() -> Self {
        Self {
            sent_settings: vec![
                SETTINGS_HEADER_TABLE_SIZE,
                SETTINGS_ENABLE_PUSH,
                SETTINGS_MAX_CONCURRENT_STREAMS,
                SETTINGS_INITIAL_WINDOW_SIZE,
                SETTINGS_MAX_HEADER_LIST_SIZE,
            ],
            ..Self::chrome()
        }
    }

    /// Firefox: three settings and a smaller stream window.
    pub fn firefox() -> Self {
        Self {
            header_table_size: 65536,
            enable_push: false,
            max_concurrent_streams: 100,
            initial_window_size: 131072,
            max_frame_size: 16384,
            max_header_list_size: 0,
            initial_window_update: 12517377,
            sent_settings: vec![
                SETTINGS_HEADER_TABLE_SIZE,
                SETTINGS_INITIAL_WINDOW_SIZE,
                SETTINGS_MAX_FRAME_SIZE,
            ],
            pseudo_order: "m,p,a,s",
            handshake_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Safari 16.
    pub fn safari() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: 100,
            initial_window_size: 4194304,
            max_frame_size: 16384,
            max_header_list_size: 0,
            initial_window_update: 10485760,
            sent_settings: vec![
                SETTINGS_HEADER_TABLE_SIZE,
                SETTINGS_ENABLE_PUSH,
                SETTINGS_MAX_CONCURRENT_STREAMS,
                SETTINGS_INITIAL_WINDOW_SIZE,
                SETTINGS_MAX_FRAME_SIZE,
            ],
            pseudo_order: "m,s,p,a",
            handshake_timeout: Some(Duration::from_secs(10)),
        }
    }

    fn value_of(&self, id: u16) -> Option<u32> {
        match id {
            SETTINGS_HEADER_TABLE_SIZE => Some(self.header_table_size),
            SETTINGS_ENABLE_PUSH => Some(self.enable_push as u32),
            SETTINGS_MAX_CONCURRENT_STREAMS => Some(self.max_concurrent_streams),
            SETTINGS_INITIAL_WINDOW_SIZE => Some(self.initial_window_size),
            SETTINGS_MAX_FRAME_SIZE => Some(self.max_frame_size),
            SETTINGS_MAX_HEADER_LIST_SIZE => Some(self.max_header_list_size),
            _ => None,
        }
    }

    /// SETTINGS section of the Akamai fingerprint, e.g. `1:65536;2:0;4:6291456;6:262144`.
    pub fn akamai_settings(&self) -> String {
        self.sent_settings
            .iter()
            .filter_map(|id| self.value_of(*id).map(|v| format!("{}:{}", id, v)))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Full Akamai fingerprint: `settings|window_update|priority|pseudo_order`.
    pub fn akamai_fingerprint(&self) -> String {
        format!(
            "{}|{}|0|{}",
            self.akamai_settings(),
            self.initial_window_update,
            self.pseudo_order
        )
    }
}

/// Strip GREASE and unknown settings from an observed Akamai SETTINGS section.
///
/// Chrome sends a random reserved setting per connection, so comparisons only
/// consider the six RFC 9113 identifiers.
pub fn strip_grease_settings(settings: &str) -> String {
    settings
        .split(';')
        .filter(|s| {
            s.split_once(':')
                .and_then(|(id, _)| id.trim().parse::<u16>().ok())
                .map(|id| (SETTINGS_HEADER_TABLE_SIZE..=SETTINGS_MAX_HEADER_LIST_SIZE).contains(&id))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>()
        .join(";")
}
