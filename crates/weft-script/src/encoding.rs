//! Source-encoding detection.
//!
//! Script files are not required to be UTF-8; the sniffer guesses the
//! encoding once per [`ScriptUnit`](crate::unit::ScriptUnit) and the unit
//! decodes through it on every read. Detection never fails — when the
//! detector has nothing to go on it degrades to the configured default.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// Best-effort text-encoding detection over raw bytes.
pub trait EncodingSniffer: Send + Sync {
    fn sniff(&self, bytes: &[u8]) -> &'static Encoding;
}

/// Sniffer backed by chardetng's incremental detector.
pub struct ChardetngSniffer {
    fallback: &'static Encoding,
}

impl ChardetngSniffer {
    pub fn new() -> Self {
        Self { fallback: UTF_8 }
    }

    pub fn with_fallback(fallback: &'static Encoding) -> Self {
        Self { fallback }
    }
}

impl Default for ChardetngSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodingSniffer for ChardetngSniffer {
    fn sniff(&self, bytes: &[u8]) -> &'static Encoding {
        if bytes.is_empty() {
            return self.fallback;
        }
        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        detector.guess(None, true)
    }
}
