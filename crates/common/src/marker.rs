//! Generation marker
//!
//! The marker is a small object at a fixed key under the prefix. The
//! publisher overwrites it after every quiet period; the poller compares
//! its raw bytes against the last value it saw. Nothing ever parses it.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

/// Name of the marker object, relative to the prefix.
pub const MARKER_NAME: &str = "__lock__timer__";

/// Opaque generation token. Equality is byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationMarker(Bytes);

impl GenerationMarker {
    /// A fresh token stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        let token = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        Self(Bytes::from(token))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Display for GenerationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_token_is_ascii_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let marker = GenerationMarker::at(ts);

        assert!(marker.as_bytes().is_ascii());
        assert_eq!(marker.to_string(), "2024-03-01T12:30:00.000000000Z");
    }

    #[test]
    fn test_equality_is_bytewise() {
        let a = GenerationMarker::from_bytes("Mon Jan  1 00:00:00 2024");
        let b = GenerationMarker::from_bytes(b"Mon Jan  1 00:00:00 2024".to_vec());
        let c = GenerationMarker::from_bytes("Mon Jan  1 00:00:00 2024 ");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_non_utf8_tokens_still_compare() {
        let a = GenerationMarker::from_bytes(vec![0xff, 0x00, 0x01]);
        let b = GenerationMarker::from_bytes(vec![0xff, 0x00, 0x02]);
        assert_ne!(a, b);
        // Display never fails on opaque bytes
        assert!(!a.to_string().is_empty());
    }
}
