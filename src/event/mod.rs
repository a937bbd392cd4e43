//! Events flowing through the push core.
//!
//! An [`Event`] is an immutable text payload stamped with its arrival order.
//! Payloads coming from the outside world go through [`validate_payload`]
//! first, so nothing malformed ever reaches the queue or the registry.

use std::fmt;
use std::str::Utf8Error;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// An immutable payload with an implicit arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Process-wide arrival order, strictly increasing in creation order
    pub sequence: u64,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Reasons a payload is refused at the boundary
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("payload is not valid UTF-8 text: {0}")]
    NotText(#[from] Utf8Error),

    #[error("payload is empty")]
    Empty,
}

/// Check a raw body and turn it into text.
///
/// The size check runs before decoding so oversized bodies are never scanned.
pub fn validate_payload(bytes: &[u8], max_bytes: usize) -> Result<String, PayloadError> {
    if bytes.len() > max_bytes {
        return Err(PayloadError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(PayloadError::Empty);
    }
    let text = std::str::from_utf8(bytes)?;
    Ok(text.to_string())
}

/// Size rule of [`validate_payload`] for input that is already text.
///
/// Empty text is allowed here: an empty pub/sub message is still a message.
pub fn validate_text(text: &str, max_bytes: usize) -> Result<(), PayloadError> {
    if text.len() > max_bytes {
        return Err(PayloadError::TooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_follows_creation_order() {
        let first = Event::new("a");
        let second = Event::new("b");
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_display_is_payload() {
        let event = Event::new("Hello from publisher");
        assert_eq!(event.to_string(), "Hello from publisher");
        assert_eq!(event.len(), 20);
    }

    #[test]
    fn test_validate_accepts_text() {
        let text = validate_payload(b"hello", 16).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_validate_rejects_oversized() {
        let result = validate_payload(&[b'a'; 17], 16);
        assert_eq!(result, Err(PayloadError::TooLarge { size: 17, max: 16 }));
    }

    #[test]
    fn test_validate_rejects_invalid_utf8() {
        let result = validate_payload(&[0xc3, 0x28], 16);
        assert!(matches!(result, Err(PayloadError::NotText(_))));
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert_eq!(validate_payload(b"", 16), Err(PayloadError::Empty));
        assert!(validate_text("", 16).is_ok());
    }

    #[test]
    fn test_validate_text_limit_is_in_bytes() {
        // "é" is two bytes
        assert!(validate_text("éé", 4).is_ok());
        assert!(validate_text("ééé", 4).is_err());
    }
}
