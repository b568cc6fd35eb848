//! Frame-level protocol errors.
//!
//! Any [`FrameError`] on an inbound frame is a protocol violation and closes
//! the connection that produced it.

use thiserror::Error;

/// Errors produced while encoding or decoding transport frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Inbound frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Binary frame was not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    /// Inbound frame was not a valid client event.
    #[error("failed to decode client event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outbound push could not be serialized.
    #[error("failed to encode server push: {0}")]
    Encode(#[source] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let err = FrameError::TooLarge {
            size: 4096,
            limit: 2048,
        };
        assert_eq!(
            err.to_string(),
            "frame of 4096 bytes exceeds limit of 2048 bytes"
        );
    }

    #[test]
    fn decode_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = FrameError::Decode(json_err);
        assert!(err.to_string().starts_with("failed to decode client event"));
    }

    #[test]
    fn not_utf8_display() {
        assert_eq!(FrameError::NotUtf8.to_string(), "binary frame is not valid UTF-8");
    }
}
