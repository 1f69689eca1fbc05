//! Domain-specific error types for the bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! No panics on invalid input — every error is typed and recoverable;
//! the run loop logs and keeps waiting for the next message.

use thiserror::Error;

/// The canonical error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// An audio payload violated the frame constraints.
    #[error("bad audio frame: {0}")]
    BadFrame(String),

    // ── Sequence Errors ──────────────────────────────────────────
    /// A control message arrived in the wrong session state.
    #[error("out-of-sequence control message: {0}")]
    Sequence(&'static str),

    // ── Delivery Errors ──────────────────────────────────────────
    /// A sink failed to accept a report (isolated to that sink).
    #[error("delivery to {sink} failed: {reason}")]
    Delivery { sink: &'static str, reason: String },

    // ── Resource Errors ──────────────────────────────────────────
    /// A directory or file could not be created or written.
    #[error("resource error at {path}: {source}")]
    Resource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Connection Errors ────────────────────────────────────────
    /// The socket/IO layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding a report failed or exceeded the packet bound.
    #[error("encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = BridgeError::BadFrame("odd payload length 257".into());
        assert!(e.to_string().contains("257"));

        let e = BridgeError::Delivery {
            sink: "file",
            reason: "disk full".into(),
        };
        assert!(e.to_string().contains("file"));
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: BridgeError = io_err.into();
        assert!(matches!(e, BridgeError::Transport(_)));
    }

    #[test]
    fn resource_keeps_its_source() {
        let e = BridgeError::Resource {
            path: "/tmp/sess1".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("/tmp/sess1"));
        assert!(std::error::Error::source(&e).is_some());
    }
}
