//! Domain-specific error types for the display-server client.
//!
//! Transport failures are returned as `Err` immediately and never
//! retried. Geometry problems are not errors: they surface as empty
//! point lists and all-false masks.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the display-server client.
#[derive(Debug, Error)]
pub enum DisplayError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A channel to a background task was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A request exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The server refused a request.
    #[error("request to {endpoint} rejected: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// The server answered with a response of the wrong kind.
    #[error("unexpected response from {0}")]
    UnexpectedResponse(String),

    /// A frame exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a wire frame failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A JSON document could not be parsed or produced.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Parameter Store Errors ───────────────────────────────────
    /// The requested parameter key is not present in the store.
    #[error("parameter not set: {0}")]
    MissingParam(String),

    /// The parameter exists but holds the wrong kind of value.
    #[error("parameter {0} has the wrong type")]
    ParamType(String),

    /// Display info could not be fetched (or is out of date).
    #[error("display info unavailable: {0}")]
    InfoUnavailable(String),

    /// A geometry record did not carry the required fields.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    // ── Image Errors ─────────────────────────────────────────────
    /// A mask does not have the same shape as the image it applies to.
    #[error("shape mismatch: image {image_width}x{image_height}, mask {mask_width}x{mask_height}")]
    ShapeMismatch {
        image_width: u32,
        image_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    /// Pixel upload only supports grayscale and RGB images.
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(usize),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = DisplayError> = std::result::Result<T, E>;

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DisplayError {
    fn from(s: String) -> Self {
        DisplayError::Other(s)
    }
}

impl From<&str> for DisplayError {
    fn from(s: &str) -> Self {
        DisplayError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DisplayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DisplayError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for DisplayError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        DisplayError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for DisplayError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DisplayError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DisplayError::Rejected {
            endpoint: "/display_server/set_display_server_mode".into(),
            reason: "unknown mode".into(),
        };
        assert!(e.to_string().contains("set_display_server_mode"));
        assert!(e.to_string().contains("unknown mode"));

        let e = DisplayError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_string() {
        let e: DisplayError = "something broke".into();
        assert!(matches!(e, DisplayError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DisplayError = io_err.into();
        assert!(matches!(e, DisplayError::Connection(_)));
    }

    #[test]
    fn from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let e: DisplayError = json_err.into();
        assert!(matches!(e, DisplayError::Json(_)));
    }
}
