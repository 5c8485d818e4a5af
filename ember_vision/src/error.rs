// THEORY:
// Only caller contract violations end up here. Degenerate geometry, empty
// masks and warm-up periods are ordinary outcomes of a frame and never
// surface as errors.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EmberError>;

/// Faults a caller can provoke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmberError {
    #[error("empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame dimensions changed: expected {}x{}, got {}x{}", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown stream {0}")]
    UnknownStream(u64),

    #[error("stream {0} is closed")]
    StreamClosed(u64),
}

impl EmberError {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether the error came from the frame itself rather than the setup.
    pub fn is_frame_fault(&self) -> bool {
        matches!(self, Self::EmptyFrame { .. } | Self::DimensionMismatch { .. })
    }
}
