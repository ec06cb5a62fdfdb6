//! Error types for the session core.

use thiserror::Error;
use uuid::Uuid;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by the session core
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session document failed schema validation
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Session document or a telemetry file could not be fetched
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// An explicitly requested manifest does not exist
    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    /// No manifest in the session uses a supported format
    #[error("No supported manifest in session")]
    NoSupportedManifest,

    /// The media engine failed to load the video
    #[error("Video load failed: {0}")]
    VideoLoad(String),

    /// A segmentation marker was requested without an active track
    #[error("No active segmentation track")]
    NoActiveTrack,

    /// Lane lookup failed (usually stale after a manifest switch)
    #[error("Lane not found: {0}")]
    LaneNotFound(String),

    /// Marker lookup failed
    #[error("Marker not found: {0}")]
    MarkerNotFound(Uuid),

    /// Operation does not apply to this marker shape
    #[error("Invalid marker: {0}")]
    InvalidMarker(String),

    /// Settings failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Fatal errors block the user with a persistent notification; the rest
    /// abort only the dependent operation.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::InvalidSession(_)
            | SessionError::Fetch(_)
            | SessionError::ManifestNotFound(_)
            | SessionError::NoSupportedManifest
            | SessionError::VideoLoad(_)
            | SessionError::NoActiveTrack => true,
            SessionError::LaneNotFound(_)
            | SessionError::MarkerNotFound(_)
            | SessionError::InvalidMarker(_)
            | SessionError::Config(_)
            | SessionError::Io(_)
            | SessionError::Json(_) => false,
        }
    }
}
