//! Error types for Synheart Pixel

use thiserror::Error;

/// Errors surfaced by configuration, replay input and serialization.
///
/// The runtime pipeline never hands these to host callbacks; they only escape
/// from start-up and offline tooling.
#[derive(Debug, Error)]
pub enum PixelError {
    #[error("Tracking endpoint URL not provided")]
    MissingTrackingUrl,

    #[error("Tracking endpoint URL still contains the placeholder: {0}")]
    UnreplacedPlaceholder(String),

    #[error("Tracking endpoint URL has no tracking id: {0}")]
    EmptyTrackingId(String),

    #[error("Invalid relay endpoint: {0}")]
    InvalidRelayEndpoint(String),

    #[error("Invalid page URL: {0}")]
    InvalidPageUrl(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse replay input: {0}")]
    ReplayParse(String),

    #[error("Invalid replay record at line {line}: {reason}")]
    InvalidReplayRecord { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the persistent key/value store backing the device identifier
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage read failed: {0}")]
    Read(String),

    #[error("Storage write failed: {0}")]
    Write(String),
}

/// Failures reported by a transport for a single relay request
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Relay responded with status {0}")]
    Status(u16),

    #[error("Delivery task failed: {0}")]
    Task(String),
}
