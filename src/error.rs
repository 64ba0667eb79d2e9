//! Error types for the cardscan library.
//!
//! The error types reflect two distinct failure levels:
//!
//! * [`CardScanError`] is **fatal**: the batch cannot start at all (no VLM
//!   provider configured, staging store not set up, bad configuration).
//!   Returned as `Err(CardScanError)` from the top-level `scan*` functions.
//!   The input variants are the exception: `scan*` reports an input that
//!   cannot be loaded as a failure outcome for that input alone.
//!
//! * [`StagingError`] and [`RecognitionError`] are **per card**: one card could
//!   not be uploaded or recognised, but every other card in the batch is
//!   unaffected. They are converted into
//!   [`crate::output::ExtractionOutcome::Failure`] at the card boundary and
//!   never escape [`crate::batch::BatchProcessor::process_batch`].
//!   [`CardError`] is their union, as seen at that boundary.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cardscan library.
///
/// Card-level failures use [`StagingError`] / [`RecognitionError`] and are
/// stored in [`crate::output::ExtractionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CardScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file was read but is not an image format we can stage.
    #[error("'{name}' is not a supported image (PNG, JPEG, WebP, GIF, BMP, TIFF)\nFirst bytes: {magic:?}")]
    UnsupportedImage { name: String, magic: [u8; 4] },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The backing object store could not be set up.
    #[error("Object store '{store}' is not configured: {hint}")]
    StoreNotConfigured { store: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A card image could not be made addressable by the recognition service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StagingError {
    /// The image bytes could not be decoded or re-encoded as JPEG.
    #[error("Failed to prepare image for upload: {0}")]
    Encode(String),

    /// The backing store was unreachable or rejected the upload.
    #[error("Failed to upload image to object store: {0}")]
    Upload(String),

    /// The object was stored but no usable reference could be produced.
    #[error("Failed to create a temporary URL for '{object_id}': {detail}")]
    Presign { object_id: String, detail: String },

    /// The store did not answer within the staging timeout.
    #[error("Staging timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The recognition service failed or answered with something that is not a
/// single card object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// The remote call returned an error.
    #[error("Failed to analyze image: {0}")]
    Api(String),

    /// The remote call did not finish within the API timeout.
    #[error("Recognition timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response body is not valid JSON.
    #[error("Recognition response is not valid JSON: {detail}")]
    InvalidJson { detail: String },

    /// The response is JSON, but not a single object.
    #[error("Recognition response has unexpected shape: expected a JSON object, got {found}")]
    UnexpectedShape { found: String },
}

/// Either per-card error, as surfaced in a failure outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CardError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// The batch was cancelled before this card started.
    #[error("Batch cancelled before this card was processed")]
    Cancelled,
}
