//! # cardscan
//!
//! Extract structured contact data from business-card photos using Vision
//! Language Models (VLMs).
//!
//! Each photo is made addressable by the model through a short-lived staged
//! URL, the model is asked for one JSON object in a fixed schema, and the
//! reply is coerced into a [`CardRecord`]. A batch always yields exactly one
//! [`ExtractionOutcome`] per input, in input order: a card that fails is a
//! `Failure` entry, never an aborted batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! card photos (paths / URLs)
//!  │
//!  ├─ 1. Input      read file or download, detect image format
//!  ├─ 2. Encode     downscale + re-encode as JPEG (spawn_blocking)
//!  ├─ 3. Stage      upload to object store, presigned URL with TTL
//!  ├─ 4. Recognize  one VLM call per card, reply parsed as a JSON object
//!  ├─ 5. Revoke     delete the staged object (always, on every path)
//!  └─ 6. Normalize  coerce the object into a CardRecord
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardscan::{scan, MemoryObjectStore, ScanConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ScanConfig::default();
//!     let store = Arc::new(MemoryObjectStore::new());
//!     let inputs = vec!["card_front.jpg".to_string()];
//!
//!     let output = scan(&inputs, store, &config).await?;
//!     for (filename, record) in output.records() {
//!         println!("{filename}: {:?}", record.company_name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cardscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `s3`    | on      | [`S3ObjectStore`] staging via `aws-sdk-s3` |
//!
//! Library-only use without AWS:
//! ```toml
//! cardscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    resolve_provider, scan, scan_images, scan_sync, scan_to_file, BatchProcessor, CancelHandle,
};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{CardError, CardScanError, RecognitionError, StagingError};
pub use output::{ExtractionOutcome, ScanOutput, ScanStats};
pub use pipeline::input::CardImage;
pub use pipeline::normalize::normalize;
pub use pipeline::recognize::{LlmVisionModel, ModelReply, RecognitionClient, VisionModel};
pub use pipeline::stage::{StagedReference, Stager};
#[cfg(feature = "s3")]
pub use pipeline::store::S3ObjectStore;
pub use pipeline::store::{MemoryObjectStore, ObjectStore, StoreError};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use schema::{CardRecord, CompanyAddress, ContactPerson, FieldValue, NOT_FOUND};
