//! Pipeline stages for business-card extraction.
//!
//! Each submodule implements exactly one step, so each can be tested alone
//! and the collaborators behind the I/O stages (object store, VLM) can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ stage ──▶ recognize ──▶ normalize
//! (path/URL) (JPEG)   (store+URL)  (VLM JSON)   (CardRecord)
//! ```
//!
//! 1. [`input`]     load caller-supplied files or URLs into [`input::CardImage`]
//! 2. [`encode`]    decode, downscale and re-encode as JPEG for upload
//! 3. [`stage`]     put the JPEG in an [`store::ObjectStore`] and hand out a
//!    time-bounded URL that is always revoked afterwards
//! 4. [`recognize`] one VLM call per card; the only stage that interprets
//!    the service's reply as JSON
//! 5. [`normalize`] total coercion of the raw JSON into [`crate::schema::CardRecord`]

pub mod encode;
pub mod input;
pub mod normalize;
pub mod recognize;
pub mod stage;
pub mod store;
