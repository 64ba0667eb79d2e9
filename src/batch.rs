//! Batch orchestration and the top-level `scan*` entry points.
//!
//! [`BatchProcessor`] drives every card through stage → recognize →
//! normalize and turns each card's error into a failure outcome, so one bad
//! card never costs the others their results. Outcomes come back in input
//! order whatever the concurrency.
//!
//! The `scan*` functions add what a caller usually wants around that:
//! loading inputs (a bad input is one more failure outcome), resolving the
//! VLM provider (the only fatal error), and optionally writing the result to
//! disk.

use crate::config::ScanConfig;
use crate::error::{CardError, CardScanError};
use crate::output::{ExtractionOutcome, ScanOutput, ScanStats};
use crate::pipeline::input::{self, CardImage};
use crate::pipeline::normalize::normalize;
use crate::pipeline::recognize::{LlmVisionModel, RawStructuredResult, RecognitionClient, VisionModel};
use crate::pipeline::stage::Stager;
use crate::pipeline::store::ObjectStore;
use crate::progress::ProgressCallback;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Cooperative cancellation for a running batch.
///
/// Cancelling stops new cards from starting; cards already in flight finish
/// (and revoke their staged image) normally. Cards that never started get a
/// failure outcome so the result still has one entry per input.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One card's outcome plus usage, before aggregation.
struct CardRun {
    outcome: ExtractionOutcome,
    input_tokens: usize,
    output_tokens: usize,
}

/// Runs batches of cards through the pipeline.
#[derive(Clone)]
pub struct BatchProcessor {
    stager: Stager,
    client: RecognitionClient,
    concurrency: usize,
    progress: Option<ProgressCallback>,
    cancel: CancelHandle,
}

impl BatchProcessor {
    pub fn new(stager: Stager, client: RecognitionClient, config: &ScanConfig) -> Self {
        Self {
            stager,
            client,
            concurrency: config.concurrency.max(1),
            progress: config.progress_callback.clone(),
            cancel: CancelHandle::new(),
        }
    }

    /// Build a processor from a store and a vision model using `config`.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        model: Arc<dyn VisionModel>,
        config: &ScanConfig,
    ) -> Self {
        Self::new(
            Stager::new(store, config),
            RecognitionClient::new(model, config),
            config,
        )
    }

    /// Attach a cancellation handle shared with the caller.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every image; outcome `i` belongs to `images[i]`.
    pub async fn process_batch(&self, images: &[CardImage]) -> Vec<ExtractionOutcome> {
        self.run(images).await.outcomes
    }

    /// Like [`Self::process_batch`], with batch statistics.
    pub async fn run(&self, images: &[CardImage]) -> ScanOutput {
        let start = Instant::now();
        let total = images.len();
        info!(
            "Processing {} card(s), concurrency {}",
            total, self.concurrency
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        // `buffered` (not `buffer_unordered`) yields in submission order.
        let runs: Vec<CardRun> = stream::iter(
            images
                .iter()
                .enumerate()
                .map(|(index, image)| self.process_card(index, total, image)),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        let stats = ScanStats {
            total_cards: total,
            succeeded: runs.iter().filter(|r| r.outcome.is_success()).count(),
            failed: runs.iter().filter(|r| !r.outcome.is_success()).count(),
            unreadable: runs
                .iter()
                .filter_map(|r| r.outcome.record())
                .filter(|rec| rec.is_unreadable())
                .count(),
            total_input_tokens: runs.iter().map(|r| r.input_tokens as u64).sum(),
            total_output_tokens: runs.iter().map(|r| r.output_tokens as u64).sum(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Batch complete: {}/{} cards extracted ({} unreadable), {}ms",
            stats.succeeded, total, stats.unreadable, stats.total_duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, stats.succeeded);
        }

        ScanOutput {
            outcomes: runs.into_iter().map(|r| r.outcome).collect(),
            stats,
        }
    }

    async fn process_card(&self, index: usize, total: usize, image: &CardImage) -> CardRun {
        let filename = image.filename.clone();

        let result = if self.cancel.is_cancelled() {
            Err(CardError::Cancelled)
        } else {
            if let Some(ref cb) = self.progress {
                cb.on_card_start(index, total, &filename);
            }
            self.extract(image).await
        };

        match result {
            Ok(raw) => {
                let record = normalize(&raw.fields);
                debug!(
                    "Card {}/{} ({}): {} populated entries",
                    index + 1,
                    total,
                    filename,
                    record.populated_entries()
                );
                if let Some(ref cb) = self.progress {
                    cb.on_card_complete(index, total, &filename);
                }
                CardRun {
                    outcome: ExtractionOutcome::Success { filename, record },
                    input_tokens: raw.input_tokens,
                    output_tokens: raw.output_tokens,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Card {}/{} ({}) failed: {}", index + 1, total, filename, reason);
                if let Some(ref cb) = self.progress {
                    cb.on_card_error(index, total, &filename, &reason);
                }
                CardRun {
                    outcome: ExtractionOutcome::Failure { filename, reason },
                    input_tokens: 0,
                    output_tokens: 0,
                }
            }
        }
    }

    /// Stage, recognise, revoke. The staged image is revoked before this
    /// returns on every path; if the future is dropped mid-flight the guard
    /// revokes it instead.
    async fn extract(&self, image: &CardImage) -> Result<RawStructuredResult, CardError> {
        let guard = self.stager.acquire(image).await?;
        let raw = self.client.recognize(guard.reference()).await;
        guard.release().await;
        Ok(raw?)
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Extract every input (local path or HTTP/HTTPS URL), staging through `store`.
///
/// An input that cannot be loaded (missing, unreadable, not an image, failed
/// download) becomes a `Failure` outcome at its own index; the remaining
/// inputs are still processed.
///
/// # Errors
/// Returns `Err(CardScanError)` only when the batch cannot start because no
/// VLM provider is configured. Per-card failures are reported inside
/// [`ScanOutput::outcomes`].
pub async fn scan(
    inputs: &[String],
    store: Arc<dyn ObjectStore>,
    config: &ScanConfig,
) -> Result<ScanOutput, CardScanError> {
    let start = Instant::now();
    let loaded = input::resolve_inputs(inputs, config.download_timeout_secs).await;

    let mut images = Vec::with_capacity(loaded.len());
    let mut load_failures = Vec::new();
    for (index, (raw, result)) in inputs.iter().zip(loaded).enumerate() {
        match result {
            Ok(image) => images.push(image),
            Err(e) => {
                let reason = e.to_string();
                warn!("Input {}/{} ({}) skipped: {}", index + 1, inputs.len(), raw, reason);
                load_failures.push((
                    index,
                    ExtractionOutcome::Failure {
                        filename: input::input_name(raw),
                        reason,
                    },
                ));
            }
        }
    }

    // Nothing to send to the model: no provider needed.
    let mut output = if images.is_empty() {
        ScanOutput::default()
    } else {
        scan_images(&images, store, config).await?
    };

    if !load_failures.is_empty() {
        output.stats.failed += load_failures.len();
        output.stats.total_cards = inputs.len();
        for (index, outcome) in load_failures {
            output.outcomes.insert(index, outcome);
        }
    }
    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Extract already-loaded images.
pub async fn scan_images(
    images: &[CardImage],
    store: Arc<dyn ObjectStore>,
    config: &ScanConfig,
) -> Result<ScanOutput, CardScanError> {
    let provider = resolve_provider(config)?;
    let model: Arc<dyn VisionModel> = Arc::new(LlmVisionModel::new(provider, config));
    Ok(BatchProcessor::from_parts(store, model, config)
        .run(images)
        .await)
}

/// Extract and write the [`ScanOutput`] as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn scan_to_file(
    inputs: &[String],
    output_path: impl AsRef<Path>,
    store: Arc<dyn ObjectStore>,
    config: &ScanConfig,
) -> Result<ScanStats, CardScanError> {
    let output = scan(inputs, store, config).await?;
    write_json_atomic(output_path.as_ref(), &output).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`scan`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_sync(
    inputs: &[String],
    store: Arc<dyn ObjectStore>,
    config: &ScanConfig,
) -> Result<ScanOutput, CardScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CardScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan(inputs, store, config))
}

/// Serialise `output` and atomically replace `path` with it.
async fn write_json_atomic(path: &Path, output: &ScanOutput) -> Result<(), CardScanError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| CardScanError::Internal(format!("Failed to serialise output: {e}")))?;

    let write_err = |source| CardScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, CardScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CardScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`: a pre-built provider, used as-is.
/// 2. `config.provider_name` (+ `config.model`, default [`DEFAULT_MODEL`]).
/// 3. `CARDSCAN_LLM_PROVIDER` + `CARDSCAN_MODEL`, when both are set.
/// 4. `OPENAI_API_KEY` present → OpenAI.
/// 5. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, CardScanError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("CARDSCAN_LLM_PROVIDER"),
        std::env::var("CARDSCAN_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CardScanError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CardRecord;

    #[test]
    fn cancel_handle_is_shared() {
        let a = CancelHandle::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn write_json_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        let output = ScanOutput {
            outcomes: vec![ExtractionOutcome::Success {
                filename: "a.jpg".into(),
                record: CardRecord::unreadable("too dark"),
            }],
            stats: ScanStats::default(),
        };

        write_json_atomic(&path, &output).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: ScanOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(back.outcomes, output.outcomes);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
