//! Configuration types for business-card extraction.
//!
//! All pipeline behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. One struct means one value to clone into every
//! concurrent card pipeline and one value to log when two runs disagree.

use crate::error::CardScanError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a batch of business-card extractions.
///
/// Built via [`ScanConfig::builder()`] or using [`ScanConfig::default()`].
///
/// # Example
/// ```rust
/// use cardscan::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .concurrency(4)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// LLM model identifier, e.g. "gpt-4o", "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription: any creativity shows up as invented
    /// phone digits.
    pub temperature: f32,

    /// Maximum tokens the model may generate per card. Default: 2048.
    pub max_tokens: usize,

    /// Number of cards processed at once. Default: 1 (sequential).
    ///
    /// Sequential processing reports progress after every card and keeps
    /// well under provider rate limits. Outcomes stay in input order for any
    /// value.
    pub concurrency: usize,

    /// Validity window of a staged image URL in seconds. Default: 36000 (10 h).
    pub staging_ttl_secs: u64,

    /// Upper bound on one staging call (upload + presign) in seconds. Default: 30.
    pub stage_timeout_secs: u64,

    /// Upper bound on one recognition call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom extraction instruction. If None, uses
    /// [`crate::prompts::default_instruction`].
    pub instruction: Option<String>,

    /// Longest image side, in pixels, after preparation. Default: 2048.
    ///
    /// Phone photos are often 4000 px or more; the VLM tiles them down anyway,
    /// so uploading the full resolution only costs time.
    pub max_image_dimension: u32,

    /// JPEG quality used when re-encoding the staged image. Default: 90.
    pub jpeg_quality: u8,

    /// Image detail hint forwarded to the VLM ("low", "high", "auto"). Default: "high".
    pub image_detail: String,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Optional progress callback for per-card events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            concurrency: 1,
            staging_ttl_secs: 36_000,
            stage_timeout_secs: 30,
            api_timeout_secs: 60,
            instruction: None,
            max_image_dimension: 2048,
            jpeg_quality: 90,
            image_detail: "high".to_string(),
            download_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("concurrency", &self.concurrency)
            .field("staging_ttl_secs", &self.staging_ttl_secs)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("image_detail", &self.image_detail)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn staging_ttl(&self) -> Duration {
        Duration::from_secs(self.staging_ttl_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`ScanConfig`].
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn staging_ttl_secs(mut self, secs: u64) -> Self {
        self.config.staging_ttl_secs = secs;
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stage_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(64);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn image_detail(mut self, detail: impl Into<String>) -> Self {
        self.config.image_detail = detail.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, CardScanError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(CardScanError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        // Presigned S3 URLs are capped at 7 days.
        if c.staging_ttl_secs == 0 || c.staging_ttl_secs > 604_800 {
            return Err(CardScanError::InvalidConfig(format!(
                "Staging TTL must be 1–604800 seconds, got {}",
                c.staging_ttl_secs
            )));
        }
        if c.stage_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(CardScanError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if !matches!(c.image_detail.as_str(), "low" | "high" | "auto") {
            return Err(CardScanError::InvalidConfig(format!(
                "Image detail must be low, high or auto, got '{}'",
                c.image_detail
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential_with_ten_hour_ttl() {
        let c = ScanConfig::default();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.staging_ttl(), Duration::from_secs(36_000));
        assert_eq!(c.image_detail, "high");
    }

    #[test]
    fn builder_clamps_values() {
        let c = ScanConfig::builder()
            .concurrency(0)
            .temperature(5.0)
            .jpeg_quality(0)
            .max_image_dimension(10)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.max_image_dimension, 64);
    }

    #[test]
    fn build_rejects_zero_ttl() {
        let err = ScanConfig::builder().staging_ttl_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("Staging TTL"));
    }

    #[test]
    fn build_rejects_ttl_over_a_week() {
        assert!(ScanConfig::builder()
            .staging_ttl_secs(604_801)
            .build()
            .is_err());
    }

    #[test]
    fn build_rejects_unknown_detail() {
        let err = ScanConfig::builder()
            .image_detail("ultra")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ultra"));
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ScanConfig::default());
        assert!(s.contains("ScanConfig"));
        assert!(s.contains("image_detail"));
    }
}
