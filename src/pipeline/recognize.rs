//! Recognition: one VLM call per staged card, reply parsed as a JSON object.
//!
//! This is the boundary between "tolerable garbage" and "fatal for this
//! card". Transport errors, timeouts, replies that are not JSON, and JSON
//! that is not a single object are [`RecognitionError`]s. Anything that *is*
//! an object is handed to [`crate::pipeline::normalize`] however odd its
//! contents.
//!
//! The client makes exactly one attempt. Retrying is the caller's decision,
//! which keeps a card's failure semantics simple: one call, one outcome.

use crate::config::ScanConfig;
use crate::error::RecognitionError;
use crate::pipeline::stage::StagedReference;
use crate::prompts::default_instruction;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// What the model said, verbatim, plus token usage.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A multimodal model that can answer an instruction about one image URL.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send `instruction` with the image at `image_url` and return the reply.
    /// Errors are the provider's message.
    async fn complete(&self, instruction: &str, image_url: &str) -> Result<ModelReply, String>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    detail: String,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ScanConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            detail: config.image_detail.clone(),
        }
    }

    /// Replies are requested in JSON mode; providers without it ignore the hint
    /// and [`parse_reply`] still copes with fenced or prose-wrapped objects.
    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: Some("json_object".to_string()),
            ..Default::default()
        }
    }

    /// Inline `data:` URLs are sent as base64 image data; anything else is
    /// passed through as a URL for the provider to fetch.
    fn image_data(&self, image_url: &str) -> ImageData {
        let image = match split_data_url(image_url) {
            Some((mime, b64)) => ImageData::new(b64.to_string(), mime),
            None => ImageData::from_url(image_url.to_string()),
        };
        image.with_detail(self.detail.as_str())
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(&self, instruction: &str, image_url: &str) -> Result<ModelReply, String> {
        let messages = vec![ChatMessage::user_with_images(
            instruction,
            vec![self.image_data(image_url)],
        )];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| format!("{}", e))?;
        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Split `data:<mime>;base64,<payload>` into `(mime, payload)`.
fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}

/// Raw JSON object returned for one card, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawStructuredResult {
    pub fields: Map<String, Value>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Single-attempt recognition of staged card images.
#[derive(Clone)]
pub struct RecognitionClient {
    model: Arc<dyn VisionModel>,
    instruction: String,
    timeout: Duration,
}

impl RecognitionClient {
    pub fn new(model: Arc<dyn VisionModel>, config: &ScanConfig) -> Self {
        Self {
            model,
            instruction: config
                .instruction
                .clone()
                .unwrap_or_else(default_instruction),
            timeout: config.api_timeout(),
        }
    }

    /// Ask the model about the staged image and parse its reply.
    pub async fn recognize(
        &self,
        reference: &StagedReference,
    ) -> Result<RawStructuredResult, RecognitionError> {
        let start = Instant::now();
        let reply = timeout(self.timeout, self.model.complete(&self.instruction, reference.url()))
            .await
            .map_err(|_| RecognitionError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(RecognitionError::Api)?;

        let duration = start.elapsed();
        debug!(
            "Recognised {}: {} input tokens, {} output tokens, {:?}",
            reference.object_id(),
            reply.input_tokens,
            reply.output_tokens,
            duration
        );

        Ok(RawStructuredResult {
            fields: parse_reply(&reply.content)?,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```$").unwrap());

/// Parse a model reply into a single JSON object.
///
/// Tolerates a surrounding code fence and, when the reply is not JSON as a
/// whole, prose around one `{ … }` block. A reply that parses as JSON but is
/// not an object (notably an array of cards) is rejected.
pub fn parse_reply(content: &str) -> Result<Map<String, Value>, RecognitionError> {
    let trimmed = content.trim();
    let body = RE_OUTER_FENCES
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let value = match serde_json::from_str::<Value>(body) {
        Ok(v) => v,
        Err(first_err) => embedded_object(body).ok_or_else(|| RecognitionError::InvalidJson {
            detail: format!("{first_err}; reply starts with {:?}", preview(body)),
        })?,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(RecognitionError::UnexpectedShape {
            found: describe(&other),
        }),
    }
}

/// The outermost `{ … }` span of `text`, if it parses as a JSON object.
fn embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "a boolean".into(),
        Value::Number(_) => "a number".into(),
        Value::String(_) => "a string".into(),
        Value::Array(items) => format!("an array of {} items", items.len()),
        Value::Object(_) => "an object".into(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_options_request_json_mode() {
        let config = ScanConfig::builder()
            .temperature(0.0)
            .max_tokens(1024)
            .build()
            .unwrap();
        let model = LlmVisionModel::new(Arc::new(edgequake_llm::MockProvider::new()), &config);

        let options = model.options();

        assert_eq!(options.response_format.as_deref(), Some("json_object"));
        assert_eq!(options.temperature, Some(0.0));
        assert_eq!(options.max_tokens, Some(1024));
    }

    #[test]
    fn parses_plain_object() {
        let map = parse_reply(r#"{"company_name": "Acme"}"#).unwrap();
        assert_eq!(map["company_name"], "Acme");
    }

    #[test]
    fn strips_json_fence() {
        let map = parse_reply("```json\n{\"company_name\": \"Acme\"}\n```").unwrap();
        assert_eq!(map["company_name"], "Acme");
    }

    #[test]
    fn strips_bare_fence() {
        let map = parse_reply("```\n{\"company_phone\": null}\n```").unwrap();
        assert!(map["company_phone"].is_null());
    }

    #[test]
    fn extracts_object_from_prose() {
        let map = parse_reply("Here is the card:\n{\"company_name\": \"Acme\"}\nHope it helps!").unwrap();
        assert_eq!(map["company_name"], "Acme");
    }

    #[test]
    fn array_reply_is_a_shape_error() {
        let err = parse_reply(r#"[{"company_name": "A"}, {"company_name": "B"}]"#).unwrap_err();
        assert_eq!(
            err,
            RecognitionError::UnexpectedShape {
                found: "an array of 2 items".into()
            }
        );
    }

    #[test]
    fn scalar_reply_is_a_shape_error() {
        assert!(matches!(
            parse_reply("\"sorry, I cannot read this\""),
            Err(RecognitionError::UnexpectedShape { .. })
        ));
        assert!(matches!(
            parse_reply("null"),
            Err(RecognitionError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn non_json_is_invalid() {
        let err = parse_reply("I could not find a business card in this image.").unwrap_err();
        assert!(matches!(err, RecognitionError::InvalidJson { .. }));
    }

    #[test]
    fn truncated_json_is_invalid() {
        assert!(matches!(
            parse_reply(r#"{"company_name": "Acme", "company_phone": ["+1"#),
            Err(RecognitionError::InvalidJson { .. })
        ));
    }

    #[test]
    fn splits_data_urls() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,AQID"),
            Some(("image/jpeg", "AQID"))
        );
        assert_eq!(split_data_url("https://bucket.s3.amazonaws.com/card.jpg"), None);
        assert_eq!(split_data_url("data:text/plain,hello"), None);
    }
}
