//! LLM abstraction for caption generation using any rig-core compatible model.
//!
//! The provider-agnostic wrapper works with ANY model implementing rig-core's
//! `CompletionModel` trait (OpenAI, Anthropic, Gemini, OpenRouter, ...).
//!
//! # Example
//! ```ignore
//! use rig::client::{CompletionClient, ProviderClient};
//! use rig::providers::openai;
//! use captiongenie::llm::create_llm_client;
//!
//! let client = openai::Client::from_env();
//! let model = client.completion_model("gpt-4o-mini");
//! let llm = create_llm_client(model);
//! ```

use async_trait::async_trait;
use base64::prelude::*;
use rig::{
    completion::{AssistantContent, CompletionModel, CompletionRequest, CompletionRequestBuilder},
    message::{ImageDetail, ImageMediaType, Message, UserContent},
    OneOrMany,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::CaptionError;
use crate::prompts::VISION_ANALYSIS_PROMPT;

/// Model-level settings shared by every request a client sends.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// System prompt for describing a photo (vision analyzer)
    pub vision_prompt: String,
    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f64,
    /// Maximum tokens for LLM output (None = no limit)
    pub max_tokens: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            vision_prompt: VISION_ANALYSIS_PROMPT.to_string(),
            temperature: 0.9,
            max_tokens: Some(1024),
        }
    }
}

impl LlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.vision_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp.clamp(0.0, 2.0);
        self
    }

    /// Use None for no limit
    pub fn with_max_tokens(mut self, tokens: Option<u64>) -> Self {
        self.max_tokens = tokens;
        self
    }
}

/// Trait for LLM clients used by the caption pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a text completion with the given system prompt.
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, CaptionError>;

    /// Describe an image given as base64 data.
    async fn describe_image_base64(
        &self,
        base64_data: &str,
        mime_type: &str,
    ) -> Result<String, CaptionError>;

    /// Describe an image given as raw bytes.
    async fn describe_image(
        &self,
        image_data: &[u8],
        mime_type: &str,
    ) -> Result<String, CaptionError> {
        let base64_data = BASE64_STANDARD.encode(image_data);
        self.describe_image_base64(&base64_data, mime_type).await
    }

    fn config(&self) -> &LlmConfig;
}

/// Universal LLM wrapper that works with any rig-core CompletionModel.
pub struct LlmWrapper<M: CompletionModel> {
    model: Arc<M>,
    config: LlmConfig,
}

impl<M: CompletionModel> LlmWrapper<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, LlmConfig::default())
    }

    pub fn with_config(model: M, config: LlmConfig) -> Self {
        Self {
            model: Arc::new(model),
            config,
        }
    }

    pub fn from_arc(model: Arc<M>, config: LlmConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config_mut(&mut self) -> &mut LlmConfig {
        &mut self.config
    }

    fn build_request(
        &self,
        system_prompt: &str,
        user_content: OneOrMany<UserContent>,
    ) -> CompletionRequestBuilder<M> {
        let mut builder = self
            .model
            .completion_request(Message::User {
                content: user_content,
            })
            .preamble(system_prompt.to_string())
            .temperature(self.config.temperature);

        if let Some(max_tokens) = self.config.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder
    }

    async fn send_request(&self, request: CompletionRequest) -> Result<String, CaptionError> {
        self.model
            .completion(request)
            .await
            .map(|r| extract_text_from_response(&r.choice))
            .map_err(|e| CaptionError::Llm(e.to_string()))
    }
}

/// Extract text content from assistant response
fn extract_text_from_response(content: &OneOrMany<AssistantContent>) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text(text) => Some(text.text.clone()),
            AssistantContent::Reasoning(_) => None,
            AssistantContent::ToolCall(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse MIME type string to rig ImageMediaType
fn parse_mime_to_image_type(mime_type: &str) -> ImageMediaType {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => ImageMediaType::JPEG,
        "image/png" => ImageMediaType::PNG,
        "image/gif" => ImageMediaType::GIF,
        "image/webp" => ImageMediaType::WEBP,
        _ => ImageMediaType::PNG,
    }
}

#[async_trait]
impl<M: CompletionModel + Send + Sync + 'static> LlmClient for LlmWrapper<M> {
    async fn complete(&self, system_prompt: &str, prompt: &str) -> Result<String, CaptionError> {
        let content = OneOrMany::one(UserContent::text(prompt));
        let request = self.build_request(system_prompt, content).build();
        self.send_request(request).await
    }

    async fn describe_image_base64(
        &self,
        base64_data: &str,
        mime_type: &str,
    ) -> Result<String, CaptionError> {
        let image_type = parse_mime_to_image_type(mime_type);

        let mut content = OneOrMany::one(UserContent::image_base64(
            base64_data.to_string(),
            Some(image_type),
            Some(ImageDetail::Auto),
        ));
        content.push(UserContent::text("Describe this photo."));

        let request = self
            .build_request(&self.config.vision_prompt, content)
            .build();

        self.send_request(request).await
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }
}

/// A scriptable LLM client for tests and offline runs.
///
/// Completion replies are served from a queue; once it holds a single entry
/// that entry is repeated. Every call is counted and the last prompt kept.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    image_response: String,
    delay: Option<Duration>,
    completions: AtomicUsize,
    image_calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    config: LlmConfig,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Ok(
                r#"{"captions": ["A mock caption"]}"#.to_string()
            )])),
            image_response: "A mock image description".to_string(),
            delay: None,
            completions: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            config: LlmConfig::default(),
        }
    }

    /// Reply to every completion with `response`.
    pub fn with_text_response(self, response: impl Into<String>) -> Self {
        self.with_replies(vec![Ok(response.into())])
    }

    /// Fail every completion with an LLM error carrying `message`.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.with_replies(vec![Err(message.into())])
    }

    /// Serve completions from `replies` in order, repeating the last one.
    pub fn with_replies(mut self, replies: Vec<Result<String, String>>) -> Self {
        if let Ok(queue) = self.replies.get_mut() {
            *queue = replies.into();
        }
        self
    }

    pub fn with_image_response(mut self, response: impl Into<String>) -> Self {
        self.image_response = response.into();
        self
    }

    /// Sleep before answering, to keep a request in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn completion_calls(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    fn next_reply(&self) -> Result<String, String> {
        let mut queue = self
            .replies
            .lock()
            .map_err(|_| "mock reply queue poisoned".to_string())?;
        match queue.len() {
            0 => Err("mock has no scripted reply".to_string()),
            1 => queue[0].clone(),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Err("mock has no scripted reply".to_string())),
        }
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system_prompt: &str, prompt: &str) -> Result<String, CaptionError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        self.wait().await;
        self.next_reply().map_err(CaptionError::Llm)
    }

    async fn describe_image_base64(
        &self,
        _base64_data: &str,
        _mime_type: &str,
    ) -> Result<String, CaptionError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(self.image_response.clone())
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }
}

/// Type alias for a boxed LLM client that can be shared across threads
pub type SharedLlmClient = Arc<dyn LlmClient>;

/// Helper function to create a shared LLM client from any CompletionModel
pub fn create_llm_client<M: CompletionModel + Send + Sync + 'static>(model: M) -> SharedLlmClient {
    Arc::new(LlmWrapper::new(model))
}

/// Helper function to create a shared LLM client with custom config
pub fn create_llm_client_with_config<M: CompletionModel + Send + Sync + 'static>(
    model: M,
    config: LlmConfig,
) -> SharedLlmClient {
    Arc::new(LlmWrapper::with_config(model, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_then_repeats_last() {
        let mock = MockLlmClient::new().with_replies(vec![
            Err("boom".to_string()),
            Ok("second".to_string()),
        ]);

        assert!(mock.complete("sys", "one").await.is_err());
        assert_eq!(mock.complete("sys", "two").await.unwrap(), "second");
        assert_eq!(mock.complete("sys", "three").await.unwrap(), "second");
        assert_eq!(mock.completion_calls(), 3);
        assert_eq!(mock.last_prompt().as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_mock_describe_image_counts_calls() {
        let mock = MockLlmClient::new().with_image_response("a red bicycle");
        let description = mock.describe_image(&[0x89, 0x50], "image/png").await.unwrap();
        assert_eq!(description, "a red bicycle");
        assert_eq!(mock.image_calls(), 1);
        assert_eq!(mock.completion_calls(), 0);
    }

    #[test]
    fn test_config_clamps_temperature() {
        assert_eq!(LlmConfig::new().with_temperature(5.0).temperature, 2.0);
        assert_eq!(LlmConfig::new().with_temperature(-1.0).temperature, 0.0);
    }
}
