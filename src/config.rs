//! Application configuration.
//!
//! Layers, later ones winning: built-in defaults, an optional TOML file,
//! `CAPTIONGENIE_*` environment variables, then command-line flags (applied
//! by the binary).
//!
//! ```toml
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! temperature = 0.8
//! max_tokens = 512
//! analyzer = "vision"
//! prompt = "Write captions for: {{{photoAnalysis}}}"
//! ```

use clap::ValueEnum;
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::{anthropic, gemini, openai, openrouter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::analyzer::{ImageAnalyzer, PlaceholderAnalyzer, VisionAnalyzer};
use crate::error::CaptionError;
use crate::llm::{create_llm_client_with_config, LlmConfig, SharedLlmClient};
use crate::pipeline::CaptionPipeline;
use crate::prompts::{PromptTemplate, DEFAULT_CAPTION_PROMPT};

pub const ENV_PROVIDER: &str = "CAPTIONGENIE_PROVIDER";
pub const ENV_MODEL: &str = "CAPTIONGENIE_MODEL";
pub const ENV_TEMPERATURE: &str = "CAPTIONGENIE_TEMPERATURE";
pub const ENV_MAX_TOKENS: &str = "CAPTIONGENIE_MAX_TOKENS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    #[value(name = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::Gemini => "gemini-2.0-flash",
            Provider::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CaptionError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "gemini" => Ok(Provider::Gemini),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(CaptionError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    #[default]
    Placeholder,
    Vision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub provider: Provider,
    /// Model name; the provider's default when unset
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub analyzer: AnalyzerKind,
    /// Caption template with a `{{{photoAnalysis}}}` slot
    pub prompt: String,
    pub system_prompt: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let llm = LlmConfig::default();
        Self {
            provider: Provider::default(),
            model: None,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            analyzer: AnalyzerKind::default(),
            prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, CaptionError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CaptionError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CaptionError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, CaptionError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), CaptionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup(ENV_PROVIDER) {
            self.provider = Provider::parse(&provider)?;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.model = Some(model.trim().to_string());
        }
        if let Some(temperature) = lookup(ENV_TEMPERATURE) {
            self.temperature = temperature.trim().parse().map_err(|_| {
                CaptionError::Config(format!("{} must be a number", ENV_TEMPERATURE))
            })?;
        }
        if let Some(max_tokens) = lookup(ENV_MAX_TOKENS) {
            self.max_tokens = match max_tokens.trim() {
                "" | "none" => None,
                n => Some(n.parse().map_err(|_| {
                    CaptionError::Config(format!("{} must be a positive integer", ENV_MAX_TOKENS))
                })?),
            };
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), CaptionError> {
        if !self.temperature.is_finite() {
            return Err(CaptionError::Config("temperature must be finite".to_string()));
        }
        self.template().require_slots(&[crate::prompts::PHOTO_ANALYSIS_SLOT])
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn template(&self) -> PromptTemplate {
        PromptTemplate::new(self.prompt.clone())
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig::default()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Connect to the configured provider using its standard API key variable.
    pub fn create_llm_client(&self) -> Result<SharedLlmClient, CaptionError> {
        let key_env = self.provider.api_key_env();
        if std::env::var(key_env).map(|k| k.trim().is_empty()).unwrap_or(true) {
            return Err(CaptionError::Config(format!(
                "{} is not set for provider {:?}",
                key_env, self.provider
            )));
        }

        let model = self.model_name();
        let config = self.llm_config();
        tracing::info!(provider = ?self.provider, model, "connecting to LLM provider");

        let client = match self.provider {
            Provider::OpenAi => create_llm_client_with_config(
                openai::Client::from_env().completion_model(model),
                config,
            ),
            Provider::Anthropic => create_llm_client_with_config(
                anthropic::Client::from_env().completion_model(model),
                config,
            ),
            Provider::Gemini => create_llm_client_with_config(
                gemini::Client::from_env().completion_model(model),
                config,
            ),
            Provider::OpenRouter => create_llm_client_with_config(
                openrouter::Client::from_env().completion_model(model),
                config,
            ),
        };
        Ok(client)
    }

    /// Assemble a pipeline around `llm` according to this configuration.
    pub fn build_pipeline(&self, llm: SharedLlmClient) -> Result<CaptionPipeline, CaptionError> {
        let analyzer: Arc<dyn ImageAnalyzer> = match self.analyzer {
            AnalyzerKind::Placeholder => Arc::new(PlaceholderAnalyzer),
            AnalyzerKind::Vision => Arc::new(VisionAnalyzer::new(llm.clone())),
        };

        let mut builder = CaptionPipeline::builder()
            .llm(llm)
            .analyzer(analyzer)
            .template(self.template());
        if let Some(prompt) = &self.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        builder.build()
    }
}
