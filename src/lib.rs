pub mod analyzer;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod logging;
pub mod model;
pub mod photo;
pub mod pipeline;
pub mod prompts;
pub mod shell;

// Re-export key types
pub use analyzer::{ImageAnalyzer, PlaceholderAnalyzer, VisionAnalyzer};
pub use config::{AnalyzerKind, AppConfig, Provider};
pub use error::{CaptionError, ErrorKind};
pub use generator::{parse_caption_output, CaptionGenerator};
pub use llm::{
    create_llm_client, create_llm_client_with_config, LlmClient, LlmConfig, LlmWrapper,
    MockLlmClient, SharedLlmClient,
};
pub use model::{CaptionRequest, CaptionResponse, PhotoAnalysis, MAX_ANALYSIS_CHARS};
pub use pipeline::{CaptionPipeline, PipelineRun, PipelineState};
pub use prompts::{PromptTemplate, DEFAULT_CAPTION_PROMPT, DEFAULT_CAPTION_SYSTEM_PROMPT};
pub use shell::{CaptionSession, Clipboard, MemoryClipboard, Notice, NoticeVariant};

/// Generate captions for `request` with the given pipeline.
pub async fn generate_image_captions(
    pipeline: &CaptionPipeline,
    request: CaptionRequest,
) -> Result<CaptionResponse, CaptionError> {
    pipeline.generate_image_captions(request).await
}
