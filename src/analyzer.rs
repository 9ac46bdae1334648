//! Image analysis stage: turns a photo reference into a bounded text summary.
//!
//! Whatever an analyzer does internally, its output is a [`PhotoAnalysis`],
//! which never exceeds [`MAX_ANALYSIS_CHARS`](crate::model::MAX_ANALYSIS_CHARS)
//! characters, so the caption prompt stays within the model's token budget.

use async_trait::async_trait;

use crate::error::CaptionError;
use crate::llm::SharedLlmClient;
use crate::model::PhotoAnalysis;
use crate::photo::{decode_data_url, PhotoReference};

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Describe the photo behind `photo_url`.
    ///
    /// Failures must be reported as [`CaptionError::Analysis`].
    async fn analyze(&self, photo_url: &str) -> Result<PhotoAnalysis, CaptionError>;
}

/// Stand-in analyzer that formats the reference into a sentence.
///
/// Deterministic: the same reference always yields the same analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderAnalyzer;

impl PlaceholderAnalyzer {
    pub fn describe(photo_url: &str) -> PhotoAnalysis {
        PhotoAnalysis::new(format!("This image features a {}", photo_url))
    }
}

#[async_trait]
impl ImageAnalyzer for PlaceholderAnalyzer {
    async fn analyze(&self, photo_url: &str) -> Result<PhotoAnalysis, CaptionError> {
        Ok(Self::describe(photo_url))
    }
}

/// Analyzer backed by a vision-capable LLM.
///
/// Inline (`data:`) images are sent to the model as image content. For any
/// other reference only the reference text is available, so the model is
/// asked to describe what the URL suggests.
pub struct VisionAnalyzer {
    llm: SharedLlmClient,
}

impl VisionAnalyzer {
    pub fn new(llm: SharedLlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ImageAnalyzer for VisionAnalyzer {
    async fn analyze(&self, photo_url: &str) -> Result<PhotoAnalysis, CaptionError> {
        let description = match PhotoReference::parse(photo_url) {
            PhotoReference::DataUrl { .. } => {
                let image = decode_data_url(photo_url).map_err(CaptionError::analysis)?;
                if !image.mime_type.starts_with("image/") {
                    return Err(CaptionError::analysis(format!(
                        "data URL holds '{}', not an image",
                        image.mime_type
                    )));
                }
                self.llm
                    .describe_image_base64(&image.to_base64(), &image.mime_type)
                    .await
            }
            PhotoReference::Remote(url) => {
                let prompt = format!(
                    "Describe the photo most likely found at this URL: {}",
                    url
                );
                self.llm
                    .complete(&self.llm.config().vision_prompt, &prompt)
                    .await
            }
            PhotoReference::Opaque => {
                let prompt = format!("Describe a photo referenced as: {}", photo_url);
                self.llm
                    .complete(&self.llm.config().vision_prompt, &prompt)
                    .await
            }
        }
        .map_err(CaptionError::analysis)?;

        let description = description.trim();
        if description.is_empty() {
            return Err(CaptionError::analysis("vision model returned an empty description"));
        }

        Ok(PhotoAnalysis::new(description))
    }
}
