use serde::{Deserialize, Serialize};

/// Upper bound on the analysis text handed to the caption prompt, in characters.
pub const MAX_ANALYSIS_CHARS: usize = 500;

/// Inbound request: a URI or data URI identifying the photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    pub photo_url: String,
}

impl CaptionRequest {
    pub fn new(photo_url: impl Into<String>) -> Self {
        Self {
            photo_url: photo_url.into(),
        }
    }
}

/// Ordered list of generated captions. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub captions: Vec<String>,
}

impl CaptionResponse {
    pub fn new(captions: Vec<String>) -> Self {
        Self { captions }
    }

    pub fn len(&self) -> usize {
        self.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }
}

/// Textual stand-in for the image content, never longer than
/// [`MAX_ANALYSIS_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PhotoAnalysis(String);

impl PhotoAnalysis {
    /// Build an analysis, truncating on a character boundary if needed.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self(truncate_chars(&text, MAX_ANALYSIS_CHARS).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PhotoAnalysis {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhotoAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters substituted into the caption prompt template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionPromptInput<'a> {
    pub photo_analysis: &'a str,
}

impl<'a> CaptionPromptInput<'a> {
    pub fn new(analysis: &'a PhotoAnalysis) -> Self {
        Self {
            photo_analysis: analysis.as_str(),
        }
    }
}

/// Return the longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
