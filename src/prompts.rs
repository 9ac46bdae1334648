//! Default prompts and the template type used to fill them.
//!
//! Templates use mustache-style slots: `{{{name}}}` inserts the value verbatim,
//! and so does `{{name}}`. Nothing is HTML-escaped.
//! Slot names match the camelCase field names of the serialized parameters.

use serde::Serialize;
use serde_json::Value;

use crate::error::CaptionError;

/// System prompt sent alongside every caption request.
pub const DEFAULT_CAPTION_SYSTEM_PROMPT: &str = r#"You are a social media expert.
Respond with a single JSON object of the form {"captions": ["...", "..."]} and nothing else.
Do NOT wrap the JSON in markdown code fences. Do NOT add commentary."#;

/// Default caption instruction template. Takes the `photoAnalysis` slot.
pub const DEFAULT_CAPTION_PROMPT: &str = r#"Generate a few relevant captions for the image based on the analysis below. The captions should be short, engaging, and appropriate for platforms like Instagram, Twitter, and Facebook. Include relevant hashtags to increase visibility, but don't overdo it. Prefer emojis to text when possible. Vary the captions in style - some should be funny, some thought-provoking, some inspirational. The project's name is Post Captions.

Image Analysis: {{{photoAnalysis}}}

Captions:"#;

/// System prompt used by the vision analyzer when it can see the image.
pub const VISION_ANALYSIS_PROMPT: &str = r#"You are an expert at analyzing photos for social media.
Describe the main subject, setting, mood, colors and any visible text or product names.
Be concise: at most three sentences, plain text, no markdown."#;

/// Name of the single slot the caption template must contain.
pub const PHOTO_ANALYSIS_SLOT: &str = "photoAnalysis";

/// A prompt template with named parameter slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTION_PROMPT)
    }
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all slots in order of first appearance.
    pub fn slots(&self) -> Vec<String> {
        let mut slots: Vec<String> = Vec::new();
        let mut rest = self.source.as_str();
        while let Some((slot, after)) = next_slot(rest) {
            if !slots.iter().any(|s| s == slot.name) {
                slots.push(slot.name.to_string());
            }
            rest = after;
        }
        slots
    }

    /// Fail unless every name in `required` has a slot in the template.
    pub fn require_slots(&self, required: &[&str]) -> Result<(), CaptionError> {
        let slots = self.slots();
        for name in required {
            if !slots.iter().any(|s| s == *name) {
                return Err(CaptionError::Config(format!(
                    "prompt template is missing the {{{{{{{}}}}}}} slot",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Substitute the fields of `params` into the template.
    ///
    /// `params` must serialize to a JSON object. A slot naming a field that
    /// does not exist is an error; extra fields are ignored.
    pub fn render<T: Serialize>(&self, params: &T) -> Result<String, CaptionError> {
        let value = serde_json::to_value(params)
            .map_err(|e| CaptionError::Config(format!("invalid prompt parameters: {}", e)))?;
        let Value::Object(fields) = value else {
            return Err(CaptionError::Config(
                "prompt parameters must serialize to an object".to_string(),
            ));
        };

        let mut rendered = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();
        while let Some((slot, after)) = next_slot(rest) {
            rendered.push_str(slot.before);
            let field = fields.get(slot.name).ok_or_else(|| {
                CaptionError::Config(format!("no value for prompt slot '{}'", slot.name))
            })?;
            match field {
                Value::String(s) => rendered.push_str(s),
                other => rendered.push_str(&other.to_string()),
            }
            rest = after;
        }
        rendered.push_str(rest);
        Ok(rendered)
    }
}

struct Slot<'a> {
    before: &'a str,
    name: &'a str,
}

/// Find the next `{{{name}}}` or `{{name}}` slot in `text`.
fn next_slot(text: &str) -> Option<(Slot<'_>, &str)> {
    let start = text.find("{{")?;
    let triple = text[start..].starts_with("{{{");
    let (open, close) = if triple { (3, "}}}") } else { (2, "}}") };
    let inner_start = start + open;
    let inner_len = text[inner_start..].find(close)?;
    let name = text[inner_start..inner_start + inner_len].trim();
    let after = &text[inner_start + inner_len + close.len()..];
    Some((
        Slot {
            before: &text[..start],
            name,
        },
        after,
    ))
}
