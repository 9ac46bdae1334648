use serde_json::Value;

use crate::error::CaptionError;
use crate::llm::SharedLlmClient;
use crate::model::{CaptionPromptInput, CaptionResponse, PhotoAnalysis};
use crate::prompts::{PromptTemplate, DEFAULT_CAPTION_SYSTEM_PROMPT, PHOTO_ANALYSIS_SLOT};

/// Caption generation stage: one prompt, one model call, one validated parse.
pub struct CaptionGenerator {
    llm: SharedLlmClient,
    template: PromptTemplate,
    system_prompt: String,
}

impl CaptionGenerator {
    pub fn new(llm: SharedLlmClient) -> Self {
        Self {
            llm,
            template: PromptTemplate::default(),
            system_prompt: DEFAULT_CAPTION_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the caption template. It must contain the `photoAnalysis` slot.
    pub fn with_template(mut self, template: PromptTemplate) -> Result<Self, CaptionError> {
        template.require_slots(&[PHOTO_ANALYSIS_SLOT])?;
        self.template = template;
        Ok(self)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn render_prompt(&self, analysis: &PhotoAnalysis) -> Result<String, CaptionError> {
        self.template.render(&CaptionPromptInput::new(analysis))
    }

    pub async fn generate(&self, analysis: &PhotoAnalysis) -> Result<Vec<String>, CaptionError> {
        let prompt = self
            .render_prompt(analysis)
            .map_err(CaptionError::generation)?;

        let raw = self
            .llm
            .complete(&self.system_prompt, &prompt)
            .await
            .map_err(CaptionError::generation)?;

        let response = parse_caption_output(&raw)?;
        tracing::info!(count = response.len(), "generated captions");
        Ok(response.captions)
    }
}

/// Parse the model's text into a [`CaptionResponse`].
///
/// The text must be a JSON object (optionally inside a fenced code block)
/// whose `captions` field is an array of strings. Nothing is coerced.
pub fn parse_caption_output(raw: &str) -> Result<CaptionResponse, CaptionError> {
    let value = parse_json_value(raw)?;

    let Some(captions) = value.get("captions") else {
        return Err(CaptionError::MalformedOutput(
            "expected an object with a 'captions' field".to_string(),
        ));
    };
    if !captions.is_array() {
        return Err(CaptionError::MalformedOutput(format!(
            "expected 'captions' to be an array of strings, got {}",
            json_type_name(captions)
        )));
    }

    serde_json::from_value::<CaptionResponse>(value).map_err(|e| {
        CaptionError::MalformedOutput(format!(
            "expected 'captions' to be an array of strings: {}",
            e
        ))
    })
}

fn parse_json_value(raw: &str) -> Result<Value, CaptionError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let Some(fenced) = extract_json_from_markdown(trimmed) else {
        return Err(CaptionError::MalformedOutput(
            "model response is not JSON".to_string(),
        ));
    };
    serde_json::from_str::<Value>(fenced).map_err(|e| {
        CaptionError::MalformedOutput(format!("fenced model response is not JSON: {}", e))
    })
}

/// Extract JSON from markdown code blocks (```json ... ``` or ``` ... ```).
fn extract_json_from_markdown(text: &str) -> Option<&str> {
    let json_start = text
        .find("```json\n")
        .map(|i| i + 8)
        .or_else(|| text.find("```\n").map(|i| i + 4))?;

    let remaining = &text[json_start..];
    let json_end = remaining.find("\n```")?;

    Some(&remaining[..json_end])
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = "Sure!\n```json\n{\"captions\": [\"a\"]}\n```\nEnjoy.";
        assert_eq!(
            extract_json_from_markdown(text),
            Some("{\"captions\": [\"a\"]}")
        );
        assert_eq!(extract_json_from_markdown("no fences"), None);
    }

    #[test]
    fn test_type_names_in_messages() {
        let err = parse_caption_output(r#"{"captions": 3}"#).unwrap_err();
        assert!(err.to_string().contains("got a number"));
    }
}
