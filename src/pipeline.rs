//! The caption pipeline: analysis, then generation, once per request.

use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use crate::analyzer::{ImageAnalyzer, PlaceholderAnalyzer};
use crate::error::{CaptionError, ErrorKind};
use crate::generator::CaptionGenerator;
use crate::llm::SharedLlmClient;
use crate::model::{CaptionRequest, CaptionResponse};
use crate::photo::PhotoReference;
use crate::prompts::PromptTemplate;

/// Lifecycle of a single pipeline invocation.
///
/// `Idle -> Analyzing -> Generating -> Done`, with `Failed` reachable from
/// `Analyzing` and `Generating`. There are no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Analyzing,
    Generating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, Generating)
                | (Analyzing, Failed)
                | (Generating, Done)
                | (Generating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Generating => "generating",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one invocation together with every state it passed through.
#[derive(Debug)]
pub struct PipelineRun {
    pub states: Vec<PipelineState>,
    pub outcome: Result<CaptionResponse, CaptionError>,
}

impl PipelineRun {
    pub fn final_state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }
}

struct StateTrail {
    states: Vec<PipelineState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            states: vec![PipelineState::Idle],
        }
    }

    fn current(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal pipeline transition {} -> {}",
            current,
            next
        );
        tracing::debug!(from = %current, to = %next, "pipeline transition");
        self.states.push(next);
    }
}

pub struct CaptionPipeline {
    analyzer: Arc<dyn ImageAnalyzer>,
    generator: CaptionGenerator,
}

impl CaptionPipeline {
    /// Pipeline with the placeholder analyzer and the default prompt.
    pub fn new(llm: SharedLlmClient) -> Self {
        Self {
            analyzer: Arc::new(PlaceholderAnalyzer),
            generator: CaptionGenerator::new(llm),
        }
    }

    pub fn from_parts(analyzer: Arc<dyn ImageAnalyzer>, generator: CaptionGenerator) -> Self {
        Self {
            analyzer,
            generator,
        }
    }

    pub fn builder() -> CaptionPipelineBuilder {
        CaptionPipelineBuilder::default()
    }

    pub fn generator(&self) -> &CaptionGenerator {
        &self.generator
    }

    /// Generate captions for the photo in `request`.
    ///
    /// Fails with exactly one of [`CaptionError::Analysis`],
    /// [`CaptionError::MalformedOutput`] or [`CaptionError::Generation`].
    pub async fn generate_image_captions(
        &self,
        request: CaptionRequest,
    ) -> Result<CaptionResponse, CaptionError> {
        self.run(request).await.outcome
    }

    /// Like [`generate_image_captions`](Self::generate_image_captions), also
    /// reporting the states visited.
    pub async fn run(&self, request: CaptionRequest) -> PipelineRun {
        let reference = PhotoReference::parse(&request.photo_url);
        let span = tracing::info_span!(
            "caption_pipeline",
            reference = reference.kind(),
            reference_len = request.photo_url.len()
        );

        async move {
            let mut trail = StateTrail::new();
            let outcome = self.execute(&request, &mut trail).await;
            if let Err(e) = &outcome {
                tracing::error!(error = %e, stage = %trail.current(), "caption pipeline failed");
                trail.advance(PipelineState::Failed);
            } else {
                trail.advance(PipelineState::Done);
            }
            PipelineRun {
                states: trail.states,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &CaptionRequest,
        trail: &mut StateTrail,
    ) -> Result<CaptionResponse, CaptionError> {
        trail.advance(PipelineState::Analyzing);
        let analysis = self
            .analyzer
            .analyze(&request.photo_url)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::Analysis => e,
                _ => CaptionError::analysis(e),
            })?;
        tracing::debug!(chars = analysis.char_count(), "photo analyzed");

        trail.advance(PipelineState::Generating);
        let captions = self.generator.generate(&analysis).await?;

        Ok(CaptionResponse::new(captions))
    }
}

#[derive(Default)]
pub struct CaptionPipelineBuilder {
    llm: Option<SharedLlmClient>,
    analyzer: Option<Arc<dyn ImageAnalyzer>>,
    template: Option<PromptTemplate>,
    system_prompt: Option<String>,
}

impl CaptionPipelineBuilder {
    pub fn llm(mut self, llm: SharedLlmClient) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> Result<CaptionPipeline, CaptionError> {
        let llm = self
            .llm
            .ok_or_else(|| CaptionError::Config("caption pipeline needs an LLM client".to_string()))?;

        let mut generator = CaptionGenerator::new(llm);
        if let Some(template) = self.template {
            generator = generator.with_template(template)?;
        }
        if let Some(prompt) = self.system_prompt {
            generator = generator.with_system_prompt(prompt);
        }

        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(PlaceholderAnalyzer));

        Ok(CaptionPipeline::from_parts(analyzer, generator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_only_forward_transitions_are_legal() {
        assert!(Idle.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Generating));
        assert!(Analyzing.can_transition_to(Failed));
        assert!(Generating.can_transition_to(Done));
        assert!(Generating.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Generating));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Generating.can_transition_to(Analyzing));
        assert!(!Done.can_transition_to(Idle));
        assert!(!Failed.can_transition_to(Analyzing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Done.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Generating.is_terminal());
    }
}
