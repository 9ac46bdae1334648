//! End-to-end pipeline tests against a scripted model.
use async_trait::async_trait;
use captiongenie::{
    CaptionError, CaptionPipeline, CaptionRequest, ErrorKind, ImageAnalyzer, MockLlmClient,
    PhotoAnalysis, PipelineState, PromptTemplate, SharedLlmClient,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CAT: &str = "http://x/cat.jpg";

fn pipeline_with(mock: &Arc<MockLlmClient>) -> CaptionPipeline {
    let llm: SharedLlmClient = mock.clone();
    CaptionPipeline::new(llm)
}

struct FailingAnalyzer {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _photo_url: &str) -> Result<PhotoAnalysis, CaptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CaptionError::analysis("vision service unavailable"))
    }
}

/// Reports a non-analysis error; the pipeline must still classify it as analysis.
struct SloppyAnalyzer;

#[async_trait]
impl ImageAnalyzer for SloppyAnalyzer {
    async fn analyze(&self, _photo_url: &str) -> Result<PhotoAnalysis, CaptionError> {
        Err(CaptionError::InvalidInput("cannot fetch photo".to_string()))
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_returns_model_captions_verbatim() {
    let mock = Arc::new(
        MockLlmClient::new()
            .with_text_response(r##"{"captions": ["🐱 Cat nap time", "#caturday vibes"]}"##),
    );
    let pipeline = pipeline_with(&mock);

    let response = pipeline
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .expect("pipeline should succeed");

    assert_eq!(
        response.captions,
        vec!["🐱 Cat nap time".to_string(), "#caturday vibes".to_string()]
    );
    assert_eq!(mock.completion_calls(), 1);
}

#[tokio::test]
async fn test_scenario_b_non_array_captions_is_malformed() {
    let mock = Arc::new(MockLlmClient::new().with_text_response(r#"{"captions": "not an array"}"#));
    let pipeline = pipeline_with(&mock);

    let err = pipeline
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedOutput);
    assert!(err.to_string().contains("got a string"), "{}", err);
}

#[tokio::test]
async fn test_scenario_c_network_error_is_generation_error() {
    let mock = Arc::new(MockLlmClient::new().with_failure("network error: connection reset"));
    let pipeline = pipeline_with(&mock);

    let err = pipeline
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(err
        .to_string()
        .starts_with("caption generation failed: "));
    let source = std::error::Error::source(&err).expect("cause should be kept");
    assert!(source.to_string().contains("connection reset"));
}

// ============================================================================
// Output validation
// ============================================================================

#[tokio::test]
async fn test_non_string_elements_are_malformed() {
    let mock = Arc::new(MockLlmClient::new().with_text_response(r#"{"captions": ["ok", 42]}"#));
    let err = pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptionError::MalformedOutput(_)));
}

#[tokio::test]
async fn test_missing_captions_field_is_malformed() {
    let mock = Arc::new(MockLlmClient::new().with_text_response(r#"{"caption": ["one"]}"#));
    let err = pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedOutput);
}

#[tokio::test]
async fn test_plain_text_reply_is_malformed() {
    let mock = Arc::new(MockLlmClient::new().with_text_response("1. Cute cat\n2. Lazy Sunday"));
    let err = pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedOutput);
}

#[tokio::test]
async fn test_fenced_json_reply_is_accepted() {
    let mock = Arc::new(MockLlmClient::new().with_text_response(
        "Here you go:\n```json\n{\"captions\": [\"Sunny side up ☀️\"]}\n```",
    ));
    let response = pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap();
    assert_eq!(response.captions, vec!["Sunny side up ☀️".to_string()]);
}

#[tokio::test]
async fn test_empty_caption_list_is_valid() {
    let mock = Arc::new(MockLlmClient::new().with_text_response(r#"{"captions": []}"#));
    let response = pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap();
    assert!(response.is_empty());
}

// ============================================================================
// Orchestration
// ============================================================================

#[tokio::test]
async fn test_prompt_carries_the_analysis() {
    let mock = Arc::new(MockLlmClient::new());
    pipeline_with(&mock)
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap();

    let prompt = mock.last_prompt().expect("model should have been called");
    assert!(prompt.contains("Image Analysis: This image features a http://x/cat.jpg"));
    assert!(!prompt.contains("{{{photoAnalysis}}}"));
}

#[tokio::test]
async fn test_custom_template_is_used() {
    let mock = Arc::new(MockLlmClient::new());
    let llm: SharedLlmClient = mock.clone();
    let pipeline = CaptionPipeline::builder()
        .llm(llm)
        .template(PromptTemplate::new("Caption this: {{{photoAnalysis}}}"))
        .build()
        .unwrap();

    pipeline
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap();
    assert_eq!(
        mock.last_prompt().as_deref(),
        Some("Caption this: This image features a http://x/cat.jpg")
    );
}

#[tokio::test]
async fn test_builder_rejects_template_without_slot() {
    let llm: SharedLlmClient = Arc::new(MockLlmClient::new());
    let result = CaptionPipeline::builder()
        .llm(llm)
        .template(PromptTemplate::new("Write captions."))
        .build();
    assert!(matches!(result, Err(CaptionError::Config(_))));
}

#[tokio::test]
async fn test_builder_requires_llm() {
    assert!(matches!(
        CaptionPipeline::builder().build(),
        Err(CaptionError::Config(_))
    ));
}

#[tokio::test]
async fn test_successful_run_visits_every_state_in_order() {
    let mock = Arc::new(MockLlmClient::new());
    let run = pipeline_with(&mock).run(CaptionRequest::new(CAT)).await;

    assert!(run.outcome.is_ok());
    assert_eq!(
        run.states,
        vec![
            PipelineState::Idle,
            PipelineState::Analyzing,
            PipelineState::Generating,
            PipelineState::Done,
        ]
    );
}

#[tokio::test]
async fn test_generation_failure_ends_in_failed_after_generating() {
    let mock = Arc::new(MockLlmClient::new().with_failure("quota exceeded"));
    let run = pipeline_with(&mock).run(CaptionRequest::new(CAT)).await;

    assert_eq!(run.final_state(), PipelineState::Failed);
    assert_eq!(run.states[run.states.len() - 2], PipelineState::Generating);
}

#[tokio::test]
async fn test_analysis_failure_skips_generation() {
    let mock = Arc::new(MockLlmClient::new());
    let llm: SharedLlmClient = mock.clone();
    let analyzer = Arc::new(FailingAnalyzer {
        calls: AtomicUsize::new(0),
    });
    let pipeline = CaptionPipeline::builder()
        .llm(llm)
        .analyzer(analyzer.clone())
        .build()
        .unwrap();

    let run = pipeline.run(CaptionRequest::new(CAT)).await;

    let err = run.outcome.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Analysis);
    assert!(err.to_string().starts_with("analysis failed: "));
    assert_eq!(
        run.states,
        vec![
            PipelineState::Idle,
            PipelineState::Analyzing,
            PipelineState::Failed
        ]
    );
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.completion_calls(), 0);
}

#[tokio::test]
async fn test_foreign_analyzer_errors_are_reported_as_analysis() {
    let llm: SharedLlmClient = Arc::new(MockLlmClient::new());
    let pipeline = CaptionPipeline::builder()
        .llm(llm)
        .analyzer(Arc::new(SloppyAnalyzer))
        .build()
        .unwrap();

    let err = pipeline
        .generate_image_captions(CaptionRequest::new(CAT))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Analysis);
    assert!(err.to_string().contains("cannot fetch photo"));
}

#[tokio::test]
async fn test_failure_kinds_are_exhaustive_over_scripted_replies() {
    let replies = [
        Ok(r#"{"captions": ["a", "b"]}"#.to_string()),
        Ok(r#"{"captions": null}"#.to_string()),
        Ok(r#"[]"#.to_string()),
        Ok(String::new()),
        Err("timeout".to_string()),
    ];

    for reply in replies {
        let mock = Arc::new(MockLlmClient::new().with_replies(vec![reply.clone()]));
        match pipeline_with(&mock)
            .generate_image_captions(CaptionRequest::new(CAT))
            .await
        {
            Ok(response) => assert!(reply.is_ok() && !response.is_empty()),
            Err(e) => assert!(
                matches!(
                    e.kind(),
                    ErrorKind::MalformedOutput | ErrorKind::Generation
                ),
                "unexpected error kind for {:?}: {:?}",
                reply,
                e
            ),
        }
    }
}
