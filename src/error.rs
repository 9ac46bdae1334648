use std::error::Error;
use std::io;

use thiserror::Error;

/// Boxed cause carried by the stage errors.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CaptionError {
    /// The image analysis stage failed.
    #[error("analysis failed: {source}")]
    Analysis {
        #[source]
        source: BoxError,
    },

    /// The model answered, but not with `{"captions": [string, ...]}`.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// The model call itself failed (network, quota, provider error).
    #[error("caption generation failed: {source}")]
    Generation {
        #[source]
        source: BoxError,
    },

    #[error("a caption request is already in flight")]
    Busy,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Raw failure reported by an LLM provider, before a pipeline stage
    /// attributes it to analysis or generation.
    #[error("LLM error: {0}")]
    Llm(String),
}

/// Coarse classification used by callers that only care which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Analysis,
    MalformedOutput,
    Generation,
    Other,
}

impl CaptionError {
    pub fn analysis(source: impl Into<BoxError>) -> Self {
        CaptionError::Analysis {
            source: source.into(),
        }
    }

    pub fn generation(source: impl Into<BoxError>) -> Self {
        CaptionError::Generation {
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptionError::Analysis { .. } => ErrorKind::Analysis,
            CaptionError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            CaptionError::Generation { .. } => ErrorKind::Generation,
            _ => ErrorKind::Other,
        }
    }
}

impl From<toml::de::Error> for CaptionError {
    fn from(error: toml::de::Error) -> Self {
        CaptionError::Config(error.to_string())
    }
}
