//! Presentation shell state: the selected photo, the caption list, the
//! single-flight guard and the user-facing notices.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;

use crate::error::CaptionError;
use crate::model::CaptionRequest;
use crate::photo::encode_file_as_data_url;
use crate::pipeline::CaptionPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: Option<String>,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant: NoticeVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            variant: NoticeVariant::Destructive,
        }
    }
}

pub const NO_IMAGE_NOTICE: &str = "Please upload an image first.";
pub const GENERATION_FAILED_NOTICE: &str = "Error generating captions.";
pub const COPIED_NOTICE: &str = "Caption copied to clipboard!";

/// Destination for copied captions.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), CaptionError>;
}

/// Clipboard that keeps the last copied text in memory.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|c| c.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), CaptionError> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|_| CaptionError::InvalidInput("clipboard lock poisoned".to_string()))?;
        *contents = Some(text.to_string());
        Ok(())
    }
}

/// Clipboard for terminals: prints the raw caption on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutClipboard;

impl Clipboard for StdoutClipboard {
    fn write_text(&self, text: &str) -> Result<(), CaptionError> {
        println!("{}", text);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    image: Option<String>,
    captions: Vec<String>,
    notices: Vec<Notice>,
}

/// Transient state of one user's caption session.
///
/// At most one caption request runs at a time: a second call made while one
/// is in flight is rejected with [`CaptionError::Busy`] and never reaches the
/// pipeline.
pub struct CaptionSession {
    pipeline: Arc<CaptionPipeline>,
    in_flight: Semaphore,
    state: Mutex<SessionState>,
}

impl CaptionSession {
    pub fn new(pipeline: Arc<CaptionPipeline>) -> Self {
        Self {
            pipeline,
            in_flight: Semaphore::new(1),
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Select a photo given as a data URL (or any other reference).
    pub fn select_image(&self, photo_url: impl Into<String>) {
        self.state().image = Some(photo_url.into());
    }

    /// Read an image file and select it as a data URL.
    pub async fn select_image_file(&self, path: impl AsRef<Path>) -> Result<(), CaptionError> {
        let data_url = encode_file_as_data_url(path).await?;
        self.select_image(data_url);
        Ok(())
    }

    pub fn image(&self) -> Option<String> {
        self.state().image.clone()
    }

    pub fn captions(&self) -> Vec<String> {
        self.state().captions.clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.state().notices.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!(title = %notice.title, "notice");
        self.state().notices.push(notice);
    }

    /// Run the pipeline on the selected image.
    ///
    /// Returns `Ok(false)` without calling the pipeline when no image is
    /// selected, and `Ok(true)` once the captions have been replaced. On
    /// failure the previous captions are kept and a destructive notice is
    /// recorded.
    pub async fn generate_captions(&self) -> Result<bool, CaptionError> {
        let Some(image) = self.image() else {
            self.notify(Notice::info(NO_IMAGE_NOTICE));
            return Ok(false);
        };

        let _permit = self.in_flight.try_acquire().map_err(|_| {
            tracing::warn!("caption request ignored: another request is in flight");
            CaptionError::Busy
        })?;

        match self
            .pipeline
            .generate_image_captions(CaptionRequest::new(image))
            .await
        {
            Ok(response) => {
                self.state().captions = response.captions;
                Ok(true)
            }
            Err(e) => {
                self.notify(Notice::destructive(GENERATION_FAILED_NOTICE, e.to_string()));
                Err(e)
            }
        }
    }

    /// Copy the caption at `index` to `clipboard`.
    pub fn copy_caption(&self, index: usize, clipboard: &dyn Clipboard) -> Result<(), CaptionError> {
        let caption = self.state().captions.get(index).cloned().ok_or_else(|| {
            CaptionError::InvalidInput(format!("there is no caption number {}", index + 1))
        })?;
        clipboard.write_text(&caption)?;
        self.notify(Notice::info(COPIED_NOTICE));
        Ok(())
    }
}
