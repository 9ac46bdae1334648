//! Photo references: classification, data-URL decoding and file encoding.

use base64::prelude::*;
use bytes::Bytes;
use mime_guess::MimeGuess;
use std::path::Path;
use url::Url;

use crate::error::CaptionError;

/// What a photo reference string points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoReference {
    /// `data:<mime>[;base64],<payload>`
    DataUrl { mime_type: String, base64: bool },
    /// An absolute URL with a network scheme.
    Remote(Url),
    /// Anything else. Still a valid reference; nothing is enforced.
    Opaque,
}

impl PhotoReference {
    pub fn parse(reference: &str) -> Self {
        if let Some(header) = data_url_header(reference) {
            let mut parts = header.split(';');
            let mime_type = parts
                .next()
                .filter(|m| !m.is_empty())
                .unwrap_or("text/plain")
                .to_ascii_lowercase();
            let base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));
            return PhotoReference::DataUrl { mime_type, base64 };
        }

        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "ftp" | "file" | "gs" | "s3") => {
                PhotoReference::Remote(url)
            }
            _ => PhotoReference::Opaque,
        }
    }

    /// Short label safe to log (never includes the payload).
    pub fn kind(&self) -> &'static str {
        match self {
            PhotoReference::DataUrl { .. } => "data-url",
            PhotoReference::Remote(_) => "remote-url",
            PhotoReference::Opaque => "opaque",
        }
    }
}

fn data_url_header(reference: &str) -> Option<&str> {
    let scheme = reference.get(..5)?;
    if !scheme.eq_ignore_ascii_case("data:") {
        return None;
    }
    let comma = reference.find(',')?;
    Some(&reference[5..comma])
}

/// An image decoded from a data URL.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Bytes,
}

impl InlineImage {
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }
}

/// Decode the payload of a `data:` URL.
pub fn decode_data_url(reference: &str) -> Result<InlineImage, CaptionError> {
    let PhotoReference::DataUrl { mime_type, base64 } = PhotoReference::parse(reference) else {
        return Err(CaptionError::InvalidInput(
            "photo reference is not a data URL".to_string(),
        ));
    };

    // parse() only yields DataUrl when a comma is present
    let payload = reference
        .split_once(',')
        .map(|(_, payload)| payload)
        .unwrap_or_default();

    let data = if base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| CaptionError::InvalidInput(format!("invalid base64 payload: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(InlineImage {
        mime_type,
        data: Bytes::from(data),
    })
}

/// Detect an image MIME type, preferring magic bytes over the file name.
pub fn detect_image_mime(bytes: &[u8], file_name: Option<&Path>) -> Option<String> {
    if let Some(kind) = infer::get(bytes) {
        if matches!(kind.matcher_type(), infer::MatcherType::Image) {
            return Some(kind.mime_type().to_string());
        }
    }

    file_name
        .and_then(|path| MimeGuess::from_path(path).first())
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
}

/// Encode image bytes as a `data:<mime>;base64,...` URL.
pub fn encode_data_url(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(bytes))
}

/// Read an image file and encode it as a data URL.
///
/// Files that are not recognisably images are rejected.
pub async fn encode_file_as_data_url(path: impl AsRef<Path>) -> Result<String, CaptionError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        CaptionError::InvalidInput(format!("cannot read '{}': {}", path.display(), e))
    })?;

    let mime_type = detect_image_mime(&bytes, Some(path)).ok_or_else(|| {
        CaptionError::InvalidInput(format!("'{}' is not an image file", path.display()))
    })?;

    tracing::debug!(
        path = %path.display(),
        mime_type = %mime_type,
        size = bytes.len(),
        "encoded photo as data URL"
    );

    Ok(encode_data_url(&bytes, &mime_type))
}
