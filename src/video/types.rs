//! Core types for image-to-video generation.

use crate::error::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prompt sent when the user leaves the prompt empty.
pub const DEFAULT_PROMPT: &str = "Animate this image.";

/// Output resolution requested from the generation endpoint.
pub const RESOLUTION: &str = "720p";

/// MIME type of generated videos.
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Supported output aspect ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 16:9 landscape.
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16 portrait.
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// All choices, in display order.
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }

    /// Parses "16:9" or "9:16".
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "16:9" => Some(Self::Landscape),
            "9:16" => Some(Self::Portrait),
            _ => None,
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Image formats recognised from file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format.
    Png,
    /// JPEG format.
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// A file handed over by a file picker.
///
/// Only the declared type is trusted; the bytes are never sniffed.
#[derive(Debug, Clone)]
pub struct ImageFile {
    /// File name as chosen by the user.
    pub name: String,
    /// Declared MIME type, if the picker supplied one.
    pub declared_type: Option<String>,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl ImageFile {
    /// Creates a file with an explicit declared type.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_type: Some(declared_type.into()),
            data,
        }
    }

    /// Reads a file from disk, declaring its type from the extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let declared_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .map(|f| f.mime_type().to_string());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            declared_type,
            data,
        })
    }

    /// Returns true if the declared type is an image type.
    pub fn is_image(&self) -> bool {
        self.declared_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"))
    }
}

/// An image chosen for animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// MIME type (e.g., "image/jpeg").
    pub mime_type: String,
    /// Original file name, if known.
    pub file_name: Option<String>,
}

impl SelectedImage {
    /// Creates an image from bytes and a MIME type.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL, used as the preview reference.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// A request to animate one image.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The text prompt; may be empty.
    pub prompt: String,
    /// Output aspect ratio.
    pub aspect_ratio: AspectRatio,
    /// The image to animate.
    pub image: SelectedImage,
}

impl GenerationRequest {
    /// Creates a new request with the default aspect ratio.
    pub fn new(prompt: impl Into<String>, image: SelectedImage) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            image,
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Returns the prompt to send, substituting the default when blank.
    pub fn effective_prompt(&self) -> &str {
        let trimmed = self.prompt.trim();
        if trimmed.is_empty() {
            DEFAULT_PROMPT
        } else {
            trimmed
        }
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Wall time from submission to download, in milliseconds.
    pub duration_ms: Option<u64>,
    /// Number of status re-fetches performed.
    pub polls: u32,
    /// Requested aspect ratio.
    pub aspect_ratio: Option<AspectRatio>,
    /// Requested resolution.
    pub resolution: Option<String>,
}

/// A generated video ready for playback.
#[derive(Debug, Clone)]
#[must_use = "generated video should be saved or played"]
pub struct VideoResource {
    /// Raw video bytes.
    pub data: Vec<u8>,
    /// MIME type (e.g., "video/mp4").
    pub mime_type: String,
    /// Generation metadata.
    pub metadata: VideoMetadata,
}

impl VideoResource {
    /// Creates a new video resource.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, metadata: VideoMetadata) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            metadata,
        }
    }

    /// Returns the size of the video data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the video to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Returns a locally addressable URI for playback.
    pub fn uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }
}
