//! Image and audio format tables.
//!
//! Formats carry their file extension and MIME type so that the output key
//! (`outputs/{orgId}/{jobId}/output{ext}`) and the reported output MIME type
//! are derived from one place.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fallback MIME type when neither the producer nor the store reports one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Parse a user-supplied format name (`jpg`, `JPEG`, `tif`, ...).
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            "webp" => Ok(ImageFormat::Webp),
            "bmp" => Ok(ImageFormat::Bmp),
            "tiff" | "tif" => Ok(ImageFormat::Tiff),
            other => Err(ValidationError::invalid_params(format!(
                "Unsupported image format: {}",
                other
            ))),
        }
    }

    /// Format from a MIME type, if recognised.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            "image/bmp" => Some(ImageFormat::Bmp),
            "image/tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Format from a file extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::parse(ext.trim_start_matches('.')).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => ".jpg",
            ImageFormat::Png => ".png",
            ImageFormat::Gif => ".gif",
            ImageFormat::Webp => ".webp",
            ImageFormat::Bmp => ".bmp",
            ImageFormat::Tiff => ".tiff",
        }
    }

    pub fn mime_type(&self) -> String {
        format!("image/{}", self.name())
    }

    /// Whether the encoder takes a quality setting (JPEG/WebP).
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Webp)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Aac,
    M4a,
    Ogg,
    Flac,
    Webm,
    Opus,
    Wma,
    Alac,
}

impl AudioFormat {
    /// Parse a user-supplied format name.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name.trim().to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "aac" => Ok(AudioFormat::Aac),
            "m4a" => Ok(AudioFormat::M4a),
            "ogg" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            "webm" => Ok(AudioFormat::Webm),
            "opus" => Ok(AudioFormat::Opus),
            "wma" => Ok(AudioFormat::Wma),
            "alac" => Ok(AudioFormat::Alac),
            other => Err(ValidationError::invalid_params(format!(
                "Unsupported audio format: {}",
                other
            ))),
        }
    }

    /// Format from a MIME type, if recognised.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_lowercase().as_str() {
            "audio/mpeg" | "audio/mp3" => Some(AudioFormat::Mp3),
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some(AudioFormat::M4a),
            "audio/wav" | "audio/wave" | "audio/x-wav" => Some(AudioFormat::Wav),
            "audio/aac" | "audio/x-aac" => Some(AudioFormat::Aac),
            "audio/ogg" | "audio/vorbis" => Some(AudioFormat::Ogg),
            "audio/flac" | "audio/x-flac" => Some(AudioFormat::Flac),
            "audio/webm" => Some(AudioFormat::Webm),
            "audio/opus" => Some(AudioFormat::Opus),
            _ => None,
        }
    }

    /// Format from a file extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::parse(ext.trim_start_matches('.')).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Webm => "webm",
            AudioFormat::Opus => "opus",
            AudioFormat::Wma => "wma",
            AudioFormat::Alac => "alac",
        }
    }

    /// File extension; ALAC lives in an M4A container.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Alac => ".m4a",
            AudioFormat::Mp3 => ".mp3",
            AudioFormat::Wav => ".wav",
            AudioFormat::Aac => ".aac",
            AudioFormat::M4a => ".m4a",
            AudioFormat::Ogg => ".ogg",
            AudioFormat::Flac => ".flac",
            AudioFormat::Webm => ".webm",
            AudioFormat::Opus => ".opus",
            AudioFormat::Wma => ".wma",
        }
    }

    pub fn mime_type(&self) -> String {
        format!("audio/{}", self.name())
    }

    /// Whether a bitrate applies to the encoder.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            AudioFormat::Mp3
                | AudioFormat::Aac
                | AudioFormat::M4a
                | AudioFormat::Ogg
                | AudioFormat::Wma
                | AudioFormat::Webm
                | AudioFormat::Opus
        )
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
