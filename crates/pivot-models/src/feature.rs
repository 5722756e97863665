//! Feature catalogue: media types and the operations registered under each.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Media type of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Image, MediaType::Audio, MediaType::Video];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Audio => "AUDIO",
            MediaType::Video => "VIDEO",
        }
    }

    /// Lower-case label used in messages ("Unknown image feature: ...").
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ValidationError;

    /// Case-insensitive parse of the transported media type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        MediaType::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or(ValidationError::UnknownMediaType(upper))
    }
}

/// A registered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Feature {
    ImageResize,
    ImageCompress,
    ImageConvert,
    ImageConvertJpg,
    ImageQuality,
    AudioTrim,
    AudioConvert,
    AudioCompress,
    AudioNormalize,
    AudioMetadata,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::ImageResize,
        Feature::ImageCompress,
        Feature::ImageConvert,
        Feature::ImageConvertJpg,
        Feature::ImageQuality,
        Feature::AudioTrim,
        Feature::AudioConvert,
        Feature::AudioCompress,
        Feature::AudioNormalize,
        Feature::AudioMetadata,
    ];

    /// Feature slug as sent by the producer.
    pub fn slug(&self) -> &'static str {
        match self {
            Feature::ImageResize => "image.resize",
            Feature::ImageCompress => "image.compress",
            Feature::ImageConvert => "image.convert",
            Feature::ImageConvertJpg => "image.convert-jpg",
            Feature::ImageQuality => "image.quality",
            Feature::AudioTrim => "audio.trim",
            Feature::AudioConvert => "audio.convert",
            Feature::AudioCompress => "audio.compress",
            Feature::AudioNormalize => "audio.normalize",
            Feature::AudioMetadata => "audio.metadata",
        }
    }

    /// Media type this feature is registered under.
    pub fn media_type(&self) -> MediaType {
        match self {
            Feature::ImageResize
            | Feature::ImageCompress
            | Feature::ImageConvert
            | Feature::ImageConvertJpg
            | Feature::ImageQuality => MediaType::Image,
            Feature::AudioTrim
            | Feature::AudioConvert
            | Feature::AudioCompress
            | Feature::AudioNormalize
            | Feature::AudioMetadata => MediaType::Audio,
        }
    }

    /// Look up a feature by its slug.
    pub fn from_slug(slug: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.slug() == slug)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}
