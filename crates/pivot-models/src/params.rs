//! Typed feature parameters.
//!
//! Parameters travel as an untyped JSON object. [`FeatureParams::decode`]
//! turns that object into one strongly-typed variant per feature, applying
//! defaults and bounds, so handlers never look at the raw map. Numbers are
//! accepted as JSON numbers or numeric strings, booleans as JSON booleans or
//! `"true"`/`"false"`. A `null` or empty-string value counts as absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationResult};
use crate::feature::Feature;
use crate::format::{AudioFormat, ImageFormat};

/// Allowed output sample rates for `audio.compress`.
pub const VALID_SAMPLE_RATES: [u32; 6] = [8000, 11025, 16000, 22050, 44100, 48000];

/// Bitrate bounds (kbps) for lossy audio encodes.
pub const MIN_BITRATE_KBPS: u32 = 64;
pub const MAX_BITRATE_KBPS: u32 = 320;

/// Loudness target bounds (LUFS) for `audio.normalize`.
pub const MIN_TARGET_LUFS: f64 = -23.0;
pub const MAX_TARGET_LUFS: f64 = -12.0;

const DEFAULT_TARGET_LUFS: f64 = -16.0;

// ============================================================================
// Raw parameter access
// ============================================================================

struct ParamReader<'a> {
    params: &'a Map<String, Value>,
}

impl<'a> ParamReader<'a> {
    fn new(params: &'a Map<String, Value>) -> Self {
        Self { params }
    }

    fn value(&self, key: &str) -> Option<&'a Value> {
        match self.params.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    fn float(&self, key: &str) -> ValidationResult<Option<f64>> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ValidationError::invalid_params(format!(
                "{} must be a valid number",
                key
            ))),
        }
    }

    fn int(&self, key: &str) -> ValidationResult<Option<i64>> {
        let Some(value) = self.float(key)? else {
            return Ok(None);
        };
        if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
            return Err(ValidationError::invalid_params(format!(
                "{} must be a whole number",
                key
            )));
        }
        Ok(Some(value as i64))
    }

    fn bool(&self, key: &str, default: bool) -> ValidationResult<bool> {
        match self.value(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ValidationError::invalid_params(format!(
                    "{} must be true or false",
                    key
                ))),
            },
            Some(_) => Err(ValidationError::invalid_params(format!(
                "{} must be true or false",
                key
            ))),
        }
    }

    fn string(&self, key: &str) -> ValidationResult<Option<String>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(ValidationError::invalid_params(format!(
                "{} must be a string",
                key
            ))),
        }
    }

    fn image_format(&self) -> ValidationResult<Option<ImageFormat>> {
        self.string("format")?
            .map(|f| ImageFormat::parse(&f))
            .transpose()
    }

    fn audio_format(&self) -> ValidationResult<Option<AudioFormat>> {
        self.string("format")?
            .map(|f| AudioFormat::parse(&f))
            .transpose()
    }

    fn quality(&self, default: Option<u8>) -> ValidationResult<Option<u8>> {
        match self.int("quality")? {
            Some(q) => check_quality(q).map(Some),
            None => Ok(default),
        }
    }

    fn bitrate(&self) -> ValidationResult<Option<u32>> {
        self.int("bitrate")?.map(check_bitrate).transpose()
    }
}

fn check_quality(quality: i64) -> ValidationResult<u8> {
    if (1..=100).contains(&quality) {
        Ok(quality as u8)
    } else {
        Err(ValidationError::invalid_params(
            "Quality must be between 1 and 100",
        ))
    }
}

fn check_bitrate(bitrate: i64) -> ValidationResult<u32> {
    if (MIN_BITRATE_KBPS as i64..=MAX_BITRATE_KBPS as i64).contains(&bitrate) {
        Ok(bitrate as u32)
    } else {
        Err(ValidationError::invalid_params(format!(
            "bitrate must be between {} and {} kbps",
            MIN_BITRATE_KBPS, MAX_BITRATE_KBPS
        )))
    }
}

fn check_dimension(key: &str, value: Option<i64>) -> ValidationResult<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) if v >= 1 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
        Some(_) => Err(ValidationError::invalid_params(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

// ============================================================================
// Per-feature parameters
// ============================================================================

/// `image.resize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub maintain_aspect: bool,
    pub format: Option<ImageFormat>,
    pub quality: u8,
}

/// `image.compress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCompressParams {
    pub quality: u8,
    pub format: Option<ImageFormat>,
    pub optimize: bool,
}

/// `image.quality`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageQualityParams {
    pub quality: u8,
    pub format: Option<ImageFormat>,
    pub optimize: bool,
}

/// Direction label of a conversion request. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversionType {
    #[default]
    To,
    From,
}

/// `image.convert` and `image.convert-jpg`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConvertParams {
    pub format: ImageFormat,
    pub conversion_type: ConversionType,
    pub quality: u8,
}

/// `audio.trim`; times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimParams {
    pub start_time: f64,
    pub end_time: f64,
    pub format: Option<AudioFormat>,
}

impl TrimParams {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Quality preset for `audio.convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Medium,
    High,
    Custom,
}

impl AudioQuality {
    fn parse(value: &str) -> ValidationResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Ok(AudioQuality::Low),
            "medium" => Ok(AudioQuality::Medium),
            "high" => Ok(AudioQuality::High),
            "custom" => Ok(AudioQuality::Custom),
            _ => Err(ValidationError::invalid_params(
                "quality must be one of: low, medium, high, custom",
            )),
        }
    }

    /// Preset bitrate in kbps; `None` for `Custom`.
    pub fn preset_kbps(&self) -> Option<u32> {
        match self {
            AudioQuality::Low => Some(96),
            AudioQuality::Medium => Some(192),
            AudioQuality::High => Some(320),
            AudioQuality::Custom => None,
        }
    }
}

/// `audio.convert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConvertParams {
    pub format: AudioFormat,
    pub quality: AudioQuality,
    /// Only set when `quality` is `Custom`.
    pub bitrate: Option<u32>,
}

impl AudioConvertParams {
    /// Bitrate to encode with, or `None` for lossless targets.
    pub fn effective_bitrate(&self) -> Option<u32> {
        if !self.format.is_lossy() {
            return None;
        }
        self.quality.preset_kbps().or(self.bitrate)
    }
}

/// `audio.compress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCompressParams {
    pub bitrate: u32,
    pub vbr: bool,
    pub sample_rate: Option<u32>,
    pub format: AudioFormat,
}

/// `audio.normalize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeParams {
    pub target_level: f64,
    pub format: Option<AudioFormat>,
}

/// `audio.metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetadataParams {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
    /// Blob key of the cover art image
    pub cover_art: Option<String>,
}

impl MetadataParams {
    /// Tag name/value pairs to write, in a stable order.
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = Vec::new();
        if let Some(title) = &self.title {
            tags.push(("title", title.clone()));
        }
        if let Some(artist) = &self.artist {
            tags.push(("artist", artist.clone()));
        }
        if let Some(album) = &self.album {
            tags.push(("album", album.clone()));
        }
        if let Some(genre) = &self.genre {
            tags.push(("genre", genre.clone()));
        }
        if let Some(year) = self.year {
            tags.push(("date", year.to_string()));
        }
        if let Some(track) = self.track_number {
            tags.push(("track", track.to_string()));
        }
        tags
    }
}

// ============================================================================
// Tagged union
// ============================================================================

/// Validated parameters, one variant per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureParams {
    Resize(ResizeParams),
    ImageCompress(ImageCompressParams),
    ImageQuality(ImageQualityParams),
    ImageConvert(ImageConvertParams),
    Trim(TrimParams),
    AudioConvert(AudioConvertParams),
    AudioCompress(AudioCompressParams),
    Normalize(NormalizeParams),
    Metadata(MetadataParams),
}

/// What the pipeline knows about the staged input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMedia {
    /// Effective input MIME type
    pub mime_type: String,
    /// Lower-cased input extension with the leading dot
    pub extension: Option<String>,
}

impl SourceMedia {
    pub fn new(mime_type: impl Into<String>, extension: Option<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            extension,
        }
    }
}

/// Extension and MIME type of the output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub extension: String,
    pub mime_type: String,
}

impl OutputTarget {
    fn image(format: ImageFormat) -> Self {
        Self {
            extension: format.extension().to_string(),
            mime_type: format.mime_type(),
        }
    }

    fn audio(format: AudioFormat) -> Self {
        Self {
            extension: format.extension().to_string(),
            mime_type: format.mime_type(),
        }
    }

    fn same_as(source: &SourceMedia) -> Self {
        Self {
            extension: source
                .extension
                .clone()
                .unwrap_or_else(|| AudioFormat::Mp3.extension().to_string()),
            mime_type: source.mime_type.clone(),
        }
    }
}

impl FeatureParams {
    /// Decode and validate the raw parameters for `feature`.
    pub fn decode(feature: Feature, params: &Map<String, Value>) -> ValidationResult<Self> {
        let reader = ParamReader::new(params);
        match feature {
            Feature::ImageResize => decode_resize(&reader),
            Feature::ImageCompress => Ok(FeatureParams::ImageCompress(ImageCompressParams {
                quality: reader.quality(Some(85))?.unwrap_or(85),
                format: reader.image_format()?,
                optimize: reader.bool("optimize", true)?,
            })),
            Feature::ImageQuality => {
                let quality = reader.quality(None)?.ok_or_else(|| {
                    ValidationError::invalid_params("Quality parameter is required")
                })?;
                Ok(FeatureParams::ImageQuality(ImageQualityParams {
                    quality,
                    format: reader.image_format()?,
                    optimize: reader.bool("optimize", true)?,
                }))
            }
            Feature::ImageConvert | Feature::ImageConvertJpg => decode_image_convert(&reader),
            Feature::AudioTrim => decode_trim(&reader),
            Feature::AudioConvert => decode_audio_convert(&reader),
            Feature::AudioCompress => decode_audio_compress(&reader),
            Feature::AudioNormalize => {
                let target_level = reader.float("targetLevel")?.unwrap_or(DEFAULT_TARGET_LUFS);
                if !(MIN_TARGET_LUFS..=MAX_TARGET_LUFS).contains(&target_level) {
                    return Err(ValidationError::invalid_params(
                        "targetLevel must be between -23.0 and -12.0 LUFS",
                    ));
                }
                Ok(FeatureParams::Normalize(NormalizeParams {
                    target_level,
                    format: reader.audio_format()?,
                }))
            }
            Feature::AudioMetadata => decode_metadata(&reader),
        }
    }

    /// Output extension and MIME type for an input described by `source`.
    pub fn output_target(&self, source: &SourceMedia) -> OutputTarget {
        let image_default = || ImageFormat::from_mime(&source.mime_type).unwrap_or(ImageFormat::Jpeg);
        let audio_default = || AudioFormat::from_mime(&source.mime_type).unwrap_or(AudioFormat::Mp3);

        match self {
            FeatureParams::Resize(p) => OutputTarget::image(p.format.unwrap_or_else(image_default)),
            FeatureParams::ImageCompress(p) => {
                OutputTarget::image(p.format.unwrap_or_else(image_default))
            }
            FeatureParams::ImageQuality(p) => {
                OutputTarget::image(p.format.unwrap_or_else(image_default))
            }
            FeatureParams::ImageConvert(p) => OutputTarget::image(p.format),
            FeatureParams::Trim(p) => OutputTarget::audio(p.format.unwrap_or_else(audio_default)),
            FeatureParams::AudioConvert(p) => OutputTarget::audio(p.format),
            FeatureParams::AudioCompress(p) => OutputTarget::audio(p.format),
            FeatureParams::Normalize(p) => match p.format {
                Some(format) => OutputTarget::audio(format),
                None => OutputTarget::same_as(source),
            },
            FeatureParams::Metadata(_) => OutputTarget::same_as(source),
        }
    }

    /// Whether the job can be served by copying the input blob unchanged.
    pub fn is_passthrough(&self, source: &SourceMedia) -> bool {
        match self {
            FeatureParams::ImageConvert(p) => {
                ImageFormat::from_mime(&source.mime_type) == Some(p.format)
            }
            _ => false,
        }
    }

    /// Blob key of an auxiliary asset to stage before the transform.
    pub fn auxiliary_key(&self) -> Option<&str> {
        match self {
            FeatureParams::Metadata(p) => p.cover_art.as_deref(),
            _ => None,
        }
    }
}

fn decode_resize(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let width = check_dimension("width", reader.int("width")?)?;
    let height = check_dimension("height", reader.int("height")?)?;
    if width.is_none() && height.is_none() {
        return Err(ValidationError::invalid_params(
            "At least one of width or height must be specified",
        ));
    }

    Ok(FeatureParams::Resize(ResizeParams {
        width,
        height,
        maintain_aspect: reader.bool("maintainAspect", true)?,
        format: reader.image_format()?,
        quality: reader.quality(Some(95))?.unwrap_or(95),
    }))
}

fn decode_image_convert(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let format = reader
        .string("format")?
        .ok_or_else(|| ValidationError::invalid_params("Format parameter is required for conversion"))?;
    let format = ImageFormat::parse(&format)?;

    let conversion_type = match reader.string("conversionType")?.as_deref() {
        None => ConversionType::To,
        Some(v) if v.eq_ignore_ascii_case("to") => ConversionType::To,
        Some(v) if v.eq_ignore_ascii_case("from") => ConversionType::From,
        Some(_) => {
            return Err(ValidationError::invalid_params(
                "conversionType must be 'to' or 'from'",
            ))
        }
    };

    Ok(FeatureParams::ImageConvert(ImageConvertParams {
        format,
        conversion_type,
        quality: reader.quality(Some(95))?.unwrap_or(95),
    }))
}

fn decode_trim(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let start_time = reader
        .float("startTime")?
        .ok_or_else(|| ValidationError::invalid_params("startTime parameter is required"))?;
    let end_time = reader
        .float("endTime")?
        .ok_or_else(|| ValidationError::invalid_params("endTime parameter is required"))?;

    if start_time < 0.0 {
        return Err(ValidationError::invalid_params("startTime must be >= 0"));
    }
    if end_time <= start_time {
        return Err(ValidationError::invalid_params(
            "endTime must be greater than startTime",
        ));
    }

    Ok(FeatureParams::Trim(TrimParams {
        start_time,
        end_time,
        format: reader.audio_format()?,
    }))
}

fn decode_audio_convert(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let format = reader
        .audio_format()?
        .ok_or_else(|| ValidationError::invalid_params("format parameter is required"))?;
    let quality = match reader.string("quality")? {
        Some(q) => AudioQuality::parse(&q)?,
        None => AudioQuality::default(),
    };

    let bitrate = if quality == AudioQuality::Custom {
        let bitrate = reader.bitrate()?.ok_or_else(|| {
            ValidationError::invalid_params("bitrate is required when quality is custom")
        })?;
        Some(bitrate)
    } else {
        None
    };

    Ok(FeatureParams::AudioConvert(AudioConvertParams {
        format,
        quality,
        bitrate,
    }))
}

fn decode_audio_compress(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let bitrate = reader.bitrate()?.ok_or_else(|| {
        ValidationError::invalid_params("bitrate is required for audio compression")
    })?;

    let sample_rate = match reader.int("sampleRate")? {
        None => None,
        Some(rate) => match VALID_SAMPLE_RATES.iter().find(|r| **r as i64 == rate) {
            Some(r) => Some(*r),
            None => {
                return Err(ValidationError::invalid_params(format!(
                    "sampleRate must be one of: {:?}",
                    VALID_SAMPLE_RATES
                )))
            }
        },
    };

    Ok(FeatureParams::AudioCompress(AudioCompressParams {
        bitrate,
        vbr: reader.bool("vbr", false)?,
        sample_rate,
        format: reader.audio_format()?.unwrap_or(AudioFormat::Mp3),
    }))
}

fn decode_metadata(reader: &ParamReader<'_>) -> ValidationResult<FeatureParams> {
    let year = match reader.int("year")? {
        None => None,
        Some(y) if (1900..=2100).contains(&y) => Some(y as i32),
        Some(_) => {
            return Err(ValidationError::invalid_params(
                "year must be between 1900 and 2100",
            ))
        }
    };
    let track_number = match reader.int("trackNumber")? {
        None => None,
        Some(t) if t >= 1 && t <= u32::MAX as i64 => Some(t as u32),
        Some(_) => return Err(ValidationError::invalid_params("trackNumber must be >= 1")),
    };

    let params = MetadataParams {
        title: reader.string("title")?,
        artist: reader.string("artist")?,
        album: reader.string("album")?,
        genre: reader.string("genre")?,
        year,
        track_number,
        cover_art: reader.string("coverArt")?,
    };

    if params.tags().is_empty() && params.cover_art.is_none() {
        return Err(ValidationError::invalid_params(
            "At least one metadata field or cover art must be provided",
        ));
    }

    Ok(FeatureParams::Metadata(params))
}
