//! Media transform provider.
//!
//! The job pipeline calls [`MediaTransform::apply`] with validated parameters
//! and job-scoped local paths. [`FfmpegTransformer`] implements every image
//! and audio feature with a single FFmpeg invocation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pivot_models::{AudioFormat, Feature, FeatureParams, ImageFormat};
use tracing::{debug, info};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    audio_codec, image_encoder_args, loudnorm_filter, scale_filter, vbr_quality,
};

/// Sample rate forced after `loudnorm`, which otherwise resamples to 192 kHz.
const NORMALIZED_SAMPLE_RATE: u32 = 48_000;

/// Media provider configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// FFmpeg binary (name on PATH or absolute path)
    pub ffmpeg_path: Option<String>,
    /// Per-transform timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            timeout_secs: 600,
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            timeout_secs: std::env::var("TRANSFORM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        }
    }
}

/// One transform invocation.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub feature: Feature,
    pub params: FeatureParams,
    /// Staged input file
    pub input: PathBuf,
    /// Where the output must be written
    pub output: PathBuf,
    /// Staged auxiliary asset (cover art)
    pub auxiliary: Option<PathBuf>,
}

/// Transform capability injected into the pipeline.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Produce `request.output` from `request.input`.
    async fn apply(&self, request: &TransformRequest) -> MediaResult<()>;
}

/// FFmpeg-backed transform provider.
#[derive(Debug, Clone)]
pub struct FfmpegTransformer {
    runner: FfmpegRunner,
}

impl FfmpegTransformer {
    /// Resolve the FFmpeg binary; fails when it is not installed.
    pub fn new(config: &MediaConfig) -> MediaResult<Self> {
        let binary = check_ffmpeg(config.ffmpeg_path.as_deref())?;
        info!("Using FFmpeg at {}", binary.display());
        Ok(Self {
            runner: FfmpegRunner::new(binary).with_timeout(config.timeout_secs),
        })
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn output_image_format(explicit: Option<ImageFormat>, output: &Path) -> Option<ImageFormat> {
    explicit.or_else(|| extension_of(output).and_then(|e| ImageFormat::from_extension(&e)))
}

fn output_audio_format(explicit: Option<AudioFormat>, output: &Path) -> Option<AudioFormat> {
    explicit.or_else(|| extension_of(output).and_then(|e| AudioFormat::from_extension(&e)))
}

fn with_image_encoder(
    cmd: FfmpegCommand,
    format: Option<ImageFormat>,
    quality: u8,
    optimize: bool,
) -> FfmpegCommand {
    let cmd = match format {
        Some(format) => cmd.output_args(image_encoder_args(format, quality, optimize)),
        None => cmd,
    };
    cmd.single_frame()
}

fn with_audio_codec(cmd: FfmpegCommand, format: Option<AudioFormat>) -> FfmpegCommand {
    let cmd = cmd.no_video();
    match format {
        Some(format) => cmd.audio_codec(audio_codec(format)),
        None => cmd,
    }
}

/// Build the FFmpeg invocation for a request.
pub fn build_command(request: &TransformRequest) -> MediaResult<FfmpegCommand> {
    let cmd = FfmpegCommand::new(&request.input, &request.output);
    let output = request.output.as_path();

    let cmd = match &request.params {
        FeatureParams::Resize(p) => with_image_encoder(
            cmd.video_filter(scale_filter(p.width, p.height, p.maintain_aspect)),
            output_image_format(p.format, output),
            p.quality,
            true,
        ),
        FeatureParams::ImageCompress(p) => with_image_encoder(
            cmd,
            output_image_format(p.format, output),
            p.quality,
            p.optimize,
        ),
        FeatureParams::ImageQuality(p) => with_image_encoder(
            cmd,
            output_image_format(p.format, output),
            p.quality,
            p.optimize,
        ),
        FeatureParams::ImageConvert(p) => {
            with_image_encoder(cmd, Some(p.format), p.quality, true)
        }
        FeatureParams::Trim(p) => with_audio_codec(
            cmd.seek(p.start_time).duration(p.duration()),
            output_audio_format(p.format, output),
        ),
        FeatureParams::AudioConvert(p) => {
            let cmd = with_audio_codec(cmd, Some(p.format));
            match p.effective_bitrate() {
                Some(kbps) => cmd.audio_bitrate(kbps),
                None => cmd,
            }
        }
        FeatureParams::AudioCompress(p) => {
            let cmd = with_audio_codec(cmd, Some(p.format));
            let cmd = match vbr_quality(p.format, p.bitrate).filter(|_| p.vbr) {
                Some(q) => cmd.output_arg("-q:a").output_arg(q),
                None => cmd.audio_bitrate(p.bitrate),
            };
            match p.sample_rate {
                Some(hz) => cmd.sample_rate(hz),
                None => cmd,
            }
        }
        FeatureParams::Normalize(p) => with_audio_codec(
            cmd.audio_filter(loudnorm_filter(p.target_level)),
            output_audio_format(p.format, output),
        )
        .sample_rate(NORMALIZED_SAMPLE_RATE),
        FeatureParams::Metadata(p) => {
            let cmd = match (&p.cover_art, &request.auxiliary) {
                (Some(_), Some(cover)) => cmd
                    .extra_input(cover)
                    .output_args(["-map", "0:a", "-map", "1:v", "-c:a", "copy", "-c:v", "copy"])
                    .output_args(["-disposition:v", "attached_pic"]),
                (Some(key), None) => {
                    return Err(MediaError::unsupported(format!(
                        "cover art {} was not staged",
                        key
                    )))
                }
                (None, _) => cmd.output_args(["-map", "0:a", "-c:a", "copy"]),
            };
            let cmd = cmd.output_args(["-map_metadata", "0"]);
            let cmd = if extension_of(output).as_deref() == Some("mp3") {
                cmd.output_args(["-id3v2_version", "3"])
            } else {
                cmd
            };
            p.tags()
                .into_iter()
                .fold(cmd, |cmd, (key, value)| cmd.metadata(key, &value))
        }
    };

    Ok(cmd)
}

#[async_trait]
impl MediaTransform for FfmpegTransformer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn apply(&self, request: &TransformRequest) -> MediaResult<()> {
        if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(request.input.clone()));
        }

        let cmd = build_command(request)?;
        debug!("Transforming {} with {}", request.feature, self.name());
        self.runner.run(&cmd).await?;

        let written = tokio::fs::metadata(&request.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced no output",
                None,
                None,
            ));
        }

        info!(
            "Transformed {} -> {} ({} bytes)",
            request.input.display(),
            request.output.display(),
            written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(feature: Feature, params: serde_json::Value, output: &str) -> TransformRequest {
        let map = params.as_object().cloned().unwrap_or_default();
        TransformRequest {
            feature,
            params: FeatureParams::decode(feature, &map).unwrap(),
            input: PathBuf::from("/scratch/j1_input.png"),
            output: PathBuf::from(output),
            auxiliary: None,
        }
    }

    fn args_of(request: &TransformRequest) -> Vec<String> {
        build_command(request).unwrap().build_args()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_resize_command() {
        let args = args_of(&request(
            Feature::ImageResize,
            json!({"width": 100}),
            "/scratch/j1_output.png",
        ));
        assert!(has_pair(&args, "-vf", "scale=100:-1"));
        assert!(has_pair(&args, "-frames:v", "1"));
        assert!(has_pair(&args, "-compression_level", "9"));
    }

    #[test]
    fn test_convert_to_jpeg_sets_qscale() {
        let args = args_of(&request(
            Feature::ImageConvertJpg,
            json!({"format": "jpg", "quality": 100}),
            "/scratch/j1_output.jpg",
        ));
        assert!(has_pair(&args, "-q:v", "2"));
    }

    #[test]
    fn test_trim_command() {
        let args = args_of(&request(
            Feature::AudioTrim,
            json!({"startTime": 1.5, "endTime": 4}),
            "/scratch/j1_output.mp3",
        ));
        assert!(has_pair(&args, "-ss", "1.500"));
        assert!(has_pair(&args, "-t", "2.500"));
        assert!(has_pair(&args, "-c:a", "libmp3lame"));
        assert!(args.contains(&"-vn".to_string()));
    }

    #[test]
    fn test_audio_convert_lossless_has_no_bitrate() {
        let args = args_of(&request(
            Feature::AudioConvert,
            json!({"format": "alac", "quality": "high"}),
            "/scratch/j1_output.m4a",
        ));
        assert!(has_pair(&args, "-c:a", "alac"));
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_compress_vbr_and_sample_rate() {
        let args = args_of(&request(
            Feature::AudioCompress,
            json!({"bitrate": 128, "vbr": true, "sampleRate": 44100}),
            "/scratch/j1_output.mp3",
        ));
        assert!(has_pair(&args, "-q:a", "4"));
        assert!(has_pair(&args, "-ar", "44100"));

        let args = args_of(&request(
            Feature::AudioCompress,
            json!({"bitrate": 96, "format": "aac", "vbr": true}),
            "/scratch/j1_output.aac",
        ));
        assert!(has_pair(&args, "-b:a", "96k"));
    }

    #[test]
    fn test_normalize_keeps_input_format() {
        let args = args_of(&request(
            Feature::AudioNormalize,
            json!({"targetLevel": -14}),
            "/scratch/j1_output.wav",
        ));
        assert!(has_pair(&args, "-af", "loudnorm=I=-14.0:TP=-1.5:LRA=11"));
        assert!(has_pair(&args, "-c:a", "pcm_s16le"));
    }

    #[test]
    fn test_metadata_with_cover() {
        let mut req = request(
            Feature::AudioMetadata,
            json!({"title": "Song", "year": 2020, "coverArt": "covers/c.png"}),
            "/scratch/j1_output.mp3",
        );
        assert!(matches!(build_command(&req), Err(MediaError::Unsupported(_))));

        req.auxiliary = Some(PathBuf::from("/scratch/j1_cover.png"));
        let args = args_of(&req);
        assert!(has_pair(&args, "-i", "/scratch/j1_cover.png"));
        assert!(has_pair(&args, "-disposition:v", "attached_pic"));
        assert!(has_pair(&args, "-metadata", "title=Song"));
        assert!(has_pair(&args, "-metadata", "date=2020"));
        assert!(has_pair(&args, "-id3v2_version", "3"));
    }

    #[test]
    fn test_new_fails_without_ffmpeg() {
        let config = MediaConfig {
            ffmpeg_path: Some("/nonexistent/ffmpeg".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(
            FfmpegTransformer::new(&config),
            Err(MediaError::FfmpegNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = FfmpegTransformer {
            runner: FfmpegRunner::new("ffmpeg"),
        };
        let mut req = request(
            Feature::ImageResize,
            json!({"width": 10}),
            "/scratch/j1_output.png",
        );
        req.input = dir.path().join("missing.png");

        let err = transformer.apply(&req).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
