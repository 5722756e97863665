//! FFmpeg filter and encoder arguments for image and audio features.

use pivot_models::{AudioFormat, ImageFormat};

/// Scale filter for a resize request.
///
/// With both dimensions and `maintain_aspect`, the image is fitted inside the
/// box. A single dimension scales the other proportionally.
pub fn scale_filter(width: Option<u32>, height: Option<u32>, maintain_aspect: bool) -> String {
    match (width, height) {
        (Some(w), Some(h)) if maintain_aspect => {
            format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h)
        }
        (Some(w), Some(h)) => format!("scale={}:{}", w, h),
        (Some(w), None) => format!("scale={}:-1", w),
        (None, Some(h)) => format!("scale=-1:{}", h),
        (None, None) => "scale=iw:ih".to_string(),
    }
}

/// Map a 1-100 quality to the MJPEG `-q:v` scale (2 best, 31 worst).
pub fn jpeg_qscale(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as u32;
    (2 + ((100 - quality) * 29 + 49) / 99) as u8
}

/// Encoder arguments for a still image output.
pub fn image_encoder_args(format: ImageFormat, quality: u8, optimize: bool) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            args.extend(["-q:v".to_string(), jpeg_qscale(quality).to_string()]);
            // MJPEG needs full-range YUV input.
            args.extend(["-pix_fmt".to_string(), "yuvj420p".to_string()]);
        }
        ImageFormat::Webp => {
            args.extend(["-c:v".to_string(), "libwebp".to_string()]);
            args.extend(["-quality".to_string(), quality.to_string()]);
            if optimize {
                args.extend(["-compression_level".to_string(), "6".to_string()]);
            }
        }
        ImageFormat::Png => {
            if optimize {
                args.extend(["-compression_level".to_string(), "9".to_string()]);
            }
        }
        ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Tiff => {}
    }
    args
}

/// Audio encoder for an output format.
pub fn audio_codec(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "libmp3lame",
        AudioFormat::Aac | AudioFormat::M4a => "aac",
        AudioFormat::Ogg => "libvorbis",
        AudioFormat::Flac => "flac",
        AudioFormat::Wav => "pcm_s16le",
        AudioFormat::Webm | AudioFormat::Opus => "libopus",
        AudioFormat::Wma => "wmav2",
        AudioFormat::Alac => "alac",
    }
}

/// VBR quality (`-q:a`) approximating a target bitrate.
///
/// LAME uses 0 (best) to 9; Vorbis uses -1 to 10 (best).
pub fn vbr_quality(format: AudioFormat, bitrate_kbps: u32) -> Option<String> {
    match format {
        AudioFormat::Mp3 => {
            let q = match bitrate_kbps {
                256..=u32::MAX => 0,
                224..=255 => 1,
                192..=223 => 2,
                160..=191 => 3,
                128..=159 => 4,
                112..=127 => 5,
                96..=111 => 6,
                80..=95 => 7,
                _ => 8,
            };
            Some(q.to_string())
        }
        AudioFormat::Ogg => {
            let q = match bitrate_kbps {
                320..=u32::MAX => 9,
                256..=319 => 8,
                192..=255 => 6,
                160..=191 => 5,
                128..=159 => 4,
                112..=127 => 3,
                96..=111 => 2,
                _ => 1,
            };
            Some(q.to_string())
        }
        _ => None,
    }
}

/// EBU R128 loudness normalization filter.
pub fn loudnorm_filter(target_lufs: f64) -> String {
    format!("loudnorm=I={:.1}:TP=-1.5:LRA=11", target_lufs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_filter() {
        assert_eq!(scale_filter(Some(100), None, true), "scale=100:-1");
        assert_eq!(scale_filter(None, Some(50), true), "scale=-1:50");
        assert_eq!(
            scale_filter(Some(100), Some(50), true),
            "scale=100:50:force_original_aspect_ratio=decrease"
        );
        assert_eq!(scale_filter(Some(100), Some(50), false), "scale=100:50");
    }

    #[test]
    fn test_jpeg_qscale_range() {
        assert_eq!(jpeg_qscale(100), 2);
        assert_eq!(jpeg_qscale(1), 31);
        let mid = jpeg_qscale(50);
        assert!(mid > 2 && mid < 31);
    }

    #[test]
    fn test_image_encoder_args() {
        let webp = image_encoder_args(ImageFormat::Webp, 80, true);
        assert_eq!(
            webp,
            vec!["-c:v", "libwebp", "-quality", "80", "-compression_level", "6"]
        );
        assert!(image_encoder_args(ImageFormat::Png, 80, false).is_empty());
        assert!(image_encoder_args(ImageFormat::Jpeg, 95, true).contains(&"-q:v".to_string()));
    }

    #[test]
    fn test_audio_helpers() {
        assert_eq!(audio_codec(AudioFormat::Alac), "alac");
        assert_eq!(audio_codec(AudioFormat::M4a), "aac");
        assert_eq!(vbr_quality(AudioFormat::Mp3, 320).as_deref(), Some("0"));
        assert_eq!(vbr_quality(AudioFormat::Mp3, 64).as_deref(), Some("8"));
        assert_eq!(vbr_quality(AudioFormat::Flac, 128), None);
        assert_eq!(loudnorm_filter(-16.0), "loudnorm=I=-16.0:TP=-1.5:LRA=11");
    }
}
