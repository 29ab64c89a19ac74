//! Output encoding settings for clips.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// H.264 encoder used for clip video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoEncoder {
    /// Software x264
    #[default]
    Libx264,
    /// NVIDIA hardware encoder
    H264Nvenc,
}

impl VideoEncoder {
    /// Name passed to `-c:v`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoEncoder::Libx264 => "libx264",
            VideoEncoder::H264Nvenc => "h264_nvenc",
        }
    }

    /// Preset giving roughly x264 `medium` speed and quality.
    pub fn balanced_preset(&self) -> &'static str {
        match self {
            VideoEncoder::Libx264 => "medium",
            VideoEncoder::H264Nvenc => "p4",
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// How clips are encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    pub encoder: VideoEncoder,
    pub preset: String,
    /// Constant quality, 0-51, lower is better. Sent as `-cq` to NVENC.
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Forced output pixel format; camera footage is often 4:2:2 or 10-bit
    pub pixel_format: Option<String>,
    /// Appended after the generated output arguments
    pub extra_args: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            encoder: VideoEncoder::Libx264,
            preset: VideoEncoder::Libx264.balanced_preset().to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            pixel_format: Some("yuv420p".to_string()),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Same settings on the NVENC encoder.
    pub fn with_nvenc(mut self) -> Self {
        self.encoder = VideoEncoder::H264Nvenc;
        self.preset = VideoEncoder::H264Nvenc.balanced_preset().to_string();
        self
    }

    pub fn is_nvenc(&self) -> bool {
        self.encoder == VideoEncoder::H264Nvenc
    }

    /// Codec and quality arguments for the output file.
    pub fn output_args(&self) -> Vec<String> {
        let quality_flag = if self.is_nvenc() { "-cq" } else { "-crf" };
        let mut args: Vec<String> = [
            "-c:v",
            self.encoder.ffmpeg_name(),
            "-preset",
            &self.preset,
            quality_flag,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.crf.to_string());

        if let Some(pix_fmt) = &self.pixel_format {
            args.push("-pix_fmt".to_string());
            args.push(pix_fmt.clone());
        }
        args.extend([
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_software_defaults() {
        let args = EncodingConfig::default().output_args();
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-preset", "medium"));
        assert!(has_pair(&args, "-crf", "20"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-b:a", "192k"));
    }

    #[test]
    fn test_nvenc_uses_constant_quality() {
        let config = EncodingConfig::default().with_nvenc();
        assert!(config.is_nvenc());
        let args = config.output_args();
        assert!(has_pair(&args, "-c:v", "h264_nvenc"));
        assert!(has_pair(&args, "-preset", "p4"));
        assert!(has_pair(&args, "-cq", "20"));
        assert!(!args.iter().any(|a| a == "-crf"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EncodingConfig =
            serde_json::from_str(r#"{"crf": 18, "encoder": "h264_nvenc"}"#).unwrap();
        assert_eq!(config.crf, 18);
        assert_eq!(config.encoder, VideoEncoder::H264Nvenc);
        assert_eq!(config.audio_codec, "aac");
    }
}
