use serde::Serialize;

/// 规范编码参数
///
/// 每个场景输出都必须共享同一组参数，拼接阶段才能直接流复制。
#[derive(Debug, Clone)]
pub struct EncodingProfile {
    /// 画布宽度（竖屏）
    pub width: u32,
    /// 画布高度（竖屏）
    pub height: u32,
    pub pixel_format: String,
    pub video_codec: String,
    /// x264 preset
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    /// 固定音频码率，例如 "192k"
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            pixel_format: "yuv420p".to_string(),
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            audio_sample_rate: 48_000,
            audio_channels: 2,
        }
    }
}

impl EncodingProfile {
    /// 在给定帧率下的规范视频格式
    pub fn canonical_format(&self, fps: u32) -> CanonicalFormat {
        CanonicalFormat {
            width: self.width,
            height: self.height,
            fps,
            pixel_format: self.pixel_format.clone(),
            video_codec: self.video_codec.clone(),
        }
    }

    /// 等比缩放 + 黑边填充到画布，并统一帧率和像素格式
    pub fn frame_filter(&self, fps: u32) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,\
             setsar=1,fps={fps},format={pix}",
            w = self.width,
            h = self.height,
            fps = fps,
            pix = self.pixel_format,
        )
    }
}

/// 规范视频格式：分辨率、帧率、像素格式、编码器
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: String,
    pub video_codec: String,
}

impl std::fmt::Display for CanonicalFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{}fps {} {}",
            self.width, self.height, self.fps, self.pixel_format, self.video_codec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_filter_letterboxes_to_canvas() {
        let profile = EncodingProfile::default();
        let filter = profile.frame_filter(30);
        assert!(filter.starts_with("scale=1080:1920:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1080:1920:(ow-iw)/2:(oh-ih)/2"));
        assert!(filter.contains("fps=30"));
        assert!(filter.ends_with("format=yuv420p"));
    }

    #[test]
    fn test_canonical_format_depends_on_fps() {
        let profile = EncodingProfile::default();
        assert_eq!(profile.canonical_format(30), profile.canonical_format(30));
        assert_ne!(profile.canonical_format(30), profile.canonical_format(25));
    }
}
