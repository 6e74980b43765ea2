use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use crate::error::{RenderError, RenderResult};

/// libavformat 的时间基（微秒）
const AV_TIME_BASE: f64 = 1_000_000.0;

/// 媒体文件的探测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// 容器报告的时长（秒）
    pub duration_sec: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// 媒体探测接口
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> RenderResult<MediaInfo>;

    /// 仅获取时长
    async fn duration(&self, path: &Path) -> RenderResult<f64> {
        Ok(self.probe(path).await?.duration_sec)
    }
}

/// 基于 libavformat 的探测器，调用在阻塞线程池上执行
#[derive(Debug, Default)]
pub struct FfmpegProber;

/// FFmpeg 全局初始化结果，每次构造探测器都能看到
static FFMPEG_INIT: OnceLock<Result<(), String>> = OnceLock::new();

impl FfmpegProber {
    pub fn new() -> RenderResult<Self> {
        let init = FFMPEG_INIT.get_or_init(|| {
            ffmpeg::init().map_err(|e| e.to_string())?;
            // 只输出错误信息，抑制警告和信息消息
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
            Ok(())
        });
        match init {
            Ok(()) => Ok(Self),
            Err(detail) => Err(RenderError::Probe {
                path: PathBuf::new(),
                detail: format!("初始化 FFmpeg 失败: {}", detail),
            }),
        }
    }

    fn probe_blocking(path: &Path) -> RenderResult<MediaInfo> {
        let probe_error = |detail: String| RenderError::Probe {
            path: path.to_path_buf(),
            detail,
        };

        let ictx = ffmpeg::format::input(&path)
            .map_err(|e| probe_error(format!("无法打开媒体文件: {}", e)))?;

        let raw = ictx.duration();
        if raw <= 0 {
            return Err(probe_error(format!("容器未报告有效时长: {}", raw)));
        }
        let duration_sec = raw as f64 / AV_TIME_BASE;
        if !duration_sec.is_finite() {
            return Err(probe_error("时长无法解析".to_string()));
        }

        let has_video = ictx.streams().best(ffmpeg::media::Type::Video).is_some();
        let has_audio = ictx.streams().best(ffmpeg::media::Type::Audio).is_some();

        Ok(MediaInfo {
            duration_sec,
            has_video,
            has_audio,
        })
    }
}

#[async_trait]
impl MediaProber for FfmpegProber {
    async fn probe(&self, path: &Path) -> RenderResult<MediaInfo> {
        let owned = path.to_path_buf();
        let info = tokio::task::spawn_blocking(move || Self::probe_blocking(&owned))
            .await
            .map_err(|e| RenderError::Probe {
                path: path.to_path_buf(),
                detail: format!("探测任务异常退出: {}", e),
            })??;

        tracing::debug!(
            "🔍 [探测] {}: {:.3}秒 (视频: {}, 音频: {})",
            path.display(),
            info.duration_sec,
            info.has_video,
            info.has_audio
        );
        Ok(info)
    }
}
