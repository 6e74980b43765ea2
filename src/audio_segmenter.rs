use std::path::{Path, PathBuf};
use crate::error::RenderResult;
use crate::timeline::AudioWindow;
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 切分后的音频片段
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub path: PathBuf,
    /// 从配音中实际切出的长度（秒）
    pub cut_sec: f64,
    /// 输出总长度（秒），补静音时等于 pad_to
    pub duration_sec: f64,
    pub padded: bool,
}

/// 音频切分器：沿脚本时间轴从共享音轨切出每个场景的窗口
pub struct AudioSegmenter<'a> {
    transcoder: &'a dyn MediaTranscoder,
    source: &'a Path,
    total_audio_sec: f64,
}

impl<'a> AudioSegmenter<'a> {
    pub fn new(transcoder: &'a dyn MediaTranscoder, source: &'a Path, total_audio_sec: f64) -> Self {
        Self {
            transcoder,
            source,
            total_audio_sec,
        }
    }

    pub async fn segment(&self, window: AudioWindow, output: &Path) -> RenderResult<AudioSegment> {
        let cut_sec = window.cut_sec(self.total_audio_sec);

        self.transcoder
            .run(&TranscodeRequest::CutAudio {
                input: self.source.to_path_buf(),
                output: output.to_path_buf(),
                start_sec: window.start_sec,
                duration_sec: cut_sec,
                pad_to_sec: window.pad_to_sec,
                silent: window.is_past_end(self.total_audio_sec),
            })
            .await?;

        Ok(AudioSegment {
            path: output.to_path_buf(),
            cut_sec,
            duration_sec: window.output_sec(self.total_audio_sec),
            padded: window.pad_to_sec.is_some(),
        })
    }
}
