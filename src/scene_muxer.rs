use serde::Serialize;
use std::path::{Path, PathBuf};
use crate::audio_segmenter::AudioSegment;
use crate::error::{RenderError, RenderResult};
use crate::probe::MediaProber;
use crate::profile::CanonicalFormat;
use crate::scene_normalizer::NormalizedVideo;
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 合流时长策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DurationPolicy {
    /// 取音视频中较短者
    Shortest,
    /// 取较长者（音频已补齐到视频长度时使用）
    Longest,
}

impl DurationPolicy {
    /// 音频补过静音就不能再按短的截断视频
    pub fn for_audio(audio: &AudioSegment) -> Self {
        if audio.padded {
            DurationPolicy::Longest
        } else {
            DurationPolicy::Shortest
        }
    }

    pub fn apply(&self, video_sec: f64, audio_sec: f64) -> f64 {
        match self {
            DurationPolicy::Shortest => video_sec.min(audio_sec),
            DurationPolicy::Longest => video_sec.max(audio_sec),
        }
    }
}

/// 合流后的场景片段
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSegment {
    pub index: usize,
    pub path: PathBuf,
    pub duration_sec: f64,
    pub format: CanonicalFormat,
}

/// 把一段规范视频和一段音频合成一个场景片段
pub async fn mux_scene(
    transcoder: &dyn MediaTranscoder,
    prober: &dyn MediaProber,
    index: usize,
    video: &NormalizedVideo,
    audio: &AudioSegment,
    output: &Path,
) -> RenderResult<SceneSegment> {
    let video_info = prober.probe(&video.path).await?;
    if !video_info.has_video {
        return Err(RenderError::Mux(format!(
            "场景 {} 的视频输入缺少视频流: {}",
            index,
            video.path.display()
        )));
    }
    let audio_info = prober.probe(&audio.path).await?;
    if !audio_info.has_audio {
        return Err(RenderError::Mux(format!(
            "场景 {} 的音频输入缺少音频流: {}",
            index,
            audio.path.display()
        )));
    }

    let policy = DurationPolicy::for_audio(audio);
    transcoder
        .run(&TranscodeRequest::Mux {
            video: video.path.clone(),
            audio: audio.path.clone(),
            output: output.to_path_buf(),
            policy,
        })
        .await?;

    Ok(SceneSegment {
        index,
        path: output.to_path_buf(),
        duration_sec: policy.apply(video.duration_sec, audio.duration_sec),
        format: video.format.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaInfo;
    use crate::profile::EncodingProfile;
    use crate::testing::{FakeProber, RecordingTranscoder};

    fn video(duration_sec: f64) -> NormalizedVideo {
        NormalizedVideo {
            path: PathBuf::from("v.mp4"),
            duration_sec,
            format: EncodingProfile::default().canonical_format(30),
        }
    }

    fn audio(duration_sec: f64, padded: bool) -> AudioSegment {
        AudioSegment {
            path: PathBuf::from("a.m4a"),
            cut_sec: duration_sec,
            duration_sec,
            padded,
        }
    }

    #[test]
    fn test_policy_apply() {
        assert_eq!(DurationPolicy::Shortest.apply(4.0, 3.0), 3.0);
        assert_eq!(DurationPolicy::Longest.apply(4.0, 3.0), 4.0);
        assert_eq!(DurationPolicy::for_audio(&audio(1.0, true)), DurationPolicy::Longest);
        assert_eq!(DurationPolicy::for_audio(&audio(1.0, false)), DurationPolicy::Shortest);
    }

    #[tokio::test]
    async fn test_default_policy_is_shortest() {
        let transcoder = RecordingTranscoder::default();
        let prober = FakeProber::default();
        let segment = mux_scene(&transcoder, &prober, 0, &video(4.0), &audio(3.9, false), Path::new("s.mp4"))
            .await
            .unwrap();
        assert_eq!(segment.duration_sec, 3.9);
        assert!(matches!(
            transcoder.requests()[0],
            TranscodeRequest::Mux { policy: DurationPolicy::Shortest, .. }
        ));
    }

    #[tokio::test]
    async fn test_padded_audio_keeps_full_video() {
        let transcoder = RecordingTranscoder::default();
        let prober = FakeProber::default();
        let segment = mux_scene(&transcoder, &prober, 2, &video(5.5), &audio(5.5, true), Path::new("s.mp4"))
            .await
            .unwrap();
        assert_eq!(segment.duration_sec, 5.5);
        assert_eq!(segment.index, 2);
        assert!(matches!(
            transcoder.requests()[0],
            TranscodeRequest::Mux { policy: DurationPolicy::Longest, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_audio_stream_is_mux_error() {
        let transcoder = RecordingTranscoder::default();
        let prober = FakeProber::default().with_file(
            "a.m4a",
            MediaInfo { duration_sec: 4.0, has_video: false, has_audio: false },
        );
        let err = mux_scene(&transcoder, &prober, 0, &video(4.0), &audio(4.0, false), Path::new("s.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MuxError");
        assert!(transcoder.requests().is_empty());
    }
}
