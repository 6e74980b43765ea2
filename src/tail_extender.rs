use std::path::Path;
use crate::error::RenderResult;
use crate::scene_normalizer::NormalizedVideo;
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 尾部延长：冻结最后一帧，为结尾配音留出缓冲
pub async fn extend_tail(
    transcoder: &dyn MediaTranscoder,
    video: NormalizedVideo,
    extra_sec: f64,
    output: &Path,
) -> RenderResult<NormalizedVideo> {
    if !(extra_sec > 0.0) {
        return Ok(video);
    }

    transcoder
        .run(&TranscodeRequest::HoldLastFrame {
            input: video.path.clone(),
            output: output.to_path_buf(),
            seconds: extra_sec,
            fps: video.format.fps,
        })
        .await?;

    Ok(NormalizedVideo {
        path: output.to_path_buf(),
        duration_sec: video.duration_sec + extra_sec,
        format: video.format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EncodingProfile;
    use crate::testing::RecordingTranscoder;
    use std::path::PathBuf;

    fn video() -> NormalizedVideo {
        NormalizedVideo {
            path: PathBuf::from("scene_2.mp4"),
            duration_sec: 4.0,
            format: EncodingProfile::default().canonical_format(30),
        }
    }

    #[tokio::test]
    async fn test_zero_or_negative_is_pass_through() {
        let transcoder = RecordingTranscoder::default();
        for extra in [0.0, -1.0, f64::NAN] {
            let out = extend_tail(&transcoder, video(), extra, Path::new("tail.mp4"))
                .await
                .unwrap();
            assert_eq!(out, video());
        }
        assert!(transcoder.requests().is_empty());
    }

    #[tokio::test]
    async fn test_positive_extends_duration() {
        let transcoder = RecordingTranscoder::default();
        let out = extend_tail(&transcoder, video(), 1.5, Path::new("tail.mp4"))
            .await
            .unwrap();
        assert_eq!(out.duration_sec, 5.5);
        assert_eq!(out.path, PathBuf::from("tail.mp4"));
        assert_eq!(out.format, video().format);
        assert_eq!(
            transcoder.requests(),
            vec![TranscodeRequest::HoldLastFrame {
                input: PathBuf::from("scene_2.mp4"),
                output: PathBuf::from("tail.mp4"),
                seconds: 1.5,
                fps: 30,
            }]
        );
    }
}
