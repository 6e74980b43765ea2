use std::path::{Path, PathBuf};
use crate::error::{RenderError, RenderResult};
use crate::scene_muxer::SceneSegment;
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 拼接后的成片
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTimeline {
    pub path: PathBuf,
    pub duration_sec: f64,
    pub segment_count: usize,
}

/// 检查所有片段共享同一规范格式
///
/// 格式不一致说明场景规整环节出了问题，这里直接报错，不会退回到重新编码。
pub fn check_homogeneous(segments: &[SceneSegment]) -> RenderResult<()> {
    let Some(first) = segments.first() else {
        return Err(RenderError::Concat("没有可拼接的场景片段".to_string()));
    };
    for segment in &segments[1..] {
        if segment.format != first.format {
            return Err(RenderError::Concat(format!(
                "场景 {} 的编码格式 ({}) 与场景 {} ({}) 不一致",
                segment.index, segment.format, first.index, first.format
            )));
        }
    }
    Ok(())
}

/// concat 列表文件内容
pub fn concat_list(segments: &[SceneSegment]) -> String {
    segments
        .iter()
        .map(|s| {
            let path = s.path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", path)
        })
        .collect()
}

/// 按脚本顺序流复制拼接所有场景片段
pub async fn assemble(
    transcoder: &dyn MediaTranscoder,
    segments: &[SceneSegment],
    list_file: &Path,
    output: &Path,
) -> RenderResult<AssembledTimeline> {
    check_homogeneous(segments)?;

    tokio::fs::write(list_file, concat_list(segments)).await?;

    transcoder
        .run(&TranscodeRequest::Concat {
            list_file: list_file.to_path_buf(),
            output: output.to_path_buf(),
        })
        .await?;

    Ok(AssembledTimeline {
        path: output.to_path_buf(),
        duration_sec: segments.iter().map(|s| s.duration_sec).sum(),
        segment_count: segments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EncodingProfile;
    use crate::testing::RecordingTranscoder;

    fn segment(index: usize, duration_sec: f64, fps: u32) -> SceneSegment {
        SceneSegment {
            index,
            path: PathBuf::from(format!("/work/segment_{}.mp4", index)),
            duration_sec,
            format: EncodingProfile::default().canonical_format(fps),
        }
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let mut s = segment(0, 1.0, 30);
        s.path = PathBuf::from("/work/it's.mp4");
        assert_eq!(concat_list(&[s]), "file '/work/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_divergent_format_is_concat_error() {
        let segments = vec![segment(0, 4.0, 30), segment(1, 4.0, 25)];
        let err = check_homogeneous(&segments).unwrap_err();
        assert_eq!(err.kind(), "ConcatError");
        assert!(check_homogeneous(&[]).is_err());
    }

    #[tokio::test]
    async fn test_duration_is_sum_of_segments() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = RecordingTranscoder::default();
        let segments: Vec<SceneSegment> = [4.0, 3.5, 2.25, 5.0]
            .iter()
            .enumerate()
            .map(|(i, &d)| segment(i, d, 30))
            .collect();

        let list_file = dir.path().join("concat.txt");
        let assembled = assemble(&transcoder, &segments, &list_file, &dir.path().join("final.mp4"))
            .await
            .unwrap();

        assert_eq!(assembled.duration_sec, 14.75);
        assert_eq!(assembled.segment_count, 4);
        let list = std::fs::read_to_string(&list_file).unwrap();
        assert_eq!(list.lines().count(), 4);
        assert!(list.lines().next().unwrap().contains("segment_0.mp4"));
        assert_eq!(transcoder.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_divergent_segments_never_reach_transcoder() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = RecordingTranscoder::default();
        let segments = vec![segment(0, 4.0, 30), segment(1, 4.0, 60)];
        let result = assemble(
            &transcoder,
            &segments,
            &dir.path().join("concat.txt"),
            &dir.path().join("final.mp4"),
        )
        .await;
        assert!(result.is_err());
        assert!(transcoder.requests().is_empty());
    }
}
