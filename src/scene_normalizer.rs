use serde::Serialize;
use std::path::{Path, PathBuf};
use crate::error::RenderResult;
use crate::profile::CanonicalFormat;
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 场景规整操作
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum VideoOperation {
    /// 只转成规范格式，时长不变
    KeepOriginal,
    /// 裁剪到目标时长
    Trim { target_sec: f64 },
    /// 冻结尾帧补齐 `pad_sec`，再裁剪到目标时长
    FreezePad { pad_sec: f64, target_sec: f64 },
    /// 无限循环素材，再裁剪到目标时长
    Loop { target_sec: f64 },
}

impl VideoOperation {
    pub fn target_sec(&self) -> Option<f64> {
        match self {
            VideoOperation::KeepOriginal => None,
            VideoOperation::Trim { target_sec }
            | VideoOperation::FreezePad { target_sec, .. }
            | VideoOperation::Loop { target_sec } => Some(*target_sec),
        }
    }

    /// 调试信息中的简短说明
    pub fn note(&self) -> String {
        match self {
            VideoOperation::KeepOriginal => "keep-original".to_string(),
            VideoOperation::Trim { .. } => "trim".to_string(),
            VideoOperation::FreezePad { pad_sec, .. } => format!("freeze-pad {:.3}s", pad_sec),
            VideoOperation::Loop { .. } => "loop".to_string(),
        }
    }
}

/// 比较阈值时吸收浮点误差（例如 4.0 - 3.97）
const FLOAT_SLACK: f64 = 1e-9;

/// 规整决策结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizePlan {
    pub operation: VideoOperation,
    /// 规整后的实际时长
    pub realized_sec: f64,
}

/// 规整决策的阈值
#[derive(Debug, Clone, Copy)]
pub struct NormalizeThresholds {
    /// 容差 τ
    pub tolerance_sec: f64,
    /// 小间隙阈值 P
    pub pad_threshold_sec: f64,
}

impl Default for NormalizeThresholds {
    fn default() -> Self {
        Self {
            tolerance_sec: 0.03,
            pad_threshold_sec: 0.5,
        }
    }
}

/// 根据素材时长和目标时长决定规整方式
///
/// 三个对齐分支的实际时长都等于目标时长；循环分支同样报告目标时长，
/// 而不是循环前的素材时长。
pub fn plan_normalization(
    actual_sec: f64,
    target_sec: f64,
    keep_original: bool,
    thresholds: NormalizeThresholds,
) -> NormalizePlan {
    if keep_original {
        return NormalizePlan {
            operation: VideoOperation::KeepOriginal,
            realized_sec: actual_sec,
        };
    }

    let gap = target_sec - actual_sec;
    let operation = if gap.abs() <= thresholds.tolerance_sec + FLOAT_SLACK || actual_sec > target_sec {
        VideoOperation::Trim { target_sec }
    } else if gap <= thresholds.pad_threshold_sec + FLOAT_SLACK {
        VideoOperation::FreezePad { pad_sec: gap, target_sec }
    } else {
        VideoOperation::Loop { target_sec }
    };

    NormalizePlan {
        operation,
        realized_sec: target_sec,
    }
}

/// 规整后的场景视频
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVideo {
    pub path: PathBuf,
    pub duration_sec: f64,
    pub format: CanonicalFormat,
}

/// 场景规整器
pub struct SceneNormalizer<'a> {
    transcoder: &'a dyn MediaTranscoder,
    thresholds: NormalizeThresholds,
    format: CanonicalFormat,
}

impl<'a> SceneNormalizer<'a> {
    pub fn new(
        transcoder: &'a dyn MediaTranscoder,
        thresholds: NormalizeThresholds,
        format: CanonicalFormat,
    ) -> Self {
        Self {
            transcoder,
            thresholds,
            format,
        }
    }

    /// 规整一个场景，返回规整结果和所用的操作
    pub async fn normalize(
        &self,
        source: &Path,
        actual_sec: f64,
        target_sec: f64,
        keep_original: bool,
        output: &Path,
    ) -> RenderResult<(NormalizedVideo, VideoOperation)> {
        let plan = plan_normalization(actual_sec, target_sec, keep_original, self.thresholds);

        self.transcoder
            .run(&TranscodeRequest::Normalize {
                input: source.to_path_buf(),
                output: output.to_path_buf(),
                operation: plan.operation,
                fps: self.format.fps,
            })
            .await?;

        Ok((
            NormalizedVideo {
                path: output.to_path_buf(),
                duration_sec: plan.realized_sec,
                format: self.format.clone(),
            },
            plan.operation,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EncodingProfile;
    use crate::testing::RecordingTranscoder;

    fn plan(actual: f64, target: f64) -> NormalizePlan {
        plan_normalization(actual, target, false, NormalizeThresholds::default())
    }

    #[test]
    fn test_within_tolerance_is_trim() {
        for actual in [3.97, 3.99, 4.0, 4.02, 4.03] {
            let p = plan(actual, 4.0);
            assert!(matches!(p.operation, VideoOperation::Trim { .. }), "actual={}", actual);
            assert_eq!(p.realized_sec, 4.0);
        }
    }

    #[test]
    fn test_longer_source_is_trim() {
        let p = plan(10.0, 4.0);
        assert_eq!(p.operation, VideoOperation::Trim { target_sec: 4.0 });
        assert_eq!(p.realized_sec, 4.0);
    }

    #[test]
    fn test_small_gap_is_freeze_pad() {
        let p = plan(3.6, 4.0);
        match p.operation {
            VideoOperation::FreezePad { pad_sec, target_sec } => {
                assert!((pad_sec - 0.4).abs() < 1e-9);
                assert_eq!(target_sec, 4.0);
            }
            other => panic!("期望 FreezePad，实际 {:?}", other),
        }
        assert_eq!(p.realized_sec, 4.0);

        // 恰好等于阈值仍然补帧
        assert!(matches!(plan(3.5, 4.0).operation, VideoOperation::FreezePad { .. }));
    }

    #[test]
    fn test_large_gap_is_loop_and_reports_target() {
        let p = plan(1.0, 4.0);
        assert_eq!(p.operation, VideoOperation::Loop { target_sec: 4.0 });
        assert_eq!(p.realized_sec, 4.0);
        assert!(matches!(plan(3.49, 4.0).operation, VideoOperation::Loop { .. }));
    }

    #[test]
    fn test_keep_original_reports_actual() {
        let p = plan_normalization(7.25, 4.0, true, NormalizeThresholds::default());
        assert_eq!(p.operation, VideoOperation::KeepOriginal);
        assert_eq!(p.realized_sec, 7.25);
    }

    #[test]
    fn test_notes() {
        assert_eq!(VideoOperation::Trim { target_sec: 1.0 }.note(), "trim");
        assert_eq!(
            VideoOperation::FreezePad { pad_sec: 1.0, target_sec: 4.0 }.note(),
            "freeze-pad 1.000s"
        );
    }

    #[tokio::test]
    async fn test_normalize_issues_single_request() {
        let transcoder = RecordingTranscoder::default();
        let format = EncodingProfile::default().canonical_format(30);
        let normalizer = SceneNormalizer::new(&transcoder, NormalizeThresholds::default(), format.clone());

        let (video, op) = normalizer
            .normalize(Path::new("v.mp4"), 1.0, 4.0, false, Path::new("n.mp4"))
            .await
            .unwrap();

        assert_eq!(op, VideoOperation::Loop { target_sec: 4.0 });
        assert_eq!(video.duration_sec, 4.0);
        assert_eq!(video.format, format);

        let requests = transcoder.requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(
            &requests[0],
            TranscodeRequest::Normalize { fps: 30, operation: VideoOperation::Loop { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_normalize_propagates_tool_failure() {
        let transcoder = RecordingTranscoder::failing_on("场景规整");
        let normalizer = SceneNormalizer::new(
            &transcoder,
            NormalizeThresholds::default(),
            EncodingProfile::default().canonical_format(30),
        );
        let err = normalizer
            .normalize(Path::new("v.mp4"), 4.0, 4.0, false, Path::new("n.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TranscodeError");
    }
}
