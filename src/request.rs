use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use crate::blob_store::BlobRef;
use crate::config::EngineConfig;
use crate::engine::SceneReport;
use crate::error::{RenderError, RenderResult};
use crate::job::{LastAudioMode, LastSceneMode, LastVideoMode, RenderJob, TailMode};

/// 渲染请求（HTTP 请求体 / CLI 请求文件）
///
/// 所有字段都是可选的，缺失项由 [`RenderRequest::validate`] 按字段报告。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub videos: Option<Vec<String>>,
    #[serde(default)]
    pub output: Option<String>,
    /// 每个场景的目标时长（秒）
    #[serde(default)]
    pub durations_sec: Option<Vec<f64>>,
    /// 旧版字段：目标时长（毫秒）
    #[serde(default)]
    pub durations_ms: Option<Vec<f64>>,
    #[serde(default)]
    pub fps: Option<i64>,
    #[serde(default)]
    pub tail_extra_sec: Option<f64>,
    #[serde(default)]
    pub last_scene_takes_rest_of_audio: bool,
    #[serde(default)]
    pub last_scene_keep_original: bool,
}

impl RenderRequest {
    /// 从 JSON 值解析；请求体本身是 JSON 字符串时先解开一层
    pub fn from_value(body: Value) -> RenderResult<Self> {
        let body = match body {
            Value::String(inner) => serde_json::from_str::<Value>(&inner)
                .map_err(|e| RenderError::validation(format!("请求体字符串不是合法 JSON: {}", e)))?,
            other => other,
        };
        if !body.is_object() {
            return Err(RenderError::validation("请求体必须是 JSON 对象"));
        }
        serde_json::from_value(body).map_err(|e| RenderError::validation(format!("请求字段格式错误: {}", e)))
    }

    pub fn from_slice(bytes: &[u8]) -> RenderResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| RenderError::validation(format!("请求体不是合法 JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// 声明的目标时长（秒），优先使用 `durationsSec`
    fn targets(&self) -> RenderResult<Vec<f64>> {
        if let Some(secs) = &self.durations_sec {
            return Ok(secs.clone());
        }
        if let Some(ms) = &self.durations_ms {
            return Ok(ms.iter().map(|v| v / 1000.0).collect());
        }
        Err(RenderError::validation("缺少 durationsSec（或 durationsMs）"))
    }

    /// 校验请求并构建渲染任务
    ///
    /// 只做本地检查，不访问存储也不调用任何媒体工具。
    pub fn validate(&self, config: &EngineConfig) -> RenderResult<RenderJob> {
        let audio = required_ref("audio", self.audio.as_deref())?;
        let output = required_ref("output", self.output.as_deref())?;

        let videos = match self.videos.as_deref() {
            Some(videos) if !videos.is_empty() => videos,
            _ => return Err(RenderError::validation("videos 不能为空")),
        };
        let sources = videos
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                BlobRef::parse(raw).map_err(|e| RenderError::validation(format!("videos[{}]: {}", i, e)))
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let targets = self.targets()?;
        if targets.len() != sources.len() {
            return Err(RenderError::validation(format!(
                "时长数量 ({}) 与视频数量 ({}) 不一致",
                targets.len(),
                sources.len()
            )));
        }
        if let Some((i, bad)) = targets
            .iter()
            .enumerate()
            .find(|(_, d)| !(d.is_finite() && **d > 0.0))
        {
            return Err(RenderError::validation(format!("第 {} 个时长无效: {}", i, bad)));
        }

        let fps = match self.fps {
            None => config.default_fps,
            Some(fps) if fps > 0 && fps <= u32::MAX as i64 => fps as u32,
            Some(fps) => return Err(RenderError::validation(format!("fps 必须大于 0: {}", fps))),
        };

        let tail = self.tail_sec(config.max_tail_sec)?;
        let last_scene = LastSceneMode {
            video: if self.last_scene_keep_original {
                LastVideoMode::KeepOriginal
            } else {
                LastVideoMode::TrimToTarget
            },
            tail: if tail > 0.0 { TailMode::TailExtend(tail) } else { TailMode::NoTail },
            audio: if self.last_scene_takes_rest_of_audio {
                LastAudioMode::TakeRestOfAudio
            } else {
                LastAudioMode::CapToTarget
            },
        };

        Ok(RenderJob::new(audio, sources, &targets, output, fps, last_scene))
    }

    /// 尾部延长秒数，超出 `[0, max]` 时截断并告警
    fn tail_sec(&self, max_tail_sec: f64) -> RenderResult<f64> {
        let Some(requested) = self.tail_extra_sec else {
            return Ok(0.0);
        };
        if !requested.is_finite() {
            return Err(RenderError::validation(format!("tailExtraSec 无效: {}", requested)));
        }
        let clamped = requested.clamp(0.0, max_tail_sec);
        if clamped != requested {
            warn!(
                "⚠️  [请求校验] tailExtraSec={} 超出范围 [0, {}]，已调整为 {}",
                requested, max_tail_sec, clamped
            );
        }
        Ok(clamped)
    }
}

fn required_ref(field: &str, raw: Option<&str>) -> RenderResult<BlobRef> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => {
            BlobRef::parse(raw).map_err(|e| RenderError::validation(format!("{}: {}", field, e)))
        }
        _ => Err(RenderError::validation(format!("缺少 {}", field))),
    }
}

/// 渲染响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<SceneReport>>,
    /// 错误分类名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RenderResponse {
    pub fn success(output: &BlobRef, scenes: Vec<SceneReport>) -> Self {
        Self {
            ok: true,
            output: Some(output.to_string()),
            video_count: Some(scenes.len()),
            debug: Some(scenes),
            error: None,
            detail: None,
        }
    }

    pub fn failure(err: &RenderError) -> Self {
        Self {
            ok: false,
            output: None,
            video_count: None,
            debug: None,
            error: Some(err.kind().to_string()),
            detail: Some(err.to_string()),
        }
    }
}
