use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};
use crate::blob_store::BlobRef;

/// 单个场景：一个素材片段 + 脚本时间轴给出的目标时长
#[derive(Debug, Clone)]
pub struct Scene {
    pub index: usize,
    pub source: BlobRef,
    /// 目标时长（秒）
    pub target_sec: f64,
    pub is_last: bool,
}

/// 最后一个场景的视频时长策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LastVideoMode {
    /// 仅转成规范格式，保持素材原始时长
    KeepOriginal,
    /// 与其它场景一样对齐到目标时长
    TrimToTarget,
}

/// 最后一个场景的尾部延长策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TailMode {
    NoTail,
    /// 冻结尾帧延长指定秒数
    TailExtend(f64),
}

/// 最后一个场景的音频窗口策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LastAudioMode {
    /// 音频窗口长度等于目标时长
    CapToTarget,
    /// 音频窗口取到配音结尾
    TakeRestOfAudio,
}

/// 最后一个场景的组合策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LastSceneMode {
    pub video: LastVideoMode,
    pub tail: TailMode,
    pub audio: LastAudioMode,
}

impl Default for LastSceneMode {
    fn default() -> Self {
        Self {
            video: LastVideoMode::TrimToTarget,
            tail: TailMode::NoTail,
            audio: LastAudioMode::CapToTarget,
        }
    }
}

impl LastSceneMode {
    pub fn tail_sec(&self) -> f64 {
        match self.tail {
            TailMode::NoTail => 0.0,
            TailMode::TailExtend(sec) => sec.max(0.0),
        }
    }
}

/// 一次渲染请求对应的任务，场景列表构建后不可变
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: String,
    pub audio: BlobRef,
    scenes: Vec<Scene>,
    pub output: BlobRef,
    /// 规范帧率
    pub fps: u32,
    pub last_scene: LastSceneMode,
}

impl RenderJob {
    pub fn new(
        audio: BlobRef,
        sources: Vec<BlobRef>,
        targets: &[f64],
        output: BlobRef,
        fps: u32,
        last_scene: LastSceneMode,
    ) -> Self {
        let count = sources.len();
        let scenes = sources
            .into_iter()
            .zip(targets.iter().copied())
            .enumerate()
            .map(|(index, (source, target_sec))| Scene {
                index,
                source,
                target_sec,
                is_last: index + 1 == count,
            })
            .collect();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audio,
            scenes,
            output,
            fps,
            last_scene,
        }
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn targets(&self) -> Vec<f64> {
        self.scenes.iter().map(|s| s.target_sec).collect()
    }

    /// 是否要求最后一个场景保持原始时长
    pub fn keep_original(&self, scene: &Scene) -> bool {
        scene.is_last && self.last_scene.video == LastVideoMode::KeepOriginal
    }
}

/// 渲染任务状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Downloading,
    PerScene(usize),
    Assembling,
    Uploading,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// 判断状态转换是否合法；任何非终态都可以直接进入 Failed
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Downloading) => true,
            (Downloading, PerScene(0)) => true,
            (PerScene(i), PerScene(j)) => j == i + 1,
            (PerScene(_), Assembling) => true,
            (Assembling, Uploading) => true,
            (Uploading, Completed) => true,
            _ => false,
        }
    }
}

/// 记录任务状态变化与耗时
#[derive(Debug)]
pub struct JobTracker {
    job_id: String,
    state: JobState,
    started: Instant,
}

impl JobTracker {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// 执行状态转换，非法转换返回 false 且保持原状态
    pub fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                "⚠️  [渲染任务] {} 非法状态转换: {:?} -> {:?}",
                self.job_id, self.state, next
            );
            return false;
        }
        info!(
            "🔄 [渲染任务] {} 状态: {:?} -> {:?}（已耗时 {:.2}秒）",
            self.job_id,
            self.state,
            next,
            self.started.elapsed().as_secs_f64()
        );
        self.state = next;
        true
    }

    pub fn fail(&mut self) {
        self.transition(JobState::Failed);
    }
}
