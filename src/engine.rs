use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use crate::audio_segmenter::AudioSegmenter;
use crate::config::EngineConfig;
use crate::error::{RenderError, RenderResult};
use crate::job::{JobState, JobTracker, RenderJob, Scene};
use crate::probe::MediaProber;
use crate::profile::CanonicalFormat;
use crate::scene_muxer::{mux_scene, SceneSegment};
use crate::scene_normalizer::{NormalizeThresholds, SceneNormalizer};
use crate::tail_extender::extend_tail;
use crate::timeline::{pad_to_video, AudioWindow, ScriptTimeline};
use crate::timeline_assembler::{assemble, AssembledTimeline};
use crate::transcoder::MediaTranscoder;

/// 单个场景的调试信息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneReport {
    pub idx: usize,
    /// 脚本时间轴上的音频起点
    pub start_sec: f64,
    pub target_sec: f64,
    /// 从配音中实际切出的长度
    pub audio_cut_sec: f64,
    /// 规整（及尾部延长）后的视频长度
    pub video_final_sec: f64,
    pub note: String,
}

/// 已下载到工作目录的任务输入
#[derive(Debug, Clone)]
pub struct JobInputs {
    pub audio: PathBuf,
    pub videos: Vec<PathBuf>,
}

/// 渲染结果
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub timeline: AssembledTimeline,
    pub total_audio_sec: f64,
    pub scenes: Vec<SceneReport>,
}

/// 时间轴同步引擎
///
/// 每个场景的音频窗口在派发前就由目标时长的前缀和确定，
/// 因此场景可以并行处理，完成顺序不影响时间轴。
pub struct TimelineEngine {
    config: Arc<EngineConfig>,
    prober: Arc<dyn MediaProber>,
    transcoder: Arc<dyn MediaTranscoder>,
}

impl TimelineEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn MediaTranscoder>,
    ) -> Self {
        Self {
            config,
            prober,
            transcoder,
        }
    }

    /// 渲染一个任务，所有中间文件写入 `workspace`
    pub async fn render(
        &self,
        job: &RenderJob,
        inputs: &JobInputs,
        workspace: &Path,
        tracker: &mut JobTracker,
    ) -> RenderResult<RenderOutcome> {
        let scenes = job.scenes();
        if scenes.len() != inputs.videos.len() {
            return Err(RenderError::validation(format!(
                "场景数量 ({}) 与视频输入数量 ({}) 不一致",
                scenes.len(),
                inputs.videos.len()
            )));
        }

        let total_audio_sec = self.prober.duration(&inputs.audio).await?;
        let timeline = ScriptTimeline::new(&job.targets(), total_audio_sec, job.last_scene.audio);
        let format = self.config.profile.canonical_format(job.fps);

        info!(
            "🎼 [时间轴] 配音时长 {:.3}秒，脚本总时长 {:.3}秒，场景数 {}",
            total_audio_sec,
            job.targets().iter().sum::<f64>(),
            scenes.len()
        );

        tracker.transition(JobState::PerScene(0));

        let workers = Arc::new(Semaphore::new(self.config.scene_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (scene, source) in scenes.iter().zip(inputs.videos.iter()) {
            let window = timeline
                .window(scene.index)
                .ok_or_else(|| RenderError::validation(format!("场景 {} 缺少音频窗口", scene.index)))?;
            let task = SceneTask {
                prober: Arc::clone(&self.prober),
                transcoder: Arc::clone(&self.transcoder),
                thresholds: NormalizeThresholds {
                    tolerance_sec: self.config.tolerance_sec,
                    pad_threshold_sec: self.config.pad_threshold_sec,
                },
                format: format.clone(),
                scene: scene.clone(),
                source: source.clone(),
                audio: inputs.audio.clone(),
                total_audio_sec,
                window,
                keep_original: job.keep_original(scene),
                tail_sec: if scene.is_last { job.last_scene.tail_sec() } else { 0.0 },
                workspace: workspace.to_path_buf(),
            };
            let workers = Arc::clone(&workers);
            tasks.spawn(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|e| RenderError::Transcode(format!("场景队列已关闭: {}", e)))?;
                task.run().await
            });
        }

        let mut results: Vec<(SceneSegment, SceneReport)> = Vec::with_capacity(scenes.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(RenderError::Transcode(format!("场景任务异常退出: {}", e))),
            };
            match outcome {
                Ok(result) => {
                    results.push(result);
                    if results.len() < scenes.len() {
                        tracker.transition(JobState::PerScene(results.len()));
                    }
                }
                Err(e) => {
                    error!("❌ [时间轴] 场景处理失败，终止任务: {}", e);
                    tasks.shutdown().await;
                    return Err(e);
                }
            }
        }

        // 按脚本顺序拼接，与完成顺序无关
        results.sort_by_key(|(segment, _)| segment.index);
        let (segments, reports): (Vec<SceneSegment>, Vec<SceneReport>) = results.into_iter().unzip();

        tracker.transition(JobState::Assembling);
        let assemble_start = Instant::now();
        let assembled = assemble(
            self.transcoder.as_ref(),
            &segments,
            &workspace.join("concat.txt"),
            &workspace.join("final.mp4"),
        )
        .await?;
        info!(
            "✅ [时间轴] 拼接完成: {} 个片段，总时长 {:.3}秒，耗时: {:.2}秒",
            assembled.segment_count,
            assembled.duration_sec,
            assemble_start.elapsed().as_secs_f64()
        );

        Ok(RenderOutcome {
            timeline: assembled,
            total_audio_sec,
            scenes: reports,
        })
    }
}

/// 单个场景的独立任务，所有输入在派发前确定
struct SceneTask {
    prober: Arc<dyn MediaProber>,
    transcoder: Arc<dyn MediaTranscoder>,
    thresholds: NormalizeThresholds,
    format: CanonicalFormat,
    scene: Scene,
    source: PathBuf,
    audio: PathBuf,
    total_audio_sec: f64,
    window: AudioWindow,
    keep_original: bool,
    tail_sec: f64,
    workspace: PathBuf,
}

impl SceneTask {
    async fn run(self) -> RenderResult<(SceneSegment, SceneReport)> {
        let i = self.scene.index;
        let start = Instant::now();
        let transcoder = self.transcoder.as_ref();

        // 1. 探测素材时长
        let actual_sec = self.prober.duration(&self.source).await?;

        // 2. 规整到目标时长
        let normalizer = SceneNormalizer::new(transcoder, self.thresholds, self.format.clone());
        let (mut video, operation) = normalizer
            .normalize(
                &self.source,
                actual_sec,
                self.scene.target_sec,
                self.keep_original,
                &self.workspace.join(format!("scene_{:03}_norm.mp4", i)),
            )
            .await?;
        let mut notes = vec![operation.note()];

        // 3. 最后一个场景的尾部延长
        if self.scene.is_last && self.tail_sec > 0.0 {
            video = extend_tail(
                transcoder,
                video,
                self.tail_sec,
                &self.workspace.join(format!("scene_{:03}_tail.mp4", i)),
            )
            .await?;
            notes.push(format!("tail +{:.3}s", self.tail_sec));
        }

        // 4. 视频比可用配音长时补静音，保证画面切点不被截断
        let window = pad_to_video(
            self.window,
            video.duration_sec,
            self.total_audio_sec,
            self.thresholds.tolerance_sec,
        );
        if window.is_past_end(self.total_audio_sec) {
            notes.push("audio exhausted".to_string());
        }
        if let Some(pad_to) = window.pad_to_sec {
            notes.push(format!("audio padded to {:.3}s", pad_to));
        }

        // 5. 切分音频
        let segmenter = AudioSegmenter::new(transcoder, &self.audio, self.total_audio_sec);
        let audio = segmenter
            .segment(window, &self.workspace.join(format!("scene_{:03}_audio.m4a", i)))
            .await?;

        // 6. 合流
        let segment = mux_scene(
            transcoder,
            self.prober.as_ref(),
            i,
            &video,
            &audio,
            &self.workspace.join(format!("segment_{:03}.mp4", i)),
        )
        .await?;

        info!(
            "🎞️  [场景 {}] 素材 {:.3}秒 → 目标 {:.3}秒（{}），音频 [{:.3}, +{:.3})，片段 {:.3}秒，耗时: {:.2}秒",
            i,
            actual_sec,
            self.scene.target_sec,
            notes.join(", "),
            window.start_sec,
            audio.cut_sec,
            segment.duration_sec,
            start.elapsed().as_secs_f64()
        );

        let report = SceneReport {
            idx: i,
            start_sec: window.start_sec,
            target_sec: self.scene.target_sec,
            audio_cut_sec: audio.cut_sec,
            video_final_sec: video.duration_sec,
            note: notes.join(", "),
        };
        Ok((segment, report))
    }
}
