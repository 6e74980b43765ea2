use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{error, info, warn};
use crate::blob_store::{BlobRef, BlobStore, RoutingBlobStore};
use crate::config::ServiceConfig;
use crate::engine::{JobInputs, SceneReport, TimelineEngine};
use crate::error::RenderResult;
use crate::job::{JobState, JobTracker, RenderJob};
use crate::probe::{FfmpegProber, MediaProber};
use crate::request::RenderRequest;
use crate::transcoder::{FfmpegTranscoder, MediaTranscoder};

/// 一次成功渲染的汇总
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub job_id: String,
    pub output: BlobRef,
    pub video_count: usize,
    pub duration_sec: f64,
    pub scenes: Vec<SceneReport>,
}

/// 渲染服务：请求校验 → 下载 → 时间轴引擎 → 上传 → 回调
pub struct RenderService {
    config: Arc<ServiceConfig>,
    engine: TimelineEngine,
    store: Arc<dyn BlobStore>,
}

impl RenderService {
    pub fn new(
        config: ServiceConfig,
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn MediaTranscoder>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let engine = TimelineEngine::new(Arc::new(config.engine.clone()), prober, transcoder);
        Self {
            config: Arc::new(config),
            engine,
            store,
        }
    }

    /// 使用 FFmpeg 与 HTTP/本地存储构建生产环境服务
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let prober = FfmpegProber::new().context("初始化 FFmpeg 失败")?;
        let transcoder = FfmpegTranscoder::new(
            config.engine.ffmpeg_path.clone(),
            config.engine.profile.clone(),
            config.engine.max_parallel_transcodes,
        );
        let store = RoutingBlobStore::new(config.oss_endpoint.clone()).context("创建存储客户端失败")?;
        Ok(Self::new(config, Arc::new(prober), Arc::new(transcoder), Arc::new(store)))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// 处理原始 JSON 请求体（支持字符串化的 JSON）
    pub async fn render_value(&self, body: Value) -> RenderResult<RenderSummary> {
        let request = RenderRequest::from_value(body)?;
        self.render(&request).await
    }

    /// 执行一次渲染；校验失败时不会产生任何外部调用
    pub async fn render(&self, request: &RenderRequest) -> RenderResult<RenderSummary> {
        let job = request.validate(&self.config.engine).map_err(|e| {
            warn!("⚠️  [请求校验] {}", e);
            e
        })?;

        let total_start = Instant::now();
        info!("🎬 [渲染任务] 开始任务 {}: {} 个场景 → {}", job.id, job.scenes().len(), job.output);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let mut tracker = JobTracker::new(&job.id);
        let workspace = self.create_workspace()?;

        let result = self.run_job(&job, workspace.path(), &mut tracker).await;

        if self.config.keep_workspace {
            let kept = workspace.keep();
            info!("📁 [渲染任务] 已保留工作目录: {}", kept.display());
        }

        match result {
            Ok(summary) => {
                info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                info!(
                    "🎉 [渲染任务] 任务 {} 完成！成片 {:.3}秒，总耗时: {:.2}秒",
                    job.id,
                    summary.duration_sec,
                    total_start.elapsed().as_secs_f64()
                );
                info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                if let Some(url) = &self.config.webhook_url {
                    info!("⏳ [渲染任务] 正在调用 Webhook 回调...");
                    match call_webhook(url, &summary).await {
                        Ok(()) => info!("✅ [渲染任务] Webhook 回调成功"),
                        Err(e) => warn!("⚠️  [渲染任务] Webhook 回调失败: {:#}", e),
                    }
                }
                Ok(summary)
            }
            Err(e) => {
                tracker.fail();
                error!("❌ [渲染任务] 任务 {} 失败（{}）: {}", job.id, e.kind(), e);
                Err(e)
            }
        }
    }

    fn create_workspace(&self) -> RenderResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("shorts-render-");
        let dir = match &self.config.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        info!("📁 [渲染任务] 工作目录: {}", dir.path().display());
        Ok(dir)
    }

    async fn run_job(
        &self,
        job: &RenderJob,
        workspace: &Path,
        tracker: &mut JobTracker,
    ) -> RenderResult<RenderSummary> {
        // 1. 下载输入
        tracker.transition(JobState::Downloading);
        let download_start = Instant::now();
        let inputs = self.download_inputs(job, workspace).await?;
        let download_duration = download_start.elapsed();
        info!(
            "✅ [存储] 下载完成: {} 个文件，耗时: {:.2}秒",
            inputs.videos.len() + 1,
            download_duration.as_secs_f64()
        );

        // 2. 时间轴同步
        let render_start = Instant::now();
        let outcome = self.engine.render(job, &inputs, workspace, tracker).await?;
        let render_duration = render_start.elapsed();

        // 3. 上传成片
        tracker.transition(JobState::Uploading);
        let upload_start = Instant::now();
        self.store.upload(&outcome.timeline.path, &job.output).await?;
        let upload_duration = upload_start.elapsed();
        tracker.transition(JobState::Completed);

        let total = download_duration + render_duration + upload_duration;
        let percent = |d: std::time::Duration| d.as_secs_f64() / total.as_secs_f64().max(f64::EPSILON) * 100.0;
        info!("📊 [渲染任务] 性能统计:");
        info!(
            "   • 下载: {:.2}秒 ({:.1}%)",
            download_duration.as_secs_f64(),
            percent(download_duration)
        );
        info!(
            "   • 场景处理与拼接: {:.2}秒 ({:.1}%)",
            render_duration.as_secs_f64(),
            percent(render_duration)
        );
        info!(
            "   • 上传: {:.2}秒 ({:.1}%)",
            upload_duration.as_secs_f64(),
            percent(upload_duration)
        );
        info!(
            "🎵 [渲染任务] 配音 {:.3}秒，成片 {:.3}秒",
            outcome.total_audio_sec, outcome.timeline.duration_sec
        );

        Ok(RenderSummary {
            job_id: job.id.clone(),
            output: job.output.clone(),
            video_count: outcome.scenes.len(),
            duration_sec: outcome.timeline.duration_sec,
            scenes: outcome.scenes,
        })
    }

    async fn download_inputs(&self, job: &RenderJob, workspace: &Path) -> RenderResult<JobInputs> {
        let audio_name = format!("audio.{}", job.audio.extension().unwrap_or_else(|| "mp3".to_string()));
        let audio = self.store.download(&job.audio, &workspace.join(audio_name)).await?;

        let mut videos: Vec<PathBuf> = Vec::with_capacity(job.scenes().len());
        for scene in job.scenes() {
            let name = format!(
                "video_{}.{}",
                scene.index,
                scene.source.extension().unwrap_or_else(|| "mp4".to_string())
            );
            videos.push(self.store.download(&scene.source, &workspace.join(name)).await?);
        }

        Ok(JobInputs { audio, videos })
    }
}

/// Webhook 回调数据结构
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    status: String,
    output: String,
    video_count: usize,
    duration_sec: f64,
    /// 回调时间戳（RFC 3339）
    timestamp: String,
}

/// 调用 webhook 回调
async fn call_webhook(webhook_url: &str, summary: &RenderSummary) -> Result<()> {
    use chrono::Utc;

    let payload = WebhookPayload {
        status: "success".to_string(),
        output: summary.output.to_string(),
        video_count: summary.video_count,
        duration_sec: summary.duration_sec,
        timestamp: Utc::now().to_rfc3339(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(webhook_url)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .context("Webhook 请求失败")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!("Webhook 回调返回错误状态: {} - {}", status, error_text);
        anyhow::bail!("Webhook 返回错误状态: {}", status);
    }

    Ok(())
}
