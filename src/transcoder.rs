use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::Semaphore;
use crate::error::{RenderError, RenderResult};
use crate::profile::EncodingProfile;
use crate::scene_muxer::DurationPolicy;
use crate::scene_normalizer::VideoOperation;

/// 音频耗尽时生成静音片段所用的最小时长（秒）
pub const AUDIO_EPSILON_SEC: f64 = 0.001;

/// 发给转码工具的参数化请求
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeRequest {
    /// 规整场景视频：缩放黑边、统一帧率、去掉音频，并按操作对齐时长
    Normalize {
        input: PathBuf,
        output: PathBuf,
        operation: VideoOperation,
        fps: u32,
    },
    /// 冻结最后一帧延长视频
    HoldLastFrame {
        input: PathBuf,
        output: PathBuf,
        seconds: f64,
        fps: u32,
    },
    /// 从共享音轨切出窗口，可选补静音
    CutAudio {
        input: PathBuf,
        output: PathBuf,
        start_sec: f64,
        duration_sec: f64,
        pad_to_sec: Option<f64>,
        /// 窗口起点已超过音轨结尾，直接生成静音
        silent: bool,
    },
    /// 合并一段视频和一段音频
    Mux {
        video: PathBuf,
        audio: PathBuf,
        output: PathBuf,
        policy: DurationPolicy,
    },
    /// 按列表文件流复制拼接
    Concat {
        list_file: PathBuf,
        output: PathBuf,
    },
}

impl TranscodeRequest {
    /// 日志中使用的阶段名
    pub fn stage(&self) -> &'static str {
        match self {
            TranscodeRequest::Normalize { .. } => "场景规整",
            TranscodeRequest::HoldLastFrame { .. } => "尾部延长",
            TranscodeRequest::CutAudio { .. } => "音频切分",
            TranscodeRequest::Mux { .. } => "音视频合流",
            TranscodeRequest::Concat { .. } => "片段拼接",
        }
    }

    pub fn output(&self) -> &PathBuf {
        match self {
            TranscodeRequest::Normalize { output, .. }
            | TranscodeRequest::HoldLastFrame { output, .. }
            | TranscodeRequest::CutAudio { output, .. }
            | TranscodeRequest::Mux { output, .. }
            | TranscodeRequest::Concat { output, .. } => output,
        }
    }

    /// 工具失败时对应的错误类型
    fn failure(&self, detail: String) -> RenderError {
        match self {
            TranscodeRequest::Mux { .. } => RenderError::Mux(detail),
            TranscodeRequest::Concat { .. } => RenderError::Concat(detail),
            _ => RenderError::Transcode(detail),
        }
    }
}

/// 媒体转码接口
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    async fn run(&self, request: &TranscodeRequest) -> RenderResult<()>;
}

/// 基于 ffmpeg 命令行的转码器
///
/// 子进程异步等待，并由全进程共享的信号量限制并发数。
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    profile: EncodingProfile,
    permits: Arc<Semaphore>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, profile: EncodingProfile, max_parallel: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            profile,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// 把请求转换成 ffmpeg 参数
    pub fn build_args(&self, request: &TranscodeRequest) -> Vec<OsString> {
        let p = &self.profile;
        let mut args = ArgList::new();
        args.push_all(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]);

        match request {
            TranscodeRequest::Normalize { input, output, operation, fps } => {
                if matches!(operation, VideoOperation::Loop { .. }) {
                    args.push_all(["-stream_loop", "-1"]);
                }
                args.push("-i");
                args.push(input);

                let mut filter = p.frame_filter(*fps);
                if let VideoOperation::FreezePad { pad_sec, .. } = operation {
                    filter.push_str(&format!(",tpad=stop_mode=clone:stop_duration={}", secs(*pad_sec)));
                }
                args.push("-vf");
                args.push(filter);
                args.push("-an");
                self.push_video_codec(&mut args, *fps);
                if let Some(target) = operation.target_sec() {
                    args.push("-t");
                    args.push(secs(target));
                }
                args.push(output);
            }
            TranscodeRequest::HoldLastFrame { input, output, seconds, fps } => {
                args.push("-i");
                args.push(input);
                args.push("-vf");
                args.push(format!("tpad=stop_mode=clone:stop_duration={}", secs(*seconds)));
                args.push("-an");
                self.push_video_codec(&mut args, *fps);
                args.push(output);
            }
            TranscodeRequest::CutAudio { input, output, start_sec, duration_sec, pad_to_sec, silent } => {
                if *silent {
                    let length = pad_to_sec.unwrap_or(AUDIO_EPSILON_SEC).max(AUDIO_EPSILON_SEC);
                    args.push_all(["-f", "lavfi", "-i"]);
                    args.push(format!(
                        "anullsrc=r={}:cl={}",
                        p.audio_sample_rate,
                        channel_layout(p.audio_channels)
                    ));
                    args.push("-t");
                    args.push(secs(length));
                } else {
                    args.push("-ss");
                    args.push(secs(*start_sec));
                    args.push("-t");
                    args.push(secs(duration_sec.max(AUDIO_EPSILON_SEC)));
                    args.push("-i");
                    args.push(input);
                    if let Some(pad_to) = pad_to_sec {
                        args.push("-af");
                        args.push(format!("apad=whole_dur={}", secs(*pad_to)));
                        args.push("-t");
                        args.push(secs(*pad_to));
                    }
                }
                args.push("-vn");
                self.push_audio_codec(&mut args);
                args.push(output);
            }
            TranscodeRequest::Mux { video, audio, output, policy } => {
                args.push("-i");
                args.push(video);
                args.push("-i");
                args.push(audio);
                args.push_all(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy"]);
                self.push_audio_codec(&mut args);
                if *policy == DurationPolicy::Shortest {
                    args.push("-shortest");
                }
                args.push_all(["-movflags", "+faststart"]);
                args.push(output);
            }
            TranscodeRequest::Concat { list_file, output } => {
                args.push_all(["-f", "concat", "-safe", "0", "-i"]);
                args.push(list_file);
                args.push_all(["-c", "copy", "-movflags", "+faststart"]);
                args.push(output);
            }
        }

        args.into_inner()
    }

    fn push_video_codec(&self, args: &mut ArgList, fps: u32) {
        let p = &self.profile;
        args.push("-c:v");
        args.push(&p.video_codec);
        args.push("-preset");
        args.push(&p.preset);
        args.push("-crf");
        args.push(p.crf.to_string());
        args.push("-pix_fmt");
        args.push(&p.pixel_format);
        args.push("-r");
        args.push(fps.to_string());
        // 统一时间基，保证流复制拼接时时间戳连续
        args.push_all(["-video_track_timescale", "90000"]);
    }

    fn push_audio_codec(&self, args: &mut ArgList) {
        let p = &self.profile;
        args.push("-c:a");
        args.push(&p.audio_codec);
        args.push("-b:a");
        args.push(&p.audio_bitrate);
        args.push("-ar");
        args.push(p.audio_sample_rate.to_string());
        args.push("-ac");
        args.push(p.audio_channels.to_string());
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn run(&self, request: &TranscodeRequest) -> RenderResult<()> {
        let args = self.build_args(request);
        let stage = request.stage();

        // 许可一直持有到子进程退出；任务被取消时子进程随 future 一起被杀掉
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| request.failure(format!("{}: 转码队列已关闭: {}", stage, e)))?;

        let start = Instant::now();
        tracing::debug!("⚙️  [{}] {} {:?}", stage, self.ffmpeg_path, args);

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| request.failure(format!("{}: 执行 ffmpeg 命令失败: {}", stage, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(request.failure(format!(
                "{}: ffmpeg 退出码 {:?}: {}",
                stage,
                output.status.code(),
                stderr_tail(&stderr)
            )));
        }

        tracing::debug!(
            "✅ [{}] 完成: {}，耗时: {:.2}秒",
            stage,
            request.output().display(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// 参数列表
struct ArgList(Vec<OsString>);

impl ArgList {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn push(&mut self, arg: impl Into<OsString>) {
        self.0.push(arg.into());
    }

    fn push_all<const N: usize>(&mut self, args: [&str; N]) {
        self.0.extend(args.iter().map(OsString::from));
    }

    fn into_inner(self) -> Vec<OsString> {
        self.0
    }
}

/// 毫秒精度的秒数
fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

fn channel_layout(channels: u8) -> &'static str {
    match channels {
        1 => "mono",
        _ => "stereo",
    }
}

/// 只保留 stderr 的最后几行
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(12);
    lines[start..].join("\n")
}
