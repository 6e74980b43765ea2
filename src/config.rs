use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::profile::EncodingProfile;

/// 渲染引擎配置（构造一次后只读，显式传入引擎）
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 规范编码参数
    pub profile: EncodingProfile,
    /// 请求未指定 fps 时使用的帧率
    pub default_fps: u32,
    /// 时长容差（秒），差值在此范围内直接裁剪
    pub tolerance_sec: f64,
    /// 小间隙阈值（秒），不超过该值用冻结尾帧补齐，超过则循环
    pub pad_threshold_sec: f64,
    /// 尾部延长上限（秒）
    pub max_tail_sec: f64,
    /// 单个任务内并行处理的场景数
    pub scene_workers: usize,
    /// 全进程并行转码调用上限
    pub max_parallel_transcodes: usize,
    /// ffmpeg 可执行文件路径
    pub ffmpeg_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: EncodingProfile::default(),
            default_fps: 30,
            tolerance_sec: 0.03,
            pad_threshold_sec: 0.5,
            max_tail_sec: 2.0,
            scene_workers: 4,
            max_parallel_transcodes: default_parallelism(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl EngineConfig {
    /// 检查配置是否自洽
    pub fn validate(&self) -> Result<()> {
        if self.profile.width == 0 || self.profile.height == 0 {
            anyhow::bail!("画布尺寸必须大于 0");
        }
        if self.profile.width % 2 != 0 || self.profile.height % 2 != 0 {
            anyhow::bail!(
                "画布尺寸必须为偶数（{} 需要偶数宽高）: {}x{}",
                self.profile.pixel_format,
                self.profile.width,
                self.profile.height
            );
        }
        if self.default_fps == 0 {
            anyhow::bail!("默认帧率必须大于 0");
        }
        if !(self.tolerance_sec >= 0.0) || !(self.pad_threshold_sec > self.tolerance_sec) {
            anyhow::bail!(
                "容差与补帧阈值无效: tolerance={}, pad_threshold={}",
                self.tolerance_sec,
                self.pad_threshold_sec
            );
        }
        if !(self.max_tail_sec >= 0.0) {
            anyhow::bail!("尾部延长上限不能为负: {}", self.max_tail_sec);
        }
        if self.scene_workers == 0 || self.max_parallel_transcodes == 0 {
            anyhow::bail!("并发数必须至少为 1");
        }
        Ok(())
    }
}

/// 服务配置（引擎配置 + 存储、通知、日志）
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    /// 任务工作目录的根目录（未设置时使用系统临时目录）
    pub work_root: Option<PathBuf>,
    /// 保留任务工作目录，用于排查问题
    pub keep_workspace: bool,
    /// `oss://` 引用使用的 endpoint
    pub oss_endpoint: String,
    /// 渲染完成后的回调地址
    pub webhook_url: Option<String>,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            work_root: None,
            keep_workspace: false,
            oss_endpoint: "oss-cn-hangzhou.aliyuncs.com".to_string(),
            webhook_url: None,
            log_level: "info".to_string(),
        }
    }
}

/// 命令行覆盖项（优先级最高）
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub fps: Option<u32>,
    pub scene_workers: Option<usize>,
    pub max_parallel_transcodes: Option<usize>,
    pub work_root: Option<PathBuf>,
    pub webhook_url: Option<String>,
}

/// 单一来源读到的配置项，未出现的字段为 None
#[derive(Debug, Clone, Default)]
struct PartialConfig {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    tolerance_sec: Option<f64>,
    pad_threshold_sec: Option<f64>,
    max_tail_sec: Option<f64>,
    preset: Option<String>,
    crf: Option<u8>,
    audio_bitrate: Option<String>,
    audio_sample_rate: Option<u32>,
    scene_workers: Option<usize>,
    max_parallel_transcodes: Option<usize>,
    ffmpeg_path: Option<String>,
    work_root: Option<PathBuf>,
    keep_workspace: Option<bool>,
    oss_endpoint: Option<String>,
    webhook_url: Option<String>,
    log_level: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

const CONFIG_FILE_NAME: &str = "shorts-render.ini";
const HIDDEN_CONFIG_FILE_NAME: &str = ".shorts-render.ini";

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<ServiceConfig> {
        let file_config = match config_file {
            // 显式指定的配置文件必须可读
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };
        let env_config = Self::load_from_env_with(|key| env::var(key).ok());

        let config = Self::merge(overrides, env_config, file_config);
        config.engine.validate().context("配置校验失败")?;
        Ok(config)
    }

    fn merge(cli: ConfigOverrides, env: PartialConfig, file: PartialConfig) -> ServiceConfig {
        let defaults = ServiceConfig::default();
        let d = &defaults.engine;

        let profile = EncodingProfile {
            width: env.width.or(file.width).unwrap_or(d.profile.width),
            height: env.height.or(file.height).unwrap_or(d.profile.height),
            preset: env.preset.or(file.preset).unwrap_or_else(|| d.profile.preset.clone()),
            crf: env.crf.or(file.crf).unwrap_or(d.profile.crf),
            audio_bitrate: env
                .audio_bitrate
                .or(file.audio_bitrate)
                .unwrap_or_else(|| d.profile.audio_bitrate.clone()),
            audio_sample_rate: env
                .audio_sample_rate
                .or(file.audio_sample_rate)
                .unwrap_or(d.profile.audio_sample_rate),
            ..d.profile.clone()
        };

        let engine = EngineConfig {
            profile,
            default_fps: cli.fps.or(env.fps).or(file.fps).unwrap_or(d.default_fps),
            tolerance_sec: env.tolerance_sec.or(file.tolerance_sec).unwrap_or(d.tolerance_sec),
            pad_threshold_sec: env
                .pad_threshold_sec
                .or(file.pad_threshold_sec)
                .unwrap_or(d.pad_threshold_sec),
            max_tail_sec: env.max_tail_sec.or(file.max_tail_sec).unwrap_or(d.max_tail_sec),
            scene_workers: cli
                .scene_workers
                .or(env.scene_workers)
                .or(file.scene_workers)
                .unwrap_or(d.scene_workers),
            max_parallel_transcodes: cli
                .max_parallel_transcodes
                .or(env.max_parallel_transcodes)
                .or(file.max_parallel_transcodes)
                .unwrap_or(d.max_parallel_transcodes),
            ffmpeg_path: env
                .ffmpeg_path
                .or(file.ffmpeg_path)
                .unwrap_or_else(|| d.ffmpeg_path.clone()),
        };

        ServiceConfig {
            engine,
            work_root: cli.work_root.or(env.work_root).or(file.work_root),
            keep_workspace: env.keep_workspace.or(file.keep_workspace).unwrap_or(false),
            oss_endpoint: env
                .oss_endpoint
                .or(file.oss_endpoint)
                .unwrap_or(defaults.oss_endpoint),
            webhook_url: cli.webhook_url.or(env.webhook_url).or(file.webhook_url),
            log_level: env.log_level.or(file.log_level).unwrap_or(defaults.log_level),
        }
    }

    /// 从环境变量加载配置
    fn load_from_env_with(lookup: impl Fn(&str) -> Option<String>) -> PartialConfig {
        let text = |key: &str| lookup(key).filter(|v| !v.is_empty());

        PartialConfig {
            width: parse_env(&lookup, "SHORTS_RENDER_WIDTH"),
            height: parse_env(&lookup, "SHORTS_RENDER_HEIGHT"),
            fps: parse_env(&lookup, "SHORTS_RENDER_FPS"),
            tolerance_sec: parse_env(&lookup, "SHORTS_RENDER_TOLERANCE"),
            pad_threshold_sec: parse_env(&lookup, "SHORTS_RENDER_PAD_THRESHOLD"),
            max_tail_sec: parse_env(&lookup, "SHORTS_RENDER_MAX_TAIL"),
            preset: text("SHORTS_RENDER_PRESET"),
            crf: parse_env(&lookup, "SHORTS_RENDER_CRF"),
            audio_bitrate: text("SHORTS_RENDER_AUDIO_BITRATE"),
            audio_sample_rate: parse_env(&lookup, "SHORTS_RENDER_AUDIO_SAMPLE_RATE"),
            scene_workers: parse_env(&lookup, "SHORTS_RENDER_SCENE_WORKERS"),
            max_parallel_transcodes: parse_env(&lookup, "SHORTS_RENDER_MAX_TRANSCODES"),
            ffmpeg_path: text("SHORTS_RENDER_FFMPEG"),
            work_root: text("SHORTS_RENDER_WORK_ROOT").map(PathBuf::from),
            keep_workspace: lookup("SHORTS_RENDER_KEEP_WORKSPACE").map(|v| parse_bool(&v)),
            oss_endpoint: text("OSS_ENDPOINT"),
            webhook_url: text("SHORTS_RENDER_WEBHOOK_URL"),
            log_level: text("LOG_LEVEL"),
        }
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut parser = configparser::ini::Ini::new();
        parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(Self::partial_from_ini(&parser))
    }

    fn partial_from_ini(parser: &configparser::ini::Ini) -> PartialConfig {
        // 先读指定节，没有则回退到 [DEFAULT]
        let get = |section: &str, key: &str| {
            parser
                .get(section, key)
                .or_else(|| parser.get("DEFAULT", key))
                .filter(|v| !v.is_empty())
        };
        let parse_f64 = |section: &str, key: &str| get(section, key).and_then(|v| v.parse::<f64>().ok());

        PartialConfig {
            width: get("render", "width").and_then(|v| v.parse().ok()),
            height: get("render", "height").and_then(|v| v.parse().ok()),
            fps: get("render", "fps").and_then(|v| v.parse().ok()),
            tolerance_sec: parse_f64("render", "tolerance_sec"),
            pad_threshold_sec: parse_f64("render", "pad_threshold_sec"),
            max_tail_sec: parse_f64("render", "max_tail_sec"),
            preset: get("render", "preset"),
            crf: get("render", "crf").and_then(|v| v.parse().ok()),
            audio_bitrate: get("render", "audio_bitrate"),
            audio_sample_rate: get("render", "audio_sample_rate").and_then(|v| v.parse().ok()),
            scene_workers: get("render", "scene_workers").and_then(|v| v.parse().ok()),
            max_parallel_transcodes: get("render", "max_parallel_transcodes")
                .and_then(|v| v.parse().ok()),
            ffmpeg_path: get("render", "ffmpeg_path"),
            work_root: get("storage", "work_root").map(PathBuf::from),
            keep_workspace: get("storage", "keep_workspace").map(|v| parse_bool(&v)),
            oss_endpoint: get("storage", "oss_endpoint"),
            webhook_url: get("notify", "webhook_url"),
            log_level: get("logging", "level"),
        }
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<PartialConfig> {
        let mut candidates = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(HIDDEN_CONFIG_FILE_NAME),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(HIDDEN_CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));

        for candidate in candidates {
            if candidate.exists() {
                tracing::debug!("使用配置文件: {}", candidate.display());
                return Self::load_from_file(&candidate);
            }
        }

        Err(anyhow::anyhow!("未找到配置文件"))
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = ServiceConfig::default();
        let e = &defaults.engine;

        let mut parser = configparser::ini::Ini::new();
        let mut set = |section: &str, key: &str, value: String| {
            parser.set(section, key, Some(value));
        };
        set("render", "width", e.profile.width.to_string());
        set("render", "height", e.profile.height.to_string());
        set("render", "fps", e.default_fps.to_string());
        set("render", "tolerance_sec", e.tolerance_sec.to_string());
        set("render", "pad_threshold_sec", e.pad_threshold_sec.to_string());
        set("render", "max_tail_sec", e.max_tail_sec.to_string());
        set("render", "preset", e.profile.preset.clone());
        set("render", "crf", e.profile.crf.to_string());
        set("render", "audio_bitrate", e.profile.audio_bitrate.clone());
        set("render", "audio_sample_rate", e.profile.audio_sample_rate.to_string());
        set("render", "scene_workers", e.scene_workers.to_string());
        set("render", "max_parallel_transcodes", e.max_parallel_transcodes.to_string());
        set("render", "ffmpeg_path", e.ffmpeg_path.clone());
        set("storage", "work_root", String::new());
        set("storage", "keep_workspace", "false".to_string());
        set("storage", "oss_endpoint", defaults.oss_endpoint.clone());
        set("notify", "webhook_url", String::new());
        set("logging", "level", defaults.log_level.clone());

        parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

/// 读取并解析单个环境变量，缺失或无法解析时为 None
fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}
