use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use shorts_render::config::{ConfigLoader, ConfigOverrides, ServiceConfig};
use shorts_render::handler::{self, AppState};
use shorts_render::{RenderResponse, RenderService};
use tracing_subscriber::EnvFilter;

/// 短视频渲染工具 - 按脚本时间轴把素材片段与配音对齐并拼接成片
#[derive(Parser, Debug)]
#[command(name = "shorts-render")]
#[command(about = "短视频渲染工具：场景规整、配音切分、无损拼接", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CLI 模式：执行一次渲染请求（引用可以是本地路径）
    Render {
        /// 请求 JSON 文件路径
        #[arg(short, long)]
        request: PathBuf,

        /// 请求未指定 fps 时使用的帧率
        /// 可通过环境变量 SHORTS_RENDER_FPS 或配置文件设置
        #[arg(long)]
        fps: Option<u32>,

        /// 单个任务内并行处理的场景数
        #[arg(long)]
        scene_workers: Option<usize>,

        /// 任务工作目录的根目录
        #[arg(long)]
        work_root: Option<PathBuf>,

        /// 渲染完成后的回调地址
        #[arg(long)]
        webhook_url: Option<String>,
    },
    /// Web 服务模式：启动 HTTP 服务器接收渲染请求
    Serve {
        /// 监听地址（默认从环境变量 FC_SERVER_PORT 或 PORT 读取，如果不存在则使用 0.0.0.0:9000）
        #[arg(short, long)]
        bind: Option<String>,

        /// 单个任务内并行处理的场景数
        #[arg(long)]
        scene_workers: Option<usize>,

        /// 全进程并行转码调用上限
        #[arg(long)]
        max_transcodes: Option<usize>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 输出路径
        #[arg(default_value = "shorts-render.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Render {
            request,
            fps,
            scene_workers,
            work_root,
            webhook_url,
        } => {
            let overrides = ConfigOverrides {
                fps,
                scene_workers,
                work_root,
                webhook_url,
                ..Default::default()
            };
            let config = load_config(args.config.as_deref(), overrides)?;
            run_render(config, &request).await?;
        }
        Commands::Serve {
            bind,
            scene_workers,
            max_transcodes,
        } => {
            let overrides = ConfigOverrides {
                scene_workers,
                max_parallel_transcodes: max_transcodes,
                ..Default::default()
            };
            let config = load_config(args.config.as_deref(), overrides)?;
            // 优先使用命令行参数，其次使用环境变量 FC_SERVER_PORT / PORT，最后使用默认值 9000
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("FC_SERVER_PORT")
                    .or_else(|_| std::env::var("PORT"))
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            });
            start_web_server(config, &bind_addr).await?;
        }
        Commands::InitConfig { path } => {
            init_logging(&ServiceConfig::default().log_level);
            ConfigLoader::create_default_config(&path)
                .with_context(|| format!("创建配置文件失败: {}", path.display()))?;
            println!("已生成默认配置文件: {}", path.display());
        }
    }

    Ok(())
}

/// 加载配置并初始化日志
fn load_config(config_file: Option<&std::path::Path>, overrides: ConfigOverrides) -> Result<ServiceConfig> {
    let config = ConfigLoader::load(config_file, overrides).context("加载配置失败")?;
    init_logging(&config.log_level);
    Ok(config)
}

/// RUST_LOG 优先，其次使用配置中的日志级别
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_render(config: ServiceConfig, request_path: &std::path::Path) -> Result<()> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("读取请求文件失败: {}", request_path.display()))?;
    let body: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("请求文件不是合法 JSON: {}", request_path.display()))?;

    println!(
        "使用配置: fps={}, scene_workers={}, max_parallel_transcodes={}",
        config.engine.default_fps, config.engine.scene_workers, config.engine.max_parallel_transcodes
    );

    let service = RenderService::from_config(config)?;
    let (response, failure) = match service.render_value(body).await {
        Ok(summary) => (RenderResponse::success(&summary.output, summary.scenes), None),
        Err(e) => (RenderResponse::failure(&e), Some(e)),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("序列化响应失败")?
    );

    match failure {
        Some(e) => Err(anyhow::Error::new(e).context("渲染失败")),
        None => Ok(()),
    }
}

async fn start_web_server(config: ServiceConfig, bind: &str) -> Result<()> {
    let service = RenderService::from_config(config)?;
    let app = handler::router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 状态: GET  http://{}/", bind);
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 渲染: POST http://{}/render", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
