use std::path::PathBuf;
use thiserror::Error;

/// 渲染任务的错误分类
///
/// 除 `Validation` 外，所有错误都以任务为粒度不可恢复：引擎内部不做重试，
/// 调用方需要重新提交整个任务。
#[derive(Debug, Error)]
pub enum RenderError {
    /// 请求格式错误或不完整（在任何外部调用之前检测）
    #[error("请求校验失败: {0}")]
    Validation(String),

    /// 无法读取媒体文件或解析时长
    #[error("探测媒体失败: {path}: {detail}")]
    Probe { path: PathBuf, detail: String },

    /// 转码工具执行失败（场景规整、尾帧延长、音频切分）
    #[error("转码失败: {0}")]
    Transcode(String),

    /// 音视频合流失败（缺少期望的流或工具失败）
    #[error("合流失败: {0}")]
    Mux(String),

    /// 拼接失败（片段编码参数不一致或工具失败）
    #[error("拼接失败: {0}")]
    Concat(String),

    /// 下载或上传失败
    #[error("存储操作失败: {0}")]
    Storage(String),

    /// 任务工作目录的本地 I/O 失败
    #[error("工作目录操作失败: {0}")]
    Workspace(#[from] std::io::Error),
}

impl RenderError {
    /// 响应中 `error` 字段使用的分类名
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Validation(_) => "ValidationError",
            RenderError::Probe { .. } => "ProbeError",
            RenderError::Transcode(_) => "TranscodeError",
            RenderError::Mux(_) => "MuxError",
            RenderError::Concat(_) => "ConcatError",
            RenderError::Storage(_) => "StorageError",
            RenderError::Workspace(_) => "WorkspaceError",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RenderError::Validation(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        RenderError::Validation(msg.into())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
