//! 测试用的内存替身：记录转码请求、按文件名返回探测结果、统计存储调用

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use crate::blob_store::{BlobRef, BlobStore};
use crate::error::{RenderError, RenderResult};
use crate::probe::{MediaInfo, MediaProber};
use crate::transcoder::{MediaTranscoder, TranscodeRequest};

/// 记录所有请求的转码器
#[derive(Default)]
pub struct RecordingTranscoder {
    requests: Mutex<Vec<TranscodeRequest>>,
    fail_stage: Option<&'static str>,
    touch_outputs: bool,
    /// 规整该输入文件时先等待
    slow_input: Option<(String, Duration)>,
}

impl RecordingTranscoder {
    /// 在指定阶段返回失败
    pub fn failing_on(stage: &'static str) -> Self {
        Self {
            fail_stage: Some(stage),
            ..Default::default()
        }
    }

    /// 为每个请求写一个空的输出文件
    pub fn touching() -> Self {
        Self {
            touch_outputs: true,
            ..Default::default()
        }
    }

    /// 规整指定输入文件时延迟返回，用于制造乱序完成
    pub fn delaying(file_name: &str, delay: Duration) -> Self {
        Self {
            slow_input: Some((file_name.to_string(), delay)),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaTranscoder for RecordingTranscoder {
    async fn run(&self, request: &TranscodeRequest) -> RenderResult<()> {
        if let (Some((slow, delay)), TranscodeRequest::Normalize { input, .. }) = (&self.slow_input, request) {
            if input.file_name().and_then(|n| n.to_str()) == Some(slow.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_stage == Some(request.stage()) {
            let detail = format!("{}: 模拟工具失败", request.stage());
            return Err(match request {
                TranscodeRequest::Mux { .. } => RenderError::Mux(detail),
                TranscodeRequest::Concat { .. } => RenderError::Concat(detail),
                _ => RenderError::Transcode(detail),
            });
        }
        if self.touch_outputs {
            std::fs::write(request.output(), b"")?;
        }
        Ok(())
    }
}

/// 按文件名返回预设探测结果的探测器；未登记的文件视为音视频俱全
pub struct FakeProber {
    files: HashMap<String, MediaInfo>,
    default: MediaInfo,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl Default for FakeProber {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            default: MediaInfo {
                duration_sec: 1.0,
                has_video: true,
                has_audio: true,
            },
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeProber {
    /// 探测指定文件名时返回 ProbeError
    pub fn failing_on(file_name: &str) -> Self {
        Self {
            fail_on: Some(file_name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file_name: &str, info: MediaInfo) -> Self {
        self.files.insert(file_name.to_string(), info);
        self
    }

    pub fn with_duration(self, file_name: &str, duration_sec: f64) -> Self {
        self.with_file(
            file_name,
            MediaInfo {
                duration_sec,
                has_video: true,
                has_audio: true,
            },
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> RenderResult<MediaInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if self.fail_on.as_deref() == Some(name) {
            return Err(RenderError::Probe {
                path: path.to_path_buf(),
                detail: "模拟探测失败".to_string(),
            });
        }
        Ok(self.files.get(name).copied().unwrap_or(self.default))
    }
}

/// 统计下载/上传调用的存储替身
#[derive(Default)]
pub struct CountingBlobStore {
    downloads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    fail_upload: bool,
}

impl CountingBlobStore {
    pub fn failing_upload() -> Self {
        Self {
            fail_upload: true,
            ..Default::default()
        }
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.downloads().len() + self.uploads().len()
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn download(&self, blob: &BlobRef, local: &Path) -> RenderResult<PathBuf> {
        self.downloads.lock().unwrap().push(blob.to_string());
        std::fs::write(local, b"")?;
        Ok(local.to_path_buf())
    }

    async fn upload(&self, local: &Path, blob: &BlobRef) -> RenderResult<()> {
        self.uploads.lock().unwrap().push(blob.to_string());
        if self.fail_upload {
            return Err(RenderError::Storage(format!("模拟上传失败: {}", blob)));
        }
        if !local.exists() {
            return Err(RenderError::Storage(format!("文件不存在: {}", local.display())));
        }
        Ok(())
    }
}
