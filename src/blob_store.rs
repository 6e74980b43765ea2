use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use crate::error::{RenderError, RenderResult};

/// 对象键中保留的字符（路径分隔符单独处理）
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// 存储引用
///
/// 支持的格式：
/// - `gs://bucket/key`
/// - `oss://bucket/key`
/// - `http(s)://...`（例如预签名 URL）
/// - `file://path` 或普通本地路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobRef {
    Gcs { bucket: String, key: String },
    Oss { bucket: String, key: String },
    Http(String),
    Local(PathBuf),
}

impl BlobRef {
    /// 解析存储引用，格式错误返回校验错误
    pub fn parse(raw: &str) -> RenderResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RenderError::validation("存储引用不能为空"));
        }

        if let Some(rest) = raw.strip_prefix("gs://") {
            let (bucket, key) = split_bucket_key(raw, rest)?;
            return Ok(BlobRef::Gcs { bucket, key });
        }
        if let Some(rest) = raw.strip_prefix("oss://") {
            let (bucket, key) = split_bucket_key(raw, rest)?;
            return Ok(BlobRef::Oss { bucket, key });
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(BlobRef::Http(raw.to_string()));
        }
        if let Some(path) = raw.strip_prefix("file://") {
            if path.is_empty() {
                return Err(RenderError::validation(format!("无效的本地路径: {}", raw)));
            }
            return Ok(BlobRef::Local(PathBuf::from(path)));
        }
        if raw.contains("://") {
            return Err(RenderError::validation(format!("不支持的存储引用: {}", raw)));
        }
        Ok(BlobRef::Local(PathBuf::from(raw)))
    }

    /// 引用对应的文件名，用于推断扩展名
    pub fn file_name(&self) -> Option<String> {
        let name = match self {
            BlobRef::Gcs { key, .. } | BlobRef::Oss { key, .. } => {
                key.rsplit('/').next().map(str::to_string)
            }
            BlobRef::Http(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .map(str::to_string),
            BlobRef::Local(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
        };
        name.filter(|n| !n.is_empty())
    }

    /// 引用的扩展名（小写）
    pub fn extension(&self) -> Option<String> {
        self.file_name().and_then(|name| {
            Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
        })
    }

    /// 远程引用对应的 URL
    fn url(&self, oss_endpoint: &str) -> Option<String> {
        match self {
            BlobRef::Gcs { bucket, key } => Some(format!(
                "https://storage.googleapis.com/{}/{}",
                bucket,
                encode_key(key)
            )),
            BlobRef::Oss { bucket, key } => {
                let endpoint = oss_endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/');
                Some(format!("https://{}.{}/{}", bucket, endpoint, encode_key(key)))
            }
            BlobRef::Http(url) => Some(url.clone()),
            BlobRef::Local(_) => None,
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobRef::Gcs { bucket, key } => write!(f, "gs://{}/{}", bucket, key),
            BlobRef::Oss { bucket, key } => write!(f, "oss://{}/{}", bucket, key),
            BlobRef::Http(url) => write!(f, "{}", url),
            BlobRef::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

fn split_bucket_key(raw: &str, rest: &str) -> RenderResult<(String, String)> {
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(RenderError::validation(format!("无效的存储路径: {}", raw))),
    }
}

/// URL 编码对象键（逐段编码，保留路径分隔符）
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// 根据文件扩展名猜测 Content-Type
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// 对象存储接口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 下载到本地路径，返回本地文件路径
    async fn download(&self, blob: &BlobRef, local: &Path) -> RenderResult<PathBuf>;

    /// 上传本地文件
    async fn upload(&self, local: &Path, blob: &BlobRef) -> RenderResult<()>;
}

/// 本地文件系统存储（`file://` 与普通路径）
#[derive(Debug, Default)]
pub struct LocalBlobStore;

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, blob: &BlobRef, local: &Path) -> RenderResult<PathBuf> {
        let BlobRef::Local(source) = blob else {
            return Err(RenderError::Storage(format!("本地存储无法处理引用: {}", blob)));
        };
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, local)
            .await
            .map_err(|e| RenderError::Storage(format!("读取本地文件失败 {}: {}", source.display(), e)))?;
        tracing::info!("📥 [存储] 已复制本地文件: {} -> {}", source.display(), local.display());
        Ok(local.to_path_buf())
    }

    async fn upload(&self, local: &Path, blob: &BlobRef) -> RenderResult<()> {
        let BlobRef::Local(dest) = blob else {
            return Err(RenderError::Storage(format!("本地存储无法处理引用: {}", blob)));
        };
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RenderError::Storage(format!("创建输出目录失败 {}: {}", parent.display(), e)))?;
        }
        tokio::fs::copy(local, dest)
            .await
            .map_err(|e| RenderError::Storage(format!("写入本地文件失败 {}: {}", dest.display(), e)))?;
        tracing::info!("📤 [存储] 已写入本地文件: {}", dest.display());
        Ok(())
    }
}

/// HTTP 对象存储（GCS / OSS 公共地址或预签名 URL）
///
/// 请求不做签名，鉴权由预签名 URL 或存储桶策略负责。
pub struct HttpBlobStore {
    client: Client,
    oss_endpoint: String,
}

impl HttpBlobStore {
    pub fn new(oss_endpoint: impl Into<String>) -> RenderResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| RenderError::Storage(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            oss_endpoint: oss_endpoint.into(),
        })
    }

    fn url_for(&self, blob: &BlobRef) -> RenderResult<String> {
        blob.url(&self.oss_endpoint)
            .ok_or_else(|| RenderError::Storage(format!("HTTP 存储无法处理引用: {}", blob)))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, blob: &BlobRef, local: &Path) -> RenderResult<PathBuf> {
        let url = self.url_for(blob)?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!("📥 [存储] 正在下载: {}", blob);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RenderError::Storage(format!("下载文件失败 {}: {}", blob, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RenderError::Storage(format!(
                "下载文件失败 {}: HTTP {} - {}",
                blob, status, error_text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Storage(format!("读取响应数据失败 {}: {}", blob, e)))?;
        tokio::fs::write(local, &bytes).await?;

        tracing::info!("✅ [存储] 已下载 {} 字节到: {}", bytes.len(), local.display());
        Ok(local.to_path_buf())
    }

    async fn upload(&self, local: &Path, blob: &BlobRef) -> RenderResult<()> {
        let url = self.url_for(blob)?;
        let content = tokio::fs::read(local).await?;
        let content_type = guess_content_type(&blob.file_name().unwrap_or_default());

        tracing::info!(
            "📤 [存储] 正在上传: {} -> {}（{} 字节, {}）",
            local.display(),
            blob,
            content.len(),
            content_type
        );

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await
            .map_err(|e| RenderError::Storage(format!("上传文件失败 {}: {}", blob, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RenderError::Storage(format!(
                "上传文件失败 {}: HTTP {} - {}",
                blob, status, error_text
            )));
        }

        tracing::info!("✅ [存储] 已上传: {}", blob);
        Ok(())
    }
}

/// 按引用类型分发到本地或 HTTP 存储
pub struct RoutingBlobStore {
    local: LocalBlobStore,
    http: HttpBlobStore,
}

impl RoutingBlobStore {
    pub fn new(oss_endpoint: impl Into<String>) -> RenderResult<Self> {
        Ok(Self {
            local: LocalBlobStore,
            http: HttpBlobStore::new(oss_endpoint)?,
        })
    }

    fn backend(&self, blob: &BlobRef) -> &dyn BlobStore {
        match blob {
            BlobRef::Local(_) => &self.local,
            _ => &self.http,
        }
    }
}

#[async_trait]
impl BlobStore for RoutingBlobStore {
    async fn download(&self, blob: &BlobRef, local: &Path) -> RenderResult<PathBuf> {
        self.backend(blob).download(blob, local).await
    }

    async fn upload(&self, local: &Path, blob: &BlobRef) -> RenderResult<()> {
        self.backend(blob).upload(local, blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refs() {
        assert_eq!(
            BlobRef::parse("gs://bucket/a/b.mp4").unwrap(),
            BlobRef::Gcs { bucket: "bucket".into(), key: "a/b.mp4".into() }
        );
        assert_eq!(
            BlobRef::parse("oss://b/k.mp3").unwrap(),
            BlobRef::Oss { bucket: "b".into(), key: "k.mp3".into() }
        );
        assert_eq!(
            BlobRef::parse("file:///tmp/x.mp4").unwrap(),
            BlobRef::Local(PathBuf::from("/tmp/x.mp4"))
        );
        assert_eq!(
            BlobRef::parse("clips/x.mp4").unwrap(),
            BlobRef::Local(PathBuf::from("clips/x.mp4"))
        );
        assert!(matches!(BlobRef::parse("https://h/x.mp4?sig=1"), Ok(BlobRef::Http(_))));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "   ", "gs://bucket", "gs:///key", "s3://b/k", "file://"] {
            let err = BlobRef::parse(raw).unwrap_err();
            assert!(err.is_validation(), "{} 应该是校验错误", raw);
        }
    }

    #[test]
    fn test_urls_encode_key_segments() {
        let blob = BlobRef::parse("gs://media/out dir/最终.mp4").unwrap();
        assert_eq!(
            blob.url("unused").unwrap(),
            "https://storage.googleapis.com/media/out%20dir/%E6%9C%80%E7%BB%88.mp4"
        );

        let blob = BlobRef::parse("oss://media/renders/final.mp4").unwrap();
        assert_eq!(
            blob.url("https://oss-cn-shanghai.aliyuncs.com/").unwrap(),
            "https://media.oss-cn-shanghai.aliyuncs.com/renders/final.mp4"
        );
        assert!(BlobRef::parse("a.mp4").unwrap().url("x").is_none());
    }

    #[test]
    fn test_file_name_and_extension() {
        let blob = BlobRef::parse("https://h/path/voice.MP3?X-Sig=abc").unwrap();
        assert_eq!(blob.file_name().as_deref(), Some("voice.MP3"));
        assert_eq!(blob.extension().as_deref(), Some("mp3"));
        assert_eq!(BlobRef::parse("gs://b/dir/").map(|b| b.file_name()).unwrap(), None);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("final.mp4"), "video/mp4");
        assert_eq!(guess_content_type("voice.MP3"), "audio/mpeg");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"video").unwrap();

        let store = RoutingBlobStore::new("oss-cn-hangzhou.aliyuncs.com").unwrap();
        let blob = BlobRef::Local(source.clone());
        let local = store
            .download(&blob, &dir.path().join("work/video_0.mp4"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"video");

        let dest = BlobRef::Local(dir.path().join("out/final.mp4"));
        store.upload(&local, &dest).await.unwrap();
        assert!(dir.path().join("out/final.mp4").exists());
    }

    #[tokio::test]
    async fn test_local_store_missing_source_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalBlobStore
            .download(&BlobRef::Local(dir.path().join("nope.mp4")), &dir.path().join("x.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "StorageError");
    }
}
