use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use crate::processor::RenderService;
use crate::request::{RenderRequest, RenderResponse};

/// 共享的服务状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RenderService>,
}

impl AppState {
    pub fn new(service: RenderService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// 根路径
pub async fn root() -> &'static str {
    "shorts-render up"
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "ok"
}

/// 渲染 Handler
///
/// 请求体按原始字节读取，不要求 `Content-Type: application/json`，
/// 也接受字符串化的 JSON。校验错误返回 400，其余错误返回 500。
pub async fn handle_render(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, ResponseJson<RenderResponse>) {
    info!("📨 [HTTP] 收到渲染请求: {} 字节", body.len());

    let result = match RenderRequest::from_slice(&body) {
        Ok(request) => state.service.render(&request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(summary) => (
            StatusCode::OK,
            ResponseJson(RenderResponse::success(&summary.output, summary.scenes)),
        ),
        Err(e) => {
            let status = if e.is_validation() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, ResponseJson(RenderResponse::failure(&e)))
        }
    }
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/render", post(handle_render))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
