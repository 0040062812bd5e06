//! API 路由模块 - 展示层使用的薄 JSON 适配层
//!
//! - [`health`] - 健康检查
//! - [`reservations`] - 预约查询、审批、取消、到店确认
//! - [`drafts`] - 预约草稿
//! - [`operators`] - 管理员视图

pub mod drafts;
pub mod health;
pub mod operators;
pub mod reservations;

use axum::{Router, middleware};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::core::ServerState;

pub use crate::utils::{ApiResponse, AppResult};

/// 同时处理的请求上限
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(target: "http_access", "{} {} {}", method, uri, response.status());
    response
}

/// Build the Axum router (without state)
pub fn build_app() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(reservations::router())
        .merge(drafts::router())
        .merge(operators::router())
}

/// Router bound to state, with CORS, compression, a concurrency cap and access logging
pub fn build_router(state: ServerState) -> Router {
    build_app()
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(log_request))
}
