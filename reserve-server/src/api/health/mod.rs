//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 状态、版本和待执行任务数 |

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// None 表示任务库读取失败
    pending_jobs: Option<usize>,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let pending_jobs = state.scheduler.pending_jobs().ok().map(|jobs| jobs.len());
    Json(HealthResponse {
        status: if pending_jobs.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        pending_jobs,
    })
}
