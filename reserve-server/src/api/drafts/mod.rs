//! Draft API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/drafts/{user_id} | GET | 当前草稿 (过期视为不存在) |
//! | /api/drafts/{user_id} | PUT | 部分更新 (`DraftPatch`) |
//! | /api/drafts/{user_id} | DELETE | 清除草稿 |
//! | /api/drafts/{user_id}/start | POST | 重新开始 `{name}` |
//! | /api/drafts/{user_id}/phone | PUT | 设置电话 `{phone}` |
//! | /api/drafts/{user_id}/table | PUT | 选桌结果 (`TableSelection`) |
//! | /api/drafts/{user_id}/step | PUT | 标记正在编辑的字段 `{step}` |
//! | /api/drafts/{user_id}/submit | POST | 提交为待审批预约 |

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/drafts", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route(
            "/{user_id}",
            get(handler::get).put(handler::update).delete(handler::clear),
        )
        .route("/{user_id}/start", post(handler::start))
        .route("/{user_id}/phone", put(handler::set_phone))
        .route("/{user_id}/table", put(handler::select_table))
        .route("/{user_id}/step", put(handler::begin_edit))
        .route("/{user_id}/submit", post(handler::submit))
}
