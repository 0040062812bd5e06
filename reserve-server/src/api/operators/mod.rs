//! Operator API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/operators/{operator_id} | GET | 是否管理员及当前视图 |
//! | /api/operators/{operator_id}/view | PUT | 登记待审列表所在消息 (`OperatorView`) |
//! | /api/operators/{operator_id}/view | DELETE | 移除视图 |

mod handler;

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/operators", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{operator_id}", get(handler::get_operator))
        .route(
            "/{operator_id}/view",
            put(handler::set_view).delete(handler::remove_view),
        )
}
