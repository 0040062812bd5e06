//! Reservation API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/reservations/pending | GET | 待审批列表 (按提交顺序) |
//! | /api/reservations/follow-up | GET | 需要电话跟进的预约 (DECLINED / NO_RESPONSE) |
//! | /api/reservations/{id} | GET | 单个预约 |
//! | /api/reservations/{id}/approve | POST | 管理员批准 |
//! | /api/reservations/{id}/reject | POST | 管理员拒绝 |
//! | /api/reservations/{id}/cancel | POST | 客人取消 `{user_id}` |
//! | /api/reservations/{id}/attendance | POST | 到店确认 `{user_id, attending}` |
//! | /api/users/{user_id}/reservations | GET | 客人可取消的预约 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .nest("/api/reservations", routes())
        .route("/api/users/{user_id}/reservations", get(handler::list_for_user))
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/pending", get(handler::list_pending))
        .route("/follow-up", get(handler::list_follow_up))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/approve", post(handler::approve))
        .route("/{id}/reject", post(handler::reject))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/attendance", post(handler::attendance))
}
