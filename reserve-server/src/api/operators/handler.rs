//! Operator API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use shared::models::OperatorView;

use crate::api::{ApiResponse, AppResult};
use crate::core::ServerState;
use crate::utils::AppError;

#[derive(Debug, Serialize)]
pub struct OperatorInfo {
    pub operator_id: i64,
    pub is_operator: bool,
    pub view: Option<OperatorView>,
}

fn ensure_operator(state: &ServerState, operator_id: i64) -> AppResult<()> {
    if !state.controller.is_operator(operator_id) {
        return Err(AppError::invalid_request(format!(
            "User {} is not an operator",
            operator_id
        )));
    }
    Ok(())
}

/// GET /api/operators/:operator_id
pub async fn get_operator(
    State(state): State<ServerState>,
    Path(operator_id): Path<i64>,
) -> AppResult<ApiResponse<OperatorInfo>> {
    Ok(ApiResponse::success(OperatorInfo {
        operator_id,
        is_operator: state.controller.is_operator(operator_id),
        view: state.views.get(operator_id),
    }))
}

/// PUT /api/operators/:operator_id/view
pub async fn set_view(
    State(state): State<ServerState>,
    Path(operator_id): Path<i64>,
    Json(view): Json<OperatorView>,
) -> AppResult<ApiResponse<OperatorView>> {
    ensure_operator(&state, operator_id)?;
    state.views.set(operator_id, view);
    tracing::debug!(operator_id, chat_id = view.chat_id, page = view.page, "Operator view registered");
    Ok(ApiResponse::success(view))
}

/// DELETE /api/operators/:operator_id/view
pub async fn remove_view(
    State(state): State<ServerState>,
    Path(operator_id): Path<i64>,
) -> AppResult<ApiResponse<()>> {
    state.views.remove(operator_id);
    Ok(ApiResponse::ok())
}
