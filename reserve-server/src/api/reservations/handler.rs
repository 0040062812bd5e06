//! Reservation API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::ReservationRequest;

use crate::api::{ApiResponse, AppResult};
use crate::core::ServerState;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub user_id: i64,
    pub attending: bool,
}

/// GET /api/reservations/pending
pub async fn list_pending(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<Vec<ReservationRequest>>> {
    let pending = state.controller.list_pending().await?;
    Ok(ApiResponse::success(pending))
}

/// GET /api/reservations/follow-up
pub async fn list_follow_up(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<Vec<ReservationRequest>>> {
    let records = state.controller.list_follow_up().await?;
    Ok(ApiResponse::success(records))
}

/// GET /api/reservations/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ReservationRequest>> {
    let record = state.controller.get(&id).await?;
    Ok(ApiResponse::success(record))
}

/// GET /api/users/:user_id/reservations
pub async fn list_for_user(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> AppResult<ApiResponse<Vec<ReservationRequest>>> {
    let records = state.controller.list_for_user(user_id).await?;
    Ok(ApiResponse::success(records))
}

/// POST /api/reservations/:id/approve
pub async fn approve(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ReservationRequest>> {
    let confirmed = state.controller.approve(&id).await?;
    Ok(ApiResponse::success(confirmed))
}

/// POST /api/reservations/:id/reject
pub async fn reject(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    state.controller.reject(&id).await?;
    Ok(ApiResponse::ok())
}

/// POST /api/reservations/:id/cancel
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> AppResult<ApiResponse<()>> {
    state.controller.cancel(&id, req.user_id).await?;
    Ok(ApiResponse::ok())
}

/// POST /api/reservations/:id/attendance
pub async fn attendance(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<AttendanceRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .controller
        .respond_attendance(&id, req.user_id, req.attending)
        .await?;
    Ok(ApiResponse::ok())
}
