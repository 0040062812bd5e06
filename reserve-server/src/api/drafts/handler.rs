//! Draft API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::{DraftPatch, DraftSession, DraftStep, ReservationRequest, TableSelection};

use crate::api::{ApiResponse, AppResult};
use crate::core::ServerState;

#[derive(Debug, Default, Deserialize)]
pub struct StartDraftRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub step: DraftStep,
}

/// GET /api/drafts/:user_id
pub async fn get(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> AppResult<ApiResponse<Option<DraftSession>>> {
    let draft = state.controller.get_draft(user_id).await?;
    Ok(ApiResponse::success(draft))
}

/// PUT /api/drafts/:user_id
pub async fn update(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(patch): Json<DraftPatch>,
) -> AppResult<ApiResponse<DraftSession>> {
    let draft = state.controller.update_draft(user_id, patch).await?;
    Ok(ApiResponse::success(draft))
}

/// DELETE /api/drafts/:user_id
pub async fn clear(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> AppResult<ApiResponse<()>> {
    state.controller.clear_draft(user_id).await?;
    Ok(ApiResponse::ok())
}

/// POST /api/drafts/:user_id/start
pub async fn start(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(req): Json<StartDraftRequest>,
) -> AppResult<ApiResponse<DraftSession>> {
    let draft = state.controller.start_draft(user_id, req.name).await?;
    Ok(ApiResponse::success(draft))
}

/// PUT /api/drafts/:user_id/phone
pub async fn set_phone(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(req): Json<PhoneRequest>,
) -> AppResult<ApiResponse<DraftSession>> {
    let draft = state.controller.set_phone(user_id, &req.phone).await?;
    Ok(ApiResponse::success(draft))
}

/// PUT /api/drafts/:user_id/table
pub async fn select_table(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(selection): Json<TableSelection>,
) -> AppResult<ApiResponse<DraftSession>> {
    let draft = state.controller.select_table(user_id, selection).await?;
    Ok(ApiResponse::success(draft))
}

/// PUT /api/drafts/:user_id/step
pub async fn begin_edit(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Json(req): Json<StepRequest>,
) -> AppResult<ApiResponse<DraftSession>> {
    let draft = state.controller.begin_edit(user_id, req.step).await?;
    Ok(ApiResponse::success(draft))
}

/// POST /api/drafts/:user_id/submit
pub async fn submit(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> AppResult<ApiResponse<ReservationRequest>> {
    let record = state.controller.submit_draft(user_id).await?;
    Ok(ApiResponse::success(record))
}
