use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use gazette_core::identity::{Capability, Principal};
use gazette_core::models::Complaint;
use gazette_core::CoreError;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CloseBody {
    pub reply: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/complaints", post(file_complaint))
        .route("/v1/complaints/open", get(open_complaints))
        .route("/v1/complaints/{id}/close", post(close_complaint))
}

async fn file_complaint(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<FileBody>,
) -> Result<Json<Complaint>, AppError> {
    principal.require(Capability::FileComplaints)?;
    if body.message.trim().is_empty() {
        return Err(CoreError::InvalidInput("complaint message is empty".into()).into());
    }
    let complaint = state
        .complaints
        .file_complaint(principal.id, body.message)
        .await?;
    Ok(Json(complaint))
}

async fn open_complaints(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Complaint>>, AppError> {
    principal.require(Capability::HandleComplaints)?;
    let complaints = state.complaints.open_complaints().await?;
    Ok(Json(complaints))
}

async fn close_complaint(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<CloseBody>,
) -> Result<Json<Complaint>, AppError> {
    principal.require(Capability::HandleComplaints)?;
    let complaint = state.complaints.close_complaint(id, body.reply).await?;
    Ok(Json(complaint))
}
