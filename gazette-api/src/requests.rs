use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

use gazette_approval::Decision;
use gazette_core::identity::{Capability, Principal};
use gazette_core::models::{ChangeAction, Plan, RequestKind, Subscription};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    pub plan_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangeBody {
    pub plan_id: Uuid,
    pub action: ChangeAction,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PauseBody {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub decision: Decision,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/requests/subscribe", post(submit_subscribe))
        .route("/v1/requests/change", post(submit_change))
        .route("/v1/requests/pause", post(submit_pause))
        .route("/v1/requests/{kind}/pending", get(list_pending))
        .route("/v1/requests/{kind}/{id}/resolve", post(resolve))
        .route("/v1/subscriptions", get(my_subscriptions))
        .route("/v1/plans", get(list_plans))
}

async fn submit_subscribe(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<SubscribeBody>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::SubmitRequests)?;
    let request = state
        .approvals
        .submit_subscribe(principal.id, body.plan_id)
        .await?;
    Ok(Json(json!(request)))
}

async fn submit_change(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ChangeBody>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::SubmitRequests)?;
    let request = state
        .approvals
        .submit_change(principal.id, body.plan_id, body.action, body.effective_date)
        .await?;
    Ok(Json(json!(request)))
}

async fn submit_pause(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<PauseBody>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::SubmitRequests)?;
    let request = state
        .approvals
        .submit_pause(principal.id, body.start_date, body.end_date, body.reason)
        .await?;
    Ok(Json(json!(request)))
}

async fn list_pending(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ListPendingRequests)?;
    let listing = match RequestKind::from_str(&kind)? {
        RequestKind::Subscribe => json!(state.approvals.pending_subscribe().await?),
        RequestKind::Change => json!(state.approvals.pending_change().await?),
        RequestKind::Pause => json!(state.approvals.pending_pause().await?),
    };
    Ok(Json(listing))
}

async fn resolve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::ResolveRequests)?;
    let kind = RequestKind::from_str(&kind)?;
    let outcome = state
        .approvals
        .resolve(kind, id, body.decision, Utc::now().date_naive())
        .await?;
    Ok(Json(json!(outcome)))
}

// The plan catalog is readable by any authenticated principal.
async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>, AppError> {
    let plans = state.plans.list_active_plans().await?;
    Ok(Json(plans))
}

async fn my_subscriptions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    principal.require(Capability::ViewOwnSubscriptions)?;
    let subs = state.subscriptions.list_for_customer(principal.id).await?;
    Ok(Json(subs))
}
