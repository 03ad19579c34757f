use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use gazette_core::identity::{Capability, Principal};
use gazette_core::models::{DeliveryAssignment, DeliveryStats};
use gazette_core::month::MonthKey;
use gazette_route::RouteStop;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BuildRouteBody {
    pub day: NaiveDate,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/route/build", post(build_route))
        .route("/v1/route/{day}", get(route_for_day))
        .route("/v1/assignments/{id}/delivered", post(mark_delivered))
        .route("/v1/commission/{month}", get(commission))
        .route("/v1/stats", get(stats))
}

async fn build_route(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<BuildRouteBody>,
) -> Result<Json<Vec<RouteStop>>, AppError> {
    principal.require(Capability::WorkRoute)?;
    let route = state.routes.build_daily_route(principal.id, body.day).await?;
    Ok(Json(route))
}

async fn route_for_day(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(day): Path<NaiveDate>,
) -> Result<Json<Vec<RouteStop>>, AppError> {
    principal.require(Capability::WorkRoute)?;
    let route = state.routes.route_for_day(principal.id, day).await?;
    Ok(Json(route))
}

async fn mark_delivered(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    principal.require(Capability::WorkRoute)?;
    let delivered = state
        .routes
        .mark_delivered(id, principal.id, Utc::now())
        .await?;
    Ok(Json(delivered))
}

async fn commission(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(month): Path<MonthKey>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::WorkRoute)?;
    let commission = state.routes.commission_for(principal.id, month).await?;
    Ok(Json(json!({ "month": month, "commission": commission })))
}

async fn stats(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DeliveryStats>, AppError> {
    principal.require(Capability::WorkRoute)?;
    let stats = state.routes.stats_for(principal.id).await?;
    Ok(Json(stats))
}
