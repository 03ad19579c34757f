use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use gazette_core::identity::{Capability, Principal};
use gazette_core::models::{Bill, Payment, PaymentMode};
use gazette_core::month::MonthKey;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub month: MonthKey,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub cheque_no: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SweepBody {
    /// Sweep reference date; defaults to today.
    pub as_of: Option<chrono::NaiveDate>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/billing/generate", post(generate_bills))
        .route("/v1/billing/sweep", post(sweep_overdue))
        .route("/v1/bills/unpaid", get(list_unpaid))
        .route("/v1/bills/{id}/payments", post(record_payment))
}

async fn generate_bills(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::GenerateBills)?;
    let bills = state.billing.generate_bills(body.month).await?;
    Ok(Json(json!({ "month": body.month, "bills": bills })))
}

async fn record_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<Uuid>,
    Json(body): Json<PaymentBody>,
) -> Result<Json<Payment>, AppError> {
    principal.require(Capability::RecordPayments)?;
    let payment = state
        .billing
        .record_payment(bill_id, body.amount, body.mode, body.cheque_no)
        .await?;
    Ok(Json(payment))
}

async fn sweep_overdue(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Option<Json<SweepBody>>,
) -> Result<Json<Value>, AppError> {
    principal.require(Capability::SweepOverdue)?;
    let as_of = body
        .and_then(|Json(b)| b.as_of)
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let outcome = state.billing.sweep_overdue(as_of).await?;
    Ok(Json(json!(outcome)))
}

async fn list_unpaid(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Bill>>, AppError> {
    principal.require(Capability::ListUnpaidBills)?;
    let bills = state.billing.list_unpaid().await?;
    Ok(Json(bills))
}
