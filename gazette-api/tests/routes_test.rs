use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use gazette_api::middleware::auth::Claims;
use gazette_api::state::{AppState, AuthConfig};
use gazette_api::app;
use gazette_approval::ApprovalEngine;
use gazette_billing::BillingEngine;
use gazette_core::models::{Address, Plan, SubscriptionStatus};
use gazette_core::repository::{AddressStore, PlanStore, SubscriptionStore};
use gazette_route::RouteEngine;
use gazette_store::MemoryStore;

const SECRET: &str = "test-secret";

fn test_state(store: Arc<MemoryStore>) -> AppState {
    AppState {
        approvals: Arc::new(ApprovalEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        billing: Arc::new(BillingEngine::new(store.clone(), store.clone())),
        routes: Arc::new(RouteEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        complaints: store.clone(),
        subscriptions: store.clone(),
        plans: store,
        auth: AuthConfig {
            secret: SECRET.into(),
        },
    }
}

fn token(id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: id.to_string(),
        username: format!("{role}-user"),
        role: role.to_string(),
        exp: 4102444800, // 2100-01-01
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("content-type", "application/json");
    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_plan(store: &MemoryStore, price: rust_decimal::Decimal) -> Plan {
    let plan = Plan {
        id: Uuid::new_v4(),
        title: "Morning Herald".into(),
        price,
        description: "daily paper".into(),
        is_active: true,
    };
    store.insert_plan(plan.clone()).await.unwrap();
    plan
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn subscribe_request_flows_from_submission_to_active_subscription() {
    let store = Arc::new(MemoryStore::new());
    let plan = seed_plan(&store, dec!(120.00)).await;
    let app = app(test_state(store));

    let customer = Uuid::new_v4();
    let customer_token = token(customer, "customer");
    let sm_token = token(Uuid::new_v4(), "sm");

    let response = app
        .clone()
        .oneshot(authed("GET", "/v1/plans", &customer_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let plans = json_body(response).await;
    assert_eq!(plans[0]["id"], plan.id.to_string());

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/requests/subscribe",
            &customer_token,
            Some(json!({ "plan_id": plan.id })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let request = json_body(response).await;
    let request_id = request["id"].as_str().unwrap().to_string();
    assert_eq!(request["resolution"], "pending");

    let response = app
        .clone()
        .oneshot(authed(
            "GET",
            "/v1/requests/subscribe/pending",
            &sm_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pending = json_body(response).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/requests/subscribe/{request_id}/resolve"),
            &sm_token,
            Some(json!({ "decision": "approve" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["resolution"], "approved");

    let response = app
        .oneshot(authed("GET", "/v1/subscriptions", &customer_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let subs = json_body(response).await;
    assert_eq!(subs.as_array().unwrap().len(), 1);
    assert_eq!(subs[0]["status"], "active");
    assert_eq!(subs[0]["plan_id"], plan.id.to_string());
}

#[tokio::test]
async fn a_customer_cannot_resolve_requests() {
    let store = Arc::new(MemoryStore::new());
    let app = app(test_state(store));

    let response = app
        .oneshot(authed(
            "POST",
            &format!("/v1/requests/subscribe/{}/resolve", Uuid::new_v4()),
            &token(Uuid::new_v4(), "customer"),
            Some(json!({ "decision": "approve" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let store = Arc::new(MemoryStore::new());
    let app = app(test_state(store));

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/subscriptions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn manager_generates_bills_and_settles_one_with_a_payment() {
    let store = Arc::new(MemoryStore::new());
    let plan = seed_plan(&store, dec!(120.00)).await;
    let customer = Uuid::new_v4();
    store
        .ensure_active(customer, plan.id, day(2025, 1, 1))
        .await
        .unwrap();
    let app = app(test_state(store));
    let manager_token = token(Uuid::new_v4(), "manager");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/billing/generate",
            &manager_token,
            Some(json!({ "month": "2025-02" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["bills"], 1);

    let response = app
        .clone()
        .oneshot(authed("GET", "/v1/bills/unpaid", &manager_token, None))
        .await
        .unwrap();
    let unpaid = json_body(response).await;
    assert_eq!(unpaid.as_array().unwrap().len(), 1);
    let bill_id = unpaid[0]["id"].as_str().unwrap().to_string();
    assert_eq!(unpaid[0]["total_amount"], "120.00");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/bills/{bill_id}/payments"),
            &manager_token,
            Some(json!({ "amount": "120.00", "mode": "cash" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payment = json_body(response).await;
    assert!(payment["receipt_no"].as_str().unwrap().starts_with("RCP-"));

    let response = app
        .oneshot(authed("GET", "/v1/bills/unpaid", &manager_token, None))
        .await
        .unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn overdue_sweep_stops_delinquent_customers() {
    let store = Arc::new(MemoryStore::new());
    let plan = seed_plan(&store, dec!(120.00)).await;
    let customer = Uuid::new_v4();
    store
        .ensure_active(customer, plan.id, day(2025, 1, 1))
        .await
        .unwrap();
    let app = app(test_state(store.clone()));
    let manager_token = token(Uuid::new_v4(), "manager");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/billing/generate",
            &manager_token,
            Some(json!({ "month": "2025-01" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/billing/sweep",
            &manager_token,
            Some(json!({ "as_of": "2025-03-05" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["overdue_bills"], 1);
    assert_eq!(outcome["subscriptions_stopped"], 1);

    let subs = store.list_for_customer(customer).await.unwrap();
    assert_eq!(subs[0].status, SubscriptionStatus::Stopped);
}

#[tokio::test]
async fn delivery_person_builds_a_route_and_earns_commission() {
    let store = Arc::new(MemoryStore::new());
    let plan = seed_plan(&store, dec!(1000.00)).await;
    let customer = Uuid::new_v4();
    store
        .ensure_active(customer, plan.id, day(2025, 1, 1))
        .await
        .unwrap();
    store
        .upsert_address(Address {
            id: Uuid::new_v4(),
            customer_id: customer,
            line: "12 Mill Road".into(),
            ordering_key: "12".into(),
        })
        .await
        .unwrap();
    let app = app(test_state(store));

    let person = Uuid::new_v4();
    let delivery_token = token(person, "delivery");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/route/build",
            &delivery_token,
            Some(json!({ "day": "2025-03-10" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let route = json_body(response).await;
    assert_eq!(route.as_array().unwrap().len(), 1);
    let assignment_id = route[0]["assignment"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/assignments/{assignment_id}/delivered"),
            &delivery_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let delivered = json_body(response).await;
    assert_eq!(delivered["status"], "delivered");
    assert_eq!(delivered["commission"], "25.00000");

    // Delivering the same stop again conflicts.
    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/assignments/{assignment_id}/delivered"),
            &delivery_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(authed(
            "GET",
            "/v1/commission/2025-03",
            &delivery_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["commission"], "25.00000");
}

#[tokio::test]
async fn complaints_flow_from_filing_to_closure() {
    let store = Arc::new(MemoryStore::new());
    let app = app(test_state(store));
    let customer_token = token(Uuid::new_v4(), "customer");
    let cse_token = token(Uuid::new_v4(), "cse");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/complaints",
            &customer_token,
            Some(json!({ "message": "paper arrived soaked" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let complaint = json_body(response).await;
    let complaint_id = complaint["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed("GET", "/v1/complaints/open", &cse_token, None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/v1/complaints/{complaint_id}/close"),
            &cse_token,
            Some(json!({ "reply": "replacement sent" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let closed = json_body(response).await;
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["last_reply"], "replacement sent");

    let response = app
        .oneshot(authed("GET", "/v1/complaints/open", &cse_token, None))
        .await
        .unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_month_in_the_path_is_a_bad_request() {
    let store = Arc::new(MemoryStore::new());
    let app = app(test_state(store));

    let response = app
        .oneshot(authed(
            "GET",
            "/v1/commission/2025-13",
            &token(Uuid::new_v4(), "delivery"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
