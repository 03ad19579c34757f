use std::net::SocketAddr;
use std::sync::Arc;

use gazette_api::{
    app,
    state::{AppState, AuthConfig},
};
use gazette_approval::ApprovalEngine;
use gazette_billing::BillingEngine;
use gazette_route::RouteEngine;
use gazette_store::{DbClient, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazette_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = gazette_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Gazette API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store = Arc::new(PgStore::new(db.pool.clone()));

    let approvals = Arc::new(ApprovalEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let billing = Arc::new(BillingEngine::new(store.clone(), store.clone()));
    let routes = Arc::new(RouteEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));

    let app_state = AppState {
        approvals,
        billing,
        routes,
        complaints: store.clone(),
        subscriptions: store.clone(),
        plans: store,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
