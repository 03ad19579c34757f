use std::sync::Arc;

use gazette_approval::ApprovalEngine;
use gazette_billing::BillingEngine;
use gazette_core::repository::{ComplaintStore, PlanStore, SubscriptionStore};
use gazette_route::RouteEngine;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub approvals: Arc<ApprovalEngine>,
    pub billing: Arc<BillingEngine>,
    pub routes: Arc<RouteEngine>,
    pub complaints: Arc<dyn ComplaintStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub plans: Arc<dyn PlanStore>,
    pub auth: AuthConfig,
}
