//! Approval workflow: customers submit subscribe / change / pause requests,
//! subscription managers resolve them. A request is resolved exactly once;
//! the subscription mutations applied on approval are idempotent, so a retry
//! after a partial failure cannot double-apply.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use gazette_core::models::{
    ChangeAction, ChangeRequest, PauseRequest, RequestKind, Resolution, SubscribeRequest,
};
use gazette_core::repository::{PlanStore, RequestStore, SubscriptionStore};
use gazette_core::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// What a resolution did: the final resolution and how many subscriptions
/// were touched by it.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub resolution: Resolution,
    pub subscriptions_affected: usize,
}

pub struct ApprovalEngine {
    requests: Arc<dyn RequestStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    plans: Arc<dyn PlanStore>,
}

impl ApprovalEngine {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        plans: Arc<dyn PlanStore>,
    ) -> Self {
        Self {
            requests,
            subscriptions,
            plans,
        }
    }

    pub async fn submit_subscribe(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
    ) -> CoreResult<SubscribeRequest> {
        self.require_active_plan(plan_id).await?;
        let request = self.requests.submit_subscribe(customer_id, plan_id).await?;
        info!(request_id = %request.id, %customer_id, %plan_id, "subscribe request submitted");
        Ok(request)
    }

    pub async fn submit_change(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        action: ChangeAction,
        effective_date: NaiveDate,
    ) -> CoreResult<ChangeRequest> {
        match action {
            // Adding a plan only makes sense while it is still sold.
            ChangeAction::Add => self.require_active_plan(plan_id).await?,
            ChangeAction::Remove => {
                self.plans
                    .get_plan(plan_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("plan not found".into()))?;
            }
        }
        let request = self
            .requests
            .submit_change(customer_id, plan_id, action, effective_date)
            .await?;
        info!(request_id = %request.id, %customer_id, %plan_id, action = action.as_str(), "change request submitted");
        Ok(request)
    }

    pub async fn submit_pause(
        &self,
        customer_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: String,
    ) -> CoreResult<PauseRequest> {
        if end_date < start_date {
            return Err(CoreError::InvalidInput(
                "pause end date is before its start date".into(),
            ));
        }
        let request = self
            .requests
            .submit_pause(customer_id, start_date, end_date, reason)
            .await?;
        info!(request_id = %request.id, %customer_id, "pause request submitted");
        Ok(request)
    }

    pub async fn pending_subscribe(&self) -> CoreResult<Vec<SubscribeRequest>> {
        self.requests.pending_subscribe().await
    }

    pub async fn pending_change(&self) -> CoreResult<Vec<ChangeRequest>> {
        self.requests.pending_change().await
    }

    pub async fn pending_pause(&self) -> CoreResult<Vec<PauseRequest>> {
        self.requests.pending_pause().await
    }

    /// Resolve a pending request. The pending → resolved flip happens first
    /// and is the exactly-once gate; a second resolution of the same request
    /// surfaces as NotFound.
    pub async fn resolve(
        &self,
        kind: RequestKind,
        id: Uuid,
        decision: Decision,
        today: NaiveDate,
    ) -> CoreResult<ResolveOutcome> {
        if decision == Decision::Reject {
            self.requests
                .take_pending(kind, id, Resolution::Rejected)
                .await?;
            info!(request_id = %id, kind = kind.as_str(), "request rejected");
            return Ok(ResolveOutcome {
                resolution: Resolution::Rejected,
                subscriptions_affected: 0,
            });
        }

        let resolved = self
            .requests
            .take_pending(kind, id, Resolution::Approved)
            .await?;

        let affected = match kind {
            RequestKind::Subscribe => {
                let plan_id = resolved
                    .plan_id
                    .ok_or_else(|| CoreError::Internal("subscribe request without plan".into()))?;
                usize::from(
                    self.subscriptions
                        .ensure_active(resolved.customer_id, plan_id, today)
                        .await?,
                )
            }
            RequestKind::Change => {
                let plan_id = resolved
                    .plan_id
                    .ok_or_else(|| CoreError::Internal("change request without plan".into()))?;
                let action = resolved
                    .action
                    .ok_or_else(|| CoreError::Internal("change request without action".into()))?;
                match action {
                    ChangeAction::Add => usize::from(
                        self.subscriptions
                            .ensure_active(resolved.customer_id, plan_id, today)
                            .await?,
                    ),
                    ChangeAction::Remove => usize::from(
                        self.subscriptions
                            .stop(resolved.customer_id, plan_id, today)
                            .await?,
                    ),
                }
            }
            // A pause is customer-wide: every active plan goes quiet together.
            RequestKind::Pause => {
                self.subscriptions
                    .pause_all_active(resolved.customer_id)
                    .await?
            }
        };

        info!(
            request_id = %id,
            kind = kind.as_str(),
            customer_id = %resolved.customer_id,
            affected,
            "request approved"
        );
        Ok(ResolveOutcome {
            resolution: Resolution::Approved,
            subscriptions_affected: affected,
        })
    }

    async fn require_active_plan(&self, plan_id: Uuid) -> CoreResult<()> {
        let plan = self
            .plans
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("plan not found".into()))?;
        if !plan.is_active {
            return Err(CoreError::InvalidInput(
                "plan is no longer offered".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_core::models::{Plan, SubscriptionStatus};
    use gazette_store::MemoryStore;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn engine_with_plan() -> (Arc<MemoryStore>, ApprovalEngine, Plan) {
        let store = Arc::new(MemoryStore::new());
        let plan = Plan {
            id: Uuid::new_v4(),
            title: "Morning Herald".into(),
            price: dec!(120.00),
            description: "daily".into(),
            is_active: true,
        };
        store.insert_plan(plan.clone()).await.unwrap();
        let engine = ApprovalEngine::new(store.clone(), store.clone(), store.clone());
        (store, engine, plan)
    }

    #[tokio::test]
    async fn approving_a_subscribe_request_creates_an_active_subscription() {
        let (store, engine, plan) = engine_with_plan().await;
        let customer = Uuid::new_v4();

        let request = engine.submit_subscribe(customer, plan.id).await.unwrap();
        let outcome = engine
            .resolve(
                RequestKind::Subscribe,
                request.id,
                Decision::Approve,
                day(2025, 3, 1),
            )
            .await
            .unwrap();

        assert_eq!(outcome.resolution, Resolution::Approved);
        assert_eq!(outcome.subscriptions_affected, 1);
        let subs = store.list_for_customer(customer).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].plan_id, plan.id);
    }

    #[tokio::test]
    async fn a_request_can_only_be_resolved_once() {
        let (_, engine, plan) = engine_with_plan().await;
        let request = engine
            .submit_subscribe(Uuid::new_v4(), plan.id)
            .await
            .unwrap();

        engine
            .resolve(
                RequestKind::Subscribe,
                request.id,
                Decision::Approve,
                day(2025, 3, 1),
            )
            .await
            .unwrap();
        let second = engine
            .resolve(
                RequestKind::Subscribe,
                request.id,
                Decision::Reject,
                day(2025, 3, 1),
            )
            .await;

        assert!(matches!(second, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejecting_leaves_subscriptions_untouched() {
        let (store, engine, plan) = engine_with_plan().await;
        let customer = Uuid::new_v4();
        let request = engine.submit_subscribe(customer, plan.id).await.unwrap();

        let outcome = engine
            .resolve(
                RequestKind::Subscribe,
                request.id,
                Decision::Reject,
                day(2025, 3, 1),
            )
            .await
            .unwrap();

        assert_eq!(outcome.resolution, Resolution::Rejected);
        assert!(store.list_for_customer(customer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approved_pause_pauses_every_active_plan_of_the_customer() {
        let (store, engine, plan) = engine_with_plan().await;
        let second_plan = Plan {
            id: Uuid::new_v4(),
            title: "Sunday Supplement".into(),
            price: dec!(40.00),
            description: String::new(),
            is_active: true,
        };
        store.insert_plan(second_plan.clone()).await.unwrap();

        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, plan.id, day(2025, 1, 1))
            .await
            .unwrap();
        store
            .ensure_active(customer, second_plan.id, day(2025, 2, 1))
            .await
            .unwrap();

        let request = engine
            .submit_pause(
                customer,
                day(2025, 4, 1),
                day(2025, 4, 15),
                "travelling".into(),
            )
            .await
            .unwrap();
        let outcome = engine
            .resolve(RequestKind::Pause, request.id, Decision::Approve, day(2025, 3, 20))
            .await
            .unwrap();

        assert_eq!(outcome.subscriptions_affected, 2);
        let subs = store.list_for_customer(customer).await.unwrap();
        assert!(subs
            .iter()
            .all(|s| s.status == SubscriptionStatus::Paused));
    }

    #[tokio::test]
    async fn approved_remove_change_stops_the_subscription() {
        let (store, engine, plan) = engine_with_plan().await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, plan.id, day(2025, 1, 1))
            .await
            .unwrap();

        let request = engine
            .submit_change(customer, plan.id, ChangeAction::Remove, day(2025, 5, 1))
            .await
            .unwrap();
        let outcome = engine
            .resolve(RequestKind::Change, request.id, Decision::Approve, day(2025, 5, 1))
            .await
            .unwrap();

        assert_eq!(outcome.subscriptions_affected, 1);
        let subs = store.list_for_customer(customer).await.unwrap();
        assert_eq!(subs[0].status, SubscriptionStatus::Stopped);
        assert_eq!(subs[0].end_date, Some(day(2025, 5, 1)));
    }

    #[tokio::test]
    async fn approving_a_duplicate_subscribe_is_a_no_op_on_subscriptions() {
        let (store, engine, plan) = engine_with_plan().await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, plan.id, day(2025, 1, 1))
            .await
            .unwrap();

        let request = engine.submit_subscribe(customer, plan.id).await.unwrap();
        let outcome = engine
            .resolve(
                RequestKind::Subscribe,
                request.id,
                Decision::Approve,
                day(2025, 2, 1),
            )
            .await
            .unwrap();

        assert_eq!(outcome.subscriptions_affected, 0);
        assert_eq!(store.list_for_customer(customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pause_request_with_inverted_dates_is_rejected_upfront() {
        let (_, engine, _) = engine_with_plan().await;
        let result = engine
            .submit_pause(
                Uuid::new_v4(),
                day(2025, 4, 15),
                day(2025, 4, 1),
                "oops".into(),
            )
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn subscribing_to_a_retired_plan_is_refused() {
        let (store, engine, _) = engine_with_plan().await;
        let retired = Plan {
            id: Uuid::new_v4(),
            title: "Evening Post".into(),
            price: dec!(80.00),
            description: String::new(),
            is_active: false,
        };
        store.insert_plan(retired.clone()).await.unwrap();

        let result = engine.submit_subscribe(Uuid::new_v4(), retired.id).await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }
}
