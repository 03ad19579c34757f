//! Ledger-store traits. Operations that must be atomic (conditional request
//! resolution, create-if-absent, payment reconciliation, delivery completion)
//! are single methods so every implementation can honor them with one
//! transaction or one lock acquisition.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Address, Bill, ChangeAction, ChangeRequest, Complaint, DeliveryAssignment, DeliveryStats,
    PauseRequest, Payment, Plan, RequestKind, Resolution, SubscribeRequest, Subscription,
};
use crate::month::MonthKey;
use crate::CoreResult;

/// An Active subscription joined with its plan's current price.
#[derive(Debug, Clone)]
pub struct ActiveSubscription {
    pub subscription: Subscription,
    pub plan_price: Decimal,
}

/// Payload of a request that was just flipped out of Pending.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub customer_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub action: Option<ChangeAction>,
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn insert_plan(&self, plan: Plan) -> CoreResult<()>;
    async fn get_plan(&self, id: Uuid) -> CoreResult<Option<Plan>>;
    async fn list_active_plans(&self) -> CoreResult<Vec<Plan>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Create an Active subscription for (customer, plan) unless one already
    /// exists. Atomic create-if-absent; returns whether a row was created.
    async fn ensure_active(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        start_date: NaiveDate,
    ) -> CoreResult<bool>;

    /// Stop one Active-or-Paused subscription for (customer, plan), stamping
    /// the end date. Returns whether anything was stopped.
    async fn stop(&self, customer_id: Uuid, plan_id: Uuid, end_date: NaiveDate)
        -> CoreResult<bool>;

    /// Pause every Active subscription of the customer. Returns the count.
    async fn pause_all_active(&self, customer_id: Uuid) -> CoreResult<usize>;

    /// Stop every Active subscription of the customer. Returns the count.
    async fn stop_all_active(&self, customer_id: Uuid, end_date: NaiveDate) -> CoreResult<usize>;

    async fn list_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Subscription>>;

    /// Every Active subscription joined with its plan price.
    async fn list_active_with_price(&self) -> CoreResult<Vec<ActiveSubscription>>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn submit_subscribe(&self, customer_id: Uuid, plan_id: Uuid)
        -> CoreResult<SubscribeRequest>;

    async fn submit_change(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        action: ChangeAction,
        effective_date: NaiveDate,
    ) -> CoreResult<ChangeRequest>;

    async fn submit_pause(
        &self,
        customer_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: String,
    ) -> CoreResult<PauseRequest>;

    async fn pending_subscribe(&self) -> CoreResult<Vec<SubscribeRequest>>;
    async fn pending_change(&self) -> CoreResult<Vec<ChangeRequest>>;
    async fn pending_pause(&self) -> CoreResult<Vec<PauseRequest>>;

    /// Atomically flip a still-Pending request to `resolution` and return its
    /// payload. NotFound when the request is absent or already resolved, so
    /// concurrent resolutions race safely and retries never reapply.
    async fn take_pending(
        &self,
        kind: RequestKind,
        id: Uuid,
        resolution: Resolution,
    ) -> CoreResult<ResolvedRequest>;
}

#[async_trait]
pub trait BillStore: Send + Sync {
    /// Insert or recompute the (customer, month) bill, preserving the paid
    /// flag. Re-running converges to the latest total.
    async fn upsert_bill(
        &self,
        customer_id: Uuid,
        month: MonthKey,
        total_amount: Decimal,
    ) -> CoreResult<Bill>;

    async fn get_bill(&self, id: Uuid) -> CoreResult<Option<Bill>>;
    async fn find_bill(&self, customer_id: Uuid, month: MonthKey) -> CoreResult<Option<Bill>>;
    async fn list_unpaid(&self) -> CoreResult<Vec<Bill>>;

    /// Insert the payment and re-evaluate the bill's paid flag against the
    /// cumulative payment sum, in one transaction. NotFound for a missing
    /// bill, Conflict for a duplicate receipt number.
    async fn append_payment(&self, payment: Payment) -> CoreResult<Payment>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn upsert_address(&self, address: Address) -> CoreResult<()>;
    async fn canonical_for(&self, customer_id: Uuid) -> CoreResult<Option<Address>>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Atomic create-if-absent keyed on (delivery person, customer, address,
    /// date). An existing assignment is returned untouched, so repeated route
    /// generation never duplicates rows or resets in-progress state.
    async fn create_or_fetch(&self, assignment: DeliveryAssignment)
        -> CoreResult<DeliveryAssignment>;

    async fn get_assignment(&self, id: Uuid) -> CoreResult<Option<DeliveryAssignment>>;

    async fn list_for_day(&self, delivery_person: Uuid, day: NaiveDate)
        -> CoreResult<Vec<DeliveryAssignment>>;

    /// Flip Pending → Delivered (guarded on owner and status) and bump the
    /// person's running stats, as one atomic unit. NotFound when the
    /// assignment is absent or owned by someone else, Conflict when already
    /// delivered — stats untouched in every failure case.
    async fn complete_delivery(
        &self,
        id: Uuid,
        delivery_person: Uuid,
        commission: Decimal,
        delivered_at: DateTime<Utc>,
    ) -> CoreResult<DeliveryAssignment>;

    /// Sum of `value` over the person's Delivered assignments in the month.
    async fn delivered_value_total(
        &self,
        delivery_person: Uuid,
        month: MonthKey,
    ) -> CoreResult<Decimal>;

    async fn stats_for(&self, delivery_person: Uuid) -> CoreResult<DeliveryStats>;
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn file_complaint(&self, customer_id: Uuid, message: String) -> CoreResult<Complaint>;
    async fn open_complaints(&self) -> CoreResult<Vec<Complaint>>;
    async fn close_complaint(&self, id: Uuid, reply: String) -> CoreResult<Complaint>;
}
