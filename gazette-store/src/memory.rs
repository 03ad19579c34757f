//! In-memory ledger store. Backs the engine tests and local development.
//! One mutex guards the whole ledger, so every composite operation the traits
//! promise to be atomic runs under a single lock acquisition.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use gazette_core::models::{
    Address, AssignmentStatus, Bill, ChangeAction, ChangeRequest, Complaint, ComplaintStatus,
    DeliveryAssignment, DeliveryStats, PauseRequest, Payment, Plan, RequestKind, Resolution,
    SubscribeRequest, Subscription, SubscriptionStatus,
};
use gazette_core::month::MonthKey;
use gazette_core::repository::{
    ActiveSubscription, AddressStore, BillStore, ComplaintStore, DeliveryStore, PlanStore,
    RequestStore, ResolvedRequest, SubscriptionStore,
};
use gazette_core::{CoreError, CoreResult};

#[derive(Default)]
struct Ledger {
    plans: HashMap<Uuid, Plan>,
    subscriptions: Vec<Subscription>,
    addresses: HashMap<Uuid, Address>, // keyed by customer: zero or one canonical address
    subscribe_requests: HashMap<Uuid, SubscribeRequest>,
    change_requests: HashMap<Uuid, ChangeRequest>,
    pause_requests: HashMap<Uuid, PauseRequest>,
    bills: HashMap<Uuid, Bill>,
    payments: Vec<Payment>,
    assignments: HashMap<Uuid, DeliveryAssignment>,
    complaints: HashMap<Uuid, Complaint>,
    stats: HashMap<Uuid, DeliveryStats>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, Ledger>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Internal("ledger lock poisoned".into()))
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn insert_plan(&self, plan: Plan) -> CoreResult<()> {
        self.lock()?.plans.insert(plan.id, plan);
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> CoreResult<Option<Plan>> {
        Ok(self.lock()?.plans.get(&id).cloned())
    }

    async fn list_active_plans(&self) -> CoreResult<Vec<Plan>> {
        let ledger = self.lock()?;
        let mut plans: Vec<Plan> = ledger.plans.values().filter(|p| p.is_active).cloned().collect();
        plans.sort_by_key(|p| p.id);
        Ok(plans)
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn ensure_active(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        start_date: NaiveDate,
    ) -> CoreResult<bool> {
        let mut ledger = self.lock()?;
        let exists = ledger.subscriptions.iter().any(|s| {
            s.customer_id == customer_id
                && s.plan_id == plan_id
                && s.status == SubscriptionStatus::Active
        });
        if exists {
            return Ok(false);
        }
        ledger.subscriptions.push(Subscription {
            id: Uuid::new_v4(),
            customer_id,
            plan_id,
            status: SubscriptionStatus::Active,
            start_date,
            end_date: None,
        });
        Ok(true)
    }

    async fn stop(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        end_date: NaiveDate,
    ) -> CoreResult<bool> {
        let mut ledger = self.lock()?;
        let target = ledger.subscriptions.iter_mut().find(|s| {
            s.customer_id == customer_id
                && s.plan_id == plan_id
                && matches!(
                    s.status,
                    SubscriptionStatus::Active | SubscriptionStatus::Paused
                )
        });
        match target {
            Some(sub) => {
                sub.status = SubscriptionStatus::Stopped;
                sub.end_date = Some(end_date);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pause_all_active(&self, customer_id: Uuid) -> CoreResult<usize> {
        let mut ledger = self.lock()?;
        let mut paused = 0;
        for sub in ledger
            .subscriptions
            .iter_mut()
            .filter(|s| s.customer_id == customer_id && s.status == SubscriptionStatus::Active)
        {
            sub.status = SubscriptionStatus::Paused;
            paused += 1;
        }
        Ok(paused)
    }

    async fn stop_all_active(&self, customer_id: Uuid, end_date: NaiveDate) -> CoreResult<usize> {
        let mut ledger = self.lock()?;
        let mut stopped = 0;
        for sub in ledger
            .subscriptions
            .iter_mut()
            .filter(|s| s.customer_id == customer_id && s.status == SubscriptionStatus::Active)
        {
            sub.status = SubscriptionStatus::Stopped;
            sub.end_date = Some(end_date);
            stopped += 1;
        }
        Ok(stopped)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Subscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_active_with_price(&self) -> CoreResult<Vec<ActiveSubscription>> {
        let ledger = self.lock()?;
        let mut out = Vec::new();
        for sub in ledger
            .subscriptions
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
        {
            match ledger.plans.get(&sub.plan_id) {
                Some(plan) => out.push(ActiveSubscription {
                    subscription: sub.clone(),
                    plan_price: plan.price,
                }),
                None => {
                    tracing::warn!(plan_id = %sub.plan_id, "active subscription references missing plan");
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn submit_subscribe(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
    ) -> CoreResult<SubscribeRequest> {
        let request = SubscribeRequest {
            id: Uuid::new_v4(),
            customer_id,
            plan_id,
            resolution: Resolution::Pending,
            created_at: Utc::now(),
        };
        self.lock()?
            .subscribe_requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn submit_change(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        action: ChangeAction,
        effective_date: NaiveDate,
    ) -> CoreResult<ChangeRequest> {
        let request = ChangeRequest {
            id: Uuid::new_v4(),
            customer_id,
            plan_id,
            action,
            effective_date,
            resolution: Resolution::Pending,
            created_at: Utc::now(),
        };
        self.lock()?
            .change_requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn submit_pause(
        &self,
        customer_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: String,
    ) -> CoreResult<PauseRequest> {
        let request = PauseRequest {
            id: Uuid::new_v4(),
            customer_id,
            start_date,
            end_date,
            reason,
            resolution: Resolution::Pending,
            created_at: Utc::now(),
        };
        self.lock()?
            .pause_requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn pending_subscribe(&self) -> CoreResult<Vec<SubscribeRequest>> {
        let ledger = self.lock()?;
        let mut out: Vec<SubscribeRequest> = ledger
            .subscribe_requests
            .values()
            .filter(|r| r.resolution == Resolution::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn pending_change(&self) -> CoreResult<Vec<ChangeRequest>> {
        let ledger = self.lock()?;
        let mut out: Vec<ChangeRequest> = ledger
            .change_requests
            .values()
            .filter(|r| r.resolution == Resolution::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn pending_pause(&self) -> CoreResult<Vec<PauseRequest>> {
        let ledger = self.lock()?;
        let mut out: Vec<PauseRequest> = ledger
            .pause_requests
            .values()
            .filter(|r| r.resolution == Resolution::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn take_pending(
        &self,
        kind: RequestKind,
        id: Uuid,
        resolution: Resolution,
    ) -> CoreResult<ResolvedRequest> {
        let gone = || CoreError::NotFound("request not found or already resolved".into());
        let mut ledger = self.lock()?;
        match kind {
            RequestKind::Subscribe => {
                let req = ledger.subscribe_requests.get_mut(&id).ok_or_else(gone)?;
                if req.resolution != Resolution::Pending {
                    return Err(gone());
                }
                req.resolution = resolution;
                Ok(ResolvedRequest {
                    customer_id: req.customer_id,
                    plan_id: Some(req.plan_id),
                    action: None,
                })
            }
            RequestKind::Change => {
                let req = ledger.change_requests.get_mut(&id).ok_or_else(gone)?;
                if req.resolution != Resolution::Pending {
                    return Err(gone());
                }
                req.resolution = resolution;
                Ok(ResolvedRequest {
                    customer_id: req.customer_id,
                    plan_id: Some(req.plan_id),
                    action: Some(req.action),
                })
            }
            RequestKind::Pause => {
                let req = ledger.pause_requests.get_mut(&id).ok_or_else(gone)?;
                if req.resolution != Resolution::Pending {
                    return Err(gone());
                }
                req.resolution = resolution;
                Ok(ResolvedRequest {
                    customer_id: req.customer_id,
                    plan_id: None,
                    action: None,
                })
            }
        }
    }
}

#[async_trait]
impl BillStore for MemoryStore {
    async fn upsert_bill(
        &self,
        customer_id: Uuid,
        month: MonthKey,
        total_amount: Decimal,
    ) -> CoreResult<Bill> {
        let mut ledger = self.lock()?;
        if let Some(bill) = ledger
            .bills
            .values_mut()
            .find(|b| b.customer_id == customer_id && b.month == month)
        {
            bill.total_amount = total_amount;
            return Ok(bill.clone());
        }
        let bill = Bill {
            id: Uuid::new_v4(),
            customer_id,
            month,
            total_amount,
            is_paid: false,
            created_at: Utc::now(),
        };
        ledger.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn get_bill(&self, id: Uuid) -> CoreResult<Option<Bill>> {
        Ok(self.lock()?.bills.get(&id).cloned())
    }

    async fn find_bill(&self, customer_id: Uuid, month: MonthKey) -> CoreResult<Option<Bill>> {
        Ok(self
            .lock()?
            .bills
            .values()
            .find(|b| b.customer_id == customer_id && b.month == month)
            .cloned())
    }

    async fn list_unpaid(&self) -> CoreResult<Vec<Bill>> {
        let ledger = self.lock()?;
        let mut out: Vec<Bill> = ledger.bills.values().filter(|b| !b.is_paid).cloned().collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    async fn append_payment(&self, payment: Payment) -> CoreResult<Payment> {
        let mut ledger = self.lock()?;
        if !ledger.bills.contains_key(&payment.bill_id) {
            return Err(CoreError::NotFound("bill not found".into()));
        }
        if ledger.payments.iter().any(|p| p.receipt_no == payment.receipt_no) {
            return Err(CoreError::Conflict(format!(
                "receipt '{}' already exists",
                payment.receipt_no
            )));
        }
        ledger.payments.push(payment.clone());
        let paid_total: Decimal = ledger
            .payments
            .iter()
            .filter(|p| p.bill_id == payment.bill_id)
            .map(|p| p.amount)
            .sum();
        if let Some(bill) = ledger.bills.get_mut(&payment.bill_id) {
            if paid_total >= bill.total_amount {
                bill.is_paid = true;
            }
        }
        Ok(payment)
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn upsert_address(&self, address: Address) -> CoreResult<()> {
        self.lock()?.addresses.insert(address.customer_id, address);
        Ok(())
    }

    async fn canonical_for(&self, customer_id: Uuid) -> CoreResult<Option<Address>> {
        Ok(self.lock()?.addresses.get(&customer_id).cloned())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn create_or_fetch(
        &self,
        assignment: DeliveryAssignment,
    ) -> CoreResult<DeliveryAssignment> {
        let mut ledger = self.lock()?;
        if let Some(existing) = ledger.assignments.values().find(|a| {
            a.delivery_person == assignment.delivery_person
                && a.customer_id == assignment.customer_id
                && a.address_id == assignment.address_id
                && a.date == assignment.date
        }) {
            return Ok(existing.clone());
        }
        ledger.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: Uuid) -> CoreResult<Option<DeliveryAssignment>> {
        Ok(self.lock()?.assignments.get(&id).cloned())
    }

    async fn list_for_day(
        &self,
        delivery_person: Uuid,
        day: NaiveDate,
    ) -> CoreResult<Vec<DeliveryAssignment>> {
        let ledger = self.lock()?;
        let mut out: Vec<DeliveryAssignment> = ledger
            .assignments
            .values()
            .filter(|a| a.delivery_person == delivery_person && a.date == day)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        delivery_person: Uuid,
        commission: Decimal,
        delivered_at: DateTime<Utc>,
    ) -> CoreResult<DeliveryAssignment> {
        let mut ledger = self.lock()?;
        let assignment = ledger
            .assignments
            .get_mut(&id)
            .filter(|a| a.delivery_person == delivery_person)
            .ok_or_else(|| CoreError::NotFound("assignment not found".into()))?;
        if assignment.status == AssignmentStatus::Delivered {
            return Err(CoreError::Conflict("assignment already delivered".into()));
        }
        assignment.status = AssignmentStatus::Delivered;
        assignment.commission = Some(commission);
        assignment.delivered_at = Some(delivered_at);
        let updated = assignment.clone();

        let stats = ledger
            .stats
            .entry(delivery_person)
            .or_insert_with(|| DeliveryStats::empty(delivery_person));
        stats.total_deliveries += 1;
        stats.total_commission += commission;

        Ok(updated)
    }

    async fn delivered_value_total(
        &self,
        delivery_person: Uuid,
        month: MonthKey,
    ) -> CoreResult<Decimal> {
        let ledger = self.lock()?;
        Ok(ledger
            .assignments
            .values()
            .filter(|a| {
                a.delivery_person == delivery_person
                    && a.status == AssignmentStatus::Delivered
                    && month.contains(a.date)
            })
            .map(|a| a.value)
            .sum())
    }

    async fn stats_for(&self, delivery_person: Uuid) -> CoreResult<DeliveryStats> {
        Ok(self
            .lock()?
            .stats
            .get(&delivery_person)
            .cloned()
            .unwrap_or_else(|| DeliveryStats::empty(delivery_person)))
    }
}

#[async_trait]
impl ComplaintStore for MemoryStore {
    async fn file_complaint(&self, customer_id: Uuid, message: String) -> CoreResult<Complaint> {
        let complaint = Complaint {
            id: Uuid::new_v4(),
            customer_id,
            message,
            status: ComplaintStatus::Open,
            last_reply: None,
            created_at: Utc::now(),
        };
        self.lock()?.complaints.insert(complaint.id, complaint.clone());
        Ok(complaint)
    }

    async fn open_complaints(&self) -> CoreResult<Vec<Complaint>> {
        let ledger = self.lock()?;
        let mut out: Vec<Complaint> = ledger
            .complaints
            .values()
            .filter(|c| c.status == ComplaintStatus::Open)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn close_complaint(&self, id: Uuid, reply: String) -> CoreResult<Complaint> {
        let mut ledger = self.lock()?;
        let complaint = ledger
            .complaints
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("complaint not found".into()))?;
        complaint.status = ComplaintStatus::Closed;
        complaint.last_reply = Some(reply);
        Ok(complaint.clone())
    }
}
