//! Postgres ledger store. Composite operations run inside transactions;
//! create-if-absent primitives are `ON CONFLICT` upserts backed by the unique
//! constraints in the migrations, so duplicate-insert races resolve in the
//! database rather than with check-then-insert.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
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

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    CoreError::Internal(err.to_string())
}

/// Unique-constraint violations are the "already exists" signal; everything
/// else is internal.
fn db_err(err: sqlx::Error, what: &str) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return CoreError::Conflict(format!("{what} already exists"));
        }
    }
    internal(err)
}

fn corrupt(field: &str) -> impl FnOnce(CoreError) -> CoreError + '_ {
    move |_| CoreError::Internal(format!("corrupt {field} value in store"))
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    title: String,
    price: Decimal,
    description: String,
    is_active: bool,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            title: row.title,
            price: row.price,
            description: row.description,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    customer_id: Uuid,
    plan_id: Uuid,
    status: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
}

impl SubscriptionRow {
    fn into_model(self) -> CoreResult<Subscription> {
        Ok(Subscription {
            id: self.id,
            customer_id: self.customer_id,
            plan_id: self.plan_id,
            status: SubscriptionStatus::from_str(&self.status)
                .map_err(corrupt("subscription status"))?,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BillRow {
    id: Uuid,
    customer_id: Uuid,
    month: String,
    total_amount: Decimal,
    is_paid: bool,
    created_at: DateTime<Utc>,
}

impl BillRow {
    fn into_model(self) -> CoreResult<Bill> {
        Ok(Bill {
            id: self.id,
            customer_id: self.customer_id,
            month: self.month.parse().map_err(corrupt("bill month"))?,
            total_amount: self.total_amount,
            is_paid: self.is_paid,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    delivery_person: Uuid,
    customer_id: Uuid,
    address_id: Uuid,
    date: NaiveDate,
    status: String,
    value: Decimal,
    commission: Option<Decimal>,
    delivered_at: Option<DateTime<Utc>>,
}

impl AssignmentRow {
    fn into_model(self) -> CoreResult<DeliveryAssignment> {
        Ok(DeliveryAssignment {
            id: self.id,
            delivery_person: self.delivery_person,
            customer_id: self.customer_id,
            address_id: self.address_id,
            date: self.date,
            status: AssignmentStatus::from_str(&self.status)
                .map_err(corrupt("assignment status"))?,
            value: self.value,
            commission: self.commission,
            delivered_at: self.delivered_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubscribeRequestRow {
    id: Uuid,
    customer_id: Uuid,
    plan_id: Uuid,
    resolution: String,
    created_at: DateTime<Utc>,
}

impl SubscribeRequestRow {
    fn into_model(self) -> CoreResult<SubscribeRequest> {
        Ok(SubscribeRequest {
            id: self.id,
            customer_id: self.customer_id,
            plan_id: self.plan_id,
            resolution: Resolution::from_str(&self.resolution).map_err(corrupt("resolution"))?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChangeRequestRow {
    id: Uuid,
    customer_id: Uuid,
    plan_id: Uuid,
    action: String,
    effective_date: NaiveDate,
    resolution: String,
    created_at: DateTime<Utc>,
}

impl ChangeRequestRow {
    fn into_model(self) -> CoreResult<ChangeRequest> {
        Ok(ChangeRequest {
            id: self.id,
            customer_id: self.customer_id,
            plan_id: self.plan_id,
            action: ChangeAction::from_str(&self.action).map_err(corrupt("change action"))?,
            effective_date: self.effective_date,
            resolution: Resolution::from_str(&self.resolution).map_err(corrupt("resolution"))?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PauseRequestRow {
    id: Uuid,
    customer_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: String,
    resolution: String,
    created_at: DateTime<Utc>,
}

impl PauseRequestRow {
    fn into_model(self) -> CoreResult<PauseRequest> {
        Ok(PauseRequest {
            id: self.id,
            customer_id: self.customer_id,
            start_date: self.start_date,
            end_date: self.end_date,
            reason: self.reason,
            resolution: Resolution::from_str(&self.resolution).map_err(corrupt("resolution"))?,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ComplaintRow {
    id: Uuid,
    customer_id: Uuid,
    message: String,
    status: String,
    last_reply: Option<String>,
    created_at: DateTime<Utc>,
}

impl ComplaintRow {
    fn into_model(self) -> CoreResult<Complaint> {
        Ok(Complaint {
            id: self.id,
            customer_id: self.customer_id,
            message: self.message,
            status: ComplaintStatus::from_str(&self.status).map_err(corrupt("complaint status"))?,
            last_reply: self.last_reply,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn insert_plan(&self, plan: Plan) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO plans (id, title, price, description, is_active) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(plan.id)
        .bind(&plan.title)
        .bind(plan.price)
        .bind(&plan.description)
        .bind(plan.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(e, "plan"))?;
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> CoreResult<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT id, title, price, description, is_active FROM plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Plan::from))
    }

    async fn list_active_plans(&self) -> CoreResult<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            "SELECT id, title, price, description, is_active FROM plans \
             WHERE is_active ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn ensure_active(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        start_date: NaiveDate,
    ) -> CoreResult<bool> {
        // The partial unique index on (customer_id, plan_id) WHERE active
        // makes this race-safe; the losing insert is a silent no-op.
        let result = sqlx::query(
            "INSERT INTO subscriptions (id, customer_id, plan_id, status, start_date) \
             VALUES ($1, $2, $3, 'active', $4) \
             ON CONFLICT (customer_id, plan_id) WHERE status = 'active' DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(plan_id)
        .bind(start_date)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() == 1)
    }

    async fn stop(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        end_date: NaiveDate,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'stopped', end_date = $3 \
             WHERE id IN (SELECT id FROM subscriptions \
                          WHERE customer_id = $1 AND plan_id = $2 \
                            AND status IN ('active', 'paused') \
                          LIMIT 1)",
        )
        .bind(customer_id)
        .bind(plan_id)
        .bind(end_date)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn pause_all_active(&self, customer_id: Uuid) -> CoreResult<usize> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'paused' \
             WHERE customer_id = $1 AND status = 'active'",
        )
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn stop_all_active(&self, customer_id: Uuid, end_date: NaiveDate) -> CoreResult<usize> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'stopped', end_date = $2 \
             WHERE customer_id = $1 AND status = 'active'",
        )
        .bind(customer_id)
        .bind(end_date)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() as usize)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, customer_id, plan_id, status, start_date, end_date \
             FROM subscriptions WHERE customer_id = $1 ORDER BY start_date",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(SubscriptionRow::into_model).collect()
    }

    async fn list_active_with_price(&self) -> CoreResult<Vec<ActiveSubscription>> {
        #[derive(sqlx::FromRow)]
        struct ActiveRow {
            id: Uuid,
            customer_id: Uuid,
            plan_id: Uuid,
            status: String,
            start_date: NaiveDate,
            end_date: Option<NaiveDate>,
            price: Decimal,
        }

        let rows = sqlx::query_as::<_, ActiveRow>(
            "SELECT s.id, s.customer_id, s.plan_id, s.status, s.start_date, s.end_date, p.price \
             FROM subscriptions s JOIN plans p ON p.id = s.plan_id \
             WHERE s.status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter()
            .map(|row| {
                Ok(ActiveSubscription {
                    subscription: SubscriptionRow {
                        id: row.id,
                        customer_id: row.customer_id,
                        plan_id: row.plan_id,
                        status: row.status,
                        start_date: row.start_date,
                        end_date: row.end_date,
                    }
                    .into_model()?,
                    plan_price: row.price,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RequestStore for PgStore {
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
        sqlx::query(
            "INSERT INTO subscribe_requests (id, customer_id, plan_id, resolution, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(request.id)
        .bind(request.customer_id)
        .bind(request.plan_id)
        .bind(request.resolution.as_str())
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
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
        sqlx::query(
            "INSERT INTO change_requests \
             (id, customer_id, plan_id, action, effective_date, resolution, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(request.id)
        .bind(request.customer_id)
        .bind(request.plan_id)
        .bind(request.action.as_str())
        .bind(request.effective_date)
        .bind(request.resolution.as_str())
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
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
        sqlx::query(
            "INSERT INTO pause_requests \
             (id, customer_id, start_date, end_date, reason, resolution, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(request.id)
        .bind(request.customer_id)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&request.reason)
        .bind(request.resolution.as_str())
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(request)
    }

    async fn pending_subscribe(&self) -> CoreResult<Vec<SubscribeRequest>> {
        let rows = sqlx::query_as::<_, SubscribeRequestRow>(
            "SELECT id, customer_id, plan_id, resolution, created_at \
             FROM subscribe_requests WHERE resolution = 'pending' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(SubscribeRequestRow::into_model).collect()
    }

    async fn pending_change(&self) -> CoreResult<Vec<ChangeRequest>> {
        let rows = sqlx::query_as::<_, ChangeRequestRow>(
            "SELECT id, customer_id, plan_id, action, effective_date, resolution, created_at \
             FROM change_requests WHERE resolution = 'pending' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(ChangeRequestRow::into_model).collect()
    }

    async fn pending_pause(&self) -> CoreResult<Vec<PauseRequest>> {
        let rows = sqlx::query_as::<_, PauseRequestRow>(
            "SELECT id, customer_id, start_date, end_date, reason, resolution, created_at \
             FROM pause_requests WHERE resolution = 'pending' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(PauseRequestRow::into_model).collect()
    }

    async fn take_pending(
        &self,
        kind: RequestKind,
        id: Uuid,
        resolution: Resolution,
    ) -> CoreResult<ResolvedRequest> {
        let gone = || CoreError::NotFound("request not found or already resolved".into());
        // Single conditional UPDATE: only one concurrent caller can win the
        // pending → resolved flip.
        match kind {
            RequestKind::Subscribe => {
                let row = sqlx::query_as::<_, (Uuid, Uuid)>(
                    "UPDATE subscribe_requests SET resolution = $2 \
                     WHERE id = $1 AND resolution = 'pending' \
                     RETURNING customer_id, plan_id",
                )
                .bind(id)
                .bind(resolution.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or_else(gone)?;
                Ok(ResolvedRequest {
                    customer_id: row.0,
                    plan_id: Some(row.1),
                    action: None,
                })
            }
            RequestKind::Change => {
                let row = sqlx::query_as::<_, (Uuid, Uuid, String)>(
                    "UPDATE change_requests SET resolution = $2 \
                     WHERE id = $1 AND resolution = 'pending' \
                     RETURNING customer_id, plan_id, action",
                )
                .bind(id)
                .bind(resolution.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or_else(gone)?;
                Ok(ResolvedRequest {
                    customer_id: row.0,
                    plan_id: Some(row.1),
                    action: Some(ChangeAction::from_str(&row.2).map_err(corrupt("change action"))?),
                })
            }
            RequestKind::Pause => {
                let row = sqlx::query_as::<_, (Uuid,)>(
                    "UPDATE pause_requests SET resolution = $2 \
                     WHERE id = $1 AND resolution = 'pending' \
                     RETURNING customer_id",
                )
                .bind(id)
                .bind(resolution.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or_else(gone)?;
                Ok(ResolvedRequest {
                    customer_id: row.0,
                    plan_id: None,
                    action: None,
                })
            }
        }
    }
}

#[async_trait]
impl BillStore for PgStore {
    async fn upsert_bill(
        &self,
        customer_id: Uuid,
        month: MonthKey,
        total_amount: Decimal,
    ) -> CoreResult<Bill> {
        let row = sqlx::query_as::<_, BillRow>(
            "INSERT INTO bills (id, customer_id, month, total_amount, is_paid, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) \
             ON CONFLICT (customer_id, month) \
             DO UPDATE SET total_amount = EXCLUDED.total_amount \
             RETURNING id, customer_id, month, total_amount, is_paid, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(month.to_string())
        .bind(total_amount)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        row.into_model()
    }

    async fn get_bill(&self, id: Uuid) -> CoreResult<Option<Bill>> {
        let row = sqlx::query_as::<_, BillRow>(
            "SELECT id, customer_id, month, total_amount, is_paid, created_at \
             FROM bills WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(BillRow::into_model).transpose()
    }

    async fn find_bill(&self, customer_id: Uuid, month: MonthKey) -> CoreResult<Option<Bill>> {
        let row = sqlx::query_as::<_, BillRow>(
            "SELECT id, customer_id, month, total_amount, is_paid, created_at \
             FROM bills WHERE customer_id = $1 AND month = $2",
        )
        .bind(customer_id)
        .bind(month.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(BillRow::into_model).transpose()
    }

    async fn list_unpaid(&self) -> CoreResult<Vec<Bill>> {
        let rows = sqlx::query_as::<_, BillRow>(
            "SELECT id, customer_id, month, total_amount, is_paid, created_at \
             FROM bills WHERE NOT is_paid ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(BillRow::into_model).collect()
    }

    async fn append_payment(&self, payment: Payment) -> CoreResult<Payment> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        // Lock the bill row so the sum-and-compare sees all prior payments.
        let bill = sqlx::query_as::<_, (Decimal, bool)>(
            "SELECT total_amount, is_paid FROM bills WHERE id = $1 FOR UPDATE",
        )
        .bind(payment.bill_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?
        .ok_or_else(|| CoreError::NotFound("bill not found".into()))?;

        sqlx::query(
            "INSERT INTO payments (id, bill_id, mode, amount, cheque_no, receipt_no, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.id)
        .bind(payment.bill_id)
        .bind(payment.mode.as_str())
        .bind(payment.amount)
        .bind(&payment.cheque_no)
        .bind(&payment.receipt_no)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(e, "receipt number"))?;

        let (paid_total,): (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE bill_id = $1",
        )
        .bind(payment.bill_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal)?;

        let (total_amount, is_paid) = bill;
        if !is_paid && paid_total >= total_amount {
            sqlx::query("UPDATE bills SET is_paid = TRUE WHERE id = $1")
                .bind(payment.bill_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
        }

        tx.commit().await.map_err(internal)?;
        Ok(payment)
    }
}

#[async_trait]
impl AddressStore for PgStore {
    async fn upsert_address(&self, address: Address) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO addresses (id, customer_id, line, ordering_key) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (customer_id) \
             DO UPDATE SET line = EXCLUDED.line, ordering_key = EXCLUDED.ordering_key",
        )
        .bind(address.id)
        .bind(address.customer_id)
        .bind(&address.line)
        .bind(&address.ordering_key)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn canonical_for(&self, customer_id: Uuid) -> CoreResult<Option<Address>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, String)>(
            "SELECT id, customer_id, line, ordering_key FROM addresses WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(|(id, customer_id, line, ordering_key)| Address {
            id,
            customer_id,
            line,
            ordering_key,
        }))
    }
}

const ASSIGNMENT_COLUMNS: &str =
    "id, delivery_person, customer_id, address_id, date, status, value, commission, delivered_at";

#[async_trait]
impl DeliveryStore for PgStore {
    async fn create_or_fetch(
        &self,
        assignment: DeliveryAssignment,
    ) -> CoreResult<DeliveryAssignment> {
        let inserted = sqlx::query_as::<_, AssignmentRow>(&format!(
            "INSERT INTO delivery_assignments \
             (id, delivery_person, customer_id, address_id, date, status, value) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (delivery_person, customer_id, address_id, date) DO NOTHING \
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(assignment.id)
        .bind(assignment.delivery_person)
        .bind(assignment.customer_id)
        .bind(assignment.address_id)
        .bind(assignment.date)
        .bind(assignment.status.as_str())
        .bind(assignment.value)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        if let Some(row) = inserted {
            return row.into_model();
        }

        // Lost the upsert race or the row already existed: fetch it as-is.
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM delivery_assignments \
             WHERE delivery_person = $1 AND customer_id = $2 AND address_id = $3 AND date = $4"
        ))
        .bind(assignment.delivery_person)
        .bind(assignment.customer_id)
        .bind(assignment.address_id)
        .bind(assignment.date)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        row.into_model()
    }

    async fn get_assignment(&self, id: Uuid) -> CoreResult<Option<DeliveryAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM delivery_assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(AssignmentRow::into_model).transpose()
    }

    async fn list_for_day(
        &self,
        delivery_person: Uuid,
        day: NaiveDate,
    ) -> CoreResult<Vec<DeliveryAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM delivery_assignments \
             WHERE delivery_person = $1 AND date = $2 ORDER BY id"
        ))
        .bind(delivery_person)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(AssignmentRow::into_model).collect()
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        delivery_person: Uuid,
        commission: Decimal,
        delivered_at: DateTime<Utc>,
    ) -> CoreResult<DeliveryAssignment> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let updated = sqlx::query_as::<_, AssignmentRow>(&format!(
            "UPDATE delivery_assignments \
             SET status = 'delivered', commission = $3, delivered_at = $4 \
             WHERE id = $1 AND delivery_person = $2 AND status = 'pending' \
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(delivery_person)
        .bind(commission)
        .bind(delivered_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?;

        let row = match updated {
            Some(row) => row,
            None => {
                // Distinguish "not yours / missing" from "already delivered".
                let probe = sqlx::query_as::<_, (Uuid, String)>(
                    "SELECT delivery_person, status FROM delivery_assignments WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?;
                return match probe {
                    Some((owner, status)) if owner == delivery_person && status == "delivered" => {
                        Err(CoreError::Conflict("assignment already delivered".into()))
                    }
                    _ => Err(CoreError::NotFound("assignment not found".into())),
                };
            }
        };

        sqlx::query(
            "INSERT INTO delivery_stats (delivery_person, total_deliveries, total_commission) \
             VALUES ($1, 1, $2) \
             ON CONFLICT (delivery_person) \
             DO UPDATE SET total_deliveries = delivery_stats.total_deliveries + 1, \
                           total_commission = delivery_stats.total_commission + EXCLUDED.total_commission",
        )
        .bind(delivery_person)
        .bind(commission)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        row.into_model()
    }

    async fn delivered_value_total(
        &self,
        delivery_person: Uuid,
        month: MonthKey,
    ) -> CoreResult<Decimal> {
        let (total,): (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(value), 0) FROM delivery_assignments \
             WHERE delivery_person = $1 AND status = 'delivered' \
               AND date >= $2 AND date < $3",
        )
        .bind(delivery_person)
        .bind(month.first_day())
        .bind(month.next().first_day())
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(total)
    }

    async fn stats_for(&self, delivery_person: Uuid) -> CoreResult<DeliveryStats> {
        let row = sqlx::query_as::<_, (Uuid, i64, Decimal)>(
            "SELECT delivery_person, total_deliveries, total_commission \
             FROM delivery_stats WHERE delivery_person = $1",
        )
        .bind(delivery_person)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(match row {
            Some((delivery_person, total_deliveries, total_commission)) => DeliveryStats {
                delivery_person,
                total_deliveries,
                total_commission,
            },
            None => DeliveryStats::empty(delivery_person),
        })
    }
}

#[async_trait]
impl ComplaintStore for PgStore {
    async fn file_complaint(&self, customer_id: Uuid, message: String) -> CoreResult<Complaint> {
        let complaint = Complaint {
            id: Uuid::new_v4(),
            customer_id,
            message,
            status: ComplaintStatus::Open,
            last_reply: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO complaints (id, customer_id, message, status, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(complaint.id)
        .bind(complaint.customer_id)
        .bind(&complaint.message)
        .bind(complaint.status.as_str())
        .bind(complaint.created_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(complaint)
    }

    async fn open_complaints(&self) -> CoreResult<Vec<Complaint>> {
        let rows = sqlx::query_as::<_, ComplaintRow>(
            "SELECT id, customer_id, message, status, last_reply, created_at \
             FROM complaints WHERE status = 'open' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(ComplaintRow::into_model).collect()
    }

    async fn close_complaint(&self, id: Uuid, reply: String) -> CoreResult<Complaint> {
        let row = sqlx::query_as::<_, ComplaintRow>(
            "UPDATE complaints SET status = 'closed', last_reply = $2 \
             WHERE id = $1 \
             RETURNING id, customer_id, message, status, last_reply, created_at",
        )
        .bind(id)
        .bind(reply)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| CoreError::NotFound("complaint not found".into()))?;
        row.into_model()
    }
}
