//! Billing: monthly bill generation from active subscriptions, payment
//! recording with receipt issuance, and the overdue sweep that stops
//! delivery for customers who let bills age past the grace window.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use gazette_core::models::{Bill, Payment, PaymentMode};
use gazette_core::month::MonthKey;
use gazette_core::repository::{BillStore, SubscriptionStore};
use gazette_core::{CoreError, CoreResult};

/// A bill unpaid for this many whole months (or more) after its billing
/// month triggers the punitive stop.
pub const OVERDUE_GRACE_MONTHS: i32 = 2;

/// Result of an overdue sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub overdue_bills: usize,
    pub subscriptions_stopped: usize,
}

pub struct BillingEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    bills: Arc<dyn BillStore>,
}

impl BillingEngine {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, bills: Arc<dyn BillStore>) -> Self {
        Self {
            subscriptions,
            bills,
        }
    }

    /// Generate (or regenerate) one bill per customer with active
    /// subscriptions for the given month. Paused and stopped subscriptions
    /// contribute nothing. Returns the number of bills written.
    pub async fn generate_bills(&self, month: MonthKey) -> CoreResult<usize> {
        let active = self.subscriptions.list_active_with_price().await?;

        let mut totals: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for entry in active {
            *totals
                .entry(entry.subscription.customer_id)
                .or_insert(Decimal::ZERO) += entry.plan_price;
        }

        let count = totals.len();
        for (customer_id, total) in totals {
            self.bills.upsert_bill(customer_id, month, total).await?;
        }

        info!(month = %month, bills = count, "bill generation complete");
        Ok(count)
    }

    /// Record a payment against a bill and issue a receipt. The bill's paid
    /// flag flips only once cumulative payments reach the total.
    pub async fn record_payment(
        &self,
        bill_id: Uuid,
        amount: Decimal,
        mode: PaymentMode,
        cheque_no: Option<String>,
    ) -> CoreResult<Payment> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidInput(
                "payment amount must be positive".into(),
            ));
        }
        // A stray cheque number on a cash payment is stored as given.
        if mode == PaymentMode::Cheque && cheque_no.as_deref().map_or(true, str::is_empty) {
            return Err(CoreError::InvalidInput(
                "cheque payments require a cheque number".into(),
            ));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            bill_id,
            mode,
            amount,
            cheque_no,
            receipt_no: format!("RCP-{}", Uuid::new_v4().simple()),
            created_at: Utc::now(),
        };
        let payment = self.bills.append_payment(payment).await?;
        info!(%bill_id, receipt = %payment.receipt_no, %amount, "payment recorded");
        Ok(payment)
    }

    pub async fn list_unpaid(&self) -> CoreResult<Vec<Bill>> {
        self.bills.list_unpaid().await
    }

    /// Stop every active subscription of customers whose unpaid bills are at
    /// least [`OVERDUE_GRACE_MONTHS`] old. Stops are per customer even when
    /// several of their bills are overdue.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> CoreResult<SweepOutcome> {
        let current = MonthKey::from_date(today);
        let unpaid = self.bills.list_unpaid().await?;

        let mut overdue_bills = 0;
        let mut delinquent: BTreeMap<Uuid, MonthKey> = BTreeMap::new();
        for bill in unpaid {
            if bill.month.months_until(current) >= OVERDUE_GRACE_MONTHS {
                overdue_bills += 1;
                let oldest = delinquent.entry(bill.customer_id).or_insert(bill.month);
                if bill.month.months_until(*oldest) > 0 {
                    *oldest = bill.month;
                }
            }
        }

        let mut subscriptions_stopped = 0;
        for (customer_id, oldest_month) in delinquent {
            let stopped = self
                .subscriptions
                .stop_all_active(customer_id, today)
                .await?;
            subscriptions_stopped += stopped;
            if stopped > 0 {
                warn!(
                    %customer_id,
                    oldest_unpaid = %oldest_month,
                    stopped,
                    "stopped subscriptions for overdue bills"
                );
            }
        }

        info!(overdue_bills, subscriptions_stopped, "overdue sweep complete");
        Ok(SweepOutcome {
            overdue_bills,
            subscriptions_stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_core::models::{Plan, SubscriptionStatus};
    use gazette_core::repository::PlanStore;
    use gazette_store::MemoryStore;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(y: i32, m: u32) -> MonthKey {
        MonthKey::new(y, m).unwrap()
    }

    async fn seeded_plan(store: &MemoryStore, price: Decimal) -> Plan {
        let plan = Plan {
            id: Uuid::new_v4(),
            title: format!("plan-{price}"),
            price,
            description: String::new(),
            is_active: true,
        };
        store.insert_plan(plan.clone()).await.unwrap();
        plan
    }

    #[tokio::test]
    async fn bills_sum_all_active_plans_per_customer() {
        let store = Arc::new(MemoryStore::new());
        let daily = seeded_plan(&store, dec!(120.00)).await;
        let sunday = seeded_plan(&store, dec!(45.50)).await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, daily.id, day(2025, 1, 1))
            .await
            .unwrap();
        store
            .ensure_active(customer, sunday.id, day(2025, 1, 1))
            .await
            .unwrap();

        let engine = BillingEngine::new(store.clone(), store.clone());
        let written = engine.generate_bills(month(2025, 2)).await.unwrap();

        assert_eq!(written, 1);
        let bill = store
            .find_bill(customer, month(2025, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bill.total_amount, dec!(165.50));
        assert!(!bill.is_paid);
    }

    #[tokio::test]
    async fn regeneration_converges_to_the_latest_subscription_set() {
        let store = Arc::new(MemoryStore::new());
        let daily = seeded_plan(&store, dec!(120.00)).await;
        let sunday = seeded_plan(&store, dec!(45.50)).await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, daily.id, day(2025, 1, 1))
            .await
            .unwrap();

        let engine = BillingEngine::new(store.clone(), store.clone());
        engine.generate_bills(month(2025, 2)).await.unwrap();

        store
            .ensure_active(customer, sunday.id, day(2025, 2, 10))
            .await
            .unwrap();
        engine.generate_bills(month(2025, 2)).await.unwrap();

        let bill = store
            .find_bill(customer, month(2025, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bill.total_amount, dec!(165.50));
        // Still exactly one bill for the (customer, month) pair.
        assert_eq!(store.list_unpaid().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn paused_subscriptions_are_not_billed() {
        let store = Arc::new(MemoryStore::new());
        let daily = seeded_plan(&store, dec!(120.00)).await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, daily.id, day(2025, 1, 1))
            .await
            .unwrap();
        store.pause_all_active(customer).await.unwrap();

        let engine = BillingEngine::new(store.clone(), store.clone());
        let written = engine.generate_bills(month(2025, 2)).await.unwrap();

        assert_eq!(written, 0);
        assert!(store
            .find_bill(customer, month(2025, 2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn exact_payment_settles_the_bill_and_one_cent_short_does_not() {
        let store = Arc::new(MemoryStore::new());
        let engine = BillingEngine::new(store.clone(), store.clone());
        let customer = Uuid::new_v4();
        let bill = store
            .upsert_bill(customer, month(2025, 3), dec!(165.50))
            .await
            .unwrap();

        engine
            .record_payment(bill.id, dec!(165.49), PaymentMode::Cash, None)
            .await
            .unwrap();
        assert!(!store.get_bill(bill.id).await.unwrap().unwrap().is_paid);

        engine
            .record_payment(bill.id, dec!(0.01), PaymentMode::Cash, None)
            .await
            .unwrap();
        assert!(store.get_bill(bill.id).await.unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn cheque_payments_require_a_cheque_number() {
        let store = Arc::new(MemoryStore::new());
        let engine = BillingEngine::new(store.clone(), store.clone());
        let bill = store
            .upsert_bill(Uuid::new_v4(), month(2025, 3), dec!(100.00))
            .await
            .unwrap();

        let missing = engine
            .record_payment(bill.id, dec!(100.00), PaymentMode::Cheque, None)
            .await;
        assert!(matches!(missing, Err(CoreError::InvalidInput(_))));

        let payment = engine
            .record_payment(
                bill.id,
                dec!(100.00),
                PaymentMode::Cheque,
                Some("CHQ-778123".into()),
            )
            .await
            .unwrap();
        assert!(payment.receipt_no.starts_with("RCP-"));
    }

    #[tokio::test]
    async fn cash_payments_accept_a_stray_cheque_number() {
        let store = Arc::new(MemoryStore::new());
        let engine = BillingEngine::new(store.clone(), store.clone());
        let bill = store
            .upsert_bill(Uuid::new_v4(), month(2025, 3), dec!(50.00))
            .await
            .unwrap();

        let payment = engine
            .record_payment(
                bill.id,
                dec!(50.00),
                PaymentMode::Cash,
                Some("CHQ-990001".into()),
            )
            .await
            .unwrap();

        assert_eq!(payment.cheque_no.as_deref(), Some("CHQ-990001"));
        assert!(store.get_bill(bill.id).await.unwrap().unwrap().is_paid);
    }

    #[tokio::test]
    async fn sweep_stops_customers_two_months_overdue_but_not_one() {
        let store = Arc::new(MemoryStore::new());
        let daily = seeded_plan(&store, dec!(120.00)).await;

        let late = Uuid::new_v4();
        let recent = Uuid::new_v4();
        store
            .ensure_active(late, daily.id, day(2025, 1, 1))
            .await
            .unwrap();
        store
            .ensure_active(recent, daily.id, day(2025, 1, 1))
            .await
            .unwrap();
        store
            .upsert_bill(late, month(2025, 1), dec!(120.00))
            .await
            .unwrap();
        store
            .upsert_bill(recent, month(2025, 2), dec!(120.00))
            .await
            .unwrap();

        let engine = BillingEngine::new(store.clone(), store.clone());
        let outcome = engine.sweep_overdue(day(2025, 3, 5)).await.unwrap();

        assert_eq!(outcome.overdue_bills, 1);
        assert_eq!(outcome.subscriptions_stopped, 1);
        let late_subs = store.list_for_customer(late).await.unwrap();
        assert_eq!(late_subs[0].status, SubscriptionStatus::Stopped);
        let recent_subs = store.list_for_customer(recent).await.unwrap();
        assert_eq!(recent_subs[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn sweep_is_idempotent_once_everyone_is_stopped() {
        let store = Arc::new(MemoryStore::new());
        let daily = seeded_plan(&store, dec!(120.00)).await;
        let customer = Uuid::new_v4();
        store
            .ensure_active(customer, daily.id, day(2025, 1, 1))
            .await
            .unwrap();
        store
            .upsert_bill(customer, month(2025, 1), dec!(120.00))
            .await
            .unwrap();

        let engine = BillingEngine::new(store.clone(), store.clone());
        let first = engine.sweep_overdue(day(2025, 3, 5)).await.unwrap();
        let second = engine.sweep_overdue(day(2025, 3, 6)).await.unwrap();

        assert_eq!(first.subscriptions_stopped, 1);
        assert_eq!(second.subscriptions_stopped, 0);
        assert_eq!(second.overdue_bills, 1);
    }

    #[tokio::test]
    async fn non_positive_payments_are_refused() {
        let store = Arc::new(MemoryStore::new());
        let engine = BillingEngine::new(store.clone(), store.clone());
        let bill = store
            .upsert_bill(Uuid::new_v4(), month(2025, 3), dec!(100.00))
            .await
            .unwrap();

        let zero = engine
            .record_payment(bill.id, Decimal::ZERO, PaymentMode::Cash, None)
            .await;
        assert!(matches!(zero, Err(CoreError::InvalidInput(_))));
    }
}
