//! Daily route generation and delivery commission. A route is the set of
//! delivery assignments for one person and one day, ordered by each
//! customer's address ordering key; completing a stop earns a fixed-rate
//! commission on the stop's value.

pub mod ordering;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use gazette_core::models::{
    Address, AssignmentStatus, DeliveryAssignment, DeliveryStats,
};
use gazette_core::month::MonthKey;
use gazette_core::repository::{AddressStore, BillStore, DeliveryStore, SubscriptionStore};
use gazette_core::{CoreError, CoreResult};
use ordering::cmp_route_keys;

/// Delivery commission as a fraction of the stop value.
pub const COMMISSION_RATE: Decimal = dec!(0.025);

/// One stop on a route: the assignment plus the address it delivers to.
#[derive(Debug, Clone, Serialize)]
pub struct RouteStop {
    pub assignment: DeliveryAssignment,
    pub address: Address,
}

pub struct RouteEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    addresses: Arc<dyn AddressStore>,
    bills: Arc<dyn BillStore>,
    deliveries: Arc<dyn DeliveryStore>,
}

impl RouteEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        addresses: Arc<dyn AddressStore>,
        bills: Arc<dyn BillStore>,
        deliveries: Arc<dyn DeliveryStore>,
    ) -> Self {
        Self {
            subscriptions,
            addresses,
            bills,
            deliveries,
        }
    }

    /// Build (or rebuild) the person's route for a day: one stop per customer
    /// with at least one active subscription and a canonical address.
    /// Rebuilding returns the existing assignments untouched, so a stop
    /// already delivered keeps its state.
    pub async fn build_daily_route(
        &self,
        delivery_person: Uuid,
        day: NaiveDate,
    ) -> CoreResult<Vec<RouteStop>> {
        let active = self.subscriptions.list_active_with_price().await?;

        let mut plan_totals: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for entry in active {
            *plan_totals
                .entry(entry.subscription.customer_id)
                .or_insert(Decimal::ZERO) += entry.plan_price;
        }

        let month = MonthKey::from_date(day);
        let mut stops = Vec::with_capacity(plan_totals.len());
        for (customer_id, plan_total) in plan_totals {
            let Some(address) = self.addresses.canonical_for(customer_id).await? else {
                debug!(%customer_id, "skipping customer without a canonical address");
                continue;
            };

            // The billed amount is authoritative once a bill exists; before
            // billing runs, the live plan total stands in.
            let value = match self.bills.find_bill(customer_id, month).await? {
                Some(bill) => bill.total_amount,
                None => plan_total,
            };

            let assignment = self
                .deliveries
                .create_or_fetch(DeliveryAssignment {
                    id: Uuid::new_v4(),
                    delivery_person,
                    customer_id,
                    address_id: address.id,
                    date: day,
                    status: AssignmentStatus::Pending,
                    value,
                    commission: None,
                    delivered_at: None,
                })
                .await?;
            stops.push(RouteStop {
                assignment,
                address,
            });
        }

        stops.sort_by(|a, b| cmp_route_keys(&a.address.ordering_key, &b.address.ordering_key));
        info!(%delivery_person, %day, stops = stops.len(), "daily route built");
        Ok(stops)
    }

    /// Read back an already-generated route in delivery order.
    pub async fn route_for_day(
        &self,
        delivery_person: Uuid,
        day: NaiveDate,
    ) -> CoreResult<Vec<RouteStop>> {
        let assignments = self.deliveries.list_for_day(delivery_person, day).await?;
        let mut stops = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let Some(address) = self.addresses.canonical_for(assignment.customer_id).await? else {
                debug!(assignment_id = %assignment.id, "assignment without a canonical address");
                continue;
            };
            stops.push(RouteStop {
                assignment,
                address,
            });
        }
        stops.sort_by(|a, b| cmp_route_keys(&a.address.ordering_key, &b.address.ordering_key));
        Ok(stops)
    }

    /// Mark a stop delivered. The status flip, the commission stamp, and the
    /// stats bump land atomically in the store; a stop can be delivered only
    /// once and only by its owner.
    pub async fn mark_delivered(
        &self,
        assignment_id: Uuid,
        delivery_person: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<DeliveryAssignment> {
        let assignment = self
            .deliveries
            .get_assignment(assignment_id)
            .await?
            .filter(|a| a.delivery_person == delivery_person)
            .ok_or_else(|| CoreError::NotFound("assignment not found".into()))?;

        // Kept exact: value carries 2 decimals and the rate 3, so the product
        // is exact at 5. Rounding here would make the running stats disagree
        // with the recomputed monthly figure.
        let commission = assignment.value * COMMISSION_RATE;
        let delivered = self
            .deliveries
            .complete_delivery(assignment_id, delivery_person, commission, now)
            .await?;
        info!(
            %assignment_id,
            %delivery_person,
            %commission,
            "delivery completed"
        );
        Ok(delivered)
    }

    /// Commission earned in a month: the fixed rate over the summed value of
    /// the person's delivered stops.
    pub async fn commission_for(
        &self,
        delivery_person: Uuid,
        month: MonthKey,
    ) -> CoreResult<Decimal> {
        let delivered_value = self
            .deliveries
            .delivered_value_total(delivery_person, month)
            .await?;
        Ok(delivered_value * COMMISSION_RATE)
    }

    pub async fn stats_for(&self, delivery_person: Uuid) -> CoreResult<DeliveryStats> {
        self.deliveries.stats_for(delivery_person).await
    }
}
