use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// A purchasable subscription tier. Price changes only affect future billing
/// runs; bills already generated keep the total they were computed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Stopped,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Stopped => "stopped",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "stopped" => Ok(SubscriptionStatus::Stopped),
            other => Err(CoreError::InvalidInput(format!(
                "unknown subscription status '{other}'"
            ))),
        }
    }
}

/// A customer's standing entitlement to a plan. At most one Active
/// subscription may exist per (customer, plan); Stopped is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// A customer's canonical delivery address. The ordering key is a
/// house-number-derived string used only for route ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub line: String,
    pub ordering_key: String,
}

/// Tri-state outcome of a request. Pending requests are mutable; Approved and
/// Rejected are terminal and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Pending,
    Approved,
    Rejected,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Pending => "pending",
            Resolution::Approved => "approved",
            Resolution::Rejected => "rejected",
        }
    }
}

impl FromStr for Resolution {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Resolution::Pending),
            "approved" => Ok(Resolution::Approved),
            "rejected" => Ok(Resolution::Rejected),
            other => Err(CoreError::InvalidInput(format!(
                "unknown resolution '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Subscribe,
    Change,
    Pause,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Subscribe => "subscribe",
            RequestKind::Change => "change",
            RequestKind::Pause => "pause",
        }
    }
}

impl FromStr for RequestKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscribe" => Ok(RequestKind::Subscribe),
            "change" => Ok(RequestKind::Change),
            "pause" => Ok(RequestKind::Pause),
            other => Err(CoreError::InvalidInput(format!(
                "unknown request kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Remove,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Remove => "remove",
        }
    }
}

impl FromStr for ChangeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeAction::Add),
            "remove" => Ok(ChangeAction::Remove),
            other => Err(CoreError::InvalidInput(format!(
                "unknown change action '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub action: ChangeAction,
    pub effective_date: NaiveDate,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub resolution: Resolution,
    pub created_at: DateTime<Utc>,
}

/// One bill per (customer, month). `is_paid` flips true once cumulative
/// payments reach the total and never flips back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub month: crate::month::MonthKey,
    pub total_amount: Decimal,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Cash,
    Cheque,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Cheque => "cheque",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMode::Cash),
            "cheque" => Ok(PaymentMode::Cheque),
            other => Err(CoreError::InvalidInput(format!(
                "unknown payment mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub mode: PaymentMode,
    pub amount: Decimal,
    pub cheque_no: Option<String>,
    pub receipt_no: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Delivered,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssignmentStatus::Pending),
            "delivered" => Ok(AssignmentStatus::Delivered),
            other => Err(CoreError::InvalidInput(format!(
                "unknown assignment status '{other}'"
            ))),
        }
    }
}

/// One delivery obligation: one delivery person, one customer address, one
/// date. `value` is snapshotted at creation; commission and the delivered
/// timestamp are stamped on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    pub id: Uuid,
    pub delivery_person: Uuid,
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub date: NaiveDate,
    pub status: AssignmentStatus,
    pub value: Decimal,
    pub commission: Option<Decimal>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Closed,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Closed => "closed",
        }
    }
}

impl FromStr for ComplaintStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ComplaintStatus::Open),
            "in_progress" => Ok(ComplaintStatus::InProgress),
            "closed" => Ok(ComplaintStatus::Closed),
            other => Err(CoreError::InvalidInput(format!(
                "unknown complaint status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub message: String,
    pub status: ComplaintStatus,
    pub last_reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Running per-person totals, mutated only on delivery completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub delivery_person: Uuid,
    pub total_deliveries: i64,
    pub total_commission: Decimal,
}

impl DeliveryStats {
    pub fn empty(delivery_person: Uuid) -> Self {
        Self {
            delivery_person,
            total_deliveries: 0,
            total_commission: Decimal::ZERO,
        }
    }
}
