//! Authenticated principals and the role/capability policy. Role-to-permission
//! mapping lives here so handlers perform a single capability check instead of
//! scattered role comparisons.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Customer,
    Delivery,
    Cse,
    Sm,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Customer => "customer",
            Role::Delivery => "delivery",
            Role::Cse => "cse",
            Role::Sm => "sm",
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Role::Manager),
            "customer" => Ok(Role::Customer),
            "delivery" => Ok(Role::Delivery),
            "cse" => Ok(Role::Cse),
            "sm" => Ok(Role::Sm),
            other => Err(CoreError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// The identity the auth collaborator hands us after token validation.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if Policy::allows(self.role, capability) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "role '{}' may not {}",
                self.role.as_str(),
                capability.describe()
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SubmitRequests,
    ViewOwnSubscriptions,
    ResolveRequests,
    ListPendingRequests,
    GenerateBills,
    RecordPayments,
    SweepOverdue,
    ListUnpaidBills,
    WorkRoute,
    FileComplaints,
    HandleComplaints,
}

impl Capability {
    fn describe(&self) -> &'static str {
        match self {
            Capability::SubmitRequests => "submit requests",
            Capability::ViewOwnSubscriptions => "view subscriptions",
            Capability::ResolveRequests => "resolve requests",
            Capability::ListPendingRequests => "list pending requests",
            Capability::GenerateBills => "generate bills",
            Capability::RecordPayments => "record payments",
            Capability::SweepOverdue => "run the overdue sweep",
            Capability::ListUnpaidBills => "list unpaid bills",
            Capability::WorkRoute => "work a delivery route",
            Capability::FileComplaints => "file complaints",
            Capability::HandleComplaints => "handle complaints",
        }
    }
}

pub struct Policy;

impl Policy {
    pub fn allows(role: Role, capability: Capability) -> bool {
        matches!(
            (role, capability),
            (Role::Customer, Capability::SubmitRequests)
                | (Role::Customer, Capability::ViewOwnSubscriptions)
                | (Role::Customer, Capability::FileComplaints)
                | (Role::Sm, Capability::ResolveRequests)
                | (Role::Sm, Capability::ListPendingRequests)
                | (Role::Manager, Capability::GenerateBills)
                | (Role::Manager, Capability::RecordPayments)
                | (Role::Manager, Capability::SweepOverdue)
                | (Role::Manager, Capability::ListUnpaidBills)
                | (Role::Delivery, Capability::WorkRoute)
                | (Role::Cse, Capability::HandleComplaints)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "test".into(),
            role,
        }
    }

    #[test]
    fn sm_resolves_requests_and_nobody_else_does() {
        assert!(principal(Role::Sm).require(Capability::ResolveRequests).is_ok());
        for role in [Role::Manager, Role::Customer, Role::Delivery, Role::Cse] {
            let err = principal(role)
                .require(Capability::ResolveRequests)
                .unwrap_err();
            assert!(matches!(err, CoreError::Forbidden(_)));
        }
    }

    #[test]
    fn manager_owns_billing_operations() {
        let manager = principal(Role::Manager);
        assert!(manager.require(Capability::GenerateBills).is_ok());
        assert!(manager.require(Capability::SweepOverdue).is_ok());
        assert!(manager.require(Capability::WorkRoute).is_err());
    }
}
