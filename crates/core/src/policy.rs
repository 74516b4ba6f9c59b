use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{Order, OrderStatus};
use crate::domain::user::UserId;
use crate::ledger::{ApprovalLedger, REQUIRED_APPROVALS};

/// Why a new approval request may not be created right now.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestDenial {
    #[error("Order must be in PENDING status to request approval")]
    OrderNotOpen { status: OrderStatus },
    #[error("There is already a pending approval request")]
    PendingExists,
    #[error("Order is already fully approved")]
    AlreadyApproved,
}

/// Why a given actor may not decide the pending request.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionDenial {
    #[error("No pending approval request")]
    NoPendingRequest,
    #[error("You cannot approve your own request")]
    SelfApproval,
    #[error("You are not the requested approver for this request")]
    NotRequestedApprover,
    #[error("Only senior approvers can approve high-value orders")]
    SeniorApproverRequired,
}

/// Injected policy configuration. Senior approvers are configured by
/// username; callers resolve the usernames to active user ids through the
/// directory before asking for a decision check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRules {
    pub high_value_threshold: Decimal,
    pub senior_approver_names: Vec<String>,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self { high_value_threshold: Decimal::new(10_000, 0), senior_approver_names: Vec::new() }
    }
}

/// Stateless eligibility checks over (actor, order, ledger, configuration).
/// Both checks are pure: calling them repeatedly without a mutation in
/// between returns identical results.
#[derive(Clone, Debug, Default)]
pub struct EligibilityPolicy {
    rules: PolicyRules,
}

impl EligibilityPolicy {
    pub fn new(rules: PolicyRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PolicyRules {
        &self.rules
    }

    pub fn is_high_value(&self, order: &Order) -> bool {
        order.is_high_value(self.rules.high_value_threshold)
    }

    /// May a new approval request be created for this order?
    pub fn can_request(
        &self,
        order: &Order,
        ledger: &ApprovalLedger,
    ) -> Result<(), RequestDenial> {
        if order.status != OrderStatus::Pending {
            return Err(RequestDenial::OrderNotOpen { status: order.status });
        }

        if ledger.pending_entry().is_some() {
            return Err(RequestDenial::PendingExists);
        }

        if ledger.approved_count() >= REQUIRED_APPROVALS {
            return Err(RequestDenial::AlreadyApproved);
        }

        Ok(())
    }

    /// May this actor decide the pending request?
    ///
    /// `senior_ids` is the configured senior approver set resolved to active
    /// user ids; an empty set means high-value gating is not enforced.
    pub fn can_decide(
        &self,
        actor: UserId,
        order: &Order,
        ledger: &ApprovalLedger,
        senior_ids: &HashSet<UserId>,
    ) -> Result<(), DecisionDenial> {
        let pending = ledger.pending_entry().ok_or(DecisionDenial::NoPendingRequest)?;

        if pending.requested_by.id == actor {
            return Err(DecisionDenial::SelfApproval);
        }

        if let Some(requested) = &pending.requested_approver {
            if requested.id != actor {
                return Err(DecisionDenial::NotRequestedApprover);
            }
        }

        if self.is_high_value(order) && !senior_ids.is_empty() && !senior_ids.contains(&actor) {
            return Err(DecisionDenial::SeniorApproverRequired);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::order::{Order, OrderId, OrderStatus};
    use crate::domain::user::{UserId, UserRef};
    use crate::ledger::ApprovalLedger;

    use super::{DecisionDenial, EligibilityPolicy, PolicyRules, RequestDenial};

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::new(PolicyRules {
            high_value_threshold: Decimal::new(10_000, 0),
            senior_approver_names: vec!["alice".to_string()],
        })
    }

    fn order(total: i64, status: OrderStatus) -> Order {
        Order {
            id: OrderId("PO-0001".to_string()),
            reference: "PO-0001".to_string(),
            supplier: None,
            total: Some(Decimal::new(total, 0)),
            status,
        }
    }

    fn bob() -> UserRef {
        UserRef::new(UserId(1), "Bob")
    }

    fn ledger_with_pending(requested_approver: Option<UserRef>) -> ApprovalLedger {
        let mut ledger = ApprovalLedger::new();
        ledger.append_request(bob(), requested_approver, "", Utc::now()).expect("append");
        ledger
    }

    #[test]
    fn request_allowed_on_open_empty_ledger() {
        let result = policy().can_request(&order(5_000, OrderStatus::Pending), &ApprovalLedger::new());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn request_denied_unless_order_is_pending() {
        for status in [OrderStatus::Draft, OrderStatus::Placed, OrderStatus::Cancelled] {
            let result = policy().can_request(&order(5_000, status), &ApprovalLedger::new());
            assert_eq!(result, Err(RequestDenial::OrderNotOpen { status }));
        }
    }

    #[test]
    fn request_denied_while_another_is_pending() {
        let result =
            policy().can_request(&order(5_000, OrderStatus::Pending), &ledger_with_pending(None));
        assert_eq!(result, Err(RequestDenial::PendingExists));
    }

    #[test]
    fn request_denied_once_fully_approved() {
        let mut ledger = ledger_with_pending(None);
        ledger.decide_pending(UserRef::new(UserId(2), "Carol"), true, "", Utc::now()).expect("decide");

        let result = policy().can_request(&order(5_000, OrderStatus::Pending), &ledger);
        assert_eq!(result, Err(RequestDenial::AlreadyApproved));
    }

    #[test]
    fn request_allowed_again_after_rejection() {
        let mut ledger = ledger_with_pending(None);
        ledger.decide_pending(UserRef::new(UserId(2), "Carol"), false, "", Utc::now()).expect("decide");

        let result = policy().can_request(&order(5_000, OrderStatus::Pending), &ledger);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn decide_requires_a_pending_entry() {
        let result = policy().can_decide(
            UserId(2),
            &order(5_000, OrderStatus::Pending),
            &ApprovalLedger::new(),
            &HashSet::new(),
        );
        assert_eq!(result, Err(DecisionDenial::NoPendingRequest));
    }

    #[test]
    fn self_approval_is_always_denied() {
        // Even a senior approver deciding a targeted request cannot be the
        // requester.
        let ledger = ledger_with_pending(Some(bob()));
        let senior: HashSet<_> = [UserId(1)].into();

        let result =
            policy().can_decide(UserId(1), &order(15_000, OrderStatus::Pending), &ledger, &senior);
        assert_eq!(result, Err(DecisionDenial::SelfApproval));
    }

    #[test]
    fn targeted_request_only_decidable_by_named_approver() {
        let carol = UserRef::new(UserId(2), "Carol");
        let ledger = ledger_with_pending(Some(carol));
        let open_order = order(5_000, OrderStatus::Pending);

        assert_eq!(
            policy().can_decide(UserId(3), &open_order, &ledger, &HashSet::new()),
            Err(DecisionDenial::NotRequestedApprover)
        );
        assert_eq!(policy().can_decide(UserId(2), &open_order, &ledger, &HashSet::new()), Ok(()));
    }

    #[test]
    fn high_value_order_requires_senior_approver() {
        let ledger = ledger_with_pending(None);
        let senior: HashSet<_> = [UserId(9)].into();

        assert_eq!(
            policy().can_decide(UserId(2), &order(15_000, OrderStatus::Pending), &ledger, &senior),
            Err(DecisionDenial::SeniorApproverRequired)
        );
        assert_eq!(
            policy().can_decide(UserId(9), &order(15_000, OrderStatus::Pending), &ledger, &senior),
            Ok(())
        );
    }

    #[test]
    fn low_value_order_decidable_by_any_non_requester() {
        let ledger = ledger_with_pending(None);
        let senior: HashSet<_> = [UserId(9)].into();

        assert_eq!(
            policy().can_decide(UserId(2), &order(5_000, OrderStatus::Pending), &ledger, &senior),
            Ok(())
        );
    }

    #[test]
    fn empty_senior_set_disables_high_value_gating() {
        let ledger = ledger_with_pending(None);

        assert_eq!(
            policy().can_decide(
                UserId(2),
                &order(15_000, OrderStatus::Pending),
                &ledger,
                &HashSet::new()
            ),
            Ok(())
        );
    }

    #[test]
    fn eligibility_checks_are_idempotent() {
        let ledger = ledger_with_pending(None);
        let open_order = order(15_000, OrderStatus::Pending);
        let senior: HashSet<_> = [UserId(9)].into();

        let first = policy().can_decide(UserId(2), &open_order, &ledger, &senior);
        for _ in 0..3 {
            assert_eq!(policy().can_decide(UserId(2), &open_order, &ledger, &senior), first);
        }
    }
}
