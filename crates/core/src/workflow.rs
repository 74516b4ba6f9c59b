//! The approval state machine.
//!
//! Per-order state is derived from the ledger, never stored on its own:
//! no entries and no approval means no active request, a pending entry means
//! a decision is awaited, and one approved entry means the order is fully
//! approved. `request` and `decide` are the only mutations; every other
//! operation is a pure projection over the ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::collab::{
    Channel, Notification, NotificationDispatcher, NotificationEvent, OrderGateway, StoreError,
    UserDirectory,
};
use crate::config::{ApprovalSettings, NotificationSettings};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::user::{DirectoryUser, UserId, UserRef};
use crate::ledger::{ApprovalLedger, ApprovalRequest, ApprovalSummary};
use crate::policy::{DecisionDenial, EligibilityPolicy, PolicyRules, RequestDenial};
use crate::store::LedgerStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Purchase order not found")]
    OrderNotFound,
    #[error("No pending approval request")]
    NoPendingRequest,
    #[error("{0}")]
    IneligibleRequest(RequestDenial),
    #[error("{0}")]
    IneligibleDecision(DecisionDenial),
    #[error("Invalid approver ID")]
    InvalidApprover,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-viewer status view for one order, the payload behind the status
/// endpoint and the approvals panel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStatusView {
    pub order_id: OrderId,
    pub order_reference: String,
    pub order_status: OrderStatus,
    pub order_total: Option<Decimal>,
    pub is_high_value: bool,
    pub can_request: bool,
    pub can_request_reason: Option<String>,
    pub user_can_decide: bool,
    pub user_can_decide_reason: Option<String>,
    #[serde(flatten)]
    pub summary: ApprovalSummary,
}

/// One row in the fan-out pending-work views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub order_id: OrderId,
    pub order_reference: String,
    pub order_total: Option<Decimal>,
    pub supplier: Option<String>,
    pub level: u32,
    pub requested_by: UserRef,
    pub requested_at: DateTime<Utc>,
    pub is_high_value: bool,
}

pub struct ApprovalWorkflow<G, D, N> {
    gateway: Arc<G>,
    store: LedgerStore<G>,
    directory: D,
    dispatcher: N,
    policy: EligibilityPolicy,
    approvals: ApprovalSettings,
    notifications: NotificationSettings,
}

impl<G, D, N> ApprovalWorkflow<G, D, N>
where
    G: OrderGateway,
    D: UserDirectory,
    N: NotificationDispatcher,
{
    pub fn new(
        gateway: Arc<G>,
        directory: D,
        dispatcher: N,
        approvals: ApprovalSettings,
        notifications: NotificationSettings,
    ) -> Self {
        let policy = EligibilityPolicy::new(PolicyRules {
            high_value_threshold: approvals.high_value_threshold,
            senior_approver_names: approvals.senior_approver_names.clone(),
        });

        Self {
            store: LedgerStore::new(gateway.clone()),
            gateway,
            directory,
            dispatcher,
            policy,
            approvals,
            notifications,
        }
    }

    /// Creates a new approval request for the order.
    ///
    /// The caller is responsible for having already authorized the requester
    /// to modify the order; this operation only enforces workflow rules.
    pub async fn request(
        &self,
        order_id: &OrderId,
        requester: UserRef,
        requested_approver_id: Option<UserId>,
        notes: &str,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let order = self.find_order(order_id).await?;

        // Resolve the named approver up front; a missing or deactivated
        // target is an input error, not a workflow-rule failure.
        let approver = match requested_approver_id {
            Some(id) => Some(
                self.directory
                    .find_user(id)
                    .await?
                    .filter(|user| user.active)
                    .ok_or(WorkflowError::InvalidApprover)?,
            ),
            None => None,
        };

        let lock = self.store.lock_for(order_id);
        let guard = lock.lock().await;

        let mut ledger = self.store.load(order_id).await?;
        self.policy.can_request(&order, &ledger).map_err(WorkflowError::IneligibleRequest)?;

        let entry = ledger
            .append_request(
                requester,
                approver.as_ref().map(DirectoryUser::as_ref),
                notes,
                Utc::now(),
            )
            .map_err(StoreError::from)?
            .clone();
        self.store.save(order_id, &ledger).await?;
        drop(guard);

        info!(
            order = %order_id,
            level = entry.level,
            requested_by = %entry.requested_by.id,
            targeted = entry.requested_approver.is_some(),
            "approval requested"
        );

        // Notification strictly follows the committed mutation and never
        // affects the result. A named approver with an email address gets
        // mail; an untargeted request is broadcast to the configured
        // webhook, if any.
        let channel = match &approver {
            Some(user) => match &user.email {
                Some(email) => Channel::Email(email.clone()),
                None => Channel::None,
            },
            None => match &self.notifications.webhook_url {
                Some(url) => Channel::Webhook(url.clone()),
                None => Channel::None,
            },
        };
        self.notify(Notification {
            channel,
            event: NotificationEvent::ApprovalRequested {
                order,
                request: entry.clone(),
                target: entry.requested_approver.clone(),
            },
        })
        .await;

        Ok(entry)
    }

    /// Records the actor's decision on the sole pending request.
    ///
    /// Rejection leaves the rejected entry in history and clears the pending
    /// state, so a fresh request is immediately possible.
    pub async fn decide(
        &self,
        order_id: &OrderId,
        actor: UserRef,
        approved: bool,
        notes: &str,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let order = self.find_order(order_id).await?;
        let senior_ids = self.resolve_senior_ids().await?;

        let lock = self.store.lock_for(order_id);
        let guard = lock.lock().await;

        let mut ledger = self.store.load(order_id).await?;
        self.policy.can_decide(actor.id, &order, &ledger, &senior_ids).map_err(|denial| {
            match denial {
                DecisionDenial::NoPendingRequest => WorkflowError::NoPendingRequest,
                other => WorkflowError::IneligibleDecision(other),
            }
        })?;

        let entry = ledger
            .decide_pending(actor, approved, notes, Utc::now())
            .map_err(StoreError::from)?
            .clone();
        self.store.save(order_id, &ledger).await?;
        drop(guard);

        info!(
            order = %order_id,
            level = entry.level,
            approved,
            decided_by = entry.actual_approver.as_ref().map(|user| user.id.0),
            "approval decided"
        );

        // The requester gets told about the outcome, by mail when possible.
        // The decision is already committed at this point, so a failed
        // lookup only costs the notification, never the result.
        let channel = match self.directory.find_user(entry.requested_by.id).await {
            Ok(Some(DirectoryUser { email: Some(email), .. })) => Channel::Email(email),
            Ok(_) => Channel::None,
            Err(error) => {
                warn!(
                    order = %order_id,
                    requested_by = %entry.requested_by.id,
                    %error,
                    "requester lookup failed, decision notification skipped"
                );
                Channel::None
            }
        };
        self.notify(Notification {
            channel,
            event: NotificationEvent::ApprovalDecided {
                order,
                request: entry.clone(),
                approved,
            },
        })
        .await;

        Ok(entry)
    }

    pub async fn summary(&self, order_id: &OrderId) -> Result<ApprovalSummary, WorkflowError> {
        self.find_order(order_id).await?;
        Ok(self.store.load(order_id).await?.summary())
    }

    pub async fn approved_count(&self, order_id: &OrderId) -> Result<u32, WorkflowError> {
        self.find_order(order_id).await?;
        Ok(self.store.load(order_id).await?.approved_count())
    }

    pub async fn pending_entry(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalRequest>, WorkflowError> {
        self.find_order(order_id).await?;
        Ok(self.store.load(order_id).await?.pending_entry().cloned())
    }

    pub async fn is_fully_approved(&self, order_id: &OrderId) -> Result<bool, WorkflowError> {
        self.find_order(order_id).await?;
        Ok(self.store.load(order_id).await?.is_fully_approved())
    }

    /// Host-side gate: may this order move to `Placed`? Always true when the
    /// workflow is disabled in configuration.
    pub async fn can_place(&self, order_id: &OrderId) -> Result<bool, WorkflowError> {
        if !self.approvals.enabled {
            return Ok(true);
        }
        self.is_fully_approved(order_id).await
    }

    /// Per-viewer status view: the aggregate summary plus what this viewer
    /// may do about it.
    pub async fn status(
        &self,
        order_id: &OrderId,
        viewer: UserId,
    ) -> Result<ApprovalStatusView, WorkflowError> {
        let order = self.find_order(order_id).await?;
        let ledger = self.store.load(order_id).await?;
        let senior_ids = self.resolve_senior_ids().await?;

        let can_request = self.policy.can_request(&order, &ledger);
        let can_decide = self.policy.can_decide(viewer, &order, &ledger, &senior_ids);

        Ok(ApprovalStatusView {
            order_id: order.id.clone(),
            order_reference: order.reference.clone(),
            order_status: order.status,
            order_total: order.total,
            is_high_value: self.policy.is_high_value(&order),
            can_request: can_request.is_ok(),
            can_request_reason: can_request.err().map(|denial| denial.to_string()),
            user_can_decide: can_decide.is_ok(),
            user_can_decide_reason: can_decide.err().map(|denial| denial.to_string()),
            summary: ledger.summary(),
        })
    }

    /// Open orders whose pending request this actor is eligible to decide.
    pub async fn pending_for_actor(
        &self,
        actor: UserId,
    ) -> Result<Vec<PendingReview>, WorkflowError> {
        let senior_ids = self.resolve_senior_ids().await?;
        let mut reviews = Vec::new();

        for order in self.gateway.list_open_orders().await? {
            let ledger = self.store.load(&order.id).await?;
            if ledger.pending_entry().is_none() {
                continue;
            }
            if self.policy.can_decide(actor, &order, &ledger, &senior_ids).is_ok() {
                reviews.push(self.review_row(&order, &ledger));
            }
        }

        Ok(reviews)
    }

    /// Open orders with a pending request that is not high-value, i.e. work
    /// any approver may pick up.
    pub async fn pending_any_approver(&self) -> Result<Vec<PendingReview>, WorkflowError> {
        let mut reviews = Vec::new();

        for order in self.gateway.list_open_orders().await? {
            if self.policy.is_high_value(&order) {
                continue;
            }
            let ledger = self.store.load(&order.id).await?;
            if ledger.pending_entry().is_some() {
                reviews.push(self.review_row(&order, &ledger));
            }
        }

        Ok(reviews)
    }

    /// Active users who may be named as approver for this order, excluding
    /// the caller. High-value orders narrow the list to the senior set when
    /// one is configured.
    pub async fn eligible_approvers(
        &self,
        order_id: &OrderId,
        excluding: UserId,
    ) -> Result<Vec<DirectoryUser>, WorkflowError> {
        let order = self.find_order(order_id).await?;
        let mut users = self.directory.list_active_users().await?;
        users.retain(|user| user.id != excluding);

        if self.policy.is_high_value(&order) {
            let senior_ids = self.resolve_senior_ids().await?;
            if !senior_ids.is_empty() {
                users.retain(|user| senior_ids.contains(&user.id));
            }
        }

        Ok(users)
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Order, WorkflowError> {
        self.gateway.find_order(order_id).await?.ok_or(WorkflowError::OrderNotFound)
    }

    async fn resolve_senior_ids(&self) -> Result<HashSet<UserId>, WorkflowError> {
        let names = &self.policy.rules().senior_approver_names;
        if names.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self.directory.find_active_ids_by_username(names).await?.into_iter().collect())
    }

    fn review_row(&self, order: &Order, ledger: &ApprovalLedger) -> PendingReview {
        let pending = ledger.pending_entry().expect("caller checked for a pending entry");
        PendingReview {
            order_id: order.id.clone(),
            order_reference: order.reference.clone(),
            order_total: order.total,
            supplier: order.supplier.clone(),
            level: pending.level,
            requested_by: pending.requested_by.clone(),
            requested_at: pending.requested_at,
            is_high_value: self.policy.is_high_value(order),
        }
    }

    async fn notify(&self, notification: Notification) {
        if !self.notifications.enabled {
            return;
        }
        self.dispatcher.dispatch(notification).await;
    }
}
