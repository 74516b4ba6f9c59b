//! Approval workflow core for purchase orders.
//!
//! A requester asks for sign-off on an order, an eligible approver accepts
//! or rejects, and the order may only be placed once approved. The crate
//! owns the state machine and its rules; the host order store, the user
//! directory, and outbound notification channels are collaborators behind
//! the traits in [`collab`].

pub mod collab;
pub mod config;
pub mod domain;
pub mod ledger;
pub mod policy;
pub mod store;
pub mod workflow;

pub use collab::{
    Channel, InMemoryOrderGateway, InMemoryUserDirectory, Notification, NotificationDispatcher,
    NotificationEvent, OrderGateway, RecordingDispatcher, StoreError, UserDirectory,
};
pub use config::{AppConfig, ApprovalSettings, ConfigError, DatabaseConfig, NotificationSettings};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::user::{DirectoryUser, UserId, UserRef};
pub use ledger::{
    ApprovalLedger, ApprovalRequest, ApprovalStatus, ApprovalSummary, LedgerError, METADATA_KEY,
};
pub use policy::{DecisionDenial, EligibilityPolicy, PolicyRules, RequestDenial};
pub use store::{LedgerStore, OrderLocks};
pub use workflow::{ApprovalStatusView, ApprovalWorkflow, PendingReview, WorkflowError};
