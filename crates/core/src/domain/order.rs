use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a purchase order in the host system.
///
/// `Pending` is the open "awaiting approval" state; `Placed` is only
/// reachable once the approval workflow has signed off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Pending,
    Placed,
    OnHold,
    Complete,
    Cancelled,
    Lost,
    Returned,
}

impl OrderStatus {
    /// Open statuses are the ones worth scanning for pending approvals.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Placed | Self::OnHold)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Placed => "placed",
            Self::OnHold => "on_hold",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Lost => "lost",
            Self::Returned => "returned",
        }
    }
}

/// Snapshot of a purchase order as seen by the approval workflow.
///
/// The host owns the record; the workflow only reads identity, status and
/// total, and owns one namespaced metadata key on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub reference: String,
    pub supplier: Option<String>,
    pub total: Option<Decimal>,
    pub status: OrderStatus,
}

impl Order {
    /// An order with no priced total is never treated as high value.
    pub fn is_high_value(&self, threshold: Decimal) -> bool {
        self.total.map(|total| total >= threshold).unwrap_or(false)
    }
}
