use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::UserRef;

/// Metadata key under which the ledger is stored on the host order record.
pub const METADATA_KEY: &str = "po_approvals";

/// Current on-disk schema version of the serialized ledger.
pub const LEDGER_SCHEMA_VERSION: u32 = 1;

/// Number of approvals required before an order counts as fully approved.
/// Single-tier today; `level` numbering anticipates raising this.
pub const REQUIRED_APPROVALS: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// One entry in an order's approval history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// 1-based; equals the count of prior approved entries plus one.
    pub level: u32,
    pub status: ApprovalStatus,
    pub requested_by: UserRef,
    /// `None` means any eligible approver may decide.
    pub requested_approver: Option<UserRef>,
    pub actual_approver: Option<UserRef>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub notes: String,
}

impl ApprovalRequest {
    /// Appends decision notes to the existing notes, newline-joined.
    /// Prior text is never replaced.
    fn append_notes(&mut self, notes: &str) {
        if notes.is_empty() {
            return;
        }
        if self.notes.is_empty() {
            self.notes = notes.to_string();
        } else {
            self.notes = format!("{}\n{}", self.notes, notes);
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("there is already a pending approval request")]
    PendingExists,
    #[error("no pending approval request")]
    NoPending,
    #[error("unsupported ledger schema version {0}")]
    UnsupportedSchema(u32),
    #[error("ledger metadata could not be decoded: {0}")]
    Decode(String),
}

/// Ordered approval history for one order, stored verbatim under its
/// [`METADATA_KEY`]. Insertion order is significant: it drives `level`
/// numbering and the approved count. Entries are never deleted; a rejected
/// entry is terminal and simply stops blocking new requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalLedger {
    pub schema_version: u32,
    pub entries: Vec<ApprovalRequest>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self { schema_version: LEDGER_SCHEMA_VERSION, entries: Vec::new() }
    }

    pub fn approved_count(&self) -> u32 {
        self.entries.iter().filter(|entry| entry.status == ApprovalStatus::Approved).count() as u32
    }

    pub fn is_fully_approved(&self) -> bool {
        self.approved_count() >= REQUIRED_APPROVALS
    }

    pub fn pending_entry(&self) -> Option<&ApprovalRequest> {
        self.entries.iter().find(|entry| entry.status == ApprovalStatus::Pending)
    }

    /// Level the next request would carry: prior approved count plus one.
    pub fn next_level(&self) -> u32 {
        self.approved_count() + 1
    }

    /// Appends a new pending entry. Guards the "at most one pending" invariant
    /// even though callers are expected to gate through the eligibility policy.
    pub fn append_request(
        &mut self,
        requested_by: UserRef,
        requested_approver: Option<UserRef>,
        notes: impl Into<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<&ApprovalRequest, LedgerError> {
        if self.pending_entry().is_some() {
            return Err(LedgerError::PendingExists);
        }

        self.entries.push(ApprovalRequest {
            level: self.next_level(),
            status: ApprovalStatus::Pending,
            requested_by,
            requested_approver,
            actual_approver: None,
            requested_at,
            decided_at: None,
            notes: notes.into(),
        });

        Ok(self.entries.last().expect("entry was just pushed"))
    }

    /// Records a decision on the sole pending entry, mutating it in place.
    /// Once decided the entry is immutable.
    pub fn decide_pending(
        &mut self,
        actor: UserRef,
        approved: bool,
        notes: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<&ApprovalRequest, LedgerError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.status == ApprovalStatus::Pending)
            .ok_or(LedgerError::NoPending)?;

        let entry = &mut self.entries[index];
        entry.status =
            if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
        entry.actual_approver = Some(actor);
        entry.decided_at = Some(decided_at);
        entry.append_notes(notes);

        Ok(&self.entries[index])
    }

    /// Decodes the ledger from the opaque host metadata blob. An absent blob
    /// yields an empty ledger; a blob written by a newer schema is refused.
    pub fn from_metadata(blob: Option<serde_json::Value>) -> Result<Self, LedgerError> {
        let Some(blob) = blob else {
            return Ok(Self::new());
        };

        let ledger: Self = serde_json::from_value(blob)
            .map_err(|error| LedgerError::Decode(error.to_string()))?;

        if ledger.schema_version > LEDGER_SCHEMA_VERSION {
            return Err(LedgerError::UnsupportedSchema(ledger.schema_version));
        }

        Ok(ledger)
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ledger serializes to JSON")
    }

    pub fn summary(&self) -> ApprovalSummary {
        let pending = self.pending_entry();
        let approved_count = self.approved_count();

        ApprovalSummary {
            total_required: REQUIRED_APPROVALS,
            approved_count,
            is_fully_approved: approved_count >= REQUIRED_APPROVALS,
            has_pending: pending.is_some(),
            pending_level: pending.map(|entry| entry.level),
            pending_approver: pending.and_then(|entry| entry.requested_approver.clone()),
            can_request_more: approved_count < REQUIRED_APPROVALS && pending.is_none(),
            entries: self.entries.clone(),
        }
    }
}

/// Aggregate view over one order's approval history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub total_required: u32,
    pub approved_count: u32,
    pub is_fully_approved: bool,
    pub has_pending: bool,
    pub pending_level: Option<u32>,
    pub pending_approver: Option<UserRef>,
    pub can_request_more: bool,
    pub entries: Vec<ApprovalRequest>,
}
