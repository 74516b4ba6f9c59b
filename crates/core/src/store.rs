//! Typed access to the approval ledger stored as opaque order metadata.
//!
//! The host only offers a get/set pair for one JSON blob per order; this
//! module translates that blob to and from the strongly typed
//! [`ApprovalLedger`] and serializes mutations per order so the "at most one
//! pending entry" invariant holds under concurrent calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::collab::{OrderGateway, StoreError};
use crate::domain::order::OrderId;
use crate::ledger::{ApprovalLedger, METADATA_KEY};

/// Registry of per-order async locks. Locks are created on first use and
/// kept for the process lifetime; the set of distinct orders seen by one
/// process is small.
#[derive(Clone, Default)]
pub struct OrderLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl OrderLocks {
    pub fn for_order(&self, id: &OrderId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(id.0.clone()).or_default().clone()
    }
}

/// Approval record store: loads and saves one order's ledger through the
/// host metadata accessor. Mutating callers must hold the order's lock from
/// [`OrderLocks`] across the load-mutate-save span.
pub struct LedgerStore<G> {
    gateway: Arc<G>,
    locks: OrderLocks,
}

impl<G> LedgerStore<G>
where
    G: OrderGateway,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway, locks: OrderLocks::default() }
    }

    pub fn lock_for(&self, id: &OrderId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.for_order(id)
    }

    /// Absent metadata decodes to an empty ledger; a malformed or
    /// newer-schema blob is a decode error, never silently discarded.
    pub async fn load(&self, id: &OrderId) -> Result<ApprovalLedger, StoreError> {
        let blob = self.gateway.read_metadata(id, METADATA_KEY).await?;
        Ok(ApprovalLedger::from_metadata(blob)?)
    }

    pub async fn save(&self, id: &OrderId, ledger: &ApprovalLedger) -> Result<(), StoreError> {
        self.gateway.write_metadata(id, METADATA_KEY, ledger.to_metadata()).await
    }
}
