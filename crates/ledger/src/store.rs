use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pillcount_events::EventEnvelope;
use pillcount_medications::MedicationEvent;

use crate::history::HistoryEntry;

/// Point-in-time image of the ledger, handed to a persistence collaborator.
///
/// Carries the event journal rather than materialized records: a ledger is
/// rebuilt by replaying the journal (see `InventoryLedger::from_snapshot`),
/// so the snapshot stays append-only and needs no record-level schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub events: Vec<EventEnvelope<MedicationEvent>>,
    pub history: Vec<HistoryEntry>,
    pub taken_at: DateTime<Utc>,
}

/// Snapshot persistence error.
///
/// Infrastructure failures, separate from the domain taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot persistence failed: {0}")]
    Persist(String),

    #[error("snapshot load failed: {0}")]
    Load(String),
}

/// Durable storage collaborator for ledger snapshots.
///
/// `persist` must be commit-or-discard: a failed write leaves the
/// previously stored snapshot intact. On-disk format is the
/// implementation's concern; the ledger defines only in-memory invariants.
pub trait LedgerStore: Send + Sync {
    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError>;

    fn load(&self) -> Result<Option<LedgerSnapshot>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        (**self).persist(snapshot)
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        (**self).load()
    }
}

/// In-memory snapshot store.
///
/// Intended for tests/dev. The stored snapshot is replaced wholesale, so
/// commit-or-discard holds trivially.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    slot: RwLock<Option<LedgerSnapshot>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn persist(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| StoreError::Persist("lock poisoned".to_string()))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        let slot = self
            .slot
            .read()
            .map_err(|_| StoreError::Load("lock poisoned".to_string()))?;
        Ok(slot.clone())
    }
}
