use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pillcount_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Quantity, UnitDelta,
};
use pillcount_events::EventEnvelope;
use pillcount_medications::{
    AdjustContainers, AdjustLooseUnits, CountSource, MedicationCommand, MedicationEvent,
    MedicationId, MedicationRecord, ReconcileCount, RegisterMedication,
};

use crate::history::HistoryEntry;
use crate::store::LedgerSnapshot;

const MEDICATION_AGGREGATE: &str = "medication";

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<MedicationId, MedicationRecord>,
    /// Registration order, for deterministic search results.
    order: Vec<MedicationId>,
    history: Vec<HistoryEntry>,
    journal: Vec<EventEnvelope<MedicationEvent>>,
}

/// The inventory ledger: medication totals plus an auditable count history.
///
/// All interior state sits behind one `RwLock`, which serializes every
/// mutation. That is strictly stronger than the required per-medication
/// serialization, and plenty for a cooperative single-owner model.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    state: RwLock<LedgerState>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger by replaying a persisted snapshot's event journal.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let mut state = LedgerState {
            history: snapshot.history,
            ..LedgerState::default()
        };

        for envelope in &snapshot.events {
            let medication_id = MedicationId::new(envelope.aggregate_id());
            if !state.records.contains_key(&medication_id) {
                state.order.push(medication_id);
                state
                    .records
                    .insert(medication_id, MedicationRecord::empty(medication_id));
            }
            if let Some(record) = state.records.get_mut(&medication_id) {
                record.apply(envelope.payload());
            }
        }
        state.journal = snapshot.events;

        Self {
            state: RwLock::new(state),
        }
    }

    // Lock poisoning cannot leave the books inconsistent: commands are
    // decided without mutation and applied infallibly, so the state a
    // panicking thread leaves behind is always a committed one.
    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new medication with empty stock.
    pub fn register_medication(
        &self,
        name: impl Into<String>,
        dosage: impl Into<String>,
        units_per_container: u32,
    ) -> DomainResult<MedicationRecord> {
        self.register_medication_with_code(name, dosage, None, units_per_container)
    }

    /// Register a new medication, optionally recording the product barcode
    /// entered at registration.
    pub fn register_medication_with_code(
        &self,
        name: impl Into<String>,
        dosage: impl Into<String>,
        product_code: Option<String>,
        units_per_container: u32,
    ) -> DomainResult<MedicationRecord> {
        let medication_id = MedicationId::new(AggregateId::new());
        let cmd = MedicationCommand::RegisterMedication(RegisterMedication {
            medication_id,
            name: name.into(),
            dosage: dosage.into(),
            product_code,
            units_per_container,
            occurred_at: Utc::now(),
        });

        let mut record = MedicationRecord::empty(medication_id);
        let events = record.handle(&cmd)?;

        let mut state = self.write();
        commit(&mut state, &mut record, events);
        state.order.push(medication_id);
        state.records.insert(medication_id, record.clone());

        tracing::info!(%medication_id, name = record.name(), "registered medication");
        Ok(record)
    }

    /// Adjust the number of full containers held. Appends a manual history
    /// entry capturing the resulting total.
    pub fn adjust_containers(
        &self,
        medication_id: MedicationId,
        delta: i64,
    ) -> DomainResult<MedicationRecord> {
        let occurred_at = Utc::now();
        let cmd = MedicationCommand::AdjustContainers(AdjustContainers {
            medication_id,
            delta,
            occurred_at,
        });

        let record = self.mutate(medication_id, cmd, |state, record| {
            state.history.push(HistoryEntry::attributed(
                record,
                record.total(),
                CountSource::Manual,
                occurred_at,
            ));
        })?;

        tracing::debug!(%medication_id, delta, total = %record.total(), "adjusted containers");
        Ok(record)
    }

    /// Adjust the loose-unit pool by a half-unit-granular delta. Appends a
    /// manual history entry capturing the resulting total.
    pub fn adjust_loose_units(
        &self,
        medication_id: MedicationId,
        delta: UnitDelta,
    ) -> DomainResult<MedicationRecord> {
        let occurred_at = Utc::now();
        let cmd = MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
            medication_id,
            delta,
            occurred_at,
        });

        let record = self.mutate(medication_id, cmd, |state, record| {
            state.history.push(HistoryEntry::attributed(
                record,
                record.total(),
                CountSource::Manual,
                occurred_at,
            ));
        })?;

        tracing::debug!(%medication_id, %delta, total = %record.total(), "adjusted loose units");
        Ok(record)
    }

    /// Loose-unit adjustment from a raw unit count; fails with
    /// `InvalidGranularity` when the value is not a multiple of 0.5.
    pub fn adjust_loose_units_f64(
        &self,
        medication_id: MedicationId,
        delta_units: f64,
    ) -> DomainResult<MedicationRecord> {
        let delta = UnitDelta::try_from_units(delta_units)?;
        self.adjust_loose_units(medication_id, delta)
    }

    /// Reconcile a count event against the ledger.
    ///
    /// An absent `medication_id` yields an unattributed history entry (not
    /// an error); a present-but-unknown id is `UnknownMedication`. The
    /// estimate is untrusted: negative or non-finite input fails with
    /// `Validation`, and anything off the half-unit grid is rounded.
    pub fn reconcile_count(
        &self,
        medication_id: Option<MedicationId>,
        estimated_units: f64,
        source: CountSource,
    ) -> DomainResult<HistoryEntry> {
        if source == CountSource::Manual {
            return Err(DomainError::validation(
                "manual counts adjust containers and loose units directly",
            ));
        }

        let estimated = Quantity::from_units_rounded(estimated_units)?;
        let occurred_at = Utc::now();

        let Some(medication_id) = medication_id else {
            let entry = HistoryEntry::unattributed(estimated, source, occurred_at);
            self.write().history.push(entry.clone());
            tracing::debug!(%source, count = %estimated, "recorded unattributed count");
            return Ok(entry);
        };

        let cmd = MedicationCommand::ReconcileCount(ReconcileCount {
            medication_id,
            estimated,
            source,
            occurred_at,
        });

        let mut reconciled: Option<HistoryEntry> = None;
        self.mutate(medication_id, cmd, |state, record| {
            let entry = HistoryEntry::attributed(record, record.total(), source, occurred_at);
            state.history.push(entry.clone());
            reconciled = Some(entry);
        })?;

        // The closure always runs when mutate succeeds.
        let entry = reconciled
            .ok_or_else(|| DomainError::validation("reconciliation produced no history entry"))?;

        tracing::debug!(%medication_id, %source, count = %entry.count(), "reconciled count");
        Ok(entry)
    }

    /// Look up a single medication.
    pub fn get(&self, medication_id: MedicationId) -> Option<MedicationRecord> {
        self.read().records.get(&medication_id).cloned()
    }

    /// Resolve a scanned product code to its medication, if registered.
    pub fn find_by_product_code(&self, code: &str) -> Option<MedicationRecord> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .find(|record| record.product_code() == Some(code))
            .cloned()
    }

    /// All medications in registration order.
    pub fn medications(&self) -> Vec<MedicationRecord> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over name and dosage, in
    /// registration order (deterministic, not relevance-ranked).
    pub fn search(&self, query: &str) -> Vec<MedicationRecord> {
        let needle = query.to_lowercase();
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|record| {
                record.name().to_lowercase().contains(&needle)
                    || record.dosage().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Count history, most recent first. Equal timestamps keep the later
    /// appended entry first. `since` filters to `captured_at >= since`.
    pub fn list_history(&self, since: Option<DateTime<Utc>>) -> Vec<HistoryEntry> {
        let state = self.read();
        let mut entries: Vec<HistoryEntry> = state
            .history
            .iter()
            .rev()
            .filter(|entry| since.is_none_or(|cutoff| entry.captured_at() >= cutoff))
            .cloned()
            .collect();
        // Stable sort on a reverse-insertion-order sequence: ties stay
        // most-recently-appended first.
        entries.sort_by(|a, b| b.captured_at().cmp(&a.captured_at()));
        entries
    }

    /// The append-only event journal, for downstream consumers.
    pub fn events(&self) -> Vec<EventEnvelope<MedicationEvent>> {
        self.read().journal.clone()
    }

    /// Snapshot of the ledger for a persistence collaborator.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read();
        LedgerSnapshot {
            events: state.journal.clone(),
            history: state.history.clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Decide, commit, and run a post-commit hook under one write lock.
    ///
    /// The command is handled against a clone of the stored record, so a
    /// rejection leaves the ledger byte-for-byte unchanged.
    fn mutate(
        &self,
        medication_id: MedicationId,
        cmd: MedicationCommand,
        on_committed: impl FnOnce(&mut LedgerState, &MedicationRecord),
    ) -> DomainResult<MedicationRecord> {
        let mut state = self.write();

        let mut record = state
            .records
            .get(&medication_id)
            .cloned()
            .ok_or_else(|| DomainError::unknown_medication(medication_id.to_string()))?;

        let events = record.handle(&cmd)?;
        commit(&mut state, &mut record, events);
        state.records.insert(medication_id, record.clone());
        on_committed(&mut state, &record);

        Ok(record)
    }
}

/// Apply decided events to the record and journal each one with its
/// post-apply stream position.
fn commit(
    state: &mut LedgerState,
    record: &mut MedicationRecord,
    events: Vec<MedicationEvent>,
) {
    for event in events {
        record.apply(&event);
        state.journal.push(EventEnvelope::new(
            Uuid::now_v7(),
            record.id_typed().0,
            MEDICATION_AGGREGATE,
            record.version(),
            event,
        ));
    }
}
