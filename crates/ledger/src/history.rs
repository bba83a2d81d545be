use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pillcount_core::{Entity, EntryId, Quantity};
use pillcount_medications::{CountSource, MedicationId, MedicationRecord};

/// Immutable audit record of a completed count event.
///
/// Entries are appended by the ledger and never edited or deleted;
/// deletion/export is an external collaborator's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    entry_id: EntryId,
    /// Absent when the count could not be attributed to a known
    /// medication; later attribution is the caller's concern.
    medication_id: Option<MedicationId>,
    name: String,
    dosage: String,
    count: Quantity,
    source: CountSource,
    captured_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub(crate) fn attributed(
        record: &MedicationRecord,
        count: Quantity,
        source: CountSource,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: EntryId::new(),
            medication_id: Some(record.id_typed()),
            name: record.name().to_string(),
            dosage: record.dosage().to_string(),
            count,
            source,
            captured_at,
        }
    }

    pub(crate) fn unattributed(
        count: Quantity,
        source: CountSource,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: EntryId::new(),
            medication_id: None,
            name: String::new(),
            dosage: String::new(),
            count,
            source,
            captured_at,
        }
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn medication_id(&self) -> Option<MedicationId> {
        self.medication_id
    }

    pub fn is_attributed(&self) -> bool {
        self.medication_id.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dosage(&self) -> &str {
        &self.dosage
    }

    pub fn count(&self) -> Quantity {
        self.count
    }

    pub fn source(&self) -> CountSource {
        self.source
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

impl Entity for HistoryEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.entry_id
    }
}
