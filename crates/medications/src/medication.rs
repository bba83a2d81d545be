use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pillcount_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Quantity, UnitDelta};
use pillcount_events::Event;

/// Medication identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicationId(pub AggregateId);

impl MedicationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MedicationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where a count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountSource {
    /// A single-frame camera recount of the whole loose pool.
    Photo,
    /// An incremental tally while pills are poured past the camera.
    Live,
    /// A hand-entered container/loose edit.
    Manual,
}

impl core::fmt::Display for CountSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CountSource::Photo => f.write_str("photo"),
            CountSource::Live => f.write_str("live"),
            CountSource::Manual => f.write_str("manual"),
        }
    }
}

/// Aggregate root: MedicationRecord.
///
/// Holds the canonical stock expression for one medication: full
/// containers plus a half-unit-granular loose pool. The invariant
/// `total = containers * units_per_container + loose` is maintained by
/// construction: `total()` derives it, nothing stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationRecord {
    id: MedicationId,
    name: String,
    dosage: String,
    product_code: Option<String>,
    units_per_container: u32,
    containers: u32,
    loose: Quantity,
    registered_at: Option<DateTime<Utc>>,
    last_modified_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl MedicationRecord {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: MedicationId) -> Self {
        Self {
            id,
            name: String::new(),
            dosage: String::new(),
            product_code: None,
            units_per_container: 0,
            containers: 0,
            loose: Quantity::ZERO,
            registered_at: None,
            last_modified_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MedicationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dosage(&self) -> &str {
        &self.dosage
    }

    pub fn product_code(&self) -> Option<&str> {
        self.product_code.as_deref()
    }

    pub fn units_per_container(&self) -> u32 {
        self.units_per_container
    }

    pub fn containers(&self) -> u32 {
        self.containers
    }

    pub fn loose(&self) -> Quantity {
        self.loose
    }

    /// Canonical total: `containers * units_per_container + loose`.
    ///
    /// Saturating: `handle` rejects any command whose outcome would not fit
    /// in the half-step counter, so a live record never saturates here.
    pub fn total(&self) -> Quantity {
        let container_steps = (self.containers as u64)
            .saturating_mul(self.units_per_container as u64)
            .saturating_mul(2);
        Quantity::from_half_steps(container_steps.saturating_add(self.loose.half_steps()))
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified_at
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for MedicationRecord {
    type Id = MedicationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMedication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMedication {
    pub medication_id: MedicationId,
    pub name: String,
    pub dosage: String,
    pub product_code: Option<String>,
    pub units_per_container: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustContainers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustContainers {
    pub medication_id: MedicationId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustLooseUnits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustLooseUnits {
    pub medication_id: MedicationId,
    pub delta: UnitDelta,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReconcileCount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileCount {
    pub medication_id: MedicationId,
    pub estimated: Quantity,
    pub source: CountSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MedicationCommand {
    RegisterMedication(RegisterMedication),
    AdjustContainers(AdjustContainers),
    AdjustLooseUnits(AdjustLooseUnits),
    ReconcileCount(ReconcileCount),
}

/// Event: MedicationRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRegistered {
    pub medication_id: MedicationId,
    pub name: String,
    pub dosage: String,
    pub product_code: Option<String>,
    pub units_per_container: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContainersAdjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainersAdjusted {
    pub medication_id: MedicationId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LooseUnitsAdjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LooseUnitsAdjusted {
    pub medication_id: MedicationId,
    pub delta: UnitDelta,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountReconciled.
///
/// Carries the resolved stock expression, not the raw estimate, so that
/// replaying the event needs no arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountReconciled {
    pub medication_id: MedicationId,
    pub containers: u32,
    pub loose: Quantity,
    pub total: Quantity,
    pub source: CountSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MedicationEvent {
    MedicationRegistered(MedicationRegistered),
    ContainersAdjusted(ContainersAdjusted),
    LooseUnitsAdjusted(LooseUnitsAdjusted),
    CountReconciled(CountReconciled),
}

impl Event for MedicationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MedicationEvent::MedicationRegistered(_) => "medication.registered",
            MedicationEvent::ContainersAdjusted(_) => "medication.containers_adjusted",
            MedicationEvent::LooseUnitsAdjusted(_) => "medication.loose_units_adjusted",
            MedicationEvent::CountReconciled(_) => "medication.count_reconciled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MedicationEvent::MedicationRegistered(e) => e.occurred_at,
            MedicationEvent::ContainersAdjusted(e) => e.occurred_at,
            MedicationEvent::LooseUnitsAdjusted(e) => e.occurred_at,
            MedicationEvent::CountReconciled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MedicationRecord {
    type Command = MedicationCommand;
    type Event = MedicationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MedicationEvent::MedicationRegistered(e) => {
                self.id = e.medication_id;
                self.name = e.name.clone();
                self.dosage = e.dosage.clone();
                self.product_code = e.product_code.clone();
                self.units_per_container = e.units_per_container;
                self.containers = 0;
                self.loose = Quantity::ZERO;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            MedicationEvent::ContainersAdjusted(e) => {
                self.containers = (self.containers as i64 + e.delta).max(0) as u32;
            }
            MedicationEvent::LooseUnitsAdjusted(e) => {
                self.loose = self.loose.checked_apply(e.delta).unwrap_or(Quantity::ZERO);
            }
            MedicationEvent::CountReconciled(e) => {
                self.containers = e.containers;
                self.loose = e.loose;
            }
        }

        self.last_modified_at = Some(event.occurred_at());

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MedicationCommand::RegisterMedication(cmd) => self.handle_register(cmd),
            MedicationCommand::AdjustContainers(cmd) => self.handle_adjust_containers(cmd),
            MedicationCommand::AdjustLooseUnits(cmd) => self.handle_adjust_loose(cmd),
            MedicationCommand::ReconcileCount(cmd) => self.handle_reconcile(cmd),
        }
    }
}

impl MedicationRecord {
    /// Prospective total for a candidate stock expression; `None` when the
    /// half-step count would overflow.
    fn checked_total(
        containers: u32,
        units_per_container: u32,
        loose: Quantity,
    ) -> Option<Quantity> {
        (containers as u64)
            .checked_mul(units_per_container as u64)?
            .checked_mul(2)?
            .checked_add(loose.half_steps())
            .map(Quantity::from_half_steps)
    }

    fn ensure_registered(&self, medication_id: MedicationId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::unknown_medication(medication_id.to_string()));
        }
        if self.id != medication_id {
            return Err(DomainError::validation("medication_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMedication) -> Result<Vec<MedicationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("medication already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.units_per_container == 0 {
            return Err(DomainError::validation(
                "units_per_container must be a positive integer",
            ));
        }
        if let Some(code) = &cmd.product_code {
            if code.trim().is_empty() {
                return Err(DomainError::validation("product code cannot be empty"));
            }
        }

        Ok(vec![MedicationEvent::MedicationRegistered(
            MedicationRegistered {
                medication_id: cmd.medication_id,
                name: cmd.name.clone(),
                dosage: cmd.dosage.clone(),
                product_code: cmd.product_code.clone(),
                units_per_container: cmd.units_per_container,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_adjust_containers(
        &self,
        cmd: &AdjustContainers,
    ) -> Result<Vec<MedicationEvent>, DomainError> {
        self.ensure_registered(cmd.medication_id)?;

        let new_count = (self.containers as i64)
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("container count out of range"))?;
        if new_count < 0 {
            return Err(DomainError::adjustment(format!(
                "container delta {} would drive count below zero (current: {})",
                cmd.delta, self.containers
            )));
        }
        if new_count > u32::MAX as i64 {
            return Err(DomainError::validation("container count out of range"));
        }
        if Self::checked_total(new_count as u32, self.units_per_container, self.loose).is_none() {
            return Err(DomainError::validation("count exceeds supported range"));
        }

        Ok(vec![MedicationEvent::ContainersAdjusted(ContainersAdjusted {
            medication_id: cmd.medication_id,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust_loose(
        &self,
        cmd: &AdjustLooseUnits,
    ) -> Result<Vec<MedicationEvent>, DomainError> {
        self.ensure_registered(cmd.medication_id)?;

        let new_loose = match self.loose.checked_apply(cmd.delta) {
            Some(loose) => loose,
            None if cmd.delta.is_negative() => {
                return Err(DomainError::adjustment(format!(
                    "loose-unit delta {} would drive count below zero (current: {})",
                    cmd.delta, self.loose
                )));
            }
            None => return Err(DomainError::validation("count exceeds supported range")),
        };
        if Self::checked_total(self.containers, self.units_per_container, new_loose).is_none() {
            return Err(DomainError::validation("count exceeds supported range"));
        }

        Ok(vec![MedicationEvent::LooseUnitsAdjusted(LooseUnitsAdjusted {
            medication_id: cmd.medication_id,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reconcile(&self, cmd: &ReconcileCount) -> Result<Vec<MedicationEvent>, DomainError> {
        self.ensure_registered(cmd.medication_id)?;

        let total = match cmd.source {
            // A photo recount is a full physical recount: the estimate
            // replaces the stored total outright.
            CountSource::Photo => cmd.estimated,
            // A live tally is an incremental delta on top of the current total.
            CountSource::Live => self
                .total()
                .checked_add(cmd.estimated)
                .ok_or_else(|| DomainError::validation("count exceeds supported range"))?,
            // Manual edits carry exact container/loose deltas through the
            // adjust commands; they never arrive as an estimate.
            CountSource::Manual => {
                return Err(DomainError::validation(
                    "manual counts adjust containers and loose units directly",
                ));
            }
        };

        // Express the total with as many full containers as possible.
        let container_steps = self.units_per_container as u64 * 2;
        let containers = total.half_steps() / container_steps;
        if containers > u32::MAX as u64 {
            return Err(DomainError::validation("count exceeds supported range"));
        }
        let loose = Quantity::from_half_steps(total.half_steps() % container_steps);

        Ok(vec![MedicationEvent::CountReconciled(CountReconciled {
            medication_id: cmd.medication_id,
            containers: containers as u32,
            loose,
            total,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pillcount_core::AggregateId;

    fn test_medication_id() -> MedicationId {
        MedicationId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(units_per_container: u32) -> (MedicationRecord, MedicationId) {
        let medication_id = test_medication_id();
        let mut record = MedicationRecord::empty(medication_id);
        let cmd = RegisterMedication {
            medication_id,
            name: "Amoxicillin".to_string(),
            dosage: "500mg".to_string(),
            product_code: None,
            units_per_container,
            occurred_at: test_time(),
        };
        let events = record
            .handle(&MedicationCommand::RegisterMedication(cmd))
            .unwrap();
        record.apply(&events[0]);
        (record, medication_id)
    }

    fn apply_all(record: &mut MedicationRecord, events: Vec<MedicationEvent>) {
        for e in &events {
            record.apply(e);
        }
    }

    #[test]
    fn register_emits_registered_event() {
        let medication_id = test_medication_id();
        let record = MedicationRecord::empty(medication_id);
        let cmd = RegisterMedication {
            medication_id,
            name: "Ibuprofen".to_string(),
            dosage: "200mg".to_string(),
            product_code: Some("8806421033182".to_string()),
            units_per_container: 50,
            occurred_at: test_time(),
        };

        let events = record
            .handle(&MedicationCommand::RegisterMedication(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MedicationEvent::MedicationRegistered(e) => {
                assert_eq!(e.medication_id, medication_id);
                assert_eq!(e.name, "Ibuprofen");
                assert_eq!(e.dosage, "200mg");
                assert_eq!(e.units_per_container, 50);
                assert_eq!(e.product_code.as_deref(), Some("8806421033182"));
            }
            _ => panic!("Expected MedicationRegistered event"),
        }
    }

    #[test]
    fn register_starts_with_zero_stock() {
        let (record, _) = registered(30);
        assert_eq!(record.containers(), 0);
        assert_eq!(record.loose(), Quantity::ZERO);
        assert_eq!(record.total(), Quantity::ZERO);
        assert!(record.registered_at().is_some());
        assert_eq!(record.registered_at(), record.last_modified_at());
    }

    #[test]
    fn register_rejects_empty_name() {
        let medication_id = test_medication_id();
        let record = MedicationRecord::empty(medication_id);
        let cmd = RegisterMedication {
            medication_id,
            name: "   ".to_string(),
            dosage: String::new(),
            product_code: None,
            units_per_container: 30,
            occurred_at: test_time(),
        };

        let err = record
            .handle(&MedicationCommand::RegisterMedication(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_zero_pack_size() {
        let medication_id = test_medication_id();
        let record = MedicationRecord::empty(medication_id);
        let cmd = RegisterMedication {
            medication_id,
            name: "Loratadine".to_string(),
            dosage: "10mg".to_string(),
            product_code: None,
            units_per_container: 0,
            occurred_at: test_time(),
        };

        let err = record
            .handle(&MedicationCommand::RegisterMedication(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_duplicate_registration() {
        let (record, medication_id) = registered(30);
        let cmd = RegisterMedication {
            medication_id,
            name: "Amoxicillin".to_string(),
            dosage: "500mg".to_string(),
            product_code: None,
            units_per_container: 30,
            occurred_at: test_time(),
        };

        let err = record
            .handle(&MedicationCommand::RegisterMedication(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn container_adjustment_moves_the_total_by_pack_size() {
        let (mut record, medication_id) = registered(50);
        let events = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: 2,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);

        assert_eq!(record.containers(), 2);
        assert_eq!(record.total(), Quantity::from_units(100));
    }

    #[test]
    fn container_adjustment_below_zero_is_rejected_and_state_unchanged() {
        let (mut record, medication_id) = registered(50);
        let events = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: 1,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);
        let before = record.clone();

        let err = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: -2,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidAdjustment(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn loose_adjustment_supports_half_tablets() {
        let (mut record, medication_id) = registered(30);
        let events = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_half_steps(9), // +4.5 tablets
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);

        assert_eq!(record.loose(), Quantity::from_half_steps(9));
        assert!(!record.loose().is_whole());
        assert_eq!(record.total(), Quantity::from_half_steps(9));
    }

    #[test]
    fn loose_adjustment_below_zero_is_rejected_and_state_unchanged() {
        let (mut record, medication_id) = registered(30);
        let events = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_units(3),
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);
        let before = record.clone();

        let err = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_half_steps(-7), // -3.5 tablets
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidAdjustment(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn extreme_container_delta_is_rejected_not_applied() {
        let (mut record, medication_id) = registered(50);
        let events = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: 1,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);
        let before = record.clone();

        let err = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: i64::MAX,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn container_total_beyond_the_counter_is_rejected() {
        // u32::MAX containers of u32::MAX units would overflow the
        // half-step counter; the command must fail, not wrap.
        let (record, medication_id) = registered(u32::MAX);

        let err = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: u32::MAX as i64,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(record.containers(), 0);
        assert_eq!(record.total(), Quantity::ZERO);
    }

    #[test]
    fn loose_total_beyond_the_counter_is_rejected() {
        let (mut record, medication_id) = registered(30);
        let events = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_half_steps(i64::MAX),
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);
        let before = record.clone();

        let err = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_half_steps(i64::MAX),
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn commands_against_unregistered_record_report_unknown_medication() {
        let medication_id = test_medication_id();
        let record = MedicationRecord::empty(medication_id);

        let err = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownMedication(_)));

        let err = record
            .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                medication_id,
                estimated: Quantity::from_units(10),
                source: CountSource::Photo,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownMedication(_)));
    }

    #[test]
    fn photo_reconcile_prefers_full_containers() {
        let (mut record, medication_id) = registered(30);
        let events = record
            .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                medication_id,
                estimated: Quantity::from_units(95),
                source: CountSource::Photo,
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            MedicationEvent::CountReconciled(e) => {
                assert_eq!(e.containers, 3);
                assert_eq!(e.loose, Quantity::from_units(5));
                assert_eq!(e.total, Quantity::from_units(95));
                assert_eq!(e.source, CountSource::Photo);
            }
            _ => panic!("Expected CountReconciled event"),
        }

        apply_all(&mut record, events);
        assert_eq!(record.containers(), 3);
        assert_eq!(record.loose(), Quantity::from_units(5));
        assert_eq!(record.total(), Quantity::from_units(95));
    }

    #[test]
    fn photo_reconcile_is_idempotent_for_a_fixed_estimate() {
        let (mut record, medication_id) = registered(30);
        let cmd = MedicationCommand::ReconcileCount(ReconcileCount {
            medication_id,
            estimated: Quantity::from_units(95),
            source: CountSource::Photo,
            occurred_at: test_time(),
        });

        let events = record.handle(&cmd).unwrap();
        apply_all(&mut record, events);
        let first_total = record.total();

        let events = record.handle(&cmd).unwrap();
        apply_all(&mut record, events);

        assert_eq!(record.total(), first_total);
        assert_eq!(record.containers(), 3);
        assert_eq!(record.loose(), Quantity::from_units(5));
    }

    #[test]
    fn live_reconcile_is_additive() {
        let (mut record, medication_id) = registered(30);

        for estimated in [5u64, 3u64] {
            let events = record
                .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                    medication_id,
                    estimated: Quantity::from_units(estimated),
                    source: CountSource::Live,
                    occurred_at: test_time(),
                }))
                .unwrap();
            apply_all(&mut record, events);
        }

        let (mut single, single_id) = registered(30);
        let events = single
            .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                medication_id: single_id,
                estimated: Quantity::from_units(8),
                source: CountSource::Live,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut single, events);

        assert_eq!(record.total(), single.total());
        assert_eq!(record.total(), Quantity::from_units(8));
    }

    #[test]
    fn live_reconcile_rolls_loose_units_into_containers() {
        let (mut record, medication_id) = registered(10);
        for estimated in [7u64, 6u64] {
            let events = record
                .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                    medication_id,
                    estimated: Quantity::from_units(estimated),
                    source: CountSource::Live,
                    occurred_at: test_time(),
                }))
                .unwrap();
            apply_all(&mut record, events);
        }

        assert_eq!(record.containers(), 1);
        assert_eq!(record.loose(), Quantity::from_units(3));
        assert_eq!(record.total(), Quantity::from_units(13));
    }

    #[test]
    fn manual_source_is_rejected_by_reconcile() {
        let (record, medication_id) = registered(30);
        let err = record
            .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                medication_id,
                estimated: Quantity::from_units(10),
                source: CountSource::Manual,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_then_adjust_matches_worked_example() {
        // register("Ibuprofen","200mg",50) -> +1 container -> +33 loose == 83.
        let (mut record, medication_id) = registered(50);

        let events = record
            .handle(&MedicationCommand::AdjustContainers(AdjustContainers {
                medication_id,
                delta: 1,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);

        let events = record
            .handle(&MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                medication_id,
                delta: UnitDelta::from_units(33),
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);

        assert_eq!(record.total(), Quantity::from_units(83));

        // Reconciling the same physical count is then a no-op on the total.
        let events = record
            .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                medication_id,
                estimated: Quantity::from_units(83),
                source: CountSource::Photo,
                occurred_at: test_time(),
            }))
            .unwrap();
        apply_all(&mut record, events);
        assert_eq!(record.total(), Quantity::from_units(83));
        assert_eq!(record.containers(), 1);
        assert_eq!(record.loose(), Quantity::from_units(33));
    }

    #[test]
    fn version_increments_on_apply_and_handle_does_not_mutate() {
        let (mut record, medication_id) = registered(30);
        assert_eq!(record.version(), 1);

        let cmd = MedicationCommand::AdjustContainers(AdjustContainers {
            medication_id,
            delta: 1,
            occurred_at: test_time(),
        });

        let before = record.clone();
        let events1 = record.handle(&cmd).unwrap();
        let events2 = record.handle(&cmd).unwrap();
        assert_eq!(record, before);
        assert_eq!(events1, events2);

        apply_all(&mut record, events1);
        assert_eq!(record.version(), 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Containers(i64),
            Loose(i64),
            Photo(u64),
            Live(u64),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (-5i64..10i64).prop_map(Op::Containers),
                (-40i64..80i64).prop_map(Op::Loose),
                (0u64..1000u64).prop_map(Op::Photo),
                (0u64..200u64).prop_map(Op::Live),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: after any accepted sequence of operations the
            /// canonical total equals containers * pack size + loose.
            #[test]
            fn total_invariant_holds_after_any_operation(
                units_per_container in 1u32..200u32,
                ops in prop::collection::vec(op_strategy(), 1..30)
            ) {
                let (mut record, medication_id) = registered(units_per_container);

                for op in ops {
                    let cmd = match op {
                        Op::Containers(delta) => {
                            MedicationCommand::AdjustContainers(AdjustContainers {
                                medication_id,
                                delta,
                                occurred_at: test_time(),
                            })
                        }
                        Op::Loose(steps) => {
                            MedicationCommand::AdjustLooseUnits(AdjustLooseUnits {
                                medication_id,
                                delta: UnitDelta::from_half_steps(steps),
                                occurred_at: test_time(),
                            })
                        }
                        Op::Photo(units) => MedicationCommand::ReconcileCount(ReconcileCount {
                            medication_id,
                            estimated: Quantity::from_units(units),
                            source: CountSource::Photo,
                            occurred_at: test_time(),
                        }),
                        Op::Live(units) => MedicationCommand::ReconcileCount(ReconcileCount {
                            medication_id,
                            estimated: Quantity::from_units(units),
                            source: CountSource::Live,
                            occurred_at: test_time(),
                        }),
                    };

                    // Rejected commands must leave the record untouched.
                    let before = record.clone();
                    match record.handle(&cmd) {
                        Ok(events) => apply_all(&mut record, events),
                        Err(_) => prop_assert_eq!(&record, &before),
                    }

                    let expected = record.containers() as u64
                        * record.units_per_container() as u64
                        * 2
                        + record.loose().half_steps();
                    prop_assert_eq!(record.total().half_steps(), expected);
                    prop_assert!(record.loose().half_steps()
                        < record.units_per_container() as u64 * 2
                        || record.loose().is_zero()
                        || matches!(cmd, MedicationCommand::AdjustLooseUnits(_) | MedicationCommand::AdjustContainers(_)));
                }
            }

            /// Property: a photo recount is idempotent for a fixed estimate.
            #[test]
            fn photo_reconcile_idempotent(
                units_per_container in 1u32..200u32,
                estimated in 0u64..10_000u64
            ) {
                let (mut record, medication_id) = registered(units_per_container);
                let cmd = MedicationCommand::ReconcileCount(ReconcileCount {
                    medication_id,
                    estimated: Quantity::from_units(estimated),
                    source: CountSource::Photo,
                    occurred_at: test_time(),
                });

                let events = record.handle(&cmd).unwrap();
                apply_all(&mut record, events);
                let first = (record.containers(), record.loose(), record.total());

                let events = record.handle(&cmd).unwrap();
                apply_all(&mut record, events);
                prop_assert_eq!((record.containers(), record.loose(), record.total()), first);
            }

            /// Property: live tallies are additive regardless of how the
            /// increments are split.
            #[test]
            fn live_reconcile_additive(
                units_per_container in 1u32..200u32,
                increments in prop::collection::vec(0u64..500u64, 1..10)
            ) {
                let (mut split, split_id) = registered(units_per_container);
                for inc in &increments {
                    let events = split
                        .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                            medication_id: split_id,
                            estimated: Quantity::from_units(*inc),
                            source: CountSource::Live,
                            occurred_at: test_time(),
                        }))
                        .unwrap();
                    apply_all(&mut split, events);
                }

                let (mut lump, lump_id) = registered(units_per_container);
                let total: u64 = increments.iter().sum();
                let events = lump
                    .handle(&MedicationCommand::ReconcileCount(ReconcileCount {
                        medication_id: lump_id,
                        estimated: Quantity::from_units(total),
                        source: CountSource::Live,
                        occurred_at: test_time(),
                    }))
                    .unwrap();
                apply_all(&mut lump, events);

                prop_assert_eq!(split.total(), lump.total());
                prop_assert_eq!(split.containers(), lump.containers());
                prop_assert_eq!(split.loose(), lump.loose());
            }
        }
    }
}
