//! Medication domain module (event-sourced).
//!
//! This crate contains the unit-accounting rules for a single medication,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod medication;

pub use medication::{
    AdjustContainers, AdjustLooseUnits, ContainersAdjusted, CountReconciled, CountSource,
    LooseUnitsAdjusted, MedicationCommand, MedicationEvent, MedicationId, MedicationRecord,
    MedicationRegistered, ReconcileCount, RegisterMedication,
};
