//! Smoke harness for the pillcount crates.
//!
//! Walks a representative counting session end to end: register a few
//! medications, make manual edits, run a photo recount through a fixture
//! vision counter, resolve a barcode scan, and print the resulting
//! inventory and history. Presentation proper (the mobile UI) is a
//! separate system; this binary only verifies crate wiring.

use anyhow::Result;
use chrono::Utc;

use pillcount_capture::{
    BarcodeReader, FixedVisionCounter, ImageCapture, PassthroughBarcodeReader, ScanEvent,
    VisionCounter, VisionEstimate,
};
use pillcount_core::UnitDelta;
use pillcount_ledger::InventoryLedger;
use pillcount_medications::CountSource;

fn main() -> Result<()> {
    pillcount_observability::init();

    let ledger = InventoryLedger::new();

    let amoxicillin = ledger.register_medication_with_code(
        "Amoxicillin",
        "500mg",
        Some("8806421033182".to_string()),
        60,
    )?;
    let ibuprofen = ledger.register_medication("Ibuprofen", "200mg", 50)?;
    ledger.register_medication("Loratadine", "10mg", 24)?;

    // Manual stock entry, the add-inventory flow.
    ledger.adjust_containers(ibuprofen.id_typed(), 1)?;
    ledger.adjust_loose_units(ibuprofen.id_typed(), UnitDelta::from_units(33))?;

    // Photo recount through the (fixture) vision counter.
    let counter = FixedVisionCounter::new(
        VisionEstimate::new(180.0)
            .with_label("Amoxicillin 500mg")
            .with_confidence(0.94),
    );
    let frame = ImageCapture::new(vec![0u8; 64], Utc::now());
    let estimate = counter.count_pills(&frame)?;
    ledger.reconcile_count(
        Some(amoxicillin.id_typed()),
        estimate.estimated_units,
        CountSource::Photo,
    )?;

    // Barcode scan resolving back to the registered medication, then a
    // short live tally against it.
    let reader = PassthroughBarcodeReader::new();
    let code = reader.resolve(&ScanEvent::new("8806421033182", Utc::now()))?;
    if let Some(hit) = ledger.find_by_product_code(code.as_str()) {
        ledger.reconcile_count(Some(hit.id_typed()), 5.0, CountSource::Live)?;
    }

    println!("inventory:");
    for record in ledger.medications() {
        println!(
            "  {} {}: {} units ({} x {} + {} loose)",
            record.name(),
            record.dosage(),
            record.total(),
            record.containers(),
            record.units_per_container(),
            record.loose(),
        );
    }

    println!("history (most recent first):");
    for entry in ledger.list_history(None) {
        println!(
            "  [{}] {} {}: {} units at {}",
            entry.source(),
            entry.name(),
            entry.dosage(),
            entry.count(),
            entry.captured_at().format("%Y-%m-%d %H:%M:%S"),
        );
    }

    tracing::info!(
        medications = ledger.medications().len(),
        events = ledger.events().len(),
        "session complete"
    );
    Ok(())
}
