//! Capture collaborator interfaces.
//!
//! The ledger never looks at pixels or barcodes itself; it consumes the
//! outputs of a vision counter and a barcode reader through the traits in
//! this crate. Real recognition backends live elsewhere; this crate holds
//! the contracts plus deterministic fixtures for tests and dev harnesses.

pub mod barcode;
pub mod vision;

pub use barcode::{BarcodeReader, PassthroughBarcodeReader, ProductCode, ScanEvent};
pub use vision::{CaptureError, FixedVisionCounter, ImageCapture, VisionCounter, VisionEstimate};
