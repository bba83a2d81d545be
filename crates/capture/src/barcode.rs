use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vision::CaptureError;

/// A raw barcode scan as delivered by the scanner hardware or camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub payload: String,
    pub scanned_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(payload: impl Into<String>, scanned_at: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            scanned_at,
        }
    }
}

/// Product identifier decoded from a scan, usable to look up or create a
/// medication record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    pub fn new(code: impl Into<String>) -> Result<Self, CaptureError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(CaptureError::Rejected("empty product code".to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProductCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decodes a scan event into a product code.
pub trait BarcodeReader: Send + Sync {
    fn resolve(&self, scan: &ScanEvent) -> Result<ProductCode, CaptureError>;
}

impl<R> BarcodeReader for Arc<R>
where
    R: BarcodeReader + ?Sized,
{
    fn resolve(&self, scan: &ScanEvent) -> Result<ProductCode, CaptureError> {
        (**self).resolve(scan)
    }
}

/// Reader that trusts the scanner's decoded payload as-is.
///
/// Trims surrounding whitespace and rejects blank scans; anything more
/// (symbology checks, checksum validation) belongs to a real reader.
#[derive(Debug, Clone, Default)]
pub struct PassthroughBarcodeReader;

impl PassthroughBarcodeReader {
    pub fn new() -> Self {
        Self
    }
}

impl BarcodeReader for PassthroughBarcodeReader {
    fn resolve(&self, scan: &ScanEvent) -> Result<ProductCode, CaptureError> {
        ProductCode::new(scan.payload.trim().to_string())
    }
}
