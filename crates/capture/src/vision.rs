use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A raw camera frame handed to the vision counter.
///
/// The ledger treats the bytes as opaque; encoding and resolution are a
/// contract between the capture layer and the recognition backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCapture {
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ImageCapture {
    pub fn new(data: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self { data, captured_at }
    }
}

/// What the vision counter believes it saw.
///
/// `estimated_units` is untrusted input: the ledger validates and rounds
/// it before reconciling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionEstimate {
    pub estimated_units: f64,
    pub label: Option<String>,
    pub confidence: Option<f64>,
}

impl VisionEstimate {
    pub fn new(estimated_units: f64) -> Self {
        Self {
            estimated_units,
            label: None,
            confidence: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Capture collaborator failure.
///
/// Infrastructure errors, deliberately separate from the ledger's domain
/// taxonomy: a failed capture never mutates the books.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The input was unusable (empty frame, blank scan, ...).
    #[error("capture rejected: {0}")]
    Rejected(String),

    /// The recognition backend itself failed.
    #[error("recognition backend failed: {0}")]
    Backend(String),
}

/// Counts pills in a single frame.
pub trait VisionCounter: Send + Sync {
    fn count_pills(&self, capture: &ImageCapture) -> Result<VisionEstimate, CaptureError>;
}

impl<C> VisionCounter for Arc<C>
where
    C: VisionCounter + ?Sized,
{
    fn count_pills(&self, capture: &ImageCapture) -> Result<VisionEstimate, CaptureError> {
        (**self).count_pills(capture)
    }
}

/// Deterministic vision counter returning a pre-configured estimate.
///
/// Stands in for a real recognition backend in tests and the dev harness;
/// it still refuses empty frames so callers exercise the error path.
#[derive(Debug, Clone)]
pub struct FixedVisionCounter {
    estimate: VisionEstimate,
}

impl FixedVisionCounter {
    pub fn new(estimate: VisionEstimate) -> Self {
        Self { estimate }
    }
}

impl VisionCounter for FixedVisionCounter {
    fn count_pills(&self, capture: &ImageCapture) -> Result<VisionEstimate, CaptureError> {
        if capture.data.is_empty() {
            return Err(CaptureError::Rejected("empty frame".to_string()));
        }
        Ok(self.estimate.clone())
    }
}
