//! Recognition engine adapters.
//!
//! Each backend wraps an external decoder behind [`RecognitionEngine`]. The
//! two implementations, [`PrimaryEngine`] and [`FallbackEngine`], share no
//! state; both compose an [`AnalysisPipeline`] that owns the camera binding
//! and the frame worker.

mod fallback;
mod pipeline;
mod primary;
#[cfg(test)]
mod tests;

pub use fallback::{FallbackEngine, FallbackEngineFactory};
pub use pipeline::AnalysisPipeline;
pub use primary::{PrimaryEngine, PrimaryEngineFactory};

use crate::backend::ScannerBackendKind;
use crate::error::AdapterError;
use crate::platform::{CameraDevices, CameraFacing, CameraProvider, Frame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Symbologies every backend is configured to recognise
pub const SUPPORTED_SYMBOLOGIES: [Symbology; 5] = [
    Symbology::Qr,
    Symbology::Code39,
    Symbology::Code39Mod43,
    Symbology::Code93,
    Symbology::Code128,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbology {
    Qr,
    Code39,
    Code39Mod43,
    Code93,
    Code128,
    Ean13,
    DataMatrix,
}

impl Symbology {
    pub fn is_supported(self) -> bool {
        SUPPORTED_SYMBOLOGIES.contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    pub value: String,
    pub symbology: Symbology,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{engine}: {details}")]
pub struct DecodeError {
    pub engine: String,
    pub details: String,
}

impl DecodeError {
    pub fn new<E: Into<String>, D: Into<String>>(engine: E, details: D) -> Self {
        Self {
            engine: engine.into(),
            details: details.into(),
        }
    }
}

/// Pixel-to-string decoding capability supplied by the platform
pub trait BarcodeDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// Prepare the decoder before the first frame. Called once per initialize.
    fn warm_up(&self) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Decode one frame. `Ok(None)` means no barcode was found.
    fn decode(&self, frame: &Frame) -> Result<Option<DecodedBarcode>, DecodeError>;
}

/// Identifies one caller-visible scan request. Outcomes carrying an older
/// token are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanToken(pub u64);

/// Result of one continuous scan, posted back to the session
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub backend: ScannerBackendKind,
    pub token: ScanToken,
    pub result: Result<DecodedBarcode, AdapterError>,
}

/// Where a running scan reports its single outcome
#[derive(Debug, Clone)]
pub struct ScanSink {
    pub token: ScanToken,
    outcomes: mpsc::UnboundedSender<EngineOutcome>,
}

impl ScanSink {
    pub fn new(token: ScanToken, outcomes: mpsc::UnboundedSender<EngineOutcome>) -> Self {
        Self { token, outcomes }
    }

    pub(crate) fn deliver(
        self,
        backend: ScannerBackendKind,
        result: Result<DecodedBarcode, AdapterError>,
    ) {
        let outcome = EngineOutcome {
            backend,
            token: self.token,
            result,
        };
        // The session may already be gone; nothing is waiting then.
        let _ = self.outcomes.send(outcome);
    }
}

/// Uniform capability interface implemented by both backends
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn kind(&self) -> ScannerBackendKind;

    /// Facing currently bound, if any
    fn facing(&self) -> Option<CameraFacing>;

    /// Bind to the camera for `facing`. A no-op when already bound to the
    /// same facing; rebinds when the facing differs.
    async fn initialize(&mut self, facing: CameraFacing) -> Result<(), AdapterError>;

    /// Begin decoding frames. Exactly one outcome is delivered to `sink`,
    /// after which decoding stops on its own.
    fn start_continuous_scan(&mut self, sink: ScanSink) -> Result<(), AdapterError>;

    /// Idempotent
    fn stop_scan(&mut self);

    fn is_scanning(&self) -> bool;

    /// Rebind to `facing`. On failure the previous facing is rebound and an
    /// active scan keeps running on it; if that rebind fails as well the
    /// engine is left unbound and [`facing`](Self::facing) returns `None`.
    async fn switch_facing(&mut self, facing: CameraFacing) -> Result<(), AdapterError>;

    fn set_torch(&mut self, enabled: bool) -> Result<(), AdapterError>;

    /// Free all engine and camera resources. Idempotent.
    async fn release(&mut self);
}

/// What a factory needs to build an engine bound to the session's camera
#[derive(Clone)]
pub struct EngineContext {
    pub camera: Arc<dyn CameraProvider>,
    pub devices: CameraDevices,
    pub bind_timeout: Duration,
}

/// Builds engines for one backend kind
pub trait EngineFactory: Send + Sync {
    fn kind(&self) -> ScannerBackendKind;

    fn create(&self, context: EngineContext) -> Box<dyn RecognitionEngine>;
}
