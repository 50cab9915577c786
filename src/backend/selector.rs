use super::{BackendAvailability, ScannerBackendKind};
use crate::engine::{EngineContext, EngineFactory, RecognitionEngine};
use crate::error::AdapterError;
use std::sync::Arc;
use tracing::{info, warn};

/// Pick the backend for a fresh session
pub fn select_initial_backend(availability: &BackendAvailability) -> ScannerBackendKind {
    if availability.forced_fallback_only || !availability.primary_engine_usable {
        ScannerBackendKind::FallbackEngine
    } else {
        ScannerBackendKind::PrimaryEngine
    }
}

/// Operation during which a backend failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Initialization,
    Scanning,
    CameraSwitch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub stage: FailureStage,
    pub error: AdapterError,
}

impl FailureContext {
    pub fn new(stage: FailureStage, error: AdapterError) -> Self {
        Self { stage, error }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Replace the primary engine with the fallback engine
    SwitchToFallback,
    /// Surface the error; no recovery is possible
    Fatal,
}

/// Chooses the active backend and owns the fallback policy.
///
/// The primary factory is optional: a build or deployment without the
/// primary engine simply never offers it. Fallback is one-directional for
/// the lifetime of a session.
pub struct ScannerSelector {
    primary: Option<Arc<dyn EngineFactory>>,
    fallback: Arc<dyn EngineFactory>,
    fallen_back: bool,
}

impl ScannerSelector {
    pub fn new(primary: Option<Arc<dyn EngineFactory>>, fallback: Arc<dyn EngineFactory>) -> Self {
        Self {
            primary,
            fallback,
            fallen_back: false,
        }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_fallen_back(&self) -> bool {
        self.fallen_back
    }

    /// Availability as seen by this selector: a missing primary factory
    /// makes the primary engine unusable regardless of the platform.
    pub fn effective_availability(&self, availability: BackendAvailability) -> BackendAvailability {
        BackendAvailability {
            primary_engine_usable: availability.primary_engine_usable && self.has_primary(),
            ..availability
        }
    }

    /// Backend to bind for the next prepare within this session
    pub fn choose_backend(&self, availability: &BackendAvailability) -> ScannerBackendKind {
        if self.fallen_back {
            return ScannerBackendKind::FallbackEngine;
        }
        select_initial_backend(&self.effective_availability(*availability))
    }

    /// Decide how to react to a fatal error reported by `current`
    pub fn handle_backend_failure(
        &mut self,
        current: ScannerBackendKind,
        failure: &FailureContext,
    ) -> FallbackDecision {
        match current {
            ScannerBackendKind::PrimaryEngine if failure.error.is_engine_failure() => {
                warn!(
                    "Primary engine failed during {:?} ({}); switching to fallback engine",
                    failure.stage, failure.error
                );
                self.fallen_back = true;
                FallbackDecision::SwitchToFallback
            }
            ScannerBackendKind::PrimaryEngine => FallbackDecision::Fatal,
            // The fallback engine has nothing behind it
            ScannerBackendKind::FallbackEngine => FallbackDecision::Fatal,
        }
    }

    pub fn create(
        &self,
        kind: ScannerBackendKind,
        context: EngineContext,
    ) -> Result<Box<dyn RecognitionEngine>, AdapterError> {
        match kind {
            ScannerBackendKind::PrimaryEngine => {
                let factory = self.primary.as_ref().ok_or_else(|| {
                    AdapterError::initialization("primary engine is not part of this build")
                })?;
                Ok(factory.create(context))
            }
            ScannerBackendKind::FallbackEngine => Ok(self.fallback.create(context)),
        }
    }

    /// Forget the fallback latch; called when the session is destroyed
    pub fn reset(&mut self) {
        self.fallen_back = false;
    }

    /// Emit the selection report
    pub fn log_selection(&self, selected: ScannerBackendKind, availability: &BackendAvailability) {
        let availability = self.effective_availability(*availability);
        info!("=== Barcode Scanner Selection ===");
        info!("Selected scanner: {}", selected);
        info!("Scanner info: {}", selected.description(&availability));
        info!(
            "Performance rating: {}/10",
            selected.performance_rating(&availability)
        );
        info!(
            "Primary engine available: {}",
            ScannerBackendKind::PrimaryEngine.is_available(&availability)
        );
        info!(
            "Fallback engine available: {}",
            ScannerBackendKind::FallbackEngine.is_available(&availability)
        );
    }
}
