mod availability;
mod capabilities;
mod selector;
#[cfg(test)]
mod tests;

pub use availability::{probe, BackendAvailabilityProber};
pub use capabilities::{BackendPreference, ScannerCapability};
pub use selector::{
    select_initial_backend, FailureContext, FailureStage, FallbackDecision, ScannerSelector,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which recognition engine is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScannerBackendKind {
    /// Hardware-accelerated, requires a platform service
    PrimaryEngine,
    /// Always available, no external dependency
    #[default]
    FallbackEngine,
}

impl ScannerBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScannerBackendKind::PrimaryEngine => "PrimaryEngine",
            ScannerBackendKind::FallbackEngine => "FallbackEngine",
        }
    }
}

impl fmt::Display for ScannerBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed once per prepare; never cached across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAvailability {
    pub primary_engine_usable: bool,
    pub forced_fallback_only: bool,
}
