use super::{BackendAvailability, ScannerBackendKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScannerCapability {
    BasicScanning,
    TorchSupport,
    CameraSwitching,
    Autofocus,
    PerformanceOptimized,
}

/// Backend a use case asks for. `Auto` defers to availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendPreference {
    Auto,
    Primary,
    Fallback,
}

impl BackendPreference {
    /// Map a free-form use case name to a preference
    pub fn for_use_case(use_case: &str, availability: &BackendAvailability) -> Self {
        match use_case.trim().to_ascii_lowercase().as_str() {
            "performance" | "speed" | "battery" => {
                if availability.primary_engine_usable {
                    BackendPreference::Primary
                } else {
                    BackendPreference::Fallback
                }
            }
            "compatibility" | "fallback" => BackendPreference::Fallback,
            "modern" | "latest" => BackendPreference::Primary,
            _ => BackendPreference::Auto,
        }
    }
}

impl ScannerBackendKind {
    pub fn has_capability(self, capability: ScannerCapability) -> bool {
        match capability {
            ScannerCapability::BasicScanning
            | ScannerCapability::TorchSupport
            | ScannerCapability::CameraSwitching
            | ScannerCapability::Autofocus => true,
            ScannerCapability::PerformanceOptimized => self == ScannerBackendKind::PrimaryEngine,
        }
    }

    /// Rough performance score out of 10
    pub fn performance_rating(self, availability: &BackendAvailability) -> u8 {
        match self {
            ScannerBackendKind::PrimaryEngine if availability.primary_engine_usable => 9,
            ScannerBackendKind::PrimaryEngine => 0,
            ScannerBackendKind::FallbackEngine => 6,
        }
    }

    pub fn is_available(self, availability: &BackendAvailability) -> bool {
        match self {
            ScannerBackendKind::PrimaryEngine => availability.primary_engine_usable,
            ScannerBackendKind::FallbackEngine => true,
        }
    }

    pub fn description(self, availability: &BackendAvailability) -> &'static str {
        match self {
            ScannerBackendKind::PrimaryEngine if availability.forced_fallback_only => {
                "Primary engine disabled by fallback-only configuration"
            }
            ScannerBackendKind::PrimaryEngine if availability.primary_engine_usable => {
                "Primary engine - high performance, hardware accelerated"
            }
            ScannerBackendKind::PrimaryEngine => {
                "Primary engine not available (requires platform recognition service)"
            }
            ScannerBackendKind::FallbackEngine => "Fallback engine - reliable universal scanner",
        }
    }
}
