//! Wire-format status snapshot and error payload.
//!
//! Callers receive a flat string-keyed map with booleans encoded as `"0"` and
//! `"1"`. The mandatory keys are always present; capability extensions only
//! appear once they are known, and callers must tolerate their absence.

use crate::backend::ScannerBackendKind;
use crate::error::{ErrorKind, ScanFailure, ScannerError};
use crate::platform::{CameraDevices, CameraFacing};
use crate::session::PerformanceSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys present in every snapshot
pub const MANDATORY_FIELDS: [&str; 12] = [
    "authorized",
    "denied",
    "restricted",
    "prepared",
    "scanning",
    "previewing",
    "showing",
    "lightEnabled",
    "canOpenSettings",
    "canEnableLight",
    "canChangeCamera",
    "currentCamera",
];

/// Hardware features of the resolved camera devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub has_autofocus: bool,
    pub has_front_camera: bool,
    pub has_back_camera: bool,
    pub has_optical_image_stabilization: bool,
    pub supported_focus_modes: Vec<String>,
}

impl DeviceCapabilities {
    /// Capabilities of the device bound for `facing`
    pub fn from_devices(devices: &CameraDevices, facing: CameraFacing) -> Self {
        let active = devices.get(facing);
        Self {
            has_autofocus: active.is_some_and(|d| d.has_autofocus),
            has_front_camera: devices.has(CameraFacing::Front),
            has_back_camera: devices.has(CameraFacing::Back),
            has_optical_image_stabilization: active.is_some_and(|d| d.has_optical_stabilization),
            supported_focus_modes: active.map(|d| d.focus_modes.clone()).unwrap_or_default(),
        }
    }
}

/// Typed snapshot of the session as the caller sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub authorized: bool,
    pub denied: bool,
    pub restricted: bool,
    pub prepared: bool,
    pub scanning: bool,
    pub previewing: bool,
    pub showing: bool,
    pub light_enabled: bool,
    pub can_open_settings: bool,
    pub can_enable_light: bool,
    pub can_change_camera: bool,
    pub current_camera: CameraFacing,
    pub should_show_rationale: bool,
    pub haptic_feedback_enabled: bool,
    pub capabilities: Option<DeviceCapabilities>,
    pub performance: Option<PerformanceSummary>,
    pub active_backend: ScannerBackendKind,
    /// Whether the primary engine can be used in this environment
    pub backend_available: bool,
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

impl StatusSnapshot {
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        let mut wire = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            wire.insert(key.to_string(), value);
        };

        put("authorized", flag(self.authorized));
        put("denied", flag(self.denied));
        put("restricted", flag(self.restricted));
        put("prepared", flag(self.prepared));
        put("scanning", flag(self.scanning));
        put("previewing", flag(self.previewing));
        put("showing", flag(self.showing));
        put("lightEnabled", flag(self.light_enabled));
        put("canOpenSettings", flag(self.can_open_settings));
        put("canEnableLight", flag(self.can_enable_light));
        put("canChangeCamera", flag(self.can_change_camera));
        put("currentCamera", self.current_camera.index().to_string());

        put("shouldShowRationale", flag(self.should_show_rationale));
        put("hapticFeedbackEnabled", flag(self.haptic_feedback_enabled));
        put(
            "performanceMonitoringEnabled",
            flag(self.performance.is_some()),
        );

        if let Some(capabilities) = &self.capabilities {
            put("hasAutofocus", flag(capabilities.has_autofocus));
            put("hasFrontCamera", flag(capabilities.has_front_camera));
            put("hasBackCamera", flag(capabilities.has_back_camera));
            put(
                "hasOpticalImageStabilization",
                flag(capabilities.has_optical_image_stabilization),
            );
            put(
                "supportedFocusModes",
                capabilities.supported_focus_modes.join(","),
            );
        }

        if let Some(performance) = &self.performance {
            put("scanCount", performance.scan_count.to_string());
            if let Some(last) = performance.last_scan_ms {
                put("lastScanTime", last.to_string());
            }
            if let Some(average) = performance.average_scan_ms {
                put("averageScanTime", format!("{:.0}", average));
            }
        }

        put("activeBackend", self.active_backend.as_str().to_string());
        put("backendAvailable", flag(self.backend_available));

        wire
    }
}

/// `{code, name, message}` delivered to the caller on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u8,
    pub name: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            code: kind.code(),
            name: kind.name().to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }
}

impl From<&ScannerError> for ErrorPayload {
    fn from(error: &ScannerError) -> Self {
        Self::new(error.kind(), error.message())
    }
}

impl From<&ScanFailure> for ErrorPayload {
    fn from(failure: &ScanFailure) -> Self {
        Self::new(failure.kind, failure.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::platform::CameraDevice;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            authorized: true,
            denied: false,
            restricted: false,
            prepared: true,
            scanning: false,
            previewing: true,
            showing: false,
            light_enabled: false,
            can_open_settings: true,
            can_enable_light: true,
            can_change_camera: false,
            current_camera: CameraFacing::Back,
            should_show_rationale: false,
            haptic_feedback_enabled: false,
            capabilities: None,
            performance: None,
            active_backend: ScannerBackendKind::FallbackEngine,
            backend_available: false,
        }
    }

    #[test]
    fn test_mandatory_fields_always_present() {
        let wire = snapshot().to_wire();
        for field in MANDATORY_FIELDS {
            assert!(wire.contains_key(field), "missing {}", field);
        }
        assert_eq!(wire["authorized"], "1");
        assert_eq!(wire["scanning"], "0");
        assert_eq!(wire["currentCamera"], "0");
        assert_eq!(wire["activeBackend"], "FallbackEngine");
        assert_eq!(wire["performanceMonitoringEnabled"], "0");
        assert!(!wire.contains_key("hasAutofocus"));
        assert!(!wire.contains_key("scanCount"));
    }

    #[test]
    fn test_capability_extensions() {
        let devices = CameraDevices {
            back: Some(
                CameraDevice::new("0", CameraFacing::Back)
                    .with_torch()
                    .with_autofocus(),
            ),
            front: None,
        };
        let mut status = snapshot();
        status.capabilities = Some(DeviceCapabilities::from_devices(&devices, CameraFacing::Back));
        status.performance = Some(PerformanceSummary {
            scan_count: 3,
            last_scan_ms: Some(120),
            average_scan_ms: Some(97.6),
            last_scan_at: None,
        });

        let wire = status.to_wire();
        assert_eq!(wire["hasAutofocus"], "1");
        assert_eq!(wire["hasFrontCamera"], "0");
        assert_eq!(wire["supportedFocusModes"], "auto,continuous");
        assert_eq!(wire["scanCount"], "3");
        assert_eq!(wire["lastScanTime"], "120");
        assert_eq!(wire["averageScanTime"], "98");
        assert_eq!(wire["performanceMonitoringEnabled"], "1");
    }

    #[test]
    fn test_error_payload() {
        let error = ScannerError::from(AdapterError::FrontCameraUnavailable);
        let payload = ErrorPayload::from(&error);
        assert_eq!(payload.code, 4);
        assert_eq!(payload.name, "front_camera_unavailable");
        assert_eq!(payload.kind(), Some(ErrorKind::FrontCameraUnavailable));

        let json = serde_json::to_value(ErrorPayload::from(&ScanFailure::canceled())).unwrap();
        assert_eq!(json["code"], 6);
        assert_eq!(json["name"], "scan_canceled");
    }
}
