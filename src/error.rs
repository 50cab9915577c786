use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error taxonomy exposed to callers. The numeric codes are part of
/// the wire contract and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnexpectedError,
    CameraAccessDenied,
    CameraAccessRestricted,
    BackCameraUnavailable,
    FrontCameraUnavailable,
    CameraUnavailable,
    ScanCanceled,
    LightUnavailable,
    OpenSettingsUnavailable,
    CameraInitializationFailed,
    AutofocusUnavailable,
    LowMemoryWarning,
    SessionConfigurationFailed,
    DeviceNotSupported,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::UnexpectedError,
        ErrorKind::CameraAccessDenied,
        ErrorKind::CameraAccessRestricted,
        ErrorKind::BackCameraUnavailable,
        ErrorKind::FrontCameraUnavailable,
        ErrorKind::CameraUnavailable,
        ErrorKind::ScanCanceled,
        ErrorKind::LightUnavailable,
        ErrorKind::OpenSettingsUnavailable,
        ErrorKind::CameraInitializationFailed,
        ErrorKind::AutofocusUnavailable,
        ErrorKind::LowMemoryWarning,
        ErrorKind::SessionConfigurationFailed,
        ErrorKind::DeviceNotSupported,
    ];

    pub fn code(self) -> u8 {
        match self {
            ErrorKind::UnexpectedError => 0,
            ErrorKind::CameraAccessDenied => 1,
            ErrorKind::CameraAccessRestricted => 2,
            ErrorKind::BackCameraUnavailable => 3,
            ErrorKind::FrontCameraUnavailable => 4,
            ErrorKind::CameraUnavailable => 5,
            ErrorKind::ScanCanceled => 6,
            ErrorKind::LightUnavailable => 7,
            ErrorKind::OpenSettingsUnavailable => 8,
            ErrorKind::CameraInitializationFailed => 9,
            ErrorKind::AutofocusUnavailable => 10,
            ErrorKind::LowMemoryWarning => 11,
            ErrorKind::SessionConfigurationFailed => 12,
            ErrorKind::DeviceNotSupported => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UnexpectedError => "unexpected_error",
            ErrorKind::CameraAccessDenied => "camera_access_denied",
            ErrorKind::CameraAccessRestricted => "camera_access_restricted",
            ErrorKind::BackCameraUnavailable => "back_camera_unavailable",
            ErrorKind::FrontCameraUnavailable => "front_camera_unavailable",
            ErrorKind::CameraUnavailable => "camera_unavailable",
            ErrorKind::ScanCanceled => "scan_canceled",
            ErrorKind::LightUnavailable => "light_unavailable",
            ErrorKind::OpenSettingsUnavailable => "open_settings_unavailable",
            ErrorKind::CameraInitializationFailed => "camera_initialization_failed",
            ErrorKind::AutofocusUnavailable => "autofocus_unavailable",
            ErrorKind::LowMemoryWarning => "low_memory_warning",
            ErrorKind::SessionConfigurationFailed => "session_configuration_failed",
            ErrorKind::DeviceNotSupported => "device_not_supported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failures reported by a recognition engine adapter. This set is closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Back camera is not available on this device")]
    BackCameraUnavailable,

    #[error("Front camera is not available on this device")]
    FrontCameraUnavailable,

    #[error("Recognition engine initialization failed: {details}")]
    InitializationFailed { details: String },

    #[error("Decode engine failure: {details}")]
    DecodeEngineFailure { details: String },

    #[error("Device does not support the requested operation")]
    DeviceUnsupported,
}

impl AdapterError {
    pub fn initialization<S: Into<String>>(details: S) -> Self {
        Self::InitializationFailed {
            details: details.into(),
        }
    }

    pub fn decode<S: Into<String>>(details: S) -> Self {
        Self::DecodeEngineFailure {
            details: details.into(),
        }
    }

    /// Engine-level failures, as opposed to missing hardware.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            AdapterError::InitializationFailed { .. } | AdapterError::DecodeEngineFailure { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::BackCameraUnavailable => ErrorKind::BackCameraUnavailable,
            AdapterError::FrontCameraUnavailable => ErrorKind::FrontCameraUnavailable,
            AdapterError::InitializationFailed { .. } => ErrorKind::CameraInitializationFailed,
            AdapterError::DecodeEngineFailure { .. } => ErrorKind::CameraUnavailable,
            AdapterError::DeviceUnsupported => ErrorKind::DeviceNotSupported,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Recognition engine error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("{kind}: {message}")]
    Session { kind: ErrorKind, message: String },
}

impl ScannerError {
    pub fn session<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self::Session {
            kind,
            message: message.into(),
        }
    }

    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::session(ErrorKind::UnexpectedError, message)
    }

    /// Wire kind this error normalises to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScannerError::Adapter(error) => error.kind(),
            ScannerError::Session { kind, .. } => *kind,
            ScannerError::Config(_)
            | ScannerError::Io(_)
            | ScannerError::Serialization(_)
            | ScannerError::Json(_) => ErrorKind::UnexpectedError,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            ScannerError::Session { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Cloneable failure delivered to every caller waiting on one scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ScanFailure {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::ScanCanceled, "Scan was canceled")
    }
}

impl From<&ScannerError> for ScanFailure {
    fn from(error: &ScannerError) -> Self {
        Self::new(error.kind(), error.message())
    }
}

impl From<ScanFailure> for ScannerError {
    fn from(failure: ScanFailure) -> Self {
        ScannerError::session(failure.kind, failure.message)
    }
}

pub type Result<T> = std::result::Result<T, ScannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        for (index, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, index);
            assert_eq!(ErrorKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(ErrorKind::from_code(14), None);
        assert_eq!(ErrorKind::ScanCanceled.name(), "scan_canceled");
        assert_eq!(ErrorKind::LowMemoryWarning.code(), 11);
    }

    #[test]
    fn test_adapter_error_mapping() {
        assert_eq!(
            AdapterError::FrontCameraUnavailable.kind(),
            ErrorKind::FrontCameraUnavailable
        );
        assert_eq!(
            AdapterError::initialization("no client").kind(),
            ErrorKind::CameraInitializationFailed
        );
        assert_eq!(AdapterError::DeviceUnsupported.kind(), ErrorKind::DeviceNotSupported);
        assert!(AdapterError::decode("pipeline").is_engine_failure());
        assert!(!AdapterError::BackCameraUnavailable.is_engine_failure());
    }

    #[test]
    fn test_ambient_errors_normalise_to_unexpected() {
        let error = ScannerError::from(config::ConfigError::Message("bad".to_string()));
        assert_eq!(error.kind(), ErrorKind::UnexpectedError);

        let error = ScannerError::session(ErrorKind::LightUnavailable, "no torch");
        assert_eq!(error.kind(), ErrorKind::LightUnavailable);
        assert_eq!(error.message(), "no torch");
        assert_eq!(error.to_string(), "light_unavailable: no torch");
    }

    #[test]
    fn test_scan_failure_round_trip() {
        let failure = ScanFailure::canceled();
        let error: ScannerError = failure.clone().into();
        assert_eq!(error.kind(), ErrorKind::ScanCanceled);
        assert_eq!(ScanFailure::from(&error), failure);
    }
}
