//! Interfaces to the host platform: camera hardware, camera permission and
//! the service the primary recognition engine depends on.
//!
//! The session never talks to hardware directly. Every platform capability
//! is injected as a trait object so a host binding (or the in-process
//! [`simulated`] platform) can be swapped in without touching the state
//! machine.

pub mod simulated;

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use tokio::sync::mpsc;

/// Logical camera selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Back,
    Front,
}

impl CameraFacing {
    /// Wire index: 0 = back, 1 = front
    pub fn index(self) -> u8 {
        match self {
            CameraFacing::Back => 0,
            CameraFacing::Front => 1,
        }
    }

    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(CameraFacing::Back),
            1 => Some(CameraFacing::Front),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraFacing::Back => "back",
            CameraFacing::Front => "front",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }

    /// Adapter error reported when no device exists for this facing
    pub fn unavailable_error(self) -> AdapterError {
        match self {
            CameraFacing::Back => AdapterError::BackCameraUnavailable,
            CameraFacing::Front => AdapterError::FrontCameraUnavailable,
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthorizationState {
    #[default]
    Undetermined,
    Authorized,
    Denied,
    Restricted,
}

/// Handle to one physical camera and the hardware features it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub facing: CameraFacing,
    pub has_torch: bool,
    pub has_autofocus: bool,
    pub has_optical_stabilization: bool,
    pub focus_modes: Vec<String>,
}

impl CameraDevice {
    pub fn new<S: Into<String>>(id: S, facing: CameraFacing) -> Self {
        Self {
            id: id.into(),
            facing,
            has_torch: false,
            has_autofocus: false,
            has_optical_stabilization: false,
            focus_modes: Vec::new(),
        }
    }

    pub fn with_torch(mut self) -> Self {
        self.has_torch = true;
        self
    }

    pub fn with_autofocus(mut self) -> Self {
        self.has_autofocus = true;
        self.focus_modes = vec!["auto".to_string(), "continuous".to_string()];
        self
    }

    pub fn with_optical_stabilization(mut self) -> Self {
        self.has_optical_stabilization = true;
        self
    }
}

/// At most one resolved device per facing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevices {
    pub back: Option<CameraDevice>,
    pub front: Option<CameraDevice>,
}

impl CameraDevices {
    pub fn get(&self, facing: CameraFacing) -> Option<&CameraDevice> {
        match facing {
            CameraFacing::Back => self.back.as_ref(),
            CameraFacing::Front => self.front.as_ref(),
        }
    }

    pub fn has(&self, facing: CameraFacing) -> bool {
        self.get(facing).is_some()
    }

    /// Switching is only offered when both facings exist
    pub fn can_switch(&self) -> bool {
        self.back.is_some() && self.front.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.back.is_none() && self.front.is_none()
    }
}

/// One captured camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub facing: CameraFacing,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp: SystemTime,
}

/// Frames produced by a camera binding; the sender side belongs to the
/// provider and closes when the binding is released.
pub type FrameStream = mpsc::Receiver<Frame>;

/// Live camera capture
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Resolve the device handle for each facing
    fn discover(&self) -> CameraDevices;

    /// Start capture from `device` and return its frame stream
    async fn bind(&self, device: &CameraDevice) -> Result<FrameStream, AdapterError>;

    /// Stop capture from `device`. Must tolerate devices that are not bound.
    async fn unbind(&self, device: &CameraDevice);

    fn set_torch(&self, device: &CameraDevice, enabled: bool) -> Result<(), AdapterError>;

    /// Enable or suspend frame delivery without tearing down the binding
    fn set_connection_enabled(&self, enabled: bool);
}

/// Camera permission handling
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn authorization_status(&self) -> AuthorizationState;

    /// Ask the user for camera access. May suspend for an unbounded time.
    async fn request_access(&self) -> AuthorizationState;

    fn can_open_settings(&self) -> bool;

    async fn open_settings(&self) -> bool;

    fn should_show_rationale(&self) -> bool {
        false
    }
}

/// Presence checks for services outside the camera stack
pub trait PlatformServices: Send + Sync {
    /// Whether the platform service backing the primary engine is installed
    /// and usable. Absence is an ordinary answer, never an error.
    fn primary_engine_service_available(&self) -> bool;
}
