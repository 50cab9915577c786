use crate::backend::ScannerBackendKind;
use crate::platform::{AuthorizationState, CameraFacing};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of the camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Unprepared,
    AwaitingPermission,
    Preparing,
    Ready,
    /// Terminal for the current lifecycle; the next prepare starts over
    Destroyed,
}

/// Sub-state of [`SessionPhase::Ready`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyMode {
    Idle,
    Previewing,
    Scanning,
    Paused,
}

/// Single source of truth for what the caller sees.
///
/// `scanning` implies `prepared`, and `paused` implies `!scanning`: pausing
/// suspends frame delivery while any pending request survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub authorization_state: AuthorizationState,
    pub prepared: bool,
    pub scanning: bool,
    pub paused: bool,
    pub previewing: bool,
    pub visible: bool,
    pub torch_on: bool,
    pub active_facing: CameraFacing,
    pub active_backend: ScannerBackendKind,
}

impl SessionState {
    pub fn new(default_facing: CameraFacing) -> Self {
        Self {
            authorization_state: AuthorizationState::Undetermined,
            prepared: false,
            scanning: false,
            paused: false,
            previewing: false,
            visible: false,
            torch_on: false,
            active_facing: default_facing,
            active_backend: ScannerBackendKind::default(),
        }
    }

    /// `None` unless the session is prepared
    pub fn ready_mode(&self) -> Option<ReadyMode> {
        if !self.prepared {
            return None;
        }
        Some(if self.paused {
            ReadyMode::Paused
        } else if self.scanning {
            ReadyMode::Scanning
        } else if self.previewing {
            ReadyMode::Previewing
        } else {
            ReadyMode::Idle
        })
    }

    /// Drop everything tied to the camera binding, keeping the caller's
    /// facing choice and visibility
    pub(crate) fn clear_binding(&mut self) {
        self.prepared = false;
        self.scanning = false;
        self.paused = false;
        self.previewing = false;
        self.torch_on = false;
    }
}
