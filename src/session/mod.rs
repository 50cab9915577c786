//! Camera session state machine.
//!
//! [`CameraSession`] owns the active recognition engine and the resolved
//! camera devices for one `prepare`..`destroy` lifecycle. Every
//! state-mutating operation runs under one async lock over [`SessionCore`];
//! engine outcomes are handed back onto that same path by a dispatcher task,
//! so a stale or racing decode can never mutate state on its own.

mod commands;
mod handle;
mod pending;
mod prepare;
mod state;
mod telemetry;

pub use handle::{CameraSession, CameraSessionBuilder};
pub use pending::{PendingScanRequest, ScanReply};
pub use state::{ReadyMode, SessionPhase, SessionState};
pub use telemetry::{PerformanceMonitor, PerformanceSample, PerformanceSummary};

use crate::backend::{BackendAvailability, BackendAvailabilityProber, ScannerSelector};
use crate::config::ScannerConfig;
use crate::engine::{EngineOutcome, RecognitionEngine, ScanToken};
use crate::events::EventBus;
use crate::platform::{CameraDevices, CameraProvider, PermissionProvider};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything guarded by the session lock
pub(crate) struct SessionCore {
    phase: SessionPhase,
    state: SessionState,
    devices: Option<CameraDevices>,
    availability: Option<BackendAvailability>,
    engine: Option<Box<dyn RecognitionEngine>>,
    selector: ScannerSelector,
    pending: Option<PendingScanRequest>,
    telemetry: PerformanceMonitor,
    next_token: u64,
}

impl SessionCore {
    fn new(config: &ScannerConfig, selector: ScannerSelector) -> Self {
        Self {
            phase: SessionPhase::Unprepared,
            state: SessionState::new(config.camera.default_facing),
            devices: None,
            availability: None,
            engine: None,
            selector,
            pending: None,
            telemetry: PerformanceMonitor::new(
                config.telemetry.performance_monitoring,
                config.telemetry.smoothing_weight,
            ),
            next_token: 0,
        }
    }

    fn issue_token(&mut self) -> ScanToken {
        self.next_token += 1;
        ScanToken(self.next_token)
    }

    /// Back to the freshly created state. Tokens keep counting so outcomes
    /// from a previous lifecycle stay stale.
    fn reset(&mut self, config: &ScannerConfig) {
        self.phase = SessionPhase::Destroyed;
        self.state = SessionState::new(config.camera.default_facing);
        self.devices = None;
        self.availability = None;
        self.engine = None;
        self.pending = None;
        self.selector.reset();
        self.telemetry.reset();
    }
}

/// Shared by every [`CameraSession`] clone and the outcome dispatcher
pub(crate) struct SessionInner {
    id: Uuid,
    config: ScannerConfig,
    core: Mutex<SessionCore>,
    camera: Arc<dyn CameraProvider>,
    permissions: Arc<dyn PermissionProvider>,
    prober: BackendAvailabilityProber,
    events: Arc<EventBus>,
    outcomes: mpsc::UnboundedSender<EngineOutcome>,
    /// Cancelled by destroy to abandon a suspended permission wait
    lifecycle: parking_lot::Mutex<CancellationToken>,
    /// Set while a prepare is suspended on the permission prompt
    permission_wait: parking_lot::Mutex<Option<Uuid>>,
}
