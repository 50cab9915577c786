use super::{PendingScanRequest, SessionCore, SessionInner, SessionPhase};
use crate::backend::{FailureContext, FailureStage, FallbackDecision, ScannerBackendKind};
use crate::engine::{EngineContext, EngineOutcome, RecognitionEngine, ScanSink};
use crate::error::{AdapterError, ErrorKind, Result, ScanFailure, ScannerError};
use crate::events::ScannerEvent;
use crate::platform::{AuthorizationState, CameraDevices, CameraFacing};
use crate::status::{DeviceCapabilities, ErrorPayload, StatusSnapshot};
use chrono::Utc;
use tokio::sync::MutexGuard;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Facing to bind at prepare. A missing back camera falls over to the front
/// one (and vice versa); no camera at all is reported as a missing back camera.
pub(super) fn resolve_facing(devices: &CameraDevices, requested: CameraFacing) -> Result<CameraFacing> {
    if devices.has(requested) {
        return Ok(requested);
    }

    let other = requested.opposite();
    if devices.has(other) {
        warn!(
            "{} camera not present; using {} camera instead",
            requested, other
        );
        return Ok(other);
    }

    Err(AdapterError::BackCameraUnavailable.into())
}

/// Marks a prepare suspended on the permission prompt. The mark clears
/// when the guard drops, including when the waiting call itself is dropped.
struct PermissionWait<'a> {
    slot: &'a parking_lot::Mutex<Option<Uuid>>,
    id: Uuid,
}

impl<'a> PermissionWait<'a> {
    fn begin(slot: &'a parking_lot::Mutex<Option<Uuid>>) -> Self {
        let id = Uuid::new_v4();
        *slot.lock() = Some(id);
        Self { slot, id }
    }
}

impl Drop for PermissionWait<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        // destroy may already have cleared it, and a newer wait may own it
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

impl SessionInner {
    pub(super) fn phase(&self, core: &SessionCore) -> SessionPhase {
        if self.permission_wait.lock().is_some() {
            SessionPhase::AwaitingPermission
        } else {
            core.phase
        }
    }

    /// Lock the session core, running prepare first when the session is not
    /// prepared yet.
    pub(super) async fn lock_prepared(&self) -> Result<MutexGuard<'_, SessionCore>> {
        let mut core = self.core.lock().await;
        if core.state.prepared {
            return Ok(core);
        }
        if self.permission_wait.lock().is_some() {
            return Err(ScannerError::unexpected(
                "Camera permission request already in progress",
            ));
        }

        core.state.authorization_state = self.permissions.authorization_status();
        if core.state.authorization_state == AuthorizationState::Undetermined {
            let wait = PermissionWait::begin(&self.permission_wait);
            let lifecycle = self.lifecycle.lock().clone();
            drop(core);

            info!("Requesting camera permission");
            let decision = tokio::select! {
                state = self.permissions.request_access() => Some(state),
                _ = lifecycle.cancelled() => None,
            };

            core = self.core.lock().await;
            drop(wait);
            match decision {
                Some(state) if !lifecycle.is_cancelled() => {
                    info!("Camera permission resolved: {:?}", state);
                    core.state.authorization_state = state;
                }
                _ => {
                    warn!("Session destroyed while awaiting camera permission");
                    return Err(ScannerError::unexpected(
                        "Session destroyed while awaiting camera permission",
                    ));
                }
            }
        }

        match core.state.authorization_state {
            AuthorizationState::Authorized => {}
            AuthorizationState::Restricted => {
                return Err(ScannerError::session(
                    ErrorKind::CameraAccessRestricted,
                    "Camera access is restricted on this device",
                ));
            }
            AuthorizationState::Denied | AuthorizationState::Undetermined => {
                return Err(ScannerError::session(
                    ErrorKind::CameraAccessDenied,
                    "Camera access was denied",
                ));
            }
        }

        self.bring_up(&mut core).await?;
        Ok(core)
    }

    async fn bring_up(&self, core: &mut SessionCore) -> Result<()> {
        core.phase = SessionPhase::Preparing;
        match self.bind_backend(core).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Camera session prepare failed: {}", e);
                core.phase = SessionPhase::Unprepared;
                Err(e)
            }
        }
    }

    async fn bind_backend(&self, core: &mut SessionCore) -> Result<()> {
        let devices = self.camera.discover();
        let facing = resolve_facing(&devices, core.state.active_facing)?;

        let availability = core.selector.effective_availability(self.prober.probe());
        let mut backend = core.selector.choose_backend(&availability);
        core.selector.log_selection(backend, &availability);

        let mut engine = core.selector.create(backend, self.engine_context(&devices))?;
        if let Err(e) = engine.initialize(facing).await {
            engine.release().await;
            let failure = FailureContext::new(FailureStage::Initialization, e.clone());
            match core.selector.handle_backend_failure(backend, &failure) {
                FallbackDecision::SwitchToFallback => {
                    engine = self
                        .start_fallback_engine(core, &devices, facing, &failure)
                        .await?;
                    backend = ScannerBackendKind::FallbackEngine;
                }
                FallbackDecision::Fatal => return Err(e.into()),
            }
        }

        self.camera.set_connection_enabled(true);
        core.devices = Some(devices);
        core.availability = Some(availability);
        core.engine = Some(engine);

        let state = &mut core.state;
        state.prepared = true;
        state.previewing = true;
        state.paused = false;
        state.scanning = false;
        state.torch_on = false;
        state.active_facing = facing;
        state.active_backend = backend;
        core.phase = SessionPhase::Ready;

        self.events.publish(ScannerEvent::BackendSelected {
            backend,
            availability,
        });
        info!("Camera session prepared: {} on {} camera", backend, facing);
        Ok(())
    }

    fn engine_context(&self, devices: &CameraDevices) -> EngineContext {
        EngineContext {
            camera: self.camera.clone(),
            devices: devices.clone(),
            bind_timeout: self.config.camera.bind_timeout(),
        }
    }

    /// Create and bind the fallback engine. Telemetry restarts because
    /// samples from two engines are not comparable.
    async fn start_fallback_engine(
        &self,
        core: &mut SessionCore,
        devices: &CameraDevices,
        facing: CameraFacing,
        failure: &FailureContext,
    ) -> Result<Box<dyn RecognitionEngine>> {
        let mut engine = core
            .selector
            .create(ScannerBackendKind::FallbackEngine, self.engine_context(devices))
            .map_err(|e| {
                ScannerError::session(
                    ErrorKind::CameraUnavailable,
                    format!("Fallback engine could not be created: {}", e),
                )
            })?;

        if let Err(e) = engine.initialize(facing).await {
            engine.release().await;
            return Err(ScannerError::session(
                ErrorKind::CameraUnavailable,
                format!("Fallback engine could not bind the {} camera: {}", facing, e),
            ));
        }

        core.telemetry.reset();
        self.events.publish(ScannerEvent::FallbackTransition {
            from: ScannerBackendKind::PrimaryEngine,
            to: ScannerBackendKind::FallbackEngine,
            reason: format!("{:?}: {}", failure.stage, failure.error),
        });
        Ok(engine)
    }

    /// Replace the running primary engine with the fallback engine on the
    /// same facing. A pending scan stays registered throughout and resumes on
    /// the new engine.
    pub(super) async fn transition_to_fallback(
        &self,
        core: &mut SessionCore,
        failure: &FailureContext,
    ) -> Result<()> {
        if let Some(mut engine) = core.engine.take() {
            engine.release().await;
        }

        let devices = core
            .devices
            .clone()
            .unwrap_or_else(|| self.camera.discover());
        let facing = core.state.active_facing;

        let mut engine = match self
            .start_fallback_engine(core, &devices, facing, failure)
            .await
        {
            Ok(engine) => engine,
            Err(e) => {
                self.fail_binding(core, &e);
                return Err(e);
            }
        };

        core.state.active_backend = ScannerBackendKind::FallbackEngine;
        core.state.torch_on = false;

        if let Some(token) = core.pending.as_ref().map(PendingScanRequest::token) {
            if let Err(e) = engine.start_continuous_scan(ScanSink::new(token, self.outcomes.clone())) {
                engine.release().await;
                let e = ScannerError::session(
                    ErrorKind::CameraUnavailable,
                    format!("Fallback engine could not resume scanning: {}", e),
                );
                self.fail_binding(core, &e);
                return Err(e);
            }
            core.state.scanning = !core.state.paused;
        }

        core.engine = Some(engine);
        info!("Now scanning with {}", ScannerBackendKind::FallbackEngine);
        self.emit(core);
        Ok(())
    }

    /// Apply one engine outcome on the serialized control path
    pub(super) async fn apply_outcome(&self, core: &mut SessionCore, outcome: EngineOutcome) {
        let pending = core.pending.as_ref().map(PendingScanRequest::token);
        if pending != Some(outcome.token) {
            debug!(
                "Discarding stale outcome for scan {:?} from {}",
                outcome.token, outcome.backend
            );
            return;
        }

        match outcome.result {
            Ok(barcode) => {
                let Some(request) = core.pending.take() else {
                    return;
                };
                // Another engine may still hold a sink for this token
                if let Some(engine) = core.engine.as_mut() {
                    engine.stop_scan();
                }
                core.state.scanning = false;

                let elapsed = request.elapsed();
                core.telemetry.record(elapsed);
                info!(
                    "Scan {:?} resolved by {} in {} ms",
                    request.token(),
                    outcome.backend,
                    elapsed.as_millis()
                );
                self.events.publish(ScannerEvent::ScanCompleted {
                    backend: outcome.backend,
                    duration_ms: elapsed.as_millis() as u64,
                    at: Utc::now(),
                });
                request.complete(Ok(barcode.value));
                self.emit(core);
            }
            Err(e) if outcome.backend != core.state.active_backend => {
                debug!(
                    "Ignoring failure from inactive {}: {}",
                    outcome.backend, e
                );
            }
            Err(e) => {
                let failure = FailureContext::new(FailureStage::Scanning, e.clone());
                match core.selector.handle_backend_failure(outcome.backend, &failure) {
                    FallbackDecision::SwitchToFallback => {
                        if let Err(transition_error) = self.transition_to_fallback(core, &failure).await {
                            error!("Fallback transition failed: {}", transition_error);
                        }
                    }
                    FallbackDecision::Fatal => self.fail_backend(core, &ScannerError::from(e)).await,
                }
            }
        }
    }

    /// The active engine cannot continue; release it and fail the pending
    /// request. The session survives and re-prepares on the next operation.
    pub(super) async fn fail_backend(&self, core: &mut SessionCore, error: &ScannerError) {
        error!("{} failed: {}", core.state.active_backend, error);
        if let Some(mut engine) = core.engine.take() {
            engine.release().await;
        }
        self.fail_binding(core, error);
    }

    fn fail_binding(&self, core: &mut SessionCore, error: &ScannerError) {
        if let Some(request) = core.pending.take() {
            self.resolve_with_failure(request, ScanFailure::from(error));
        }
        core.engine = None;
        core.state.clear_binding();
        core.phase = SessionPhase::Unprepared;
        self.emit(core);
    }

    pub(super) fn resolve_with_failure(&self, request: PendingScanRequest, failure: ScanFailure) {
        self.events.publish(ScannerEvent::ScanFailed {
            error: ErrorPayload::from(&failure),
        });
        request.complete(Err(failure));
    }

    /// Current wire snapshot; refreshes the platform authorization state
    pub(super) fn snapshot(&self, core: &mut SessionCore) -> StatusSnapshot {
        if self.phase(core) != SessionPhase::AwaitingPermission {
            core.state.authorization_state = self.permissions.authorization_status();
        }

        let availability = core
            .availability
            .unwrap_or_else(|| core.selector.effective_availability(self.prober.probe()));
        let state = &core.state;
        let active_device = core
            .devices
            .as_ref()
            .and_then(|devices| devices.get(state.active_facing));

        StatusSnapshot {
            authorized: state.authorization_state == AuthorizationState::Authorized,
            denied: state.authorization_state == AuthorizationState::Denied,
            restricted: state.authorization_state == AuthorizationState::Restricted,
            prepared: state.prepared,
            scanning: state.scanning,
            previewing: state.previewing,
            showing: state.visible,
            light_enabled: state.torch_on,
            can_open_settings: self.permissions.can_open_settings(),
            can_enable_light: state.prepared
                && state.active_facing == CameraFacing::Back
                && active_device.is_some_and(|device| device.has_torch),
            can_change_camera: core
                .devices
                .as_ref()
                .is_some_and(CameraDevices::can_switch),
            current_camera: state.active_facing,
            should_show_rationale: self.permissions.should_show_rationale(),
            haptic_feedback_enabled: self.config.telemetry.haptic_feedback,
            capabilities: core
                .devices
                .as_ref()
                .map(|devices| DeviceCapabilities::from_devices(devices, state.active_facing)),
            performance: core.telemetry.summary(),
            active_backend: state.active_backend,
            backend_available: availability.primary_engine_usable,
        }
    }

    /// Snapshot and publish it; ends every transition
    pub(super) fn emit(&self, core: &mut SessionCore) -> StatusSnapshot {
        let status = self.snapshot(core);
        self.events.publish(ScannerEvent::StatusChanged {
            status: status.clone(),
        });
        status
    }
}
