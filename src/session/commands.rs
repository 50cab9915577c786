use super::{CameraSession, PendingScanRequest, ScanReply, SessionCore, SessionInner};
use crate::backend::{FailureContext, FailureStage, FallbackDecision, ScannerBackendKind};
use crate::engine::ScanSink;
use crate::error::{AdapterError, ErrorKind, Result, ScanFailure, ScannerError};
use crate::events::ScannerEvent;
use crate::platform::{CameraDevices, CameraFacing};
use crate::status::StatusSnapshot;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl SessionInner {
    /// Register a scan, or join the one already pending
    fn register_scan(&self, core: &mut SessionCore) -> Result<oneshot::Receiver<ScanReply>> {
        if let Some(pending) = core.pending.as_mut() {
            return Ok(pending.join());
        }

        let token = core.issue_token();
        let engine = core
            .engine
            .as_mut()
            .ok_or_else(|| ScannerError::unexpected("No recognition engine is bound"))?;
        engine.start_continuous_scan(ScanSink::new(token, self.outcomes.clone()))?;

        let (request, receiver) = PendingScanRequest::new(token);
        core.pending = Some(request);
        core.state.scanning = !core.state.paused;
        info!("Scan {:?} started on {}", token, core.state.active_backend);
        self.emit(core);
        Ok(receiver)
    }

    fn no_engine() -> ScannerError {
        ScannerError::unexpected("Session is prepared but no recognition engine is bound")
    }
}

impl CameraSession {
    /// Check permission and bind the camera to the selected backend.
    /// Already prepared sessions just report their status.
    pub async fn prepare(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.lock_prepared().await?;
        Ok(self.inner.emit(&mut core))
    }

    /// Wait for the next decoded value, preparing first if needed.
    ///
    /// A call made while another scan is pending joins that request; both
    /// callers receive the same outcome.
    pub async fn scan(&self) -> Result<String> {
        let receiver = {
            let mut core = self.inner.lock_prepared().await?;
            self.inner.register_scan(&mut core)?
        };

        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(failure.into()),
            Err(_) => Err(ScannerError::unexpected(
                "Scan request ended without an outcome",
            )),
        }
    }

    /// Fail the pending scan with `scan_canceled`. A no-op without one.
    pub async fn cancel_scan(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        match core.pending.take() {
            Some(request) => {
                if let Some(engine) = core.engine.as_mut() {
                    engine.stop_scan();
                }
                core.state.scanning = false;
                info!("Scan {:?} canceled", request.token());
                self.inner.resolve_with_failure(request, ScanFailure::canceled());
            }
            None => debug!("No outstanding scan to cancel"),
        }
        Ok(self.inner.emit(&mut core))
    }

    pub async fn show(&self) -> Result<StatusSnapshot> {
        self.set_visible(true).await
    }

    pub async fn hide(&self) -> Result<StatusSnapshot> {
        self.set_visible(false).await
    }

    async fn set_visible(&self, visible: bool) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        core.state.visible = visible;
        Ok(self.inner.emit(&mut core))
    }

    /// Suspend frame delivery. A pending scan survives and resumes with the
    /// preview.
    pub async fn pause_preview(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        if core.state.prepared && !core.state.paused {
            self.inner.camera.set_connection_enabled(false);
            core.state.paused = true;
            core.state.previewing = false;
            core.state.scanning = false;
            info!("Preview paused");
        }
        Ok(self.inner.emit(&mut core))
    }

    pub async fn resume_preview(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        if core.state.prepared && core.state.paused {
            self.inner.camera.set_connection_enabled(true);
            core.state.paused = false;
            core.state.previewing = true;
            core.state.scanning = core.pending.is_some();
            info!("Preview resumed");
        }
        Ok(self.inner.emit(&mut core))
    }

    pub async fn enable_light(&self) -> Result<StatusSnapshot> {
        self.set_light(true).await
    }

    pub async fn disable_light(&self) -> Result<StatusSnapshot> {
        self.set_light(false).await
    }

    async fn set_light(&self, enabled: bool) -> Result<StatusSnapshot> {
        let mut core = self.inner.lock_prepared().await?;

        let facing = core.state.active_facing;
        let has_torch = core
            .devices
            .as_ref()
            .and_then(|devices| devices.get(facing))
            .is_some_and(|device| device.has_torch);
        if facing == CameraFacing::Front || !has_torch {
            return Err(light_unavailable(facing));
        }

        let engine = core.engine.as_mut().ok_or_else(SessionInner::no_engine)?;
        engine.set_torch(enabled).map_err(|e| match e {
            AdapterError::DeviceUnsupported => light_unavailable(facing),
            other => other.into(),
        })?;

        core.state.torch_on = enabled;
        Ok(self.inner.emit(&mut core))
    }

    /// Switch to `facing`. On failure the previous facing stays active.
    pub async fn use_camera(&self, facing: CameraFacing) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        if core.state.active_facing == facing {
            debug!("Already using the {} camera", facing);
            return Ok(self.inner.emit(&mut core));
        }

        if !core.state.prepared {
            // Recorded for the next prepare
            if !self.inner.camera.discover().has(facing) {
                return Err(facing.unavailable_error().into());
            }
            core.state.active_facing = facing;
            return Ok(self.inner.emit(&mut core));
        }

        if !core.devices.as_ref().is_some_and(CameraDevices::can_switch) {
            warn!("Camera switching requested but the {} camera is missing", facing);
            return Err(facing.unavailable_error().into());
        }

        let backend = core.state.active_backend;
        let engine = core.engine.as_mut().ok_or_else(SessionInner::no_engine)?;
        let switched = engine.switch_facing(facing).await;
        let still_bound = engine.facing().is_some();
        match switched {
            Ok(()) => {
                core.state.active_facing = facing;
                core.state.torch_on = false;
                info!("Switched to the {} camera", facing);
                Ok(self.inner.emit(&mut core))
            }
            Err(e) => {
                warn!("Could not switch to the {} camera: {}", facing, e);
                let failure = FailureContext::new(FailureStage::CameraSwitch, e.clone());
                let fall_back = backend == ScannerBackendKind::PrimaryEngine
                    && e.is_engine_failure()
                    && core.selector.handle_backend_failure(backend, &failure)
                        == FallbackDecision::SwitchToFallback;

                if fall_back {
                    self.inner.transition_to_fallback(&mut core, &failure).await?;
                } else if !still_bound {
                    // Neither camera is bound any more; the pending scan cannot finish
                    let lost = ScannerError::session(
                        ErrorKind::CameraUnavailable,
                        format!(
                            "Camera binding lost after failing to switch to the {} camera: {}",
                            facing, e
                        ),
                    );
                    self.inner.fail_backend(&mut core, &lost).await;
                    return Err(lost);
                }
                Err(ScannerError::session(
                    facing.unavailable_error().kind(),
                    format!("Could not switch to the {} camera: {}", facing, e),
                ))
            }
        }
    }

    pub async fn open_settings(&self) -> Result<StatusSnapshot> {
        let permissions = &self.inner.permissions;
        if !permissions.can_open_settings() || !permissions.open_settings().await {
            return Err(ScannerError::session(
                ErrorKind::OpenSettingsUnavailable,
                "Opening the application settings is not supported",
            ));
        }
        let mut core = self.inner.core.lock().await;
        Ok(self.inner.emit(&mut core))
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        let mut core = self.inner.core.lock().await;
        self.inner.snapshot(&mut core)
    }

    /// Cancel any pending scan, release the engine and camera, and reset the
    /// session. Idempotent.
    pub async fn destroy(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;

        // A prepare suspended on the permission prompt gives up
        let abandoned = std::mem::replace(&mut *self.inner.lifecycle.lock(), CancellationToken::new());
        abandoned.cancel();
        *self.inner.permission_wait.lock() = None;

        if let Some(request) = core.pending.take() {
            self.inner.resolve_with_failure(request, ScanFailure::canceled());
        }
        if let Some(mut engine) = core.engine.take() {
            engine.release().await;
        }
        self.inner.camera.set_connection_enabled(true);

        core.reset(&self.inner.config);
        info!("Camera session {} destroyed", self.inner.id);
        Ok(self.inner.emit(&mut core))
    }

    /// Host memory pressure: the pending scan fails with
    /// `low_memory_warning` while the session stays prepared.
    pub async fn handle_memory_pressure(&self) -> Result<StatusSnapshot> {
        let mut core = self.inner.core.lock().await;
        self.inner.events.publish(ScannerEvent::MemoryPressure);

        if let Some(request) = core.pending.take() {
            if let Some(engine) = core.engine.as_mut() {
                engine.stop_scan();
            }
            core.state.scanning = false;
            self.inner.resolve_with_failure(
                request,
                ScanFailure::new(
                    ErrorKind::LowMemoryWarning,
                    "Scanning suspended due to low memory",
                ),
            );
        }
        Ok(self.inner.emit(&mut core))
    }
}

fn light_unavailable(facing: CameraFacing) -> ScannerError {
    ScannerError::session(
        ErrorKind::LightUnavailable,
        format!("Torch is not available on the {} camera", facing),
    )
}
