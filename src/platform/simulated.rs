//! In-process simulated platform.
//!
//! Stands in for real camera hardware, the permission prompt and the
//! primary engine's platform service. Frames carry their barcode payload as
//! raw UTF-8 bytes, which [`SimulatedDecoder`] reads back.

use super::{
    AuthorizationState, CameraDevice, CameraDevices, CameraFacing, CameraProvider, Frame,
    FrameStream, PermissionProvider, PlatformServices,
};
use crate::engine::{BarcodeDecoder, DecodeError, DecodedBarcode, Symbology};
use crate::error::AdapterError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

/// Simulated camera hardware with per-facing presence and fault injection
pub struct SimulatedCamera {
    devices: CameraDevices,
    queue_depth: usize,
    bindings: Mutex<HashMap<CameraFacing, mpsc::Sender<Frame>>>,
    failing_binds: Mutex<HashSet<CameraFacing>>,
    torch: Mutex<HashMap<CameraFacing, bool>>,
    connection_enabled: AtomicBool,
    sequence: AtomicU64,
    bind_count: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(devices: CameraDevices) -> Self {
        Self {
            devices,
            queue_depth: 4,
            bindings: Mutex::new(HashMap::new()),
            failing_binds: Mutex::new(HashSet::new()),
            torch: Mutex::new(HashMap::new()),
            connection_enabled: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
            bind_count: AtomicU64::new(0),
        }
    }

    /// Back camera with torch and autofocus, plus a plain front camera
    pub fn standard() -> Self {
        Self::new(CameraDevices {
            back: Some(
                CameraDevice::new("sim-back", CameraFacing::Back)
                    .with_torch()
                    .with_autofocus()
                    .with_optical_stabilization(),
            ),
            front: Some(CameraDevice::new("sim-front", CameraFacing::Front)),
        })
    }

    pub fn back_only() -> Self {
        Self::new(CameraDevices {
            back: Some(
                CameraDevice::new("sim-back", CameraFacing::Back)
                    .with_torch()
                    .with_autofocus(),
            ),
            front: None,
        })
    }

    pub fn front_only() -> Self {
        Self::new(CameraDevices {
            back: None,
            front: Some(CameraDevice::new("sim-front", CameraFacing::Front)),
        })
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Make every subsequent bind of `facing` fail
    pub fn fail_binds(&self, facing: CameraFacing) {
        self.failing_binds.lock().insert(facing);
    }

    pub fn allow_binds(&self, facing: CameraFacing) {
        self.failing_binds.lock().remove(&facing);
    }

    pub fn is_bound(&self, facing: CameraFacing) -> bool {
        self.bindings.lock().contains_key(&facing)
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn bind_count(&self) -> u64 {
        self.bind_count.load(Ordering::Relaxed)
    }

    pub fn torch_enabled(&self, facing: CameraFacing) -> bool {
        self.torch.lock().get(&facing).copied().unwrap_or(false)
    }

    pub fn connection_enabled(&self) -> bool {
        self.connection_enabled.load(Ordering::Relaxed)
    }

    /// Hold `payload` in front of every bound camera for one frame.
    /// Returns how many bindings received the frame.
    pub fn present(&self, payload: &str) -> usize {
        self.push_frame(payload.as_bytes().to_vec())
    }

    /// Deliver a frame with no barcode in it
    pub fn present_blank(&self) -> usize {
        self.push_frame(Vec::new())
    }

    fn push_frame(&self, data: Vec<u8>) -> usize {
        if !self.connection_enabled() {
            trace!("Simulated camera connection disabled; frame dropped");
            return 0;
        }

        let bindings = self.bindings.lock();
        let mut delivered = 0;
        for (facing, sender) in bindings.iter() {
            let frame = Frame {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                facing: *facing,
                width: 640,
                height: 480,
                data: data.clone(),
                timestamp: SystemTime::now(),
            };
            // A full queue drops the frame, as a real camera would
            if sender.try_send(frame).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl CameraProvider for SimulatedCamera {
    fn discover(&self) -> CameraDevices {
        self.devices.clone()
    }

    async fn bind(&self, device: &CameraDevice) -> Result<FrameStream, AdapterError> {
        if self.devices.get(device.facing).map(|d| &d.id) != Some(&device.id) {
            return Err(device.facing.unavailable_error());
        }
        if self.failing_binds.lock().contains(&device.facing) {
            return Err(AdapterError::initialization(format!(
                "simulated camera {} refused to bind",
                device.id
            )));
        }

        let (sender, receiver) = mpsc::channel(self.queue_depth);
        self.bindings.lock().insert(device.facing, sender);
        self.bind_count.fetch_add(1, Ordering::Relaxed);
        debug!("Simulated camera {} bound", device.id);
        Ok(receiver)
    }

    async fn unbind(&self, device: &CameraDevice) {
        if self.bindings.lock().remove(&device.facing).is_some() {
            debug!("Simulated camera {} unbound", device.id);
        }
        self.torch.lock().remove(&device.facing);
    }

    fn set_torch(&self, device: &CameraDevice, enabled: bool) -> Result<(), AdapterError> {
        if !device.has_torch {
            return Err(AdapterError::DeviceUnsupported);
        }
        self.torch.lock().insert(device.facing, enabled);
        Ok(())
    }

    fn set_connection_enabled(&self, enabled: bool) {
        self.connection_enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Scripted permission prompt
pub struct SimulatedPermissions {
    state: Mutex<AuthorizationState>,
    decision: Mutex<Option<AuthorizationState>>,
    prompt: Notify,
    auto_response: Option<AuthorizationState>,
    can_open_settings: bool,
    rationale: bool,
    requests: AtomicU64,
    settings_opened: AtomicU64,
}

impl SimulatedPermissions {
    fn with_state(state: AuthorizationState, auto_response: Option<AuthorizationState>) -> Self {
        Self {
            state: Mutex::new(state),
            decision: Mutex::new(None),
            prompt: Notify::new(),
            auto_response,
            can_open_settings: true,
            rationale: false,
            requests: AtomicU64::new(0),
            settings_opened: AtomicU64::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::with_state(AuthorizationState::Authorized, None)
    }

    pub fn denied() -> Self {
        Self::with_state(AuthorizationState::Denied, None)
    }

    pub fn restricted() -> Self {
        Self::with_state(AuthorizationState::Restricted, None)
    }

    /// Undetermined; `request_access` waits until [`respond`](Self::respond)
    pub fn prompting() -> Self {
        Self::with_state(AuthorizationState::Undetermined, None)
    }

    /// Undetermined; the prompt answers immediately with `response`
    pub fn auto_respond(response: AuthorizationState) -> Self {
        Self::with_state(AuthorizationState::Undetermined, Some(response))
    }

    pub fn without_settings(mut self) -> Self {
        self.can_open_settings = false;
        self
    }

    pub fn with_rationale(mut self) -> Self {
        self.rationale = true;
        self
    }

    /// Answer the outstanding (or next) permission prompt
    pub fn respond(&self, response: AuthorizationState) {
        *self.decision.lock() = Some(response);
        self.prompt.notify_one();
    }

    /// Change the stored permission, as if toggled in system settings
    pub fn set_state(&self, state: AuthorizationState) {
        *self.state.lock() = state;
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn settings_opened(&self) -> u64 {
        self.settings_opened.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PermissionProvider for SimulatedPermissions {
    fn authorization_status(&self) -> AuthorizationState {
        *self.state.lock()
    }

    async fn request_access(&self) -> AuthorizationState {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(response) = self.auto_response {
            *self.state.lock() = response;
            return response;
        }

        loop {
            let decision = self.decision.lock().take();
            if let Some(response) = decision {
                *self.state.lock() = response;
                return response;
            }
            self.prompt.notified().await;
        }
    }

    fn can_open_settings(&self) -> bool {
        self.can_open_settings
    }

    async fn open_settings(&self) -> bool {
        if !self.can_open_settings {
            return false;
        }
        self.settings_opened.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn should_show_rationale(&self) -> bool {
        self.rationale
    }
}

/// Simulated presence of the primary engine's platform service
pub struct SimulatedServices {
    available: AtomicBool,
}

impl SimulatedServices {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

impl PlatformServices for SimulatedServices {
    fn primary_engine_service_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}

/// Reads frame bytes back as the decoded payload
pub struct SimulatedDecoder {
    name: String,
    symbology: Symbology,
    warm_up_fails: AtomicBool,
    fail_next: AtomicBool,
    fail_always: AtomicBool,
    decode_delay: Duration,
    decoded: AtomicU64,
}

impl SimulatedDecoder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            symbology: Symbology::Qr,
            warm_up_fails: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
            fail_always: AtomicBool::new(false),
            decode_delay: Duration::ZERO,
            decoded: AtomicU64::new(0),
        }
    }

    pub fn with_symbology(mut self, symbology: Symbology) -> Self {
        self.symbology = symbology;
        self
    }

    /// Spend `delay` on every non-empty frame, as a slow recognizer would
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn fail_warm_up(&self) {
        self.warm_up_fails.store(true, Ordering::Relaxed);
    }

    /// The next non-empty frame reports an engine failure
    pub fn fail_next_decode(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }

    pub fn fail_every_decode(&self) {
        self.fail_always.store(true, Ordering::Relaxed);
    }

    pub fn decoded_count(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }
}

impl BarcodeDecoder for SimulatedDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn warm_up(&self) -> Result<(), DecodeError> {
        if self.warm_up_fails.load(Ordering::Relaxed) {
            return Err(DecodeError::new(&self.name, "recognition client unavailable"));
        }
        Ok(())
    }

    fn decode(&self, frame: &Frame) -> Result<Option<DecodedBarcode>, DecodeError> {
        if frame.data.is_empty() {
            return Ok(None);
        }
        if !self.decode_delay.is_zero() {
            // Runs on a blocking thread
            std::thread::sleep(self.decode_delay);
        }
        if self.fail_always.load(Ordering::Relaxed) || self.fail_next.swap(false, Ordering::Relaxed)
        {
            return Err(DecodeError::new(&self.name, "decode pipeline crashed"));
        }

        let value = String::from_utf8(frame.data.clone())
            .map_err(|e| DecodeError::new(&self.name, format!("invalid payload: {}", e)))?;
        self.decoded.fetch_add(1, Ordering::Relaxed);
        Ok(Some(DecodedBarcode {
            value,
            symbology: self.symbology,
        }))
    }
}
