use super::{BarcodeDecoder, DecodedBarcode, EngineContext, ScanSink};
use crate::backend::ScannerBackendKind;
use crate::error::AdapterError;
use crate::platform::{CameraDevice, CameraFacing, FrameStream};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Active camera binding and the worker consuming its frames
struct Binding {
    device: CameraDevice,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Camera binding plus frame-analysis worker shared by both engines.
///
/// The scan slot holds at most one [`ScanSink`]; the worker takes it on the
/// first decode or failure, which makes every scan single-shot.
pub struct AnalysisPipeline {
    kind: ScannerBackendKind,
    context: EngineContext,
    decoder: Arc<dyn BarcodeDecoder>,
    keep_latest_frame: bool,
    binding: Option<Binding>,
    slot: Arc<Mutex<Option<ScanSink>>>,
}

impl AnalysisPipeline {
    pub fn new(
        kind: ScannerBackendKind,
        context: EngineContext,
        decoder: Arc<dyn BarcodeDecoder>,
        keep_latest_frame: bool,
    ) -> Self {
        Self {
            kind,
            context,
            decoder,
            keep_latest_frame,
            binding: None,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn decoder(&self) -> &Arc<dyn BarcodeDecoder> {
        &self.decoder
    }

    pub fn facing(&self) -> Option<CameraFacing> {
        self.binding.as_ref().map(|binding| binding.device.facing)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Bind to `facing`, replacing any existing binding
    pub async fn bind(&mut self, facing: CameraFacing) -> Result<(), AdapterError> {
        if self.facing() == Some(facing) {
            debug!("{} already bound to {} camera", self.kind, facing);
            return Ok(());
        }

        let device = self
            .context
            .devices
            .get(facing)
            .cloned()
            .ok_or_else(|| facing.unavailable_error())?;

        self.unbind().await;
        self.bind_device(device).await
    }

    /// Rebind to `facing`, restoring the previous binding if the new one fails.
    /// When the restore fails too the pipeline is left unbound.
    pub async fn switch(&mut self, facing: CameraFacing) -> Result<(), AdapterError> {
        let previous = match &self.binding {
            Some(binding) if binding.device.facing == facing => return Ok(()),
            Some(binding) => binding.device.clone(),
            None => return self.bind(facing).await,
        };

        let target = self
            .context
            .devices
            .get(facing)
            .cloned()
            .ok_or_else(|| facing.unavailable_error())?;

        info!(
            "{} switching camera from {} to {}",
            self.kind, previous.facing, facing
        );
        self.unbind().await;

        match self.bind_device(target).await {
            Ok(()) => Ok(()),
            Err(switch_error) => {
                warn!(
                    "{} failed to bind {} camera ({}); restoring {} camera",
                    self.kind, facing, switch_error, previous.facing
                );
                if let Err(restore_error) = self.bind_device(previous).await {
                    error!(
                        "{} could not restore previous camera binding: {}",
                        self.kind, restore_error
                    );
                }
                Err(switch_error)
            }
        }
    }

    async fn bind_device(&mut self, device: CameraDevice) -> Result<(), AdapterError> {
        let bind_timeout = self.context.bind_timeout;
        let frames = match timeout(bind_timeout, self.context.camera.bind(&device)).await {
            Ok(result) => result?,
            Err(_) => {
                // Leave the device in a known state before reporting
                self.context.camera.unbind(&device).await;
                return Err(AdapterError::initialization(format!(
                    "camera {} did not bind within {:?}",
                    device.id, bind_timeout
                )));
            }
        };

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_analysis(
            self.kind,
            frames,
            Arc::clone(&self.slot),
            Arc::clone(&self.decoder),
            self.keep_latest_frame,
            cancel.clone(),
        ));

        info!("{} bound to {} camera ({})", self.kind, device.facing, device.id);
        self.binding = Some(Binding {
            device,
            cancel,
            worker,
        });
        Ok(())
    }

    /// Stop the worker and release the camera binding, keeping the scan slot
    pub async fn unbind(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.cancel.cancel();
            match timeout(Duration::from_secs(1), &mut binding.worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{} analysis worker ended abnormally: {}", self.kind, e),
                Err(_) => {
                    warn!("{} analysis worker did not stop within timeout", self.kind);
                    binding.worker.abort();
                }
            }
            self.context.camera.unbind(&binding.device).await;
            debug!("{} unbound {} camera", self.kind, binding.device.facing);
        }
    }

    pub fn start_scan(&mut self, sink: ScanSink) -> Result<(), AdapterError> {
        if self.binding.is_none() {
            return Err(AdapterError::initialization(format!(
                "{} is not bound to a camera",
                self.kind
            )));
        }
        trace!("{} accepting frames for scan {:?}", self.kind, sink.token);
        *self.slot.lock() = Some(sink);
        Ok(())
    }

    pub fn stop_scan(&mut self) {
        if self.slot.lock().take().is_some() {
            debug!("{} stopped scanning", self.kind);
        }
    }

    pub fn set_torch(&self, enabled: bool) -> Result<(), AdapterError> {
        let binding = self
            .binding
            .as_ref()
            .ok_or(AdapterError::DeviceUnsupported)?;
        if !binding.device.has_torch {
            return Err(AdapterError::DeviceUnsupported);
        }
        self.context.camera.set_torch(&binding.device, enabled)?;
        info!("Torch {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn release(&mut self) {
        self.stop_scan();
        if let Some(binding) = &self.binding {
            if binding.device.has_torch {
                let _ = self.context.camera.set_torch(&binding.device, false);
            }
        }
        self.unbind().await;
    }
}

/// Frame worker: decodes frames off the session's control path and posts
/// the first result of each scan.
async fn run_analysis(
    kind: ScannerBackendKind,
    mut frames: FrameStream,
    slot: Arc<Mutex<Option<ScanSink>>>,
    decoder: Arc<dyn BarcodeDecoder>,
    keep_latest_frame: bool,
    cancel: CancellationToken,
) {
    debug!("{} analysis worker started", kind);

    loop {
        let mut frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if keep_latest_frame {
            while let Ok(newer) = frames.try_recv() {
                frame = newer;
            }
        }

        // The result of this frame belongs to the scan active when it was taken
        let active = slot.lock().as_ref().map(|sink| sink.token);
        let Some(token) = active else {
            trace!("{} dropping frame {} (not scanning)", kind, frame.sequence);
            continue;
        };

        let sequence = frame.sequence;
        let frame_decoder = Arc::clone(&decoder);
        let decoded = tokio::task::spawn_blocking(move || frame_decoder.decode(&frame)).await;

        let result: Result<DecodedBarcode, AdapterError> = match decoded {
            Ok(Ok(Some(barcode))) if barcode.symbology.is_supported() && !barcode.value.is_empty() => {
                Ok(barcode)
            }
            Ok(Ok(Some(barcode))) => {
                trace!(
                    "{} ignoring {:?} barcode in frame {}",
                    kind,
                    barcode.symbology,
                    sequence
                );
                continue;
            }
            Ok(Ok(None)) => continue,
            Ok(Err(e)) => {
                error!("{} barcode detection failed: {}", kind, e);
                Err(AdapterError::decode(e.to_string()))
            }
            Err(e) => {
                error!("{} decode task failed: {}", kind, e);
                Err(AdapterError::decode(format!("decode task failed: {}", e)))
            }
        };

        // The scan may have been stopped or replaced during the decode
        let sink = {
            let mut slot = slot.lock();
            if slot.as_ref().map(|sink| sink.token) == Some(token) {
                slot.take()
            } else {
                None
            }
        };
        let Some(sink) = sink else {
            debug!(
                "{} discarding result for frame {} (scan {:?} no longer active)",
                kind, sequence, token
            );
            continue;
        };

        if let Ok(barcode) = &result {
            info!("{} detected {:?} barcode", kind, barcode.symbology);
        }
        sink.deliver(kind, result);
    }

    debug!("{} analysis worker stopped", kind);
}
