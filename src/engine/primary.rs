use super::{
    AnalysisPipeline, BarcodeDecoder, EngineContext, EngineFactory, RecognitionEngine, ScanSink,
};
use crate::backend::ScannerBackendKind;
use crate::error::AdapterError;
use crate::platform::CameraFacing;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Hardware-accelerated backend backed by a platform recognition service.
///
/// The service client is warmed up on every fresh bind; a client that cannot
/// be created is reported as `InitializationFailed`, which the selector
/// treats as a reason to fall back.
pub struct PrimaryEngine {
    pipeline: AnalysisPipeline,
    warmed_up: bool,
}

impl PrimaryEngine {
    pub fn new(context: EngineContext, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        Self {
            // Analysis only ever looks at the newest frame
            pipeline: AnalysisPipeline::new(ScannerBackendKind::PrimaryEngine, context, decoder, true),
            warmed_up: false,
        }
    }
}

#[async_trait]
impl RecognitionEngine for PrimaryEngine {
    fn kind(&self) -> ScannerBackendKind {
        ScannerBackendKind::PrimaryEngine
    }

    fn facing(&self) -> Option<CameraFacing> {
        self.pipeline.facing()
    }

    async fn initialize(&mut self, facing: CameraFacing) -> Result<(), AdapterError> {
        if self.pipeline.facing() == Some(facing) {
            return Ok(());
        }

        if !self.warmed_up {
            let decoder = self.pipeline.decoder();
            decoder.warm_up().map_err(|e| {
                error!("Primary engine client could not be created: {}", e);
                AdapterError::initialization(e.to_string())
            })?;
            self.warmed_up = true;
            info!("Primary engine client '{}' ready", decoder.name());
        }

        self.pipeline.bind(facing).await
    }

    fn start_continuous_scan(&mut self, sink: ScanSink) -> Result<(), AdapterError> {
        self.pipeline.start_scan(sink)
    }

    fn stop_scan(&mut self) {
        self.pipeline.stop_scan();
    }

    fn is_scanning(&self) -> bool {
        self.pipeline.is_scanning()
    }

    async fn switch_facing(&mut self, facing: CameraFacing) -> Result<(), AdapterError> {
        self.pipeline.switch(facing).await
    }

    fn set_torch(&mut self, enabled: bool) -> Result<(), AdapterError> {
        self.pipeline.set_torch(enabled)
    }

    async fn release(&mut self) {
        self.pipeline.release().await;
        self.warmed_up = false;
        info!("Primary engine resources released");
    }
}

/// Creates [`PrimaryEngine`]s around one platform decoder
pub struct PrimaryEngineFactory {
    decoder: Arc<dyn BarcodeDecoder>,
}

impl PrimaryEngineFactory {
    pub fn new(decoder: Arc<dyn BarcodeDecoder>) -> Self {
        Self { decoder }
    }
}

impl EngineFactory for PrimaryEngineFactory {
    fn kind(&self) -> ScannerBackendKind {
        ScannerBackendKind::PrimaryEngine
    }

    fn create(&self, context: EngineContext) -> Box<dyn RecognitionEngine> {
        Box::new(PrimaryEngine::new(context, Arc::clone(&self.decoder)))
    }
}
