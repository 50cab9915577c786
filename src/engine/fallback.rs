use super::{
    AnalysisPipeline, BarcodeDecoder, EngineContext, EngineFactory, RecognitionEngine, ScanSink,
};
use crate::backend::ScannerBackendKind;
use crate::error::AdapterError;
use crate::platform::CameraFacing;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Universally available backend with no external service dependency.
/// Every queued frame is analysed in order.
pub struct FallbackEngine {
    pipeline: AnalysisPipeline,
}

impl FallbackEngine {
    pub fn new(context: EngineContext, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        Self {
            pipeline: AnalysisPipeline::new(
                ScannerBackendKind::FallbackEngine,
                context,
                decoder,
                false,
            ),
        }
    }
}

#[async_trait]
impl RecognitionEngine for FallbackEngine {
    fn kind(&self) -> ScannerBackendKind {
        ScannerBackendKind::FallbackEngine
    }

    fn facing(&self) -> Option<CameraFacing> {
        self.pipeline.facing()
    }

    async fn initialize(&mut self, facing: CameraFacing) -> Result<(), AdapterError> {
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
        info!("Fallback engine resources released");
    }
}

pub struct FallbackEngineFactory {
    decoder: Arc<dyn BarcodeDecoder>,
}

impl FallbackEngineFactory {
    pub fn new(decoder: Arc<dyn BarcodeDecoder>) -> Self {
        Self { decoder }
    }
}

impl EngineFactory for FallbackEngineFactory {
    fn kind(&self) -> ScannerBackendKind {
        ScannerBackendKind::FallbackEngine
    }

    fn create(&self, context: EngineContext) -> Box<dyn RecognitionEngine> {
        Box::new(FallbackEngine::new(context, Arc::clone(&self.decoder)))
    }
}
