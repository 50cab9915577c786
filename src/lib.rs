pub mod backend;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod platform;
pub mod session;
pub mod status;

pub use backend::{
    BackendAvailability, BackendAvailabilityProber, BackendPreference, FallbackDecision,
    ScannerBackendKind, ScannerCapability, ScannerSelector,
};
pub use bridge::{BridgeReply, ScannerBridge, ScannerCommand};
pub use config::ScannerConfig;
pub use engine::{
    BarcodeDecoder, FallbackEngine, FallbackEngineFactory, PrimaryEngine, PrimaryEngineFactory,
    RecognitionEngine, Symbology,
};
pub use error::{AdapterError, ErrorKind, Result, ScannerError};
pub use events::{EventBus, ScannerEvent};
pub use platform::{
    AuthorizationState, CameraDevice, CameraDevices, CameraFacing, CameraProvider,
    PermissionProvider, PlatformServices,
};
pub use session::{CameraSession, CameraSessionBuilder, SessionPhase, SessionState};
pub use status::{ErrorPayload, StatusSnapshot};
