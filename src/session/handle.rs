use super::{SessionCore, SessionInner, SessionPhase, SessionState};
use crate::backend::{BackendAvailabilityProber, ScannerBackendKind, ScannerSelector};
use crate::config::ScannerConfig;
use crate::engine::{EngineFactory, EngineOutcome};
use crate::error::{Result, ScannerError};
use crate::events::{EventBus, ScannerEvent};
use crate::platform::{CameraProvider, PermissionProvider, PlatformServices};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Cloneable handle to one camera session
#[derive(Clone)]
pub struct CameraSession {
    pub(super) inner: Arc<SessionInner>,
}

impl CameraSession {
    pub fn builder() -> CameraSessionBuilder {
        CameraSessionBuilder::new()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.core.lock().await.state.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        let core = self.inner.core.lock().await;
        self.inner.phase(&core)
    }

    pub async fn active_backend(&self) -> ScannerBackendKind {
        self.inner.core.lock().await.state.active_backend
    }

    /// Callers currently waiting on the pending scan, 0 without one
    pub async fn pending_waiters(&self) -> usize {
        self.inner
            .core
            .lock()
            .await
            .pending
            .as_ref()
            .map_or(0, |pending| pending.waiter_count())
    }
}

/// Builder for [`CameraSession`]. Platform capabilities and the fallback
/// factory are required; the primary factory is optional and a build
/// without it simply never offers the primary engine.
pub struct CameraSessionBuilder {
    config: Option<ScannerConfig>,
    camera: Option<Arc<dyn CameraProvider>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    services: Option<Arc<dyn PlatformServices>>,
    primary: Option<Arc<dyn EngineFactory>>,
    fallback: Option<Arc<dyn EngineFactory>>,
    events: Option<Arc<EventBus>>,
}

impl CameraSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            camera: None,
            permissions: None,
            services: None,
            primary: None,
            fallback: None,
            events: None,
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn camera(mut self, camera: Arc<dyn CameraProvider>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn services(mut self, services: Arc<dyn PlatformServices>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn primary_engine(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.primary = Some(factory);
        self
    }

    pub fn fallback_engine(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.fallback = Some(factory);
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Assemble the session and start its outcome dispatcher. Must be called
    /// from within a Tokio runtime.
    pub fn build(self) -> Result<CameraSession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let camera = self
            .camera
            .ok_or_else(|| ScannerError::unexpected("Camera provider must be specified"))?;
        let permissions = self
            .permissions
            .ok_or_else(|| ScannerError::unexpected("Permission provider must be specified"))?;
        let services = self
            .services
            .ok_or_else(|| ScannerError::unexpected("Platform services must be specified"))?;
        let fallback = self
            .fallback
            .ok_or_else(|| ScannerError::unexpected("Fallback engine factory must be specified"))?;

        if fallback.kind() != ScannerBackendKind::FallbackEngine {
            return Err(ScannerError::unexpected(format!(
                "Fallback factory builds {} engines",
                fallback.kind()
            )));
        }
        if let Some(primary) = &self.primary {
            if primary.kind() != ScannerBackendKind::PrimaryEngine {
                return Err(ScannerError::unexpected(format!(
                    "Primary factory builds {} engines",
                    primary.kind()
                )));
            }
        }

        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));
        let prober = BackendAvailabilityProber::new(services, config.scanner.fallback_only);
        let selector = ScannerSelector::new(self.primary, fallback);
        let (outcomes, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            core: Mutex::new(SessionCore::new(&config, selector)),
            config,
            camera,
            permissions,
            prober,
            events,
            outcomes,
            lifecycle: parking_lot::Mutex::new(CancellationToken::new()),
            permission_wait: parking_lot::Mutex::new(None),
        });

        tokio::spawn(run_dispatcher(Arc::downgrade(&inner), receiver));
        info!("Camera session {} created", inner.id);

        Ok(CameraSession { inner })
    }
}

impl Default for CameraSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves engine outcomes onto the serialized control path
async fn run_dispatcher(
    session: Weak<SessionInner>,
    mut outcomes: mpsc::UnboundedReceiver<EngineOutcome>,
) {
    while let Some(outcome) = outcomes.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        let mut core = inner.core.lock().await;
        inner.apply_outcome(&mut core, outcome).await;
    }
    debug!("Scan outcome dispatcher stopped");
}
