use super::BackendAvailability;
use crate::platform::PlatformServices;
use std::sync::Arc;
use tracing::{debug, info};

/// Decide whether the primary engine can be used.
///
/// A forced fallback-only configuration wins without consulting the
/// platform, so a positive service check can never override it.
pub fn probe(services: &dyn PlatformServices, forced_fallback_only: bool) -> BackendAvailability {
    if forced_fallback_only {
        info!("Primary engine disabled - fallback-only mode is enabled");
        return BackendAvailability {
            primary_engine_usable: false,
            forced_fallback_only: true,
        };
    }

    let available = services.primary_engine_service_available();
    debug!("Primary engine platform service available: {}", available);

    BackendAvailability {
        primary_engine_usable: available,
        forced_fallback_only: false,
    }
}

/// Prober bound to the platform services and the deployment switch
#[derive(Clone)]
pub struct BackendAvailabilityProber {
    services: Arc<dyn PlatformServices>,
    forced_fallback_only: bool,
}

impl BackendAvailabilityProber {
    pub fn new(services: Arc<dyn PlatformServices>, forced_fallback_only: bool) -> Self {
        Self {
            services,
            forced_fallback_only,
        }
    }

    pub fn forced_fallback_only(&self) -> bool {
        self.forced_fallback_only
    }

    pub fn probe(&self) -> BackendAvailability {
        probe(self.services.as_ref(), self.forced_fallback_only)
    }
}
