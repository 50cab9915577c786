use super::*;
use crate::engine::{EngineContext, FallbackEngineFactory, PrimaryEngineFactory};
use crate::error::AdapterError;
use crate::platform::simulated::{SimulatedCamera, SimulatedDecoder, SimulatedServices};
use crate::platform::CameraProvider;
use std::sync::Arc;
use std::time::Duration;

fn availability(primary_engine_usable: bool, forced_fallback_only: bool) -> BackendAvailability {
    BackendAvailability {
        primary_engine_usable,
        forced_fallback_only,
    }
}

fn create_selector(with_primary: bool) -> ScannerSelector {
    let primary: Option<Arc<dyn crate::engine::EngineFactory>> = if with_primary {
        Some(Arc::new(PrimaryEngineFactory::new(Arc::new(
            SimulatedDecoder::new("primary"),
        ))))
    } else {
        None
    };
    ScannerSelector::new(
        primary,
        Arc::new(FallbackEngineFactory::new(Arc::new(SimulatedDecoder::new(
            "fallback",
        )))),
    )
}

fn create_context() -> EngineContext {
    let camera = Arc::new(SimulatedCamera::standard());
    EngineContext {
        devices: camera.discover(),
        camera,
        bind_timeout: Duration::from_millis(500),
    }
}

#[test]
fn test_initial_selection_is_deterministic() {
    let cases = [
        (availability(true, false), ScannerBackendKind::PrimaryEngine),
        (availability(false, false), ScannerBackendKind::FallbackEngine),
        (availability(false, true), ScannerBackendKind::FallbackEngine),
        // A forced override is never contradicted by a positive service check
        (availability(true, true), ScannerBackendKind::FallbackEngine),
    ];

    for (input, expected) in cases {
        assert_eq!(select_initial_backend(&input), expected, "{:?}", input);
        assert_eq!(select_initial_backend(&input), expected);
    }
}

#[test]
fn test_probe_honours_forced_fallback() {
    let services = SimulatedServices::new(true);

    let forced = probe(&services, true);
    assert!(!forced.primary_engine_usable);
    assert!(forced.forced_fallback_only);

    let normal = probe(&services, false);
    assert!(normal.primary_engine_usable);

    services.set_available(false);
    let absent = probe(&services, false);
    assert!(!absent.primary_engine_usable);
    assert!(!absent.forced_fallback_only);
}

#[test]
fn test_prober_is_repeatable() {
    let prober = BackendAvailabilityProber::new(Arc::new(SimulatedServices::new(true)), false);
    assert_eq!(prober.probe(), prober.probe());
    assert!(!prober.forced_fallback_only());
}

#[test]
fn test_missing_primary_factory_selects_fallback() {
    let selector = create_selector(false);
    assert!(!selector.has_primary());
    assert_eq!(
        selector.choose_backend(&availability(true, false)),
        ScannerBackendKind::FallbackEngine
    );

    let selector = create_selector(true);
    assert_eq!(
        selector.choose_backend(&availability(true, false)),
        ScannerBackendKind::PrimaryEngine
    );
}

#[test]
fn test_fallback_is_one_directional() {
    let mut selector = create_selector(true);
    let failure = FailureContext::new(FailureStage::Scanning, AdapterError::decode("crash"));

    assert_eq!(
        selector.handle_backend_failure(ScannerBackendKind::PrimaryEngine, &failure),
        FallbackDecision::SwitchToFallback
    );
    assert!(selector.has_fallen_back());

    // Any number of further failures never leads back to the primary engine
    for stage in [
        FailureStage::Initialization,
        FailureStage::Scanning,
        FailureStage::CameraSwitch,
    ] {
        let failure = FailureContext::new(stage, AdapterError::decode("again"));
        assert_eq!(
            selector.handle_backend_failure(ScannerBackendKind::FallbackEngine, &failure),
            FallbackDecision::Fatal
        );
        assert_eq!(
            selector.choose_backend(&availability(true, false)),
            ScannerBackendKind::FallbackEngine
        );
    }

    selector.reset();
    assert_eq!(
        selector.choose_backend(&availability(true, false)),
        ScannerBackendKind::PrimaryEngine
    );
}

#[test]
fn test_hardware_absence_does_not_trigger_fallback() {
    let mut selector = create_selector(true);
    let failure = FailureContext::new(
        FailureStage::Initialization,
        AdapterError::BackCameraUnavailable,
    );
    assert_eq!(
        selector.handle_backend_failure(ScannerBackendKind::PrimaryEngine, &failure),
        FallbackDecision::Fatal
    );
    assert!(!selector.has_fallen_back());
}

#[tokio::test]
async fn test_selector_creates_requested_engine() {
    let selector = create_selector(true);
    let engine = selector
        .create(ScannerBackendKind::PrimaryEngine, create_context())
        .unwrap();
    assert_eq!(engine.kind(), ScannerBackendKind::PrimaryEngine);

    let engine = selector
        .create(ScannerBackendKind::FallbackEngine, create_context())
        .unwrap();
    assert_eq!(engine.kind(), ScannerBackendKind::FallbackEngine);

    let selector = create_selector(false);
    assert!(matches!(
        selector.create(ScannerBackendKind::PrimaryEngine, create_context()),
        Err(AdapterError::InitializationFailed { .. })
    ));
}

#[test]
fn test_capabilities_and_ratings() {
    let usable = availability(true, false);
    let absent = availability(false, false);

    assert!(ScannerBackendKind::PrimaryEngine.has_capability(ScannerCapability::PerformanceOptimized));
    assert!(!ScannerBackendKind::FallbackEngine.has_capability(ScannerCapability::PerformanceOptimized));
    assert!(ScannerBackendKind::FallbackEngine.has_capability(ScannerCapability::TorchSupport));

    assert_eq!(ScannerBackendKind::PrimaryEngine.performance_rating(&usable), 9);
    assert_eq!(ScannerBackendKind::PrimaryEngine.performance_rating(&absent), 0);
    assert_eq!(ScannerBackendKind::FallbackEngine.performance_rating(&absent), 6);
    assert!(ScannerBackendKind::FallbackEngine.is_available(&absent));
}

#[test]
fn test_use_case_recommendations() {
    let usable = availability(true, false);
    let absent = availability(false, false);

    assert_eq!(
        BackendPreference::for_use_case("Speed", &usable),
        BackendPreference::Primary
    );
    assert_eq!(
        BackendPreference::for_use_case("battery", &absent),
        BackendPreference::Fallback
    );
    assert_eq!(
        BackendPreference::for_use_case("compatibility", &usable),
        BackendPreference::Fallback
    );
    assert_eq!(
        BackendPreference::for_use_case("latest", &absent),
        BackendPreference::Primary
    );
    assert_eq!(
        BackendPreference::for_use_case("whatever", &usable),
        BackendPreference::Auto
    );
}
