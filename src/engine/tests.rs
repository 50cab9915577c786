use super::*;
use crate::platform::simulated::{SimulatedCamera, SimulatedDecoder};
use crate::platform::CameraProvider;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

fn create_context(camera: &Arc<SimulatedCamera>) -> EngineContext {
    EngineContext {
        camera: Arc::clone(camera) as Arc<dyn CameraProvider>,
        devices: camera.discover(),
        bind_timeout: Duration::from_millis(500),
    }
}

async fn present_until_outcome(
    camera: &SimulatedCamera,
    payload: &str,
    outcomes: &mut UnboundedReceiver<EngineOutcome>,
) -> EngineOutcome {
    timeout(Duration::from_secs(2), async {
        loop {
            camera.present(payload);
            tokio::select! {
                outcome = outcomes.recv() => return outcome.expect("outcome channel closed"),
                _ = sleep(Duration::from_millis(10)) => {}
            }
        }
    })
    .await
    .expect("no engine outcome within timeout")
}

#[tokio::test]
async fn test_initialize_is_idempotent_for_same_facing() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));

    engine.initialize(CameraFacing::Back).await.unwrap();
    engine.initialize(CameraFacing::Back).await.unwrap();
    assert_eq!(camera.bind_count(), 1);
    assert_eq!(engine.facing(), Some(CameraFacing::Back));

    // A different facing releases and rebinds
    engine.initialize(CameraFacing::Front).await.unwrap();
    assert_eq!(camera.bind_count(), 2);
    assert!(!camera.is_bound(CameraFacing::Back));
    assert!(camera.is_bound(CameraFacing::Front));

    engine.release().await;
}

#[tokio::test]
async fn test_scan_is_single_shot() {
    let camera = Arc::new(SimulatedCamera::standard());
    let decoder = Arc::new(SimulatedDecoder::new("primary"));
    let mut engine = PrimaryEngine::new(create_context(&camera), decoder.clone());
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(7), tx))
        .unwrap();
    assert!(engine.is_scanning());

    let outcome = present_until_outcome(&camera, "https://example.com", &mut rx).await;
    assert_eq!(outcome.token, ScanToken(7));
    assert_eq!(outcome.backend, ScannerBackendKind::PrimaryEngine);
    assert_eq!(outcome.result.unwrap().value, "https://example.com");
    assert!(!engine.is_scanning());

    // Further frames produce nothing
    for _ in 0..5 {
        camera.present("https://example.com");
        sleep(Duration::from_millis(5)).await;
    }
    assert!(rx.try_recv().is_err());

    engine.release().await;
}

#[tokio::test]
async fn test_stop_scan_is_idempotent() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));

    engine.stop_scan();
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(1), tx))
        .unwrap();
    engine.stop_scan();
    engine.stop_scan();

    camera.present("ignored");
    sleep(Duration::from_millis(30)).await;
    assert!(rx.try_recv().is_err());

    engine.release().await;
}

#[tokio::test]
async fn test_scan_requires_binding() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = engine.start_continuous_scan(ScanSink::new(ScanToken(1), tx));
    assert!(matches!(result, Err(AdapterError::InitializationFailed { .. })));
}

#[tokio::test]
async fn test_decode_failure_is_reported() {
    let camera = Arc::new(SimulatedCamera::standard());
    let decoder = Arc::new(SimulatedDecoder::new("primary"));
    decoder.fail_next_decode();
    let mut engine = PrimaryEngine::new(create_context(&camera), decoder);
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(3), tx))
        .unwrap();

    let outcome = present_until_outcome(&camera, "payload", &mut rx).await;
    assert!(matches!(
        outcome.result,
        Err(AdapterError::DecodeEngineFailure { .. })
    ));

    engine.release().await;
}

#[tokio::test]
async fn test_unsupported_symbology_is_ignored() {
    let camera = Arc::new(SimulatedCamera::standard());
    let decoder = Arc::new(SimulatedDecoder::new("zx").with_symbology(Symbology::Ean13));
    let mut engine = FallbackEngine::new(create_context(&camera), decoder);
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(1), tx))
        .unwrap();

    for _ in 0..5 {
        camera.present("4006381333931");
        sleep(Duration::from_millis(5)).await;
    }
    assert!(rx.try_recv().is_err());
    assert!(engine.is_scanning());

    engine.release().await;
}

#[tokio::test]
async fn test_primary_warm_up_failure() {
    let camera = Arc::new(SimulatedCamera::standard());
    let decoder = Arc::new(SimulatedDecoder::new("primary"));
    decoder.fail_warm_up();
    let mut engine = PrimaryEngine::new(create_context(&camera), decoder);

    let result = engine.initialize(CameraFacing::Back).await;
    assert!(matches!(result, Err(AdapterError::InitializationFailed { .. })));
    assert_eq!(camera.bind_count(), 0);
}

#[tokio::test]
async fn test_switch_failure_keeps_previous_facing() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(9), tx))
        .unwrap();

    camera.fail_binds(CameraFacing::Front);
    let result = engine.switch_facing(CameraFacing::Front).await;
    assert!(matches!(result, Err(AdapterError::InitializationFailed { .. })));
    assert_eq!(engine.facing(), Some(CameraFacing::Back));
    assert!(camera.is_bound(CameraFacing::Back));

    // The scan survives the failed switch
    let outcome = present_until_outcome(&camera, "still-here", &mut rx).await;
    assert_eq!(outcome.result.unwrap().value, "still-here");

    engine.release().await;
}

#[tokio::test]
async fn test_switch_failure_without_restore_leaves_engine_unbound() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));
    engine.initialize(CameraFacing::Back).await.unwrap();

    camera.fail_binds(CameraFacing::Front);
    camera.fail_binds(CameraFacing::Back);
    let result = engine.switch_facing(CameraFacing::Front).await;
    assert!(matches!(result, Err(AdapterError::InitializationFailed { .. })));
    assert_eq!(engine.facing(), None);
    assert_eq!(camera.bound_count(), 0);

    engine.release().await;
}

#[tokio::test]
async fn test_result_of_frame_taken_before_restart_is_discarded() {
    let camera = Arc::new(SimulatedCamera::standard());
    let decoder = Arc::new(SimulatedDecoder::new("slow").with_decode_delay(Duration::from_millis(300)));
    let mut engine = FallbackEngine::new(create_context(&camera), decoder.clone());
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(1), tx.clone()))
        .unwrap();
    camera.present("old-frame");
    sleep(Duration::from_millis(50)).await;

    // Restarted while the old frame is still being decoded
    engine.stop_scan();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(2), tx))
        .unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(decoder.decoded_count(), 1);
    assert!(rx.try_recv().is_err());
    assert!(engine.is_scanning());

    let outcome = present_until_outcome(&camera, "new-frame", &mut rx).await;
    assert_eq!(outcome.token, ScanToken(2));
    assert_eq!(outcome.result.unwrap().value, "new-frame");

    engine.release().await;
}

#[tokio::test]
async fn test_switch_to_missing_camera() {
    let camera = Arc::new(SimulatedCamera::back_only());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));
    engine.initialize(CameraFacing::Back).await.unwrap();

    let result = engine.switch_facing(CameraFacing::Front).await;
    assert_eq!(result, Err(AdapterError::FrontCameraUnavailable));
    assert_eq!(engine.facing(), Some(CameraFacing::Back));

    engine.release().await;
}

#[tokio::test]
async fn test_switch_resumes_scanning() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = PrimaryEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("primary")));
    engine.initialize(CameraFacing::Back).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .start_continuous_scan(ScanSink::new(ScanToken(2), tx))
        .unwrap();
    engine.switch_facing(CameraFacing::Front).await.unwrap();
    assert_eq!(engine.facing(), Some(CameraFacing::Front));
    assert!(engine.is_scanning());

    let outcome = present_until_outcome(&camera, "front-code", &mut rx).await;
    assert_eq!(outcome.result.unwrap().value, "front-code");

    engine.release().await;
}

#[tokio::test]
async fn test_torch_requires_hardware() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = FallbackEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("zx")));

    assert_eq!(engine.set_torch(true), Err(AdapterError::DeviceUnsupported));

    engine.initialize(CameraFacing::Back).await.unwrap();
    engine.set_torch(true).unwrap();
    assert!(camera.torch_enabled(CameraFacing::Back));

    engine.switch_facing(CameraFacing::Front).await.unwrap();
    assert_eq!(engine.set_torch(true), Err(AdapterError::DeviceUnsupported));

    engine.release().await;
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let camera = Arc::new(SimulatedCamera::standard());
    let mut engine = PrimaryEngine::new(create_context(&camera), Arc::new(SimulatedDecoder::new("primary")));
    engine.initialize(CameraFacing::Back).await.unwrap();
    engine.set_torch(true).unwrap();

    engine.release().await;
    engine.release().await;

    assert_eq!(camera.bound_count(), 0);
    assert!(!camera.torch_enabled(CameraFacing::Back));
    assert_eq!(engine.facing(), None);
}

#[test]
fn test_supported_symbologies() {
    assert!(Symbology::Qr.is_supported());
    assert!(Symbology::Code39Mod43.is_supported());
    assert!(!Symbology::Ean13.is_supported());
    assert!(!Symbology::DataMatrix.is_supported());
}
