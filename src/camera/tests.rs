use super::*;
use crate::error::device_error;
use crate::preferences::{cropped_region, FlashMode, PreferenceContext, RequestPreference};
use crate::request::{
    AeState, AfMode, AfState, AfTrigger, CaptureRequestBuilder, ControlMode, FlashOutput, RequestTemplate,
};
use crate::simulation::{
    PlatformCall, SimulatedCamera, SimulatedPlatform, StaticSurface, SurfaceEvent,
};
use crate::types::{
    CameraMode, FormatKey, OutputRole, PrivTarget, Rect, SupportLevel, SurfaceFormat,
    SurfaceHandle,
};
use std::time::Duration;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn test_timeouts() -> SessionTimeouts {
    SessionTimeouts {
        surface_acquire: ms(200),
        open: ms(200),
        session_configure: ms(200),
        request: ms(200),
        convergence: ms(200),
        convergence_poll_interval: ms(2),
        availability: ms(100),
        availability_poll_interval: ms(10),
    }
}

fn test_platform() -> SimulatedPlatform {
    SimulatedPlatform::new()
        .with_camera(SimulatedCamera::new("0", Lens::Back))
        .with_camera(SimulatedCamera::new("1", Lens::Front))
}

fn create_camera(platform: &SimulatedPlatform) -> Camera {
    Camera::builder()
        .platform(Arc::new(platform.clone()))
        .query(Arc::new(platform.clone()))
        .timeouts(test_timeouts())
        .build()
        .unwrap()
}

fn providers(surfaces: &[&Arc<StaticSurface>]) -> Vec<Arc<dyn SurfaceProvider>> {
    surfaces
        .iter()
        .map(|surface| Arc::clone(surface) as Arc<dyn SurfaceProvider>)
        .collect()
}

async fn start_session(camera: &Camera, surfaces: &[&Arc<StaticSurface>]) -> CameraResult<()> {
    camera
        .start_session(
            providers(surfaces),
            Rotation::Deg0,
            Resolution::new(1920, 1080),
            AspectRatio::Ratio4x3,
        )
        .await
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(ms(5)).await;
    }
    panic!("condition not reached in time");
}

async fn wait_for_pending(camera: &Camera) -> CameraError {
    for _ in 0..400 {
        if let Some(error) = camera.pending_error().await {
            return error;
        }
        tokio::time::sleep(ms(5)).await;
    }
    panic!("no pending error reached in time");
}

async fn wait_for_handle(camera: &Camera, index: usize, handle: SurfaceHandle) {
    for _ in 0..400 {
        let outputs = camera.outputs().await;
        if outputs.get(index).and_then(|output| output.handle) == Some(handle) {
            return;
        }
        tokio::time::sleep(ms(5)).await;
    }
    panic!("surface {} never switched to {}", index, handle);
}

fn precondition(details: &str) -> CameraError {
    CameraError::precondition(details)
}

#[tokio::test]
async fn test_builder_requires_platform_and_query() {
    let platform = test_platform();

    assert!(Camera::builder().build().is_err());
    assert!(Camera::builder()
        .platform(Arc::new(platform.clone()))
        .build()
        .is_err());
}

#[tokio::test]
async fn test_full_device_negotiates_preview_and_maximum() {
    let platform = SimulatedPlatform::new().with_camera(
        SimulatedCamera::new("0", Lens::Back).with_sizes(
            FormatKey::Jpeg,
            vec![
                Resolution::new(640, 480),
                Resolution::new(1920, 1080),
                Resolution::new(4032, 3024),
            ],
        ),
    );
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();

    let outputs = camera.outputs().await;
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].role, Some(OutputRole::Preview));
    assert_eq!(outputs[1].role, Some(OutputRole::Maximum));
    assert_eq!(
        outputs[1].candidates,
        vec![
            Resolution::new(640, 480),
            Resolution::new(1920, 1080),
            Resolution::new(4032, 3024),
        ]
    );

    let still = capture.current_handle().unwrap();
    assert_eq!(still.resolution, Resolution::new(4032, 3024));
    let texture = preview.current_handle().unwrap();
    assert_eq!(texture.resolution, Resolution::new(1440, 1080));

    assert!(platform
        .calls()
        .contains(&PlatformCall::CreateSession(vec![texture, still])));
    assert_eq!(camera.state(), LifecycleState::SessionActive);
}

#[tokio::test]
async fn test_legacy_device_shares_preview_streams() {
    let platform = SimulatedPlatform::new().with_camera(
        SimulatedCamera::new("0", Lens::Back).with_support_level(SupportLevel::Legacy),
    );
    let camera = create_camera(&platform);
    let first = Arc::new(StaticSurface::texture("preview"));
    let second = Arc::new(StaticSurface::texture("mirror"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&first, &second, &capture])
        .await
        .unwrap();

    let roles: Vec<_> = camera
        .outputs()
        .await
        .into_iter()
        .map(|output| output.role)
        .collect();
    assert_eq!(
        roles,
        vec![
            Some(OutputRole::Preview),
            Some(OutputRole::Preview),
            Some(OutputRole::Maximum)
        ]
    );
}

#[tokio::test]
async fn test_preview_candidates_bounded_by_display() {
    let platform = SimulatedPlatform::new().with_camera(
        SimulatedCamera::new("0", Lens::Back).with_sizes(
            FormatKey::Priv,
            vec![
                Resolution::new(640, 480),
                Resolution::new(1280, 720),
                Resolution::new(1920, 1080),
                Resolution::new(3840, 2160),
            ],
        ),
    );
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    camera
        .start_session(
            providers(&[&preview, &capture]),
            Rotation::Deg0,
            Resolution::new(1280, 720),
            AspectRatio::Ratio16x9,
        )
        .await
        .unwrap();

    let outputs = camera.outputs().await;
    assert_eq!(
        outputs[0].candidates,
        vec![Resolution::new(640, 480), Resolution::new(1280, 720)]
    );
    assert_eq!(
        preview.acquired_configs()[0].resolutions,
        outputs[0].candidates
    );
    assert_eq!(
        preview.current_handle().unwrap().resolution,
        Resolution::new(1280, 720)
    );
}

#[tokio::test]
async fn test_surface_config_carries_session_geometry() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.open(Lens::Front).await.unwrap();
    camera
        .start_session(
            providers(&[&preview]),
            Rotation::Deg270,
            Resolution::new(1920, 1080),
            AspectRatio::Ratio16x9,
        )
        .await
        .unwrap();

    let config = &preview.acquired_configs()[0];
    assert_eq!(config.aspect_ratio, AspectRatio::Ratio16x9);
    assert_eq!(config.display_rotation, Rotation::Deg270);
    assert_eq!(config.sensor_rotation, Rotation::Deg90);
    assert_eq!(config.lens, Lens::Front);
}

#[tokio::test]
async fn test_double_open_is_rejected_without_platform_call() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    camera.open(Lens::Back).await.unwrap();
    let err = camera.open(Lens::Back).await.unwrap_err();
    assert_eq!(err, precondition("camera is already opened"));

    let opens = platform
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PlatformCall::OpenCamera(_)))
        .count();
    assert_eq!(opens, 1);
}

#[tokio::test]
async fn test_capture_without_capture_surface_is_rejected() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview]).await.unwrap();
    camera.start_preview().await.unwrap();

    let err = camera.capture().await.unwrap_err();
    assert_eq!(err, precondition("capture surfaces is empty"));
    assert!(platform.captures().is_empty());
}

#[tokio::test]
async fn test_capture_requires_active_preview() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&capture]).await.unwrap();
    assert_eq!(
        camera.capture().await.unwrap_err(),
        precondition("preview surfaces is empty")
    );
    camera.stop_session().await.unwrap();

    start_session(&camera, &[&preview, &capture]).await.unwrap();
    assert_eq!(
        camera.capture().await.unwrap_err(),
        precondition("preview is not active")
    );
    assert!(platform.captures().is_empty());
}

#[tokio::test]
async fn test_session_preconditions() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    assert_eq!(
        start_session(&camera, &[&preview]).await.unwrap_err(),
        precondition("camera is not opened")
    );

    camera.open(Lens::Back).await.unwrap();
    assert_eq!(
        start_session(&camera, &[]).await.unwrap_err(),
        precondition("surfaces is empty")
    );
    assert_eq!(
        camera.start_preview().await.unwrap_err(),
        precondition("session is not started")
    );

    start_session(&camera, &[&preview]).await.unwrap();
    assert_eq!(
        start_session(&camera, &[&preview]).await.unwrap_err(),
        precondition("session is already started")
    );
    assert_eq!(
        camera.start_record().await.unwrap_err(),
        precondition("record surfaces is empty")
    );
    assert_eq!(platform.sessions_created(), 1);
}

#[tokio::test]
async fn test_unsupported_combination_is_mismatch() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let surfaces: Vec<_> = (0..4)
        .map(|i| Arc::new(StaticSurface::jpeg(format!("jpeg{}", i))))
        .collect();
    let refs: Vec<_> = surfaces.iter().collect();

    camera.open(Lens::Back).await.unwrap();
    let err = start_session(&camera, &refs).await.unwrap_err();
    assert!(matches!(err, CameraError::ConfigurationMismatch { .. }));
    assert_eq!(platform.sessions_created(), 0);
    assert_eq!(camera.state(), LifecycleState::Opened);
}

#[tokio::test]
async fn test_sessions_never_overlap() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    for _ in 0..3 {
        start_session(&camera, &[&preview, &capture]).await.unwrap();
        camera.start_preview().await.unwrap();
        assert_eq!(platform.open_session_count(), 1);
        camera.stop_session().await.unwrap();
        assert_eq!(platform.open_session_count(), 0);
    }

    assert_eq!(platform.sessions_created(), 3);
    assert_eq!(platform.max_concurrent_sessions(), 1);
}

#[tokio::test]
async fn test_live_surface_swap_rebuilds_session() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview").with_live_updates());
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    let resized = preview.resize(Resolution::new(1280, 960));
    let watched = platform.clone();
    eventually(move || {
        watched
            .repeating_requests()
            .last()
            .map(|request| request.targets.contains(&resized))
            .unwrap_or(false)
    })
    .await;

    let outputs = camera.outputs().await;
    assert_eq!(outputs[0].handle, Some(resized));
    assert_eq!(platform.sessions_created(), 2);
    assert_eq!(platform.open_session_count(), 1);
    assert_eq!(platform.max_concurrent_sessions(), 1);
    assert_eq!(camera.state(), LifecycleState::PreviewActive);
    assert!(camera.pending_error().await.is_none());
}

#[tokio::test]
async fn test_listeners_stop_with_session() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview").with_live_updates());

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview]).await.unwrap();
    camera.stop_session().await.unwrap();

    preview.resize(Resolution::new(640, 480));
    tokio::time::sleep(ms(30)).await;
    assert_eq!(platform.sessions_created(), 1);
    assert_eq!(camera.state(), LifecycleState::Opened);
}

#[tokio::test]
async fn test_live_swap_with_rejected_preview_closes_new_session() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview").with_live_updates());
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.fail_repeating_requests(true);
    preview.resize(Resolution::new(1280, 960));

    assert_eq!(wait_for_pending(&camera).await, CameraError::SessionUnknown);
    assert_eq!(platform.sessions_created(), 2);
    assert_eq!(platform.open_session_count(), 0);
    assert_eq!(platform.max_concurrent_sessions(), 1);
    assert!(camera.outputs().await.is_empty());
    assert_eq!(camera.state(), LifecycleState::Opened);
    assert_eq!(
        preview.events().last(),
        Some(&SurfaceEvent::Stopped(CameraMode::Preview))
    );

    camera.close().await.unwrap();
    assert_eq!(platform.open_session_count(), 0);
    assert_eq!(platform.open_device_count(), 0);
}

#[tokio::test]
async fn test_live_swap_with_failed_configuration_leaves_no_session() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview").with_live_updates());
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.fail_session_configuration(true);
    preview.resize(Resolution::new(1280, 960));

    assert_eq!(
        wait_for_pending(&camera).await,
        CameraError::SessionConfigurationFailed
    );
    assert_eq!(platform.sessions_created(), 2);
    assert_eq!(platform.open_session_count(), 0);
    assert_eq!(camera.state(), LifecycleState::Opened);
    assert_eq!(
        preview.events().last(),
        Some(&SurfaceEvent::Stopped(CameraMode::Preview))
    );
    assert_eq!(
        camera.start_preview().await.unwrap_err(),
        CameraError::SessionConfigurationFailed
    );

    camera.close().await.unwrap();
    assert_eq!(platform.open_device_count(), 0);
}

#[tokio::test]
async fn test_resize_during_configuration_is_not_lost() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview").with_live_updates());
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    platform.set_callback_delay(ms(60));

    let surfaces = [&preview, &capture];
    let (started, resized) = tokio::join!(start_session(&camera, &surfaces), async {
        tokio::time::sleep(ms(20)).await;
        preview.resize(Resolution::new(1280, 960))
    });
    started.unwrap();

    wait_for_handle(&camera, 0, resized).await;
    assert_eq!(platform.sessions_created(), 2);
    assert_eq!(platform.max_concurrent_sessions(), 1);
    assert_eq!(platform.open_session_count(), 1);
    assert!(camera.pending_error().await.is_none());
}

#[tokio::test]
async fn test_device_error_is_sticky_until_reopen() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.clear_calls();
    platform.inject_device_error(device_error::CAMERA_IN_USE);

    assert_eq!(camera.pending_error().await, Some(CameraError::CameraInUse));
    assert_eq!(camera.state(), LifecycleState::Closed);

    assert_eq!(
        camera.start_preview().await.unwrap_err(),
        CameraError::CameraInUse
    );
    assert_eq!(camera.capture().await.unwrap_err(), CameraError::CameraInUse);
    assert_eq!(
        camera.start_record().await.unwrap_err(),
        CameraError::CameraInUse
    );
    assert_eq!(
        start_session(&camera, &[&preview]).await.unwrap_err(),
        CameraError::CameraInUse
    );

    let attempted = platform.calls().into_iter().any(|call| {
        matches!(
            call,
            PlatformCall::OpenCamera(_)
                | PlatformCall::CreateSession(_)
                | PlatformCall::Capture(_)
                | PlatformCall::SetRepeating(_)
        )
    });
    assert!(!attempted);

    camera.open(Lens::Back).await.unwrap();
    assert!(camera.pending_error().await.is_none());
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_maps_to_unknown_error() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    camera.open(Lens::Back).await.unwrap();
    platform.inject_disconnect();

    assert_eq!(
        camera.pending_error().await,
        Some(CameraError::CameraUnknown)
    );
    assert_eq!(platform.open_device_count(), 0);
}

#[tokio::test]
async fn test_open_error_is_returned_and_pending() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    platform.fail_open_with(Some(device_error::MAX_CAMERAS_IN_USE));
    assert_eq!(
        camera.open(Lens::Back).await.unwrap_err(),
        CameraError::MaxCamerasInUse
    );
    assert_eq!(
        camera.pending_error().await,
        Some(CameraError::MaxCamerasInUse)
    );
    assert_eq!(camera.state(), LifecycleState::Closed);

    platform.fail_open_with(None);
    camera.open(Lens::Back).await.unwrap();
    assert!(camera.pending_error().await.is_none());
}

#[tokio::test]
async fn test_stops_are_idempotent() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.stop_preview().await.unwrap();
    camera.stop_session().await.unwrap();

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview]).await.unwrap();
    camera.start_preview().await.unwrap();

    camera.stop_preview().await.unwrap();
    camera.stop_preview().await.unwrap();
    let stops = platform
        .calls()
        .into_iter()
        .filter(|call| matches!(call, PlatformCall::StopRepeating))
        .count();
    assert_eq!(stops, 1);

    camera.stop_session().await.unwrap();
    camera.stop_session().await.unwrap();
    camera.close().await.unwrap();
    camera.close().await.unwrap();
    assert_eq!(camera.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_failed_stop_still_notifies_and_publishes() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.fail_aborts(true);
    assert_eq!(
        camera.stop_preview().await.unwrap_err(),
        CameraError::SessionUnknown
    );
    assert!(platform.calls().contains(&PlatformCall::StopRepeating));
    assert_eq!(camera.state(), LifecycleState::SessionActive);
    assert_eq!(
        preview.events().last(),
        Some(&SurfaceEvent::Stopped(CameraMode::Preview))
    );

    platform.fail_aborts(false);
    camera.stop_preview().await.unwrap();
}

#[tokio::test]
async fn test_open_times_out_when_callback_never_fires() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    platform.suppress_open_callback(true);
    let err = camera.open(Lens::Back).await.unwrap_err();
    assert!(matches!(err, CameraError::OperationTimeout { .. }));
    assert_eq!(camera.state(), LifecycleState::Closed);

    platform.suppress_open_callback(false);
    camera.open(Lens::Back).await.unwrap();
    assert_eq!(camera.state(), LifecycleState::Opened);
}

#[tokio::test]
async fn test_late_open_closes_device() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    platform.set_callback_delay(ms(300));
    let err = camera.open(Lens::Back).await.unwrap_err();
    assert!(matches!(err, CameraError::OperationTimeout { .. }));

    let watched = platform.clone();
    eventually(move || {
        watched
            .calls()
            .contains(&PlatformCall::CloseDevice("0".to_string()))
    })
    .await;
    assert_eq!(platform.open_device_count(), 0);
    assert_eq!(camera.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_session_configure_timeout() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.open(Lens::Back).await.unwrap();
    platform.suppress_configure_callback(true);
    let err = start_session(&camera, &[&preview]).await.unwrap_err();
    assert!(matches!(err, CameraError::OperationTimeout { .. }));
    assert_eq!(camera.state(), LifecycleState::Opened);

    platform.suppress_configure_callback(false);
    start_session(&camera, &[&preview]).await.unwrap();
}

#[tokio::test]
async fn test_session_configure_failure_is_pending() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));

    camera.open(Lens::Back).await.unwrap();
    platform.fail_session_configuration(true);
    assert_eq!(
        start_session(&camera, &[&preview]).await.unwrap_err(),
        CameraError::SessionConfigurationFailed
    );
    assert_eq!(
        camera.pending_error().await,
        Some(CameraError::SessionConfigurationFailed)
    );
    assert_eq!(
        camera.start_preview().await.unwrap_err(),
        CameraError::SessionConfigurationFailed
    );
    assert_eq!(platform.open_session_count(), 0);
}

#[tokio::test]
async fn test_slow_surface_times_out() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let slow = Arc::new(StaticSurface::jpeg("capture").with_acquire_delay(ms(500)));

    camera.open(Lens::Back).await.unwrap();
    let err = start_session(&camera, &[&preview, &slow]).await.unwrap_err();
    match err {
        CameraError::OperationTimeout { operation, .. } => {
            assert_eq!(operation, "acquire surface capture");
        }
        other => panic!("Unexpected error: {}", other),
    }
    assert_eq!(platform.sessions_created(), 0);
    assert_eq!(camera.state(), LifecycleState::Opened);

    let capture = Arc::new(StaticSurface::jpeg("capture"));
    start_session(&camera, &[&preview, &capture]).await.unwrap();
}

#[tokio::test]
async fn test_permission_required() {
    let platform = test_platform();
    let camera = create_camera(&platform);

    platform.set_permission(false);
    assert_eq!(
        camera.open(Lens::Back).await.unwrap_err(),
        CameraError::CameraPermissionRequired
    );
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_missing_lens_is_not_available() {
    let platform = SimulatedPlatform::new().with_camera(SimulatedCamera::new("0", Lens::Back));
    let camera = create_camera(&platform);

    assert_eq!(
        camera.open(Lens::External).await.unwrap_err(),
        CameraError::CameraNotAvailable {
            camera_id: "<external lens>".to_string()
        }
    );
}

#[tokio::test]
async fn test_open_waits_for_availability() {
    let platform = test_platform();
    platform.set_available("0", false);
    let camera = create_camera(&platform);

    assert_eq!(
        camera.open(Lens::Back).await.unwrap_err(),
        CameraError::CameraNotAvailable {
            camera_id: "0".to_string()
        }
    );
    assert!(platform.calls().is_empty());

    let notifier = platform.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(20)).await;
        notifier.set_available("0", true);
    });
    camera.open(Lens::Back).await.unwrap();
}

#[tokio::test]
async fn test_still_capture_sequence() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.script_af_states(vec![AfState::ActiveScan, AfState::ActiveScan]);
    camera.capture().await.unwrap();

    let requests = platform.captures();
    let tags: Vec<_> = requests
        .iter()
        .map(|request| request.tag.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        tags,
        vec![
            "lock_focus",
            "lock_focus",
            "lock_focus",
            "precapture",
            "still",
            "unlock_focus"
        ]
    );

    let preview_handle = preview.current_handle().unwrap();
    let capture_handle = capture.current_handle().unwrap();
    assert_eq!(requests[0].af_trigger, Some(AfTrigger::Start));
    assert_eq!(requests[0].targets, vec![preview_handle]);

    let still = &requests[4];
    assert_eq!(still.template, RequestTemplate::StillCapture);
    assert_eq!(still.targets, vec![capture_handle]);
    assert_eq!(still.jpeg_quality, Some(95));
    assert_eq!(still.jpeg_orientation, Some(90));
    assert_eq!(requests[5].af_trigger, Some(AfTrigger::Cancel));

    assert_eq!(
        capture.events()[1..],
        [
            SurfaceEvent::Started(CameraMode::Capture),
            SurfaceEvent::Stopped(CameraMode::Capture)
        ]
    );
    assert_eq!(camera.state(), LifecycleState::PreviewActive);
}

#[tokio::test]
async fn test_capture_skips_convergence_without_3a() {
    let platform = SimulatedPlatform::new().with_camera(
        SimulatedCamera::new("0", Lens::Back)
            .with_autofocus(false)
            .with_auto_exposure(false),
    );
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();
    camera.capture().await.unwrap();

    let tags: Vec<_> = platform
        .captures()
        .into_iter()
        .filter_map(|request| request.tag)
        .collect();
    assert_eq!(tags, vec!["still"]);
}

#[tokio::test]
async fn test_focus_that_never_locks_times_out() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.script_af_states(vec![AfState::NotFocusedLocked; 10_000]);
    let err = camera.capture().await.unwrap_err();
    match err {
        CameraError::OperationTimeout { operation, .. } => assert_eq!(operation, "focus lock"),
        other => panic!("Unexpected error: {}", other),
    }

    assert!(platform
        .captures()
        .iter()
        .all(|request| request.tag.as_deref() == Some("lock_focus")));
    assert_eq!(
        capture.events().last(),
        Some(&SurfaceEvent::Stopped(CameraMode::Capture))
    );
    assert_eq!(camera.state(), LifecycleState::PreviewActive);
}

#[tokio::test]
async fn test_focus_is_unlocked_when_exposure_never_converges() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.script_ae_states(vec![AeState::Searching; 10_000]);
    match camera.capture().await.unwrap_err() {
        CameraError::OperationTimeout { operation, .. } => {
            assert_eq!(operation, "exposure convergence")
        }
        other => panic!("Unexpected error: {}", other),
    }

    let requests = platform.captures();
    assert!(requests
        .iter()
        .all(|request| request.tag.as_deref() != Some("still")));
    let last = requests.last().unwrap();
    assert_eq!(last.tag.as_deref(), Some("unlock_focus"));
    assert_eq!(last.af_trigger, Some(AfTrigger::Cancel));
    assert_eq!(camera.state(), LifecycleState::PreviewActive);
}

#[tokio::test]
async fn test_failed_request_reports_tag() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    platform.fail_captures(true);
    assert_eq!(
        camera.capture().await.unwrap_err(),
        CameraError::capture_failed(Some("lock_focus".to_string()))
    );
    assert!(camera.pending_error().await.is_none());
}

#[tokio::test]
async fn test_record_supersedes_preview() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::new(
        "preview",
        SurfaceFormat::Priv(PrivTarget::Texture),
        &[CameraMode::Preview, CameraMode::Record],
    ));
    let recorder = Arc::new(StaticSurface::recorder("encoder"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &recorder]).await.unwrap();
    camera.start_preview().await.unwrap();
    camera.start_record().await.unwrap();
    assert_eq!(camera.state(), LifecycleState::RecordActive);

    let repeating = platform.repeating_requests();
    let record = repeating.last().unwrap();
    assert_eq!(record.template, RequestTemplate::Record);
    assert_eq!(record.af_mode, Some(AfMode::ContinuousVideo));
    assert_eq!(
        record.targets,
        vec![
            preview.current_handle().unwrap(),
            recorder.current_handle().unwrap()
        ]
    );
    assert_eq!(
        preview.events()[1..],
        [
            SurfaceEvent::Started(CameraMode::Preview),
            SurfaceEvent::Stopped(CameraMode::Preview),
            SurfaceEvent::Started(CameraMode::Record)
        ]
    );

    platform.clear_calls();
    camera.stop_preview().await.unwrap();
    assert!(platform.calls().is_empty());

    camera.stop_record().await.unwrap();
    assert_eq!(
        platform.calls(),
        vec![PlatformCall::AbortCaptures, PlatformCall::StopRepeating]
    );
    assert_eq!(
        recorder.events().last(),
        Some(&SurfaceEvent::Stopped(CameraMode::Record))
    );
    assert_eq!(camera.state(), LifecycleState::SessionActive);
}

#[tokio::test]
async fn test_watchers_follow_modes_without_streams() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let watcher = Arc::new(StaticSurface::watcher("analytics", &[CameraMode::Preview]));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &watcher]).await.unwrap();

    let outputs = camera.outputs().await;
    assert_eq!(outputs[1].role, None);
    assert_eq!(outputs[1].handle, None);
    assert!(watcher.acquired_configs().is_empty());
    assert!(platform
        .calls()
        .contains(&PlatformCall::CreateSession(vec![preview
            .current_handle()
            .unwrap()])));

    camera.start_preview().await.unwrap();
    camera.stop_preview().await.unwrap();
    assert_eq!(
        watcher.events(),
        vec![
            SurfaceEvent::Started(CameraMode::Preview),
            SurfaceEvent::Stopped(CameraMode::Preview)
        ]
    );
}

#[tokio::test]
async fn test_lifecycle_states() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let mut states = camera.subscribe_state();
    let preview = Arc::new(StaticSurface::texture("preview"));

    assert_eq!(camera.state(), LifecycleState::Closed);
    camera.open(Lens::Back).await.unwrap();
    assert_eq!(camera.state(), LifecycleState::Opened);
    assert!(states.has_changed().unwrap());

    start_session(&camera, &[&preview]).await.unwrap();
    assert_eq!(camera.state(), LifecycleState::SessionActive);
    camera.start_preview().await.unwrap();
    assert_eq!(camera.state(), LifecycleState::PreviewActive);
    camera.stop_preview().await.unwrap();
    assert_eq!(camera.state(), LifecycleState::SessionActive);
    camera.stop_session().await.unwrap();
    assert_eq!(camera.state(), LifecycleState::Opened);
    camera.close().await.unwrap();
    assert_eq!(*states.borrow_and_update(), LifecycleState::Closed);
    assert!(camera.sensor_info().await.is_none());
}

#[tokio::test]
async fn test_release_releases_every_provider() {
    let platform = test_platform();
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    camera.release().await.unwrap();
    assert_eq!(preview.events().last(), Some(&SurfaceEvent::Released));
    assert_eq!(capture.events().last(), Some(&SurfaceEvent::Released));
    assert_eq!(camera.state(), LifecycleState::Closed);
    assert_eq!(platform.open_session_count(), 0);
    assert_eq!(platform.open_device_count(), 0);

    camera.release().await.unwrap();
    assert_eq!(
        camera.open(Lens::Back).await.unwrap_err(),
        precondition("camera is released")
    );
}

struct QualityOverride(u8);

impl RequestPreference for QualityOverride {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        _context: &PreferenceContext,
    ) {
        if mode == CameraMode::Capture {
            builder.jpeg_quality(self.0);
        }
    }
}

#[tokio::test]
async fn test_preferences_decorate_requests() {
    let platform = SimulatedPlatform::new().with_camera(
        SimulatedCamera::new("0", Lens::Back).with_active_array(Rect::new(0, 0, 4000, 3000)),
    );
    let camera = create_camera(&platform);
    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));

    camera.update_preferences(|preferences| {
        preferences.flash.mode = FlashMode::Torch;
        preferences.zoom.level = 2.0;
        preferences.push(Arc::new(QualityOverride(50)));
    });
    assert_eq!(camera.preferences().custom_count(), 1);

    camera.open(Lens::Back).await.unwrap();
    start_session(&camera, &[&preview, &capture]).await.unwrap();
    camera.start_preview().await.unwrap();

    let repeating = platform.repeating_requests();
    let request = repeating.last().unwrap();
    assert_eq!(request.control_mode, Some(ControlMode::Auto));
    assert_eq!(request.af_mode, Some(AfMode::ContinuousPicture));
    assert_eq!(request.flash, Some(FlashOutput::Torch));
    assert_eq!(
        request.crop_region,
        Some(cropped_region(Rect::new(0, 0, 4000, 3000), 2.0))
    );

    camera.capture().await.unwrap();
    let still = platform
        .captures()
        .into_iter()
        .find(|request| request.tag.as_deref() == Some("still"))
        .unwrap();
    assert_eq!(still.jpeg_quality, Some(50));
    assert_eq!(still.crop_region, None);
}
