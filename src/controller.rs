use crate::camera::{Camera, LifecycleState};
use crate::config::CamflowConfig;
use crate::error::{CameraError, CameraResult};
use crate::preferences::FlashMode;
use crate::request::{CaptureResult, GpsLocation};
use crate::surface::SurfaceProvider;
use crate::types::{AspectRatio, Lens, Resolution, Rotation};
use std::sync::Arc;
use tracing::{debug, info};

/// Host-side session settings
#[derive(Clone)]
pub struct Settings {
    pub surfaces: Vec<Arc<dyn SurfaceProvider>>,
    pub display_rotation: Rotation,
    pub display_resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    pub lens: Lens,
}

impl Settings {
    pub fn from_config(config: &CamflowConfig, surfaces: Vec<Arc<dyn SurfaceProvider>>) -> Self {
        Self {
            surfaces,
            display_rotation: config.display.rotation(),
            display_resolution: config.display.resolution(),
            aspect_ratio: config.capture.aspect_ratio,
            lens: config.capture.lens,
        }
    }
}

pub struct CameraController {
    camera: Camera,
    settings: Settings,
}

impl CameraController {
    pub fn new(camera: Camera, settings: Settings) -> Self {
        Self { camera, settings }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open the configured lens and start previewing
    pub async fn start(&self) -> CameraResult<()> {
        info!("Starting {} camera", self.settings.lens);
        self.camera.open(self.settings.lens).await?;
        self.start_session().await?;
        self.camera.start_preview().await
    }

    async fn start_session(&self) -> CameraResult<()> {
        self.camera
            .start_session(
                self.settings.surfaces.clone(),
                self.settings.display_rotation,
                self.settings.display_resolution,
                self.settings.aspect_ratio,
            )
            .await
    }

    /// Toggle between the front and back lens
    pub async fn switch_lens(&mut self) -> CameraResult<()> {
        let lens = self.settings.lens.toggled();
        self.set_lens(lens).await
    }

    pub async fn set_lens(&mut self, lens: Lens) -> CameraResult<()> {
        if lens == self.settings.lens {
            return Ok(());
        }
        debug!("Switching lens {} -> {}", self.settings.lens, lens);
        self.settings.lens = lens;
        self.camera.close().await?;
        self.start().await
    }

    pub async fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) -> CameraResult<()> {
        if aspect_ratio == self.settings.aspect_ratio {
            return Ok(());
        }
        debug!(
            "Changing aspect ratio {} -> {}",
            self.settings.aspect_ratio, aspect_ratio
        );
        self.settings.aspect_ratio = aspect_ratio;
        self.camera.stop_session().await?;
        self.start_session().await?;
        self.camera.start_preview().await
    }

    pub async fn set_flash(&self, mode: FlashMode) -> CameraResult<()> {
        if self.camera.preferences().flash.mode == mode {
            return Ok(());
        }
        debug!("Flash mode -> {}", mode);
        self.restarting_preview(|camera| {
            camera.update_preferences(|preferences| preferences.flash.mode = mode)
        })
        .await
    }

    /// Digital zoom; must lie within 1.0 and the device's maximum
    pub async fn set_zoom(&self, level: f32) -> CameraResult<()> {
        let sensor = self
            .camera
            .sensor_info()
            .await
            .ok_or_else(|| CameraError::precondition("camera is not opened"))?;
        if !(1.0..=sensor.max_digital_zoom).contains(&level) {
            return Err(CameraError::precondition(format!(
                "zoom {} outside 1.0..={}",
                level, sensor.max_digital_zoom
            )));
        }

        debug!("Zoom -> {}", level);
        self.restarting_preview(|camera| {
            camera.update_preferences(|preferences| preferences.zoom.level = level)
        })
        .await
    }

    /// Location stamped into subsequent still captures
    pub fn set_location(&self, location: Option<GpsLocation>) {
        self.camera
            .update_preferences(|preferences| preferences.jpeg.location = location);
    }

    pub async fn capture(&self) -> CameraResult<CaptureResult> {
        self.camera.capture().await
    }

    pub async fn start_record(&self) -> CameraResult<()> {
        self.camera.start_record().await
    }

    /// Stop recording and resume the preview stream
    pub async fn stop_record(&self) -> CameraResult<()> {
        self.camera.stop_record().await?;
        self.camera.start_preview().await
    }

    pub async fn stop(&self) -> CameraResult<()> {
        self.camera.close().await
    }

    pub async fn release(&self) -> CameraResult<()> {
        self.camera.release().await
    }

    /// Apply `update` between a preview stop and restart, when previewing
    async fn restarting_preview<F>(&self, update: F) -> CameraResult<()>
    where
        F: FnOnce(&Camera),
    {
        let previewing = self.camera.state() == LifecycleState::PreviewActive;
        if previewing {
            self.camera.stop_preview().await?;
        }
        update(&self.camera);
        if previewing {
            self.camera.start_preview().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionTimeouts;
    use crate::request::FlashOutput;
    use crate::simulation::{PlatformCall, SimulatedCamera, SimulatedPlatform, StaticSurface};
    use crate::types::{CameraMode, PrivTarget, SurfaceFormat};
    use std::time::Duration;

    struct Fixture {
        platform: SimulatedPlatform,
        preview: Arc<StaticSurface>,
        capture: Arc<StaticSurface>,
        recorder: Arc<StaticSurface>,
        controller: CameraController,
    }

    fn create_fixture() -> Fixture {
        let platform = SimulatedPlatform::new()
            .with_camera(SimulatedCamera::new("0", Lens::Back).with_max_zoom(4.0))
            .with_camera(SimulatedCamera::new("1", Lens::Front));
        let camera = Camera::builder()
            .platform(Arc::new(platform.clone()))
            .query(Arc::new(platform.clone()))
            .timeouts(SessionTimeouts {
                convergence_poll_interval: Duration::from_millis(1),
                ..SessionTimeouts::default()
            })
            .build()
            .unwrap();

        let preview = Arc::new(StaticSurface::new(
            "preview",
            SurfaceFormat::Priv(PrivTarget::Texture),
            &[CameraMode::Preview, CameraMode::Record],
        ));
        let capture = Arc::new(StaticSurface::jpeg("capture"));
        let recorder = Arc::new(StaticSurface::recorder("encoder"));

        let config = CamflowConfig::default();
        let surfaces = vec![
            preview.clone() as Arc<dyn SurfaceProvider>,
            recorder.clone() as Arc<dyn SurfaceProvider>,
            capture.clone() as Arc<dyn SurfaceProvider>,
        ];
        let settings = Settings::from_config(&config, surfaces);

        Fixture {
            platform,
            preview,
            capture,
            recorder,
            controller: CameraController::new(camera, settings),
        }
    }

    #[tokio::test]
    async fn test_start_opens_and_previews() {
        let fixture = create_fixture();
        fixture.controller.start().await.unwrap();

        assert_eq!(
            fixture.controller.camera().state(),
            LifecycleState::PreviewActive
        );
        assert!(fixture
            .platform
            .calls()
            .contains(&PlatformCall::OpenCamera("0".to_string())));
        assert!(fixture.preview.current_handle().is_some());
        assert!(fixture.capture.current_handle().is_some());
        assert!(fixture.recorder.current_handle().is_some());
    }

    #[tokio::test]
    async fn test_switch_lens_reopens_other_camera() {
        let mut fixture = create_fixture();
        fixture.controller.start().await.unwrap();
        fixture.controller.switch_lens().await.unwrap();

        assert_eq!(fixture.controller.settings().lens, Lens::Front);
        assert!(fixture
            .platform
            .calls()
            .contains(&PlatformCall::CloseDevice("0".to_string())));
        assert!(fixture
            .platform
            .calls()
            .contains(&PlatformCall::OpenCamera("1".to_string())));
        assert_eq!(fixture.platform.sessions_created(), 2);
        assert_eq!(fixture.platform.max_concurrent_sessions(), 1);
        assert_eq!(
            fixture.controller.camera().state(),
            LifecycleState::PreviewActive
        );

        // Same lens again is a no-op
        fixture.controller.set_lens(Lens::Front).await.unwrap();
        assert_eq!(fixture.platform.sessions_created(), 2);
    }

    #[tokio::test]
    async fn test_aspect_ratio_change_renegotiates() {
        let mut fixture = create_fixture();
        fixture.controller.start().await.unwrap();
        fixture
            .controller
            .set_aspect_ratio(AspectRatio::Ratio16x9)
            .await
            .unwrap();

        let configs = fixture.capture.acquired_configs();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].aspect_ratio, AspectRatio::Ratio16x9);
        assert_eq!(
            fixture.capture.current_handle().unwrap().resolution,
            Resolution::new(1920, 1080)
        );
        assert_eq!(
            fixture.controller.camera().state(),
            LifecycleState::PreviewActive
        );
    }

    #[tokio::test]
    async fn test_flash_change_restarts_preview() {
        let fixture = create_fixture();
        fixture.controller.start().await.unwrap();
        fixture.controller.set_flash(FlashMode::Torch).await.unwrap();

        let repeating = fixture.platform.repeating_requests();
        assert_eq!(repeating.len(), 2);
        assert_eq!(repeating[1].flash, Some(FlashOutput::Torch));

        fixture.controller.set_flash(FlashMode::Torch).await.unwrap();
        assert_eq!(fixture.platform.repeating_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_zoom_bounds() {
        let fixture = create_fixture();
        assert_eq!(
            fixture.controller.set_zoom(2.0).await.unwrap_err(),
            CameraError::precondition("camera is not opened")
        );

        fixture.controller.start().await.unwrap();
        for level in [0.5, 4.5] {
            let err = fixture.controller.set_zoom(level).await.unwrap_err();
            assert!(matches!(err, CameraError::PreconditionViolation { .. }));
        }

        fixture.controller.set_zoom(2.0).await.unwrap();
        let repeating = fixture.platform.repeating_requests();
        assert!(repeating.last().unwrap().crop_region.is_some());
    }

    #[tokio::test]
    async fn test_location_is_stamped_on_stills() {
        let fixture = create_fixture();
        let location = GpsLocation {
            latitude: 48.85,
            longitude: 2.35,
            altitude: 35.0,
            timestamp_ms: 1_700_000_000_000,
        };
        fixture.controller.set_location(Some(location));
        fixture.controller.start().await.unwrap();
        fixture.controller.capture().await.unwrap();

        let still = fixture
            .platform
            .captures()
            .into_iter()
            .find(|request| request.tag.as_deref() == Some("still"))
            .unwrap();
        assert_eq!(still.jpeg_gps_location, Some(location));
    }

    #[tokio::test]
    async fn test_stop_record_resumes_preview() {
        let fixture = create_fixture();
        fixture.controller.start().await.unwrap();
        fixture.controller.start_record().await.unwrap();
        assert_eq!(
            fixture.controller.camera().state(),
            LifecycleState::RecordActive
        );

        fixture.controller.stop_record().await.unwrap();
        assert_eq!(
            fixture.controller.camera().state(),
            LifecycleState::PreviewActive
        );

        fixture.controller.stop().await.unwrap();
        assert_eq!(fixture.controller.camera().state(), LifecycleState::Closed);
        fixture.controller.release().await.unwrap();
    }
}
