use crate::error::{CameraError, CameraResult};
use crate::surface::{choose_optimal_resolution, largest_resolution, SurfaceProvider};
use crate::types::{
    CameraMode, ImageFormat, ModeSet, PrivTarget, Resolution, SurfaceConfig, SurfaceFormat,
    SurfaceHandle,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle notification received by a [`StaticSurface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Acquired(SurfaceHandle),
    Started(CameraMode),
    Stopped(CameraMode),
    Released,
}

#[derive(Default)]
struct Recorded {
    configs: Vec<SurfaceConfig>,
    events: Vec<SurfaceEvent>,
    current: Option<SurfaceHandle>,
}

/// Surface provider that materialises a fresh handle at the best size offered.
///
/// Picks the largest candidate matching the session aspect ratio, falling
/// back to the largest candidate overall.
pub struct StaticSurface {
    name: String,
    format: SurfaceFormat,
    modes: ModeSet,
    acquire_delay: Duration,
    updates: Option<watch::Sender<SurfaceHandle>>,
    recorded: Mutex<Recorded>,
}

impl StaticSurface {
    pub fn new<S: Into<String>>(name: S, format: SurfaceFormat, modes: &[CameraMode]) -> Self {
        Self {
            name: name.into(),
            format,
            modes: ModeSet::of(modes),
            acquire_delay: Duration::ZERO,
            updates: None,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Preview texture
    pub fn texture<S: Into<String>>(name: S) -> Self {
        Self::new(name, SurfaceFormat::Priv(PrivTarget::Texture), &[CameraMode::Preview])
    }

    /// JPEG still saver
    pub fn jpeg<S: Into<String>>(name: S) -> Self {
        Self::new(name, SurfaceFormat::Image(ImageFormat::Jpeg), &[CameraMode::Capture])
    }

    /// Video encoder input
    pub fn recorder<S: Into<String>>(name: S) -> Self {
        Self::new(name, SurfaceFormat::Priv(PrivTarget::Recorder), &[CameraMode::Record])
    }

    /// YUV frame processor
    pub fn yuv<S: Into<String>>(name: S, modes: &[CameraMode]) -> Self {
        Self::new(name, SurfaceFormat::Image(ImageFormat::Yuv), modes)
    }

    /// Mode observer without a stream of its own
    pub fn watcher<S: Into<String>>(name: S, modes: &[CameraMode]) -> Self {
        Self::new(name, SurfaceFormat::None, modes)
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Publish replacement handles through [`SurfaceProvider::surface_updates`]
    pub fn with_live_updates(mut self) -> Self {
        let (sender, _) = watch::channel(SurfaceHandle::new(Resolution::new(0, 0)));
        self.updates = Some(sender);
        self
    }

    /// Replace the materialised surface with one of a new size.
    ///
    /// Only observable by the camera when live updates are enabled.
    pub fn resize(&self, resolution: Resolution) -> SurfaceHandle {
        let handle = SurfaceHandle::new(resolution);
        self.recorded.lock().current = Some(handle);
        if let Some(updates) = &self.updates {
            updates.send_replace(handle);
        }
        debug!("Surface {} resized to {}", self.name, handle);
        handle
    }

    pub fn acquired_configs(&self) -> Vec<SurfaceConfig> {
        self.recorded.lock().configs.clone()
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.recorded.lock().events.clone()
    }

    pub fn current_handle(&self) -> Option<SurfaceHandle> {
        self.recorded.lock().current
    }

    fn record(&self, event: SurfaceEvent) {
        self.recorded.lock().events.push(event);
    }
}

#[async_trait]
impl SurfaceProvider for StaticSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn supported_modes(&self) -> ModeSet {
        self.modes.clone()
    }

    async fn acquire_surface(&self, config: SurfaceConfig) -> CameraResult<SurfaceHandle> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }

        let resolution = choose_optimal_resolution(&config.resolutions, config.aspect_ratio)
            .or_else(|| largest_resolution(&config.resolutions))
            .ok_or_else(|| CameraError::ResolutionUnavailable {
                format: self.format.to_string(),
                role: self.name.clone(),
            })?;

        let handle = SurfaceHandle::new(resolution);
        {
            let mut recorded = self.recorded.lock();
            recorded.configs.push(config);
            recorded.events.push(SurfaceEvent::Acquired(handle));
            recorded.current = Some(handle);
        }
        if let Some(updates) = &self.updates {
            updates.send_replace(handle);
        }
        Ok(handle)
    }

    async fn on_start(&self, mode: CameraMode) {
        self.record(SurfaceEvent::Started(mode));
    }

    async fn on_stop(&self, mode: CameraMode) {
        self.record(SurfaceEvent::Stopped(mode));
    }

    async fn release(&self) {
        self.record(SurfaceEvent::Released);
    }

    fn surface_updates(&self) -> Option<watch::Receiver<SurfaceHandle>> {
        self.updates.as_ref().map(|updates| updates.subscribe())
    }
}
