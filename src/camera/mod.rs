mod listener;
mod state;
mod worker;

pub use state::{LifecycleState, ResolvedSurface, SessionRequest};

use crate::bridge::AvailabilityTracker;
use crate::config::SessionTimeouts;
use crate::error::{CameraError, CameraResult, CamflowError, Result};
use crate::platform::CameraPlatform;
use crate::preferences::PreferenceSet;
use crate::query::{CapabilityQuery, SensorInfo};
use crate::request::CaptureResult;
use crate::surface::SurfaceProvider;
use crate::types::{AspectRatio, Lens, Resolution, Rotation};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use worker::{Command, Reply, Worker};

/// Handle onto the worker task that owns one camera's device and session
pub struct Camera {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<LifecycleState>,
    preferences: Arc<RwLock<PreferenceSet>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Camera {
    /// Spawn the worker for a new camera. Must be called inside a tokio runtime.
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        query: Arc<dyn CapabilityQuery>,
        timeouts: SessionTimeouts,
        preferences: PreferenceSet,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LifecycleState::Closed);
        let preferences = Arc::new(RwLock::new(preferences));

        let availability = Arc::new(AvailabilityTracker::new());
        platform.register_availability_callback(availability.clone());

        let worker = Worker::new(
            platform,
            query,
            timeouts,
            Arc::clone(&preferences),
            availability,
            events_tx,
            state_tx,
        );
        let handle = tokio::spawn(worker.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
            preferences,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn builder() -> CameraBuilder {
        CameraBuilder::new()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> CameraResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| CameraError::precondition("camera is released"))?;
        response
            .await
            .map_err(|_| CameraError::precondition("camera is released"))?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(make(reply)).ok()?;
        response.await.ok()
    }

    /// Open the first camera facing `lens`
    pub async fn open(&self, lens: Lens) -> CameraResult<()> {
        self.request(|reply| Command::Open { lens, reply }).await
    }

    /// Negotiate streams for `surfaces` and configure one platform session
    pub async fn start_session(
        &self,
        surfaces: Vec<Arc<dyn SurfaceProvider>>,
        display_rotation: Rotation,
        display_resolution: Resolution,
        aspect_ratio: AspectRatio,
    ) -> CameraResult<()> {
        let request = SessionRequest {
            surfaces,
            display_rotation,
            display_resolution,
            aspect_ratio,
        };
        self.request(|reply| Command::StartSession { request, reply })
            .await
    }

    pub async fn start_preview(&self) -> CameraResult<()> {
        self.request(|reply| Command::StartPreview { reply }).await
    }

    pub async fn stop_preview(&self) -> CameraResult<()> {
        self.request(|reply| Command::StopPreview { reply }).await
    }

    /// Take a still picture, converging focus and exposure first when supported
    pub async fn capture(&self) -> CameraResult<CaptureResult> {
        self.request(|reply| Command::Capture { reply }).await
    }

    pub async fn start_record(&self) -> CameraResult<()> {
        self.request(|reply| Command::StartRecord { reply }).await
    }

    pub async fn stop_record(&self) -> CameraResult<()> {
        self.request(|reply| Command::StopRecord { reply }).await
    }

    pub async fn stop_session(&self) -> CameraResult<()> {
        self.request(|reply| Command::StopSession { reply }).await
    }

    pub async fn close(&self) -> CameraResult<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Close the camera, release every surface provider and stop the worker.
    ///
    /// Calling it again is a no-op.
    pub async fn release(&self) -> CameraResult<()> {
        let result = match self.request(|reply| Command::Release { reply }).await {
            Err(CameraError::PreconditionViolation { .. }) if self.commands.is_closed() => Ok(()),
            other => other,
        };

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Camera worker ended abnormally: {}", e);
            }
        }
        result
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Negotiated surfaces of the active session
    pub async fn outputs(&self) -> Vec<ResolvedSurface> {
        self.query(|reply| Command::Outputs { reply })
            .await
            .unwrap_or_default()
    }

    /// Sensor geometry recorded by the last successful open
    pub async fn sensor_info(&self) -> Option<SensorInfo> {
        self.query(|reply| Command::SensorInfo { reply })
            .await
            .flatten()
    }

    /// Error left by an asynchronous platform failure, if any
    pub async fn pending_error(&self) -> Option<CameraError> {
        self.query(|reply| Command::PendingError { reply })
            .await
            .flatten()
    }

    /// Change this camera's request decorators. Takes effect on the next request.
    pub fn update_preferences<F>(&self, update: F)
    where
        F: FnOnce(&mut PreferenceSet),
    {
        update(&mut self.preferences.write());
    }

    pub fn preferences(&self) -> PreferenceSet {
        self.preferences.read().clone()
    }
}

/// Builder for [`Camera`]
pub struct CameraBuilder {
    platform: Option<Arc<dyn CameraPlatform>>,
    query: Option<Arc<dyn CapabilityQuery>>,
    timeouts: SessionTimeouts,
    preferences: PreferenceSet,
}

impl CameraBuilder {
    pub fn new() -> Self {
        Self {
            platform: None,
            query: None,
            timeouts: SessionTimeouts::default(),
            preferences: PreferenceSet::default(),
        }
    }

    pub fn platform(mut self, platform: Arc<dyn CameraPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn query(mut self, query: Arc<dyn CapabilityQuery>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn preferences(mut self, preferences: PreferenceSet) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn build(self) -> Result<Camera> {
        let platform = self
            .platform
            .ok_or_else(|| CamflowError::system("Camera platform must be specified"))?;
        let query = self
            .query
            .ok_or_else(|| CamflowError::system("Capability query must be specified"))?;

        Ok(Camera::new(platform, query, self.timeouts, self.preferences))
    }
}

impl Default for CameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
