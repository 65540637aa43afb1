use super::listener::{CaptureListener, DeviceListener, SessionListener};
use super::state::{
    distinct_handles, group_by_mode, ActiveSession, LifecycleState, ResolvedSurface,
    SessionRequest,
};
use crate::bridge::{poll_until, single_resume, with_deadline, AvailabilityTracker};
use crate::classifier;
use crate::config::SessionTimeouts;
use crate::error::{CameraError, CameraResult};
use crate::platform::{CameraPlatform, PlatformDevice, PlatformSession};
use crate::preferences::{PreferenceContext, PreferenceSet};
use crate::query::{find_camera_by_lens, CapabilityQuery, SensorInfo};
use crate::request::{
    AePrecaptureTrigger, AeState, AfState, AfTrigger, CaptureRequest, CaptureRequestBuilder,
    CaptureResult, RequestTemplate,
};
use crate::resolver::{self, MAX_PREVIEW_RESOLUTION};
use crate::surface::SurfaceProvider;
use crate::types::{CameraMode, Lens, SurfaceConfig, SurfaceHandle};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub(crate) type Reply<T> = oneshot::Sender<CameraResult<T>>;
type SurfaceUpdates = watch::Receiver<SurfaceHandle>;

/// Host requests, served one at a time
pub(crate) enum Command {
    Open {
        lens: Lens,
        reply: Reply<()>,
    },
    StartSession {
        request: SessionRequest,
        reply: Reply<()>,
    },
    StartPreview {
        reply: Reply<()>,
    },
    StopPreview {
        reply: Reply<()>,
    },
    Capture {
        reply: Reply<CaptureResult>,
    },
    StartRecord {
        reply: Reply<()>,
    },
    StopRecord {
        reply: Reply<()>,
    },
    StopSession {
        reply: Reply<()>,
    },
    Close {
        reply: Reply<()>,
    },
    Release {
        reply: Reply<()>,
    },
    Outputs {
        reply: oneshot::Sender<Vec<ResolvedSurface>>,
    },
    SensorInfo {
        reply: oneshot::Sender<Option<SensorInfo>>,
    },
    PendingError {
        reply: oneshot::Sender<Option<CameraError>>,
    },
}

/// Notifications posted by platform callbacks and surface listeners
pub(crate) enum Event {
    DeviceFailed {
        generation: u64,
        error: CameraError,
    },
    SessionFailed {
        session_id: Uuid,
        error: CameraError,
    },
    SurfaceChanged {
        epoch: u64,
        index: usize,
        handle: SurfaceHandle,
    },
}

/// Sole owner of a camera's session state.
///
/// Every host command and every platform notification for the camera is
/// processed here, one at a time.
pub(crate) struct Worker {
    platform: Arc<dyn CameraPlatform>,
    query: Arc<dyn CapabilityQuery>,
    timeouts: SessionTimeouts,
    preferences: Arc<RwLock<PreferenceSet>>,
    availability: Arc<AvailabilityTracker>,
    events_tx: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<LifecycleState>,

    device: Option<Arc<dyn PlatformDevice>>,
    sensor: Option<SensorInfo>,
    session: Option<ActiveSession>,
    pending: Option<CameraError>,
    generation: u64,
    epoch: u64,
    last_session_attempt: Option<Uuid>,
    known_providers: Vec<Arc<dyn SurfaceProvider>>,
}

impl Worker {
    pub fn new(
        platform: Arc<dyn CameraPlatform>,
        query: Arc<dyn CapabilityQuery>,
        timeouts: SessionTimeouts,
        preferences: Arc<RwLock<PreferenceSet>>,
        availability: Arc<AvailabilityTracker>,
        events_tx: mpsc::UnboundedSender<Event>,
        state_tx: watch::Sender<LifecycleState>,
    ) -> Self {
        Self {
            platform,
            query,
            timeouts,
            preferences,
            availability,
            events_tx,
            state_tx,
            device: None,
            sensor: None,
            session: None,
            pending: None,
            generation: 0,
            epoch: 0,
            last_session_attempt: None,
            known_providers: Vec::new(),
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        debug!("Camera worker started");

        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle_event(event).await,
                command = commands.recv() => match command {
                    Some(command) => {
                        let released = matches!(command, Command::Release { .. });
                        self.handle_command(command).await;
                        if released {
                            break;
                        }
                    }
                    None => {
                        debug!("Camera handle dropped; closing");
                        self.close();
                        break;
                    }
                },
            }
        }

        debug!("Camera worker stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { lens, reply } => {
                let result = self.open(lens).await;
                let _ = reply.send(result);
            }
            Command::StartSession { request, reply } => {
                let result = self.start_session(request).await;
                let _ = reply.send(result);
            }
            Command::StartPreview { reply } => {
                let result = self.start_repeating(CameraMode::Preview).await;
                let _ = reply.send(result);
            }
            Command::StopPreview { reply } => {
                let result = self.stop_repeating(CameraMode::Preview).await;
                let _ = reply.send(result);
            }
            Command::Capture { reply } => {
                let result = self.capture().await;
                let _ = reply.send(result);
            }
            Command::StartRecord { reply } => {
                let result = self.start_repeating(CameraMode::Record).await;
                let _ = reply.send(result);
            }
            Command::StopRecord { reply } => {
                let result = self.stop_repeating(CameraMode::Record).await;
                let _ = reply.send(result);
            }
            Command::StopSession { reply } => {
                let result = self.stop_session().await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                let result = self.close_gracefully().await;
                let _ = reply.send(result);
            }
            Command::Release { reply } => {
                let _ = reply.send(self.release().await);
            }
            Command::Outputs { reply } => {
                let outputs = self
                    .session
                    .as_ref()
                    .map(|session| session.outputs.clone())
                    .unwrap_or_default();
                let _ = reply.send(outputs);
            }
            Command::SensorInfo { reply } => {
                let _ = reply.send(self.sensor);
            }
            Command::PendingError { reply } => {
                let _ = reply.send(self.pending.clone());
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::DeviceFailed { generation, error } => {
                if generation != self.generation {
                    trace!("Ignoring failure of stale device generation {}", generation);
                    return;
                }
                self.fail(error);
            }
            Event::SessionFailed { session_id, error } => {
                if self.last_session_attempt != Some(session_id) {
                    trace!("Ignoring failure of stale session {}", session_id);
                    return;
                }
                if let Some(session) = self.session.take() {
                    session.listeners.cancel();
                    session.platform.close();
                }
                self.set_pending(error);
                self.publish_state();
            }
            Event::SurfaceChanged {
                epoch,
                index,
                handle,
            } => {
                if let Err(error) = self.swap_surface(epoch, index, handle).await {
                    warn!("Live surface change failed: {}", error);
                    self.set_pending(error);
                    self.publish_state();
                }
            }
        }
    }

    fn set_pending(&mut self, error: CameraError) {
        if self.pending.is_none() {
            warn!("Camera error pending until reopen: {}", error);
            self.pending = Some(error);
        }
    }

    /// Asynchronous device failure: remember it and drop every reference
    fn fail(&mut self, error: CameraError) {
        self.set_pending(error);
        if let Some(session) = self.session.take() {
            session.listeners.cancel();
            session.platform.close();
        }
        self.device = None;
        self.publish_state();
    }

    fn check_pending(&self) -> CameraResult<()> {
        match &self.pending {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn current_state(&self) -> LifecycleState {
        match (&self.device, &self.session) {
            (None, _) => LifecycleState::Closed,
            (Some(_), None) => LifecycleState::Opened,
            (Some(_), Some(session)) => match session.repeating {
                Some(CameraMode::Record) => LifecycleState::RecordActive,
                Some(_) => LifecycleState::PreviewActive,
                None => LifecycleState::SessionActive,
            },
        }
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!("Camera state: {} -> {}", previous, state);
        }
    }

    fn publish_state(&self) {
        self.set_state(self.current_state());
    }

    async fn open(&mut self, lens: Lens) -> CameraResult<()> {
        debug!("#open lens={}", lens);
        if self.device.is_some() {
            return Err(CameraError::precondition("camera is already opened"));
        }
        if let Some(error) = self.pending.take() {
            info!("Clearing pending error on reopen: {}", error);
        }

        let camera_id = find_camera_by_lens(self.query.as_ref(), lens)?;
        if !self.platform.has_camera_permission() {
            return Err(CameraError::CameraPermissionRequired);
        }

        self.availability
            .wait_available(
                &camera_id,
                self.timeouts.availability,
                self.timeouts.availability_poll_interval,
            )
            .await?;
        let sensor = SensorInfo::read(self.query.as_ref(), &camera_id)?;

        self.set_state(LifecycleState::Opening);
        self.generation += 1;
        let (opened, pending) = single_resume();
        let listener = Arc::new(DeviceListener {
            generation: self.generation,
            opened,
            events: self.events_tx.clone(),
        });

        let result = match self.platform.open_camera(&camera_id, listener) {
            Ok(()) => pending
                .wait("open camera", self.timeouts.open)
                .await
                .and_then(|outcome| outcome),
            Err(error) => Err(error),
        };

        match result {
            Ok(device) => {
                info!("Opened camera {} ({} lens)", camera_id, lens);
                self.device = Some(device);
                self.sensor = Some(sensor);
                self.publish_state();
                Ok(())
            }
            Err(error) => {
                warn!("Failed to open camera {}: {}", camera_id, error);
                self.publish_state();
                Err(error)
            }
        }
    }

    async fn start_session(&mut self, request: SessionRequest) -> CameraResult<()> {
        debug!("#startSession surfaces={}", request.surfaces.len());
        self.check_pending()?;
        if request.surfaces.is_empty() {
            return Err(CameraError::precondition("surfaces is empty"));
        }
        let device = self
            .device
            .clone()
            .ok_or_else(|| CameraError::precondition("camera is not opened"))?;
        if self.session.is_some() {
            return Err(CameraError::precondition("session is already started"));
        }

        for provider in &request.surfaces {
            if !self
                .known_providers
                .iter()
                .any(|known| Arc::ptr_eq(known, provider))
            {
                self.known_providers.push(Arc::clone(provider));
            }
        }

        self.set_state(LifecycleState::SessionStarting);
        let result = self.configure_session(device, request).await;
        match result {
            Ok((session, updates)) => {
                info!(
                    "Session {} active over {} surfaces",
                    session.id,
                    session.union().len()
                );
                self.spawn_surface_listeners(&session, updates);
                self.session = Some(session);
                self.publish_state();
                Ok(())
            }
            Err(error) => {
                self.publish_state();
                Err(error)
            }
        }
    }

    async fn configure_session(
        &mut self,
        device: Arc<dyn PlatformDevice>,
        request: SessionRequest,
    ) -> CameraResult<(ActiveSession, Vec<Option<SurfaceUpdates>>)> {
        let camera_id = device.id().to_string();
        let sensor = match self.sensor {
            Some(sensor) => sensor,
            None => SensorInfo::read(self.query.as_ref(), &camera_id)?,
        };

        let level = self.query.support_level(&camera_id)?;
        debug!("Camera {} support level {}", camera_id, level);

        let formats: Vec<_> = request
            .surfaces
            .iter()
            .map(|provider| provider.format())
            .collect();
        let roles = classifier::classify(level, &formats)?;
        let record_profile = self.query.record_profile_resolution(&camera_id)?;

        let mut outputs = Vec::with_capacity(request.surfaces.len());
        let mut plans = Vec::new();
        for (index, (provider, role)) in request.surfaces.iter().zip(&roles).enumerate() {
            let format = provider.format();
            let candidates = match role {
                Some(role) => {
                    let supported = self.query.output_resolutions(&camera_id, format)?;
                    let candidates = resolver::resolve(
                        *role,
                        format,
                        &supported,
                        request.display_resolution,
                        record_profile,
                        MAX_PREVIEW_RESOLUTION,
                    )?;
                    debug!(
                        "Surface {} ({}) role={} candidates={}",
                        provider.name(),
                        format,
                        role,
                        candidates.len()
                    );
                    plans.push((
                        index,
                        SurfaceConfig {
                            resolutions: candidates.clone(),
                            aspect_ratio: request.aspect_ratio,
                            display_rotation: request.display_rotation,
                            sensor_rotation: sensor.orientation,
                            lens: sensor.lens,
                        },
                    ));
                    candidates
                }
                None => Vec::new(),
            };
            outputs.push(ResolvedSurface {
                name: provider.name().to_string(),
                format,
                role: *role,
                candidates,
                handle: None,
            });
        }

        let updates = subscribe_updates(&request.surfaces);
        let handles =
            acquire_surfaces(&request.surfaces, plans, self.timeouts.surface_acquire).await?;
        for (output, handle) in outputs.iter_mut().zip(handles) {
            output.handle = handle;
        }

        let surfaces_by_mode = group_by_mode(&request.surfaces, &outputs);
        let union = distinct_handles(&outputs);
        let (id, platform) = self.create_platform_session(&device, union).await?;

        self.epoch += 1;
        let session = ActiveSession {
            id,
            epoch: self.epoch,
            platform,
            request,
            outputs,
            surfaces_by_mode,
            repeating: None,
            listeners: CancellationToken::new(),
        };
        Ok((session, updates))
    }

    async fn create_platform_session(
        &mut self,
        device: &Arc<dyn PlatformDevice>,
        surfaces: Vec<SurfaceHandle>,
    ) -> CameraResult<(Uuid, Arc<dyn PlatformSession>)> {
        let session_id = Uuid::new_v4();
        debug!(
            "Creating session {} over {} surfaces",
            session_id,
            surfaces.len()
        );
        self.last_session_attempt = Some(session_id);

        let (configured, pending) = single_resume();
        let listener = Arc::new(SessionListener {
            session_id,
            configured,
            events: self.events_tx.clone(),
        });
        device.create_session(surfaces, listener)?;

        let session = pending
            .wait("configure session", self.timeouts.session_configure)
            .await
            .and_then(|outcome| outcome)?;
        Ok((session_id, session))
    }

    fn spawn_surface_listeners(
        &self,
        session: &ActiveSession,
        updates: Vec<Option<SurfaceUpdates>>,
    ) {
        for (index, updates) in updates.into_iter().enumerate() {
            let Some(mut updates) = updates else {
                continue;
            };
            let Some(output) = session.outputs.get(index) else {
                continue;
            };

            let acquired = output.handle;
            let token = session.listeners.clone();
            let events = self.events_tx.clone();
            let epoch = session.epoch;
            let name = output.name.clone();

            tokio::spawn(async move {
                // Replacements published while the session was configured
                if let Ok(true) = updates.has_changed() {
                    let handle = *updates.borrow_and_update();
                    if Some(handle) != acquired {
                        debug!("Surface {} replaced by {} during configuration", name, handle);
                        let _ = events.send(Event::SurfaceChanged { epoch, index, handle });
                    }
                }

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        changed = updates.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let handle = *updates.borrow_and_update();
                            debug!("Surface {} replaced by {}", name, handle);
                            if events.send(Event::SurfaceChanged { epoch, index, handle }).is_err() {
                                break;
                            }
                        }
                    }
                }
                trace!("Surface listener for {} stopped", name);
            });
        }
    }

    /// Rebuild the platform session around a replaced surface.
    ///
    /// The old session is closed before the new one is created, and the
    /// repeating request that was running is re-issued.
    async fn swap_surface(
        &mut self,
        epoch: u64,
        index: usize,
        handle: SurfaceHandle,
    ) -> CameraResult<()> {
        let Some(device) = self.device.clone() else {
            return Ok(());
        };
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if session.epoch != epoch
            || session.outputs.get(index).and_then(|output| output.handle) == Some(handle)
            || session.outputs.get(index).and_then(|output| output.role).is_none()
        {
            self.session = Some(session);
            return Ok(());
        }

        info!(
            "Rebuilding session {} after surface {} changed",
            session.id, session.outputs[index].name
        );
        let repeating = session.repeating.take();
        if repeating.is_some() {
            let _ = session.platform.abort_captures();
            let _ = session.platform.stop_repeating();
        }
        session.platform.close();

        session.outputs[index].handle = Some(handle);
        session.reroute();

        let (id, platform) = match self.create_platform_session(&device, session.union()).await {
            Ok(created) => created,
            Err(error) => {
                Self::abandon(session, repeating).await;
                return Err(error);
            }
        };
        session.id = id;
        session.platform = platform;

        if let Some(mode) = repeating {
            let request = self.build_request(&session, mode, RequestTemplate::for_mode(mode));
            if let Err(error) = session.platform.set_repeating_request(request) {
                session.platform.close();
                Self::abandon(session, repeating).await;
                return Err(error);
            }
            session.repeating = Some(mode);
        }

        info!("Session {} replaced the previous session", session.id);
        self.session = Some(session);
        self.publish_state();
        Ok(())
    }

    /// Give up on a session whose platform half is already closed
    async fn abandon(session: ActiveSession, repeating: Option<CameraMode>) {
        session.listeners.cancel();
        if let Some(mode) = repeating {
            Self::notify_stop(&session.providers_for(mode), mode).await;
        }
        warn!("Session {} abandoned", session.id);
    }

    fn preference_context(&self, session: &ActiveSession) -> PreferenceContext {
        let sensor = self.sensor;
        PreferenceContext {
            lens: sensor.map(|sensor| sensor.lens).unwrap_or(Lens::Back),
            sensor_orientation: sensor.map(|sensor| sensor.orientation).unwrap_or_default(),
            display_rotation: session.request.display_rotation,
            active_array: sensor.map(|sensor| sensor.active_array).unwrap_or_default(),
        }
    }

    fn build_request(
        &self,
        session: &ActiveSession,
        mode: CameraMode,
        template: RequestTemplate,
    ) -> CaptureRequest {
        self.decorated(session, mode, template, &session.surfaces(mode))
            .build()
    }

    fn decorated(
        &self,
        session: &ActiveSession,
        mode: CameraMode,
        template: RequestTemplate,
        targets: &[SurfaceHandle],
    ) -> CaptureRequestBuilder {
        let mut builder = CaptureRequestBuilder::new(template);
        builder.add_targets(targets);
        self.preferences
            .read()
            .apply(&mut builder, mode, &self.preference_context(session));
        builder
    }

    fn active_session(&self) -> CameraResult<&ActiveSession> {
        if self.device.is_none() {
            return Err(CameraError::precondition("camera is not opened"));
        }
        self.session
            .as_ref()
            .ok_or_else(|| CameraError::precondition("session is not started"))
    }

    async fn notify_start(providers: &[Arc<dyn SurfaceProvider>], mode: CameraMode) {
        for provider in providers {
            provider.on_start(mode).await;
        }
    }

    async fn notify_stop(providers: &[Arc<dyn SurfaceProvider>], mode: CameraMode) {
        for provider in providers {
            provider.on_stop(mode).await;
        }
    }

    async fn start_repeating(&mut self, mode: CameraMode) -> CameraResult<()> {
        debug!("#start {} stream", mode);
        self.check_pending()?;
        let session = self.active_session()?;

        let targets = session.surfaces(mode);
        if targets.is_empty() {
            return Err(CameraError::precondition(format!(
                "{} surfaces is empty",
                mode
            )));
        }

        let request = self.build_request(session, mode, RequestTemplate::for_mode(mode));
        session.platform.set_repeating_request(request)?;

        let superseded = session.repeating.filter(|current| *current != mode);
        let started = session.providers_for(mode);
        let stopped = superseded
            .map(|previous| session.providers_for(previous))
            .unwrap_or_default();

        if let Some(session) = self.session.as_mut() {
            session.repeating = Some(mode);
        }
        self.publish_state();

        if let Some(previous) = superseded {
            debug!("{} stream superseded by {}", previous, mode);
            Self::notify_stop(&stopped, previous).await;
        }
        Self::notify_start(&started, mode).await;
        Ok(())
    }

    /// Halt the repeating request of `mode`; a no-op when it is not running
    async fn stop_repeating(&mut self, mode: CameraMode) -> CameraResult<()> {
        debug!("#stop {} stream", mode);
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.repeating != Some(mode) {
            return Ok(());
        }

        session.repeating = None;
        let aborted = session.platform.abort_captures();
        let stopped = session.platform.stop_repeating();
        let providers = session.providers_for(mode);
        self.publish_state();

        Self::notify_stop(&providers, mode).await;
        aborted.and(stopped)
    }

    async fn capture(&mut self) -> CameraResult<CaptureResult> {
        debug!("#capture");
        self.check_pending()?;
        let session = self.active_session()?;

        let preview = session.surfaces(CameraMode::Preview);
        let capture = session.surfaces(CameraMode::Capture);
        if preview.is_empty() {
            return Err(CameraError::precondition("preview surfaces is empty"));
        }
        if capture.is_empty() {
            return Err(CameraError::precondition("capture surfaces is empty"));
        }
        if session.repeating != Some(CameraMode::Preview) {
            return Err(CameraError::precondition("preview is not active"));
        }

        let providers = session.providers_for(CameraMode::Capture);
        self.set_state(LifecycleState::Capturing);
        Self::notify_start(&providers, CameraMode::Capture).await;

        let result = self.run_still_capture(&preview, &capture).await;

        Self::notify_stop(&providers, CameraMode::Capture).await;
        self.publish_state();
        result
    }

    async fn run_still_capture(
        &self,
        preview: &[SurfaceHandle],
        capture: &[SurfaceHandle],
    ) -> CameraResult<CaptureResult> {
        let session = self.active_session()?;
        let camera_id = self
            .device
            .as_ref()
            .map(|device| device.id().to_string())
            .unwrap_or_default();
        let submitter = RequestSubmitter {
            session: Arc::clone(&session.platform),
            timeout: self.timeouts.request,
        };

        let focus = self.query.supports_autofocus(&camera_id);
        if focus {
            let mut lock = self.decorated(
                session,
                CameraMode::Preview,
                RequestTemplate::Preview,
                preview,
            );
            lock.af_trigger(AfTrigger::Start).tag("lock_focus");
            let lock = lock.build();

            let attempts = poll_until(
                "focus lock",
                self.timeouts.convergence,
                self.timeouts.convergence_poll_interval,
                || {
                    let submitter = &submitter;
                    let request = lock.clone();
                    async move {
                        let result = submitter.capture(request).await?;
                        Ok::<_, CameraError>(result.af_state == Some(AfState::FocusedLocked))
                    }
                },
            )
            .await?;
            debug!("Focus locked after {} attempts", attempts);
        }

        let result = self
            .expose_and_shoot(session, &submitter, &camera_id, preview, capture)
            .await;

        if focus {
            let mut unlock = self.decorated(
                session,
                CameraMode::Preview,
                RequestTemplate::Preview,
                preview,
            );
            unlock.af_trigger(AfTrigger::Cancel).tag("unlock_focus");
            if let Err(error) = submitter.capture(unlock.build()).await {
                if result.is_ok() {
                    return Err(error);
                }
                warn!("Focus unlock failed: {}", error);
            }
        }

        result
    }

    /// Precapture metering (when supported) followed by the still request
    async fn expose_and_shoot(
        &self,
        session: &ActiveSession,
        submitter: &RequestSubmitter,
        camera_id: &str,
        preview: &[SurfaceHandle],
        capture: &[SurfaceHandle],
    ) -> CameraResult<CaptureResult> {
        if self.query.supports_auto_exposure(camera_id) {
            let mut precapture = self.decorated(
                session,
                CameraMode::Preview,
                RequestTemplate::Preview,
                preview,
            );
            precapture
                .ae_precapture_trigger(AePrecaptureTrigger::Start)
                .tag("precapture");
            let precapture = precapture.build();

            let attempts = poll_until(
                "exposure convergence",
                self.timeouts.convergence,
                self.timeouts.convergence_poll_interval,
                || {
                    let request = precapture.clone();
                    async move {
                        let result = submitter.capture(request).await?;
                        Ok::<_, CameraError>(result.ae_state == Some(AeState::Converged))
                    }
                },
            )
            .await?;
            debug!("Exposure converged after {} attempts", attempts);
        }

        let mut still = self.decorated(
            session,
            CameraMode::Capture,
            RequestTemplate::StillCapture,
            capture,
        );
        still.tag("still");
        let result = submitter.capture(still.build()).await?;
        info!("Still capture completed (frame {})", result.frame_number);
        Ok(result)
    }

    async fn stop_session(&mut self) -> CameraResult<()> {
        debug!("#stopSession");
        self.stop_repeating(CameraMode::Preview).await?;
        self.stop_repeating(CameraMode::Record).await?;
        if let Some(session) = self.session.take() {
            session.listeners.cancel();
            session.platform.close();
            info!("Session {} closed", session.id);
        }
        self.publish_state();
        Ok(())
    }

    async fn close_gracefully(&mut self) -> CameraResult<()> {
        debug!("#close");
        let stopped = self.stop_session().await;
        self.close();
        stopped
    }

    /// Drop the session and device without waiting on providers
    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.listeners.cancel();
            session.platform.close();
        }
        if let Some(device) = self.device.take() {
            device.close();
            info!("Camera {} closed", device.id());
        }
        self.sensor = None;
        self.publish_state();
    }

    async fn release(&mut self) -> CameraResult<()> {
        debug!("#release");
        let closed = self.close_gracefully().await;
        for provider in self.known_providers.drain(..) {
            provider.release().await;
        }
        info!("Camera released");
        closed
    }
}

/// Subscribe to every provider's replacement stream, marking the current
/// value seen so only later replacements count
fn subscribe_updates(providers: &[Arc<dyn SurfaceProvider>]) -> Vec<Option<SurfaceUpdates>> {
    providers
        .iter()
        .map(|provider| {
            provider.surface_updates().map(|mut updates| {
                let _ = updates.borrow_and_update();
                updates
            })
        })
        .collect()
}

/// Submits one-shot requests and waits for their completion
struct RequestSubmitter {
    session: Arc<dyn PlatformSession>,
    timeout: Duration,
}

impl RequestSubmitter {
    async fn capture(&self, request: CaptureRequest) -> CameraResult<CaptureResult> {
        let tag = request.tag.clone().unwrap_or_else(|| "capture".to_string());
        let (done, pending) = single_resume();
        self.session
            .capture(request, Arc::new(CaptureListener { done }))?;
        pending
            .wait(&format!("{} request", tag), self.timeout)
            .await
            .and_then(|outcome| outcome)
    }
}

/// Materialise every planned surface concurrently, each under `timeout`.
///
/// Results are index-aligned with `providers`; surfaces without a plan stay
/// `None`. The first failure aborts the remaining acquisitions.
async fn acquire_surfaces(
    providers: &[Arc<dyn SurfaceProvider>],
    plans: Vec<(usize, SurfaceConfig)>,
    timeout: Duration,
) -> CameraResult<Vec<Option<SurfaceHandle>>> {
    let mut tasks = JoinSet::new();
    for (index, config) in plans {
        let provider = Arc::clone(&providers[index]);
        tasks.spawn(async move {
            let operation = format!("acquire surface {}", provider.name());
            let result = with_deadline(&operation, timeout, provider.acquire_surface(config)).await;
            (index, result)
        });
    }

    let mut handles = vec![None; providers.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| {
            warn!("Surface acquisition task failed: {}", e);
            CameraError::SessionUnknown
        })?;
        match result {
            Ok(handle) => {
                trace!("Acquired {}", handle);
                handles[index] = Some(handle);
            }
            Err(error) => {
                warn!("Surface acquisition failed: {}", error);
                return Err(error);
            }
        }
    }

    Ok(handles)
}
