use crate::error::{CameraError, CameraResult};
use crate::platform::{
    AvailabilityCallback, CameraPlatform, CaptureCallback, DeviceStateCallback, PlatformDevice,
    PlatformSession, SessionStateCallback,
};
use crate::query::CapabilityQuery;
use crate::request::{
    AePrecaptureTrigger, AeState, AfState, AfTrigger, CaptureFailure, CaptureRequest,
    CaptureResult,
};
use crate::types::{
    FormatKey, Lens, Rect, Resolution, Rotation, SupportLevel, SurfaceFormat, SurfaceHandle,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Static description of one simulated camera
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    id: String,
    lens: Lens,
    support_level: SupportLevel,
    sizes: HashMap<FormatKey, Vec<Resolution>>,
    record_profile: Resolution,
    sensor_orientation: Rotation,
    active_array: Rect,
    max_zoom: f32,
    autofocus: bool,
    auto_exposure: bool,
    flash: bool,
}

impl SimulatedCamera {
    pub fn new<S: Into<String>>(id: S, lens: Lens) -> Self {
        let image_sizes = vec![
            Resolution::new(4032, 3024),
            Resolution::new(1920, 1080),
            Resolution::new(1280, 720),
            Resolution::new(640, 480),
        ];
        let priv_sizes = vec![
            Resolution::new(1920, 1080),
            Resolution::new(1440, 1080),
            Resolution::new(1280, 720),
            Resolution::new(640, 480),
        ];

        let mut sizes = HashMap::new();
        sizes.insert(FormatKey::Jpeg, image_sizes.clone());
        sizes.insert(FormatKey::Yuv, image_sizes);
        sizes.insert(FormatKey::Priv, priv_sizes);

        Self {
            id: id.into(),
            lens,
            support_level: SupportLevel::Full,
            sizes,
            record_profile: Resolution::new(1920, 1080),
            sensor_orientation: Rotation::Deg90,
            active_array: Rect::new(0, 0, 4032, 3024),
            max_zoom: 4.0,
            autofocus: true,
            auto_exposure: true,
            flash: lens == Lens::Back,
        }
    }

    pub fn with_support_level(mut self, level: SupportLevel) -> Self {
        self.support_level = level;
        self
    }

    pub fn with_sizes(mut self, key: FormatKey, sizes: Vec<Resolution>) -> Self {
        self.sizes.insert(key, sizes);
        self
    }

    pub fn with_record_profile(mut self, resolution: Resolution) -> Self {
        self.record_profile = resolution;
        self
    }

    pub fn with_sensor_orientation(mut self, orientation: Rotation) -> Self {
        self.sensor_orientation = orientation;
        self
    }

    pub fn with_active_array(mut self, active_array: Rect) -> Self {
        self.active_array = active_array;
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: f32) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_autofocus(mut self, supported: bool) -> Self {
        self.autofocus = supported;
        self
    }

    pub fn with_auto_exposure(mut self, supported: bool) -> Self {
        self.auto_exposure = supported;
        self
    }

    pub fn with_flash(mut self, present: bool) -> Self {
        self.flash = present;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// One recorded interaction with the platform
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    OpenCamera(String),
    CloseDevice(String),
    CreateSession(Vec<SurfaceHandle>),
    CloseSession(u64),
    Capture(CaptureRequest),
    SetRepeating(CaptureRequest),
    StopRepeating,
    AbortCaptures,
}

struct Behaviour {
    permission: bool,
    unavailable: HashSet<String>,
    callback_delay: Duration,
    suppress_open_callback: bool,
    open_error: Option<i32>,
    suppress_configure_callback: bool,
    fail_session_configuration: bool,
    fail_captures: bool,
    fail_repeating: bool,
    fail_aborts: bool,
    af_states: VecDeque<AfState>,
    ae_states: VecDeque<AeState>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            permission: true,
            unavailable: HashSet::new(),
            callback_delay: Duration::from_millis(1),
            suppress_open_callback: false,
            open_error: None,
            suppress_configure_callback: false,
            fail_session_configuration: false,
            fail_captures: false,
            fail_repeating: false,
            fail_aborts: false,
            af_states: VecDeque::new(),
            ae_states: VecDeque::new(),
        }
    }
}

#[derive(Default)]
struct Counters {
    calls: Vec<PlatformCall>,
    open_devices: usize,
    open_sessions: usize,
    max_open_sessions: usize,
    sessions_created: usize,
    next_session_id: u64,
    frame_number: u64,
}

type DeviceBinding = (Arc<dyn DeviceStateCallback>, Arc<dyn PlatformDevice>);

#[derive(Default)]
struct Inner {
    cameras: Mutex<Vec<SimulatedCamera>>,
    behaviour: Mutex<Behaviour>,
    counters: Mutex<Counters>,
    availability: Mutex<Vec<Arc<dyn AvailabilityCallback>>>,
    device: Mutex<Option<DeviceBinding>>,
}

impl Inner {
    fn record(&self, call: PlatformCall) {
        trace!("Platform call: {:?}", call);
        self.counters.lock().calls.push(call);
    }

    fn callback_delay(&self) -> Duration {
        self.behaviour.lock().callback_delay
    }

    fn camera(&self, camera_id: &str) -> CameraResult<SimulatedCamera> {
        self.cameras
            .lock()
            .iter()
            .find(|camera| camera.id == camera_id)
            .cloned()
            .ok_or_else(|| CameraError::CameraNotAvailable {
                camera_id: camera_id.to_string(),
            })
    }
}

/// Scriptable stand-in for a platform camera service.
///
/// Cheap to clone; clones share state, so a test can keep one copy for
/// inspection while the camera owns another.
#[derive(Clone, Default)]
pub struct SimulatedPlatform {
    inner: Arc<Inner>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(self, camera: SimulatedCamera) -> Self {
        self.inner.cameras.lock().push(camera);
        self
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.behaviour.lock().permission = granted;
    }

    /// Flip a camera's availability and notify registered listeners
    pub fn set_available(&self, camera_id: &str, available: bool) {
        {
            let mut behaviour = self.inner.behaviour.lock();
            if available {
                behaviour.unavailable.remove(camera_id);
            } else {
                behaviour.unavailable.insert(camera_id.to_string());
            }
        }

        let listeners = self.inner.availability.lock().clone();
        for listener in listeners {
            if available {
                listener.on_available(camera_id);
            } else {
                listener.on_unavailable(camera_id);
            }
        }
    }

    /// Delay applied before every asynchronous callback
    pub fn set_callback_delay(&self, delay: Duration) {
        self.inner.behaviour.lock().callback_delay = delay;
    }

    /// Never deliver the outcome of the next open requests
    pub fn suppress_open_callback(&self, suppress: bool) {
        self.inner.behaviour.lock().suppress_open_callback = suppress;
    }

    /// Report `code` through `on_error` instead of opening the device
    pub fn fail_open_with(&self, code: Option<i32>) {
        self.inner.behaviour.lock().open_error = code;
    }

    pub fn suppress_configure_callback(&self, suppress: bool) {
        self.inner.behaviour.lock().suppress_configure_callback = suppress;
    }

    pub fn fail_session_configuration(&self, fail: bool) {
        self.inner.behaviour.lock().fail_session_configuration = fail;
    }

    pub fn fail_captures(&self, fail: bool) {
        self.inner.behaviour.lock().fail_captures = fail;
    }

    /// Reject every repeating request with a session error
    pub fn fail_repeating_requests(&self, fail: bool) {
        self.inner.behaviour.lock().fail_repeating = fail;
    }

    /// Reject abort-captures calls with a session error
    pub fn fail_aborts(&self, fail: bool) {
        self.inner.behaviour.lock().fail_aborts = fail;
    }

    /// Focus states reported by successive focus-trigger requests.
    /// Once exhausted, focus reports locked.
    pub fn script_af_states(&self, states: Vec<AfState>) {
        self.inner.behaviour.lock().af_states = states.into();
    }

    /// Exposure states reported by successive precapture requests.
    /// Once exhausted, exposure reports converged.
    pub fn script_ae_states(&self, states: Vec<AeState>) {
        self.inner.behaviour.lock().ae_states = states.into();
    }

    /// Report a device error on the most recently opened device
    pub fn inject_device_error(&self, code: i32) {
        let binding = self.inner.device.lock().clone();
        if let Some((callback, device)) = binding {
            debug!("Injecting device error {} on {}", code, device.id());
            callback.on_error(device, code);
        }
    }

    /// Report a disconnect of the most recently opened device
    pub fn inject_disconnect(&self) {
        let binding = self.inner.device.lock().clone();
        if let Some((callback, device)) = binding {
            debug!("Injecting disconnect of {}", device.id());
            callback.on_disconnected(device);
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.counters.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.counters.lock().calls.clear();
    }

    /// One-shot requests submitted so far
    pub fn captures(&self) -> Vec<CaptureRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Capture(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Repeating requests installed so far
    pub fn repeating_requests(&self) -> Vec<CaptureRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::SetRepeating(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn open_device_count(&self) -> usize {
        self.inner.counters.lock().open_devices
    }

    pub fn open_session_count(&self) -> usize {
        self.inner.counters.lock().open_sessions
    }

    /// Highest number of simultaneously configured sessions observed
    pub fn max_concurrent_sessions(&self) -> usize {
        self.inner.counters.lock().max_open_sessions
    }

    pub fn sessions_created(&self) -> usize {
        self.inner.counters.lock().sessions_created
    }
}

impl CameraPlatform for SimulatedPlatform {
    fn has_camera_permission(&self) -> bool {
        self.inner.behaviour.lock().permission
    }

    fn open_camera(
        &self,
        camera_id: &str,
        callback: Arc<dyn DeviceStateCallback>,
    ) -> CameraResult<()> {
        self.inner.record(PlatformCall::OpenCamera(camera_id.to_string()));
        self.inner.camera(camera_id)?;

        let device = Arc::new(SimulatedDevice {
            id: camera_id.to_string(),
            inner: Arc::clone(&self.inner),
            opened: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let platform_device: Arc<dyn PlatformDevice> = device.clone();
        *self.inner.device.lock() = Some((Arc::clone(&callback), platform_device));

        let (delay, suppressed, error) = {
            let behaviour = self.inner.behaviour.lock();
            (
                behaviour.callback_delay,
                behaviour.suppress_open_callback,
                behaviour.open_error,
            )
        };
        if suppressed {
            debug!("Open callback for {} suppressed", camera_id);
            return Ok(());
        }

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match error {
                Some(code) => callback.on_error(device, code),
                None => {
                    device.mark_opened();
                    callback.on_opened(device);
                }
            }
        });
        Ok(())
    }

    fn register_availability_callback(&self, callback: Arc<dyn AvailabilityCallback>) {
        let ids: Vec<String> = self
            .inner
            .cameras
            .lock()
            .iter()
            .map(|camera| camera.id.clone())
            .collect();
        let unavailable = self.inner.behaviour.lock().unavailable.clone();

        for id in ids {
            if unavailable.contains(&id) {
                callback.on_unavailable(&id);
            } else {
                callback.on_available(&id);
            }
        }
        self.inner.availability.lock().push(callback);
    }
}

impl CapabilityQuery for SimulatedPlatform {
    fn camera_ids(&self) -> Vec<String> {
        self.inner
            .cameras
            .lock()
            .iter()
            .map(|camera| camera.id.clone())
            .collect()
    }

    fn lens_facing(&self, camera_id: &str) -> CameraResult<Lens> {
        Ok(self.inner.camera(camera_id)?.lens)
    }

    fn support_level(&self, camera_id: &str) -> CameraResult<SupportLevel> {
        Ok(self.inner.camera(camera_id)?.support_level)
    }

    fn output_resolutions(
        &self,
        camera_id: &str,
        format: SurfaceFormat,
    ) -> CameraResult<Vec<Resolution>> {
        let camera = self.inner.camera(camera_id)?;
        Ok(format
            .key()
            .and_then(|key| camera.sizes.get(&key).cloned())
            .unwrap_or_default())
    }

    fn record_profile_resolution(&self, camera_id: &str) -> CameraResult<Resolution> {
        Ok(self.inner.camera(camera_id)?.record_profile)
    }

    fn sensor_orientation(&self, camera_id: &str) -> CameraResult<Rotation> {
        Ok(self.inner.camera(camera_id)?.sensor_orientation)
    }

    fn active_array(&self, camera_id: &str) -> CameraResult<Rect> {
        Ok(self.inner.camera(camera_id)?.active_array)
    }

    fn supports_autofocus(&self, camera_id: &str) -> bool {
        self.inner
            .camera(camera_id)
            .map(|camera| camera.autofocus)
            .unwrap_or(false)
    }

    fn supports_auto_exposure(&self, camera_id: &str) -> bool {
        self.inner
            .camera(camera_id)
            .map(|camera| camera.auto_exposure)
            .unwrap_or(false)
    }

    fn has_flash(&self, camera_id: &str) -> bool {
        self.inner
            .camera(camera_id)
            .map(|camera| camera.flash)
            .unwrap_or(false)
    }

    fn max_digital_zoom(&self, camera_id: &str) -> f32 {
        self.inner
            .camera(camera_id)
            .map(|camera| camera.max_zoom)
            .unwrap_or(1.0)
    }
}

struct SimulatedDevice {
    id: String,
    inner: Arc<Inner>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl SimulatedDevice {
    fn mark_opened(&self) {
        if !self.opened.swap(true, Ordering::SeqCst) {
            self.inner.counters.lock().open_devices += 1;
        }
    }
}

impl PlatformDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(
        &self,
        surfaces: Vec<SurfaceHandle>,
        callback: Arc<dyn SessionStateCallback>,
    ) -> CameraResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CameraError::CameraUnknown);
        }
        self.inner.record(PlatformCall::CreateSession(surfaces));

        let session_id = {
            let mut counters = self.inner.counters.lock();
            counters.sessions_created += 1;
            counters.next_session_id += 1;
            counters.next_session_id
        };
        let (delay, suppressed, fail) = {
            let behaviour = self.inner.behaviour.lock();
            (
                behaviour.callback_delay,
                behaviour.suppress_configure_callback,
                behaviour.fail_session_configuration,
            )
        };
        if suppressed {
            debug!("Configure callback for session {} suppressed", session_id);
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fail {
                callback.on_configure_failed();
                return;
            }

            {
                let mut counters = inner.counters.lock();
                counters.open_sessions += 1;
                counters.max_open_sessions = counters.max_open_sessions.max(counters.open_sessions);
            }
            callback.on_configured(Arc::new(SimulatedSession {
                id: session_id,
                inner,
                closed: AtomicBool::new(false),
            }));
        });
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.record(PlatformCall::CloseDevice(self.id.clone()));
        if self.opened.load(Ordering::SeqCst) {
            let mut counters = self.inner.counters.lock();
            counters.open_devices = counters.open_devices.saturating_sub(1);
        }
    }
}

struct SimulatedSession {
    id: u64,
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl SimulatedSession {
    fn ensure_open(&self) -> CameraResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CameraError::SessionUnknown)
        } else {
            Ok(())
        }
    }
}

impl PlatformSession for SimulatedSession {
    fn capture(
        &self,
        request: CaptureRequest,
        callback: Arc<dyn CaptureCallback>,
    ) -> CameraResult<()> {
        self.ensure_open()?;
        self.inner.record(PlatformCall::Capture(request.clone()));

        let (fail, af_state, ae_state) = {
            let mut behaviour = self.inner.behaviour.lock();
            let af_state = if request.af_trigger == Some(AfTrigger::Start) {
                behaviour
                    .af_states
                    .pop_front()
                    .unwrap_or(AfState::FocusedLocked)
            } else {
                AfState::PassiveFocused
            };
            let ae_state = if request.ae_precapture_trigger == Some(AePrecaptureTrigger::Start) {
                behaviour.ae_states.pop_front().unwrap_or(AeState::Converged)
            } else {
                AeState::Converged
            };
            (behaviour.fail_captures, af_state, ae_state)
        };
        let frame_number = {
            let mut counters = self.inner.counters.lock();
            counters.frame_number += 1;
            counters.frame_number
        };
        let delay = self.inner.callback_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fail {
                callback.on_failed(CaptureFailure {
                    frame_number,
                    tag: request.tag,
                    was_image_captured: false,
                });
            } else {
                callback.on_completed(CaptureResult {
                    frame_number,
                    af_state: Some(af_state),
                    ae_state: Some(ae_state),
                });
            }
        });
        Ok(())
    }

    fn set_repeating_request(&self, request: CaptureRequest) -> CameraResult<()> {
        self.ensure_open()?;
        if self.inner.behaviour.lock().fail_repeating {
            return Err(CameraError::SessionUnknown);
        }
        self.inner.record(PlatformCall::SetRepeating(request));
        Ok(())
    }

    fn stop_repeating(&self) -> CameraResult<()> {
        self.ensure_open()?;
        self.inner.record(PlatformCall::StopRepeating);
        Ok(())
    }

    fn abort_captures(&self) -> CameraResult<()> {
        self.ensure_open()?;
        if self.inner.behaviour.lock().fail_aborts {
            return Err(CameraError::SessionUnknown);
        }
        self.inner.record(PlatformCall::AbortCaptures);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.record(PlatformCall::CloseSession(self.id));
        let mut counters = self.inner.counters.lock();
        counters.open_sessions = counters.open_sessions.saturating_sub(1);
    }
}
