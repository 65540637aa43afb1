use super::worker::Event;
use crate::bridge::SingleResume;
use crate::error::{classify_device_error, CameraError, CameraResult};
use crate::platform::{
    CaptureCallback, DeviceStateCallback, PlatformDevice, PlatformSession, SessionStateCallback,
};
use crate::request::{CaptureFailure, CaptureResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) type DeviceOutcome = CameraResult<Arc<dyn PlatformDevice>>;
pub(crate) type SessionOutcome = CameraResult<Arc<dyn PlatformSession>>;

/// Device callbacks for one open attempt
pub(crate) struct DeviceListener {
    pub generation: u64,
    pub opened: Arc<SingleResume<DeviceOutcome>>,
    pub events: mpsc::UnboundedSender<Event>,
}

impl DeviceListener {
    fn fail(&self, device: Arc<dyn PlatformDevice>, error: CameraError) {
        device.close();
        let _ = self.opened.resume(Err(error.clone()));
        let _ = self.events.send(Event::DeviceFailed {
            generation: self.generation,
            error,
        });
    }
}

impl DeviceStateCallback for DeviceListener {
    fn on_opened(&self, device: Arc<dyn PlatformDevice>) {
        debug!("Device {} opened", device.id());
        if let Err(Ok(device)) = self.opened.resume(Ok(device)) {
            debug!("Device {} opened after the caller gave up; closing", device.id());
            device.close();
        }
    }

    fn on_disconnected(&self, device: Arc<dyn PlatformDevice>) {
        warn!("Device {} disconnected", device.id());
        self.fail(device, CameraError::CameraUnknown);
    }

    fn on_error(&self, device: Arc<dyn PlatformDevice>, code: i32) {
        let error = classify_device_error(code);
        warn!("Device {} error {}: {}", device.id(), code, error);
        self.fail(device, error);
    }

    fn on_closed(&self, camera_id: &str) {
        debug!("Device {} closed", camera_id);
    }
}

/// Session callbacks for one configure attempt
pub(crate) struct SessionListener {
    pub session_id: Uuid,
    pub configured: Arc<SingleResume<SessionOutcome>>,
    pub events: mpsc::UnboundedSender<Event>,
}

impl SessionStateCallback for SessionListener {
    fn on_configured(&self, session: Arc<dyn PlatformSession>) {
        debug!("Session {} configured", self.session_id);
        if let Err(Ok(session)) = self.configured.resume(Ok(session)) {
            debug!(
                "Session {} configured after the caller gave up; closing",
                self.session_id
            );
            session.close();
        }
    }

    fn on_configure_failed(&self) {
        warn!("Session {} configuration failed", self.session_id);
        let _ = self
            .configured
            .resume(Err(CameraError::SessionConfigurationFailed));
        let _ = self.events.send(Event::SessionFailed {
            session_id: self.session_id,
            error: CameraError::SessionConfigurationFailed,
        });
    }
}

/// Completion of a single one-shot request
pub(crate) struct CaptureListener {
    pub done: Arc<SingleResume<CameraResult<CaptureResult>>>,
}

impl CaptureCallback for CaptureListener {
    fn on_completed(&self, result: CaptureResult) {
        let _ = self.done.resume(Ok(result));
    }

    fn on_failed(&self, failure: CaptureFailure) {
        debug!(
            "Capture failed (frame {}, tag {:?})",
            failure.frame_number, failure.tag
        );
        let _ = self.done.resume(Err(CameraError::capture_failed(failure.tag)));
    }
}
