use crate::error::CameraResult;
use crate::request::{CaptureFailure, CaptureRequest, CaptureResult};
use crate::types::SurfaceHandle;
use std::sync::Arc;

pub trait CameraPlatform: Send + Sync {
    /// Whether the host process holds the camera permission
    fn has_camera_permission(&self) -> bool;

    /// Request the device to be opened. Outcome is delivered to `callback`.
    fn open_camera(
        &self,
        camera_id: &str,
        callback: Arc<dyn DeviceStateCallback>,
    ) -> CameraResult<()>;

    /// Register for hot-plug availability notifications
    fn register_availability_callback(&self, callback: Arc<dyn AvailabilityCallback>);
}

pub trait DeviceStateCallback: Send + Sync {
    fn on_opened(&self, device: Arc<dyn PlatformDevice>);
    fn on_disconnected(&self, device: Arc<dyn PlatformDevice>);
    fn on_error(&self, device: Arc<dyn PlatformDevice>, code: i32);
    fn on_closed(&self, _camera_id: &str) {}
}

pub trait AvailabilityCallback: Send + Sync {
    fn on_available(&self, camera_id: &str);
    fn on_unavailable(&self, camera_id: &str);
}

/// An opened camera device
pub trait PlatformDevice: Send + Sync {
    fn id(&self) -> &str;

    /// Configure a capture session over `surfaces`. Outcome is delivered to `callback`.
    fn create_session(
        &self,
        surfaces: Vec<SurfaceHandle>,
        callback: Arc<dyn SessionStateCallback>,
    ) -> CameraResult<()>;

    fn close(&self);
}

pub trait SessionStateCallback: Send + Sync {
    fn on_configured(&self, session: Arc<dyn PlatformSession>);
    fn on_configure_failed(&self);
    fn on_closed(&self) {}
}

/// A configured capture session
pub trait PlatformSession: Send + Sync {
    /// Submit a one-shot request; completion is delivered to `callback`
    fn capture(
        &self,
        request: CaptureRequest,
        callback: Arc<dyn CaptureCallback>,
    ) -> CameraResult<()>;

    /// Replace the repeating request
    fn set_repeating_request(&self, request: CaptureRequest) -> CameraResult<()>;

    fn stop_repeating(&self) -> CameraResult<()>;

    fn abort_captures(&self) -> CameraResult<()>;

    fn close(&self);
}

pub trait CaptureCallback: Send + Sync {
    fn on_completed(&self, result: CaptureResult);
    fn on_failed(&self, failure: CaptureFailure);
}
