pub mod bridge;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod platform;
pub mod preferences;
pub mod query;
pub mod request;
pub mod resolver;
pub mod simulation;
pub mod surface;
pub mod types;

pub use camera::{Camera, CameraBuilder, LifecycleState, ResolvedSurface, SessionRequest};
pub use config::{CamflowConfig, SessionTimeouts};
pub use controller::{CameraController, Settings};
pub use error::{CameraError, CameraResult, CamflowError, Result};
pub use platform::{
    AvailabilityCallback, CameraPlatform, CaptureCallback, DeviceStateCallback, PlatformDevice,
    PlatformSession, SessionStateCallback,
};
pub use preferences::{FlashMode, PreferenceContext, PreferenceSet, RequestPreference};
pub use query::{CapabilityQuery, SensorInfo};
pub use request::{CaptureRequest, CaptureRequestBuilder, CaptureResult, RequestTemplate};
pub use surface::SurfaceProvider;
pub use types::{
    AspectRatio, CameraMode, FormatKey, ImageFormat, Lens, ModeSet, OutputRole, PrivTarget, Rect,
    Resolution, Rotation, SupportLevel, SurfaceConfig, SurfaceFormat, SurfaceHandle,
};
