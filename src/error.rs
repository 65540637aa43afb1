use std::time::Duration;
use thiserror::Error;

/// Platform device-error codes reported by the device state callback.
pub mod device_error {
    pub const CAMERA_IN_USE: i32 = 1;
    pub const MAX_CAMERAS_IN_USE: i32 = 2;
    pub const CAMERA_DISABLED: i32 = 3;
    pub const CAMERA_DEVICE: i32 = 4;
    pub const CAMERA_SERVICE: i32 = 5;
}

#[derive(Error, Debug)]
pub enum CamflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Closed set of domain errors raised by the capture engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera is already in use by a higher-priority client")]
    CameraInUse,

    #[error("Reached the maximum number of open cameras; close the previous ones")]
    MaxCamerasInUse,

    #[error("Camera is disabled by device policy")]
    CameraDisabled,

    #[error("Something went wrong with the camera device; try reopening it")]
    CameraUnknown,

    #[error("Camera service failed; close all cameras and reopen")]
    CameraServiceFailure,

    #[error("Camera permission required")]
    CameraPermissionRequired,

    #[error("Camera {camera_id} is not available")]
    CameraNotAvailable { camera_id: String },

    #[error("Session configuration failed")]
    SessionConfigurationFailed,

    #[error("Something went wrong with the capture session; try restarting it")]
    SessionUnknown,

    #[error("Capture failed (tag={})", .tag.as_deref().unwrap_or("unknown"))]
    CaptureFailed { tag: Option<String> },

    #[error("No stream combination for {level} matches surfaces {formats}")]
    ConfigurationMismatch { level: String, formats: String },

    #[error("No supported {format} resolution satisfies the {role} bound")]
    ResolutionUnavailable { format: String, role: String },

    #[error("{operation} timed out after {timeout:?}")]
    OperationTimeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Precondition violated: {details}")]
    PreconditionViolation { details: String },
}

impl CameraError {
    /// Map a platform device-error code onto the domain taxonomy
    pub fn from_device_error(code: i32) -> Self {
        match code {
            device_error::CAMERA_IN_USE => CameraError::CameraInUse,
            device_error::MAX_CAMERAS_IN_USE => CameraError::MaxCamerasInUse,
            device_error::CAMERA_DISABLED => CameraError::CameraDisabled,
            device_error::CAMERA_DEVICE => CameraError::CameraUnknown,
            device_error::CAMERA_SERVICE => CameraError::CameraServiceFailure,
            _ => CameraError::CameraUnknown,
        }
    }

    pub fn precondition<S: Into<String>>(details: S) -> Self {
        Self::PreconditionViolation {
            details: details.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout: Duration) -> Self {
        Self::OperationTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn capture_failed(tag: Option<String>) -> Self {
        Self::CaptureFailed { tag }
    }

    /// Whether the host may reasonably retry after closing and reopening
    pub fn is_recoverable(&self) -> bool {
        match self {
            CameraError::CameraInUse
            | CameraError::MaxCamerasInUse
            | CameraError::CameraUnknown
            | CameraError::CameraNotAvailable { .. }
            | CameraError::SessionConfigurationFailed
            | CameraError::SessionUnknown
            | CameraError::CaptureFailed { .. }
            | CameraError::OperationTimeout { .. } => true,
            CameraError::CameraDisabled
            | CameraError::CameraServiceFailure
            | CameraError::CameraPermissionRequired
            | CameraError::ConfigurationMismatch { .. }
            | CameraError::ResolutionUnavailable { .. }
            | CameraError::PreconditionViolation { .. } => false,
        }
    }

    /// Stable string code for hosts that classify errors
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::CameraInUse => "camera_in_use",
            CameraError::MaxCamerasInUse => "max_cameras_in_use",
            CameraError::CameraDisabled => "camera_disabled",
            CameraError::CameraUnknown => "camera_unknown",
            CameraError::CameraServiceFailure => "camera_service_failure",
            CameraError::CameraPermissionRequired => "camera_permission_required",
            CameraError::CameraNotAvailable { .. } => "camera_not_available",
            CameraError::SessionConfigurationFailed => "session_configuration_failed",
            CameraError::SessionUnknown => "session_unknown",
            CameraError::CaptureFailed { .. } => "capture_failed",
            CameraError::ConfigurationMismatch { .. } => "configuration_mismatch",
            CameraError::ResolutionUnavailable { .. } => "resolution_unavailable",
            CameraError::OperationTimeout { .. } => "operation_timeout",
            CameraError::PreconditionViolation { .. } => "precondition_violation",
        }
    }
}

/// Total mapping from platform device-error codes to domain errors
pub fn classify_device_error(code: i32) -> CameraError {
    CameraError::from_device_error(code)
}

impl CamflowError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamflowError>;

pub type CameraResult<T> = std::result::Result<T, CameraError>;
