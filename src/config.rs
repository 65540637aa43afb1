use crate::preferences::{FlashMode, DEFAULT_JPEG_QUALITY};
use crate::types::{AspectRatio, Lens, Resolution, Rotation};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamflowConfig {
    pub session: SessionConfig,
    pub display: DisplayConfig,
    pub capture: CaptureConfig,
}

/// Deadlines of every bounded suspension point, in milliseconds
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Per-provider surface materialisation timeout
    #[serde(default = "default_surface_acquire_timeout_ms")]
    pub surface_acquire_timeout_ms: u64,

    /// Wait for the device opened callback
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Wait for the session configured callback
    #[serde(default = "default_session_configure_timeout_ms")]
    pub session_configure_timeout_ms: u64,

    /// Wait for a one-shot request to complete
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bound on the focus / exposure convergence loops of a still capture
    #[serde(default = "default_convergence_timeout_ms")]
    pub convergence_timeout_ms: u64,

    #[serde(default = "default_convergence_poll_interval_ms")]
    pub convergence_poll_interval_ms: u64,

    /// How long open waits for the camera to be reported available
    #[serde(default = "default_availability_timeout_ms")]
    pub availability_timeout_ms: u64,

    #[serde(default = "default_availability_poll_interval_ms")]
    pub availability_poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DisplayConfig {
    /// Display rotation in degrees (0, 90, 180, 270)
    #[serde(default = "default_display_rotation")]
    pub rotation: u32,

    #[serde(default = "default_display_width")]
    pub width: u32,

    #[serde(default = "default_display_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_lens")]
    pub lens: Lens,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: AspectRatio,

    #[serde(default = "default_flash")]
    pub flash: FlashMode,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Runtime view of [`SessionConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub surface_acquire: Duration,
    pub open: Duration,
    pub session_configure: Duration,
    pub request: Duration,
    pub convergence: Duration,
    pub convergence_poll_interval: Duration,
    pub availability: Duration,
    pub availability_poll_interval: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        SessionConfig::default().timeouts()
    }
}

impl SessionConfig {
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            surface_acquire: Duration::from_millis(self.surface_acquire_timeout_ms),
            open: Duration::from_millis(self.open_timeout_ms),
            session_configure: Duration::from_millis(self.session_configure_timeout_ms),
            request: Duration::from_millis(self.request_timeout_ms),
            convergence: Duration::from_millis(self.convergence_timeout_ms),
            convergence_poll_interval: Duration::from_millis(self.convergence_poll_interval_ms),
            availability: Duration::from_millis(self.availability_timeout_ms),
            availability_poll_interval: Duration::from_millis(self.availability_poll_interval_ms),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            surface_acquire_timeout_ms: default_surface_acquire_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            session_configure_timeout_ms: default_session_configure_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            convergence_timeout_ms: default_convergence_timeout_ms(),
            convergence_poll_interval_ms: default_convergence_poll_interval_ms(),
            availability_timeout_ms: default_availability_timeout_ms(),
            availability_poll_interval_ms: default_availability_poll_interval_ms(),
        }
    }
}

impl DisplayConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Validated rotation; non right angles fall back to 0
    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.rotation).unwrap_or_default()
    }
}

impl CamflowConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camflow.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default(
                "session.surface_acquire_timeout_ms",
                default_surface_acquire_timeout_ms() as i64,
            )?
            .set_default("session.open_timeout_ms", default_open_timeout_ms() as i64)?
            .set_default(
                "session.session_configure_timeout_ms",
                default_session_configure_timeout_ms() as i64,
            )?
            .set_default("session.request_timeout_ms", default_request_timeout_ms() as i64)?
            .set_default(
                "session.convergence_timeout_ms",
                default_convergence_timeout_ms() as i64,
            )?
            .set_default(
                "session.convergence_poll_interval_ms",
                default_convergence_poll_interval_ms() as i64,
            )?
            .set_default(
                "session.availability_timeout_ms",
                default_availability_timeout_ms() as i64,
            )?
            .set_default(
                "session.availability_poll_interval_ms",
                default_availability_poll_interval_ms() as i64,
            )?
            .set_default("display.rotation", default_display_rotation())?
            .set_default("display.width", default_display_width())?
            .set_default("display.height", default_display_height())?
            .set_default("capture.lens", default_lens().to_string())?
            .set_default("capture.aspect_ratio", default_aspect_ratio().to_string())?
            .set_default("capture.flash", default_flash().to_string())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CAMFLOW_ prefix
            .add_source(
                Environment::with_prefix("CAMFLOW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CamflowConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        let timeouts = [
            ("surface_acquire_timeout_ms", session.surface_acquire_timeout_ms),
            ("open_timeout_ms", session.open_timeout_ms),
            ("session_configure_timeout_ms", session.session_configure_timeout_ms),
            ("request_timeout_ms", session.request_timeout_ms),
            ("convergence_timeout_ms", session.convergence_timeout_ms),
            ("convergence_poll_interval_ms", session.convergence_poll_interval_ms),
            ("availability_timeout_ms", session.availability_timeout_ms),
            ("availability_poll_interval_ms", session.availability_poll_interval_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Session {} must be greater than 0",
                    name
                )));
            }
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError::Message(
                "Display resolution must be greater than 0".to_string(),
            ));
        }

        if Rotation::from_degrees(self.display.rotation).is_none() {
            return Err(ConfigError::Message(format!(
                "Display rotation must be 0, 90, 180 or 270 (got {})",
                self.display.rotation
            )));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CamflowConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            display: DisplayConfig {
                rotation: default_display_rotation(),
                width: default_display_width(),
                height: default_display_height(),
            },
            capture: CaptureConfig {
                lens: default_lens(),
                aspect_ratio: default_aspect_ratio(),
                flash: default_flash(),
                jpeg_quality: default_jpeg_quality(),
            },
        }
    }
}

// Default value functions
fn default_surface_acquire_timeout_ms() -> u64 {
    500
}
fn default_open_timeout_ms() -> u64 {
    5000
}
fn default_session_configure_timeout_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    2000
}
fn default_convergence_timeout_ms() -> u64 {
    3000
}
fn default_convergence_poll_interval_ms() -> u64 {
    10
}
fn default_availability_timeout_ms() -> u64 {
    1000
}
fn default_availability_poll_interval_ms() -> u64 {
    50
}

fn default_display_rotation() -> u32 {
    0
}
fn default_display_width() -> u32 {
    1920
}
fn default_display_height() -> u32 {
    1080
}

fn default_lens() -> Lens {
    Lens::Back
}
fn default_aspect_ratio() -> AspectRatio {
    AspectRatio::Ratio4x3
}
fn default_flash() -> FlashMode {
    FlashMode::Off
}
fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}
