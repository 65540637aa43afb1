mod default;
mod flash;
mod jpeg;
mod zoom;

pub use default::DefaultPreference;
pub use flash::{FlashMode, FlashPreference};
pub use jpeg::{jpeg_orientation, JpegPreference, DEFAULT_JPEG_QUALITY};
pub use zoom::{cropped_region, ZoomPreference};

use crate::config::CaptureConfig;
use crate::request::CaptureRequestBuilder;
use crate::types::{CameraMode, Lens, Rect, Rotation};
use std::sync::Arc;

/// Device and display facts a decorator may need while applying itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreferenceContext {
    pub lens: Lens,
    pub sensor_orientation: Rotation,
    pub display_rotation: Rotation,
    pub active_array: Rect,
}

pub trait RequestPreference: Send + Sync {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        context: &PreferenceContext,
    );
}

/// Decorators owned by a single camera
#[derive(Clone, Default)]
pub struct PreferenceSet {
    pub default: DefaultPreference,
    pub flash: FlashPreference,
    pub jpeg: JpegPreference,
    pub zoom: ZoomPreference,
    custom: Vec<Arc<dyn RequestPreference>>,
}

impl PreferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut preferences = Self::new();
        preferences.flash.mode = config.flash;
        preferences.jpeg.quality = config.jpeg_quality;
        preferences
    }

    /// Register a host preference, applied after the built-in ones
    pub fn push(&mut self, preference: Arc<dyn RequestPreference>) {
        self.custom.push(preference);
    }

    pub fn with(mut self, preference: Arc<dyn RequestPreference>) -> Self {
        self.push(preference);
        self
    }

    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    pub fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        context: &PreferenceContext,
    ) {
        self.default.apply(builder, mode, context);
        self.flash.apply(builder, mode, context);
        self.jpeg.apply(builder, mode, context);
        self.zoom.apply(builder, mode, context);
        for preference in &self.custom {
            preference.apply(builder, mode, context);
        }
    }
}

impl std::fmt::Debug for PreferenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceSet")
            .field("default", &self.default)
            .field("flash", &self.flash)
            .field("jpeg", &self.jpeg)
            .field("zoom", &self.zoom)
            .field("custom", &self.custom.len())
            .finish()
    }
}
