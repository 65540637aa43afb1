use super::{PreferenceContext, RequestPreference};
use crate::request::CaptureRequestBuilder;
use crate::types::{CameraMode, Rect};

/// Digital zoom by cropping the preview stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPreference {
    pub level: f32,
}

impl Default for ZoomPreference {
    fn default() -> Self {
        Self { level: 1.0 }
    }
}

/// Centred crop of `sensor` scaled down by `zoom`
pub fn cropped_region(sensor: Rect, zoom: f32) -> Rect {
    let width = (sensor.width() as f64 / zoom as f64).floor() as i32;
    let height = (sensor.height() as f64 / zoom as f64).floor() as i32;
    let left = sensor.left + (sensor.width() - width) / 2;
    let top = sensor.top + (sensor.height() - height) / 2;
    Rect::new(left, top, left + width, top + height)
}

impl RequestPreference for ZoomPreference {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        context: &PreferenceContext,
    ) {
        if mode == CameraMode::Preview && self.level != 1.0 {
            builder.crop_region(cropped_region(context.active_array, self.level));
        }
    }
}
