use super::{PreferenceContext, RequestPreference};
use crate::request::{CaptureRequestBuilder, GpsLocation};
use crate::types::{CameraMode, Lens, Rotation};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Orientation, quality and location of still captures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JpegPreference {
    pub quality: u8,
    pub location: Option<GpsLocation>,
}

impl Default for JpegPreference {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            location: None,
        }
    }
}

/// Clockwise rotation to apply to a still image so it appears upright.
///
/// The display rotation is rounded to the nearest right angle and mirrored
/// for front-facing lenses.
pub fn jpeg_orientation(lens: Lens, sensor: Rotation, display: Rotation) -> u32 {
    let mut device = (display.degrees() as i32 + 45) / 90 * 90;
    if lens == Lens::Front {
        device = -device;
    }
    ((sensor.degrees() as i32 + device + 360) % 360) as u32
}

impl RequestPreference for JpegPreference {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        context: &PreferenceContext,
    ) {
        if mode != CameraMode::Capture {
            return;
        }

        if let Some(location) = self.location {
            builder.jpeg_gps_location(location);
        }
        builder
            .jpeg_orientation(jpeg_orientation(
                context.lens,
                context.sensor_orientation,
                context.display_rotation,
            ))
            .jpeg_quality(self.quality);
    }
}
