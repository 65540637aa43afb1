use super::{PreferenceContext, RequestPreference};
use crate::request::{AfMode, CaptureRequestBuilder, ControlMode};
use crate::types::CameraMode;

/// Automatic 3A control with a focus mode suited to each stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultPreference;

impl RequestPreference for DefaultPreference {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        mode: CameraMode,
        _context: &PreferenceContext,
    ) {
        builder.control_mode(ControlMode::Auto);
        match mode {
            CameraMode::Preview => {
                builder.af_mode(AfMode::ContinuousPicture);
            }
            CameraMode::Record | CameraMode::RecordSnapshot => {
                builder.af_mode(AfMode::ContinuousVideo);
            }
            CameraMode::Capture | CameraMode::ZeroShutterLag => {
                builder.af_mode(AfMode::Auto);
            }
        }
    }
}
