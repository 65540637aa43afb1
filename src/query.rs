use crate::error::{CameraError, CameraResult};
use crate::types::{Lens, Rect, Resolution, Rotation, SupportLevel, SurfaceFormat};

/// Read-only oracle describing the cameras present on the device
pub trait CapabilityQuery: Send + Sync {
    fn camera_ids(&self) -> Vec<String>;

    fn lens_facing(&self, camera_id: &str) -> CameraResult<Lens>;

    fn support_level(&self, camera_id: &str) -> CameraResult<SupportLevel>;

    /// Output sizes supported for a pixel format or output class
    fn output_resolutions(
        &self,
        camera_id: &str,
        format: SurfaceFormat,
    ) -> CameraResult<Vec<Resolution>>;

    /// Frame size of the high-quality camcorder profile
    fn record_profile_resolution(&self, camera_id: &str) -> CameraResult<Resolution>;

    fn sensor_orientation(&self, camera_id: &str) -> CameraResult<Rotation>;

    /// Active pixel array of the sensor
    fn active_array(&self, camera_id: &str) -> CameraResult<Rect>;

    fn supports_autofocus(&self, camera_id: &str) -> bool;

    fn supports_auto_exposure(&self, camera_id: &str) -> bool;

    fn has_flash(&self, camera_id: &str) -> bool;

    fn max_digital_zoom(&self, camera_id: &str) -> f32;
}

/// First camera whose lens faces the requested direction
pub fn find_camera_by_lens(query: &dyn CapabilityQuery, lens: Lens) -> CameraResult<String> {
    query
        .camera_ids()
        .into_iter()
        .find(|id| matches!(query.lens_facing(id), Ok(facing) if facing == lens))
        .ok_or_else(|| CameraError::CameraNotAvailable {
            camera_id: format!("<{} lens>", lens),
        })
}

/// Geometry captured when a device is opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorInfo {
    pub lens: Lens,
    pub orientation: Rotation,
    pub active_array: Rect,
    pub max_digital_zoom: f32,
    pub has_flash: bool,
}

impl SensorInfo {
    pub fn read(query: &dyn CapabilityQuery, camera_id: &str) -> CameraResult<Self> {
        Ok(Self {
            lens: query.lens_facing(camera_id)?,
            orientation: query.sensor_orientation(camera_id)?,
            active_array: query.active_array(camera_id)?,
            max_digital_zoom: query.max_digital_zoom(camera_id),
            has_flash: query.has_flash(camera_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{SimulatedCamera, SimulatedPlatform};

    #[test]
    fn test_find_camera_by_lens() {
        let platform = SimulatedPlatform::new()
            .with_camera(SimulatedCamera::new("0", Lens::Back))
            .with_camera(SimulatedCamera::new("1", Lens::Front));

        assert_eq!(find_camera_by_lens(&platform, Lens::Front).unwrap(), "1");
        assert_eq!(find_camera_by_lens(&platform, Lens::Back).unwrap(), "0");
    }

    #[test]
    fn test_missing_lens_is_not_available() {
        let platform = SimulatedPlatform::new().with_camera(SimulatedCamera::new("0", Lens::Back));

        let err = find_camera_by_lens(&platform, Lens::External).unwrap_err();
        assert!(matches!(err, CameraError::CameraNotAvailable { .. }));
    }

    #[test]
    fn test_sensor_info_reads_geometry() {
        let platform = SimulatedPlatform::new().with_camera(
            SimulatedCamera::new("0", Lens::Back)
                .with_active_array(Rect::new(0, 0, 4000, 3000))
                .with_max_zoom(8.0),
        );

        let info = SensorInfo::read(&platform, "0").unwrap();
        assert_eq!(info.active_array.width(), 4000);
        assert_eq!(info.max_digital_zoom, 8.0);
        assert_eq!(info.lens, Lens::Back);
    }
}
