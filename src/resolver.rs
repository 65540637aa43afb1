use crate::error::{CameraError, CameraResult};
use crate::types::{OutputRole, Resolution, SurfaceFormat};

/// Hard cap applied to preview streams regardless of display size
pub const MAX_PREVIEW_RESOLUTION: Resolution = Resolution::new(1920, 1080);

/// Filter device-supported sizes for a surface according to its role.
///
/// Returns the candidate list the surface provider chooses from. An empty
/// candidate list is a configuration error.
pub fn resolve(
    role: OutputRole,
    format: SurfaceFormat,
    supported: &[Resolution],
    display: Resolution,
    record_profile: Resolution,
    max_preview: Resolution,
) -> CameraResult<Vec<Resolution>> {
    let candidates: Vec<Resolution> = match role {
        OutputRole::Maximum => supported.to_vec(),
        OutputRole::Record => supported
            .iter()
            .copied()
            .filter(|size| size.fits_within(record_profile))
            .collect(),
        OutputRole::Preview => {
            let bound = preview_bound(display, max_preview);
            supported
                .iter()
                .copied()
                .filter(|size| size.fits_within(bound))
                .collect()
        }
    };

    if candidates.is_empty() {
        return Err(CameraError::ResolutionUnavailable {
            format: format.to_string(),
            role: role.to_string(),
        });
    }

    Ok(candidates)
}

/// Component-wise minimum of the display size and the preview cap
pub fn preview_bound(display: Resolution, max_preview: Resolution) -> Resolution {
    Resolution::new(
        display.width.min(max_preview.width),
        display.height.min(max_preview.height),
    )
}
