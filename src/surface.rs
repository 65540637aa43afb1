use crate::error::CameraResult;
use crate::types::{AspectRatio, CameraMode, ModeSet, Resolution, SurfaceConfig, SurfaceFormat, SurfaceHandle};
use async_trait::async_trait;
use tokio::sync::watch;

/// A logical output (preview texture, JPEG saver, frame processor, encoder)
/// that materialises a platform surface on request.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    fn format(&self) -> SurfaceFormat;

    fn supported_modes(&self) -> ModeSet;

    /// Materialise a platform surface for this session.
    ///
    /// Never called for watcher surfaces (format `SurfaceFormat::None`).
    async fn acquire_surface(&self, config: SurfaceConfig) -> CameraResult<SurfaceHandle>;

    async fn on_start(&self, _mode: CameraMode) {}

    async fn on_stop(&self, _mode: CameraMode) {}

    /// Teardown; called once when the owning camera is released
    async fn release(&self) {}

    /// Replacement surfaces published after acquisition, e.g. when the
    /// provider's output size changes. `None` for static providers.
    fn surface_updates(&self) -> Option<watch::Receiver<SurfaceHandle>> {
        None
    }
}

/// Largest candidate whose aspect ratio matches `aspect_ratio` exactly
pub fn choose_optimal_resolution(
    candidates: &[Resolution],
    aspect_ratio: AspectRatio,
) -> Option<Resolution> {
    candidates
        .iter()
        .copied()
        .filter(|resolution| aspect_ratio.matches(*resolution))
        .max_by_key(|resolution| resolution.area())
}

pub fn largest_resolution(candidates: &[Resolution]) -> Option<Resolution> {
    candidates.iter().copied().max_by_key(|resolution| resolution.area())
}

/// Aspect ratios for which at least one candidate exists
pub fn available_aspect_ratios(candidates: &[Resolution]) -> Vec<AspectRatio> {
    AspectRatio::ALL
        .iter()
        .copied()
        .filter(|ratio| candidates.iter().any(|resolution| ratio.matches(*resolution)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_resolution_prefers_largest_matching_ratio() {
        let candidates = [
            Resolution::new(640, 480),
            Resolution::new(1920, 1080),
            Resolution::new(4032, 3024),
        ];

        assert_eq!(
            choose_optimal_resolution(&candidates, AspectRatio::Ratio4x3),
            Some(Resolution::new(4032, 3024))
        );
        assert_eq!(
            choose_optimal_resolution(&candidates, AspectRatio::Ratio16x9),
            Some(Resolution::new(1920, 1080))
        );
        assert_eq!(
            choose_optimal_resolution(&candidates, AspectRatio::Ratio1x1),
            None
        );
    }

    #[test]
    fn test_available_aspect_ratios() {
        let candidates = [Resolution::new(640, 480), Resolution::new(1280, 720)];
        assert_eq!(
            available_aspect_ratios(&candidates),
            vec![AspectRatio::Ratio16x9, AspectRatio::Ratio4x3]
        );
    }

    #[test]
    fn test_largest_resolution() {
        assert_eq!(largest_resolution(&[]), None);
        assert_eq!(
            largest_resolution(&[Resolution::new(10, 10), Resolution::new(20, 5)]),
            Some(Resolution::new(10, 10))
        );
    }
}
