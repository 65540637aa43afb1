mod platform;
mod surface;

pub use platform::{PlatformCall, SimulatedCamera, SimulatedPlatform};
pub use surface::{StaticSurface, SurfaceEvent};
