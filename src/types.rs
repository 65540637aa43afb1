use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Platform-reported capability tier of a camera device.
///
/// Ordering follows capability: `Legacy < Limited < Full < Level3 < External`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportLevel {
    Legacy,
    Limited,
    Full,
    Level3,
    External,
}

impl fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupportLevel::Legacy => "legacy",
            SupportLevel::Limited => "limited",
            SupportLevel::Full => "full",
            SupportLevel::Level3 => "level3",
            SupportLevel::External => "external",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SupportLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(SupportLevel::Legacy),
            "limited" => Ok(SupportLevel::Limited),
            "full" => Ok(SupportLevel::Full),
            "level3" | "level_3" => Ok(SupportLevel::Level3),
            "external" => Ok(SupportLevel::External),
            other => Err(format!("Unknown support level: {}", other)),
        }
    }
}

/// Pixel formats of image-class surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Yuv,
}

impl ImageFormat {
    /// Platform pixel-format code
    pub fn code(&self) -> i32 {
        match self {
            ImageFormat::Jpeg => 0x100,
            ImageFormat::Yuv => 0x23,
        }
    }
}

/// Target classes of private (implementation-defined) surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivTarget {
    Texture,
    Recorder,
    Reader,
    Writer,
}

/// Format declared by a surface provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    Image(ImageFormat),
    Priv(PrivTarget),
    /// Watcher surface with no stream of its own
    None,
}

impl SurfaceFormat {
    /// Comparable key used by the classifier; `None` for watcher surfaces.
    pub fn key(&self) -> Option<FormatKey> {
        match self {
            SurfaceFormat::Image(ImageFormat::Jpeg) => Some(FormatKey::Jpeg),
            SurfaceFormat::Image(ImageFormat::Yuv) => Some(FormatKey::Yuv),
            SurfaceFormat::Priv(_) => Some(FormatKey::Priv),
            SurfaceFormat::None => None,
        }
    }

    pub fn has_stream(&self) -> bool {
        !matches!(self, SurfaceFormat::None)
    }
}

impl fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceFormat::Image(ImageFormat::Jpeg) => write!(f, "jpeg"),
            SurfaceFormat::Image(ImageFormat::Yuv) => write!(f, "yuv"),
            SurfaceFormat::Priv(target) => write!(f, "priv({:?})", target),
            SurfaceFormat::None => write!(f, "none"),
        }
    }
}

/// Collapsed format used for compatibility-table matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKey {
    Jpeg,
    Yuv,
    Priv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CameraMode {
    Preview,
    Capture,
    Record,
    RecordSnapshot,
    ZeroShutterLag,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraMode::Preview => "preview",
            CameraMode::Capture => "capture",
            CameraMode::Record => "record",
            CameraMode::RecordSnapshot => "record_snapshot",
            CameraMode::ZeroShutterLag => "zero_shutter_lag",
        };
        write!(f, "{}", name)
    }
}

/// Set of operating modes a surface participates in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeSet(BTreeSet<CameraMode>);

impl ModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(modes: &[CameraMode]) -> Self {
        Self(modes.iter().copied().collect())
    }

    pub fn insert(&mut self, mode: CameraMode) {
        self.0.insert(mode);
    }

    pub fn contains(&self, mode: CameraMode) -> bool {
        self.0.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CameraMode> + '_ {
        self.0.iter().copied()
    }
}

/// Resolution-and-sharing policy assigned to a surface by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRole {
    Maximum,
    Preview,
    Record,
}

impl fmt::Display for OutputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputRole::Maximum => "maximum",
            OutputRole::Preview => "preview",
            OutputRole::Record => "record",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn fits_within(&self, bound: Resolution) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Ratio16x9,
    #[serde(rename = "4:3")]
    Ratio4x3,
    #[serde(rename = "2:1")]
    Ratio2x1,
    #[serde(rename = "1:1")]
    Ratio1x1,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Ratio16x9,
        AspectRatio::Ratio4x3,
        AspectRatio::Ratio2x1,
        AspectRatio::Ratio1x1,
    ];

    /// Ratio as (width, height) terms
    pub fn terms(&self) -> (u32, u32) {
        match self {
            AspectRatio::Ratio16x9 => (16, 9),
            AspectRatio::Ratio4x3 => (4, 3),
            AspectRatio::Ratio2x1 => (2, 1),
            AspectRatio::Ratio1x1 => (1, 1),
        }
    }

    /// Exact ratio match, compared in integers to avoid float drift
    pub fn matches(&self, resolution: Resolution) -> bool {
        let (w, h) = self.terms();
        resolution.width as u64 * h as u64 == resolution.height as u64 * w as u64
    }

    pub fn of(resolution: Resolution) -> Option<AspectRatio> {
        Self::ALL.iter().copied().find(|ratio| ratio.matches(resolution))
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.terms();
        write!(f, "{}:{}", w, h)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16:9" => Ok(AspectRatio::Ratio16x9),
            "4:3" => Ok(AspectRatio::Ratio4x3),
            "2:1" => Ok(AspectRatio::Ratio2x1),
            "1:1" => Ok(AspectRatio::Ratio1x1),
            other => Err(format!("Unsupported aspect ratio: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Only exact right angles are accepted
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lens {
    Front,
    Back,
    External,
}

impl Lens {
    /// Next lens in the front/back toggle used by lens switching
    pub fn toggled(&self) -> Lens {
        match self {
            Lens::Front => Lens::Back,
            Lens::Back | Lens::External => Lens::Front,
        }
    }
}

impl fmt::Display for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lens::Front => "front",
            Lens::Back => "back",
            Lens::External => "external",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Lens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "front" => Ok(Lens::Front),
            "back" => Ok(Lens::Back),
            "external" => Ok(Lens::External),
            other => Err(format!("Unknown lens: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// Per-session input handed to every surface provider's acquisition call.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub resolutions: Vec<Resolution>,
    pub aspect_ratio: AspectRatio,
    pub display_rotation: Rotation,
    pub sensor_rotation: Rotation,
    pub lens: Lens,
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque platform surface materialised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    pub id: u64,
    pub resolution: Resolution,
}

impl SurfaceHandle {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            resolution,
        }
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}({})", self.id, self.resolution)
    }
}
