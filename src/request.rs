use crate::types::{CameraMode, Rect, SurfaceHandle};

/// Request templates understood by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

impl RequestTemplate {
    pub fn for_mode(mode: CameraMode) -> Self {
        match mode {
            CameraMode::Capture | CameraMode::ZeroShutterLag => RequestTemplate::StillCapture,
            CameraMode::Record | CameraMode::RecordSnapshot => RequestTemplate::Record,
            CameraMode::Preview => RequestTemplate::Preview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Off,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    Off,
    Auto,
    ContinuousPicture,
    ContinuousVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AePrecaptureTrigger {
    Idle,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeMode {
    Off,
    On,
    OnAutoFlash,
    OnAlwaysFlash,
}

/// Flash unit output requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOutput {
    Off,
    Single,
    Torch,
}

/// Autofocus state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

/// Auto-exposure state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp_ms: i64,
}

/// Immutable capture request handed to a platform session
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<SurfaceHandle>,
    pub control_mode: Option<ControlMode>,
    pub af_mode: Option<AfMode>,
    pub af_trigger: Option<AfTrigger>,
    pub ae_mode: Option<AeMode>,
    pub ae_precapture_trigger: Option<AePrecaptureTrigger>,
    pub flash: Option<FlashOutput>,
    pub jpeg_orientation: Option<u32>,
    pub jpeg_quality: Option<u8>,
    pub jpeg_gps_location: Option<GpsLocation>,
    pub crop_region: Option<Rect>,
    pub tag: Option<String>,
}

/// Mutable request under construction. Preferences decorate it before `build`.
#[derive(Debug, Clone)]
pub struct CaptureRequestBuilder {
    request: CaptureRequest,
}

impl CaptureRequestBuilder {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            request: CaptureRequest {
                template,
                targets: Vec::new(),
                control_mode: None,
                af_mode: None,
                af_trigger: None,
                ae_mode: None,
                ae_precapture_trigger: None,
                flash: None,
                jpeg_orientation: None,
                jpeg_quality: None,
                jpeg_gps_location: None,
                crop_region: None,
                tag: None,
            },
        }
    }

    pub fn template(&self) -> RequestTemplate {
        self.request.template
    }

    pub fn add_target(&mut self, surface: SurfaceHandle) -> &mut Self {
        if !self.request.targets.contains(&surface) {
            self.request.targets.push(surface);
        }
        self
    }

    pub fn add_targets<'a, I>(&mut self, surfaces: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a SurfaceHandle>,
    {
        for surface in surfaces {
            self.add_target(*surface);
        }
        self
    }

    pub fn control_mode(&mut self, mode: ControlMode) -> &mut Self {
        self.request.control_mode = Some(mode);
        self
    }

    pub fn af_mode(&mut self, mode: AfMode) -> &mut Self {
        self.request.af_mode = Some(mode);
        self
    }

    pub fn af_trigger(&mut self, trigger: AfTrigger) -> &mut Self {
        self.request.af_trigger = Some(trigger);
        self
    }

    pub fn ae_mode(&mut self, mode: AeMode) -> &mut Self {
        self.request.ae_mode = Some(mode);
        self
    }

    pub fn ae_precapture_trigger(&mut self, trigger: AePrecaptureTrigger) -> &mut Self {
        self.request.ae_precapture_trigger = Some(trigger);
        self
    }

    pub fn flash(&mut self, flash: FlashOutput) -> &mut Self {
        self.request.flash = Some(flash);
        self
    }

    pub fn jpeg_orientation(&mut self, degrees: u32) -> &mut Self {
        self.request.jpeg_orientation = Some(degrees);
        self
    }

    pub fn jpeg_quality(&mut self, quality: u8) -> &mut Self {
        self.request.jpeg_quality = Some(quality);
        self
    }

    pub fn jpeg_gps_location(&mut self, location: GpsLocation) -> &mut Self {
        self.request.jpeg_gps_location = Some(location);
        self
    }

    pub fn crop_region(&mut self, region: Rect) -> &mut Self {
        self.request.crop_region = Some(region);
        self
    }

    pub fn tag<S: Into<String>>(&mut self, tag: S) -> &mut Self {
        self.request.tag = Some(tag.into());
        self
    }

    /// Peek at the request as currently decorated
    pub fn current(&self) -> &CaptureRequest {
        &self.request
    }

    pub fn build(self) -> CaptureRequest {
        self.request
    }
}

/// Metadata delivered when a one-shot request completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureResult {
    pub frame_number: u64,
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
}

/// Reason a one-shot request did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    pub frame_number: u64,
    pub tag: Option<String>,
    pub was_image_captured: bool,
}
