use super::{PreferenceContext, RequestPreference};
use crate::request::{AeMode, CaptureRequestBuilder, FlashOutput};
use crate::types::CameraMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User-facing flash setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    Auto,
    On,
    #[default]
    Off,
    Torch,
}

impl fmt::Display for FlashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlashMode::Auto => "auto",
            FlashMode::On => "on",
            FlashMode::Off => "off",
            FlashMode::Torch => "torch",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(FlashMode::Auto),
            "on" => Ok(FlashMode::On),
            "off" => Ok(FlashMode::Off),
            "torch" => Ok(FlashMode::Torch),
            other => Err(format!("Unknown flash mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashPreference {
    pub mode: FlashMode,
}

impl FlashPreference {
    pub fn new(mode: FlashMode) -> Self {
        Self { mode }
    }
}

impl RequestPreference for FlashPreference {
    fn apply(
        &self,
        builder: &mut CaptureRequestBuilder,
        _mode: CameraMode,
        _context: &PreferenceContext,
    ) {
        let (ae_mode, flash) = match self.mode {
            FlashMode::Auto => (AeMode::OnAutoFlash, FlashOutput::Off),
            FlashMode::On => (AeMode::OnAlwaysFlash, FlashOutput::Off),
            FlashMode::Torch => (AeMode::On, FlashOutput::Torch),
            FlashMode::Off => (AeMode::On, FlashOutput::Off),
        };
        builder.ae_mode(ae_mode).flash(flash);
    }
}
