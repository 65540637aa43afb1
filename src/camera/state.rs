use crate::platform::PlatformSession;
use crate::surface::SurfaceProvider;
use crate::types::{
    AspectRatio, CameraMode, OutputRole, Resolution, Rotation, SurfaceFormat, SurfaceHandle,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Observable lifecycle of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Closed,
    Opening,
    Opened,
    SessionStarting,
    SessionActive,
    PreviewActive,
    Capturing,
    RecordActive,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Closed => "closed",
            LifecycleState::Opening => "opening",
            LifecycleState::Opened => "opened",
            LifecycleState::SessionStarting => "session_starting",
            LifecycleState::SessionActive => "session_active",
            LifecycleState::PreviewActive => "preview_active",
            LifecycleState::Capturing => "capturing",
            LifecycleState::RecordActive => "record_active",
        };
        write!(f, "{}", name)
    }
}

/// Inputs of a session start, kept so the session can be rebuilt
#[derive(Clone)]
pub struct SessionRequest {
    pub surfaces: Vec<Arc<dyn SurfaceProvider>>,
    pub display_rotation: Rotation,
    pub display_resolution: Resolution,
    pub aspect_ratio: AspectRatio,
}

/// Outcome of negotiation for one surface
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSurface {
    pub name: String,
    pub format: SurfaceFormat,
    pub role: Option<OutputRole>,
    pub candidates: Vec<Resolution>,
    pub handle: Option<SurfaceHandle>,
}

/// A configured platform session plus its routing tables
pub(crate) struct ActiveSession {
    pub id: Uuid,
    /// Stable across live surface swaps; identifies the start_session call
    pub epoch: u64,
    pub platform: Arc<dyn PlatformSession>,
    pub request: SessionRequest,
    pub outputs: Vec<ResolvedSurface>,
    pub surfaces_by_mode: HashMap<CameraMode, Vec<SurfaceHandle>>,
    pub repeating: Option<CameraMode>,
    pub listeners: CancellationToken,
}

impl ActiveSession {
    pub fn surfaces(&self, mode: CameraMode) -> Vec<SurfaceHandle> {
        self.surfaces_by_mode.get(&mode).cloned().unwrap_or_default()
    }

    /// Distinct union of every materialised surface
    pub fn union(&self) -> Vec<SurfaceHandle> {
        distinct_handles(&self.outputs)
    }

    /// Providers taking part in `mode`, watchers included
    pub fn providers_for(&self, mode: CameraMode) -> Vec<Arc<dyn SurfaceProvider>> {
        self.request
            .surfaces
            .iter()
            .filter(|provider| provider.supported_modes().contains(mode))
            .cloned()
            .collect()
    }

    /// Rebuild the mode routing table after a handle changed
    pub fn reroute(&mut self) {
        self.surfaces_by_mode = group_by_mode(&self.request.surfaces, &self.outputs);
    }
}

pub(crate) fn distinct_handles(outputs: &[ResolvedSurface]) -> Vec<SurfaceHandle> {
    let mut union: Vec<SurfaceHandle> = Vec::new();
    for handle in outputs.iter().filter_map(|output| output.handle) {
        if !union.contains(&handle) {
            union.push(handle);
        }
    }
    union
}

pub(crate) fn group_by_mode(
    providers: &[Arc<dyn SurfaceProvider>],
    outputs: &[ResolvedSurface],
) -> HashMap<CameraMode, Vec<SurfaceHandle>> {
    let mut by_mode: HashMap<CameraMode, Vec<SurfaceHandle>> = HashMap::new();
    for (provider, output) in providers.iter().zip(outputs) {
        let Some(handle) = output.handle else {
            continue;
        };
        for mode in provider.supported_modes().iter() {
            let handles = by_mode.entry(mode).or_default();
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
    }
    by_mode
}
