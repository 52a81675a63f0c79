//! Frame producers and the capability surface shared by every pipeline stage.

#[cfg(feature = "files")]
mod files;
mod scope;
mod sequence;

#[cfg(feature = "files")]
pub use files::{save_pixels, ImageFiles};
pub use scope::{frames, with_source, ActiveSource, Frames};
pub use sequence::FrameSequence;

use crate::camera::CameraModel;
use crate::error::Result;
use crate::frame::{Frame, StageId};
use std::any::Any;

/// Capability calls a stage may answer itself or hand to its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Camera,
    FrameSize,
    Fps,
    FrameCount,
    Path,
    Devices,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Camera,
        Capability::FrameSize,
        Capability::Fps,
        Capability::FrameCount,
        Capability::Path,
        Capability::Devices,
    ];
}

/// Capture device reported by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub description: String,
    pub path: String,
}

/// Anything that can be set up, captured from and released.
///
/// Leaf sources and processor stages share this surface so chains compose to
/// any depth. Metadata methods default to "unknown".
pub trait VideoSource {
    /// Identity stamped on images this stage produces
    fn id(&self) -> StageId;

    /// Display name; processors prepend their tag to the upstream name
    fn name(&self) -> String;

    /// Type tag used by [`find_source`]
    fn tag(&self) -> &str;

    fn description(&self) -> String {
        self.name()
    }

    /// Acquire resources. Must run before the first capture.
    fn setup(&mut self) -> Result<()>;

    /// Release resources. Safe to call on a stage that was never set up.
    fn release(&mut self);

    /// Pull one frame; `None` when the source is exhausted
    fn capture(&mut self) -> Result<Option<Frame>>;

    fn is_open(&self) -> bool;

    fn path(&self) -> Option<String> {
        None
    }

    /// (width, height)
    fn frame_size(&self) -> Option<(u32, u32)> {
        None
    }

    fn fps(&self) -> Option<f64> {
        None
    }

    fn frame_count(&self) -> Option<u64> {
        None
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }

    /// Calibrated camera model, if some stage in the chain owns one
    fn camera(&self) -> Option<CameraModel> {
        None
    }

    /// The stage this one pulls from, if any
    fn upstream(&self) -> Option<&dyn VideoSource> {
        None
    }

    fn upstream_mut(&mut self) -> Option<&mut dyn VideoSource> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

fn matches_tag(stage: &dyn VideoSource, tag: &str) -> bool {
    stage.tag() == tag || stage.name() == tag
}

/// Walk from `stage` towards the root and return the first stage whose tag or
/// name equals `tag`
pub fn find_source<'a>(stage: &'a dyn VideoSource, tag: &str) -> Option<&'a dyn VideoSource> {
    let mut current = Some(stage);
    while let Some(candidate) = current {
        if matches_tag(candidate, tag) {
            return Some(candidate);
        }
        current = candidate.upstream();
    }
    None
}

/// Mutable variant of [`find_source`]
pub fn find_source_mut<'a>(
    stage: &'a mut dyn VideoSource,
    tag: &str,
) -> Option<&'a mut dyn VideoSource> {
    if matches_tag(stage, tag) {
        return Some(stage);
    }
    stage
        .upstream_mut()
        .and_then(|upstream| find_source_mut(upstream, tag))
}
