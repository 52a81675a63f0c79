use crate::error::Result;
use crate::frame::{Frame, StageId};
use crate::source::{DeviceInfo, VideoSource};
use std::any::Any;
use tracing::trace;

/// Two independent sources presented as one stereo source.
///
/// Each capture yields the left images followed by the right images, stamped
/// with the left frame's timestamp and index.
pub struct CameraPair {
    id: StageId,
    left: Box<dyn VideoSource>,
    right: Box<dyn VideoSource>,
}

impl CameraPair {
    pub const TAG: &'static str = "CameraPair";

    pub fn new<L, R>(left: L, right: R) -> Self
    where
        L: VideoSource + 'static,
        R: VideoSource + 'static,
    {
        Self::from_boxed(Box::new(left), Box::new(right))
    }

    pub fn from_boxed(left: Box<dyn VideoSource>, right: Box<dyn VideoSource>) -> Self {
        Self {
            id: StageId::new(),
            left,
            right,
        }
    }

    pub fn left(&self) -> &dyn VideoSource {
        self.left.as_ref()
    }

    pub fn right(&self) -> &dyn VideoSource {
        self.right.as_ref()
    }

    pub fn left_mut(&mut self) -> &mut dyn VideoSource {
        self.left.as_mut()
    }

    pub fn right_mut(&mut self) -> &mut dyn VideoSource {
        self.right.as_mut()
    }
}

impl VideoSource for CameraPair {
    fn id(&self) -> StageId {
        self.id
    }

    fn name(&self) -> String {
        format!("({} : {})", self.left.name(), self.right.name())
    }

    fn tag(&self) -> &str {
        Self::TAG
    }

    fn description(&self) -> String {
        "Stereo pair source".to_string()
    }

    fn setup(&mut self) -> Result<()> {
        self.left.setup()?;
        self.right.setup()
    }

    fn release(&mut self) {
        self.left.release();
        self.right.release();
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        let left = self.left.capture()?;
        let right = self.right.capture()?;

        let (Some(left), Some(right)) = (left, right) else {
            trace!("{} ran dry", self.name());
            return Ok(None);
        };

        let mut images = left.images().to_vec();
        images.extend(right.into_images());
        Ok(Some(left.with_images(images)))
    }

    fn is_open(&self) -> bool {
        self.left.is_open() && self.right.is_open()
    }

    fn path(&self) -> Option<String> {
        Some(format!(
            "{} : {}",
            self.left.path().unwrap_or_default(),
            self.right.path().unwrap_or_default()
        ))
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        self.left.frame_size()
    }

    fn fps(&self) -> Option<f64> {
        self.left.fps()
    }

    fn frame_count(&self) -> Option<u64> {
        self.left.frame_count()
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.left.devices()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
