use super::VideoSource;
use crate::error::{CalibrationError, Result};
use crate::frame::{Frame, Image, PixelBuffer, StageId};
use std::any::Any;
use std::collections::VecDeque;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Source that replays a fixed list of pixel buffers, one per frame
#[derive(Debug)]
pub struct FrameSequence {
    id: StageId,
    name: String,
    pending: VecDeque<PixelBuffer>,
    size: Option<(u32, u32)>,
    total: u64,
    next_index: u64,
    fps: Option<f64>,
    is_setup: bool,
}

impl FrameSequence {
    pub fn new<S: Into<String>>(name: S, buffers: Vec<PixelBuffer>) -> Self {
        Self {
            id: StageId::new(),
            name: name.into(),
            size: buffers.first().map(PixelBuffer::size),
            total: buffers.len() as u64,
            pending: buffers.into(),
            next_index: 0,
            fps: None,
            is_setup: false,
        }
    }

    /// Report a nominal frame rate
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Frames not yet captured
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl VideoSource for FrameSequence {
    fn id(&self) -> StageId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn tag(&self) -> &str {
        "FrameSequence"
    }

    fn description(&self) -> String {
        "In-memory frame sequence".to_string()
    }

    fn setup(&mut self) -> Result<()> {
        debug!("Frame sequence {} ready with {} frames", self.name, self.pending.len());
        self.is_setup = true;
        Ok(())
    }

    fn release(&mut self) {
        self.is_setup = false;
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        if !self.is_setup {
            return Err(CalibrationError::integrity(
                &self.name,
                "capture called before setup",
            ));
        }

        let Some(pixels) = self.pending.pop_front() else {
            return Ok(None);
        };

        let index = self.next_index;
        self.next_index += 1;
        trace!("{} captured frame {}", self.name, index);

        Ok(Some(Frame::new(
            SystemTime::now(),
            index,
            vec![Image::new(self.id, pixels)],
        )))
    }

    fn is_open(&self) -> bool {
        self.is_setup && !self.pending.is_empty()
    }

    fn path(&self) -> Option<String> {
        Some(format!("memory:{}", self.name))
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        self.size
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
