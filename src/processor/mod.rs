//! Processor stages: wrap one upstream source, transform each captured image
//! and expose the same [`VideoSource`] surface so stages stack.

mod delegation;
#[cfg(test)]
mod tests;

pub use delegation::{DelegationTable, Route};

use crate::camera::CameraModel;
pub use crate::config::ProcessorOptions;
use crate::error::{CalibrationError, Result};
use crate::frame::{Frame, Image, StageId};
use crate::source::{Capability, DeviceInfo, VideoSource};
use std::any::Any;
use tracing::{debug, info, trace};

/// Per-call view of the stage a processor runs in
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Identity to stamp on images this stage transforms
    pub id: StageId,
    pub options: &'a ProcessorOptions,
}

/// Image transformation hosted by a [`Processor`].
///
/// Capability methods are only consulted for the capabilities listed by
/// [`ImageProcessor::capabilities`]; every other capability call goes to the
/// upstream stage.
pub trait ImageProcessor: 'static {
    /// Type tag, also the first segment of the stage name
    fn tag(&self) -> &str;

    fn description(&self) -> String;

    /// Capabilities answered by this processor instead of upstream
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn setup(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {}

    /// Transform one image
    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image>;

    fn camera(&self) -> Option<CameraModel> {
        None
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        None
    }

    fn fps(&self) -> Option<f64> {
        None
    }

    fn frame_count(&self) -> Option<u64> {
        None
    }

    fn path(&self) -> Option<String> {
        None
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }
}

/// A pipeline stage: one [`ImageProcessor`] over one upstream source
pub struct Processor<P: ImageProcessor> {
    id: StageId,
    inner: P,
    upstream: Box<dyn VideoSource>,
    options: ProcessorOptions,
    routes: DelegationTable,
    is_setup: bool,
}

impl<P: ImageProcessor> Processor<P> {
    pub fn new<S: VideoSource + 'static>(inner: P, upstream: S, options: ProcessorOptions) -> Self {
        Self::from_boxed(inner, Box::new(upstream), options)
    }

    pub fn from_boxed(inner: P, upstream: Box<dyn VideoSource>, options: ProcessorOptions) -> Self {
        let routes = DelegationTable::new(inner.capabilities());
        Self {
            id: StageId::new(),
            inner,
            upstream,
            options,
            routes,
            is_setup: false,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    /// The hosted processor and the upstream stage, borrowed together
    pub fn parts_mut(&mut self) -> (&mut P, &mut dyn VideoSource) {
        (&mut self.inner, self.upstream.as_mut())
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    pub fn route(&self, capability: Capability) -> Route {
        self.routes.route(capability)
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            id: self.id,
            options: &self.options,
        }
    }

    fn integrity(&self, details: &str) -> CalibrationError {
        CalibrationError::integrity(self.name(), details)
    }
}

impl<P: ImageProcessor> VideoSource for Processor<P> {
    fn id(&self) -> StageId {
        self.id
    }

    fn name(&self) -> String {
        format!("{} ← {}", self.inner.tag(), self.upstream.name())
    }

    fn tag(&self) -> &str {
        self.inner.tag()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn setup(&mut self) -> Result<()> {
        self.upstream.setup()?;
        let ctx = StageContext {
            id: self.id,
            options: &self.options,
        };
        self.inner.setup(&ctx)?;
        self.is_setup = true;
        info!("Stage {} set up", self.name());
        Ok(())
    }

    fn release(&mut self) {
        self.inner.release();
        self.upstream.release();
        if self.is_setup {
            info!("Stage {} released", self.name());
        }
        self.is_setup = false;
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        if !self.is_setup {
            return Err(self.integrity("capture called before setup"));
        }

        let frame = self
            .upstream
            .capture()?
            .ok_or_else(|| self.integrity("upstream produced no frame"))?;
        if frame.images().is_empty() {
            return Err(self.integrity("upstream frame carries no images"));
        }
        trace!("{} processing frame {}", self.inner.tag(), frame.index());

        if !self.options.enabled {
            return Ok(Some(frame));
        }

        let ctx = self.context();
        let frame = frame.try_map_images(|image| self.inner.process(image, &ctx))?;
        if self.options.debug {
            debug!(
                "{} produced {} images for frame {}",
                self.inner.tag(),
                frame.images().len(),
                frame.index()
            );
        }
        Ok(Some(frame))
    }

    fn is_open(&self) -> bool {
        self.upstream.is_open()
    }

    fn path(&self) -> Option<String> {
        match self.routes.route(Capability::Path) {
            Route::Local => self.inner.path(),
            Route::Upstream => self.upstream.path(),
        }
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        match self.routes.route(Capability::FrameSize) {
            Route::Local => self.inner.frame_size(),
            Route::Upstream => self.upstream.frame_size(),
        }
    }

    fn fps(&self) -> Option<f64> {
        match self.routes.route(Capability::Fps) {
            Route::Local => self.inner.fps(),
            Route::Upstream => self.upstream.fps(),
        }
    }

    fn frame_count(&self) -> Option<u64> {
        match self.routes.route(Capability::FrameCount) {
            Route::Local => self.inner.frame_count(),
            Route::Upstream => self.upstream.frame_count(),
        }
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        match self.routes.route(Capability::Devices) {
            Route::Local => self.inner.devices(),
            Route::Upstream => self.upstream.devices(),
        }
    }

    fn camera(&self) -> Option<CameraModel> {
        match self.routes.route(Capability::Camera) {
            Route::Local => self.inner.camera(),
            Route::Upstream => self.upstream.camera(),
        }
    }

    fn upstream(&self) -> Option<&dyn VideoSource> {
        Some(self.upstream.as_ref())
    }

    fn upstream_mut(&mut self) -> Option<&mut dyn VideoSource> {
        Some(self.upstream.as_mut())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
