use super::mono::CalibratedCamera;
use super::pair::CameraPair;
use super::CalibrationState;
use crate::camera::{CameraModel, StereoCamera};
use crate::config::{ProcessorOptions, StereoConfig};
use crate::error::{CalibrationError, Result};
use crate::frame::Image;
use crate::processor::{ImageProcessor, Processor, StageContext};
use crate::solver::{
    CalibrationSolver, GridShape, PatternDetection, RectificationInput, StereoCalibrationFlags,
    StereoCalibrationInput,
};
use crate::source::{find_source_mut, Capability, VideoSource};
use nalgebra::{Point2, Point3};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct StereoSamples {
    object_points: Vec<Vec<Point3<f64>>>,
    left_points: Vec<Vec<Point2<f64>>>,
    right_points: Vec<Vec<Point2<f64>>>,
    max_samples: usize,
    image_size: Option<(u32, u32)>,
    camera: Option<Arc<StereoCamera>>,
}

impl StereoSamples {
    fn count(&self) -> usize {
        self.object_points.len()
    }

    fn is_full(&self) -> bool {
        self.count() >= self.max_samples
    }
}

#[derive(Debug)]
enum StereoMode {
    Calibrating(StereoSamples),
    Applied(Arc<StereoCamera>),
}

/// Stereo calibration stage over a [`CameraPair`] of two mono stages.
///
/// Both sides must contain a [`CalibratedCamera`]. Calibrating rigs collect
/// only frames where both sides saw the pattern; applied rigs pass frames
/// through, since each side's mono stage already rectifies its images.
pub struct CalibratedStereoCamera {
    solver: Arc<dyn CalibrationSolver>,
    grid_shape: GridShape,
    flags: StereoCalibrationFlags,
    mode: StereoMode,
}

fn mono_stage_mut<'a>(
    side: &'a mut dyn VideoSource,
    label: &str,
) -> Result<&'a mut Processor<CalibratedCamera>> {
    find_source_mut(side, CalibratedCamera::TAG)
        .and_then(|stage| stage.as_any_mut().downcast_mut::<Processor<CalibratedCamera>>())
        .ok_or_else(|| {
            CalibrationError::configuration(format!("{} side must have a CalibratedCamera", label))
        })
}

fn detected(image: &Image) -> Option<&PatternDetection> {
    image.corners().filter(|detection| detection.found)
}

impl CalibratedStereoCamera {
    pub const TAG: &'static str = "CalibratedStereoCamera";

    /// Calibrating rig when `camera` is `None`, applied rig otherwise
    pub fn new<L, R>(
        left: L,
        right: R,
        camera: Option<Arc<StereoCamera>>,
        solver: Arc<dyn CalibrationSolver>,
        config: &StereoConfig,
        options: ProcessorOptions,
    ) -> Result<Processor<Self>>
    where
        L: VideoSource + 'static,
        R: VideoSource + 'static,
    {
        match camera {
            Some(camera) => Self::applied(left, right, camera, solver, options),
            None => Self::calibrating(left, right, solver, config, options),
        }
    }

    /// Both sides must be calibrating; their grid shape is replaced by the rig's
    pub fn calibrating<L, R>(
        left: L,
        right: R,
        solver: Arc<dyn CalibrationSolver>,
        config: &StereoConfig,
        options: ProcessorOptions,
    ) -> Result<Processor<Self>>
    where
        L: VideoSource + 'static,
        R: VideoSource + 'static,
    {
        if config.grid_shape.is_empty() {
            return Err(CalibrationError::configuration(
                "grid shape must have non-zero columns and rows",
            ));
        }
        if config.max_samples == 0 {
            return Err(CalibrationError::configuration("max_samples must be greater than 0"));
        }

        let mut left: Box<dyn VideoSource> = Box::new(left);
        let mut right: Box<dyn VideoSource> = Box::new(right);

        let left_mono = mono_stage_mut(left.as_mut(), "left")?.inner().is_calibrating();
        let right_mono = mono_stage_mut(right.as_mut(), "right")?.inner().is_calibrating();
        if !left_mono || !right_mono {
            return Err(CalibrationError::configuration(
                "left and right cameras must be set to calibrate mode",
            ));
        }
        for (side, label) in [(left.as_mut(), "left"), (right.as_mut(), "right")] {
            mono_stage_mut(side, label)?
                .inner_mut()
                .set_grid_shape(config.grid_shape);
        }

        let stage = Self {
            solver,
            grid_shape: config.grid_shape,
            flags: config.flags,
            mode: StereoMode::Calibrating(StereoSamples {
                max_samples: config.max_samples,
                ..StereoSamples::default()
            }),
        };
        Ok(Processor::new(stage, CameraPair::from_boxed(left, right), options))
    }

    /// Both sides must be applying exactly the cameras stored in `camera`
    pub fn applied<L, R>(
        left: L,
        right: R,
        camera: Arc<StereoCamera>,
        solver: Arc<dyn CalibrationSolver>,
        options: ProcessorOptions,
    ) -> Result<Processor<Self>>
    where
        L: VideoSource + 'static,
        R: VideoSource + 'static,
    {
        let mut left: Box<dyn VideoSource> = Box::new(left);
        let mut right: Box<dyn VideoSource> = Box::new(right);

        for (side, label, expected) in [
            (left.as_mut(), "left", camera.left()),
            (right.as_mut(), "right", camera.right()),
        ] {
            let mono = mono_stage_mut(side, label)?.inner();
            if mono.is_calibrating() {
                return Err(CalibrationError::configuration(
                    "left and right cameras must not be set to calibrate mode",
                ));
            }
            if mono.pinhole().as_deref() != Some(expected) {
                return Err(CalibrationError::configuration(format!(
                    "{} CalibratedCamera camera must equal the stereo camera's {} camera",
                    label, label
                )));
            }
        }

        let stage = Self {
            solver,
            grid_shape: StereoConfig::default().grid_shape,
            flags: StereoCalibrationFlags::default(),
            mode: StereoMode::Applied(camera),
        };
        Ok(Processor::new(stage, CameraPair::from_boxed(left, right), options))
    }

    pub fn grid_shape(&self) -> GridShape {
        self.grid_shape
    }

    pub fn flags(&self) -> &StereoCalibrationFlags {
        &self.flags
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self.mode, StereoMode::Calibrating(_))
    }

    /// `None` for applied rigs
    pub fn state(&self) -> Option<CalibrationState> {
        match &self.mode {
            StereoMode::Calibrating(samples) if samples.camera.is_some() => {
                Some(CalibrationState::Solved)
            }
            StereoMode::Calibrating(_) => Some(CalibrationState::Accumulating),
            StereoMode::Applied(_) => None,
        }
    }

    /// Accepted left+right detections so far
    pub fn sample_count(&self) -> usize {
        match &self.mode {
            StereoMode::Calibrating(samples) => samples.count(),
            StereoMode::Applied(_) => 0,
        }
    }

    pub fn max_samples(&self) -> usize {
        match &self.mode {
            StereoMode::Calibrating(samples) => samples.max_samples,
            StereoMode::Applied(_) => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == Some(CalibrationState::Solved)
    }

    /// Camera applied by this rig, or the one it solved
    pub fn stereo_camera(&self) -> Option<Arc<StereoCamera>> {
        match &self.mode {
            StereoMode::Calibrating(samples) => samples.camera.clone(),
            StereoMode::Applied(camera) => Some(Arc::clone(camera)),
        }
    }

    fn samples_mut(&mut self) -> Result<&mut StereoSamples> {
        match &mut self.mode {
            StereoMode::Calibrating(samples) => Ok(samples),
            StereoMode::Applied(_) => Err(CalibrationError::state(
                "calibrate requires a calibrating stereo stage",
            )),
        }
    }

    /// Accept the pair only when both sides detected the pattern
    fn record(&mut self, left: &Image, right: &Image) -> Result<()> {
        let object_points = self.grid_shape.object_points();
        let samples = self.samples_mut()?;

        match (detected(left), detected(right)) {
            (Some(l), Some(r)) => {
                if !samples.is_full() {
                    samples.object_points.push(object_points);
                    samples.left_points.push(l.corners.clone());
                    samples.right_points.push(r.corners.clone());
                    samples.image_size = Some(left.pixels().size());
                }
                debug!(
                    "Accepted stereo sample {}/{}",
                    samples.count(),
                    samples.max_samples
                );
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("Discarding partial stereo sample: pattern seen by one camera only")
            }
            (None, None) => debug!("No calibration pattern in stereo frame"),
        }
        Ok(())
    }

    /// Solve both mono cameras, the stereo extrinsics and the rectification
    fn finish_calibration(
        &mut self,
        pair: &mut CameraPair,
        image_size: (u32, u32),
    ) -> Result<Arc<StereoCamera>> {
        let StereoMode::Calibrating(samples) = &mut self.mode else {
            return Err(CalibrationError::state(
                "calibrate requires a calibrating stereo stage",
            ));
        };

        let left = mono_stage_mut(pair.left_mut(), "left")?.inner().finish_calibration(
            &samples.object_points,
            &samples.left_points,
            image_size,
        )?;
        let right = mono_stage_mut(pair.right_mut(), "right")?.inner().finish_calibration(
            &samples.object_points,
            &samples.right_points,
            image_size,
        )?;

        let solution = self.solver.solve_stereo(
            &StereoCalibrationInput {
                object_points: &samples.object_points,
                left_points: &samples.left_points,
                right_points: &samples.right_points,
                left_matrix: left.matrix(),
                left_distortion: left.distortion(),
                right_matrix: right.matrix(),
                right_distortion: right.distortion(),
                image_size,
            },
            &self.flags,
        )?;

        let rectification = self.solver.stereo_rectify(&RectificationInput {
            left_matrix: &solution.left_matrix,
            left_distortion: &solution.left_distortion,
            right_matrix: &solution.right_matrix,
            right_distortion: &solution.right_distortion,
            image_size,
            r: &solution.r,
            t: &solution.t,
            zero_disparity: true,
        })?;

        let camera = Arc::new(StereoCamera::from_parameters(
            image_size,
            solution.left_matrix,
            solution.left_distortion,
            rectification.r_left,
            rectification.p_left,
            solution.right_matrix,
            solution.right_distortion,
            rectification.r_right,
            rectification.p_right,
            solution.r,
            solution.t,
            solution.e,
            solution.f,
            rectification.q,
        )?);
        samples.camera = Some(Arc::clone(&camera));

        info!(
            "Stereo rig calibrated from {} samples, baseline {:.4}",
            samples.count(),
            camera.translation().norm()
        );
        Ok(camera)
    }
}

impl ImageProcessor for CalibratedStereoCamera {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn description(&self) -> String {
        "Stereo Camera rectify processor".to_string()
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Camera]
    }

    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image> {
        if self.is_calibrating() && (ctx.options.debug || ctx.options.display_results) {
            debug!(
                "Stereo image from {}: pattern found {}",
                image.source(),
                detected(&image).is_some()
            );
        }
        Ok(image)
    }

    fn camera(&self) -> Option<CameraModel> {
        self.stereo_camera().map(CameraModel::Stereo)
    }
}

impl Processor<CalibratedStereoCamera> {
    /// Capture one stereo frame and fold it into the samples.
    ///
    /// Returns the rig once `max_samples` joint detections are collected and
    /// `None` before that.
    pub fn calibrate(&mut self) -> Result<Option<Arc<StereoCamera>>> {
        let samples = self.inner_mut().samples_mut()?;
        if let Some(camera) = samples.camera.clone() {
            return Ok(Some(camera));
        }

        // A full rig whose solve failed retries from its samples
        if !samples.is_full() {
            let frame = self
                .capture()?
                .ok_or_else(|| CalibrationError::integrity(self.name(), "no frame to calibrate from"))?;
            let [left, right] = frame.images() else {
                return Err(CalibrationError::integrity(
                    self.name(),
                    format!(
                        "stereo frame must carry 2 images, got {}",
                        frame.images().len()
                    ),
                ));
            };

            self.inner_mut().record(left, right)?;
            if !self.inner_mut().samples_mut()?.is_full() {
                return Ok(None);
            }
        }

        let image_size = self
            .inner_mut()
            .samples_mut()?
            .image_size
            .ok_or_else(|| CalibrationError::state("no stereo samples collected"))?;
        let (stage, upstream) = self.parts_mut();
        let pair = upstream
            .as_any_mut()
            .downcast_mut::<CameraPair>()
            .ok_or_else(|| {
                CalibrationError::integrity(CalibratedStereoCamera::TAG, "upstream is not a camera pair")
            })?;

        stage.finish_calibration(pair, image_size).map(Some)
    }

    pub fn sample_count(&self) -> usize {
        self.inner().sample_count()
    }

    pub fn is_complete(&self) -> bool {
        self.inner().is_complete()
    }
}
