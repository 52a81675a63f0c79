use super::CalibrationState;
use crate::camera::{CameraModel, PinholeCamera};
use crate::config::CalibrationConfig;
use crate::error::{CalibrationError, Result};
use crate::frame::{Features, Image};
use crate::processor::{ImageProcessor, Processor, StageContext};
use crate::solver::{CalibrationSolver, GridShape, UndistortMap};
use crate::source::{Capability, VideoSource};
use nalgebra::{Point2, Point3};
use std::sync::Arc;
use tracing::{debug, info};

/// Correspondences collected while calibrating
#[derive(Debug, Default)]
struct Samples {
    object_points: Vec<Vec<Point3<f64>>>,
    image_points: Vec<Vec<Point2<f64>>>,
    max_samples: usize,
    image_size: Option<(u32, u32)>,
    camera: Option<Arc<PinholeCamera>>,
}

impl Samples {
    fn count(&self) -> usize {
        self.image_points.len()
    }

    fn is_full(&self) -> bool {
        self.count() >= self.max_samples
    }
}

#[derive(Debug)]
enum Mode {
    Calibrating(Samples),
    Applied {
        camera: Arc<PinholeCamera>,
        map: Option<UndistortMap>,
    },
}

/// Single-camera calibration stage.
///
/// Built either calibrating (no camera yet: detect the pattern on every
/// frame and solve once enough detections are collected) or applied
/// (undistort every frame with a known camera). The mode never changes.
pub struct CalibratedCamera {
    solver: Arc<dyn CalibrationSolver>,
    grid_shape: GridShape,
    mode: Mode,
}

impl CalibratedCamera {
    pub const TAG: &'static str = "CalibratedCamera";

    /// Calibrating stage when `camera` is `None`, applied stage otherwise
    pub fn new(
        camera: Option<Arc<PinholeCamera>>,
        solver: Arc<dyn CalibrationSolver>,
        config: &CalibrationConfig,
    ) -> Result<Self> {
        match camera {
            Some(camera) => Ok(Self::applied(camera, solver)),
            None => Self::calibrating(solver, config),
        }
    }

    pub fn calibrating(solver: Arc<dyn CalibrationSolver>, config: &CalibrationConfig) -> Result<Self> {
        if config.grid_shape.is_empty() {
            return Err(CalibrationError::configuration(
                "grid shape must have non-zero columns and rows",
            ));
        }
        if config.max_samples == 0 {
            return Err(CalibrationError::configuration("max_samples must be greater than 0"));
        }

        Ok(Self {
            solver,
            grid_shape: config.grid_shape,
            mode: Mode::Calibrating(Samples {
                max_samples: config.max_samples,
                ..Samples::default()
            }),
        })
    }

    pub fn applied(camera: Arc<PinholeCamera>, solver: Arc<dyn CalibrationSolver>) -> Self {
        Self {
            solver,
            grid_shape: CalibrationConfig::default().grid_shape,
            mode: Mode::Applied { camera, map: None },
        }
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self.mode, Mode::Calibrating(_))
    }

    pub fn grid_shape(&self) -> GridShape {
        self.grid_shape
    }

    /// Change the pattern searched for; used by stereo stages to force one board
    pub fn set_grid_shape(&mut self, grid_shape: GridShape) {
        self.grid_shape = grid_shape;
    }

    /// `None` for applied stages
    pub fn state(&self) -> Option<CalibrationState> {
        match &self.mode {
            Mode::Calibrating(samples) if samples.camera.is_some() => Some(CalibrationState::Solved),
            Mode::Calibrating(_) => Some(CalibrationState::Accumulating),
            Mode::Applied { .. } => None,
        }
    }

    /// Accepted detections so far
    pub fn sample_count(&self) -> usize {
        match &self.mode {
            Mode::Calibrating(samples) => samples.count(),
            Mode::Applied { .. } => 0,
        }
    }

    pub fn max_samples(&self) -> usize {
        match &self.mode {
            Mode::Calibrating(samples) => samples.max_samples,
            Mode::Applied { .. } => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == Some(CalibrationState::Solved)
    }

    /// Camera applied by this stage, or the one it solved
    pub fn pinhole(&self) -> Option<Arc<PinholeCamera>> {
        match &self.mode {
            Mode::Calibrating(samples) => samples.camera.clone(),
            Mode::Applied { camera, .. } => Some(Arc::clone(camera)),
        }
    }

    /// Solve intrinsics for the given correspondences
    pub fn finish_calibration(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: (u32, u32),
    ) -> Result<PinholeCamera> {
        solve(self.solver.as_ref(), object_points, image_points, image_size)
    }

    /// Fold one processed image into the accumulated samples
    fn record(&mut self, image: &Image) -> Result<()> {
        let Mode::Calibrating(samples) = &mut self.mode else {
            return Err(CalibrationError::state("calibrate requires a calibrating stage"));
        };

        match image.corners() {
            Some(detection) if detection.found && !samples.is_full() => {
                samples.object_points.push(self.grid_shape.object_points());
                samples.image_points.push(detection.corners.clone());
                samples.image_size = Some(image.pixels().size());
                debug!(
                    "Accepted calibration sample {}/{}",
                    samples.count(),
                    samples.max_samples
                );
            }
            _ => debug!("No calibration pattern in frame"),
        }
        Ok(())
    }

    /// Solve from the stored samples and keep the camera
    fn solve_samples(&mut self) -> Result<Arc<PinholeCamera>> {
        let Mode::Calibrating(samples) = &mut self.mode else {
            return Err(CalibrationError::state("calibrate requires a calibrating stage"));
        };
        let image_size = samples
            .image_size
            .ok_or_else(|| CalibrationError::state("no calibration samples collected"))?;

        let camera = Arc::new(solve(
            self.solver.as_ref(),
            &samples.object_points,
            &samples.image_points,
            image_size,
        )?);
        samples.camera = Some(Arc::clone(&camera));
        info!(
            "Camera calibrated from {} samples: focal {:?}, center {:?}",
            samples.count(),
            camera.focal_point(),
            camera.center()
        );
        Ok(camera)
    }
}

fn solve(
    solver: &dyn CalibrationSolver,
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Vec<Point2<f64>>],
    image_size: (u32, u32),
) -> Result<PinholeCamera> {
    let solution = solver.solve_mono(object_points, image_points, image_size)?;
    PinholeCamera::new(image_size, solution.matrix, solution.distortion, None, None)
}

impl ImageProcessor for CalibratedCamera {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn description(&self) -> String {
        "Pinhole camera undistort processor".to_string()
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Camera]
    }

    fn setup(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        if let Mode::Applied { camera, map } = &mut self.mode {
            *map = Some(self.solver.build_undistort_map(camera, camera.size())?);
            debug!("Built undistort map for {}x{} camera", camera.width(), camera.height());
        }
        Ok(())
    }

    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image> {
        match &self.mode {
            Mode::Calibrating(_) => {
                let gray = image.pixels().to_grayscale();
                let detection = self.solver.detect_pattern(&gray, self.grid_shape)?;
                if ctx.options.debug || ctx.options.display_results {
                    debug!(
                        "Pattern {} found: {} ({} corners)",
                        self.grid_shape.corner_count(),
                        detection.found,
                        detection.corners.len()
                    );
                }
                Ok(Image::new(ctx.id, gray).with_features(Features::Corners(detection)))
            }
            Mode::Applied { map, .. } => {
                let map = map
                    .as_ref()
                    .ok_or_else(|| CalibrationError::integrity(Self::TAG, "undistort map missing"))?;
                let pixels = self.solver.apply_map(image.pixels(), map)?;
                Ok(image.with_source(ctx.id).with_pixels(pixels))
            }
        }
    }

    fn camera(&self) -> Option<CameraModel> {
        self.pinhole().map(CameraModel::Pinhole)
    }
}

impl Processor<CalibratedCamera> {
    /// Capture one frame and fold its detection into the samples.
    ///
    /// Returns the camera once `max_samples` detections are collected and
    /// `None` before that.
    pub fn calibrate(&mut self) -> Result<Option<Arc<PinholeCamera>>> {
        let is_full = match &self.inner().mode {
            Mode::Applied { .. } => {
                return Err(CalibrationError::state("calibrate requires a calibrating stage"))
            }
            Mode::Calibrating(samples) => {
                if let Some(camera) = &samples.camera {
                    return Ok(Some(Arc::clone(camera)));
                }
                samples.is_full()
            }
        };

        // A full stage whose solve failed retries from its samples
        if !is_full {
            let frame = self
                .capture()?
                .ok_or_else(|| CalibrationError::integrity(self.name(), "no frame to calibrate from"))?;
            let image = frame
                .images()
                .first()
                .ok_or_else(|| CalibrationError::integrity(self.name(), "frame carries no images"))?;

            self.inner_mut().record(image)?;
            if self.inner().max_samples() > self.inner().sample_count() {
                return Ok(None);
            }
        }

        self.inner_mut().solve_samples().map(Some)
    }

    pub fn sample_count(&self) -> usize {
        self.inner().sample_count()
    }

    pub fn is_complete(&self) -> bool {
        self.inner().is_complete()
    }
}
