use super::{
    CalibrationSolver, GridShape, MonoSolution, PatternDetection, RectificationInput,
    StereoCalibrationFlags, StereoCalibrationInput, StereoRectification, StereoSolution,
};
use crate::error::{CalibrationError, Result};
use crate::frame::{PixelBuffer, PixelFormat};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// First-byte value that makes [`ScriptedSolver`] report a visible pattern
pub const PATTERN_MARKER: u8 = 0xFF;

/// Deterministic solver for synthetic pipelines and tests.
///
/// Detection succeeds when the first byte of the grayscale image equals
/// [`PATTERN_MARKER`]. Solutions are closed-form functions of the image size
/// and the sample count, so results are reproducible without real optics.
#[derive(Debug)]
pub struct ScriptedSolver {
    baseline: f64,
    detections: AtomicUsize,
    mono_solves: AtomicUsize,
    stereo_solves: AtomicUsize,
    rectifications: AtomicUsize,
}

impl ScriptedSolver {
    pub fn new() -> Self {
        Self::with_baseline(3.3)
    }

    /// Solver whose stereo rig has the right camera `baseline` units to the left
    pub fn with_baseline(baseline: f64) -> Self {
        Self {
            baseline,
            detections: AtomicUsize::new(0),
            mono_solves: AtomicUsize::new(0),
            stereo_solves: AtomicUsize::new(0),
            rectifications: AtomicUsize::new(0),
        }
    }

    /// Grayscale test image in which the pattern is `visible` or not
    pub fn image(width: u32, height: u32, visible: bool) -> PixelBuffer {
        let mut data = vec![0x40u8; width as usize * height as usize];
        if let Some(first) = data.first_mut() {
            *first = if visible { PATTERN_MARKER } else { 0 };
        }
        PixelBuffer::from_raw(width, height, PixelFormat::Gray8, data)
    }

    pub fn detection_count(&self) -> usize {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn mono_solve_count(&self) -> usize {
        self.mono_solves.load(Ordering::Relaxed)
    }

    pub fn stereo_solve_count(&self) -> usize {
        self.stereo_solves.load(Ordering::Relaxed)
    }

    pub fn rectification_count(&self) -> usize {
        self.rectifications.load(Ordering::Relaxed)
    }

    fn check_correspondences(
        operation: &str,
        object_points: &[Vec<Point3<f64>>],
        views: &[&[Vec<Point2<f64>>]],
    ) -> Result<()> {
        if object_points.is_empty() {
            return Err(CalibrationError::solver(operation, "no samples"));
        }
        for points in views {
            if points.len() != object_points.len() {
                return Err(CalibrationError::solver(
                    operation,
                    format!(
                        "{} image point sets for {} object point sets",
                        points.len(),
                        object_points.len()
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ScriptedSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn skew(t: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
}

impl CalibrationSolver for ScriptedSolver {
    fn detect_pattern(&self, gray: &PixelBuffer, grid_shape: GridShape) -> Result<PatternDetection> {
        self.detections.fetch_add(1, Ordering::Relaxed);

        if gray.data().first() != Some(&PATTERN_MARKER) {
            return Ok(PatternDetection::missed());
        }

        let corners = grid_shape
            .object_points()
            .iter()
            .map(|p| Point2::new(20.0 + 10.0 * p.x, 15.0 + 10.0 * p.y))
            .collect();
        trace!("Scripted detection of {} corners", grid_shape.corner_count());

        Ok(PatternDetection {
            found: true,
            corners,
        })
    }

    fn solve_mono(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: (u32, u32),
    ) -> Result<MonoSolution> {
        Self::check_correspondences("solve_mono", object_points, &[image_points])?;
        self.mono_solves.fetch_add(1, Ordering::Relaxed);

        let (width, height) = image_size;
        let focal = width as f64;
        let matrix = Matrix3::new(
            focal,
            0.0,
            width as f64 / 2.0,
            0.0,
            focal,
            height as f64 / 2.0,
            0.0,
            0.0,
            1.0,
        );
        let k1 = -1e-3 * object_points.len() as f64;

        Ok(MonoSolution {
            matrix,
            distortion: [k1, 0.0, 0.0, 0.0, 0.0],
        })
    }

    fn solve_stereo(
        &self,
        input: &StereoCalibrationInput<'_>,
        flags: &StereoCalibrationFlags,
    ) -> Result<StereoSolution> {
        Self::check_correspondences(
            "solve_stereo",
            input.object_points,
            &[input.left_points, input.right_points],
        )?;
        self.stereo_solves.fetch_add(1, Ordering::Relaxed);

        let mut right_matrix = *input.right_matrix;
        if flags.same_focal_length {
            right_matrix[(0, 0)] = input.left_matrix[(0, 0)];
            right_matrix[(1, 1)] = input.left_matrix[(1, 1)];
        }
        let zero_tangent = |d: &[f64; 5]| {
            let mut d = *d;
            if flags.zero_tangent_distortion {
                d[2] = 0.0;
                d[3] = 0.0;
            }
            d
        };

        let r = Matrix3::identity();
        let t = Vector3::new(-self.baseline, 0.0, 0.0);
        let e = skew(&t) * r;
        let left_inv = input
            .left_matrix
            .try_inverse()
            .ok_or_else(|| CalibrationError::solver("solve_stereo", "singular left matrix"))?;
        let right_inv = right_matrix
            .try_inverse()
            .ok_or_else(|| CalibrationError::solver("solve_stereo", "singular right matrix"))?;
        let f = right_inv.transpose() * e * left_inv;

        Ok(StereoSolution {
            left_matrix: *input.left_matrix,
            left_distortion: zero_tangent(input.left_distortion),
            right_matrix,
            right_distortion: zero_tangent(input.right_distortion),
            r,
            t,
            e,
            f,
        })
    }

    fn stereo_rectify(&self, input: &RectificationInput<'_>) -> Result<StereoRectification> {
        self.rectifications.fetch_add(1, Ordering::Relaxed);

        let k = input.left_matrix;
        let (focal, cx, cy) = (k[(1, 1)], k[(0, 2)], k[(1, 2)]);
        let tx = input.t.x;
        if tx == 0.0 {
            return Err(CalibrationError::solver("stereo_rectify", "zero baseline"));
        }

        let p_left = Matrix3x4::new(
            focal, 0.0, cx, 0.0, //
            0.0, focal, cy, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        );
        let mut p_right = p_left;
        p_right[(0, 3)] = focal * tx;

        let q = Matrix4::new(
            1.0, 0.0, 0.0, -cx, //
            0.0, 1.0, 0.0, -cy, //
            0.0, 0.0, 0.0, focal, //
            0.0, 0.0, -1.0 / tx, 0.0,
        );

        Ok(StereoRectification {
            r_left: *input.r,
            r_right: Matrix3::identity(),
            p_left,
            p_right,
            q,
        })
    }
}
