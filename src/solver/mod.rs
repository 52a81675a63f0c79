//! Geometric calibration solver seam.
//!
//! Pattern detection, intrinsic/extrinsic optimisation and stereo
//! rectification are delegated to a [`CalibrationSolver`]. The undistortion
//! map has a native default so applied-mode stages work with any solver.

mod remap;
mod scripted;

pub use remap::UndistortMap;
pub use scripted::{ScriptedSolver, PATTERN_MARKER};

use crate::camera::PinholeCamera;
use crate::error::{CalibrationError, Result};
use crate::frame::PixelBuffer;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Inner-corner count of a calibration chessboard, (columns, rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn corner_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.corner_count() == 0
    }

    /// Planar board coordinates `(x, y, 0)`, x varying fastest
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|y| (0..self.columns).map(move |x| Point3::new(x as f64, y as f64, 0.0)))
            .collect()
    }
}

impl From<(u32, u32)> for GridShape {
    fn from((columns, rows): (u32, u32)) -> Self {
        Self { columns, rows }
    }
}

impl From<GridShape> for (u32, u32) {
    fn from(shape: GridShape) -> Self {
        (shape.columns, shape.rows)
    }
}

/// Result of one pattern search. A miss is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDetection {
    pub found: bool,
    /// Sub-pixel corner positions, row by row; empty when nothing was found
    pub corners: Vec<Point2<f64>>,
}

impl PatternDetection {
    pub fn missed() -> Self {
        Self {
            found: false,
            corners: Vec::new(),
        }
    }
}

/// Intrinsics estimated for one camera
#[derive(Debug, Clone, PartialEq)]
pub struct MonoSolution {
    pub matrix: Matrix3<f64>,
    pub distortion: [f64; 5],
}

/// Iteration limits passed to iterative solver calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminationCriteria {
    pub max_iterations: u32,
    pub epsilon: f64,
}

impl Default for TerminationCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 1e-5,
        }
    }
}

/// Which parameters the joint stereo refinement may change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCalibrationFlags {
    /// Keep both intrinsic matrices and distortions as given
    pub fix_intrinsic: bool,
    /// Use the given intrinsics as the starting point
    pub use_intrinsic_guess: bool,
    pub fix_principal_point: bool,
    pub fix_focal_length: bool,
    /// Keep fx/fy ratio fixed
    pub fix_aspect_ratio: bool,
    /// Force p1 = p2 = 0
    pub zero_tangent_distortion: bool,
    /// Enforce equal focal lengths for left and right
    pub same_focal_length: bool,
    pub rational_model: bool,
    pub fix_k3: bool,
    pub fix_k4: bool,
    pub fix_k5: bool,
    pub criteria: TerminationCriteria,
}

impl Default for StereoCalibrationFlags {
    fn default() -> Self {
        Self {
            fix_intrinsic: false,
            use_intrinsic_guess: false,
            fix_principal_point: false,
            fix_focal_length: false,
            fix_aspect_ratio: true,
            zero_tangent_distortion: true,
            same_focal_length: true,
            rational_model: false,
            fix_k3: false,
            fix_k4: false,
            fix_k5: false,
            criteria: TerminationCriteria::default(),
        }
    }
}

/// Correspondences and initial intrinsics for joint stereo refinement
#[derive(Debug, Clone, Copy)]
pub struct StereoCalibrationInput<'a> {
    pub object_points: &'a [Vec<Point3<f64>>],
    pub left_points: &'a [Vec<Point2<f64>>],
    pub right_points: &'a [Vec<Point2<f64>>],
    pub left_matrix: &'a Matrix3<f64>,
    pub left_distortion: &'a [f64; 5],
    pub right_matrix: &'a Matrix3<f64>,
    pub right_distortion: &'a [f64; 5],
    pub image_size: (u32, u32),
}

/// Refined intrinsics plus the rigid transform between the two cameras
#[derive(Debug, Clone, PartialEq)]
pub struct StereoSolution {
    pub left_matrix: Matrix3<f64>,
    pub left_distortion: [f64; 5],
    pub right_matrix: Matrix3<f64>,
    pub right_distortion: [f64; 5],
    /// Rotation from left to right camera
    pub r: Matrix3<f64>,
    /// Translation from left to right camera
    pub t: Vector3<f64>,
    /// Essential matrix
    pub e: Matrix3<f64>,
    /// Fundamental matrix
    pub f: Matrix3<f64>,
}

/// Inputs to stereo rectification
#[derive(Debug, Clone, Copy)]
pub struct RectificationInput<'a> {
    pub left_matrix: &'a Matrix3<f64>,
    pub left_distortion: &'a [f64; 5],
    pub right_matrix: &'a Matrix3<f64>,
    pub right_distortion: &'a [f64; 5],
    pub image_size: (u32, u32),
    pub r: &'a Matrix3<f64>,
    pub t: &'a Vector3<f64>,
    /// Make the principal points of both rectified views coincide
    pub zero_disparity: bool,
}

/// Per-camera rectification rotations and projections plus the disparity map
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectification {
    pub r_left: Matrix3<f64>,
    pub r_right: Matrix3<f64>,
    pub p_left: Matrix3x4<f64>,
    pub p_right: Matrix3x4<f64>,
    /// Disparity-to-depth matrix
    pub q: Matrix4<f64>,
}

/// External geometric calibration collaborator
pub trait CalibrationSolver {
    /// Find the chessboard corners in a grayscale image
    fn detect_pattern(&self, gray: &PixelBuffer, grid_shape: GridShape) -> Result<PatternDetection>;

    /// Estimate intrinsics and distortion from planar correspondences
    fn solve_mono(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: (u32, u32),
    ) -> Result<MonoSolution>;

    /// Jointly refine the stereo extrinsics starting from both cameras' intrinsics
    fn solve_stereo(
        &self,
        input: &StereoCalibrationInput<'_>,
        flags: &StereoCalibrationFlags,
    ) -> Result<StereoSolution>;

    /// Compute rectification transforms for a solved stereo rig
    fn stereo_rectify(&self, input: &RectificationInput<'_>) -> Result<StereoRectification>;

    /// Precompute the per-pixel lookup that undistorts (and rectifies) images
    fn build_undistort_map(
        &self,
        camera: &PinholeCamera,
        image_size: (u32, u32),
    ) -> Result<UndistortMap> {
        UndistortMap::build(camera, image_size)
    }

    /// Resample `pixels` through a precomputed map
    fn apply_map(&self, pixels: &PixelBuffer, map: &UndistortMap) -> Result<PixelBuffer> {
        map.remap(pixels)
    }
}

/// Solver for pipelines that only apply existing calibrations
#[derive(Debug, Clone, Copy, Default)]
pub struct RemapSolver;

impl RemapSolver {
    fn unsupported(operation: &str) -> CalibrationError {
        CalibrationError::solver(operation, "remap-only solver cannot calibrate")
    }
}

impl CalibrationSolver for RemapSolver {
    fn detect_pattern(&self, _gray: &PixelBuffer, _grid_shape: GridShape) -> Result<PatternDetection> {
        Err(Self::unsupported("detect_pattern"))
    }

    fn solve_mono(
        &self,
        _object_points: &[Vec<Point3<f64>>],
        _image_points: &[Vec<Point2<f64>>],
        _image_size: (u32, u32),
    ) -> Result<MonoSolution> {
        Err(Self::unsupported("solve_mono"))
    }

    fn solve_stereo(
        &self,
        _input: &StereoCalibrationInput<'_>,
        _flags: &StereoCalibrationFlags,
    ) -> Result<StereoSolution> {
        Err(Self::unsupported("solve_stereo"))
    }

    fn stereo_rectify(&self, _input: &RectificationInput<'_>) -> Result<StereoRectification> {
        Err(Self::unsupported("stereo_rectify"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_object_points_order() {
        let shape = GridShape::new(3, 2);
        let points = shape.object_points();

        assert_eq!(points.len(), shape.corner_count());
        assert_eq!(points[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(points[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(points[3], Point3::new(0.0, 1.0, 0.0));
        assert_eq!(points[5], Point3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_grid_shape_serializes_as_pair() {
        let json = serde_json::to_string(&GridShape::new(9, 6)).unwrap();
        assert_eq!(json, "[9,6]");

        let shape: GridShape = serde_json::from_str("[7,6]").unwrap();
        assert_eq!(shape, GridShape::new(7, 6));
        assert!(GridShape::new(0, 6).is_empty());
    }

    #[test]
    fn test_default_stereo_flags() {
        let flags = StereoCalibrationFlags::default();
        assert!(flags.fix_aspect_ratio);
        assert!(flags.zero_tangent_distortion);
        assert!(flags.same_focal_length);
        assert!(!flags.fix_intrinsic);
        assert_eq!(flags.criteria.max_iterations, 100);
    }

    #[test]
    fn test_remap_solver_refuses_calibration() {
        let solver = RemapSolver;
        let gray = PixelBuffer::filled(4, 4, crate::frame::PixelFormat::Gray8, 0).unwrap();
        let result = solver.detect_pattern(&gray, GridShape::new(3, 3));
        assert!(matches!(result, Err(CalibrationError::Solver { .. })));
    }
}
