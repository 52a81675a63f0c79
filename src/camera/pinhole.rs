use super::rows::{ensure_finite, from_rows, to_rows, Rows};
use crate::error::{CalibrationError, Result};
use nalgebra::{Matrix3, Matrix3x4, SMatrix};
use serde::{Deserialize, Serialize};

/// Calibrated pinhole camera: intrinsics, lens distortion and the optional
/// rectification produced by a stereo calibration.
///
/// Immutable once built; every constructor validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PinholeCameraRecord", into = "PinholeCameraRecord")]
pub struct PinholeCamera {
    size: (u32, u32),
    matrix: Matrix3<f64>,
    distortion: [f64; 5],
    rectify: Option<Matrix3<f64>>,
    projection: Option<Matrix3x4<f64>>,
}

impl PinholeCamera {
    /// Build a camera from typed parts.
    ///
    /// # Arguments
    /// * `size` - (width, height) of the images the camera produces
    /// * `matrix` - 3x3 intrinsic matrix
    /// * `distortion` - (k1, k2, p1, p2, k3)
    /// * `rectify` - rectification rotation, stereo only
    /// * `projection` - 3x4 projection in the rectified frame, stereo only
    pub fn new(
        size: (u32, u32),
        matrix: Matrix3<f64>,
        distortion: [f64; 5],
        rectify: Option<Matrix3<f64>>,
        projection: Option<Matrix3x4<f64>>,
    ) -> Result<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(CalibrationError::validation(format!(
                "camera size must be positive, got {}x{}",
                size.0, size.1
            )));
        }
        ensure_finite(&matrix, "matrix")?;
        ensure_finite(&SMatrix::<f64, 1, 5>::from_row_slice(&distortion), "distortion")?;
        if let Some(rectify) = &rectify {
            ensure_finite(rectify, "rectify")?;
        }
        if let Some(projection) = &projection {
            ensure_finite(projection, "projection")?;
        }

        Ok(Self {
            size,
            matrix,
            distortion,
            rectify,
            projection,
        })
    }

    /// Build a camera from focal lengths and principal point.
    ///
    /// Slices are length-checked: `frame_size`, `focal_point` and `center`
    /// need two values, `distortion` needs five.
    pub fn from_parameters(
        frame_size: &[u32],
        focal_point: &[f64],
        center: &[f64],
        distortion: &[f64],
        rectify: Option<Matrix3<f64>>,
        projection: Option<Matrix3x4<f64>>,
    ) -> Result<Self> {
        let distortion: [f64; 5] = distortion
            .try_into()
            .map_err(|_| CalibrationError::validation("distortion must be vector of length 5"))?;
        let size = pair(frame_size, "frame size")?;
        let (fx, fy) = pair(focal_point, "focal point")?;
        let (cx, cy) = pair(center, "center")?;

        let matrix = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        Self::new(size, matrix, distortion, rectify, projection)
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.0
    }

    pub fn height(&self) -> u32 {
        self.size.1
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// (k1, k2, p1, p2, k3)
    pub fn distortion(&self) -> &[f64; 5] {
        &self.distortion
    }

    pub fn rectify(&self) -> Option<&Matrix3<f64>> {
        self.rectify.as_ref()
    }

    pub fn projection(&self) -> Option<&Matrix3x4<f64>> {
        self.projection.as_ref()
    }

    /// (fx, fy)
    pub fn focal_point(&self) -> (f64, f64) {
        (self.matrix[(0, 0)], self.matrix[(1, 1)])
    }

    /// (cx, cy)
    pub fn center(&self) -> (f64, f64) {
        (self.matrix[(0, 2)], self.matrix[(1, 2)])
    }
}

fn pair<T: Copy>(values: &[T], field: &str) -> Result<(T, T)> {
    match values {
        [a, b] => Ok((*a, *b)),
        _ => Err(CalibrationError::validation(format!(
            "{} must be vector of length 2",
            field
        ))),
    }
}

/// On-disk form: plain numbers and nested lists only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinholeCameraRecord {
    size: Vec<u32>,
    matrix: Rows,
    distortion: DistortionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rectify: Option<Rows>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    projection: Option<Rows>,
}

/// Distortion is written as one row of five; a flat list is accepted too
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DistortionRecord {
    Nested(Rows),
    Flat(Vec<f64>),
}

impl DistortionRecord {
    fn coefficients(&self) -> Vec<f64> {
        match self {
            DistortionRecord::Nested(rows) => rows.concat(),
            DistortionRecord::Flat(values) => values.clone(),
        }
    }
}

impl TryFrom<PinholeCameraRecord> for PinholeCamera {
    type Error = CalibrationError;

    fn try_from(record: PinholeCameraRecord) -> Result<Self> {
        let size = pair(&record.size, "size")?;
        let matrix = from_rows::<3, 3>(&record.matrix, "matrix")?;
        let distortion: [f64; 5] = record
            .distortion
            .coefficients()
            .try_into()
            .map_err(|_| CalibrationError::validation("distortion must be vector of length 5"))?;
        let rectify = record
            .rectify
            .as_deref()
            .map(|rows| from_rows::<3, 3>(rows, "rectify"))
            .transpose()?;
        let projection = record
            .projection
            .as_deref()
            .map(|rows| from_rows::<3, 4>(rows, "projection"))
            .transpose()?;

        Self::new(size, matrix, distortion, rectify, projection)
    }
}

impl From<PinholeCamera> for PinholeCameraRecord {
    fn from(camera: PinholeCamera) -> Self {
        Self {
            size: vec![camera.size.0, camera.size.1],
            matrix: to_rows(&camera.matrix),
            distortion: DistortionRecord::Nested(vec![camera.distortion.to_vec()]),
            rectify: camera.rectify.as_ref().map(to_rows),
            projection: camera.projection.as_ref().map(to_rows),
        }
    }
}
