use super::pinhole::PinholeCamera;
use super::rows::{ensure_finite, from_rows, to_rows, Rows};
use crate::error::{CalibrationError, Result};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Two calibrated cameras and the geometry between them.
///
/// Both cameras must share one image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StereoCameraRecord", into = "StereoCameraRecord")]
pub struct StereoCamera {
    left: PinholeCamera,
    right: PinholeCamera,
    r: Matrix3<f64>,
    t: Vector3<f64>,
    e: Matrix3<f64>,
    f: Matrix3<f64>,
    q: Matrix4<f64>,
}

impl StereoCamera {
    /// # Arguments
    /// * `r` - rotation from left to right camera
    /// * `t` - translation from left to right camera
    /// * `e` - essential matrix
    /// * `f` - fundamental matrix
    /// * `q` - disparity-to-depth matrix
    pub fn new(
        left: PinholeCamera,
        right: PinholeCamera,
        r: Matrix3<f64>,
        t: Vector3<f64>,
        e: Matrix3<f64>,
        f: Matrix3<f64>,
        q: Matrix4<f64>,
    ) -> Result<Self> {
        if left.size() != right.size() {
            return Err(CalibrationError::configuration(format!(
                "left and right camera width/height must match ({:?} vs {:?})",
                left.size(),
                right.size()
            )));
        }
        ensure_finite(&r, "R")?;
        ensure_finite(&t, "T")?;
        ensure_finite(&e, "E")?;
        ensure_finite(&f, "F")?;
        ensure_finite(&q, "Q")?;

        Ok(Self {
            left,
            right,
            r,
            t,
            e,
            f,
            q,
        })
    }

    /// Build both cameras and the rig from raw stereo calibration output
    #[allow(clippy::too_many_arguments)]
    pub fn from_parameters(
        size: (u32, u32),
        m1: Matrix3<f64>,
        d1: [f64; 5],
        r1: Matrix3<f64>,
        p1: Matrix3x4<f64>,
        m2: Matrix3<f64>,
        d2: [f64; 5],
        r2: Matrix3<f64>,
        p2: Matrix3x4<f64>,
        r: Matrix3<f64>,
        t: Vector3<f64>,
        e: Matrix3<f64>,
        f: Matrix3<f64>,
        q: Matrix4<f64>,
    ) -> Result<Self> {
        Self::new(
            PinholeCamera::new(size, m1, d1, Some(r1), Some(p1))?,
            PinholeCamera::new(size, m2, d2, Some(r2), Some(p2))?,
            r,
            t,
            e,
            f,
            q,
        )
    }

    pub fn left(&self) -> &PinholeCamera {
        &self.left
    }

    pub fn right(&self) -> &PinholeCamera {
        &self.right
    }

    /// Shared (width, height)
    pub fn size(&self) -> (u32, u32) {
        self.left.size()
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.r
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.t
    }

    pub fn essential(&self) -> &Matrix3<f64> {
        &self.e
    }

    pub fn fundamental(&self) -> &Matrix3<f64> {
        &self.f
    }

    pub fn disparity_to_depth(&self) -> &Matrix4<f64> {
        &self.q
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoCameraRecord {
    left: PinholeCamera,
    right: PinholeCamera,
    #[serde(rename = "R")]
    r: Rows,
    #[serde(rename = "T")]
    t: Rows,
    #[serde(rename = "E")]
    e: Rows,
    #[serde(rename = "F")]
    f: Rows,
    #[serde(rename = "Q")]
    q: Rows,
}

impl TryFrom<StereoCameraRecord> for StereoCamera {
    type Error = CalibrationError;

    fn try_from(record: StereoCameraRecord) -> Result<Self> {
        Self::new(
            record.left,
            record.right,
            from_rows(&record.r, "R")?,
            from_rows(&record.t, "T")?,
            from_rows(&record.e, "E")?,
            from_rows(&record.f, "F")?,
            from_rows(&record.q, "Q")?,
        )
    }
}

impl From<StereoCamera> for StereoCameraRecord {
    fn from(camera: StereoCamera) -> Self {
        Self {
            r: to_rows(&camera.r),
            t: to_rows(&camera.t),
            e: to_rows(&camera.e),
            f: to_rows(&camera.f),
            q: to_rows(&camera.q),
            left: camera.left,
            right: camera.right,
        }
    }
}
