//! Calibration stages: mono accumulation and undistortion, the stereo pair
//! adapter, and joint stereo calibration.

mod mono;
mod pair;
mod stereo;

pub use mono::CalibratedCamera;
pub use pair::CameraPair;
pub use stereo::CalibratedStereoCamera;

/// Progress of a calibrating stage. Moves from `Accumulating` to `Solved`
/// once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// Collecting detections
    Accumulating,
    /// Camera solved; further calls return it unchanged
    Solved,
}
