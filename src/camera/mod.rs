mod persist;
mod pinhole;
mod rows;
mod stereo;
#[cfg(test)]
mod tests;

pub use persist::{decode_camera, encode_camera, load_camera, save_camera, CameraFileFormat};
pub use pinhole::PinholeCamera;
pub use stereo::StereoCamera;

use std::sync::Arc;

/// Camera answered by the `camera` capability of a stage
#[derive(Debug, Clone, PartialEq)]
pub enum CameraModel {
    Pinhole(Arc<PinholeCamera>),
    Stereo(Arc<StereoCamera>),
}

impl CameraModel {
    pub fn kind(&self) -> &'static str {
        match self {
            CameraModel::Pinhole(_) => "pinhole",
            CameraModel::Stereo(_) => "stereo",
        }
    }

    /// (width, height) of the images the camera describes
    pub fn size(&self) -> (u32, u32) {
        match self {
            CameraModel::Pinhole(camera) => camera.size(),
            CameraModel::Stereo(camera) => camera.size(),
        }
    }

    pub fn as_pinhole(&self) -> Option<&Arc<PinholeCamera>> {
        match self {
            CameraModel::Pinhole(camera) => Some(camera),
            CameraModel::Stereo(_) => None,
        }
    }

    pub fn as_stereo(&self) -> Option<&Arc<StereoCamera>> {
        match self {
            CameraModel::Stereo(camera) => Some(camera),
            CameraModel::Pinhole(_) => None,
        }
    }
}

impl From<PinholeCamera> for CameraModel {
    fn from(camera: PinholeCamera) -> Self {
        CameraModel::Pinhole(Arc::new(camera))
    }
}

impl From<StereoCamera> for CameraModel {
    fn from(camera: StereoCamera) -> Self {
        CameraModel::Stereo(Arc::new(camera))
    }
}
