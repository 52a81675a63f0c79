pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod processor;
pub mod solver;
pub mod source;

pub use calibration::{CalibratedCamera, CalibratedStereoCamera, CalibrationState, CameraPair};
pub use camera::{load_camera, save_camera, CameraFileFormat, CameraModel, PinholeCamera, StereoCamera};
pub use config::{CalibrationConfig, CamcalConfig, ProcessorOptions, StereoConfig};
pub use error::{CalibrationError, Result};
pub use frame::{Features, Frame, Image, PixelBuffer, PixelFormat, StageId};
pub use processor::{ImageProcessor, Processor, StageContext};
pub use solver::{CalibrationSolver, GridShape, RemapSolver, ScriptedSolver, UndistortMap};
pub use source::{find_source, find_source_mut, with_source, Capability, FrameSequence, VideoSource};

#[cfg(feature = "files")]
pub use source::ImageFiles;
