use super::{CameraModel, PinholeCamera, StereoCamera};
use crate::error::{CalibrationError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File encodings understood by [`save_camera`] and [`load_camera`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFileFormat {
    Json,
    Toml,
}

impl CameraFileFormat {
    /// Pick the encoding from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(CalibrationError::UnsupportedFormat { extension }),
        }
    }
}

/// Either camera kind as it appears on disk. Stereo is tried first since a
/// stereo record is never a valid pinhole record.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredCamera {
    Stereo(StereoCamera),
    Pinhole(PinholeCamera),
}

impl From<&CameraModel> for StoredCamera {
    fn from(model: &CameraModel) -> Self {
        match model {
            CameraModel::Pinhole(camera) => StoredCamera::Pinhole(camera.as_ref().clone()),
            CameraModel::Stereo(camera) => StoredCamera::Stereo(camera.as_ref().clone()),
        }
    }
}

impl From<StoredCamera> for CameraModel {
    fn from(stored: StoredCamera) -> Self {
        match stored {
            StoredCamera::Pinhole(camera) => CameraModel::Pinhole(Arc::new(camera)),
            StoredCamera::Stereo(camera) => CameraModel::Stereo(Arc::new(camera)),
        }
    }
}

/// Render a camera in the given encoding
pub fn encode_camera(model: &CameraModel, format: CameraFileFormat) -> Result<String> {
    let stored = StoredCamera::from(model);
    let text = match format {
        CameraFileFormat::Json => serde_json::to_string_pretty(&stored)?,
        CameraFileFormat::Toml => toml::to_string_pretty(&stored)?,
    };
    Ok(text)
}

/// Parse a camera from text in the given encoding
pub fn decode_camera(text: &str, format: CameraFileFormat) -> Result<CameraModel> {
    let stored: StoredCamera = match format {
        CameraFileFormat::Json => serde_json::from_str(text)?,
        CameraFileFormat::Toml => toml::from_str(text)?,
    };
    Ok(stored.into())
}

/// Write a camera model to `path`, encoding chosen by extension
pub fn save_camera(model: &CameraModel, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = CameraFileFormat::from_path(path)?;
    let text = encode_camera(model, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;

    info!("Saved {} camera to {}", model.kind(), path.display());
    Ok(())
}

/// Read a camera model from `path`, re-validating every field
pub fn load_camera(path: impl AsRef<Path>) -> Result<CameraModel> {
    let path = path.as_ref();
    let format = CameraFileFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let model = decode_camera(&text, format)?;

    debug!("Loaded {} camera from {}", model.kind(), path.display());
    Ok(model)
}
