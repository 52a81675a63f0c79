use super::{DeviceInfo, VideoSource};
use crate::error::{CalibrationError, Result};
use crate::frame::{Frame, Image, PixelBuffer, PixelFormat, StageId};
use image::{DynamicImage, GrayImage, RgbImage};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, trace};

/// Source that decodes a list of image files in order, one per frame
#[derive(Debug)]
pub struct ImageFiles {
    id: StageId,
    name: String,
    paths: Vec<PathBuf>,
    cursor: usize,
    is_setup: bool,
}

impl ImageFiles {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        Self {
            id: StageId::new(),
            name: "ImageFiles".to_string(),
            paths,
            cursor: 0,
            is_setup: false,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl VideoSource for ImageFiles {
    fn id(&self) -> StageId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn tag(&self) -> &str {
        "ImageFiles"
    }

    fn description(&self) -> String {
        "Image file reader".to_string()
    }

    fn setup(&mut self) -> Result<()> {
        if let Some(missing) = self.paths.iter().find(|path| !path.is_file()) {
            return Err(CalibrationError::configuration(format!(
                "image file {} does not exist",
                missing.display()
            )));
        }
        self.cursor = 0;
        self.is_setup = true;
        info!("{} opened {} image files", self.name, self.paths.len());
        Ok(())
    }

    fn release(&mut self) {
        self.is_setup = false;
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        if !self.is_setup {
            return Err(CalibrationError::integrity(
                &self.name,
                "capture called before setup",
            ));
        }

        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };

        let decoded = image::open(path)?.to_rgb8();
        let (width, height) = decoded.dimensions();
        let pixels = PixelBuffer::new(width, height, PixelFormat::Rgb24, decoded.into_raw())?;
        trace!("{} decoded {}", self.name, path.display());

        let index = self.cursor as u64;
        self.cursor += 1;

        Ok(Some(Frame::new(
            SystemTime::now(),
            index,
            vec![Image::new(self.id, pixels)],
        )))
    }

    fn is_open(&self) -> bool {
        self.is_setup && self.cursor < self.paths.len()
    }

    fn path(&self) -> Option<String> {
        self.paths
            .first()
            .and_then(|path| path.parent())
            .map(|dir| dir.display().to_string())
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        let path = self.paths.first()?;
        image::image_dimensions(path).ok()
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.paths
            .iter()
            .map(|path| DeviceInfo {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                description: "image file".to_string(),
                path: path.display().to_string(),
            })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Encode a pixel buffer to `path`; the format follows the extension
pub fn save_pixels(pixels: &PixelBuffer, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = pixels.size();
    let malformed = || CalibrationError::validation("pixel buffer does not match its geometry");

    let image = match pixels.format() {
        PixelFormat::Gray8 => DynamicImage::ImageLuma8(
            GrayImage::from_raw(width, height, pixels.data().to_vec()).ok_or_else(malformed)?,
        ),
        PixelFormat::Rgb24 => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, pixels.data().to_vec()).ok_or_else(malformed)?,
        ),
        PixelFormat::Bgr24 => {
            let rgb = pixels
                .data()
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect();
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, rgb).ok_or_else(malformed)?)
        }
    };

    image.save(path)?;
    debug!("Wrote {}x{} image to {}", width, height, path.display());
    Ok(())
}
