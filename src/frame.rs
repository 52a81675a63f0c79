use crate::error::{CalibrationError, Result};
use crate::solver::PatternDetection;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Identity of a pipeline stage, assigned once when the stage is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(Uuid);

impl StageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel layout of an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single 8-bit luminance channel
    Gray8,
    /// Interleaved 8-bit red, green, blue
    Rgb24,
    /// Interleaved 8-bit blue, green, red
    Bgr24,
}

impl PixelFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
        }
    }
}

/// Raw pixel data with its geometry. Cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Bytes needed for `width` x `height` pixels of `format`
    pub fn byte_len(width: u32, height: u32, format: PixelFormat) -> Result<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| {
                CalibrationError::validation(format!(
                    "pixel buffer of {}x{} {:?} is too large",
                    width, height, format
                ))
            })
    }

    /// Wrap raw bytes, checking that the length matches the geometry
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height, format)?;
        if data.len() != expected {
            return Err(CalibrationError::validation(format!(
                "pixel buffer of {}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            format,
        })
    }

    pub(crate) fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(Self::byte_len(width, height, format).ok(), Some(data.len()));
        Self {
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Buffer with every byte set to `value`
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Result<Self> {
        let len = Self::byte_len(width, height, format)?;
        Ok(Self {
            data: Arc::new(vec![value; len]),
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of the pixel at (x, y), or `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        Some(&self.data[offset..offset + bpp])
    }

    /// Luminance-only copy of the buffer (BT.601 weights)
    pub fn to_grayscale(&self) -> PixelBuffer {
        let (r, b) = match self.format {
            PixelFormat::Gray8 => return self.clone(),
            PixelFormat::Rgb24 => (0, 2),
            PixelFormat::Bgr24 => (2, 0),
        };

        let gray = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let luma = 0.299 * px[r] as f32 + 0.587 * px[1] as f32 + 0.114 * px[b] as f32;
                luma.round().min(255.0) as u8
            })
            .collect();

        PixelBuffer {
            data: Arc::new(gray),
            width: self.width,
            height: self.height,
            format: PixelFormat::Gray8,
        }
    }
}

/// Detection payload attached to an image by a processor
#[derive(Clone)]
pub enum Features {
    /// Calibration pattern corners found by the solver
    Corners(PatternDetection),
    /// Payload private to a custom processor, named by `kind`
    Opaque {
        kind: String,
        payload: Arc<dyn Any + Send + Sync>,
    },
}

impl Features {
    /// Tag naming what the payload means
    pub fn kind(&self) -> &str {
        match self {
            Features::Corners(_) => "corners",
            Features::Opaque { kind, .. } => kind,
        }
    }

    pub fn as_corners(&self) -> Option<&PatternDetection> {
        match self {
            Features::Corners(detection) => Some(detection),
            Features::Opaque { .. } => None,
        }
    }

    /// Downcast an opaque payload
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match self {
            Features::Opaque { payload, .. } => payload.downcast_ref::<T>(),
            Features::Corners(_) => None,
        }
    }
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Features::Corners(detection) => f.debug_tuple("Corners").field(detection).finish(),
            Features::Opaque { kind, .. } => f.debug_struct("Opaque").field("kind", kind).finish(),
        }
    }
}

/// One source's picture within a frame
#[derive(Debug, Clone)]
pub struct Image {
    source: StageId,
    pixels: PixelBuffer,
    features: Option<Features>,
}

impl Image {
    pub fn new(source: StageId, pixels: PixelBuffer) -> Self {
        Self {
            source,
            pixels,
            features: None,
        }
    }

    /// Stage that produced or last transformed this image
    pub fn source(&self) -> StageId {
        self.source
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn features(&self) -> Option<&Features> {
        self.features.as_ref()
    }

    pub fn feature_kind(&self) -> Option<&str> {
        self.features.as_ref().map(Features::kind)
    }

    /// Detected pattern, if the features carry one
    pub fn corners(&self) -> Option<&PatternDetection> {
        self.features.as_ref().and_then(Features::as_corners)
    }

    pub fn with_source(self, source: StageId) -> Self {
        Self { source, ..self }
    }

    pub fn with_pixels(self, pixels: PixelBuffer) -> Self {
        Self { pixels, ..self }
    }

    pub fn with_features(self, features: Features) -> Self {
        Self {
            features: Some(features),
            ..self
        }
    }
}

/// One captured instant with the image of every contributing source
#[derive(Debug, Clone)]
pub struct Frame {
    timestamp: SystemTime,
    index: u64,
    images: Vec<Image>,
}

impl Frame {
    pub fn new(timestamp: SystemTime, index: u64, images: Vec<Image>) -> Self {
        Self {
            timestamp,
            index,
            images,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Sequence number assigned by the capturing source
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }

    /// Same instant, different images
    pub fn with_images(self, images: Vec<Image>) -> Self {
        Self { images, ..self }
    }

    /// Rebuild the frame by passing every image through `f`
    pub fn try_map_images<F>(self, f: F) -> Result<Self>
    where
        F: FnMut(Image) -> Result<Image>,
    {
        let images = self.images.into_iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Self { images, ..self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgr24.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_pixel_buffer_size_validation() {
        assert!(PixelBuffer::new(4, 2, PixelFormat::Gray8, vec![0; 8]).is_ok());

        let result = PixelBuffer::new(4, 2, PixelFormat::Rgb24, vec![0; 8]);
        assert!(matches!(result, Err(CalibrationError::Validation { .. })));
    }

    #[test]
    fn test_oversized_geometry_is_rejected() {
        let huge = PixelBuffer::new(u32::MAX, u32::MAX, PixelFormat::Rgb24, Vec::new());
        let filled = PixelBuffer::filled(u32::MAX, u32::MAX, PixelFormat::Bgr24, 0);

        assert!(matches!(huge, Err(CalibrationError::Validation { .. })));
        assert!(matches!(filled, Err(CalibrationError::Validation { .. })));
        assert_eq!(PixelBuffer::byte_len(4, 2, PixelFormat::Rgb24).unwrap(), 24);
    }

    #[test]
    fn test_grayscale_conversion() {
        let rgb = PixelBuffer::new(2, 1, PixelFormat::Rgb24, vec![255, 0, 0, 0, 0, 255]).unwrap();
        let bgr = PixelBuffer::new(2, 1, PixelFormat::Bgr24, vec![0, 0, 255, 255, 0, 0]).unwrap();

        let gray_rgb = rgb.to_grayscale();
        let gray_bgr = bgr.to_grayscale();

        assert_eq!(gray_rgb.format(), PixelFormat::Gray8);
        assert_eq!(gray_rgb.data(), &[76, 29]);
        assert_eq!(gray_rgb.data(), gray_bgr.data());

        let gray = PixelBuffer::filled(3, 3, PixelFormat::Gray8, 9).unwrap();
        assert_eq!(gray.to_grayscale(), gray);
    }

    #[test]
    fn test_pixel_lookup() {
        let buffer = PixelBuffer::new(2, 2, PixelFormat::Gray8, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.pixel(1, 1), Some(&[4u8][..]));
        assert_eq!(buffer.pixel(2, 0), None);
    }

    #[test]
    fn test_frame_field_replacement() {
        let stage = StageId::new();
        let other = StageId::new();
        let image = Image::new(stage, PixelBuffer::filled(2, 2, PixelFormat::Gray8, 0).unwrap());
        let frame = Frame::new(SystemTime::now(), 7, vec![image]);
        let timestamp = frame.timestamp();

        let mapped = frame
            .try_map_images(|image| Ok(image.with_source(other)))
            .unwrap();

        assert_eq!(mapped.index(), 7);
        assert_eq!(mapped.timestamp(), timestamp);
        assert_eq!(mapped.images()[0].source(), other);
    }

    #[test]
    fn test_feature_kinds() {
        let detection = PatternDetection {
            found: true,
            corners: vec![Point2::new(1.0, 2.0)],
        };
        let image = Image::new(StageId::new(), PixelBuffer::filled(1, 1, PixelFormat::Gray8, 0).unwrap())
            .with_features(Features::Corners(detection));
        assert_eq!(image.feature_kind(), Some("corners"));
        assert!(image.corners().unwrap().found);

        let opaque = Features::Opaque {
            kind: "blobs".to_string(),
            payload: Arc::new(3usize),
        };
        assert_eq!(opaque.kind(), "blobs");
        assert_eq!(opaque.payload::<usize>(), Some(&3));
        assert!(opaque.as_corners().is_none());
    }
}
