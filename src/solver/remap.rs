use crate::camera::PinholeCamera;
use crate::error::{CalibrationError, Result};
use crate::frame::PixelBuffer;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// Per-pixel source coordinates for undistorting (and rectifying) an image.
///
/// Entry `(x, y)` holds the position in the raw image whose value lands at
/// `(x, y)` in the corrected image.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortMap {
    /// Build the lookup for a camera using the 5-coefficient (k1, k2, p1, p2, k3) model.
    ///
    /// Corrected pixels are expressed in the camera's projection matrix when it
    /// has one (rectified stereo output) and in its intrinsic matrix otherwise.
    pub fn build(camera: &PinholeCamera, image_size: (u32, u32)) -> Result<Self> {
        let (width, height) = image_size;
        if width == 0 || height == 0 {
            return Err(CalibrationError::validation(
                "undistort map size must be greater than 0",
            ));
        }

        let k = camera.matrix();
        let new_k: Matrix3<f64> = match camera.projection() {
            Some(p) => p.fixed_view::<3, 3>(0, 0).into_owned(),
            None => *k,
        };
        let r = camera.rectify().copied().unwrap_or_else(Matrix3::identity);
        let inverse = (new_k * r).try_inverse().ok_or_else(|| {
            CalibrationError::validation("projection and rectification are not invertible")
        })?;

        let (fx, fy, cx, cy) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
        let [k1, k2, p1, p2, k3] = *camera.distortion();

        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);

        for v in 0..height {
            for u in 0..width {
                let ray = inverse * Vector3::new(u as f64, v as f64, 1.0);
                if ray.z == 0.0 {
                    map_x.push(-1.0);
                    map_y.push(-1.0);
                    continue;
                }
                let x = ray.x / ray.z;
                let y = ray.y / ray.z;

                let r2 = x * x + y * y;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;

                map_x.push((fx * xd + cx) as f32);
                map_y.push((fy * yd + cy) as f32);
            }
        }

        debug!("Built {}x{} undistort map", width, height);

        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// (width, height) of the corrected image
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Source position for corrected pixel (x, y)
    pub fn lookup(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        Some((self.map_x[i], self.map_y[i]))
    }

    /// Nearest-neighbour resample; positions outside the source become zero
    pub fn remap(&self, source: &PixelBuffer) -> Result<PixelBuffer> {
        let bpp = source.format().bytes_per_pixel();
        let mut out = vec![0u8; self.width as usize * self.height as usize * bpp];

        for (i, (mx, my)) in self.map_x.iter().zip(&self.map_y).enumerate() {
            let sx = mx.round();
            let sy = my.round();
            if sx < 0.0 || sy < 0.0 {
                continue;
            }
            if let Some(px) = source.pixel(sx as u32, sy as u32) {
                out[i * bpp..(i + 1) * bpp].copy_from_slice(px);
            }
        }

        PixelBuffer::new(self.width, self.height, source.format(), out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use nalgebra::Matrix3x4;

    fn camera(distortion: [f64; 5]) -> PinholeCamera {
        PinholeCamera::from_parameters(&[8, 6], &[10.0, 10.0], &[4.0, 3.0], &distortion, None, None)
            .unwrap()
    }

    fn ramp(width: u32, height: u32) -> PixelBuffer {
        let data = (0..width * height).map(|i| i as u8).collect();
        PixelBuffer::new(width, height, PixelFormat::Gray8, data).unwrap()
    }

    #[test]
    fn test_identity_camera_leaves_pixels_unchanged() {
        let map = UndistortMap::build(&camera([0.0; 5]), (8, 6)).unwrap();
        let source = ramp(8, 6);

        let (x, y) = map.lookup(5, 2).unwrap();
        assert!((x - 5.0).abs() < 1e-4);
        assert!((y - 2.0).abs() < 1e-4);
        assert_eq!(map.remap(&source).unwrap(), source);
    }

    #[test]
    fn test_radial_distortion_moves_corners_outward() {
        let map = UndistortMap::build(&camera([0.5, 0.0, 0.0, 0.0, 0.0]), (8, 6)).unwrap();

        let (cx, cy) = map.lookup(4, 3).unwrap();
        assert!((cx - 4.0).abs() < 1e-4 && (cy - 3.0).abs() < 1e-4);

        let (x, y) = map.lookup(0, 0).unwrap();
        assert!(x < 0.0 && y < 0.0);
    }

    #[test]
    fn test_out_of_bounds_samples_are_zero() {
        let map = UndistortMap::build(&camera([0.5, 0.0, 0.0, 0.0, 0.0]), (8, 6)).unwrap();
        let source = PixelBuffer::filled(8, 6, PixelFormat::Rgb24, 200).unwrap();

        let out = map.remap(&source).unwrap();
        assert_eq!(out.format(), PixelFormat::Rgb24);
        assert_eq!(out.pixel(0, 0), Some(&[0u8, 0, 0][..]));
        assert_eq!(out.pixel(4, 3), Some(&[200u8, 200, 200][..]));
    }

    #[test]
    fn test_projection_shift_translates_output() {
        let projection = Matrix3x4::new(
            10.0, 0.0, 5.0, 0.0, //
            0.0, 10.0, 3.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        );
        let camera = PinholeCamera::from_parameters(
            &[8, 6],
            &[10.0, 10.0],
            &[4.0, 3.0],
            &[0.0; 5],
            Some(Matrix3::identity()),
            Some(projection),
        )
        .unwrap();

        let map = UndistortMap::build(&camera, (8, 6)).unwrap();
        let (x, _) = map.lookup(5, 3).unwrap();
        assert!((x - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(UndistortMap::build(&camera([0.0; 5]), (0, 6)).is_err());
    }
}
