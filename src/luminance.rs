//! Ambient brightness estimate from a camera frame.

use crate::frame::Frame;
use image::Rgb;
use std::fmt;

/// Mean luma of one frame, 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BrightnessSample(f64);

impl BrightnessSample {
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for BrightnessSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

/// BT.601 luma, same weights as the usual RGB -> gray conversion.
fn luma(&Rgb([r, g, b]): &Rgb<u8>) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}

/// Arithmetic mean of per-pixel luma. Frames are never empty.
pub fn estimate(frame: &Frame) -> BrightnessSample {
    let image = frame.image();
    let n = u64::from(image.width()) * u64::from(image.height());
    let sum: f64 = image.pixels().map(luma).sum();
    BrightnessSample(sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_gray_frame() {
        let s = estimate(&Frame::filled(4, 3, [100, 100, 100]));
        assert!((s.value() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_black_and_white_extremes() {
        assert_eq!(estimate(&Frame::filled(2, 2, [0, 0, 0])).value(), 0.0);
        let white = estimate(&Frame::filled(2, 2, [255, 255, 255])).value();
        assert!((white - 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_weights() {
        let green = estimate(&Frame::filled(1, 1, [0, 255, 0])).value();
        let blue = estimate(&Frame::filled(1, 1, [0, 0, 255])).value();
        assert!(green > blue);
        assert!((green - 0.587 * 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_over_pixels() {
        let mut frame = Frame::filled(2, 1, [0, 0, 0]);
        frame.put_pixel(1, 0, [200, 200, 200]);
        assert!((estimate(&frame).value() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_display_truncates() {
        assert_eq!(BrightnessSample::new(89.6).to_string(), "89");
    }
}
