//! Camera frames and the PNM stream they arrive on.
//!
//! The camera itself is an external process (ffmpeg, a v4l2 helper, ...)
//! writing PNM images back to back, e.g.
//! `ffmpeg -f v4l2 -i /dev/video0 -f image2pipe -vcodec ppm -`.

use image::codecs::pnm::{PnmDecoder, PnmEncoder, PnmSubtype, SampleEncoding};
use image::{
    ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageError, ImageResult, Rgb, RgbImage,
    imageops,
};
use log::{info, warn};
use std::io::{self, BufRead, Read, Write};
use thiserror::Error;

/// Upper bound on accepted frame area, keeps a corrupt header from
/// allocating gigabytes.
const MAX_PIXELS: u64 = 1 << 26;

/// One RGB8 capture tick. `seq` counts frames from the start of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
    seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self { image, seq }
    }

    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(color)), 0)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    /// Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x < self.image.width() && y < self.image.height() {
            self.image.put_pixel(x, y, Rgb(color));
        }
    }

    /// Flip left/right so the preview behaves like a mirror.
    pub fn mirror(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.image);
    }

    /// Binary PPM, one complete image per call.
    pub fn write_ppm<W: Write>(&self, mut w: W) -> ImageResult<()> {
        PnmEncoder::new(&mut w)
            .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
            .write_image(self.image.as_raw(), self.width(), self.height(), ColorType::Rgb8)?;
        w.flush()?;
        Ok(())
    }
}

/// Camera side of the loop. `None` means no frame this tick.
pub trait FrameSource {
    fn read_frame(&mut self) -> Option<Frame>;
    fn is_open(&self) -> bool;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read_frame(&mut self) -> Option<Frame> {
        (**self).read_frame()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] ImageError),
    #[error("unsupported frame size {width}x{height}")]
    BadSize { width: u32, height: u32 },
}

/// Reads concatenated PNM images (`P1`-`P7`, 8 or 16 bit samples).
pub struct PpmStream<R> {
    reader: R,
    open: bool,
    next_seq: u64,
    max_pixels: u64,
}

impl<R: BufRead> PpmStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            open: true,
            next_seq: 0,
            max_pixels: MAX_PIXELS,
        }
    }

    #[cfg(test)]
    fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// `Ok(None)` on a clean end of stream. A frame whose header parsed
    /// always has its raster consumed, accepted or not.
    fn next_image(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.reader.fill_buf().map_err(ImageError::IoError)?.is_empty() {
            return Ok(None);
        }
        let decoder = PnmDecoder::new(&mut self.reader)?;
        let seq = self.next_seq;
        self.next_seq += 1;

        let (width, height) = decoder.dimensions();
        let area = u64::from(width) * u64::from(height);
        if area == 0 || area > self.max_pixels {
            let raster = decoder.total_bytes();
            drop(decoder);
            io::copy(&mut (&mut self.reader).take(raster), &mut io::sink())
                .map_err(ImageError::IoError)?;
            return Err(FrameError::BadSize { width, height });
        }
        let image = DynamicImage::from_decoder(decoder)?.into_rgb8();
        Ok(Some(Frame::new(image, seq)))
    }

    /// Nothing left to read, or the reader itself failed.
    fn exhausted(&mut self) -> bool {
        self.reader.fill_buf().map_or(true, |b| b.is_empty())
    }
}

impl<R: BufRead> FrameSource for PpmStream<R> {
    fn read_frame(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }
        match self.next_image() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                info!("camera stream ended");
                self.open = false;
                None
            }
            Err(e) if self.exhausted() => {
                warn!("camera stream ended mid-frame: {e}");
                self.open = false;
                None
            }
            Err(e) => {
                warn!("ignoring empty camera frame: {e}");
                None
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn p6(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::new();
        Frame::filled(width, height, color).write_ppm(&mut out).unwrap();
        out
    }

    #[test]
    fn test_reads_consecutive_frames_then_closes() {
        let mut bytes = p6(2, 2, [10, 20, 30]);
        bytes.extend(p6(3, 1, [200, 200, 200]));
        let mut src = PpmStream::new(Cursor::new(bytes));

        let a = src.read_frame().unwrap();
        assert_eq!((a.width(), a.height(), a.seq()), (2, 2, 0));
        assert_eq!(a.pixel(1, 1), Some([10, 20, 30]));

        let b = src.read_frame().unwrap();
        assert_eq!((b.width(), b.height(), b.seq()), (3, 1, 1));
        assert!(src.is_open());

        assert!(src.read_frame().is_none());
        assert!(!src.is_open());
    }

    #[test]
    fn test_grayscale_frame_expands_to_rgb() {
        let mut bytes = b"P5\n2 1\n255\n".to_vec();
        bytes.extend([0u8, 255]);
        let frame = PpmStream::new(Cursor::new(bytes)).read_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(1, 0), Some([255, 255, 255]));
    }

    #[test]
    fn test_sixteen_bit_frame_keeps_stream_in_sync() {
        let mut bytes = b"P6\n2 2\n65535\n".to_vec();
        bytes.extend([0xffu8; 24]);
        bytes.extend(p6(2, 2, [7, 8, 9]));
        let mut src = PpmStream::new(Cursor::new(bytes));

        let wide = src.read_frame().unwrap();
        assert_eq!(wide.pixel(0, 0), Some([255, 255, 255]));
        let next = src.read_frame().unwrap();
        assert_eq!(next.pixel(1, 1), Some([7, 8, 9]));
        assert_eq!(next.seq(), 1);
    }

    #[test]
    fn test_oversized_frame_is_skipped_with_its_raster() {
        let mut bytes = p6(2, 2, [1, 1, 1]);
        bytes.extend(p6(1, 1, [5, 6, 7]));
        let mut src = PpmStream::new(Cursor::new(bytes)).with_max_pixels(2);

        assert!(src.read_frame().is_none());
        assert!(src.is_open());
        let small = src.read_frame().unwrap();
        assert_eq!(small.pixel(0, 0), Some([5, 6, 7]));
        assert_eq!(small.seq(), 1);
    }

    #[test]
    fn test_bad_magic_is_skipped_not_fatal() {
        let mut src = PpmStream::new(Cursor::new(b"Q9 1 1 255\n0 0 0\n".to_vec()));
        assert!(src.read_frame().is_none());
        assert!(src.is_open());
    }

    #[test]
    fn test_truncated_frame_closes_source() {
        let mut bytes = p6(4, 4, [1, 2, 3]);
        bytes.truncate(bytes.len() - 5);
        let mut src = PpmStream::new(Cursor::new(bytes));
        assert!(src.read_frame().is_none());
        assert!(!src.is_open());
    }

    #[test]
    fn test_mirror_flips_rows() {
        let mut image = RgbImage::new(3, 1);
        for x in 0..3u8 {
            image.put_pixel(u32::from(x), 0, Rgb([x + 1; 3]));
        }
        let mut frame = Frame::new(image, 4);
        frame.mirror();
        assert_eq!(frame.pixel(0, 0), Some([3, 3, 3]));
        assert_eq!(frame.pixel(1, 0), Some([2, 2, 2]));
        assert_eq!(frame.pixel(2, 0), Some([1, 1, 1]));
        assert_eq!(frame.seq(), 4);
    }

    #[test]
    fn test_put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]);
        frame.put_pixel(2, 0, [9, 9, 9]);
        frame.put_pixel(1, 1, [9, 9, 9]);
        assert_eq!(frame.pixel(1, 1), Some([9, 9, 9]));
        assert_eq!(frame.image().pixels().filter(|p| p.0 == [9, 9, 9]).count(), 1);
    }
}
