//! Frame type: a decoded RGB image plus the path it came from.

use std::path::{Path, PathBuf};

/// A decoded still image.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source: PathBuf,
}

impl Frame {
    /// Decode an image file of any format the `image` crate recognises.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let decoded = image::open(path).map_err(|source| FrameError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty(path.to_path_buf()));
        }

        tracing::trace!(path = %path.display(), width, height, "decoded frame");

        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
            source: path.to_path_buf(),
        })
    }

    /// Wrap an existing RGB buffer.
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        source: impl Into<PathBuf>,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height, source: source.into() })
    }

    /// RGB triple at (x, y). Coordinates must be in bounds.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width as usize + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image has no pixels: {0}")]
    Empty(PathBuf),
    #[error("invalid RGB length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_open_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(3, 1, Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let frame = Frame::open(&path).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.data.len(), 4 * 2 * 3);
        assert_eq!(frame.pixel(3, 1), [10, 20, 30]);
        assert_eq!(frame.source, path);
    }

    #[test]
    fn test_open_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(matches!(Frame::open(&path), Err(FrameError::Decode { .. })));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Frame::open(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn test_from_rgb_checks_length() {
        assert!(Frame::from_rgb(vec![0; 12], 2, 2, "x").is_ok());
        let err = Frame::from_rgb(vec![0; 11], 2, 2, "x");
        assert!(matches!(err, Err(FrameError::InvalidLength { expected: 12, actual: 11 })));
    }
}
