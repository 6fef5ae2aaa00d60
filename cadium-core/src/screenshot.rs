/// Point-in-time captures of the drawing buffer
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbaImage};

use crate::error::ViewerError;
use crate::render::FrameBuffer;

pub const DEFAULT_FILE_NAME: &str = "3D_Model_Screenshot.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8
    pub rgba: Vec<u8>,
}

impl Screenshot {
    pub fn from_frame(frame: &FrameBuffer) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            rgba: frame.rgba().to_vec(),
        }
    }

    fn image(&self) -> Result<RgbaImage, ViewerError> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone()).ok_or_else(|| {
            ViewerError::Encode(format!(
                "{} bytes do not fill a {}x{} image",
                self.rgba.len(),
                self.width,
                self.height
            ))
        })
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, ViewerError> {
        let mut out = Cursor::new(Vec::new());
        self.image()?.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ViewerError> {
        let png = self.encode_png()?;
        std::fs::write(path, png)?;
        Ok(())
    }
}
