//! Decoded video frames

use std::sync::Arc;

/// One RGBA8 image. Pixel data is shared, so clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap tightly packed RGBA8 pixels. Returns `None` on a size mismatch.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// A frame filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = std::iter::repeat(rgba)
            .take(width as usize * height as usize)
            .flatten()
            .collect();
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`; callers must stay in bounds
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
