//! Software RGBA surface

use super::surface::{DrawingSurface, StrokeStyle, SurfaceFactory};
use crate::capture::VideoFrame;
use crate::overlay::{OverlayPath, Rect};

/// CPU-backed [`DrawingSurface`] over an RGBA8 buffer.
///
/// Clip regions are kept as a list of paths whose interiors are
/// intersected; each pixel is tested at its center.
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    clips: Vec<OverlayPath>,
    saved: Vec<usize>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            clips: Vec::new(),
            saved: Vec::new(),
        }
    }

    /// Depth of the save stack, for diagnostics
    pub fn saved_depth(&self) -> usize {
        self.saved.len()
    }

    fn in_clip(&self, px: f64, py: f64) -> bool {
        self.clips.iter().all(|path| path.contains(px, py))
    }

    /// Clamp a rectangle to the surface, returning `(x0, y0, x1, y1)`
    fn visible(&self, left: i32, top: i32, right: i32, bottom: i32) -> Option<(u32, u32, u32, u32)> {
        let x0 = left.max(0) as u32;
        let y0 = top.max(0) as u32;
        let x1 = right.min(self.width as i32).max(0) as u32;
        let y1 = bottom.min(self.height as i32).max(0) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let offset = self.offset(x, y);
        let alpha = color[3] as u32;
        let inverse = 255 - alpha;
        for channel in 0..3 {
            let dst = self.pixels[offset + channel] as u32;
            self.pixels[offset + channel] =
                ((color[channel] as u32 * alpha + dst * inverse + 127) / 255) as u8;
        }
        let dst_alpha = self.pixels[offset + 3] as u32;
        self.pixels[offset + 3] = (alpha + (dst_alpha * inverse + 127) / 255).min(255) as u8;
    }
}

impl DrawingSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn save(&mut self) {
        self.saved.push(self.clips.len());
    }

    fn restore(&mut self) {
        match self.saved.pop() {
            Some(depth) => self.clips.truncate(depth),
            None => tracing::warn!("restore() without matching save()"),
        }
    }

    fn clip(&mut self, path: &OverlayPath) {
        self.clips.push(*path);
    }

    fn draw_image(&mut self, frame: &VideoFrame, dest: Rect) {
        if frame.is_empty() || dest.is_empty() {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.visible(dest.x, dest.y, dest.right(), dest.bottom())
        else {
            return;
        };

        let clipped = !self.clips.is_empty();
        let src = frame.data();
        let src_width = frame.width() as usize;

        for y in y0..y1 {
            let sy = ((y as i64 - dest.y as i64) * frame.height() as i64 / dest.height as i64)
                as usize;
            for x in x0..x1 {
                if clipped && !self.in_clip(x as f64 + 0.5, y as f64 + 0.5) {
                    continue;
                }
                let sx = ((x as i64 - dest.x as i64) * frame.width() as i64
                    / dest.width as i64) as usize;
                let from = (sy * src_width + sx) * 4;
                let to = self.offset(x, y);
                self.pixels[to..to + 4].copy_from_slice(&src[from..from + 4]);
            }
        }
    }

    fn stroke(&mut self, path: &OverlayPath, style: &StrokeStyle) {
        let half = style.line_width / 2.0;
        if half <= 0.0 {
            return;
        }
        let (left, top, right, bottom) = path.bounds(half);
        let Some((x0, y0, x1, y1)) = self.visible(left, top, right, bottom) else {
            return;
        };

        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                if path.signed_distance(px, py).abs() > half || !self.in_clip(px, py) {
                    continue;
                }
                self.blend(x, y, style.color);
            }
        }
    }

    fn snapshot(&self) -> VideoFrame {
        VideoFrame::from_rgba(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| VideoFrame::solid(self.width, self.height, [0, 0, 0, 0]))
    }
}

/// Builds [`RasterSurface`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterSurfaceFactory;

impl SurfaceFactory for RasterSurfaceFactory {
    fn create(&self, width: u32, height: u32) -> Box<dyn DrawingSurface> {
        Box::new(RasterSurface::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn test_draw_image_scales_to_fill() {
        let mut surface = RasterSurface::new(8, 4);
        let source = VideoFrame::solid(2, 2, RED);
        surface.draw_image(&source, Rect::new(0, 0, 8, 4));

        let out = surface.snapshot();
        assert_eq!(out.pixel(0, 0), RED);
        assert_eq!(out.pixel(7, 3), RED);
    }

    #[test]
    fn test_draw_image_picks_nearest_source_pixel() {
        let mut data = Vec::new();
        data.extend_from_slice(&RED);
        data.extend_from_slice(&BLUE);
        let source = VideoFrame::from_rgba(2, 1, data).unwrap();

        let mut surface = RasterSurface::new(4, 1);
        surface.draw_image(&source, Rect::new(0, 0, 4, 1));
        let out = surface.snapshot();
        assert_eq!(out.pixel(1, 0), RED);
        assert_eq!(out.pixel(2, 0), BLUE);
    }

    #[test]
    fn test_clip_is_scoped_by_save_restore() {
        let mut surface = RasterSurface::new(10, 10);
        surface.save();
        surface.clip(&OverlayPath::Rect(Rect::new(0, 0, 5, 5)));
        surface.draw_image(&VideoFrame::solid(1, 1, RED), Rect::new(0, 0, 10, 10));
        surface.restore();
        assert_eq!(surface.saved_depth(), 0);

        let out = surface.snapshot();
        assert_eq!(out.pixel(2, 2), RED);
        assert_eq!(out.pixel(7, 7), [0, 0, 0, 0]);

        surface.draw_image(&VideoFrame::solid(1, 1, BLUE), Rect::new(0, 0, 10, 10));
        assert_eq!(surface.snapshot().pixel(7, 7), BLUE);
    }

    #[test]
    fn test_offscreen_destination_is_ignored() {
        let mut surface = RasterSurface::new(4, 4);
        surface.draw_image(&VideoFrame::solid(1, 1, RED), Rect::new(10, 10, 4, 4));
        surface.draw_image(&VideoFrame::solid(1, 1, RED), Rect::new(-8, -8, 4, 4));
        assert_eq!(surface.snapshot().pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_stroke_blends_outline_only() {
        let mut surface = RasterSurface::new(20, 20);
        surface.draw_image(&VideoFrame::solid(1, 1, BLUE), Rect::new(0, 0, 20, 20));
        surface.stroke(&OverlayPath::Rect(Rect::new(5, 5, 10, 10)), &StrokeStyle::OVERLAY_BORDER);

        let out = surface.snapshot();
        assert_eq!(out.pixel(10, 10), BLUE);
        assert_eq!(out.pixel(0, 0), BLUE);

        let edge = out.pixel(5, 10);
        assert!(edge[0] > 150 && edge[1] > 150, "edge not lightened: {:?}", edge);
        assert_eq!(edge[3], 255);
    }
}
