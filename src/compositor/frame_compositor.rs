//! Per-tick compositing of the two sources

use super::surface::{DrawingSurface, StrokeStyle};
use crate::capture::VideoFrame;
use crate::overlay::{OverlayGeometry, Rect};

/// Owns the composition surface; holds no other state across frames
pub struct FrameCompositor {
    surface: Box<dyn DrawingSurface>,
    frames_drawn: u64,
}

impl FrameCompositor {
    pub fn new(surface: Box<dyn DrawingSurface>) -> Self {
        Self {
            surface,
            frames_drawn: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Draw one composite frame.
    ///
    /// A layer whose frame is not available yet is skipped; whatever was
    /// drawn before stays on the surface.
    pub fn draw_frame(
        &mut self,
        primary: Option<&VideoFrame>,
        secondary: Option<&VideoFrame>,
        geometry: &OverlayGeometry,
    ) {
        let full = Rect::new(0, 0, self.surface.width(), self.surface.height());
        if let Some(frame) = primary {
            self.surface.draw_image(frame, full);
        }

        let path = geometry.path();

        if let Some(frame) = secondary {
            self.surface.save();
            self.surface.clip(&path);
            self.surface.draw_image(frame, geometry.rect);
            self.surface.restore();
        }

        // Border sits outside the clip so its outer half stays visible
        self.surface.save();
        self.surface.stroke(&path, &StrokeStyle::OVERLAY_BORDER);
        self.surface.restore();

        self.frames_drawn += 1;
    }

    /// Current surface contents, as fed to the output stream
    pub fn capture(&self) -> VideoFrame {
        self.surface.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::RasterSurface;
    use crate::settings::{OverlayPosition, OverlayShape, OverlaySize, Settings};

    const SCREEN: [u8; 4] = [10, 20, 30, 255];
    const CAMERA: [u8; 4] = [250, 0, 0, 255];

    fn settings(shape: OverlayShape) -> Settings {
        Settings {
            overlay_position: OverlayPosition::TopLeft,
            overlay_size: OverlaySize::Large,
            overlay_shape: shape,
            ..Settings::default()
        }
    }

    fn composite(shape: OverlayShape) -> (VideoFrame, OverlayGeometry) {
        let mut compositor = FrameCompositor::new(Box::new(RasterSurface::new(400, 400)));
        let geometry = OverlayGeometry::compute(&settings(shape), 400, 400);
        compositor.draw_frame(
            Some(&VideoFrame::solid(40, 40, SCREEN)),
            Some(&VideoFrame::solid(8, 6, CAMERA)),
            &geometry,
        );
        assert_eq!(compositor.frames_drawn(), 1);
        (compositor.capture(), geometry)
    }

    #[test]
    fn test_circle_overlay() {
        let (frame, geometry) = composite(OverlayShape::Circle);
        // 0.30 * 400 = 120px square at (20, 20)
        assert_eq!(geometry.rect, Rect::new(20, 20, 120, 120));

        assert_eq!(frame.pixel(80, 80), CAMERA);
        // Square corner lies outside the inscribed circle
        assert_eq!(frame.pixel(24, 24), SCREEN);
        assert_eq!(frame.pixel(300, 300), SCREEN);
    }

    #[test]
    fn test_rectangle_overlay_fills_corners() {
        let (frame, _) = composite(OverlayShape::Rectangle);
        assert_eq!(frame.pixel(24, 24), CAMERA);
        assert_eq!(frame.pixel(135, 135), CAMERA);
    }

    #[test]
    fn test_rounded_overlay_trims_corners() {
        let (frame, _) = composite(OverlayShape::Rounded);
        assert_eq!(frame.pixel(21, 21), SCREEN);
        assert_eq!(frame.pixel(80, 25), CAMERA);
    }

    #[test]
    fn test_border_extends_outside_clip() {
        let (frame, _) = composite(OverlayShape::Rectangle);
        // One pixel outside the overlay rect, inside the 3px stroke
        let outside = frame.pixel(80, 19);
        assert_ne!(outside, SCREEN);
        assert!(outside[0] > 150);
    }

    #[test]
    fn test_missing_frames_are_skipped() {
        let mut compositor = FrameCompositor::new(Box::new(RasterSurface::new(100, 100)));
        let geometry = OverlayGeometry::compute(&Settings::default(), 100, 100);
        compositor.draw_frame(None, None, &geometry);
        compositor.draw_frame(Some(&VideoFrame::solid(2, 2, SCREEN)), None, &geometry);

        let frame = compositor.capture();
        assert_eq!(frame.pixel(90, 5), SCREEN);
        assert_eq!(compositor.frames_drawn(), 2);
    }
}
