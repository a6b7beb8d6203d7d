//! Drawing surface interface

use crate::capture::VideoFrame;
use crate::overlay::{OverlayPath, Rect};

/// Outline style for [`DrawingSurface::stroke`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    /// Straight (non-premultiplied) RGBA color
    pub color: [u8; 4],
    pub line_width: f64,
}

impl StrokeStyle {
    /// Semi-opaque white, 3px: the overlay border
    pub const OVERLAY_BORDER: StrokeStyle = StrokeStyle {
        color: [255, 255, 255, 204],
        line_width: 3.0,
    };
}

/// 2D composition target.
///
/// `save`/`restore` bracket clip state so that clipping applied for one
/// layer never leaks into the next.
pub trait DrawingSurface: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Push the current clip and style state
    fn save(&mut self);

    /// Pop the state pushed by the matching `save`
    fn restore(&mut self);

    /// Intersect the current clip region with `path`
    fn clip(&mut self, path: &OverlayPath);

    /// Draw `frame` scaled into `dest`, honoring the current clip
    fn draw_image(&mut self, frame: &VideoFrame, dest: Rect);

    /// Outline `path`, honoring the current clip
    fn stroke(&mut self, path: &OverlayPath, style: &StrokeStyle);

    /// Capture the current surface contents as a frame
    fn snapshot(&self) -> VideoFrame;
}

/// Creates composition surfaces sized to the primary source
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, width: u32, height: u32) -> Box<dyn DrawingSurface>;
}
