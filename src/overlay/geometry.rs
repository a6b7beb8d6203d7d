//! Overlay geometry calculations

use crate::settings::{OverlayPosition, OverlayShape, OverlaySize, Settings};

/// Distance between the overlay and the canvas edges, in pixels
pub const MARGIN: u32 = 20;

/// Corner radius of the `rounded` overlay shape, in pixels
pub const ROUNDED_CORNER_RADIUS: f64 = 15.0;

/// Axis-aligned rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Overlay edge length: `floor(ratio * canvas_height)`
pub fn overlay_size(size: OverlaySize, canvas_height: u32) -> u32 {
    (size.ratio() * canvas_height as f64).floor() as u32
}

/// Top-left corner of the overlay square.
///
/// Canvases smaller than `size + MARGIN` clamp the far-edge coordinates to
/// zero instead of going negative.
pub fn overlay_position(
    position: OverlayPosition,
    canvas_width: u32,
    canvas_height: u32,
    size: u32,
) -> (i32, i32) {
    let far_x = canvas_width.saturating_sub(size.saturating_add(MARGIN));
    let far_y = canvas_height.saturating_sub(size.saturating_add(MARGIN));

    let (x, y) = match position {
        OverlayPosition::BottomLeft => (MARGIN, far_y),
        OverlayPosition::BottomRight => (far_x, far_y),
        OverlayPosition::TopLeft => (MARGIN, MARGIN),
        OverlayPosition::TopRight => (far_x, MARGIN),
    };

    (x as i32, y as i32)
}

/// Outline of the overlay, used both as clip region and border
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayPath {
    Circle { cx: f64, cy: f64, radius: f64 },
    Rect(Rect),
    RoundedRect { rect: Rect, radius: f64 },
}

impl OverlayPath {
    /// Signed distance from a point to the outline.
    ///
    /// Negative inside, zero on the outline, positive outside.
    pub fn signed_distance(&self, px: f64, py: f64) -> f64 {
        match *self {
            OverlayPath::Circle { cx, cy, radius } => {
                ((px - cx).powi(2) + (py - cy).powi(2)).sqrt() - radius
            }
            OverlayPath::Rect(rect) => rounded_box_distance(&rect, 0.0, px, py),
            OverlayPath::RoundedRect { rect, radius } => {
                rounded_box_distance(&rect, radius, px, py)
            }
        }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        self.signed_distance(px, py) <= 0.0
    }

    /// Pixel bounds covered by the path, grown by `pad` on every side
    pub fn bounds(&self, pad: f64) -> (i32, i32, i32, i32) {
        let (left, top, right, bottom) = match *self {
            OverlayPath::Circle { cx, cy, radius } => {
                (cx - radius, cy - radius, cx + radius, cy + radius)
            }
            OverlayPath::Rect(rect) | OverlayPath::RoundedRect { rect, .. } => (
                rect.x as f64,
                rect.y as f64,
                rect.right() as f64,
                rect.bottom() as f64,
            ),
        };

        (
            (left - pad).floor() as i32,
            (top - pad).floor() as i32,
            (right + pad).ceil() as i32,
            (bottom + pad).ceil() as i32,
        )
    }
}

fn rounded_box_distance(rect: &Rect, radius: f64, px: f64, py: f64) -> f64 {
    let half_w = rect.width as f64 / 2.0;
    let half_h = rect.height as f64 / 2.0;
    let radius = radius.min(half_w).min(half_h).max(0.0);

    let dx = (px - (rect.x as f64 + half_w)).abs() - (half_w - radius);
    let dy = (py - (rect.y as f64 + half_h)).abs() - (half_h - radius);

    let outside = (dx.max(0.0).powi(2) + dy.max(0.0).powi(2)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside - radius
}

/// Concrete overlay placement for one canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub rect: Rect,
    pub shape: OverlayShape,
}

impl OverlayGeometry {
    pub fn compute(settings: &Settings, canvas_width: u32, canvas_height: u32) -> Self {
        let size = overlay_size(settings.overlay_size, canvas_height);
        let (x, y) = overlay_position(settings.overlay_position, canvas_width, canvas_height, size);

        Self {
            rect: Rect::new(x, y, size, size),
            shape: settings.overlay_shape,
        }
    }

    pub fn path(&self) -> OverlayPath {
        match self.shape {
            OverlayShape::Circle => {
                let half = self.rect.width as f64 / 2.0;
                OverlayPath::Circle {
                    cx: self.rect.x as f64 + half,
                    cy: self.rect.y as f64 + half,
                    radius: half,
                }
            }
            OverlayShape::Rectangle => OverlayPath::Rect(self.rect),
            OverlayShape::Rounded => OverlayPath::RoundedRect {
                rect: self.rect,
                radius: ROUNDED_CORNER_RADIUS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [OverlaySize; 3] = [OverlaySize::Small, OverlaySize::Medium, OverlaySize::Large];

    #[test]
    fn test_overlay_size_ratios() {
        assert_eq!(overlay_size(OverlaySize::Small, 1080), 216);
        assert_eq!(overlay_size(OverlaySize::Medium, 1080), 270);
        assert_eq!(overlay_size(OverlaySize::Large, 1080), 324);
        assert_eq!(overlay_size(OverlaySize::Medium, 0), 0);
    }

    #[test]
    fn test_overlay_size_floors() {
        for height in [1u32, 7, 99, 719, 721, 1439, 4321] {
            for size in SIZES {
                let expected = (size.ratio() * height as f64).floor() as u32;
                assert_eq!(overlay_size(size, height), expected, "{:?} @ {}", size, height);
            }
        }
        // 0.25 * 719 = 179.75
        assert_eq!(overlay_size(OverlaySize::Medium, 719), 179);
    }

    #[test]
    fn test_overlay_positions() {
        let (w, h, s) = (1920, 1080, 270);
        assert_eq!(overlay_position(OverlayPosition::BottomLeft, w, h, s), (20, 790));
        assert_eq!(overlay_position(OverlayPosition::BottomRight, w, h, s), (1630, 790));
        assert_eq!(overlay_position(OverlayPosition::TopLeft, w, h, s), (20, 20));
        assert_eq!(overlay_position(OverlayPosition::TopRight, w, h, s), (1630, 20));
    }

    #[test]
    fn test_overlay_positions_follow_formula() {
        for (w, h) in [(1280u32, 720u32), (2560, 1440), (800, 600), (333, 999)] {
            for size in SIZES {
                let s = overlay_size(size, h);
                let far_x = (w - s - MARGIN) as i32;
                let far_y = (h - s - MARGIN) as i32;
                assert_eq!(overlay_position(OverlayPosition::BottomLeft, w, h, s), (20, far_y));
                assert_eq!(overlay_position(OverlayPosition::BottomRight, w, h, s), (far_x, far_y));
                assert_eq!(overlay_position(OverlayPosition::TopLeft, w, h, s), (20, 20));
                assert_eq!(overlay_position(OverlayPosition::TopRight, w, h, s), (far_x, 20));
            }
        }
    }

    #[test]
    fn test_degenerate_canvas_clamps() {
        assert_eq!(overlay_position(OverlayPosition::BottomRight, 10, 10, 50), (0, 0));
        assert_eq!(overlay_position(OverlayPosition::BottomLeft, 0, 0, 0), (20, 0));
        assert_eq!(overlay_position(OverlayPosition::TopRight, 5, 5, u32::MAX), (0, 20));
    }

    #[test]
    fn test_geometry_paths() {
        let mut settings = Settings::default();
        let geometry = OverlayGeometry::compute(&settings, 1920, 1080);
        assert_eq!(geometry.rect, Rect::new(20, 790, 270, 270));
        assert_eq!(
            geometry.path(),
            OverlayPath::Circle { cx: 155.0, cy: 925.0, radius: 135.0 }
        );

        settings.overlay_shape = OverlayShape::Rounded;
        let geometry = OverlayGeometry::compute(&settings, 1920, 1080);
        assert_eq!(
            geometry.path(),
            OverlayPath::RoundedRect { rect: geometry.rect, radius: ROUNDED_CORNER_RADIUS }
        );
    }

    #[test]
    fn test_signed_distance() {
        let circle = OverlayPath::Circle { cx: 50.0, cy: 50.0, radius: 10.0 };
        assert!(circle.contains(50.0, 50.0));
        assert!((circle.signed_distance(60.0, 50.0)).abs() < 1e-9);
        assert!(!circle.contains(59.0, 59.0));

        let rect = OverlayPath::Rect(Rect::new(0, 0, 100, 100));
        assert!(rect.contains(0.5, 0.5));
        assert!(rect.contains(99.5, 99.5));
        assert!(!rect.contains(100.5, 50.0));

        let rounded = OverlayPath::RoundedRect { rect: Rect::new(0, 0, 100, 100), radius: 15.0 };
        assert!(!rounded.contains(0.5, 0.5));
        assert!(rounded.contains(50.0, 0.5));
        assert!(rounded.contains(15.0, 15.0));
    }
}
