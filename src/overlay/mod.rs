//! Camera overlay placement
//!
//! Pure functions mapping settings and canvas dimensions to the rectangle
//! and clip path of the camera overlay.

pub mod geometry;

pub use geometry::{overlay_position, overlay_size, OverlayGeometry, OverlayPath, Rect, MARGIN, ROUNDED_CORNER_RADIUS};
