//! Frame composition
//!
//! Draws the screen source at full size and the camera source into the
//! overlay shape, once per animation tick.

pub mod frame_compositor;
pub mod raster;
pub mod surface;

pub use frame_compositor::FrameCompositor;
pub use raster::{RasterSurface, RasterSurfaceFactory};
pub use surface::{DrawingSurface, StrokeStyle, SurfaceFactory};
