pub mod compositor;
mod loopback;

pub use compositor::{blend_enhanced, composite_background, mask_view, parse_hex_color};
pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbImage;

/// Where composited frames go.
pub trait OutputSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    fn resolution(&self) -> (u32, u32);
}
