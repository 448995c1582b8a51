mod webcam;

pub use webcam::WebcamCapture;

use crate::frame::BgraFrame;
use anyhow::Result;

/// A source of BGRA frames for the render context.
pub trait CaptureSource {
    fn capture_frame(&mut self) -> Result<BgraFrame>;

    /// Resolution frames are delivered at.
    fn resolution(&self) -> (u32, u32);
}
