use super::CaptureSource;
use crate::frame::BgraFrame;
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

/// Webcam frames via nokhwa, decoded to RGB and repacked as BGRA.
pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!("Opening webcam {} at {}x{}", device_index, width, height);

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));
        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .context("Failed to open camera")?;
        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        if (actual.width(), actual.height()) != (width, height) {
            tracing::warn!(
                "Camera delivers {}x{} instead of {}x{}",
                actual.width(),
                actual.height(),
                width,
                height
            );
        }

        Ok(Self {
            camera,
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<BgraFrame> {
        let buffer = self.camera.frame().context("Failed to capture frame")?;
        let rgb = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;
        Ok(BgraFrame::from_rgb(&rgb))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
