use super::OutputSink;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Writes packed YUYV frames to a v4l2loopback device.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    scratch: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!("Opening v4l2loopback device {} ({}x{})", path.display(), width, height);

        match configure_format(path, width, height) {
            Ok(()) => tracing::info!("Output format set to YUYV {}x{}", width, height),
            Err(e) => tracing::warn!("Could not set output format on {}: {:#}", path.display(), e),
        }

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
            scratch: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Announce the frame format to loopback readers.
fn configure_format(path: &Path, width: u32, height: u32) -> Result<()> {
    let device = Device::with_path(path).context("Failed to open device for format negotiation")?;
    let mut format = Output::format(&device).context("Failed to query output format")?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    Output::set_format(&device, &format).context("Failed to set output format")?;
    Ok(())
}

/// BT.601 full-range conversion.
pub(crate) fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
    let byte = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    (byte(y), byte(u), byte(v))
}

/// Pack an RGB image as YUYV (Y0 U Y1 V), averaging chroma over each
/// horizontal pixel pair. An odd last column is paired with itself.
pub(crate) fn pack_yuyv(image: &RgbImage, out: &mut Vec<u8>) {
    let (width, _) = image.dimensions();
    out.clear();
    for row in image.rows() {
        let pixels: Vec<[u8; 3]> = row.map(|p| p.0).collect();
        for pair in pixels.chunks(2) {
            let (y0, u0, v0) = rgb_to_yuv(pair[0]);
            let (y1, u1, v1) = rgb_to_yuv(*pair.last().unwrap_or(&pair[0]));
            let u = ((u0 as u16 + u1 as u16 + 1) / 2) as u8;
            let v = ((v0 as u16 + v1 as u16 + 1) / 2) as u8;
            out.extend_from_slice(&[y0, u, y1, v]);
        }
    }
    debug_assert_eq!(out.len(), (width.div_ceil(2) * 4 * image.height()) as usize);
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
            &resized
        } else {
            frame
        };

        pack_yuyv(frame, &mut self.scratch);
        self.file
            .write_all(&self.scratch)
            .context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
