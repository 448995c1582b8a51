use crate::error::InferenceError;
use crate::session::TensorSpec;
use image::{GrayImage, RgbImage};
use ndarray::{Array3, ArrayView2, Axis};

/// Resolved input and output tensors of a session, in the order the adapter
/// feeds and reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorShapeSet {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl TensorShapeSet {
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|t| t.name.clone()).collect()
    }
}

/// Where the channel axis sits in an image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// (batch,) height, width, channel
    ChannelsLast,
    /// (batch,) channel, height, width
    ChannelsFirst,
}

impl Layout {
    /// (height, width, channels) read from a rank-3 or rank-4 shape.
    pub fn spatial(self, dims: &[i64]) -> Option<(usize, usize, usize)> {
        let d = |i: usize| dims.get(i).map(|&v| v.max(0) as usize);
        match (self, dims.len()) {
            (Layout::ChannelsLast, 4) => Some((d(1)?, d(2)?, d(3)?)),
            (Layout::ChannelsFirst, 4) => Some((d(2)?, d(3)?, d(1)?)),
            (Layout::ChannelsLast, 3) => Some((d(0)?, d(1)?, d(2)?)),
            (Layout::ChannelsFirst, 3) => Some((d(1)?, d(2)?, d(0)?)),
            _ => None,
        }
    }
}

/// Value range of a post-processed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRange {
    /// [0, 1], scaled by 255 when converted to bytes.
    Unit,
    /// Already [0, 255].
    Byte,
}

impl OutputRange {
    fn scale(self) -> f32 {
        match self {
            OutputRange::Unit => 255.0,
            OutputRange::Byte => 1.0,
        }
    }
}

fn to_byte(value: f32, scale: f32) -> u8 {
    let v = (value * scale).round();
    if v.is_nan() {
        0
    } else {
        v.clamp(0.0, 255.0) as u8
    }
}

/// An output tensor viewed as an image. Channels-last data is shaped
/// (height, width, channels); channels-first data is (channels, height, width).
#[derive(Debug, Clone, PartialEq)]
pub struct TensorImage {
    data: Array3<f32>,
    layout: Layout,
}

impl TensorImage {
    pub fn new(data: Array3<f32>, layout: Layout) -> Self {
        Self { data, layout }
    }

    /// Wrap the first `h * w * c` values of a flat buffer.
    pub fn from_buffer(
        buffer: &[f32],
        height: usize,
        width: usize,
        channels: usize,
        layout: Layout,
    ) -> Result<Self, InferenceError> {
        let len = height * width * channels;
        if len == 0 || buffer.len() < len {
            return Err(InferenceError::Layout(format!(
                "buffer of {} values cannot hold a {}x{}x{} image",
                buffer.len(),
                height,
                width,
                channels
            )));
        }
        let shape = match layout {
            Layout::ChannelsLast => (height, width, channels),
            Layout::ChannelsFirst => (channels, height, width),
        };
        let data = Array3::from_shape_vec(shape, buffer[..len].to_vec())
            .map_err(|e| InferenceError::Layout(e.to_string()))?;
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    fn channel_axis(&self) -> Axis {
        match self.layout {
            Layout::ChannelsLast => Axis(2),
            Layout::ChannelsFirst => Axis(0),
        }
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(self.channel_axis())
    }

    pub fn height(&self) -> usize {
        match self.layout {
            Layout::ChannelsLast => self.data.dim().0,
            Layout::ChannelsFirst => self.data.dim().1,
        }
    }

    pub fn width(&self) -> usize {
        match self.layout {
            Layout::ChannelsLast => self.data.dim().1,
            Layout::ChannelsFirst => self.data.dim().2,
        }
    }

    /// One channel as a (height, width) view.
    pub fn plane(&self, channel: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(self.channel_axis(), channel)
    }

    /// Planar to interleaved.
    pub fn into_channels_last(self) -> Self {
        match self.layout {
            Layout::ChannelsLast => self,
            Layout::ChannelsFirst => Self {
                data: self
                    .data
                    .permuted_axes([1, 2, 0])
                    .as_standard_layout()
                    .into_owned(),
                layout: Layout::ChannelsLast,
            },
        }
    }

    /// Channel 0 as an 8-bit image.
    pub fn to_gray(&self, range: OutputRange) -> GrayImage {
        let scale = range.scale();
        let plane = self.plane(0);
        GrayImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            image::Luma([to_byte(plane[[y as usize, x as usize]], scale)])
        })
    }

    /// First three channels as an 8-bit RGB image. Single-channel outputs are
    /// replicated into gray.
    pub fn to_rgb(&self, range: OutputRange) -> RgbImage {
        let scale = range.scale();
        let channels = self.channels();
        let planes: Vec<ArrayView2<'_, f32>> =
            (0..3).map(|c| self.plane(c.min(channels - 1))).collect();
        RgbImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            image::Rgb([
                to_byte(planes[0][[y, x]], scale),
                to_byte(planes[1][[y, x]], scale),
                to_byte(planes[2][[y, x]], scale),
            ])
        })
    }
}
