use super::types::{Layout, TensorImage};
use crate::frame::BgraFrame;
use image::{imageops, RgbImage};
use ndarray::{Array3, Zip};

/// Converts captured frames into float images at the network input size.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Prepare a BGRA frame for a network
    ///
    /// Steps:
    /// 1. Convert BGRA to RGB
    /// 2. Resize (bilinear) to target dimensions
    /// 3. Convert to float, keeping the [0, 255] range
    ///
    /// Returns: Array3<f32> with shape [height, width, 3]
    pub fn prepare(&self, frame: &BgraFrame) -> Array3<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let rgb = frame.to_rgb();
        let resized = if rgb.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                &rgb,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            rgb
        };

        rgb_to_array(&resized)
    }
}

/// Interleaved float copy of an RGB image, shape [height, width, 3].
pub fn rgb_to_array(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c] as f32
    })
}

/// Interleaved [h, w, c] to planar [c, h, w].
pub fn hwc_to_chw(image: Array3<f32>) -> Array3<f32> {
    image.permuted_axes([2, 0, 1]).as_standard_layout().into_owned()
}

/// `(x - mean[c]) * scale[c]` on an interleaved image.
pub fn normalize_channels(image: &mut Array3<f32>, mean: [f32; 3], scale: [f32; 3]) {
    for mut pixel in image.rows_mut() {
        for (c, value) in pixel.iter_mut().enumerate().take(3) {
            *value = (*value - mean[c]) * scale[c];
        }
    }
}

/// Stretch values to [0, 1]. A zero-variance field becomes all zeros.
pub fn normalize_min_max(image: &mut TensorImage) {
    let data = image.data_mut();
    let (min, max) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        data.fill(0.0);
        return;
    }
    data.mapv_inplace(|v| (v - min) / range);
}

/// Two-channel softmax `exp(a) / (exp(a) + exp(b))` where `a` is channel
/// `positive`. The result is a single-channel, channels-last image. Inputs
/// with any other channel count are returned unchanged.
pub fn softmax_two_channel(image: TensorImage, positive: usize) -> TensorImage {
    if image.channels() != 2 {
        return image;
    }
    let a = image.plane(positive);
    let b = image.plane(1 - positive);
    let mut out = Array3::<f32>::zeros((image.height(), image.width(), 1));
    Zip::from(out.index_axis_mut(ndarray::Axis(2), 0))
        .and(&a)
        .and(&b)
        .for_each(|o, &a, &b| {
            // exp(a) / (exp(a) + exp(b)) == 1 / (1 + exp(b - a))
            *o = 1.0 / (1.0 + (b - a).exp());
        });
    TensorImage::new(out, Layout::ChannelsLast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_resizes_and_swaps_to_rgb() {
        let frame = BgraFrame::filled(64, 48, [10, 20, 30, 255]);
        let image = Preprocessor::new(32, 16).prepare(&frame);
        assert_eq!(image.dim(), (16, 32, 3));
        assert_eq!(image[[5, 7, 0]], 30.0);
        assert_eq!(image[[5, 7, 2]], 10.0);
    }

    #[test]
    fn hwc_to_chw_groups_planes() {
        let hwc = Array3::from_shape_vec((1, 2, 3), vec![1., 2., 3., 4., 5., 6.]).unwrap();
        let chw = hwc_to_chw(hwc);
        assert_eq!(chw.dim(), (3, 1, 2));
        assert_eq!(chw.iter().copied().collect::<Vec<_>>(), vec![1., 4., 2., 5., 3., 6.]);
    }

    #[test]
    fn min_max_stretches_range() {
        let mut image =
            TensorImage::from_buffer(&[2.0, 4.0, 6.0, 10.0], 2, 2, 1, Layout::ChannelsLast)
                .unwrap();
        normalize_min_max(&mut image);
        let values: Vec<f32> = image.data().iter().copied().collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn min_max_on_constant_field_is_zero() {
        let mut image =
            TensorImage::from_buffer(&[0.7; 6], 2, 3, 1, Layout::ChannelsLast).unwrap();
        normalize_min_max(&mut image);
        assert!(image.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn softmax_picks_the_positive_channel() {
        // interleaved pairs (a, b)
        let image = TensorImage::from_buffer(
            &[0.0, 0.0, 2.0, -2.0],
            1,
            2,
            2,
            Layout::ChannelsLast,
        )
        .unwrap();
        let first = softmax_two_channel(image.clone(), 0);
        assert_eq!(first.channels(), 1);
        assert!((first.plane(0)[[0, 0]] - 0.5).abs() < 1e-6);
        let expected = 2f32.exp() / (2f32.exp() + (-2f32).exp());
        assert!((first.plane(0)[[0, 1]] - expected).abs() < 1e-6);

        let second = softmax_two_channel(image, 1);
        assert!((second.plane(0)[[0, 1]] - (1.0 - expected)).abs() < 1e-6);
    }
}
