//! Single-frame person segmentation networks.

use super::adapter::{map_primary_output, ModelAdapter};
use super::preprocess::{hwc_to_chw, normalize_channels, normalize_min_max, softmax_two_channel};
use super::types::{Layout, TensorImage, TensorShapeSet};
use crate::error::{InferenceError, ShapeError};
use crate::session::{InferenceRuntime, TensorBuffers};
use ndarray::Array3;

/// Google selfie segmentation, channels-last with a single probability map.
#[derive(Debug, Default)]
pub struct Selfie;

impl ModelAdapter for Selfie {
    fn name(&self) -> &'static str {
        "selfie"
    }

    fn postprocess(&self, mut image: TensorImage) -> TensorImage {
        normalize_min_max(&mut image);
        image
    }
}

/// MediaPipe segmentation: two-channel logits, channel 0 is the person.
#[derive(Debug, Default)]
pub struct MediaPipe;

impl ModelAdapter for MediaPipe {
    fn name(&self) -> &'static str {
        "mediapipe"
    }

    fn default_input_size(&self) -> (u32, u32) {
        (256, 144)
    }

    fn default_output_channels(&self) -> usize {
        2
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsLast, Some(2))
    }

    fn postprocess(&self, image: TensorImage) -> TensorImage {
        let mut image = softmax_two_channel(image, 0);
        normalize_min_max(&mut image);
        image
    }
}

/// PaddlePaddle PP-HumanSeg. Planar input, interleaved two-channel output
/// where channel 1 is the person.
#[derive(Debug, Default)]
pub struct PpHumanSeg;

impl ModelAdapter for PpHumanSeg {
    fn name(&self) -> &'static str {
        "pphumanseg"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn output_layout(&self) -> Layout {
        Layout::ChannelsLast
    }

    fn default_input_size(&self) -> (u32, u32) {
        (192, 192)
    }

    fn default_output_channels(&self) -> usize {
        2
    }

    fn preprocess(&self, resized: Array3<f32>) -> Array3<f32> {
        let mut image = resized / 256.0;
        normalize_channels(&mut image, [0.5; 3], [2.0; 3]);
        hwc_to_chw(image)
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsLast, Some(2))
    }

    fn postprocess(&self, image: TensorImage) -> TensorImage {
        let mut image = softmax_two_channel(image, 1);
        normalize_min_max(&mut image);
        image
    }
}

const SINET_MEAN: [f32; 3] = [102.890434, 111.25247, 126.91212];
const SINET_STD: [f32; 3] = [62.93292, 62.82138, 66.355705];

/// SINet portrait segmentation.
#[derive(Debug, Default)]
pub struct SiNet;

impl ModelAdapter for SiNet {
    fn name(&self) -> &'static str {
        "sinet"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        (320, 320)
    }

    fn preprocess(&self, mut resized: Array3<f32>) -> Array3<f32> {
        let scale = SINET_STD.map(|s| 1.0 / s / 255.0);
        normalize_channels(&mut resized, SINET_MEAN, scale);
        hwc_to_chw(resized)
    }
}

/// MODNet matting, input in [-1, 1].
#[derive(Debug, Default)]
pub struct ModNet;

impl ModelAdapter for ModNet {
    fn name(&self) -> &'static str {
        "modnet"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn preprocess(&self, mut resized: Array3<f32>) -> Array3<f32> {
        normalize_channels(&mut resized, [127.5; 3], [1.0 / 127.5; 3]);
        hwc_to_chw(resized)
    }
}

/// BRIA background removal. The output matte always matches the input
/// spatial size, whatever the graph declares.
#[derive(Debug, Default)]
pub struct Rmbg;

impl ModelAdapter for Rmbg {
    fn name(&self) -> &'static str {
        "rmbg"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        (1024, 1024)
    }

    fn resolve_shapes(&self, runtime: &dyn InferenceRuntime) -> Result<TensorShapeSet, ShapeError> {
        let mut shapes = super::shapes::primary_tensors(runtime)?;
        super::shapes::concretize(
            &mut shapes,
            self.input_layout(),
            self.output_layout(),
            self.default_input_size(),
            self.default_output_channels(),
        );
        let input = shapes.inputs[0].shape.clone();
        if let Some(output) = shapes.outputs.first_mut() {
            if output.shape.len() == 4 && input.len() == 4 {
                output.shape[2] = input[2];
                output.shape[3] = input[3];
            }
        }
        super::shapes::ensure_concrete(&shapes)?;
        Ok(shapes)
    }
}

/// TCMonoDepth relative depth. Takes raw [0, 255] input; the depth map is
/// stretched to [0, 1].
#[derive(Debug, Default)]
pub struct TcMonoDepth;

impl ModelAdapter for TcMonoDepth {
    fn name(&self) -> &'static str {
        "tcmonodepth"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        (320, 192)
    }

    fn preprocess(&self, resized: Array3<f32>) -> Array3<f32> {
        hwc_to_chw(resized)
    }

    fn postprocess(&self, mut image: TensorImage) -> TensorImage {
        normalize_min_max(&mut image);
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::FakeRuntime;
    use crate::session::TensorSpec;

    fn flat_rgb(h: usize, w: usize, rgb: [f32; 3]) -> Array3<f32> {
        Array3::from_shape_fn((h, w, 3), |(_, _, c)| rgb[c])
    }

    #[test]
    fn sinet_centres_on_its_mean() {
        let out = SiNet.preprocess(flat_rgb(2, 2, SINET_MEAN));
        assert_eq!(out.dim(), (3, 2, 2));
        assert!(out.iter().all(|v| v.abs() < 1e-5));

        let out = SiNet.preprocess(flat_rgb(1, 1, [102.890434 + 62.93292, 0.0, 0.0]));
        assert!((out[[0, 0, 0]] - 1.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn modnet_maps_to_signed_unit_range() {
        let out = ModNet.preprocess(flat_rgb(1, 2, [0.0, 127.5, 255.0]));
        assert_eq!(out.dim(), (3, 1, 2));
        assert_eq!(out[[0, 0, 1]], -1.0);
        assert_eq!(out[[1, 0, 0]], 0.0);
        assert_eq!(out[[2, 0, 1]], 1.0);
    }

    #[test]
    fn pphumanseg_centres_at_128() {
        let out = PpHumanSeg.preprocess(flat_rgb(1, 1, [128.0, 0.0, 256.0]));
        assert_eq!(out.dim(), (3, 1, 1));
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[1, 0, 0]], -1.0);
        assert_eq!(out[[2, 0, 0]], 1.0);
    }

    #[test]
    fn mediapipe_softmax_then_stretch() {
        let shapes = TensorShapeSet {
            inputs: vec![TensorSpec::new("in", vec![1, 1, 2, 3])],
            outputs: vec![TensorSpec::new("out", vec![1, 1, 2, 2])],
        };
        let buffers = TensorBuffers {
            inputs: vec![vec![0.0; 6]],
            outputs: vec![vec![3.0, -3.0, -1.0, 1.0]],
        };
        let mapped = MediaPipe.map_output(&shapes, &buffers).unwrap();
        assert_eq!(mapped.channels(), 2);
        let mask = MediaPipe.postprocess(mapped);
        assert_eq!(mask.channels(), 1);
        assert_eq!(mask.plane(0)[[0, 0]], 1.0);
        assert_eq!(mask.plane(0)[[0, 1]], 0.0);
    }

    #[test]
    fn normalized_single_channel_survives_postprocess() {
        let values = [0.0, 0.25, 0.75, 1.0];
        let image = TensorImage::from_buffer(&values, 2, 2, 1, Layout::ChannelsLast).unwrap();
        for adapter in [&MediaPipe as &dyn ModelAdapter, &PpHumanSeg, &Selfie] {
            let out = adapter.postprocess(image.clone());
            assert_eq!(out, image, "{}", adapter.name());
        }
    }

    #[test]
    fn rmbg_output_follows_input_size() {
        let runtime = FakeRuntime::new(
            vec![TensorSpec::new("input", vec![-1, 3, -1, -1])],
            vec![TensorSpec::new("output", vec![1, 1, 512, 512])],
        );
        let shapes = Rmbg.resolve_shapes(&runtime).unwrap();
        assert_eq!(shapes.inputs[0].shape, vec![1, 3, 1024, 1024]);
        assert_eq!(shapes.outputs[0].shape, vec![1, 1, 1024, 1024]);
        assert_eq!(Rmbg.input_size(&shapes), (1024, 1024));
    }

    #[test]
    fn input_size_reads_the_layout() {
        let shapes = TensorShapeSet {
            inputs: vec![TensorSpec::new("in", vec![1, 144, 256, 3])],
            outputs: vec![TensorSpec::new("out", vec![1, 144, 256, 2])],
        };
        assert_eq!(MediaPipe.input_size(&shapes), (256, 144));

        let shapes = TensorShapeSet {
            inputs: vec![TensorSpec::new("in", vec![1, 3, 320, 480])],
            outputs: vec![TensorSpec::new("out", vec![1, 1, 320, 480])],
        };
        assert_eq!(SiNet.input_size(&shapes), (480, 320));
    }

    #[test]
    fn resolution_is_deterministic() {
        let runtime = FakeRuntime::new(
            vec![TensorSpec::new("in", vec![-1, 256, 256, 3])],
            vec![TensorSpec::new("out", vec![-1, 256, 256, 1])],
        );
        let first = Selfie.resolve_shapes(&runtime).unwrap();
        let second = Selfie.resolve_shapes(&runtime).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.inputs[0].shape, vec![1, 256, 256, 3]);
    }
}
