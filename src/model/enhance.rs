//! Low-light enhancement networks. These produce a full RGB image rather
//! than a mask.

use super::adapter::{copy_into_input, map_primary_output, write_scalar_input, ModelAdapter};
use super::shapes;
use super::types::{Layout, OutputRange, TensorImage, TensorShapeSet};
use crate::error::{InferenceError, ShapeError};
use crate::session::{InferenceRuntime, TensorBuffers};
use ndarray::Array3;

/// LOL-style frame size used when the graph has dynamic spatial axes.
const ENHANCE_SIZE: (u32, u32) = (600, 400);

/// Exposure ratio fed to URetinex-Net.
const URETINEX_EXPOSURE: f32 = 5.0;

/// TBEFN: planar input, interleaved output in [0, 1].
#[derive(Debug, Default)]
pub struct Tbefn;

impl ModelAdapter for Tbefn {
    fn name(&self) -> &'static str {
        "tbefn"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn output_layout(&self) -> Layout {
        Layout::ChannelsLast
    }

    fn default_input_size(&self) -> (u32, u32) {
        ENHANCE_SIZE
    }

    fn default_output_channels(&self) -> usize {
        3
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsLast, None)
    }

    fn postprocess(&self, mut image: TensorImage) -> TensorImage {
        image.data_mut().mapv_inplace(|v| v * 255.0);
        image
    }

    fn output_range(&self) -> OutputRange {
        OutputRange::Byte
    }
}

/// Zero-DCE: rank-3 interleaved output already in [0, 255].
#[derive(Debug, Default)]
pub struct ZeroDce;

impl ModelAdapter for ZeroDce {
    fn name(&self) -> &'static str {
        "zerodce"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn output_layout(&self) -> Layout {
        Layout::ChannelsLast
    }

    fn default_input_size(&self) -> (u32, u32) {
        ENHANCE_SIZE
    }

    fn default_output_channels(&self) -> usize {
        3
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsLast, None)
    }

    fn output_range(&self) -> OutputRange {
        OutputRange::Byte
    }
}

/// URetinex-Net: every input and output is bound, input 1 carries the
/// exposure ratio.
#[derive(Debug, Default)]
pub struct URetinex;

impl ModelAdapter for URetinex {
    fn name(&self) -> &'static str {
        "uretinex"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        ENHANCE_SIZE
    }

    fn default_output_channels(&self) -> usize {
        3
    }

    fn resolve_shapes(&self, runtime: &dyn InferenceRuntime) -> Result<TensorShapeSet, ShapeError> {
        let mut shapes = shapes::all_tensors(runtime, 0)?;
        shapes::concretize(
            &mut shapes,
            self.input_layout(),
            self.output_layout(),
            self.default_input_size(),
            self.default_output_channels(),
        );
        shapes::ensure_concrete(&shapes)?;
        Ok(shapes)
    }

    fn load_input(
        &self,
        image: &Array3<f32>,
        buffers: &mut TensorBuffers,
    ) -> Result<(), InferenceError> {
        copy_into_input(image, buffers, 0)?;
        write_scalar_input(buffers, 1, URETINEX_EXPOSURE)
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsFirst, None)
    }

    fn postprocess(&self, image: TensorImage) -> TensorImage {
        image.into_channels_last()
    }
}

/// SGLLIE and any other planar-in, planar-out enhancer.
#[derive(Debug, Default)]
pub struct Sgllie;

impl ModelAdapter for Sgllie {
    fn name(&self) -> &'static str {
        "sgllie"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        ENHANCE_SIZE
    }

    fn default_output_channels(&self) -> usize {
        3
    }

    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, Layout::ChannelsFirst, None)
    }

    fn postprocess(&self, image: TensorImage) -> TensorImage {
        image.into_channels_last()
    }
}
