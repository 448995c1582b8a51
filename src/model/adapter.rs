use super::preprocess::hwc_to_chw;
use super::shapes;
use super::types::{Layout, OutputRange, TensorImage, TensorShapeSet};
use crate::error::{InferenceError, RuntimeError, ShapeError};
use crate::session::{InferenceRuntime, TensorBuffers, TensorView};
use ndarray::Array3;

/// Per-architecture hooks around a single inference call.
///
/// The defaults describe a channels-last network with one image input and
/// one single-channel output whose input is scaled to [0, 1]. Families
/// override only the hooks where they differ.
pub trait ModelAdapter: Send {
    fn name(&self) -> &'static str;

    /// Layout of input tensor 0.
    fn input_layout(&self) -> Layout {
        Layout::ChannelsLast
    }

    /// Layout of output tensor 0.
    fn output_layout(&self) -> Layout {
        self.input_layout()
    }

    /// Input size (width, height) used when the model leaves it symbolic.
    fn default_input_size(&self) -> (u32, u32) {
        (256, 256)
    }

    /// Channel count of output tensor 0 when the model leaves it symbolic.
    fn default_output_channels(&self) -> usize {
        1
    }

    /// Negotiate names and concrete shapes with the runtime.
    fn resolve_shapes(&self, runtime: &dyn InferenceRuntime) -> Result<TensorShapeSet, ShapeError> {
        let mut shapes = shapes::primary_tensors(runtime)?;
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

    /// Network input (width, height).
    fn input_size(&self, shapes: &TensorShapeSet) -> (u32, u32) {
        shapes
            .inputs
            .first()
            .and_then(|t| self.input_layout().spatial(&t.shape))
            .map(|(h, w, _)| (w as u32, h as u32))
            .unwrap_or_else(|| self.default_input_size())
    }

    /// Scale an interleaved RGB image in [0, 255]. Channels-first families
    /// return planar data.
    fn preprocess(&self, resized: Array3<f32>) -> Array3<f32> {
        let scaled = resized / 255.0;
        match self.input_layout() {
            Layout::ChannelsLast => scaled,
            Layout::ChannelsFirst => hwc_to_chw(scaled),
        }
    }

    /// Copy the preprocessed image into input tensor 0.
    fn load_input(
        &self,
        image: &Array3<f32>,
        buffers: &mut TensorBuffers,
    ) -> Result<(), InferenceError> {
        copy_into_input(image, buffers, 0)
    }

    /// Run the session once. Returns `Ok(false)` without calling the
    /// runtime when any name or tensor list is empty.
    fn run_inference(
        &self,
        runtime: &mut dyn InferenceRuntime,
        shapes: &TensorShapeSet,
        buffers: &mut TensorBuffers,
    ) -> Result<bool, RuntimeError> {
        if shapes.inputs.is_empty()
            || shapes.outputs.is_empty()
            || buffers.inputs.is_empty()
            || buffers.outputs.is_empty()
        {
            tracing::info!("Skip network inference. Inputs or outputs are null.");
            return Ok(false);
        }

        let views: Vec<TensorView<'_>> = shapes
            .inputs
            .iter()
            .zip(&buffers.inputs)
            .map(|(spec, data)| TensorView {
                name: &spec.name,
                shape: &spec.shape,
                data,
            })
            .collect();
        let output_names = shapes.output_names();

        runtime.run(&views, &output_names, &mut buffers.outputs)?;
        Ok(true)
    }

    /// View output tensor 0 as an image. Mask models read the first
    /// channel only.
    fn map_output(
        &self,
        shapes: &TensorShapeSet,
        buffers: &TensorBuffers,
    ) -> Result<TensorImage, InferenceError> {
        map_primary_output(shapes, buffers, self.output_layout(), Some(1))
    }

    /// Carry recurrent state from this call's outputs into the next call's
    /// inputs.
    fn propagate_state(&self, _buffers: &mut TensorBuffers) {}

    /// Forget any recurrent state.
    fn reset_state(&self, _buffers: &mut TensorBuffers) {}

    fn postprocess(&self, image: TensorImage) -> TensorImage {
        image
    }

    fn output_range(&self) -> OutputRange {
        OutputRange::Unit
    }
}

/// Copy `image` in logical order into input tensor `index`.
pub fn copy_into_input(
    image: &Array3<f32>,
    buffers: &mut TensorBuffers,
    index: usize,
) -> Result<(), InferenceError> {
    let target = buffers
        .inputs
        .get_mut(index)
        .ok_or_else(|| InferenceError::Layout(format!("no input tensor {index}")))?;
    if target.len() != image.len() {
        return Err(InferenceError::Layout(format!(
            "input tensor {} holds {} values, image has {}",
            index,
            target.len(),
            image.len()
        )));
    }
    for (dst, src) in target.iter_mut().zip(image.iter()) {
        *dst = *src;
    }
    Ok(())
}

/// Write a scalar into the first element of input tensor `index`.
pub fn write_scalar_input(
    buffers: &mut TensorBuffers,
    index: usize,
    value: f32,
) -> Result<(), InferenceError> {
    let slot = buffers
        .inputs
        .get_mut(index)
        .and_then(|t| t.first_mut())
        .ok_or_else(|| InferenceError::Layout(format!("no scalar input tensor {index}")))?;
    *slot = value;
    Ok(())
}

/// Output tensor 0 wrapped with the dimensions its shape declares.
/// `channels` overrides the declared channel count.
pub fn map_primary_output(
    shapes: &TensorShapeSet,
    buffers: &TensorBuffers,
    layout: Layout,
    channels: Option<usize>,
) -> Result<TensorImage, InferenceError> {
    let spec = shapes
        .outputs
        .first()
        .ok_or_else(|| InferenceError::Layout("no output tensor".into()))?;
    let buffer = buffers
        .outputs
        .first()
        .ok_or_else(|| InferenceError::Layout("no output buffer".into()))?;
    let (height, width, declared) = layout.spatial(&spec.shape).ok_or_else(|| {
        InferenceError::Layout(format!("output shape {:?} is not an image", spec.shape))
    })?;
    TensorImage::from_buffer(buffer, height, width, channels.unwrap_or(declared), layout)
}
