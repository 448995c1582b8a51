//! Tensor shape negotiation with the runtime.
//!
//! Models frequently declare symbolic dimensions (-1, 0) for batch or spatial
//! axes. Buffers can only be sized from concrete values, so every symbolic
//! dimension is replaced by a family default before allocation.

use super::types::{Layout, TensorShapeSet};
use crate::error::ShapeError;
use crate::session::{InferenceRuntime, TensorSpec};

const MIN_RANK: usize = 3;

fn is_symbolic(d: i64) -> bool {
    d <= 0
}

/// Input 0 and output 0 only.
pub fn primary_tensors(runtime: &dyn InferenceRuntime) -> Result<TensorShapeSet, ShapeError> {
    let input = runtime
        .inputs()
        .first()
        .cloned()
        .ok_or(ShapeError::MissingTensor("input", 0))?;
    let output = runtime
        .outputs()
        .first()
        .cloned()
        .ok_or(ShapeError::MissingTensor("output", 0))?;

    let shapes = TensorShapeSet {
        inputs: vec![input],
        outputs: vec![output],
    };
    check_rank(&shapes)?;
    Ok(shapes)
}

/// Every input, and the outputs starting at `first_output`.
pub fn all_tensors(
    runtime: &dyn InferenceRuntime,
    first_output: usize,
) -> Result<TensorShapeSet, ShapeError> {
    let shapes = TensorShapeSet {
        inputs: runtime.inputs().to_vec(),
        outputs: runtime.outputs().iter().skip(first_output).cloned().collect(),
    };
    if shapes.inputs.is_empty() {
        return Err(ShapeError::MissingTensor("input", 0));
    }
    if shapes.outputs.is_empty() {
        return Err(ShapeError::MissingTensor("output", first_output));
    }
    check_rank(&shapes)?;
    Ok(shapes)
}

/// The image tensors (input 0 and output 0) must have rank >= 3.
pub fn check_rank(shapes: &TensorShapeSet) -> Result<(), ShapeError> {
    let input = shapes.inputs.first().map_or(0, |t| t.shape.len());
    let output = shapes.outputs.first().map_or(0, |t| t.shape.len());
    if input < MIN_RANK || output < MIN_RANK {
        tracing::error!(
            "Input or output tensor dims are < 3. input = {}, output = {}",
            input,
            output
        );
        return Err(ShapeError::RankTooSmall { input, output });
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Axis {
    Batch,
    Height,
    Width,
    Channel,
}

fn axis_roles(rank: usize, layout: Layout) -> Vec<Axis> {
    use Axis::*;
    match (rank, layout) {
        (4, Layout::ChannelsLast) => vec![Batch, Height, Width, Channel],
        (4, Layout::ChannelsFirst) => vec![Batch, Channel, Height, Width],
        (3, Layout::ChannelsLast) => vec![Height, Width, Channel],
        (3, Layout::ChannelsFirst) => vec![Channel, Height, Width],
        (rank, _) => vec![Batch; rank],
    }
}

fn fill_image_dims(spec: &mut TensorSpec, layout: Layout, size: (i64, i64), channels: i64) {
    let roles = axis_roles(spec.shape.len(), layout);
    for (dim, role) in spec.shape.iter_mut().zip(roles) {
        if is_symbolic(*dim) {
            *dim = match role {
                Axis::Batch => 1,
                Axis::Height => size.1,
                Axis::Width => size.0,
                Axis::Channel => channels,
            };
        }
    }
}

/// Replace symbolic dimensions with concrete values.
///
/// Input 0 takes `default_size` (width, height) and 3 channels. Output 0
/// takes the resolved input spatial size and `output_channels`. Any other
/// tensor gets 1.
pub fn concretize(
    shapes: &mut TensorShapeSet,
    input_layout: Layout,
    output_layout: Layout,
    default_size: (u32, u32),
    output_channels: usize,
) {
    let default_size = (default_size.0 as i64, default_size.1 as i64);

    if let Some(input) = shapes.inputs.first_mut() {
        fill_image_dims(input, input_layout, default_size, 3);
    }
    let input_size = shapes
        .inputs
        .first()
        .and_then(|t| input_layout.spatial(&t.shape))
        .map(|(h, w, _)| (w as i64, h as i64))
        .unwrap_or(default_size);
    if let Some(output) = shapes.outputs.first_mut() {
        fill_image_dims(output, output_layout, input_size, output_channels as i64);
    }

    for spec in shapes
        .inputs
        .iter_mut()
        .skip(1)
        .chain(shapes.outputs.iter_mut().skip(1))
    {
        for dim in spec.shape.iter_mut() {
            if is_symbolic(*dim) {
                *dim = 1;
            }
        }
    }
}

/// Fails if any dimension is still symbolic.
pub fn ensure_concrete(shapes: &TensorShapeSet) -> Result<(), ShapeError> {
    let tagged = shapes
        .inputs
        .iter()
        .enumerate()
        .map(|(i, t)| ("input", i, t))
        .chain(shapes.outputs.iter().enumerate().map(|(i, t)| ("output", i, t)));
    for (kind, index, spec) in tagged {
        if spec.shape.iter().any(|&d| is_symbolic(d)) {
            return Err(ShapeError::Symbolic {
                kind,
                index,
                name: spec.name.clone(),
                dims: spec.shape.clone(),
            });
        }
    }
    Ok(())
}
