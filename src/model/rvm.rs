use super::adapter::{copy_into_input, write_scalar_input, ModelAdapter};
use super::shapes;
use super::types::{Layout, TensorShapeSet};
use crate::error::{InferenceError, ShapeError};
use crate::session::{InferenceRuntime, TensorBuffers};
use ndarray::Array3;

const BASE_WIDTH: i64 = 320;
const BASE_HEIGHT: i64 = 192;

/// Channels of the recurrent states r1..r4.
const STATE_CHANNELS: [i64; 4] = [16, 20, 40, 64];

const STATE_COUNT: usize = STATE_CHANNELS.len();

/// Index of the downsample ratio scalar among the inputs.
const RATIO_INPUT: usize = STATE_COUNT + 1;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) come back as outputs 1-4 and are fed into inputs
/// 1-4 of the next frame. The foreground output is never read, so output 0
/// of the resolved set is the alpha matte.
#[derive(Debug)]
pub struct RobustVideoMatting {
    downsample_ratio: f32,
}

impl Default for RobustVideoMatting {
    fn default() -> Self {
        Self {
            downsample_ratio: 1.0,
        }
    }
}

/// Spatial size of recurrent state `i` (1-based), halving per level.
fn state_size(i: usize) -> (i64, i64) {
    let div = 2i64 << (i - 1);
    (BASE_HEIGHT / div, BASE_WIDTH / div)
}

fn set_dims(shape: &mut [i64], channels: i64, (height, width): (i64, i64)) {
    if shape.len() == 4 {
        shape[0] = 1;
        if shape[1] <= 0 {
            shape[1] = channels;
        }
        shape[2] = height;
        shape[3] = width;
    }
}

impl ModelAdapter for RobustVideoMatting {
    fn name(&self) -> &'static str {
        "rvm"
    }

    fn input_layout(&self) -> Layout {
        Layout::ChannelsFirst
    }

    fn default_input_size(&self) -> (u32, u32) {
        (BASE_WIDTH as u32, BASE_HEIGHT as u32)
    }

    fn resolve_shapes(&self, runtime: &dyn InferenceRuntime) -> Result<TensorShapeSet, ShapeError> {
        // fgr is skipped: outputs start at pha
        let mut shapes = shapes::all_tensors(runtime, 1)?;
        if shapes.inputs.len() <= RATIO_INPUT {
            return Err(ShapeError::MissingTensor("input", RATIO_INPUT));
        }
        if shapes.outputs.len() <= STATE_COUNT {
            return Err(ShapeError::MissingTensor("output", STATE_COUNT + 1));
        }

        let base = (BASE_HEIGHT, BASE_WIDTH);
        set_dims(&mut shapes.inputs[0].shape, 3, base);
        set_dims(&mut shapes.outputs[0].shape, 1, base);
        for (i, &channels) in STATE_CHANNELS.iter().enumerate() {
            let level = i + 1;
            set_dims(&mut shapes.inputs[level].shape, channels, state_size(level));
            set_dims(&mut shapes.outputs[level].shape, channels, state_size(level));
        }

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

    fn preprocess(&self, resized: Array3<f32>) -> Array3<f32> {
        super::preprocess::hwc_to_chw(resized / 255.0)
    }

    fn load_input(
        &self,
        image: &Array3<f32>,
        buffers: &mut TensorBuffers,
    ) -> Result<(), InferenceError> {
        copy_into_input(image, buffers, 0)?;
        write_scalar_input(buffers, RATIO_INPUT, self.downsample_ratio)
    }

    fn propagate_state(&self, buffers: &mut TensorBuffers) {
        for level in 1..=STATE_COUNT {
            if let (Some(state), Some(next)) =
                (buffers.outputs.get(level), buffers.inputs.get_mut(level))
            {
                if state.len() == next.len() {
                    next.copy_from_slice(state);
                } else {
                    tracing::warn!(
                        "Recurrent state {} size mismatch: {} vs {}",
                        level,
                        state.len(),
                        next.len()
                    );
                }
            }
        }
    }

    fn reset_state(&self, buffers: &mut TensorBuffers) {
        tracing::info!("Resetting RVM hidden states");
        for state in buffers.inputs.iter_mut().skip(1).take(STATE_COUNT) {
            state.fill(0.0);
        }
    }
}
