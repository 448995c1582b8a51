use crate::error::RuntimeError;
use std::path::Path;

use super::device::BackendOptions;

/// A tensor as declared by the model. Negative or zero dimensions are symbolic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}

/// A borrowed input handed to the runtime for one call.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub name: &'a str,
    pub shape: &'a [i64],
    pub data: &'a [f32],
}

/// A loaded network: "given named input buffers and shapes, produce named
/// output buffers".
pub trait InferenceRuntime: Send {
    /// Declared inputs in model order.
    fn inputs(&self) -> &[TensorSpec];

    /// Declared outputs in model order.
    fn outputs(&self) -> &[TensorSpec];

    /// Run once. `outputs[i]` receives the values of `output_names[i]` and
    /// must already be sized for them.
    fn run(
        &mut self,
        inputs: &[TensorView<'_>],
        output_names: &[String],
        outputs: &mut [Vec<f32>],
    ) -> Result<(), RuntimeError>;
}

/// Builds runtimes from model files.
pub trait RuntimeLoader: Send + Sync {
    fn load(
        &self,
        model_path: &Path,
        options: &BackendOptions,
    ) -> Result<Box<dyn InferenceRuntime>, RuntimeError>;
}
