use super::device::{BackendOptions, Device};
use super::runtime::{InferenceRuntime, RuntimeLoader, TensorSpec, TensorView};
use crate::error::RuntimeError;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, DirectMLExecutionProvider,
    ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Once;

static ORT_INIT: Once = Once::new();

/// Initialise the process-wide ONNX Runtime environment once.
fn ensure_environment() {
    ORT_INIT.call_once(|| {
        if let Err(e) = ort::init().with_name("livemask-inference").commit() {
            tracing::warn!("Failed to configure ONNX Runtime environment: {}", e);
        }
    });
}

/// Loads ONNX models through ONNX Runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtLoader;

impl OrtLoader {
    fn execution_provider(device: Device) -> Option<ExecutionProviderDispatch> {
        let ep = match device {
            Device::Cpu => return None,
            Device::Cuda => CUDAExecutionProvider::default().build(),
            Device::TensorRt => TensorRTExecutionProvider::default().build(),
            Device::DirectMl => DirectMLExecutionProvider::default().build(),
            Device::CoreMl => CoreMLExecutionProvider::default().build(),
        };
        Some(ep.error_on_failure())
    }

    fn builder(options: &BackendOptions) -> Result<SessionBuilder, RuntimeError> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        if let Some(threads) = options.inter_threads {
            builder = builder.with_inter_threads(threads)?;
        }
        if let Some(threads) = options.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        if !options.memory_pattern {
            builder = builder.with_memory_pattern(false)?;
        }
        if options.sequential {
            builder = builder.with_parallel_execution(false)?;
        }
        if let Some(ep) = Self::execution_provider(options.device) {
            builder = builder.with_execution_providers([ep])?;
        }
        Ok(builder)
    }
}

impl RuntimeLoader for OrtLoader {
    fn load(
        &self,
        model_path: &Path,
        options: &BackendOptions,
    ) -> Result<Box<dyn InferenceRuntime>, RuntimeError> {
        ensure_environment();

        tracing::info!(
            "Loading model from {} on {}",
            model_path.display(),
            options.device
        );

        // Provider registration can abort inside the native library; keep that
        // from unwinding into the host.
        let build = || -> Result<Session, RuntimeError> {
            Ok(Self::builder(options)?.commit_from_file(model_path)?)
        };
        let session = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)) {
            Ok(result) => result?,
            Err(_) => {
                return Err(RuntimeError::Backend(
                    "ONNX Runtime panicked while building session".into(),
                ))
            }
        };

        Ok(Box::new(OrtRuntime::new(session)))
    }
}

/// An ONNX Runtime session plus its declared tensor metadata.
pub struct OrtRuntime {
    session: Session,
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
}

impl OrtRuntime {
    pub fn new(session: Session) -> Self {
        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                let shape = input
                    .input_type
                    .tensor_shape()
                    .map(|shape| shape.to_vec())
                    .unwrap_or_default();
                TensorSpec::new(input.name.clone(), shape)
            })
            .collect();
        let outputs = session
            .outputs
            .iter()
            .map(|output| {
                let shape = output
                    .output_type
                    .tensor_shape()
                    .map(|shape| shape.to_vec())
                    .unwrap_or_default();
                TensorSpec::new(output.name.clone(), shape)
            })
            .collect();

        Self {
            session,
            inputs,
            outputs,
        }
    }
}

/// Bind a session buffer as an input tensor without copying it.
fn borrow_tensor<'v>(view: &TensorView<'v>) -> Result<TensorRef<'v, f32>, RuntimeError> {
    Ok(TensorRef::from_array_view((view.shape.to_vec(), view.data))?)
}

impl InferenceRuntime for OrtRuntime {
    fn inputs(&self) -> &[TensorSpec] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorSpec] {
        &self.outputs
    }

    fn run(
        &mut self,
        inputs: &[TensorView<'_>],
        output_names: &[String],
        outputs: &mut [Vec<f32>],
    ) -> Result<(), RuntimeError> {
        let _span = tracing::debug_span!("ort_run").entered();

        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for view in inputs {
            let tensor = borrow_tensor(view)?;
            values.push((Cow::Borrowed(view.name), tensor.into_dyn().into()));
        }

        let results = self.session.run(SessionInputs::from(values))?;

        for (name, buffer) in output_names.iter().zip(outputs.iter_mut()) {
            let value = results
                .get(name.as_str())
                .ok_or_else(|| RuntimeError::UnknownOutput(name.clone()))?;
            let (_, data) = value.try_extract_tensor::<f32>()?;
            if data.len() != buffer.len() {
                return Err(RuntimeError::OutputSize {
                    name: name.clone(),
                    expected: buffer.len(),
                    actual: data.len(),
                });
            }
            buffer.copy_from_slice(data);
        }

        Ok(())
    }
}
