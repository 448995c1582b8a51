mod assets;
mod buffers;
mod device;
mod ort_runtime;
mod runtime;

pub use assets::{AssetResolver, DirAssetResolver};
pub use buffers::{element_count, TensorBuffers};
pub use device::{BackendOptions, Device};
pub use ort_runtime::{OrtLoader, OrtRuntime};
pub use runtime::{InferenceRuntime, RuntimeLoader, TensorSpec, TensorView};

use crate::config::SessionSettings;
use crate::error::{InferenceError, SessionError};
use crate::frame::{BgraFrame, Mask};
use crate::model::{
    create_adapter, ModelAdapter, ModelDescriptor, OutputRange, Preprocessor, TensorImage,
    TensorShapeSet,
};
use image::RgbImage;
use std::path::Path;

/// A loaded network together with everything sized from it. Built whole,
/// replaced whole; never patched in place.
pub struct InferenceSession {
    runtime: Box<dyn InferenceRuntime>,
    adapter: Box<dyn ModelAdapter>,
    shapes: TensorShapeSet,
    buffers: TensorBuffers,
    descriptor: ModelDescriptor,
    device: Device,
    preprocessor: Preprocessor,
}

impl InferenceSession {
    /// Resolve the model, start a runtime on the requested device and size
    /// the tensor buffers.
    pub fn create(
        settings: &SessionSettings,
        resolver: &dyn AssetResolver,
        loader: &dyn RuntimeLoader,
    ) -> Result<Self, SessionError> {
        let descriptor = ModelDescriptor::from_selection(&settings.model).ok_or_else(|| {
            tracing::error!("Model object is not initialized ({:?})", settings.model);
            SessionError::ModelNotSet(settings.model.clone())
        })?;
        let adapter = create_adapter(descriptor.kind);

        let path = resolver
            .resolve(&descriptor.asset)
            .ok_or_else(|| SessionError::AssetNotFound(descriptor.asset.clone()))?;

        let requested: Device = settings.device.parse().map_err(|e: String| {
            tracing::error!("{}", e);
            SessionError::Startup(e)
        })?;
        let (runtime, device) = start_runtime(loader, &path, requested, settings)?;

        let shapes = adapter.resolve_shapes(runtime.as_ref()).map_err(|e| {
            tracing::error!("Unable to resolve tensor shapes: {}", e);
            SessionError::from(e)
        })?;
        for (i, spec) in shapes.inputs.iter().enumerate() {
            tracing::info!("Model {} input {}: name {} shape {:?}", adapter.name(), i, spec.name, spec.shape);
        }
        for (i, spec) in shapes.outputs.iter().enumerate() {
            tracing::info!("Model {} output {}: name {} shape {:?}", adapter.name(), i, spec.name, spec.shape);
        }

        let buffers = TensorBuffers::allocate(&shapes);
        let (width, height) = adapter.input_size(&shapes);
        tracing::info!(
            "Session ready: {} on {}, network input {}x{}",
            descriptor.kind,
            device,
            width,
            height
        );

        Ok(Self {
            runtime,
            adapter,
            shapes,
            buffers,
            descriptor,
            device,
            preprocessor: Preprocessor::new(width, height),
        })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Device the runtime actually started on.
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shapes(&self) -> &TensorShapeSet {
        &self.shapes
    }

    pub fn buffers(&self) -> &TensorBuffers {
        &self.buffers
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.adapter.input_size(&self.shapes)
    }

    pub fn output_range(&self) -> OutputRange {
        self.adapter.output_range()
    }

    /// Run one frame through the model at network resolution. `Ok(None)`
    /// means the adapter skipped the call.
    pub fn infer(&mut self, frame: &BgraFrame) -> Result<Option<TensorImage>, InferenceError> {
        let resized = self.preprocessor.prepare(frame);
        let prepared = self.adapter.preprocess(resized);
        self.adapter.load_input(&prepared, &mut self.buffers)?;

        let ran = {
            let _span = tracing::debug_span!("inference").entered();
            self.adapter
                .run_inference(self.runtime.as_mut(), &self.shapes, &mut self.buffers)?
        };
        if !ran {
            return Ok(None);
        }

        let output = self.adapter.map_output(&self.shapes, &self.buffers)?;
        self.adapter.propagate_state(&mut self.buffers);

        let _span = tracing::debug_span!("postprocess").entered();
        Ok(Some(self.adapter.postprocess(output)))
    }

    /// Channel 0 of the output as 8-bit, at network resolution.
    pub fn infer_mask(&mut self, frame: &BgraFrame) -> Result<Option<Mask>, InferenceError> {
        let range = self.output_range();
        Ok(self.infer(frame)?.map(|image| image.to_gray(range)))
    }

    /// The output as 8-bit RGB, at network resolution.
    pub fn infer_rgb(&mut self, frame: &BgraFrame) -> Result<Option<RgbImage>, InferenceError> {
        let range = self.output_range();
        Ok(self.infer(frame)?.map(|image| image.to_rgb(range)))
    }

    /// Clear recurrent state, e.g. after the source resolution changed.
    pub fn reset_state(&mut self) {
        self.adapter.reset_state(&mut self.buffers);
    }
}

/// Load on the requested device, retrying once on CPU when an accelerator
/// fails and the settings allow it.
fn start_runtime(
    loader: &dyn RuntimeLoader,
    path: &Path,
    device: Device,
    settings: &SessionSettings,
) -> Result<(Box<dyn InferenceRuntime>, Device), SessionError> {
    let options = BackendOptions::for_device(device, settings.threads);
    match loader.load(path, &options) {
        Ok(runtime) => Ok((runtime, device)),
        Err(e) if device.is_accelerator() && settings.fallback_to_cpu => {
            tracing::warn!("{} session failed to start ({}), falling back to CPU", device, e);
            let options = BackendOptions::for_device(Device::Cpu, settings.threads);
            loader
                .load(path, &options)
                .map(|runtime| (runtime, Device::Cpu))
                .map_err(|e| {
                    tracing::error!("{}", e);
                    SessionError::Startup(e.to_string())
                })
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(SessionError::Startup(e.to_string()))
        }
    }
}
