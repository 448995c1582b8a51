mod adapter;
mod enhance;
pub mod preprocess;
mod rvm;
mod segmentation;
pub mod shapes;
pub mod types;

pub use adapter::{copy_into_input, map_primary_output, write_scalar_input, ModelAdapter};
pub use enhance::{Sgllie, Tbefn, URetinex, ZeroDce};
pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use segmentation::{MediaPipe, ModNet, PpHumanSeg, Rmbg, Selfie, SiNet, TcMonoDepth};
pub use types::{Layout, OutputRange, TensorImage, TensorShapeSet};

use crate::config;
use std::fmt;

/// Every network family this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    SiNet,
    MediaPipe,
    Selfie,
    Rvm,
    PpHumanSeg,
    ModNet,
    Rmbg,
    TcMonoDepth,
    Tbefn,
    URetinex,
    Sgllie,
    ZeroDce,
}

impl ModelKind {
    pub const ALL: [ModelKind; 12] = [
        ModelKind::SiNet,
        ModelKind::MediaPipe,
        ModelKind::Selfie,
        ModelKind::Rvm,
        ModelKind::PpHumanSeg,
        ModelKind::ModNet,
        ModelKind::Rmbg,
        ModelKind::TcMonoDepth,
        ModelKind::Tbefn,
        ModelKind::URetinex,
        ModelKind::Sgllie,
        ModelKind::ZeroDce,
    ];

    /// Logical asset name passed to the asset resolver.
    pub fn asset(self) -> &'static str {
        match self {
            ModelKind::SiNet => config::MODEL_SINET,
            ModelKind::MediaPipe => config::MODEL_MEDIAPIPE,
            ModelKind::Selfie => config::MODEL_SELFIE,
            ModelKind::Rvm => config::MODEL_RVM,
            ModelKind::PpHumanSeg => config::MODEL_PPHUMANSEG,
            ModelKind::ModNet => config::MODEL_MODNET,
            ModelKind::Rmbg => config::MODEL_RMBG,
            ModelKind::TcMonoDepth => config::MODEL_DEPTH_TCMONODEPTH,
            ModelKind::Tbefn => config::MODEL_ENHANCE_TBEFN,
            ModelKind::URetinex => config::MODEL_ENHANCE_URETINEX,
            ModelKind::Sgllie => config::MODEL_ENHANCE_SGLLIE,
            ModelKind::ZeroDce => config::MODEL_ENHANCE_ZERODCE,
        }
    }

    pub fn from_asset(asset: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.asset() == asset)
    }

    /// Short name, as accepted on the command line.
    pub fn name(self) -> &'static str {
        create_adapter(self).name()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Enhancement networks produce an RGB image instead of a mask.
    pub fn is_enhancement(self) -> bool {
        matches!(
            self,
            ModelKind::Tbefn | ModelKind::URetinex | ModelKind::Sgllie | ModelKind::ZeroDce
        )
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Model selection resolved to a family and the asset to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub kind: ModelKind,
    pub asset: String,
}

impl ModelDescriptor {
    /// Accepts either an asset name or a short family name.
    pub fn from_selection(selection: &str) -> Option<Self> {
        let kind = ModelKind::from_asset(selection).or_else(|| ModelKind::from_name(selection))?;
        Some(Self {
            kind,
            asset: kind.asset().to_string(),
        })
    }
}

/// Create the adapter for a model family.
pub fn create_adapter(kind: ModelKind) -> Box<dyn ModelAdapter> {
    match kind {
        ModelKind::SiNet => Box::new(SiNet),
        ModelKind::MediaPipe => Box::new(MediaPipe),
        ModelKind::Selfie => Box::new(Selfie),
        ModelKind::Rvm => Box::new(RobustVideoMatting::default()),
        ModelKind::PpHumanSeg => Box::new(PpHumanSeg),
        ModelKind::ModNet => Box::new(ModNet),
        ModelKind::Rmbg => Box::new(Rmbg),
        ModelKind::TcMonoDepth => Box::new(TcMonoDepth),
        ModelKind::Tbefn => Box::new(Tbefn),
        ModelKind::URetinex => Box::new(URetinex),
        ModelKind::Sgllie => Box::new(Sgllie),
        ModelKind::ZeroDce => Box::new(ZeroDce),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runtime for unit tests.

    use crate::error::RuntimeError;
    use crate::session::{BackendOptions, InferenceRuntime, RuntimeLoader, TensorSpec, TensorView};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Responder = Box<dyn FnMut(&[TensorView<'_>], &mut [Vec<f32>]) + Send>;

    pub struct FakeRuntime {
        inputs: Vec<TensorSpec>,
        outputs: Vec<TensorSpec>,
        responder: Responder,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeRuntime {
        /// Writes a constant 0.5 into every output.
        pub fn new(inputs: Vec<TensorSpec>, outputs: Vec<TensorSpec>) -> Self {
            Self::with_responder(inputs, outputs, |_, outputs| {
                for out in outputs.iter_mut() {
                    out.fill(0.5);
                }
            })
        }

        pub fn with_responder(
            inputs: Vec<TensorSpec>,
            outputs: Vec<TensorSpec>,
            responder: impl FnMut(&[TensorView<'_>], &mut [Vec<f32>]) + Send + 'static,
        ) -> Self {
            Self {
                inputs,
                outputs,
                responder: Box::new(responder),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// A selfie-style model: [1, h, w, 3] in, [1, h, w, 1] out.
        pub fn selfie(width: i64, height: i64) -> Self {
            Self::new(
                vec![TensorSpec::new("input", vec![1, height, width, 3])],
                vec![TensorSpec::new("output", vec![1, height, width, 1])],
            )
        }
    }

    impl InferenceRuntime for FakeRuntime {
        fn inputs(&self) -> &[TensorSpec] {
            &self.inputs
        }

        fn outputs(&self) -> &[TensorSpec] {
            &self.outputs
        }

        fn run(
            &mut self,
            inputs: &[TensorView<'_>],
            _output_names: &[String],
            outputs: &mut [Vec<f32>],
        ) -> Result<(), RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.responder)(inputs, outputs);
            Ok(())
        }
    }

    /// Resolves every asset to a path under `/models-root`.
    pub struct AnyAsset;

    impl crate::session::AssetResolver for AnyAsset {
        fn resolve(&self, logical_name: &str) -> Option<PathBuf> {
            Some(Path::new("/models-root").join(logical_name))
        }
    }

    /// Hands out runtimes built by `make`, and records every load.
    pub struct FakeLoader {
        make: Box<dyn Fn() -> FakeRuntime + Send + Sync>,
        /// Devices for which loading fails.
        pub failing: Vec<crate::session::Device>,
        pub loads: Mutex<Vec<(PathBuf, BackendOptions)>>,
    }

    impl FakeLoader {
        pub fn new(make: impl Fn() -> FakeRuntime + Send + Sync + 'static) -> Self {
            Self {
                make: Box::new(make),
                failing: Vec::new(),
                loads: Mutex::new(Vec::new()),
            }
        }

        pub fn load_count(&self) -> usize {
            self.loads.lock().map(|l| l.len()).unwrap_or(0)
        }
    }

    impl RuntimeLoader for FakeLoader {
        fn load(
            &self,
            model_path: &Path,
            options: &BackendOptions,
        ) -> Result<Box<dyn InferenceRuntime>, RuntimeError> {
            if let Ok(mut loads) = self.loads.lock() {
                loads.push((model_path.to_path_buf(), options.clone()));
            }
            if self.failing.contains(&options.device) {
                return Err(RuntimeError::Backend(format!(
                    "{} provider unavailable",
                    options.device
                )));
            }
            Ok(Box::new((self.make)()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_its_names() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_asset(kind.asset()), Some(kind));
            assert_eq!(ModelKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ModelKind::from_asset("models/unknown.onnx"), None);
    }

    #[test]
    fn selection_accepts_short_names() {
        let descriptor = ModelDescriptor::from_selection("RVM").unwrap();
        assert_eq!(descriptor.kind, ModelKind::Rvm);
        assert_eq!(descriptor.asset, config::MODEL_RVM);
        assert!(ModelDescriptor::from_selection("").is_none());
    }

    #[test]
    fn only_enhancers_are_flagged() {
        assert!(ModelKind::ZeroDce.is_enhancement());
        assert!(!ModelKind::MediaPipe.is_enhancement());
    }
}
