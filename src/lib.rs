//! Real-time foreground segmentation and low-light enhancement for live
//! video, driven through ONNX Runtime.

pub mod capture;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod frame;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod session;

pub use config::{EnhanceParams, MaskParams, SessionSettings};
pub use error::{InferenceError, RuntimeError, SessionError, ShapeError};
pub use exchange::FrameExchange;
pub use filter::{BackgroundFilter, EnhanceFilter, FilterCore, VideoFilter};
pub use frame::{BgraFrame, Mask};
pub use model::{ModelDescriptor, ModelKind};
pub use pipeline::{FramePipeline, TickOutcome};
pub use session::{
    AssetResolver, DirAssetResolver, InferenceRuntime, InferenceSession, OrtLoader, RuntimeLoader,
};
