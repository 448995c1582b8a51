//! User-facing settings and their defaults.
//!
//! Session settings (model, device, threads) force a session rebuild when they
//! change. Mask and enhance parameters are re-applied on every change without
//! touching the session.

pub const MODEL_SINET: &str = "models/SINet_Softmax_simple.onnx";
pub const MODEL_MEDIAPIPE: &str = "models/mediapipe.onnx";
pub const MODEL_SELFIE: &str = "models/selfie_segmentation.onnx";
pub const MODEL_RVM: &str = "models/rvm_mobilenetv3_fp32.onnx";
pub const MODEL_PPHUMANSEG: &str = "models/pphumanseg_fp32.onnx";
pub const MODEL_MODNET: &str = "models/modnet_simple.onnx";
pub const MODEL_RMBG: &str = "models/bria_rmbg_1_4_qint8.onnx";
pub const MODEL_DEPTH_TCMONODEPTH: &str = "models/tcmonodepth_tcsmallnet_192x320.onnx";
pub const MODEL_ENHANCE_TBEFN: &str = "models/tbefn_fp32.onnx";
pub const MODEL_ENHANCE_URETINEX: &str = "models/uretinex_net_180x320.onnx";
pub const MODEL_ENHANCE_SGLLIE: &str = "models/semantic_guided_llie_180x324.onnx";
pub const MODEL_ENHANCE_ZERODCE: &str = "models/zero_dce_180x320.onnx";

pub const USEGPU_CPU: &str = "cpu";
pub const USEGPU_CUDA: &str = "cuda";
pub const USEGPU_TENSORRT: &str = "tensorrt";
pub const USEGPU_DML: &str = "dml";
pub const USEGPU_COREML: &str = "coreml";

/// Settings that identify an inference session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Logical asset name of the model, e.g. [`MODEL_MEDIAPIPE`].
    pub model: String,
    /// Device name, one of the `USEGPU_*` constants.
    pub device: String,
    /// Inter/intra-op thread count on CPU. 0 lets the runtime decide.
    pub threads: u32,
    /// Retry on CPU when an accelerator session fails to start.
    pub fallback_to_cpu: bool,
}

impl SessionSettings {
    pub fn new(model: impl Into<String>, device: impl Into<String>, threads: u32) -> Self {
        Self {
            model: model.into(),
            device: device.into(),
            threads,
            fallback_to_cpu: true,
        }
    }

    /// Whether switching from `self` to `other` needs a new session.
    pub fn requires_rebuild(&self, other: &SessionSettings) -> bool {
        self.model.is_empty()
            || self.model != other.model
            || self.device != other.device
            || self.threads != other.threads
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(MODEL_MEDIAPIPE, USEGPU_CPU, 1)
    }
}

/// Mask refinement parameters of the background filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskParams {
    pub enable_threshold: bool,
    /// Foreground probability threshold in [0, 1].
    pub threshold: f32,
    /// Minimum blob area as a fraction of the mask, in [0, 1).
    pub contour_filter: f32,
    /// Silhouette smoothing strength in [0, 1].
    pub smooth_contour: f32,
    /// Edge feathering strength in [0, 1].
    pub feather: f32,
    /// Recompute the mask once every N ticks.
    pub mask_every_x_frames: u32,
    /// Weight of the current mask when blending with the previous one.
    pub temporal_smooth_factor: f32,
    pub enable_image_similarity: bool,
    /// PSNR (dB) above which a frame counts as unchanged.
    pub image_similarity_threshold: f32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            enable_threshold: true,
            threshold: 0.5,
            contour_filter: 0.05,
            smooth_contour: 0.5,
            feather: 0.0,
            mask_every_x_frames: 1,
            temporal_smooth_factor: 0.85,
            enable_image_similarity: true,
            image_similarity_threshold: 35.0,
        }
    }
}

impl MaskParams {
    /// Clamp every field into its documented domain.
    pub fn sanitized(&self) -> Self {
        let unit = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            enable_threshold: self.enable_threshold,
            threshold: unit(self.threshold),
            contour_filter: unit(self.contour_filter),
            smooth_contour: unit(self.smooth_contour),
            feather: unit(self.feather),
            mask_every_x_frames: self.mask_every_x_frames.max(1),
            temporal_smooth_factor: unit(self.temporal_smooth_factor),
            enable_image_similarity: self.enable_image_similarity,
            image_similarity_threshold: if self.image_similarity_threshold.is_finite() {
                self.image_similarity_threshold.max(0.0)
            } else {
                0.0
            },
        }
    }
}

/// Parameters of the enhancement filter.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceParams {
    /// Blend between source (0) and enhanced output (1).
    pub blend: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self { blend: 1.0 }
    }
}

impl EnhanceParams {
    pub fn sanitized(&self) -> Self {
        Self {
            blend: if self.blend.is_finite() {
                self.blend.clamp(0.0, 1.0)
            } else {
                1.0
            },
        }
    }
}
