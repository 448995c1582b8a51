pub mod contours;
pub mod refine;
pub mod similarity;

use crate::config::MaskParams;
use crate::error::InferenceError;
use crate::frame::{BgraFrame, Mask};
use crate::session::InferenceSession;
use image::Luma;

/// Anything that turns a frame into an 8-bit foreground map at its own
/// resolution.
pub trait MaskSource {
    /// `Ok(None)` when inference was skipped for this frame.
    fn infer_mask(&mut self, frame: &BgraFrame) -> Result<Option<Mask>, InferenceError>;

    /// Forget temporal state
    fn reset_state(&mut self) {}
}

impl MaskSource for InferenceSession {
    fn infer_mask(&mut self, frame: &BgraFrame) -> Result<Option<Mask>, InferenceError> {
        InferenceSession::infer_mask(self, frame)
    }

    fn reset_state(&mut self) {
        InferenceSession::reset_state(self);
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new mask was computed and published.
    Computed,
    /// The frame was too similar to the last one.
    SkippedSimilar,
    /// Not this frame's turn.
    SkippedCadence,
    /// The model declined to run.
    InferenceSkipped,
    /// Another context held the input frame.
    Contended,
    /// No frame has been published yet.
    NoInput,
    /// The filter is deactivated or has no session.
    Disabled,
    /// Inference failed; the previous mask stays.
    Failed,
}

/// Per-stream state carried between ticks.
#[derive(Debug, Clone)]
pub struct MaskState {
    mask: Mask,
    previous_mask: Option<Mask>,
    previous_frame: Option<BgraFrame>,
    cadence: u32,
}

impl MaskState {
    /// All background at the given resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: Mask::from_pixel(width, height, Luma([255])),
            previous_mask: None,
            previous_frame: None,
            cadence: 0,
        }
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn cadence(&self) -> u32 {
        self.cadence
    }
}

/// Runs the per-tick mask computation.
#[derive(Debug, Default)]
pub struct FramePipeline {
    state: Option<MaskState>,
}

impl FramePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&MaskState> {
        self.state.as_ref()
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.state.as_ref().map(MaskState::mask)
    }

    /// Restart the recompute cadence, so the next due frame is counted
    /// from now.
    pub fn reset_cadence(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.cadence = 0;
        }
    }

    /// Compute the background mask for `frame`, or decide not to.
    pub fn process(
        &mut self,
        frame: &BgraFrame,
        source: &mut dyn MaskSource,
        params: &MaskParams,
    ) -> TickOutcome {
        let (width, height) = frame.dimensions();
        let resized = self
            .state
            .as_ref()
            .map_or(true, |s| s.mask.dimensions() != (width, height));
        if resized {
            tracing::info!("Initializing background mask at {}x{}", width, height);
            source.reset_state();
            self.state = None;
        }
        let state = self
            .state
            .get_or_insert_with(|| MaskState::new(width, height));

        if params.enable_image_similarity {
            if let Some(psnr) = state
                .previous_frame
                .as_ref()
                .and_then(|prev| similarity::psnr(prev, frame))
            {
                if psnr > params.image_similarity_threshold as f64 {
                    tracing::debug!("Frame PSNR {:.2} dB, reusing mask", psnr);
                    return TickOutcome::SkippedSimilar;
                }
            }
        } else {
            state.previous_frame = None;
        }

        state.cadence = (state.cadence + 1) % params.mask_every_x_frames.max(1);
        if state.cadence != 0 {
            return TickOutcome::SkippedCadence;
        }

        let output = match source.infer_mask(frame) {
            Ok(Some(output)) => output,
            Ok(None) => return TickOutcome::InferenceSkipped,
            Err(e) => {
                tracing::error!("Mask inference failed: {}", e);
                return TickOutcome::Failed;
            }
        };

        state.mask = refine::refine_mask(&output, params, &mut state.previous_mask, (width, height));
        // similarity is measured against the frame the current mask came from
        if params.enable_image_similarity {
            state.previous_frame = Some(frame.clone());
        }
        TickOutcome::Computed
    }
}
