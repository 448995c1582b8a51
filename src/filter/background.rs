use super::{FilterCore, VideoFilter};
use crate::config::{MaskParams, SessionSettings};
use crate::error::SessionError;
use crate::exchange::FrameExchange;
use crate::frame::Mask;
use crate::pipeline::{FramePipeline, TickOutcome};
use crate::session::{AssetResolver, RuntimeLoader};
use parking_lot::Mutex;
use std::sync::Arc;

/// Segments the foreground and publishes a background mask at source
/// resolution (255 = background).
pub struct BackgroundFilter {
    core: FilterCore,
    params: Mutex<MaskParams>,
    pipeline: Mutex<FramePipeline>,
}

impl BackgroundFilter {
    pub fn new(
        exchange: Arc<FrameExchange>,
        resolver: Arc<dyn AssetResolver>,
        loader: Arc<dyn RuntimeLoader>,
    ) -> Self {
        Self {
            core: FilterCore::new(exchange, resolver, loader),
            params: Mutex::new(MaskParams::default()),
            pipeline: Mutex::new(FramePipeline::new()),
        }
    }

    /// Load the first session.
    pub fn initialize(&self, settings: &SessionSettings) -> Result<(), SessionError> {
        tracing::info!(
            "Background filter: model {}, device {}, {} threads",
            settings.model,
            settings.device,
            settings.threads
        );
        self.core.apply_session_settings(settings).map(|_| ())
    }

    /// Apply new mask parameters, and rebuild the session only when the
    /// model, device or thread count changed. The recompute cadence
    /// restarts either way.
    pub fn on_parameter_change(
        &self,
        settings: &SessionSettings,
        params: &MaskParams,
    ) -> Result<bool, SessionError> {
        self.set_params(params);
        self.core.apply_session_settings(settings)
    }

    /// Apply mask parameters alone, clamped into range.
    pub fn set_params(&self, params: &MaskParams) {
        let params = params.sanitized();
        tracing::debug!("Mask parameters: {:?}", params);
        *self.params.lock() = params;
        self.pipeline.lock().reset_cadence();
    }

    pub fn params(&self) -> MaskParams {
        self.params.lock().clone()
    }

    /// Snapshot of the last published mask.
    pub fn get_current_mask(&self) -> Option<Mask> {
        self.core.exchange().mask_snapshot()
    }
}

impl VideoFilter for BackgroundFilter {
    fn name(&self) -> &'static str {
        "background"
    }

    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn on_tick(&self) -> TickOutcome {
        if !self.core.is_active() {
            return TickOutcome::Disabled;
        }
        let frame = match self.core.snapshot_input() {
            Ok(frame) => frame,
            Err(outcome) => return outcome,
        };
        let params = self.params();

        let mut pipeline = self.pipeline.lock();
        let Some(outcome) = self
            .core
            .with_session(|session| pipeline.process(&frame, session, &params))
        else {
            return TickOutcome::Disabled;
        };

        let exchange = self.core.exchange();
        if let Some(mask) = pipeline.mask() {
            if outcome == TickOutcome::Computed
                || exchange.mask_dimensions() != Some(mask.dimensions())
            {
                exchange.publish_mask(mask.clone());
            }
        }
        outcome
    }
}
