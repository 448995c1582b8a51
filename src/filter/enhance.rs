use super::{FilterCore, VideoFilter};
use crate::config::{EnhanceParams, SessionSettings};
use crate::error::SessionError;
use crate::exchange::FrameExchange;
use crate::frame::BgraFrame;
use crate::pipeline::TickOutcome;
use crate::session::{AssetResolver, RuntimeLoader};
use image::imageops::{self, FilterType};
use parking_lot::Mutex;
use std::sync::Arc;

/// Runs a low-light enhancement network and publishes the enhanced frame
/// at source resolution.
pub struct EnhanceFilter {
    core: FilterCore,
    params: Mutex<EnhanceParams>,
}

impl EnhanceFilter {
    pub fn new(
        exchange: Arc<FrameExchange>,
        resolver: Arc<dyn AssetResolver>,
        loader: Arc<dyn RuntimeLoader>,
    ) -> Self {
        Self {
            core: FilterCore::new(exchange, resolver, loader),
            params: Mutex::new(EnhanceParams::default()),
        }
    }

    pub fn initialize(&self, settings: &SessionSettings) -> Result<(), SessionError> {
        tracing::info!(
            "Enhance filter: model {}, device {}, {} threads",
            settings.model,
            settings.device,
            settings.threads
        );
        self.core.apply_session_settings(settings).map(|_| ())
    }

    pub fn on_parameter_change(
        &self,
        settings: &SessionSettings,
        params: &EnhanceParams,
    ) -> Result<bool, SessionError> {
        self.set_params(params);
        self.core.apply_session_settings(settings)
    }

    pub fn set_params(&self, params: &EnhanceParams) {
        *self.params.lock() = params.sanitized();
    }

    /// Weight of the enhanced frame when compositing over the source.
    pub fn blend(&self) -> f32 {
        self.params.lock().blend
    }

    /// Snapshot of the last published enhanced frame.
    pub fn get_current_frame(&self) -> Option<BgraFrame> {
        self.core.exchange().bgra_snapshot()
    }
}

impl VideoFilter for EnhanceFilter {
    fn name(&self) -> &'static str {
        "enhance"
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

        let Some(result) = self.core.with_session(|session| session.infer_rgb(&frame)) else {
            return TickOutcome::Disabled;
        };
        let enhanced = match result {
            Ok(Some(rgb)) => rgb,
            Ok(None) => return TickOutcome::InferenceSkipped,
            Err(e) => {
                tracing::error!("Enhancement inference failed: {}", e);
                return TickOutcome::Failed;
            }
        };

        let (width, height) = frame.dimensions();
        let enhanced = if enhanced.dimensions() != (width, height) {
            imageops::resize(&enhanced, width, height, FilterType::Triangle)
        } else {
            enhanced
        };

        if self.core.exchange().try_publish_bgra(BgraFrame::from_rgb(&enhanced)) {
            TickOutcome::Computed
        } else {
            TickOutcome::Contended
        }
    }
}
