mod background;
mod enhance;

pub use background::BackgroundFilter;
pub use enhance::EnhanceFilter;

use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::exchange::{FrameExchange, InputSnapshot};
use crate::frame::BgraFrame;
use crate::pipeline::TickOutcome;
use crate::session::{AssetResolver, InferenceSession, RuntimeLoader};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a host drives once per tick, from its computation context.
pub trait VideoFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn core(&self) -> &FilterCore;

    /// Run one computation step against the latest published frame.
    fn on_tick(&self) -> TickOutcome;

    fn activate(&self) {
        tracing::info!("{} filter activated", self.name());
        self.core().set_active(true);
    }

    fn deactivate(&self) {
        tracing::info!("{} filter deactivated", self.name());
        self.core().set_active(false);
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }
}

/// Session ownership shared by every filter.
///
/// The session slot is the model-selection lock: a tick holds it for the
/// whole inference call, and a rebuild only takes it to swap in a session
/// that is already fully built.
pub struct FilterCore {
    session: Mutex<Option<InferenceSession>>,
    applied: Mutex<Option<SessionSettings>>,
    exchange: Arc<FrameExchange>,
    active: AtomicBool,
    resolver: Arc<dyn AssetResolver>,
    loader: Arc<dyn RuntimeLoader>,
}

impl FilterCore {
    pub fn new(
        exchange: Arc<FrameExchange>,
        resolver: Arc<dyn AssetResolver>,
        loader: Arc<dyn RuntimeLoader>,
    ) -> Self {
        Self {
            session: Mutex::new(None),
            applied: Mutex::new(None),
            exchange,
            active: AtomicBool::new(true),
            resolver,
            loader,
        }
    }

    pub fn exchange(&self) -> &Arc<FrameExchange> {
        &self.exchange
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Build a session for `settings` unless the current one already
    /// matches. Returns whether a new session was swapped in.
    ///
    /// On failure the previous session keeps running and the settings are
    /// not recorded, so the next change retries.
    pub fn apply_session_settings(&self, settings: &SessionSettings) -> Result<bool, SessionError> {
        let needs_rebuild = self
            .applied
            .lock()
            .as_ref()
            .map_or(true, |current| current.requires_rebuild(settings));
        if !needs_rebuild {
            return Ok(false);
        }

        let session = InferenceSession::create(settings, self.resolver.as_ref(), self.loader.as_ref())
            .map_err(|e| {
                tracing::error!("Failed to create inference session (code {}): {}", e.code(), e);
                e
            })?;

        let old = self.session.lock().replace(session);
        *self.applied.lock() = Some(settings.clone());
        drop(old);
        Ok(true)
    }

    /// Copy the latest input frame without waiting on the render context.
    pub fn snapshot_input(&self) -> Result<BgraFrame, TickOutcome> {
        match self.exchange.try_snapshot_input() {
            InputSnapshot::Frame(frame) => Ok(frame),
            InputSnapshot::Empty => Err(TickOutcome::NoInput),
            InputSnapshot::Contended => Err(TickOutcome::Contended),
        }
    }

    /// Run `f` against the current session while holding the selection
    /// lock. `None` when no session is loaded.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut InferenceSession) -> R) -> Option<R> {
        self.session.lock().as_mut().map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, USEGPU_CPU};
    use crate::model::testing::{AnyAsset, FakeLoader, FakeRuntime};

    fn core_with(loader: Arc<FakeLoader>) -> FilterCore {
        FilterCore::new(Arc::new(FrameExchange::new()), Arc::new(AnyAsset), loader)
    }

    #[test]
    fn rebuilds_only_when_session_settings_change() {
        let loader = Arc::new(FakeLoader::new(|| FakeRuntime::selfie(8, 8)));
        let core = core_with(loader.clone());
        let settings = SessionSettings::new(config::MODEL_SELFIE, USEGPU_CPU, 1);

        assert!(core.apply_session_settings(&settings).unwrap());
        assert!(!core.apply_session_settings(&settings.clone()).unwrap());
        assert_eq!(loader.load_count(), 1);

        let threads = SessionSettings::new(config::MODEL_SELFIE, USEGPU_CPU, 2);
        assert!(core.apply_session_settings(&threads).unwrap());
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn failed_rebuild_keeps_the_running_session() {
        let loader = Arc::new(FakeLoader::new(|| FakeRuntime::selfie(8, 8)));
        let core = core_with(loader.clone());
        core.apply_session_settings(&SessionSettings::new(config::MODEL_SELFIE, USEGPU_CPU, 1))
            .unwrap();

        let err = core
            .apply_session_settings(&SessionSettings::new("models/nope.onnx", USEGPU_CPU, 1))
            .unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(core.has_session());
        assert_eq!(
            core.with_session(|s| s.descriptor().asset.clone()).as_deref(),
            Some(config::MODEL_SELFIE)
        );
    }

    #[test]
    fn snapshot_maps_exchange_state() {
        let core = core_with(Arc::new(FakeLoader::new(|| FakeRuntime::selfie(8, 8))));
        assert_eq!(core.snapshot_input().unwrap_err(), TickOutcome::NoInput);
        core.exchange().publish_input(BgraFrame::filled(2, 2, [0; 4]));
        let _held = core.exchange().lock_input();
        assert_eq!(core.snapshot_input().unwrap_err(), TickOutcome::Contended);
    }
}
