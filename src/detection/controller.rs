// Control surface for the detection loop: Stopped -> Running <-> Paused -> Stopped
use super::config::{DetectionConfig, DetectionSettings};
use super::error::DetectionResult;
use super::stats::PerformanceReport;
use super::template::TemplateStore;
use super::types::{DetectionEvent, RunState};
use super::worker::{DetectionWorker, SharedStatus};
use crate::device::{ImageSource, InputSink};
use crate::template_matching::MatchStats;
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

/// Longest `stop()` waits for the worker before aborting it
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct DetectionLoop<S, K>
where
    S: ImageSource + 'static,
    K: InputSink + 'static,
{
    source: Arc<S>,
    sink: Arc<K>,
    settings: Arc<DetectionSettings>,
    state_tx: watch::Sender<RunState>,
    settings_tx: watch::Sender<Arc<DetectionSettings>>,
    event_tx: mpsc::Sender<DetectionEvent>,
    shared: Arc<SharedStatus>,
    worker: Option<JoinHandle<()>>,
}

impl<S, K> DetectionLoop<S, K>
where
    S: ImageSource + 'static,
    K: InputSink + 'static,
{
    pub fn new(
        source: S,
        sink: K,
        config: DetectionConfig,
        templates: TemplateStore,
        event_tx: mpsc::Sender<DetectionEvent>,
    ) -> Self {
        let settings = Arc::new(DetectionSettings::new(config, templates));
        let (state_tx, _) = watch::channel(RunState::Stopped);
        let (settings_tx, _) = watch::channel(Arc::clone(&settings));
        Self {
            source: Arc::new(source),
            sink: Arc::new(sink),
            settings,
            state_tx,
            settings_tx,
            event_tx,
            shared: Arc::new(SharedStatus::default()),
            worker: None,
        }
    }

    fn set_state(&mut self, state: RunState) {
        self.state_tx.send_replace(state);
    }

    fn status(&self, message: impl Into<String>) {
        if let Err(e) = self.event_tx.try_send(DetectionEvent::StatusChanged(message.into())) {
            log::trace!("Dropped status event: {e}");
        }
    }

    /// Stopped -> Running. Returns false, leaving the state alone, when
    /// already active, when the configuration cannot drive a tick, or when
    /// called outside a tokio runtime.
    pub fn start(&mut self) -> bool {
        let state = self.state();
        if state != RunState::Stopped {
            log::warn!("⚠️ Start ignored: detection is already {state}");
            return false;
        }
        if let Err(e) = self.settings.ensure_startable() {
            log::warn!("⚠️ Cannot start detection: {e}");
            self.status(format!("Cannot start: {e}"));
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("❌ Cannot start detection without a tokio runtime: {e}");
                self.status("Cannot start: no async runtime");
                return false;
            }
        };

        let unbound = self.settings.templates.len() - self.settings.templates.bound_count();
        if unbound > 0 {
            log::warn!("⚠️ {unbound} template(s) have no keybind and will never trigger");
        }

        self.set_state(RunState::Running);
        let worker = DetectionWorker::new(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            self.event_tx.clone(),
            Arc::clone(&self.shared),
        );
        self.worker = Some(runtime.spawn(
            worker.run(self.state_tx.subscribe(), self.settings_tx.subscribe()),
        ));

        log::info!("▶️ Detection started");
        self.status("Detection started");
        true
    }

    /// Running -> Paused; false otherwise
    pub fn pause(&mut self) -> bool {
        if self.state() != RunState::Running {
            return false;
        }
        self.set_state(RunState::Paused);
        log::info!("⏸️ Detection paused");
        self.status("Detection paused");
        true
    }

    /// Paused -> Running; false otherwise
    pub fn resume(&mut self) -> bool {
        if self.state() != RunState::Paused {
            return false;
        }
        self.set_state(RunState::Running);
        log::info!("▶️ Detection resumed");
        self.status("Detection resumed");
        true
    }

    /// Running/Paused -> Stopped. Waits up to [`STOP_TIMEOUT`] for the
    /// worker to finish its current tick, then aborts it.
    pub async fn stop(&mut self) {
        if self.state() == RunState::Stopped && self.worker.is_none() {
            return;
        }
        self.set_state(RunState::Stopped);

        if let Some(mut handle) = self.worker.take() {
            match timeout(STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("❌ Detection worker failed: {e}"),
                Err(_) => {
                    log::warn!("⚠️ Detection worker did not exit within {STOP_TIMEOUT:?}, aborting");
                    handle.abort();
                }
            }
        }

        log::info!("⏹️ Detection stopped");
        self.status("Detection stopped");
    }

    /// Swap in a new configuration and template set. The worker picks it
    /// up at the start of its next tick; the run state is unchanged. An
    /// invalid configuration is rejected and the current one stays live.
    pub fn update_config(
        &mut self,
        config: DetectionConfig,
        templates: TemplateStore,
    ) -> DetectionResult<()> {
        if let Err(e) = config.validate() {
            log::warn!("⚠️ Rejected configuration reload: {e}");
            self.status(format!("Configuration rejected: {e}"));
            return Err(e);
        }
        self.settings = Arc::new(DetectionSettings::new(config, templates));
        self.settings_tx.send_replace(Arc::clone(&self.settings));
        log::info!(
            "🔄 Configuration reloaded ({} template(s))",
            self.settings.templates.len()
        );
        Ok(())
    }

    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Running and not paused
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn get_performance_stats(&self) -> PerformanceReport {
        self.shared.performance()
    }

    pub fn match_stats(&self) -> MatchStats {
        self.shared.match_stats()
    }

    /// Most recent frame the worker captured
    pub fn last_capture(&self) -> Option<Arc<DynamicImage>> {
        self.shared.last_capture()
    }
}

impl<S, K> Drop for DetectionLoop<S, K>
where
    S: ImageSource + 'static,
    K: InputSink + 'static,
{
    /// The worker notices the closed state channel at its next wake-up
    /// and exits on its own, releasing held keys.
    fn drop(&mut self) {
        self.state_tx.send_replace(RunState::Stopped);
    }
}
