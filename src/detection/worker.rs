// Detection worker: one capture -> match -> gate -> press cycle per tick
use super::config::DetectionSettings;
use super::stability::StabilityFilter;
use super::stats::{PerformanceReport, PerformanceStats};
use super::types::{DetectionEvent, RunState, TickOutcome};
use crate::device::{ImageSource, InputSink, KeyDispatcher};
use crate::template_matching::{MatchEngine, MatchStats};
use image::DynamicImage;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, sleep};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Diagnostics the worker publishes for the controller to read
#[derive(Debug, Default)]
pub struct SharedStatus {
    last_capture: Mutex<Option<Arc<DynamicImage>>>,
    performance: Mutex<PerformanceStats>,
    match_stats: Mutex<MatchStats>,
}

impl SharedStatus {
    pub fn last_capture(&self) -> Option<Arc<DynamicImage>> {
        lock(&self.last_capture).clone()
    }

    pub fn performance(&self) -> PerformanceReport {
        lock(&self.performance).report()
    }

    pub fn match_stats(&self) -> MatchStats {
        lock(&self.match_stats).clone()
    }
}

pub struct DetectionWorker<S: ImageSource, K: InputSink> {
    source: S,
    dispatcher: KeyDispatcher<K>,
    engine: MatchEngine,
    stability: StabilityFilter,
    last_trigger: Option<Instant>,
    /// Snapshot the stability window and engine were configured from
    applied: Option<Arc<DetectionSettings>>,
    events: mpsc::Sender<DetectionEvent>,
    shared: Arc<SharedStatus>,
}

impl<S: ImageSource, K: InputSink> DetectionWorker<S, K> {
    pub fn new(
        source: S,
        sink: K,
        events: mpsc::Sender<DetectionEvent>,
        shared: Arc<SharedStatus>,
    ) -> Self {
        Self {
            source,
            dispatcher: KeyDispatcher::new(sink),
            engine: MatchEngine::new(),
            stability: StabilityFilter::new(3, 2),
            last_trigger: None,
            applied: None,
            events,
            shared,
        }
    }

    fn emit(&self, event: DetectionEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::trace!("Dropped detection event: {e}");
        }
    }

    /// Rebuild per-config state when a new snapshot shows up
    fn apply(&mut self, settings: &Arc<DetectionSettings>) {
        if self
            .applied
            .as_ref()
            .is_some_and(|applied| Arc::ptr_eq(applied, settings))
        {
            return;
        }
        let config = &settings.config;
        self.stability = StabilityFilter::new(config.stability_window, config.stability_threshold);
        self.engine.set_preprocessing(&config.preprocess);
        self.applied = Some(Arc::clone(settings));
        log::debug!(
            "⚙️ Applied settings: {} template(s), threshold {:.2}, methods {:?}",
            settings.templates.len(),
            config.confidence_threshold,
            config.methods
        );
    }

    /// Run one detection cycle against `settings` at time `now`
    pub fn tick(&mut self, settings: &Arc<DetectionSettings>, now: Instant) -> TickOutcome {
        self.apply(settings);
        let config = &settings.config;

        let Some(region) = config.scan_area else {
            log::warn!("⚠️ No scan area defined, skipping detection");
            self.emit(DetectionEvent::StatusChanged("No scan area defined".to_string()));
            return TickOutcome::NoScanArea;
        };

        let started = std::time::Instant::now();
        let frame = match self.source.capture(&region) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                log::warn!("⚠️ Failed to capture scan area: {e}");
                self.emit(DetectionEvent::StatusChanged(format!("Capture failed: {e}")));
                return TickOutcome::CaptureFailed;
            }
        };
        *lock(&self.shared.last_capture) = Some(Arc::clone(&frame));
        self.emit(DetectionEvent::FrameCaptured(Arc::clone(&frame)));

        let raw = self.engine.find_best_match(
            &frame,
            settings.templates.entries(),
            &config.methods,
            config.confidence_threshold,
        );
        lock(&self.shared.performance).record(started.elapsed());
        *lock(&self.shared.match_stats) = self.engine.stats().clone();

        let Some(result) = self.stability.push(raw) else {
            return TickOutcome::NoMatch;
        };
        if result.confidence <= config.confidence_threshold {
            return TickOutcome::NoMatch;
        }

        let cooled_down = self
            .last_trigger
            .is_none_or(|last| now.duration_since(last) >= config.cooldown);
        if !cooled_down {
            log::debug!("⏳ '{}' detected but still cooling down", result.name);
            return TickOutcome::CoolingDown(result);
        }

        let Some(key) = settings.templates.key_for(&result.name) else {
            log::warn!("⚠️ No keybind defined for detected icon '{}'", result.name);
            return TickOutcome::Unbound(result);
        };

        if let Err(e) = self.dispatcher.dispatch(key) {
            self.emit(DetectionEvent::StatusChanged(format!("Key press failed: {e}")));
            return TickOutcome::DispatchFailed(result);
        }

        log::info!(
            "🎯 Detected '{}' ({:.3}, {}), pressed '{}'",
            result.name,
            result.confidence,
            result.method,
            key
        );
        self.last_trigger = Some(now);
        self.emit(DetectionEvent::IconDetected {
            name: result.name.clone(),
            confidence: result.confidence,
        });
        TickOutcome::Triggered {
            key: key.to_string(),
            result,
        }
    }

    /// Poll until the state channel says Stopped or its sender goes away.
    /// Paused parks on the state channel; a state change also cuts the
    /// inter-tick sleep short. Each tick runs on the blocking pool so
    /// capture and matching never stall the runtime thread.
    pub async fn run(
        self,
        mut state_rx: watch::Receiver<RunState>,
        mut settings_rx: watch::Receiver<Arc<DetectionSettings>>,
    ) where
        S: 'static,
        K: 'static,
    {
        log::info!("🚀 Detection worker started");
        let mut worker = self;

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                RunState::Stopped => break,
                RunState::Paused => {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                RunState::Running => {}
            }

            let settings = Arc::clone(&*settings_rx.borrow_and_update());
            let snapshot = Arc::clone(&settings);
            let now = Instant::now();
            let joined = tokio::task::spawn_blocking(move || {
                let outcome = worker.tick(&snapshot, now);
                (worker, outcome)
            })
            .await;
            let outcome = match joined {
                Ok((returned, outcome)) => {
                    worker = returned;
                    outcome
                }
                Err(e) => {
                    log::error!("❌ Detection tick failed: {e}");
                    return;
                }
            };

            let pause: Duration = match outcome {
                TickOutcome::NoScanArea | TickOutcome::CaptureFailed => {
                    settings.config.capture_backoff
                }
                _ => settings.config.poll_interval,
            };

            tokio::select! {
                _ = sleep(pause) => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let released = worker.dispatcher.release_all();
        if released > 0 {
            log::warn!("Released {released} held key(s) on shutdown");
        }
        log::info!("🛑 Detection worker exited");
    }
}
