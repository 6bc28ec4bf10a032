//! Tests for the detection loop: trigger gating, scenarios and lifecycle

use crate::detection::{
    DetectionConfig, DetectionEvent, DetectionLoop, DetectionSettings, DetectionWorker, RunState,
    SharedStatus, TemplateStore, TickOutcome, create_detection_channel,
};
use crate::device::{DeviceError, DeviceResult, ImageSource, InputSink, ScanRegion};
use crate::template_matching::{MatchEngine, MatchMethod};
use image::{DynamicImage, GrayImage, Luma};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Returns the same frame on every capture
struct StaticSource {
    frame: DynamicImage,
    calls: AtomicUsize,
}

impl StaticSource {
    fn new(frame: DynamicImage) -> Self {
        Self {
            frame,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ImageSource for StaticSource {
    fn capture(&self, _region: &ScanRegion) -> DeviceResult<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.clone())
    }
}

/// Every capture fails
#[derive(Default)]
struct FailingSource {
    calls: AtomicUsize,
}

impl ImageSource for FailingSource {
    fn capture(&self, region: &ScanRegion) -> DeviceResult<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DeviceError::capture_failed(region, "display unavailable"))
    }
}

/// Records every key pressed down
#[derive(Default)]
struct RecordingSink {
    downs: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn downs(&self) -> Vec<String> {
        self.downs.lock().unwrap().clone()
    }
}

impl InputSink for RecordingSink {
    fn key_down(&self, key: &str) -> DeviceResult<()> {
        self.downs.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn key_up(&self, _key: &str) -> DeviceResult<()> {
        Ok(())
    }
}

/// Fails `key_down` for one key while armed; records every call
#[derive(Default)]
struct FlakySink {
    fail_on: Mutex<Option<String>>,
    downs: Mutex<Vec<String>>,
    ups: Mutex<Vec<String>>,
}

impl FlakySink {
    fn failing_on(key: &str) -> Self {
        Self {
            fail_on: Mutex::new(Some(key.to_string())),
            ..Default::default()
        }
    }

    fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }
}

impl InputSink for FlakySink {
    fn key_down(&self, key: &str) -> DeviceResult<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(key) {
            return Err(DeviceError::KeyDown {
                key: key.to_string(),
                description: "injection refused".to_string(),
            });
        }
        self.downs.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn key_up(&self, key: &str) -> DeviceResult<()> {
        self.ups.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Hands out the given frames in order, repeating the last one
struct SequenceSource {
    frames: Mutex<Vec<DynamicImage>>,
}

impl SequenceSource {
    fn new(mut frames: Vec<DynamicImage>) -> Self {
        frames.reverse();
        Self {
            frames: Mutex::new(frames),
        }
    }
}

impl ImageSource for SequenceSource {
    fn capture(&self, region: &ScanRegion) -> DeviceResult<DynamicImage> {
        let mut frames = self.frames.lock().unwrap();
        match frames.len() {
            0 => Err(DeviceError::capture_failed(region, "no frames")),
            1 => Ok(frames[0].clone()),
            _ => Ok(frames.pop().unwrap()),
        }
    }
}

/// Takes `delay` of wall time per capture
struct SlowSource {
    frame: DynamicImage,
    delay: std::time::Duration,
}

impl ImageSource for SlowSource {
    fn capture(&self, _region: &ScanRegion) -> DeviceResult<DynamicImage> {
        std::thread::sleep(self.delay);
        Ok(self.frame.clone())
    }
}

/// Left half bright, right half dark
fn two_tone() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, _| {
        Luma([if x < 10 { 200 } else { 50 }])
    }))
}

/// Horizontal ramp falling left to right; correlates at about 0.87
/// with `two_tone()`
fn ramp() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, _| Luma([(200 - x * 8) as u8])))
}

/// Mirror image of `two_tone()`
fn two_tone_flipped() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, _| {
        Luma([if x < 10 { 50 } else { 200 }])
    }))
}

fn config() -> DetectionConfig {
    DetectionConfig {
        confidence_threshold: 0.8,
        cooldown: Duration::from_millis(500),
        ..Default::default()
    }
    .with_scan_area(ScanRegion::new(0, 0, 20, 20))
}

fn settings(config: DetectionConfig, templates: TemplateStore) -> Arc<DetectionSettings> {
    Arc::new(DetectionSettings::new(config, templates))
}

fn worker_for(
    frame: DynamicImage,
) -> (
    DetectionWorker<StaticSource, Arc<RecordingSink>>,
    Arc<RecordingSink>,
    mpsc::Receiver<DetectionEvent>,
) {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = create_detection_channel();
    let worker = DetectionWorker::new(
        StaticSource::new(frame),
        Arc::clone(&sink),
        tx,
        Arc::new(SharedStatus::default()),
    );
    (worker, sink, rx)
}

fn drain(rx: &mut mpsc::Receiver<DetectionEvent>) -> Vec<DetectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_threshold_gate_is_strict() {
    let mut engine = MatchEngine::new();
    let confidence = engine
        .find_best_match(&two_tone(), [("ramp", &ramp())], &[MatchMethod::Template], 0.0)
        .unwrap()
        .confidence;
    assert!(confidence > 0.8 && confidence < 0.95, "got {confidence}");

    let mut templates = TemplateStore::new();
    templates.put("ramp", ramp(), Some("1".into()));

    // Exactly at the threshold: rejected
    let (mut worker, sink, _rx) = worker_for(two_tone());
    let at = settings(
        DetectionConfig {
            confidence_threshold: confidence,
            ..config()
        },
        templates.clone(),
    );
    assert_eq!(worker.tick(&at, Instant::now()), TickOutcome::NoMatch);
    assert!(sink.downs().is_empty());

    // Just below it: accepted
    let (mut worker, sink, _rx) = worker_for(two_tone());
    let below = settings(
        DetectionConfig {
            confidence_threshold: confidence - 0.01,
            ..config()
        },
        templates,
    );
    assert!(worker.tick(&below, Instant::now()).is_triggered());
    assert_eq!(sink.downs(), vec!["1"]);
}

#[test]
fn test_cooldown_boundary() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let snapshot = settings(config(), templates);
    let (mut worker, sink, _rx) = worker_for(two_tone());

    let t0 = Instant::now();
    assert!(worker.tick(&snapshot, t0).is_triggered());
    assert!(matches!(
        worker.tick(&snapshot, t0 + Duration::from_millis(499)),
        TickOutcome::CoolingDown(_)
    ));
    // Elapsed == cooldown is allowed
    assert!(
        worker
            .tick(&snapshot, t0 + Duration::from_millis(500))
            .is_triggered()
    );
    assert_eq!(sink.downs(), vec!["1", "1"]);
}

#[test]
fn test_rename_keeps_image_and_key_together() {
    let mut templates = TemplateStore::new();
    templates.put("old", two_tone(), Some("alt+4".into()));
    templates.rename("old", "new").unwrap();

    assert!(templates.get("old").is_none());
    assert_eq!(templates.key_for("old"), None);
    assert_eq!(templates.get("new").map(|t| &t.image), Some(&two_tone()));
    assert_eq!(templates.key_for("new"), Some("alt+4"));
}

#[test]
fn test_scenario_a_single_press_within_cooldown() {
    let frame = DynamicImage::ImageLuma8(GrayImage::from_fn(40, 40, |x, y| {
        Luma([((x * 13 + y * 7) % 180 + 40) as u8])
    }));
    let mut templates = TemplateStore::new();
    templates.put("N5", frame.clone(), Some("1".into()));
    let snapshot = settings(
        config().with_scan_area(ScanRegion::new(0, 0, 40, 40)),
        templates,
    );
    let (mut worker, sink, mut rx) = worker_for(frame);

    let t0 = Instant::now();
    let outcomes: Vec<TickOutcome> = (0..3)
        .map(|i| worker.tick(&snapshot, t0 + Duration::from_millis(100 * i)))
        .collect();

    assert!(outcomes[0].is_triggered());
    assert!(matches!(outcomes[1], TickOutcome::CoolingDown(_)));
    assert!(matches!(outcomes[2], TickOutcome::CoolingDown(_)));
    assert_eq!(sink.downs(), vec!["1"]);

    let detections: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            DetectionEvent::IconDetected { name, confidence } => {
                assert!(confidence > 0.8);
                Some(name)
            }
            _ => None,
        })
        .collect();
    assert_eq!(detections, vec!["N5"]);
}

#[tokio::test]
async fn test_scenario_b_start_without_scan_area() {
    let mut templates = TemplateStore::new();
    templates.put("N5", two_tone(), Some("1".into()));
    let (tx, mut rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        RecordingSink::default(),
        DetectionConfig::default(),
        templates,
        tx,
    );

    assert!(!detection.start());
    assert_eq!(detection.state(), RunState::Stopped);
    assert!(!detection.is_running());
    assert!(matches!(
        rx.try_recv(),
        Ok(DetectionEvent::StatusChanged(message)) if message.contains("scan area")
    ));
}

#[tokio::test]
async fn test_start_without_keybinds() {
    let mut templates = TemplateStore::new();
    templates.put("N5", two_tone(), None);
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        RecordingSink::default(),
        config(),
        templates,
        tx,
    );
    assert!(!detection.start());
    assert_eq!(detection.state(), RunState::Stopped);
}

#[test]
fn test_scenario_c_highest_confidence_only() {
    for order in [["A", "B"], ["B", "A"]] {
        let mut templates = TemplateStore::new();
        for name in order {
            match name {
                "A" => templates.put("A", two_tone(), Some("a".into())),
                _ => templates.put("B", ramp(), Some("b".into())),
            }
        }
        let snapshot = settings(config(), templates.clone());
        let (mut worker, sink, _rx) = worker_for(two_tone());

        // Both clear the 0.8 threshold on their own
        let mut engine = MatchEngine::new();
        let b = engine
            .find_best_match(&two_tone(), [("B", &ramp())], &[MatchMethod::Template], 0.8)
            .unwrap();
        assert!(b.confidence < 1.0);

        match worker.tick(&snapshot, Instant::now()) {
            TickOutcome::Triggered { result, key } => {
                assert_eq!(result.name, "A");
                assert_eq!(key, "a");
            }
            other => panic!("expected a trigger, got {other:?}"),
        }
        assert_eq!(sink.downs(), vec!["a"]);
    }
}

#[test]
fn test_scenario_d_capture_failures_are_skipped() {
    let mut templates = TemplateStore::new();
    templates.put("N5", two_tone(), Some("1".into()));
    let snapshot = settings(config(), templates);
    let sink = Arc::new(RecordingSink::default());
    let (tx, mut rx) = create_detection_channel();
    let mut worker = DetectionWorker::new(
        FailingSource::default(),
        Arc::clone(&sink),
        tx,
        Arc::new(SharedStatus::default()),
    );

    let t0 = Instant::now();
    for i in 0..5 {
        let outcome = worker.tick(&snapshot, t0 + Duration::from_secs(i));
        assert_eq!(outcome, TickOutcome::CaptureFailed);
    }

    let skips = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DetectionEvent::StatusChanged(m) if m.starts_with("Capture failed")))
        .count();
    assert_eq!(skips, 5);
    assert!(sink.downs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_loop_keeps_running() {
    let mut templates = TemplateStore::new();
    templates.put("N5", two_tone(), Some("1".into()));
    let source = Arc::new(FailingSource::default());
    let (tx, mut rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        Arc::clone(&source),
        RecordingSink::default(),
        config(),
        templates,
        tx,
    );

    assert!(detection.start());
    // Backoff is 1 s: failures at 0, 1, 2, 3 and 4 s
    tokio::time::sleep(Duration::from_millis(4500)).await;

    assert_eq!(detection.state(), RunState::Running);
    assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    let skips = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DetectionEvent::StatusChanged(m) if m.starts_with("Capture failed")))
        .count();
    assert_eq!(skips, 5);

    detection.stop().await;
    assert_eq!(detection.state(), RunState::Stopped);
}

#[test]
fn test_unbound_match_is_skipped() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), None);
    let snapshot = settings(config(), templates);
    let (mut worker, sink, _rx) = worker_for(two_tone());

    assert!(matches!(
        worker.tick(&snapshot, Instant::now()),
        TickOutcome::Unbound(_)
    ));
    assert!(sink.downs().is_empty());
}

#[test]
fn test_missing_scan_area_skips_tick() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let snapshot = settings(DetectionConfig::default(), templates);
    let (mut worker, _sink, _rx) = worker_for(two_tone());
    assert_eq!(
        worker.tick(&snapshot, Instant::now()),
        TickOutcome::NoScanArea
    );
}

#[test]
fn test_chord_binding_is_dispatched_in_order() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("ctrl+shift+3".into()));
    let snapshot = settings(config(), templates);
    let (mut worker, sink, _rx) = worker_for(two_tone());

    assert!(worker.tick(&snapshot, Instant::now()).is_triggered());
    assert_eq!(sink.downs(), vec!["ctrl", "shift", "3"]);
}

#[test]
fn test_frame_event_and_stats_are_published() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let snapshot = settings(config(), templates);
    let sink = Arc::new(RecordingSink::default());
    let shared = Arc::new(SharedStatus::default());
    let (tx, mut rx) = create_detection_channel();
    let mut worker = DetectionWorker::new(
        StaticSource::new(two_tone()),
        sink,
        tx,
        Arc::clone(&shared),
    );

    worker.tick(&snapshot, Instant::now());

    assert!(shared.last_capture().is_some());
    assert_eq!(shared.match_stats().total_calls, 1);
    assert!(shared.performance().max_frame_time >= 0.0);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, DetectionEvent::FrameCaptured(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_transitions() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        Arc::clone(&sink),
        config(),
        templates,
        tx,
    );

    assert!(!detection.pause());
    assert!(!detection.resume());

    assert!(detection.start());
    assert!(detection.is_running());
    assert!(!detection.start());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.downs(), vec!["1"]);

    assert!(detection.pause());
    assert!(detection.is_paused());
    assert!(!detection.is_running());
    assert!(!detection.pause());

    // Nothing is pressed while paused, even after the cooldown
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.downs(), vec!["1"]);

    assert!(detection.resume());
    assert!(detection.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.downs(), vec!["1", "1"]);

    detection.stop().await;
    assert_eq!(detection.state(), RunState::Stopped);
    assert!(!detection.is_running() && !detection.is_paused());
    assert!(detection.last_capture().is_some());
    assert!(detection.get_performance_stats().avg_frame_time >= 0.0);

    // A fresh start is allowed after stop
    assert!(detection.start());
    detection.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_config_applies_on_next_tick() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        Arc::clone(&sink),
        config(),
        templates.clone(),
        tx,
    );

    assert!(detection.start());
    tokio::time::sleep(Duration::from_millis(50)).await;

    templates.bind_key("icon", Some("2".into())).unwrap();
    detection.update_config(config(), templates).unwrap();
    assert!(detection.is_running());
    assert_eq!(detection.settings().templates.key_for("icon"), Some("2"));

    // Next trigger happens once the 0.5 s cooldown is over
    tokio::time::sleep(Duration::from_millis(600)).await;
    detection.stop().await;

    let downs = sink.downs();
    assert_eq!(downs.first().map(String::as_str), Some("1"));
    assert_eq!(downs.last().map(String::as_str), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_bounded_and_idempotent() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        RecordingSink::default(),
        config(),
        templates,
        tx,
    );

    detection.stop().await;
    assert!(detection.start());
    let started = Instant::now();
    detection.stop().await;
    assert!(started.elapsed() <= crate::detection::STOP_TIMEOUT);
    detection.stop().await;
    assert_eq!(detection.state(), RunState::Stopped);
}

#[test]
fn test_blank_screen_never_triggers() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let snapshot = settings(
        config().with_scan_area(ScanRegion::new(0, 0, 40, 40)),
        templates,
    );
    let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([128])));
    let (mut worker, sink, _rx) = worker_for(blank);

    assert_eq!(worker.tick(&snapshot, Instant::now()), TickOutcome::NoMatch);
    assert!(sink.downs().is_empty());
}

#[test]
fn test_dispatch_failure_releases_keys_and_retries() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("ctrl+3".into()));
    let snapshot = settings(config(), templates);
    let sink = Arc::new(FlakySink::failing_on("3"));
    let (tx, mut rx) = create_detection_channel();
    let mut worker = DetectionWorker::new(
        StaticSource::new(two_tone()),
        Arc::clone(&sink),
        tx,
        Arc::new(SharedStatus::default()),
    );

    let t0 = Instant::now();
    assert!(matches!(
        worker.tick(&snapshot, t0),
        TickOutcome::DispatchFailed(ref result) if result.name == "icon"
    ));
    // The modifier went down before the failure and came back up
    assert_eq!(*sink.downs.lock().unwrap(), vec!["ctrl"]);
    assert_eq!(*sink.ups.lock().unwrap(), vec!["ctrl"]);
    assert!(drain(&mut rx).iter().any(
        |e| matches!(e, DetectionEvent::StatusChanged(m) if m.starts_with("Key press failed"))
    ));

    // No cooldown was started, so the very next tick presses again
    sink.heal();
    assert!(worker.tick(&snapshot, t0).is_triggered());
    assert_eq!(*sink.downs.lock().unwrap(), vec!["ctrl", "ctrl", "3"]);
}

#[test]
fn test_single_flicker_is_smoothed_out() {
    let mut templates = TemplateStore::new();
    templates.put("A", two_tone(), Some("a".into()));
    templates.put("B", two_tone_flipped(), Some("b".into()));
    let snapshot = settings(
        DetectionConfig {
            cooldown: Duration::ZERO,
            stability_window: 3,
            stability_threshold: 2,
            ..config()
        },
        templates,
    );
    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = create_detection_channel();
    let mut worker = DetectionWorker::new(
        SequenceSource::new(vec![two_tone(), two_tone(), two_tone_flipped(), two_tone()]),
        Arc::clone(&sink),
        tx,
        Arc::new(SharedStatus::default()),
    );

    let t0 = Instant::now();
    let names: Vec<String> = (0..4)
        .map(|i| match worker.tick(&snapshot, t0 + Duration::from_millis(100 * i)) {
            TickOutcome::Triggered { result, .. } => result.name,
            other => panic!("expected a trigger, got {other:?}"),
        })
        .collect();

    // Raw A, A, B, A: the lone B frame is outvoted
    assert_eq!(names, vec!["A", "A", "A", "A"]);
    assert_eq!(sink.downs(), vec!["a", "a", "a", "a"]);
}

#[tokio::test]
async fn test_invalid_reload_keeps_previous_settings() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        RecordingSink::default(),
        config(),
        templates.clone(),
        tx,
    );

    let broken = DetectionConfig {
        poll_interval: Duration::ZERO,
        confidence_threshold: 0.0,
        ..config()
    };
    assert!(matches!(
        detection.update_config(broken, TemplateStore::new()),
        Err(crate::detection::DetectionError::InvalidConfig(_))
    ));
    assert_eq!(detection.settings().config, config());
    assert_eq!(detection.settings().templates.len(), 1);
}

#[test]
fn test_start_outside_runtime_is_refused() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let (tx, mut rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        StaticSource::new(two_tone()),
        RecordingSink::default(),
        config(),
        templates,
        tx,
    );

    assert!(!detection.start());
    assert_eq!(detection.state(), RunState::Stopped);
    assert!(matches!(
        rx.try_recv(),
        Ok(DetectionEvent::StatusChanged(m)) if m.contains("runtime")
    ));
}

#[tokio::test]
async fn test_slow_tick_leaves_controller_responsive() {
    let mut templates = TemplateStore::new();
    templates.put("icon", two_tone(), Some("1".into()));
    let (tx, _rx) = create_detection_channel();
    let mut detection = DetectionLoop::new(
        SlowSource {
            frame: two_tone(),
            delay: std::time::Duration::from_millis(300),
        },
        RecordingSink::default(),
        config(),
        templates,
        tx,
    );

    assert!(detection.start());
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(
        started.elapsed() < std::time::Duration::from_millis(150),
        "controller stalled for {:?}",
        started.elapsed()
    );
    assert!(detection.pause());

    detection.stop().await;
    assert_eq!(detection.state(), RunState::Stopped);
}
