use spell_trigger::args::{Args, Mode};
use spell_trigger::detection::{DetectionEvent, DetectionLoop, create_detection_channel};
use spell_trigger::device::{FrameDirectorySource, LoggingInputSink};
use spell_trigger::settings::SettingsStore;
use spell_trigger::template_matching::MatchEngine;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let Some(args) = Args::parse() else {
        return ExitCode::SUCCESS;
    };

    let default_level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let settings = match &args.config_dir {
        Some(dir) => SettingsStore::new(dir),
        None => match SettingsStore::open_default() {
            Ok(store) => store,
            Err(e) => {
                eprintln!("❌ {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let result = match &args.mode {
        Mode::Match(frame) => run_match(&settings, frame),
        Mode::Replay(dir) => run_replay(&settings, dir, args.timeout_secs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_match(settings: &SettingsStore, frame_path: &Path) -> Result<(), String> {
    let (config, templates) = settings.load().map_err(|e| e.to_string())?;
    if templates.is_empty() {
        return Err(format!("No templates in {}", settings.dir().display()));
    }

    let frame = image::open(frame_path)
        .map_err(|e| format!("Failed to load frame {}: {e}", frame_path.display()))?;

    let mut engine = MatchEngine::new().with_preprocessing(config.preprocess.clone());
    let best = engine.find_best_match(
        &frame,
        templates.entries(),
        &config.methods,
        config.confidence_threshold,
    );

    match best {
        Some(result) => {
            let key = templates.key_for(&result.name).unwrap_or("<unbound>");
            println!(
                "✅ {} confidence={:.3} at ({}, {}) via {} -> key '{}'",
                result.name, result.confidence, result.location.0, result.location.1, result.method, key
            );
        }
        None => println!(
            "❌ No template above threshold {:.2}",
            config.confidence_threshold
        ),
    }

    let stats = engine.stats();
    println!(
        "📊 calls={} failed={} template={} sift={} orb={} histogram={}",
        stats.total_calls,
        stats.failed_matches,
        stats.template_matches,
        stats.sift_matches,
        stats.orb_matches,
        stats.histogram_matches
    );
    Ok(())
}

fn run_replay(settings: &SettingsStore, frames: &Path, timeout_secs: u64) -> Result<(), String> {
    let (config, templates) = settings.load().map_err(|e| e.to_string())?;
    let source = FrameDirectorySource::open(frames).map_err(|e| e.to_string())?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {e}"))?;
    rt.block_on(async move {
        let (event_tx, mut event_rx) = create_detection_channel();
        let mut detection =
            DetectionLoop::new(source, LoggingInputSink::new(), config, templates, event_tx);

        if !detection.start() {
            return Err("Detection could not start, check the settings".to_string());
        }

        let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
        tokio::pin!(deadline);
        let mut detections = 0usize;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = event_rx.recv() => match event {
                    Some(DetectionEvent::IconDetected { name, confidence }) => {
                        detections += 1;
                        println!("🎯 {name} ({confidence:.3})");
                    }
                    Some(DetectionEvent::StatusChanged(status)) => println!("ℹ️ {status}"),
                    Some(DetectionEvent::FrameCaptured(_)) => {}
                    None => break,
                },
            }
        }

        detection.stop().await;
        let perf = detection.get_performance_stats();
        println!(
            "📊 {detections} detection(s), {:.1} fps, frame time avg {:.1}ms min {:.1}ms max {:.1}ms",
            perf.fps,
            perf.avg_frame_time * 1000.0,
            perf.min_frame_time * 1000.0,
            perf.max_frame_time * 1000.0
        );
        Ok(())
    })
}
