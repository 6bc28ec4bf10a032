//! Offline collaborators: PNG frames from disk and a key sink that only logs.
//! Used by the `--replay` CLI mode and by tests.

use super::error::{DeviceError, DeviceResult};
use super::region::ScanRegion;
use super::types::{ImageSource, InputSink};
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the PNG files of a directory in name order, cropping each
/// one to the requested region as if it were a full-screen grab.
pub struct FrameDirectorySource {
    frames: Vec<(PathBuf, DynamicImage)>,
    next: AtomicUsize,
}

impl FrameDirectorySource {
    pub fn open(directory: &Path) -> DeviceResult<Self> {
        let entries = std::fs::read_dir(directory).map_err(|source| DeviceError::FrameDirectory {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect();

        // Sort for consistent ordering
        paths.sort();

        if paths.is_empty() {
            return Err(DeviceError::NoFrames {
                path: directory.to_path_buf(),
            });
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let image = image::open(&path).map_err(|source| DeviceError::FrameDecode {
                path: path.clone(),
                source,
            })?;
            frames.push((path, image));
        }

        log::info!(
            "Loaded {} replay frame(s) from {}",
            frames.len(),
            directory.display()
        );
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<(PathBuf, DynamicImage)>) -> Self {
        Self {
            frames,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ImageSource for FrameDirectorySource {
    fn capture(&self, region: &ScanRegion) -> DeviceResult<DynamicImage> {
        if !region.is_valid() {
            return Err(DeviceError::EmptyRegion {
                width: region.width,
                height: region.height,
            });
        }
        if self.frames.is_empty() {
            return Err(DeviceError::capture_failed(region, "no frames loaded"));
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        let (path, frame) = &self.frames[index];
        let (width, height) = frame.dimensions();

        if region.x >= width || region.y >= height {
            return Err(DeviceError::capture_failed(
                region,
                format!("outside {}x{} frame {}", width, height, path.display()),
            ));
        }

        let clipped = region.clip_to_screen(width, height);
        log::trace!("Replaying {} cropped to {}", path.display(), clipped);
        Ok(frame.crop_imm(clipped.x, clipped.y, clipped.width, clipped.height))
    }
}

/// Dry-run sink: logs every key transition and records the taps.
#[derive(Default)]
pub struct LoggingInputSink {
    pressed: Mutex<Vec<String>>,
}

impl LoggingInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys released so far, in order
    pub fn history(&self) -> Vec<String> {
        self.pressed
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }
}

impl InputSink for LoggingInputSink {
    fn key_down(&self, key: &str) -> DeviceResult<()> {
        log::info!("⌨️ key down: {}", key);
        Ok(())
    }

    fn key_up(&self, key: &str) -> DeviceResult<()> {
        log::info!("⌨️ key up: {}", key);
        if let Ok(mut keys) = self.pressed.lock() {
            keys.push(key.to_string());
        }
        Ok(())
    }
}
