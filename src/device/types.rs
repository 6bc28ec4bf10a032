// Capture / input boundary consumed by the detection loop
use super::error::DeviceResult;
use super::region::ScanRegion;
use image::DynamicImage;

/// Source of screen pixels. Platform backends implement this; the core only
/// ever asks for one rectangle per tick.
///
/// Implementations must return promptly: a capture that cannot complete
/// should fail instead of blocking the worker.
pub trait ImageSource: Send + Sync {
    fn capture(&self, region: &ScanRegion) -> DeviceResult<DynamicImage>;
}

/// Sink for synthetic keystrokes sent to the focused application.
///
/// Keys are named the way they appear in key bindings (`"1"`, `"alt"`,
/// `"shift"`, `"f5"`); translating names to scan codes is the backend's job.
pub trait InputSink: Send + Sync {
    fn key_down(&self, key: &str) -> DeviceResult<()>;
    fn key_up(&self, key: &str) -> DeviceResult<()>;

    /// Tap a single key
    fn press(&self, key: &str) -> DeviceResult<()> {
        self.key_down(key)?;
        self.key_up(key)
    }
}

impl<T: ImageSource + ?Sized> ImageSource for std::sync::Arc<T> {
    fn capture(&self, region: &ScanRegion) -> DeviceResult<DynamicImage> {
        (**self).capture(region)
    }
}

impl<T: InputSink + ?Sized> InputSink for std::sync::Arc<T> {
    fn key_down(&self, key: &str) -> DeviceResult<()> {
        (**self).key_down(key)
    }

    fn key_up(&self, key: &str) -> DeviceResult<()> {
        (**self).key_up(key)
    }

    fn press(&self, key: &str) -> DeviceResult<()> {
        (**self).press(key)
    }
}
