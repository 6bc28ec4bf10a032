use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for capture and input operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// The error type for the screen capture / key injection boundary.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Screen capture of region {x},{y} {width}x{height} failed: {description}")]
    CaptureFailed {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        description: String,
    },

    #[error("Capture region {width}x{height} is empty")]
    EmptyRegion { width: u32, height: u32 },

    #[error("Frame directory {path:?} contains no PNG frames")]
    NoFrames { path: PathBuf },

    #[error("Failed to read frame directory {path:?}: {source}")]
    FrameDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode frame {path:?}: {source}")]
    FrameDecode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Key binding '{binding}' does not name any key")]
    EmptyKeyBinding { binding: String },

    #[error("Pressing '{key}' failed: {description}")]
    KeyDown { key: String, description: String },

    #[error("Releasing '{key}' failed: {description}")]
    KeyUp { key: String, description: String },
}

impl DeviceError {
    /// Whether this error came from the input side of the boundary.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DeviceError::EmptyKeyBinding { .. }
                | DeviceError::KeyDown { .. }
                | DeviceError::KeyUp { .. }
        )
    }

    pub fn capture_failed(region: &super::ScanRegion, description: impl Into<String>) -> Self {
        DeviceError::CaptureFailed {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            description: description.into(),
        }
    }
}
