// Device module - screen capture and key injection boundary
// The detection core talks to the platform only through the traits in
// `types`; concrete OS backends live outside this crate.

pub mod error;
pub mod keyboard;
pub mod region;
pub mod replay;
pub mod types;

// Re-export the main types and functions for easy access
pub use error::{DeviceError, DeviceResult};
pub use keyboard::{KeyChord, KeyDispatcher};
pub use region::ScanRegion;
pub use replay::{FrameDirectorySource, LoggingInputSink};
pub use types::{ImageSource, InputSink};
