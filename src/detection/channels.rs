// Communication channels for the detection loop
use super::types::DetectionEvent;
use tokio::sync::mpsc;

pub const EVENT_CAPACITY: usize = 32;

/// Bounded event channel; the worker never blocks on a slow consumer
pub fn create_detection_channel() -> (mpsc::Sender<DetectionEvent>, mpsc::Receiver<DetectionEvent>) {
    mpsc::channel(EVENT_CAPACITY)
}
