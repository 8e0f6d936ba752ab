//! Progress event sinks

use tokio::sync::broadcast;
use vmward_api::ProgressEvent;

/// Receiver of workflow progress reports
pub trait EventSink: Send + Sync {
    fn push(&self, event: ProgressEvent);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn push(&self, _event: ProgressEvent) {}
}

impl EventSink for broadcast::Sender<ProgressEvent> {
    fn push(&self, event: ProgressEvent) {
        // Ignore send errors (no subscribers is fine)
        let _ = self.send(event);
    }
}
