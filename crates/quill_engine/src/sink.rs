use std::sync::mpsc;

use quill_core::PipelineEvent;

/// Receives every pipeline event in the order it happened.
///
/// Called many times per second while a stream is open, so implementations
/// must not block.
pub trait StoreSink: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}

/// Forwards events to a single consumer thread (the store adapter).
pub struct ChannelStoreSink {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ChannelStoreSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl StoreSink for ChannelStoreSink {
    fn publish(&self, event: PipelineEvent) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}
