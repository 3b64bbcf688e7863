use model::events::copy::CopyEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Non-blocking handle for publishing progress events to an external
/// consumer. Sending never suspends the engine: a full channel drops the
/// event with a warning rather than stalling a worker.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<CopyEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<CopyEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything. Handy for tests and embedded use.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: CopyEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(err) = tx.try_send(event) {
            warn!(
                error = %err,
                "Dropped progress event for slow consumer (channel full or closed)"
            );
        }
    }
}
