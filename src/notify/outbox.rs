use tokio::sync::broadcast;
use tracing::debug;

use crate::notify::events::DomainEvent;

const OUTBOX_CAPACITY: usize = 256;

/// Outbound event queue. The core only pushes; consumers (notification
/// dispatch, geo projection) subscribe independently and may lag or be
/// absent entirely.
#[derive(Clone)]
pub struct Outbox {
    tx: broadcast::Sender<DomainEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(OUTBOX_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: DomainEvent) {
        debug!(kind = event.kind(), listing = event.listing_id(), "event emitted");
        // No subscribers is fine; the queue is best-effort by contract.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}
