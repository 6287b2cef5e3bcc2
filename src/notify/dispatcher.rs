use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::notify::events::DomainEvent;

/// Boundary seam for notification delivery. Implementations receive the
/// four outbound event kinds; formatting and transport are their concern.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: &DomainEvent);
}

/// Default dispatcher: structured log lines only. Push/email/webhook
/// delivery belongs to an external collaborator.
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, event: &DomainEvent) {
        info!(
            kind = event.kind(),
            listing = event.listing_id(),
            "notification event"
        );
    }
}

/// Forward queued events to a dispatcher until the outbox closes. Internal
/// projection events are filtered out here, not in the dispatcher.
pub async fn run_dispatch_loop(
    mut rx: broadcast::Receiver<DomainEvent>,
    dispatcher: impl NotificationDispatcher,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.is_outbound() {
                    dispatcher.dispatch(&event);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "notification consumer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Drain whatever is already queued, synchronously. One-shot CLI commands
/// use this after the operation instead of running the loop.
pub fn drain_pending(
    rx: &mut broadcast::Receiver<DomainEvent>,
    dispatcher: &dyn NotificationDispatcher,
) {
    while let Ok(event) = rx.try_recv() {
        if event.is_outbound() {
            dispatcher.dispatch(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::outbox::Outbox;

    #[test]
    fn test_drain_filters_internal_events() {
        let outbox = Outbox::new();
        let mut rx = outbox.subscribe();

        outbox.emit(DomainEvent::ListingCreated {
            listing_id: "l-1".to_string(),
            donor_id: "d-1".to_string(),
        });
        outbox.emit(DomainEvent::ListingReopened {
            listing_id: "l-1".to_string(),
        });
        outbox.emit(DomainEvent::ListingExpired {
            listing_id: "l-1".to_string(),
        });

        let mut mock = MockNotificationDispatcher::new();
        mock.expect_dispatch()
            .withf(|e| e.kind() == "listing_created")
            .times(1)
            .return_const(());
        mock.expect_dispatch()
            .withf(|e| e.kind() == "listing_expired")
            .times(1)
            .return_const(());

        drain_pending(&mut rx, &mock);
    }
}
