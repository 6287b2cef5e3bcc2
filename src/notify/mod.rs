pub mod dispatcher;
pub mod events;
pub mod outbox;

pub use dispatcher::{NotificationDispatcher, TracingDispatcher};
pub use events::DomainEvent;
pub use outbox::Outbox;
