pub mod sweeper;

pub use sweeper::{ExpiryReaper, SweepSummary};
