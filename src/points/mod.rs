pub mod feedback;
pub mod ledger;

pub use feedback::FeedbackService;
pub use ledger::PointsLedger;
