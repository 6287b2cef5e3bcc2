pub mod discovery;
pub mod intake;

pub use discovery::{nearby, DiscoveryHit};
pub use intake::ListingIntake;
