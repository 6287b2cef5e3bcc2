pub mod db;
pub mod models;

pub use db::{Database, StoreStats};
pub use models::{Claim, ClaimStatus, Listing, ListingStatus, PointsEntry};
