use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::claims::ClaimEngine;
use crate::error::{HandoffError, Result};
use crate::notify::{DomainEvent, Outbox};
use crate::storage::db::Database;
use crate::storage::models::ListingStatus;

/// Background sweep enforcing time-based transitions. It issues the same
/// CAS operations as the interactive paths, so losing a race to a user
/// action just means the record was already handled.
pub struct ExpiryReaper {
    db: Arc<Database>,
    engine: Arc<ClaimEngine>,
    outbox: Outbox,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<ClaimEngine>,
        outbox: Outbox,
        interval_secs: u64,
    ) -> Self {
        Self {
            db,
            engine,
            outbox,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// One pass over everything past its expiry. A single record's failure
    /// is logged and skipped; the sweep always reaches the end.
    pub fn sweep_once(&self) -> Result<SweepSummary> {
        let now = Utc::now();
        let candidates = self.db.expiry_candidates(now)?;
        let mut summary = SweepSummary {
            scanned: candidates.len(),
            ..Default::default()
        };

        for listing in candidates {
            let outcome = match listing.status {
                ListingStatus::Available => self.expire_available(&listing.id),
                ListingStatus::Claimed => self.expire_claimed(&listing),
                _ => continue,
            };
            match outcome {
                Ok((listing_expired, claim_expired)) => {
                    if listing_expired {
                        summary.expired_listings += 1;
                    }
                    if claim_expired {
                        summary.expired_claims += 1;
                    }
                }
                Err(e) => {
                    warn!(listing = %listing.id, error = %e, "sweep skipped a record");
                    summary.failures += 1;
                }
            }
        }

        Ok(summary)
    }

    fn expire_available(&self, listing_id: &str) -> Result<(bool, bool)> {
        match self
            .db
            .transition_listing(listing_id, ListingStatus::Available, ListingStatus::Expired)
        {
            Ok(()) => {
                self.outbox.emit(DomainEvent::ListingExpired {
                    listing_id: listing_id.to_string(),
                });
                Ok((true, false))
            }
            Err(HandoffError::Conflict(_)) | Err(HandoffError::NotFound(_)) => {
                debug!(listing = listing_id, "already handled elsewhere");
                Ok((false, false))
            }
            Err(e) => Err(e),
        }
    }

    fn expire_claimed(&self, listing: &crate::storage::models::Listing) -> Result<(bool, bool)> {
        match self.db.active_claim_for_listing(&listing.id)? {
            Some(claim) => {
                // A claim never silently reopens a listing past its expiry:
                // both records go terminal together.
                let (listing_expired, claim_expired) =
                    self.engine.expire_pair(listing, &claim)?;
                Ok((listing_expired, claim_expired))
            }
            None => {
                // Claim already terminal but the listing is still parked in
                // claimed; finish the job.
                match self.db.transition_listing(
                    &listing.id,
                    ListingStatus::Claimed,
                    ListingStatus::Expired,
                ) {
                    Ok(()) => {
                        self.outbox.emit(DomainEvent::ListingExpired {
                            listing_id: listing.id.clone(),
                        });
                        Ok((true, false))
                    }
                    Err(HandoffError::Conflict(_)) => Ok((false, false)),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Run sweeps forever at the configured interval.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "expiry reaper started");
        loop {
            match self.sweep_once() {
                Ok(summary) => {
                    if summary.expired_listings > 0 || summary.expired_claims > 0 {
                        info!(
                            scanned = summary.scanned,
                            listings = summary.expired_listings,
                            claims = summary.expired_claims,
                            failures = summary.failures,
                            "sweep expired stale records"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "sweep failed, will retry next interval"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub expired_listings: usize,
    pub expired_claims: usize,
    pub failures: usize,
}

impl SweepSummary {
    pub fn print_summary(&self) {
        println!("=== Expiry Sweep Summary ===");
        println!("Scanned:          {}", self.scanned);
        println!("Expired listings: {}", self.expired_listings);
        println!("Expired claims:   {}", self.expired_claims);
        println!("Failures:         {}", self.failures);
        println!("============================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::models::{ClaimStatus, FoodCategory, GeoPoint, Listing, NewListing};
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        reaper: ExpiryReaper,
        engine: Arc<ClaimEngine>,
        db: Arc<Database>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reaper.db");
        let db = Arc::new(Database::new(path.to_str().unwrap(), 2_000).unwrap());
        let outbox = Outbox::new();
        let config = Config::default();
        let engine = Arc::new(ClaimEngine::new(
            db.clone(),
            outbox.clone(),
            config.points.clone(),
        ));
        let reaper = ExpiryReaper::new(db.clone(), engine.clone(), outbox, 60);
        Fixture {
            reaper,
            engine,
            db,
            _dir: dir,
        }
    }

    fn post_listing(db: &Database, expires_in: ChronoDuration) -> Listing {
        let input = NewListing {
            donor_id: "donor-1".to_string(),
            title: "Fruit box".to_string(),
            description: None,
            category: None,
            quantity: 1,
            unit: "box".to_string(),
            images: vec![],
            location: GeoPoint {
                lat: 52.52,
                lng: 13.405,
            },
            address: "7 Kastanienallee".to_string(),
            expires_in_hours: None,
        };
        let mut listing = input.into_listing(FoodCategory::Raw, 1);
        listing.expires_at = Utc::now() + expires_in;
        db.insert_listing(&listing).unwrap();
        listing
    }

    #[tokio::test]
    async fn test_sweep_expires_claimed_listing_and_claim() {
        let f = fixture();
        let listing = post_listing(&f.db, ChronoDuration::milliseconds(50));
        let claim = f.engine.claim(&listing.id, "recipient-r").await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let summary = f.reaper.sweep_once().unwrap();

        assert_eq!(summary.expired_listings, 1);
        assert_eq!(summary.expired_claims, 1);
        assert_eq!(
            f.db.get_listing(&listing.id).unwrap().unwrap().status,
            ListingStatus::Expired
        );
        assert_eq!(
            f.db.get_claim(&claim.id).unwrap().unwrap().status,
            ClaimStatus::Expired
        );
        assert!(f.db.points_entries_for_claim(&claim.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expires_available_listing() {
        let f = fixture();
        let stale = post_listing(&f.db, ChronoDuration::seconds(-10));
        let fresh = post_listing(&f.db, ChronoDuration::hours(1));

        let summary = f.reaper.sweep_once().unwrap();
        assert_eq!(summary.expired_listings, 1);
        assert_eq!(
            f.db.get_listing(&stale.id).unwrap().unwrap().status,
            ListingStatus::Expired
        );
        assert_eq!(
            f.db.get_listing(&fresh.id).unwrap().unwrap().status,
            ListingStatus::Available
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let f = fixture();
        post_listing(&f.db, ChronoDuration::seconds(-10));

        let first = f.reaper.sweep_once().unwrap();
        assert_eq!(first.expired_listings, 1);

        let second = f.reaper.sweep_once().unwrap();
        assert_eq!(second.scanned, 0);
        assert_eq!(second.expired_listings, 0);
    }
}
