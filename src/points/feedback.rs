use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{HandoffError, Result};
use crate::points::ledger::PointsLedger;
use crate::storage::db::Database;
use crate::storage::models::{AwardReason, ClaimStatus, Feedback};

/// Post-handoff feedback. One record per claim, ratings 1-5; a good rating
/// earns the donor a bonus through the ledger (idempotent by claim).
pub struct FeedbackService {
    db: Arc<Database>,
    ledger: PointsLedger,
    bonus: i64,
}

impl FeedbackService {
    pub fn new(db: Arc<Database>, bonus: i64) -> Self {
        let ledger = PointsLedger::new(db.clone());
        Self { db, ledger, bonus }
    }

    pub fn record(&self, claim_id: &str, rating: u8, comment: Option<String>) -> Result<Feedback> {
        if !(1..=5).contains(&rating) {
            return Err(HandoffError::Validation(format!(
                "rating must be 1-5, got {}",
                rating
            )));
        }

        let claim = self
            .db
            .get_claim(claim_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("claim {}", claim_id)))?;
        if claim.status != ClaimStatus::Verified {
            return Err(HandoffError::Validation(
                "feedback applies to verified handoffs only".to_string(),
            ));
        }
        if self.db.feedback_for_claim(claim_id)?.is_some() {
            return Err(HandoffError::Conflict(format!(
                "feedback for claim {}",
                claim_id
            )));
        }

        let listing = self
            .db
            .get_listing(&claim.listing_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("listing {}", claim.listing_id)))?;

        let feedback = Feedback {
            id: Uuid::new_v4().to_string(),
            claim_id: claim.id.clone(),
            donor_id: listing.donor_id.clone(),
            claimant_id: claim.claimant_id.clone(),
            rating,
            comment,
            created_at: Utc::now(),
        };
        self.db.insert_feedback(&feedback)?;

        if rating >= 4 {
            self.ledger.award(
                &listing.donor_id,
                AwardReason::Bonus,
                self.bonus,
                Some(&claim.id),
            )?;
        }

        info!(claim = claim_id, rating, "feedback recorded");
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Claim, FoodCategory, GeoPoint, ListingStatus, NewListing};

    fn setup() -> (FeedbackService, Arc<Database>, Claim, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.db");
        let db = Arc::new(Database::new(path.to_str().unwrap(), 2_000).unwrap());

        let input = NewListing {
            donor_id: "donor-1".to_string(),
            title: "Bread".to_string(),
            description: None,
            category: None,
            quantity: 2,
            unit: "loaves".to_string(),
            images: vec![],
            location: GeoPoint { lat: 1.0, lng: 1.0 },
            address: "5 Mill Lane".to_string(),
            expires_in_hours: None,
        };
        let listing = input.into_listing(FoodCategory::Raw, 4);
        db.insert_listing(&listing).unwrap();

        let claim = Claim::new(&listing.id, "recipient-r", "token".to_string());
        db.claim_listing(&claim).unwrap();
        db.transition_claim(&claim.id, ClaimStatus::Claimed, ClaimStatus::EnRoute)
            .unwrap();
        db.transition_claim(&claim.id, ClaimStatus::EnRoute, ClaimStatus::AtLocation)
            .unwrap();
        db.verify_handoff(&claim.id, &listing.id, Utc::now(), &[])
            .unwrap();

        (FeedbackService::new(db.clone(), 10), db, claim, dir)
    }

    #[test]
    fn test_feedback_awards_bonus_once() {
        let (service, db, claim, _dir) = setup();
        service
            .record(&claim.id, 5, Some("right on time".to_string()))
            .unwrap();
        assert_eq!(db.points_balance("donor-1").unwrap(), 10);

        let err = service.record(&claim.id, 4, None).unwrap_err();
        assert!(matches!(err, HandoffError::Conflict(_)));
        assert_eq!(db.points_balance("donor-1").unwrap(), 10);
    }

    #[test]
    fn test_low_rating_skips_bonus() {
        let (service, db, claim, _dir) = setup();
        service.record(&claim.id, 2, None).unwrap();
        assert_eq!(db.points_balance("donor-1").unwrap(), 0);
    }

    #[test]
    fn test_rating_bounds_and_unverified_claim() {
        let (service, db, claim, _dir) = setup();
        assert!(matches!(
            service.record(&claim.id, 0, None).unwrap_err(),
            HandoffError::Validation(_)
        ));
        assert!(matches!(
            service.record(&claim.id, 6, None).unwrap_err(),
            HandoffError::Validation(_)
        ));

        // A claim that never reached verified takes no feedback.
        let listing = db.get_listing(&claim.listing_id).unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Completed);
        assert!(matches!(
            service.record("missing-claim", 3, None).unwrap_err(),
            HandoffError::NotFound(_)
        ));
    }
}
