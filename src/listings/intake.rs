use tracing::{debug, info};

use crate::config::IntakeConfig;
use crate::error::{HandoffError, Result};
use crate::notify::{DomainEvent, Outbox};
use crate::storage::db::Database;
use crate::storage::models::{GeoPoint, IntakeSuggestion, Listing, NewListing};

/// Listing intake: validation plus the AI-suggestion merge. The suggestion
/// is only ever a default provider; donor input always wins, and low
/// confidence disqualifies the suggestion entirely. Merge logic lives here
/// and nowhere else.
pub struct ListingIntake {
    config: IntakeConfig,
}

impl ListingIntake {
    pub fn new(config: IntakeConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        input: NewListing,
        suggestion: Option<IntakeSuggestion>,
    ) -> Result<Listing> {
        if input.title.trim().is_empty() {
            return Err(HandoffError::Validation("title is required".to_string()));
        }
        if input.quantity == 0 {
            return Err(HandoffError::Validation(
                "quantity must be positive".to_string(),
            ));
        }
        if input.unit.trim().is_empty() {
            return Err(HandoffError::Validation("unit is required".to_string()));
        }
        if input.address.trim().is_empty() {
            return Err(HandoffError::Validation("address is required".to_string()));
        }
        // Coordinates arrive pre-built but may come straight off the wire.
        GeoPoint::new(input.location.lat, input.location.lng)?;
        if let Some(hours) = input.expires_in_hours {
            if hours <= 0 {
                return Err(HandoffError::Validation(
                    "expiry must lie in the future".to_string(),
                ));
            }
        }

        let suggestion = suggestion.filter(|s| {
            let usable = s.confidence >= self.config.min_confidence;
            if !usable {
                debug!(confidence = s.confidence, "ignoring low-confidence suggestion");
            }
            usable
        });

        let category = input
            .category
            .or_else(|| suggestion.as_ref().and_then(|s| s.category))
            .ok_or_else(|| {
                HandoffError::Validation(
                    "category required: none given and no usable suggestion".to_string(),
                )
            })?;

        let expiry_hours = input
            .expires_in_hours
            .or_else(|| suggestion.as_ref().and_then(|s| s.estimated_expiry_hours))
            .unwrap_or(self.config.default_expiry_hours);

        Ok(input.into_listing(category, expiry_hours))
    }

    /// Build, persist and announce a new listing.
    pub fn create(
        &self,
        db: &Database,
        outbox: &Outbox,
        input: NewListing,
        suggestion: Option<IntakeSuggestion>,
    ) -> Result<Listing> {
        let listing = self.build(input, suggestion)?;
        db.insert_listing(&listing)?;
        info!(listing = %listing.id, donor = %listing.donor_id, "listing created");
        outbox.emit(DomainEvent::ListingCreated {
            listing_id: listing.id.clone(),
            donor_id: listing.donor_id.clone(),
        });
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::FoodCategory;
    use chrono::Utc;

    fn intake() -> ListingIntake {
        ListingIntake::new(IntakeConfig {
            default_expiry_hours: 12,
            min_confidence: 0.6,
        })
    }

    fn input() -> NewListing {
        NewListing {
            donor_id: "donor-1".to_string(),
            title: "Leftover rice".to_string(),
            description: None,
            category: None,
            quantity: 3,
            unit: "containers".to_string(),
            images: vec![],
            location: GeoPoint {
                lat: 19.076,
                lng: 72.8777,
            },
            address: "2 Marine Drive".to_string(),
            expires_in_hours: None,
        }
    }

    fn suggestion(confidence: f64) -> IntakeSuggestion {
        IntakeSuggestion {
            category: Some(FoodCategory::Cooked),
            estimated_expiry_hours: Some(6),
            quality_tips: vec![],
            confidence,
        }
    }

    #[test]
    fn test_confident_suggestion_fills_defaults() {
        let listing = intake().build(input(), Some(suggestion(0.9))).unwrap();
        assert_eq!(listing.category, FoodCategory::Cooked);
        let hours = (listing.expires_at - Utc::now()).num_hours();
        assert!((5..=6).contains(&hours), "got {}", hours);
    }

    #[test]
    fn test_low_confidence_suggestion_ignored() {
        let err = intake().build(input(), Some(suggestion(0.3))).unwrap_err();
        assert!(matches!(err, HandoffError::Validation(_)));
    }

    #[test]
    fn test_donor_input_beats_suggestion() {
        let mut donor_input = input();
        donor_input.category = Some(FoodCategory::Raw);
        donor_input.expires_in_hours = Some(48);

        let listing = intake().build(donor_input, Some(suggestion(0.95))).unwrap();
        assert_eq!(listing.category, FoodCategory::Raw);
        let hours = (listing.expires_at - Utc::now()).num_hours();
        assert!((47..=48).contains(&hours), "got {}", hours);
    }

    #[test]
    fn test_default_expiry_without_any_hint() {
        let mut donor_input = input();
        donor_input.category = Some(FoodCategory::Raw);

        let listing = intake().build(donor_input, None).unwrap();
        let hours = (listing.expires_at - Utc::now()).num_hours();
        assert!((11..=12).contains(&hours), "got {}", hours);
    }

    #[test]
    fn test_validation_failures() {
        let intake = intake();

        let mut bad = input();
        bad.title = "  ".to_string();
        assert!(matches!(
            intake.build(bad, Some(suggestion(0.9))).unwrap_err(),
            HandoffError::Validation(_)
        ));

        let mut bad = input();
        bad.quantity = 0;
        assert!(matches!(
            intake.build(bad, Some(suggestion(0.9))).unwrap_err(),
            HandoffError::Validation(_)
        ));

        let mut bad = input();
        bad.expires_in_hours = Some(-2);
        assert!(matches!(
            intake.build(bad, Some(suggestion(0.9))).unwrap_err(),
            HandoffError::Validation(_)
        ));
    }
}
