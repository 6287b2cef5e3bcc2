use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HandoffError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(HandoffError::Validation(format!(
                "latitude out of range: {}",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(HandoffError::Validation(format!(
                "longitude out of range: {}",
                lng
            )));
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Raw,
    Cooked,
}

impl std::fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FoodCategory::Raw => write!(f, "raw"),
            FoodCategory::Cooked => write!(f, "cooked"),
        }
    }
}

impl std::str::FromStr for FoodCategory {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(FoodCategory::Raw),
            "cooked" => Ok(FoodCategory::Cooked),
            other => Err(HandoffError::Validation(format!(
                "unknown food category: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Claimed,
    Completed,
    Expired,
    Cancelled,
}

impl ListingStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ListingStatus::Completed | ListingStatus::Expired | ListingStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListingStatus::Available => "available",
            ListingStatus::Claimed => "claimed",
            ListingStatus::Completed => "completed",
            ListingStatus::Expired => "expired",
            ListingStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ListingStatus {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(ListingStatus::Available),
            "claimed" => Ok(ListingStatus::Claimed),
            "completed" => Ok(ListingStatus::Completed),
            "expired" => Ok(ListingStatus::Expired),
            "cancelled" => Ok(ListingStatus::Cancelled),
            other => Err(HandoffError::Validation(format!(
                "unknown listing status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Claimed,
    EnRoute,
    AtLocation,
    Verified,
    Expired,
    Cancelled,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Verified | ClaimStatus::Expired | ClaimStatus::Cancelled
        )
    }

    /// The next step in the linear pickup chain, if any.
    pub fn successor(&self) -> Option<ClaimStatus> {
        match self {
            ClaimStatus::Claimed => Some(ClaimStatus::EnRoute),
            ClaimStatus::EnRoute => Some(ClaimStatus::AtLocation),
            ClaimStatus::AtLocation => Some(ClaimStatus::Verified),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::EnRoute => "en_route",
            ClaimStatus::AtLocation => "at_location",
            ClaimStatus::Verified => "verified",
            ClaimStatus::Expired => "expired",
            ClaimStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "claimed" => Ok(ClaimStatus::Claimed),
            "en_route" => Ok(ClaimStatus::EnRoute),
            "at_location" => Ok(ClaimStatus::AtLocation),
            "verified" => Ok(ClaimStatus::Verified),
            "expired" => Ok(ClaimStatus::Expired),
            "cancelled" => Ok(ClaimStatus::Cancelled),
            other => Err(HandoffError::Validation(format!(
                "unknown claim status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub donor_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: FoodCategory,
    pub quantity: u32,
    pub unit: String,
    /// Opaque media-store URLs; the core never touches image bytes.
    pub images: Vec<String>,
    pub location: GeoPoint,
    pub address: String,
    pub expires_at: DateTime<Utc>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub listing_id: String,
    pub claimant_id: String,
    pub pickup_token: String,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn new(listing_id: &str, claimant_id: &str, pickup_token: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            listing_id: listing_id.to_string(),
            claimant_id: claimant_id.to_string(),
            pickup_token,
            status: ClaimStatus::Claimed,
            claimed_at: Utc::now(),
            verified_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardReason {
    DonationCompleted,
    PickupCompleted,
    Bonus,
}

impl std::fmt::Display for AwardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AwardReason::DonationCompleted => "donation_completed",
            AwardReason::PickupCompleted => "pickup_completed",
            AwardReason::Bonus => "bonus",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AwardReason {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "donation_completed" => Ok(AwardReason::DonationCompleted),
            "pickup_completed" => Ok(AwardReason::PickupCompleted),
            "bonus" => Ok(AwardReason::Bonus),
            other => Err(HandoffError::Validation(format!(
                "unknown award reason: {}",
                other
            ))),
        }
    }
}

/// One immutable row of the points ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsEntry {
    pub id: i64,
    pub beneficiary: String,
    pub amount: i64,
    pub reason: AwardReason,
    pub claim_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub claim_id: String,
    pub donor_id: String,
    pub claimant_id: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// AI classification output consumed at listing creation. A suggestion is
/// never authoritative; fields are merged into donor input as defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeSuggestion {
    pub category: Option<FoodCategory>,
    pub estimated_expiry_hours: Option<i64>,
    #[serde(default)]
    pub quality_tips: Vec<String>,
    pub confidence: f64,
}

/// Donor input for a new listing, before suggestion merge and validation.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub donor_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<FoodCategory>,
    pub quantity: u32,
    pub unit: String,
    pub images: Vec<String>,
    pub location: GeoPoint,
    pub address: String,
    pub expires_in_hours: Option<i64>,
}

impl NewListing {
    pub(crate) fn into_listing(
        self,
        category: FoodCategory,
        expiry_hours: i64,
    ) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4().to_string(),
            donor_id: self.donor_id,
            title: self.title,
            description: self.description,
            category,
            quantity: self.quantity,
            unit: self.unit,
            images: self.images,
            location: self.location,
            address: self.address,
            expires_at: now + Duration::hours(expiry_hours),
            status: ListingStatus::Available,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            ListingStatus::Available,
            ListingStatus::Claimed,
            ListingStatus::Completed,
            ListingStatus::Expired,
            ListingStatus::Cancelled,
        ] {
            assert_eq!(ListingStatus::from_str(&status.to_string()).unwrap(), status);
        }

        for status in [
            ClaimStatus::Claimed,
            ClaimStatus::EnRoute,
            ClaimStatus::AtLocation,
            ClaimStatus::Verified,
            ClaimStatus::Expired,
            ClaimStatus::Cancelled,
        ] {
            assert_eq!(ClaimStatus::from_str(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn test_claim_chain_successors() {
        assert_eq!(ClaimStatus::Claimed.successor(), Some(ClaimStatus::EnRoute));
        assert_eq!(ClaimStatus::EnRoute.successor(), Some(ClaimStatus::AtLocation));
        assert_eq!(ClaimStatus::AtLocation.successor(), Some(ClaimStatus::Verified));
        assert_eq!(ClaimStatus::Verified.successor(), None);
        assert_eq!(ClaimStatus::Cancelled.successor(), None);
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(51.5, -0.12).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 181.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_suggestion_parses_with_missing_fields() {
        let suggestion: IntakeSuggestion =
            serde_json::from_str(r#"{"confidence": 0.8}"#).unwrap();
        assert!(suggestion.category.is_none());
        assert!(suggestion.quality_tips.is_empty());
    }
}
