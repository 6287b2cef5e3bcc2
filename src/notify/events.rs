use serde::Serialize;

/// Immutable domain events emitted by the core. Outbound kinds go to the
/// notification dispatcher; `ListingReopened` exists only to keep the
/// GeoIndex projection current and is never dispatched.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    ListingCreated {
        listing_id: String,
        donor_id: String,
    },
    ListingClaimed {
        listing_id: String,
        claim_id: String,
        claimant_id: String,
    },
    ClaimVerified {
        listing_id: String,
        claim_id: String,
    },
    ListingExpired {
        listing_id: String,
    },
    ListingReopened {
        listing_id: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ListingCreated { .. } => "listing_created",
            DomainEvent::ListingClaimed { .. } => "listing_claimed",
            DomainEvent::ClaimVerified { .. } => "claim_verified",
            DomainEvent::ListingExpired { .. } => "listing_expired",
            DomainEvent::ListingReopened { .. } => "listing_reopened",
        }
    }

    /// Whether this event crosses the notification boundary.
    pub fn is_outbound(&self) -> bool {
        !matches!(self, DomainEvent::ListingReopened { .. })
    }

    pub fn listing_id(&self) -> &str {
        match self {
            DomainEvent::ListingCreated { listing_id, .. }
            | DomainEvent::ListingClaimed { listing_id, .. }
            | DomainEvent::ClaimVerified { listing_id, .. }
            | DomainEvent::ListingExpired { listing_id }
            | DomainEvent::ListingReopened { listing_id } => listing_id,
        }
    }
}
