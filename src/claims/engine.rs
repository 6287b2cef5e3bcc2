use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::claims::token;
use crate::config::PointsConfig;
use crate::error::{HandoffError, Result};
use crate::notify::{DomainEvent, Outbox};
use crate::storage::db::Database;
use crate::storage::models::{AwardReason, Claim, ClaimStatus, Listing, ListingStatus};

/// The claim -> pickup -> verification -> completion state machine.
///
/// Every transition is a CAS on the authoritative row; a lost race comes
/// back as a typed failure and is never retried here, because the caller's
/// intent may no longer hold once the state changed.
pub struct ClaimEngine {
    db: Arc<Database>,
    outbox: Outbox,
    points: PointsConfig,
}

impl ClaimEngine {
    pub fn new(db: Arc<Database>, outbox: Outbox, points: PointsConfig) -> Self {
        Self { db, outbox, points }
    }

    /// Reserve an available listing for a claimant and issue the pickup
    /// token. Exactly one of any number of concurrent callers wins.
    pub async fn claim(&self, listing_id: &str, claimant_id: &str) -> Result<Claim> {
        let listing = self
            .db
            .get_listing(listing_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("listing {}", listing_id)))?;

        let now = Utc::now();
        if listing.is_expired_at(now) {
            // Opportunistic expiry; losing this CAS means someone else
            // (another caller or the reaper) already handled it.
            if listing.status == ListingStatus::Available
                && self
                    .db
                    .transition_listing(listing_id, ListingStatus::Available, ListingStatus::Expired)
                    .is_ok()
            {
                self.outbox.emit(DomainEvent::ListingExpired {
                    listing_id: listing_id.to_string(),
                });
            }
            return Err(HandoffError::Expired(format!("listing {}", listing_id)));
        }

        match listing.status {
            ListingStatus::Available => {}
            ListingStatus::Claimed => return Err(HandoffError::AlreadyClaimed),
            _ => {
                return Err(HandoffError::AlreadyTerminal(format!(
                    "listing {}",
                    listing_id
                )))
            }
        }

        let claim = Claim::new(listing_id, claimant_id, token::issue());
        match self.db.claim_listing(&claim) {
            Ok(()) => {
                info!(listing = listing_id, claim = %claim.id, claimant = claimant_id, "listing claimed");
                self.outbox.emit(DomainEvent::ListingClaimed {
                    listing_id: listing_id.to_string(),
                    claim_id: claim.id.clone(),
                    claimant_id: claimant_id.to_string(),
                });
                Ok(claim)
            }
            Err(HandoffError::Conflict(_)) => {
                // Raced between the status read and the CAS; re-read to
                // report what actually happened.
                match self.db.get_listing(listing_id)? {
                    None => Err(HandoffError::NotFound(format!("listing {}", listing_id))),
                    Some(l) if l.status == ListingStatus::Claimed => {
                        debug!(listing = listing_id, "lost claim race");
                        Err(HandoffError::AlreadyClaimed)
                    }
                    Some(l) if l.status.is_terminal() => Err(HandoffError::AlreadyTerminal(
                        format!("listing {}", listing_id),
                    )),
                    Some(_) => Err(HandoffError::Conflict(format!("listing {}", listing_id))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Move a claim one step along claimed -> en_route -> at_location.
    /// Skipping steps is refused, as is advancing into `verified`, which is
    /// reachable only through `verify` with the pickup token.
    pub async fn advance(
        &self,
        claim_id: &str,
        expected: ClaimStatus,
        next: ClaimStatus,
    ) -> Result<Claim> {
        let claim = self
            .db
            .get_claim(claim_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("claim {}", claim_id)))?;
        if claim.status.is_terminal() {
            return Err(HandoffError::AlreadyTerminal(format!("claim {}", claim_id)));
        }

        let listing = self
            .db
            .get_listing(&claim.listing_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("listing {}", claim.listing_id)))?;
        if listing.is_expired_at(Utc::now()) {
            self.expire_pair(&listing, &claim)?;
            return Err(HandoffError::Expired(format!("claim {}", claim_id)));
        }

        match next {
            ClaimStatus::Verified => {
                return Err(HandoffError::Validation(
                    "verification requires the pickup token".to_string(),
                ))
            }
            ClaimStatus::Cancelled => {
                self.db
                    .transition_claim(claim_id, expected, ClaimStatus::Cancelled)?;
                self.release_listing(&listing)?;
            }
            ClaimStatus::Expired => {
                return Err(HandoffError::Validation(
                    "claims expire with their listing, not by request".to_string(),
                ))
            }
            _ => {
                if expected.successor() != Some(next) {
                    return Err(HandoffError::Validation(format!(
                        "cannot advance {} -> {}",
                        expected, next
                    )));
                }
                self.db.transition_claim(claim_id, expected, next)?;
            }
        }

        info!(claim = claim_id, %expected, %next, "claim advanced");
        self.db
            .get_claim(claim_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("claim {}", claim_id)))
    }

    /// Finalize the handoff. The claim must be at the pickup location and
    /// the presented token must match; success commits claim, listing and
    /// both ledger awards atomically.
    pub async fn verify(&self, claim_id: &str, presented_token: &str) -> Result<Claim> {
        let Some(claim) = self.db.get_claim(claim_id)? else {
            // Burn the same comparison work for an unknown claim id so
            // response timing does not reveal which part was wrong.
            let _ = token::matches(&token::issue(), presented_token);
            return Err(HandoffError::InvalidToken);
        };

        if claim.status.is_terminal() {
            return Err(HandoffError::AlreadyTerminal(format!("claim {}", claim_id)));
        }

        let listing = self
            .db
            .get_listing(&claim.listing_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("listing {}", claim.listing_id)))?;

        // The reaper is an optimization, not the enforcement point: the
        // expiry boundary is re-checked here regardless.
        let now = Utc::now();
        if listing.is_expired_at(now) {
            self.expire_pair(&listing, &claim)?;
            return Err(HandoffError::Expired(format!("claim {}", claim_id)));
        }

        if claim.status != ClaimStatus::AtLocation {
            return Err(HandoffError::StaleState {
                expected: ClaimStatus::AtLocation,
                actual: claim.status,
            });
        }

        if !token::matches(&claim.pickup_token, presented_token) {
            warn!(claim = claim_id, "pickup token mismatch");
            return Err(HandoffError::InvalidToken);
        }

        let awards = [
            (
                listing.donor_id.as_str(),
                AwardReason::DonationCompleted,
                self.points.donation_award,
            ),
            (
                claim.claimant_id.as_str(),
                AwardReason::PickupCompleted,
                self.points.pickup_award,
            ),
        ];
        self.db
            .verify_handoff(&claim.id, &listing.id, now, &awards)?;

        info!(claim = claim_id, listing = %listing.id, "handoff verified");
        self.outbox.emit(DomainEvent::ClaimVerified {
            listing_id: listing.id.clone(),
            claim_id: claim.id.clone(),
        });

        self.db
            .get_claim(claim_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("claim {}", claim_id)))
    }

    /// Cancel a non-terminal claim. The listing reopens for new claimants
    /// unless its own expiry has passed in the meantime.
    pub async fn cancel(&self, claim_id: &str, actor: &str) -> Result<()> {
        let claim = self
            .db
            .get_claim(claim_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("claim {}", claim_id)))?;
        if claim.status.is_terminal() {
            return Err(HandoffError::AlreadyTerminal(format!("claim {}", claim_id)));
        }

        let listing = self
            .db
            .get_listing(&claim.listing_id)?
            .ok_or_else(|| HandoffError::NotFound(format!("listing {}", claim.listing_id)))?;
        if actor != claim.claimant_id && actor != listing.donor_id {
            return Err(HandoffError::Validation(format!(
                "{} is neither the claimant nor the donor",
                actor
            )));
        }

        self.db
            .transition_claim(claim_id, claim.status, ClaimStatus::Cancelled)?;
        self.release_listing(&listing)?;

        info!(claim = claim_id, actor, "claim cancelled");
        Ok(())
    }

    /// Put a listing back in circulation after its claim ended, or expire
    /// it when the deadline has passed. Conflicts mean another writer got
    /// there first, which is fine.
    fn release_listing(&self, listing: &Listing) -> Result<()> {
        if listing.is_expired_at(Utc::now()) {
            match self
                .db
                .transition_listing(&listing.id, ListingStatus::Claimed, ListingStatus::Expired)
            {
                Ok(()) => self.outbox.emit(DomainEvent::ListingExpired {
                    listing_id: listing.id.clone(),
                }),
                Err(HandoffError::Conflict(_)) => {
                    debug!(listing = %listing.id, "listing already moved on")
                }
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        match self
            .db
            .transition_listing(&listing.id, ListingStatus::Claimed, ListingStatus::Available)
        {
            Ok(()) => self.outbox.emit(DomainEvent::ListingReopened {
                listing_id: listing.id.clone(),
            }),
            Err(HandoffError::Conflict(_)) => {
                debug!(listing = %listing.id, "listing already moved on")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Expire a claim together with its listing. Shared by the interactive
    /// guards and the reaper so races resolve identically everywhere.
    /// Returns which of the two records this call actually terminated.
    pub(crate) fn expire_pair(&self, listing: &Listing, claim: &Claim) -> Result<(bool, bool)> {
        let claim_expired = self.db.expire_claim(&claim.id)?;
        let listing_expired = match self
            .db
            .transition_listing(&listing.id, listing.status, ListingStatus::Expired)
        {
            Ok(()) => {
                self.outbox.emit(DomainEvent::ListingExpired {
                    listing_id: listing.id.clone(),
                });
                true
            }
            Err(HandoffError::Conflict(_)) => {
                debug!(listing = %listing.id, "expiry already handled");
                false
            }
            Err(e) => return Err(e),
        };
        Ok((listing_expired, claim_expired))
    }
}
