use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{HandoffError, Result};
use crate::storage::models::{
    AwardReason, Claim, ClaimStatus, Feedback, GeoPoint, Listing, ListingStatus, PointsEntry,
};

/// Durable store for listings, claims, the points ledger and feedback.
///
/// All status transitions go through compare-and-swap updates on the single
/// authoritative row; zero rows changed means the caller lost a race or the
/// record is gone, never a partial write.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &str, busy_timeout_ms: u64) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                donor_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                category TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                unit TEXT NOT NULL,
                images TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                address TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS claims (
                id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL,
                claimant_id TEXT NOT NULL,
                pickup_token TEXT NOT NULL,
                status TEXT NOT NULL,
                claimed_at TEXT NOT NULL,
                verified_at TEXT,
                FOREIGN KEY (listing_id) REFERENCES listings(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS points_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                beneficiary TEXT NOT NULL,
                amount INTEGER NOT NULL,
                reason TEXT NOT NULL,
                claim_id TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                claim_id TEXT NOT NULL,
                donor_id TEXT NOT NULL,
                claimant_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (claim_id) REFERENCES claims(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listings_status ON listings(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_claims_listing ON claims(listing_id, status)",
            [],
        )?;
        // Natural dedup key for awards tied to a claim.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_points_claim_reason
             ON points_entries(claim_id, reason) WHERE claim_id IS NOT NULL",
            [],
        )?;

        Ok(())
    }

    // ---- listings ----

    pub fn insert_listing(&self, listing: &Listing) -> Result<()> {
        self.conn().execute(
            "INSERT INTO listings
             (id, donor_id, title, description, category, quantity, unit, images,
              lat, lng, address, expires_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                listing.id,
                listing.donor_id,
                listing.title,
                listing.description,
                listing.category.to_string(),
                listing.quantity,
                listing.unit,
                serde_json::to_string(&listing.images)?,
                listing.location.lat,
                listing.location.lng,
                listing.address,
                listing.expires_at.to_rfc3339(),
                listing.status.to_string(),
                listing.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let conn = self.conn();
        let listing = conn
            .query_row(
                "SELECT id, donor_id, title, description, category, quantity, unit, images,
                        lat, lng, address, expires_at, status, created_at
                 FROM listings WHERE id = ?1",
                [id],
                row_to_listing,
            )
            .optional()?;
        Ok(listing)
    }

    /// Compare-and-swap on a listing's status. Fails with Conflict when the
    /// stored status no longer equals `from`, NotFound when the row is gone.
    pub fn transition_listing(
        &self,
        id: &str,
        from: ListingStatus,
        to: ListingStatus,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE listings SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.to_string(), to.to_string()],
        )?;
        if changed == 1 {
            return Ok(());
        }
        match self.get_listing(id)? {
            None => Err(HandoffError::NotFound(format!("listing {}", id))),
            Some(_) => Err(HandoffError::Conflict(format!("listing {}", id))),
        }
    }

    pub fn listings_with_status(&self, status: ListingStatus) -> Result<Vec<Listing>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, donor_id, title, description, category, quantity, unit, images,
                    lat, lng, address, expires_at, status, created_at
             FROM listings WHERE status = ?1",
        )?;
        let listings = stmt
            .query_map([status.to_string()], row_to_listing)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(listings)
    }

    /// Listings still in a forward-progress state whose expiry has passed.
    /// The timestamp filter runs on parsed values, not on the stored text.
    pub fn expiry_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Listing>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, donor_id, title, description, category, quantity, unit, images,
                    lat, lng, address, expires_at, status, created_at
             FROM listings WHERE status IN ('available', 'claimed')",
        )?;
        let listings = stmt
            .query_map([], row_to_listing)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(listings
            .into_iter()
            .filter(|l| l.is_expired_at(now))
            .collect())
    }

    // ---- claims ----

    /// Atomically claim a listing: CAS available -> claimed plus the claim
    /// row insert happen in one transaction, so no two claims can ever be
    /// live for one listing.
    pub fn claim_listing(&self, claim: &Claim) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE listings SET status = 'claimed' WHERE id = ?1 AND status = 'available'",
            [&claim.listing_id],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls back; the engine re-reads the
            // listing to report the precise failure.
            return Err(HandoffError::Conflict(format!(
                "listing {}",
                claim.listing_id
            )));
        }
        tx.execute(
            "INSERT INTO claims
             (id, listing_id, claimant_id, pickup_token, status, claimed_at, verified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                claim.id,
                claim.listing_id,
                claim.claimant_id,
                claim.pickup_token,
                claim.status.to_string(),
                claim.claimed_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_claim(&self, id: &str) -> Result<Option<Claim>> {
        let conn = self.conn();
        let claim = conn
            .query_row(
                "SELECT id, listing_id, claimant_id, pickup_token, status, claimed_at, verified_at
                 FROM claims WHERE id = ?1",
                [id],
                row_to_claim,
            )
            .optional()?;
        Ok(claim)
    }

    pub fn active_claim_for_listing(&self, listing_id: &str) -> Result<Option<Claim>> {
        let conn = self.conn();
        let claim = conn
            .query_row(
                "SELECT id, listing_id, claimant_id, pickup_token, status, claimed_at, verified_at
                 FROM claims
                 WHERE listing_id = ?1 AND status IN ('claimed', 'en_route', 'at_location')",
                [listing_id],
                row_to_claim,
            )
            .optional()?;
        Ok(claim)
    }

    /// Compare-and-swap on a claim's status; StaleState carries the stored
    /// status so the caller can refresh instead of blindly retrying.
    pub fn transition_claim(&self, id: &str, from: ClaimStatus, to: ClaimStatus) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE claims SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.to_string(), to.to_string()],
        )?;
        if changed == 1 {
            return Ok(());
        }
        match self.get_claim(id)? {
            None => Err(HandoffError::NotFound(format!("claim {}", id))),
            Some(claim) => Err(HandoffError::StaleState {
                expected: from,
                actual: claim.status,
            }),
        }
    }

    /// Expire a claim from whatever non-terminal state it is in. Returns
    /// false when the claim was already terminal (a lost race, not an error).
    pub fn expire_claim(&self, id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE claims SET status = 'expired'
             WHERE id = ?1 AND status IN ('claimed', 'en_route', 'at_location')",
            [id],
        )?;
        Ok(changed == 1)
    }

    /// Commit a verified handoff: claim -> verified, listing -> completed and
    /// the ledger awards, all in one transaction. Any failed step rolls the
    /// whole verification back.
    pub fn verify_handoff(
        &self,
        claim_id: &str,
        listing_id: &str,
        verified_at: DateTime<Utc>,
        awards: &[(&str, AwardReason, i64)],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE claims SET status = 'verified', verified_at = ?2
             WHERE id = ?1 AND status = 'at_location'",
            params![claim_id, verified_at.to_rfc3339()],
        )?;
        if changed == 0 {
            let actual: Option<String> = tx
                .query_row("SELECT status FROM claims WHERE id = ?1", [claim_id], |r| {
                    r.get(0)
                })
                .optional()?;
            return Err(match actual {
                None => HandoffError::NotFound(format!("claim {}", claim_id)),
                Some(s) => {
                    let status: ClaimStatus = s.parse()?;
                    if status.is_terminal() {
                        HandoffError::AlreadyTerminal(format!("claim {}", claim_id))
                    } else {
                        HandoffError::StaleState {
                            expected: ClaimStatus::AtLocation,
                            actual: status,
                        }
                    }
                }
            });
        }

        let changed = tx.execute(
            "UPDATE listings SET status = 'completed' WHERE id = ?1 AND status = 'claimed'",
            [listing_id],
        )?;
        if changed == 0 {
            return Err(HandoffError::VerificationFailed(format!(
                "listing {} left the claimed state",
                listing_id
            )));
        }

        for (beneficiary, reason, amount) in awards {
            tx.execute(
                "INSERT OR IGNORE INTO points_entries
                 (beneficiary, amount, reason, claim_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    beneficiary,
                    amount,
                    reason.to_string(),
                    claim_id,
                    verified_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ---- points ledger ----

    /// Append-only award insert. The unique (claim_id, reason) index makes
    /// re-awards for the same claim a no-op; the existing entry id is
    /// returned instead of a new credit.
    pub fn append_points_entry(
        &self,
        beneficiary: &str,
        amount: i64,
        reason: AwardReason,
        claim_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO points_entries
             (beneficiary, amount, reason, claim_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                beneficiary,
                amount,
                reason.to_string(),
                claim_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 1 {
            return Ok(conn.last_insert_rowid());
        }
        let existing: i64 = conn.query_row(
            "SELECT id FROM points_entries WHERE claim_id = ?1 AND reason = ?2",
            params![claim_id, reason.to_string()],
            |r| r.get(0),
        )?;
        Ok(existing)
    }

    pub fn points_balance(&self, beneficiary: &str) -> Result<i64> {
        let balance = self.conn().query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM points_entries WHERE beneficiary = ?1",
            [beneficiary],
            |r| r.get(0),
        )?;
        Ok(balance)
    }

    pub fn points_history(&self, beneficiary: &str, limit: usize) -> Result<Vec<PointsEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, beneficiary, amount, reason, claim_id, created_at
             FROM points_entries WHERE beneficiary = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![beneficiary, limit as i64], row_to_points_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn points_entries_for_claim(&self, claim_id: &str) -> Result<Vec<PointsEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, beneficiary, amount, reason, claim_id, created_at
             FROM points_entries WHERE claim_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([claim_id], row_to_points_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ---- feedback ----

    pub fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.conn().execute(
            "INSERT INTO feedback
             (id, claim_id, donor_id, claimant_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feedback.id,
                feedback.claim_id,
                feedback.donor_id,
                feedback.claimant_id,
                feedback.rating,
                feedback.comment,
                feedback.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn feedback_for_claim(&self, claim_id: &str) -> Result<Option<Feedback>> {
        let conn = self.conn();
        let feedback = conn
            .query_row(
                "SELECT id, claim_id, donor_id, claimant_id, rating, comment, created_at
                 FROM feedback WHERE claim_id = ?1",
                [claim_id],
                row_to_feedback,
            )
            .optional()?;
        Ok(feedback)
    }

    // ---- reporting ----

    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn();
        let count_listings = |status: &str| -> rusqlite::Result<usize> {
            conn.query_row(
                "SELECT COUNT(*) FROM listings WHERE status = ?1",
                [status],
                |r| r.get::<_, i64>(0).map(|n| n as usize),
            )
        };

        let total_listings: i64 =
            conn.query_row("SELECT COUNT(*) FROM listings", [], |r| r.get(0))?;
        let total_claims: i64 = conn.query_row("SELECT COUNT(*) FROM claims", [], |r| r.get(0))?;
        let verified_claims: i64 = conn.query_row(
            "SELECT COUNT(*) FROM claims WHERE status = 'verified'",
            [],
            |r| r.get(0),
        )?;
        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM points_entries", [], |r| r.get(0))?;
        let total_points: Option<i64> =
            conn.query_row("SELECT SUM(amount) FROM points_entries", [], |r| r.get(0))?;

        Ok(StoreStats {
            total_listings: total_listings as usize,
            available: count_listings("available")?,
            claimed: count_listings("claimed")?,
            completed: count_listings("completed")?,
            expired: count_listings("expired")?,
            cancelled: count_listings("cancelled")?,
            total_claims: total_claims as usize,
            verified_claims: verified_claims as usize,
            points_entries: total_entries as usize,
            points_awarded: total_points.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total_listings: usize,
    pub available: usize,
    pub claimed: usize,
    pub completed: usize,
    pub expired: usize,
    pub cancelled: usize,
    pub total_claims: usize,
    pub verified_claims: usize,
    pub points_entries: usize,
    pub points_awarded: i64,
}

fn parse_ts(value: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    value.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_col<T>(value: String, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = HandoffError>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_listing(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let images: String = row.get(7)?;
    let images: Vec<String> = serde_json::from_str(&images).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Listing {
        id: row.get(0)?,
        donor_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: parse_col(row.get::<_, String>(4)?, 4)?,
        quantity: row.get(5)?,
        unit: row.get(6)?,
        images,
        location: GeoPoint {
            lat: row.get(8)?,
            lng: row.get(9)?,
        },
        address: row.get(10)?,
        expires_at: parse_ts(row.get::<_, String>(11)?, 11)?,
        status: parse_col(row.get::<_, String>(12)?, 12)?,
        created_at: parse_ts(row.get::<_, String>(13)?, 13)?,
    })
}

fn row_to_claim(row: &Row<'_>) -> rusqlite::Result<Claim> {
    Ok(Claim {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        claimant_id: row.get(2)?,
        pickup_token: row.get(3)?,
        status: parse_col(row.get::<_, String>(4)?, 4)?,
        claimed_at: parse_ts(row.get::<_, String>(5)?, 5)?,
        verified_at: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_ts(s, 6))
            .transpose()?,
    })
}

fn row_to_points_entry(row: &Row<'_>) -> rusqlite::Result<PointsEntry> {
    Ok(PointsEntry {
        id: row.get(0)?,
        beneficiary: row.get(1)?,
        amount: row.get(2)?,
        reason: parse_col(row.get::<_, String>(3)?, 3)?,
        claim_id: row.get(4)?,
        created_at: parse_ts(row.get::<_, String>(5)?, 5)?,
    })
}

fn row_to_feedback(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        claim_id: row.get(1)?,
        donor_id: row.get(2)?,
        claimant_id: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: parse_ts(row.get::<_, String>(6)?, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::NewListing;
    use chrono::Duration;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::new(path.to_str().unwrap(), 2_000).unwrap();
        (db, dir)
    }

    fn sample_listing(expires_in: Duration) -> Listing {
        let input = NewListing {
            donor_id: "donor-1".to_string(),
            title: "Vegetable curry".to_string(),
            description: Some("Freshly cooked".to_string()),
            category: None,
            quantity: 4,
            unit: "portions".to_string(),
            images: vec!["https://media.example/curry.jpg".to_string()],
            location: GeoPoint {
                lat: 12.9716,
                lng: 77.5946,
            },
            address: "12 MG Road".to_string(),
            expires_in_hours: None,
        };
        let mut listing = input.into_listing(crate::storage::models::FoodCategory::Cooked, 1);
        listing.expires_at = Utc::now() + expires_in;
        listing
    }

    #[test]
    fn test_listing_round_trip() {
        let (db, _dir) = test_db();
        let listing = sample_listing(Duration::hours(2));
        db.insert_listing(&listing).unwrap();

        let stored = db.get_listing(&listing.id).unwrap().unwrap();
        assert_eq!(stored.title, listing.title);
        assert_eq!(stored.images, listing.images);
        assert_eq!(stored.status, ListingStatus::Available);
        assert_eq!(stored.location, listing.location);
    }

    #[test]
    fn test_transition_cas_semantics() {
        let (db, _dir) = test_db();
        let listing = sample_listing(Duration::hours(2));
        db.insert_listing(&listing).unwrap();

        db.transition_listing(&listing.id, ListingStatus::Available, ListingStatus::Claimed)
            .unwrap();

        // Same expected-from again: the stored status moved on, so the CAS
        // must report a conflict instead of writing.
        let err = db
            .transition_listing(&listing.id, ListingStatus::Available, ListingStatus::Claimed)
            .unwrap_err();
        assert!(matches!(err, HandoffError::Conflict(_)));

        let err = db
            .transition_listing("no-such-id", ListingStatus::Available, ListingStatus::Claimed)
            .unwrap_err();
        assert!(matches!(err, HandoffError::NotFound(_)));
    }

    #[test]
    fn test_claim_listing_is_atomic() {
        let (db, _dir) = test_db();
        let listing = sample_listing(Duration::hours(2));
        db.insert_listing(&listing).unwrap();

        let claim = Claim::new(&listing.id, "recipient-1", "token-a".to_string());
        db.claim_listing(&claim).unwrap();

        let stored = db.get_listing(&listing.id).unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Claimed);
        assert!(db.get_claim(&claim.id).unwrap().is_some());

        // Losing claimant: the CAS fails and no claim row leaks through.
        let second = Claim::new(&listing.id, "recipient-2", "token-b".to_string());
        let err = db.claim_listing(&second).unwrap_err();
        assert!(matches!(err, HandoffError::Conflict(_)));
        assert!(db.get_claim(&second.id).unwrap().is_none());
    }

    #[test]
    fn test_expiry_candidates_filtering() {
        let (db, _dir) = test_db();
        let fresh = sample_listing(Duration::hours(3));
        let stale = sample_listing(Duration::seconds(-5));
        db.insert_listing(&fresh).unwrap();
        db.insert_listing(&stale).unwrap();

        let candidates = db.expiry_candidates(Utc::now()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, stale.id);
    }

    #[test]
    fn test_verify_handoff_awards_once() {
        let (db, _dir) = test_db();
        let listing = sample_listing(Duration::hours(2));
        db.insert_listing(&listing).unwrap();
        let claim = Claim::new(&listing.id, "recipient-1", "token-a".to_string());
        db.claim_listing(&claim).unwrap();
        db.transition_claim(&claim.id, ClaimStatus::Claimed, ClaimStatus::EnRoute)
            .unwrap();
        db.transition_claim(&claim.id, ClaimStatus::EnRoute, ClaimStatus::AtLocation)
            .unwrap();

        let awards = [
            ("donor-1", AwardReason::DonationCompleted, 50),
            ("recipient-1", AwardReason::PickupCompleted, 20),
        ];
        db.verify_handoff(&claim.id, &listing.id, Utc::now(), &awards)
            .unwrap();

        let entries = db.points_entries_for_claim(&claim.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(db.points_balance("donor-1").unwrap(), 50);
        assert_eq!(db.points_balance("recipient-1").unwrap(), 20);

        // A second verification attempt finds the claim terminal.
        let err = db
            .verify_handoff(&claim.id, &listing.id, Utc::now(), &awards)
            .unwrap_err();
        assert!(matches!(err, HandoffError::AlreadyTerminal(_)));
        assert_eq!(db.points_entries_for_claim(&claim.id).unwrap().len(), 2);
    }

    #[test]
    fn test_points_append_dedup() {
        let (db, _dir) = test_db();
        let first = db
            .append_points_entry("user-1", 10, AwardReason::Bonus, Some("claim-1"))
            .unwrap();
        let second = db
            .append_points_entry("user-1", 10, AwardReason::Bonus, Some("claim-1"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(db.points_balance("user-1").unwrap(), 10);

        // Unrelated bonuses (no claim) always append.
        db.append_points_entry("user-1", 5, AwardReason::Bonus, None)
            .unwrap();
        db.append_points_entry("user-1", 5, AwardReason::Bonus, None)
            .unwrap();
        assert_eq!(db.points_balance("user-1").unwrap(), 20);
    }
}
