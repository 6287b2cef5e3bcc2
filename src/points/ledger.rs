use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::storage::db::Database;
use crate::storage::models::{AwardReason, PointsEntry};

/// Append-only view over the points ledger. Balances are always computed
/// from the entries; no running total is ever stored or mutated.
pub struct PointsLedger {
    db: Arc<Database>,
}

impl PointsLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an award. Awards tied to a claim are idempotent per
    /// (claim, reason): a repeat returns the existing entry id without
    /// crediting again.
    pub fn award(
        &self,
        beneficiary: &str,
        reason: AwardReason,
        amount: i64,
        claim_id: Option<&str>,
    ) -> Result<i64> {
        let entry_id = self
            .db
            .append_points_entry(beneficiary, amount, reason, claim_id)?;
        info!(beneficiary, %reason, amount, entry = entry_id, "points awarded");
        Ok(entry_id)
    }

    pub fn balance(&self, beneficiary: &str) -> Result<i64> {
        self.db.points_balance(beneficiary)
    }

    pub fn history(&self, beneficiary: &str, limit: usize) -> Result<Vec<PointsEntry>> {
        self.db.points_history(beneficiary, limit)
    }
}
