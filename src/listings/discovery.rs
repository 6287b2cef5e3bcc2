use tracing::debug;

use crate::error::Result;
use crate::geo::GeoIndex;
use crate::storage::db::Database;
use crate::storage::models::{GeoPoint, Listing, ListingStatus};

#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveryHit {
    pub listing: Listing,
    pub distance_m: f64,
}

/// Proximity search: GeoIndex candidates joined against stored status.
/// The index may briefly hold a listing that was just claimed or expired;
/// the join drops anything no longer available.
pub fn nearby(
    db: &Database,
    geo: &GeoIndex,
    center: &GeoPoint,
    radius_m: f64,
    limit: usize,
) -> Result<Vec<DiscoveryHit>> {
    let matches = geo.query(center, radius_m, limit);
    let mut hits = Vec::with_capacity(matches.len());

    for m in matches {
        match db.get_listing(&m.listing_id)? {
            Some(listing) if listing.status == ListingStatus::Available => {
                hits.push(DiscoveryHit {
                    listing,
                    distance_m: m.distance_m,
                });
            }
            Some(listing) => {
                debug!(listing = %listing.id, status = %listing.status, "stale index entry skipped");
            }
            None => {
                debug!(listing = %m.listing_id, "index entry without a stored row");
            }
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Claim, FoodCategory, NewListing};
    use std::sync::Arc;

    fn post(db: &Database, lat: f64, lng: f64) -> Listing {
        let input = NewListing {
            donor_id: "donor-1".to_string(),
            title: "Soup".to_string(),
            description: None,
            category: None,
            quantity: 2,
            unit: "liters".to_string(),
            images: vec![],
            location: GeoPoint { lat, lng },
            address: "1 Canal Street".to_string(),
            expires_in_hours: None,
        };
        let listing = input.into_listing(FoodCategory::Cooked, 6);
        db.insert_listing(&listing).unwrap();
        listing
    }

    #[test]
    fn test_stale_index_entries_filtered_by_status_join() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.db");
        let db = Arc::new(Database::new(path.to_str().unwrap(), 2_000).unwrap());
        let geo = GeoIndex::new(0.05);

        let open = post(&db, 40.7128, -74.006);
        let taken = post(&db, 40.7138, -74.006);
        geo.insert(&open.id, open.location, open.created_at);
        geo.insert(&taken.id, taken.location, taken.created_at);

        // Claim one listing without telling the index, simulating
        // projection lag.
        let claim = Claim::new(&taken.id, "recipient-r", "token".to_string());
        db.claim_listing(&claim).unwrap();

        let center = GeoPoint {
            lat: 40.7128,
            lng: -74.006,
        };
        let hits = nearby(&db, &geo, &center, 5_000.0, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].listing.id, open.id);
    }

    #[test]
    fn test_results_carry_distances_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery2.db");
        let db = Arc::new(Database::new(path.to_str().unwrap(), 2_000).unwrap());
        let geo = GeoIndex::new(0.05);

        let near = post(&db, 40.7128, -74.006);
        let far = post(&db, 40.7528, -74.006);
        geo.insert(&near.id, near.location, near.created_at);
        geo.insert(&far.id, far.location, far.created_at);

        let center = GeoPoint {
            lat: 40.7128,
            lng: -74.006,
        };
        let hits = nearby(&db, &geo, &center, 10_000.0, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].listing.id, near.id);
        assert!(hits[0].distance_m < hits[1].distance_m);
    }
}
