use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::geo::distance::haversine_m;
use crate::notify::events::DomainEvent;
use crate::storage::db::Database;
use crate::storage::models::{GeoPoint, ListingStatus};

/// Meters per degree of latitude, used only to size the candidate cell scan.
const M_PER_DEG: f64 = 111_320.0;

#[derive(Debug, Clone)]
pub struct GeoMatch {
    pub listing_id: String,
    pub distance_m: f64,
}

struct Entry {
    point: GeoPoint,
    created_at: DateTime<Utc>,
    cell: (i64, i64),
}

#[derive(Default)]
struct Inner {
    cells: HashMap<(i64, i64), Vec<String>>,
    entries: HashMap<String, Entry>,
}

/// In-memory spatial grid over available listings.
///
/// This is a derived projection: the store stays authoritative, the index is
/// rebuilt at startup and kept current from status-change events. A briefly
/// stale entry is acceptable; discovery re-checks stored status on every hit.
pub struct GeoIndex {
    cell_size_deg: f64,
    inner: RwLock<Inner>,
}

impl GeoIndex {
    pub fn new(cell_size_deg: f64) -> Self {
        Self {
            cell_size_deg,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn cell_of(&self, point: &GeoPoint) -> (i64, i64) {
        (
            (point.lat / self.cell_size_deg).floor() as i64,
            (point.lng / self.cell_size_deg).floor() as i64,
        )
    }

    pub fn insert(&self, listing_id: &str, point: GeoPoint, created_at: DateTime<Utc>) {
        let cell = self.cell_of(&point);
        let mut inner = self.inner.write().unwrap();
        if let Some(old) = inner.entries.insert(
            listing_id.to_string(),
            Entry {
                point,
                created_at,
                cell,
            },
        ) {
            detach(&mut inner.cells, old.cell, listing_id);
        }
        inner.cells.entry(cell).or_default().push(listing_id.to_string());
    }

    pub fn remove(&self, listing_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.entries.remove(listing_id) {
            detach(&mut inner.cells, entry.cell, listing_id);
        }
    }

    pub fn contains(&self, listing_id: &str) -> bool {
        self.inner.read().unwrap().entries.contains_key(listing_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Radius query, nearest-first; equal distances surface the older
    /// listing first.
    pub fn query(&self, center: &GeoPoint, radius_m: f64, limit: usize) -> Vec<GeoMatch> {
        let lat_span = radius_m / M_PER_DEG;
        // Longitude degrees shrink with latitude; clamp the divisor away
        // from zero near the poles.
        let lng_span = radius_m / (M_PER_DEG * center.lat.to_radians().cos().abs().max(0.01));

        let lat_lo = ((center.lat - lat_span) / self.cell_size_deg).floor() as i64;
        let lat_hi = ((center.lat + lat_span) / self.cell_size_deg).floor() as i64;
        let lng_lo = ((center.lng - lng_span) / self.cell_size_deg).floor() as i64;
        let lng_hi = ((center.lng + lng_span) / self.cell_size_deg).floor() as i64;

        let inner = self.inner.read().unwrap();
        let mut matches: Vec<(f64, DateTime<Utc>, String)> = Vec::new();

        for cell_lat in lat_lo..=lat_hi {
            for cell_lng in lng_lo..=lng_hi {
                let Some(ids) = inner.cells.get(&(cell_lat, cell_lng)) else {
                    continue;
                };
                for id in ids {
                    let Some(entry) = inner.entries.get(id) else {
                        continue;
                    };
                    let distance = haversine_m(center, &entry.point);
                    if distance <= radius_m {
                        matches.push((distance, entry.created_at, id.clone()));
                    }
                }
            }
        }

        matches.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        matches.truncate(limit);
        matches
            .into_iter()
            .map(|(distance_m, _, listing_id)| GeoMatch {
                listing_id,
                distance_m,
            })
            .collect()
    }

    /// Reload the projection from the store's available listings.
    pub fn rebuild_from(&self, db: &Database) -> Result<()> {
        let listings = db.listings_with_status(ListingStatus::Available)?;
        let mut inner = self.inner.write().unwrap();
        inner.cells.clear();
        inner.entries.clear();
        drop(inner);
        for listing in &listings {
            self.insert(&listing.id, listing.location, listing.created_at);
        }
        debug!(count = listings.len(), "geo index rebuilt");
        Ok(())
    }

    /// Apply one status-change event. Creation and reopening re-read the
    /// store so a racing transition cannot resurrect a dead listing.
    pub fn apply(&self, event: &DomainEvent, db: &Database) -> Result<()> {
        match event {
            DomainEvent::ListingCreated { listing_id, .. }
            | DomainEvent::ListingReopened { listing_id } => {
                if let Some(listing) = db.get_listing(listing_id)? {
                    if listing.status == ListingStatus::Available {
                        self.insert(&listing.id, listing.location, listing.created_at);
                    }
                }
            }
            DomainEvent::ListingClaimed { listing_id, .. }
            | DomainEvent::ClaimVerified { listing_id, .. }
            | DomainEvent::ListingExpired { listing_id } => {
                self.remove(listing_id);
            }
        }
        Ok(())
    }
}

fn detach(cells: &mut HashMap<(i64, i64), Vec<String>>, cell: (i64, i64), listing_id: &str) {
    if let Some(ids) = cells.get_mut(&cell) {
        ids.retain(|id| id != listing_id);
        if ids.is_empty() {
            cells.remove(&cell);
        }
    }
}
