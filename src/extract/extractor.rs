//! Extract, deduplicate, load
//!
//! Turns one page's artifacts into entity batches and persists only the
//! rows whose uniqueness key is not already cached. Vehicles and sellers
//! are resolved before announcements because announcement rows carry
//! foreign keys to both. A failed batch is rolled back and logged; the run
//! continues with the next batch.

use std::collections::HashSet;
use std::ops::AddAssign;

use serde_json::Value;
use tracing::{error, info, warn};

use super::cache::EntityCache;
use super::mapper::{self, RawDocument};
use crate::database::Database;
use crate::error::HarvestError;
use crate::models::{Announcement, AnnouncementStub, Seller, Vehicle};
use crate::scrape::artifacts::{ArtifactStore, DetailArtifact};
use crate::site::SiteApi;
use crate::Result;

/// New rows persisted for one page (or one whole replay).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub new_announcements: usize,
    pub new_vehicles: usize,
    pub new_sellers: usize,
}

impl AddAssign for ExtractSummary {
    fn add_assign(&mut self, other: Self) {
        self.new_announcements += other.new_announcements;
        self.new_vehicles += other.new_vehicles;
        self.new_sellers += other.new_sellers;
    }
}

pub struct DataExtractor {
    db: Database,
    cache: EntityCache,
    announcer: String,
    scraped_user: String,
}

impl DataExtractor {
    pub fn new(db: Database, cache: EntityCache, announcer: &str, scraped_user: &str) -> Self {
        Self {
            db,
            cache,
            announcer: announcer.to_string(),
            scraped_user: scraped_user.to_string(),
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Drop stubs whose content fingerprint is already persisted, and
    /// in-page duplicates. Stubs without a fingerprint (no title) are kept:
    /// the detail payload may still supply one.
    pub fn filter_new_stubs(&self, stubs: Vec<AnnouncementStub>) -> Vec<AnnouncementStub> {
        let mut seen = HashSet::new();
        stubs
            .into_iter()
            .filter(|stub| match stub.key(&self.announcer) {
                Some(key) => {
                    !self.cache.contains_announcement(&key) && seen.insert(key)
                }
                None => true,
            })
            .collect()
    }

    /// Extract and load one page from its search payload and detail
    /// artifacts.
    pub async fn extract_page(
        &mut self,
        search: &Value,
        details: &[DetailArtifact],
    ) -> ExtractSummary {
        let items = SiteApi::announcements(search);
        let mut mapped = Vec::new();

        for artifact in details {
            let Some(item) = items
                .iter()
                .find(|item| SiteApi::announcement_id(item) == Some(artifact.ad_id))
            else {
                // Join key between stub and detail is gone; skip the item,
                // never the page.
                let error = HarvestError::Extraction(format!(
                    "no search item matches detail {}",
                    artifact.ad_id
                ));
                warn!(%error, "detail skipped");
                continue;
            };

            let doc = RawDocument {
                search_item: item,
                detail: &artifact.payload,
                scraped_date: artifact.scraped_date,
                scraped_user: &self.scraped_user,
            };
            mapped.push((
                mapper::map_announcement(&doc, &self.announcer),
                mapper::map_vehicle(&doc),
                mapper::map_seller(&doc),
            ));
        }

        let new_vehicles = self
            .insert_vehicles(mapped.iter().map(|(_, v, _)| v.clone()).collect())
            .await;
        let new_sellers = self
            .insert_sellers(mapped.iter().map(|(_, _, s)| s.clone()).collect())
            .await;

        let mut announcements = Vec::new();
        for (mut announcement, vehicle, seller) in mapped {
            let vehicle_id = vehicle.key().and_then(|key| self.cache.vehicle_id(&key));
            let Some(vehicle_id) = vehicle_id else {
                // No resolvable vehicle means the row would violate the FK
                // contract; drop it rather than persist a partial record.
                warn!(ad_id = ?announcement.ad_id, "announcement dropped: unresolved vehicle");
                continue;
            };
            announcement.vehicle_id = Some(vehicle_id);
            announcement.seller_id = seller.key().and_then(|key| self.cache.seller_id(&key));
            announcements.push(announcement);
        }
        let new_announcements = self.insert_announcements(announcements).await;

        ExtractSummary {
            new_announcements,
            new_vehicles,
            new_sellers,
        }
    }

    /// Deduplicate and insert a vehicle batch; returns the inserted count.
    pub async fn insert_vehicles(&mut self, rows: Vec<Vehicle>) -> usize {
        let mut batch = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            // key() is None when make or model is missing: required columns
            let Some(key) = row.key() else { continue };
            if self.cache.vehicle_id(&key).is_some() || !seen.insert(key.clone()) {
                continue;
            }
            batch.push((key, row));
        }
        if batch.is_empty() {
            return 0;
        }

        let rows: Vec<Vehicle> = batch.iter().map(|(_, row)| row.clone()).collect();
        match self.db.insert_vehicles(&rows).await {
            Ok(ids) => {
                let inserted = ids.len();
                for ((key, _), id) in batch.into_iter().zip(ids) {
                    self.cache.insert_vehicle(key, id);
                }
                inserted
            }
            Err(error) => {
                error!(%error, "vehicle batch rolled back");
                0
            }
        }
    }

    /// Deduplicate and insert a seller batch; returns the inserted count.
    pub async fn insert_sellers(&mut self, rows: Vec<Seller>) -> usize {
        let mut batch = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            let Some(key) = row.key() else { continue };
            if self.cache.seller_id(&key).is_some() || !seen.insert(key.clone()) {
                continue;
            }
            batch.push((key, row));
        }
        if batch.is_empty() {
            return 0;
        }

        let rows: Vec<Seller> = batch.iter().map(|(_, row)| row.clone()).collect();
        match self.db.insert_sellers(&rows).await {
            Ok(ids) => {
                let inserted = ids.len();
                for ((key, _), id) in batch.into_iter().zip(ids) {
                    self.cache.insert_seller(key, id);
                }
                inserted
            }
            Err(error) => {
                error!(%error, "seller batch rolled back");
                0
            }
        }
    }

    /// Deduplicate and insert an announcement batch; returns the inserted
    /// count. Foreign keys must already be resolved on the rows.
    pub async fn insert_announcements(&mut self, rows: Vec<Announcement>) -> usize {
        let mut batch = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            let Some(key) = row.key() else { continue };
            if self.cache.contains_announcement(&key) || !seen.insert(key.clone()) {
                continue;
            }
            batch.push((key, row));
        }
        if batch.is_empty() {
            return 0;
        }

        let rows: Vec<Announcement> = batch.iter().map(|(_, row)| row.clone()).collect();
        match self.db.insert_announcements(&rows).await {
            Ok(ids) => {
                let inserted = ids.len();
                for ((key, _), id) in batch.into_iter().zip(ids) {
                    self.cache.insert_announcement(key, id);
                }
                inserted
            }
            Err(error) => {
                error!(%error, "announcement batch rolled back");
                0
            }
        }
    }

    /// Replay extraction over every page artifact in a run directory.
    /// Re-running over the same artifact set is idempotent: already-cached
    /// keys insert nothing.
    pub async fn extract_directory(&mut self, store: &ArtifactStore) -> Result<ExtractSummary> {
        let mut totals = ExtractSummary::default();

        for page in store.list_pages().await? {
            let search = match store.read_page(page).await {
                Ok(search) => search,
                Err(error) => {
                    error!(page, %error, "unreadable page artifact");
                    continue;
                }
            };
            let details = match store.read_details(page).await {
                Ok(details) => details,
                Err(error) => {
                    error!(page, %error, "unreadable detail artifacts");
                    continue;
                }
            };

            let summary = self.extract_page(&search, &details).await;
            info!(
                page,
                new_announcements = summary.new_announcements,
                new_vehicles = summary.new_vehicles,
                new_sellers = summary.new_sellers,
                "page extracted"
            );
            totals += summary;
        }

        Ok(totals)
    }
}
