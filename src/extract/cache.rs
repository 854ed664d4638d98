//! In-memory mirrors of the persisted uniqueness columns
//!
//! One map per entity, keyed by the canonicalized uniqueness tuple and
//! holding the persisted row id. Populated once at pipeline start, appended
//! in-process after each successful insert batch; a record is inserted iff
//! its key is absent here at check time.

use std::collections::HashMap;

use crate::database::Database;
use crate::models::{AnnouncementKey, SellerKey, VehicleKey};
use crate::Result;

#[derive(Debug, Default)]
pub struct EntityCache {
    announcements: HashMap<AnnouncementKey, i64>,
    vehicles: HashMap<VehicleKey, i64>,
    sellers: HashMap<SellerKey, i64>,
}

impl EntityCache {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Mirror the persisted store.
    pub async fn load(db: &Database) -> Result<Self> {
        Ok(Self {
            announcements: db
                .load_announcement_cache()
                .await?
                .into_iter()
                .map(|(id, key)| (key, id))
                .collect(),
            vehicles: db
                .load_vehicle_cache()
                .await?
                .into_iter()
                .map(|(id, key)| (key, id))
                .collect(),
            sellers: db
                .load_seller_cache()
                .await?
                .into_iter()
                .map(|(id, key)| (key, id))
                .collect(),
        })
    }

    pub fn contains_announcement(&self, key: &AnnouncementKey) -> bool {
        self.announcements.contains_key(key)
    }

    pub fn announcement_id(&self, key: &AnnouncementKey) -> Option<i64> {
        self.announcements.get(key).copied()
    }

    pub fn vehicle_id(&self, key: &VehicleKey) -> Option<i64> {
        self.vehicles.get(key).copied()
    }

    pub fn seller_id(&self, key: &SellerKey) -> Option<i64> {
        self.sellers.get(key).copied()
    }

    pub fn insert_announcement(&mut self, key: AnnouncementKey, id: i64) {
        self.announcements.insert(key, id);
    }

    pub fn insert_vehicle(&mut self, key: VehicleKey, id: i64) {
        self.vehicles.insert(key, id);
    }

    pub fn insert_seller(&mut self, key: SellerKey, id: i64) {
        self.sellers.insert(key, id);
    }

    pub fn announcement_count(&self) -> usize {
        self.announcements.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn seller_count(&self) -> usize {
        self.sellers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vehicle;
    use chrono::Utc;

    #[test]
    fn test_lookup_and_append() {
        let mut cache = EntityCache::empty();
        let key = VehicleKey {
            make: "OPEL".to_string(),
            model: "Corsa".to_string(),
            version: None,
            year: Some(2020),
        };
        assert_eq!(cache.vehicle_id(&key), None);

        cache.insert_vehicle(key.clone(), 7);
        assert_eq!(cache.vehicle_id(&key), Some(7));
        assert_eq!(cache.vehicle_count(), 1);
    }

    #[tokio::test]
    async fn test_load_mirrors_database() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let vehicle = Vehicle {
            make: Some("OPEL".to_string()),
            model: Some("Corsa".to_string()),
            year: Some(2020),
            scraped_date: Some(Utc::now()),
            scraped_user: Some("test".to_string()),
            ..Default::default()
        };
        let ids = db.insert_vehicles(&[vehicle.clone()]).await.unwrap();

        let cache = EntityCache::load(&db).await.unwrap();
        assert_eq!(cache.vehicle_id(&vehicle.key().unwrap()), Some(ids[0]));
        assert_eq!(cache.announcement_count(), 0);
    }
}
