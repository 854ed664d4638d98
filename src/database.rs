//! SQLite persistence layer
//!
//! Owns the three-table schema and the batch insert/lookup operations the
//! dedup cache is built on. Every batch insert runs in one transaction and
//! returns the generated row ids in input order; a constraint violation
//! rolls the whole batch back and surfaces as a persistence error the
//! caller logs and skips.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::HarvestError;
use crate::models::{
    Announcement, AnnouncementKey, Seller, SellerKey, Vehicle, VehicleKey,
};
use crate::Result;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS VEHICLE (
        ID integer PRIMARY KEY AUTOINCREMENT,
        MAKE text NOT NULL,
        MODEL text NOT NULL,
        VERSION text,
        YEAR integer,
        HORSE_POWER integer,
        FUEL_TYPE text,
        CUBIC_CAPACITY integer,
        TRANSMISSION_TYPE text,
        CO2_EMISSIONS integer,
        ENVIRONMENTAL_LABEL text,
        DIMENSION_WIDTH integer,
        DIMENSION_HEIGHT integer,
        DIMENSION_LENGTH integer,
        WEIGHT integer,
        BODY_TYPE text,
        NUMBER_DOORS integer,
        NUMBER_SEATS integer,
        TRUNK_CAPACITY_LITERS integer,
        TANK_CAPACITY_LITERS integer,
        CONSUMPTION_URBAN real,
        CONSUMPTION_MIXED real,
        CONSUMPTION_EXTRA_URBAN real,
        MAX_SPEED integer,
        ACCELERATION real,
        MANUFACTURER_PRICE integer,
        SCRAPED_DATE numeric NOT NULL,
        SCRAPED_USER text NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS SELLER (
        ID integer PRIMARY KEY AUTOINCREMENT,
        NAME text NOT NULL,
        PAGE_URL text,
        COUNTRY text,
        PROVINCE text,
        ZIP_CODE text,
        SCRAPED_DATE numeric NOT NULL,
        SCRAPED_USER text NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ANNOUNCEMENT (
        ID integer PRIMARY KEY AUTOINCREMENT,
        ANNOUNCEMENT_ID integer,
        ANNOUNCER text NOT NULL,
        TITLE text NOT NULL,
        DESCRIPTION text,
        URL text,
        OFFER_TYPE text,
        VEHICLE_ID integer NOT NULL REFERENCES VEHICLE(ID),
        VEHICLE_KM integer,
        VEHICLE_YEAR integer,
        STATUS text,
        VEHICLE_COLOR text,
        PRICE integer,
        FINANCED_PRICE integer,
        HAS_TAXES numeric,
        WARRANTY_MONTHS integer,
        WARRANTY_OFFICIAL numeric,
        IS_FINANCED numeric,
        IS_CERTIFIED numeric,
        IS_PROFESSIONAL numeric,
        HAS_URGE numeric,
        COUNTRY text,
        PROVINCE text,
        AD_CREATION_DATE numeric,
        AD_PUBLISHED_DATE numeric,
        ENVIRONMENTAL_LABEL text,
        SELLER_ID integer REFERENCES SELLER(ID),
        SCRAPED_DATE numeric NOT NULL,
        SCRAPED_USER text NOT NULL
    )",
];

/// Repository over the harvest database
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Extraction is single-threaded on the orchestrator task; one
        // connection also keeps `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a vehicle batch, returning generated ids in input order.
    pub async fn insert_vehicles(
        &self,
        rows: &[Vehicle],
    ) -> std::result::Result<Vec<i64>, HarvestError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO VEHICLE (MAKE, MODEL, VERSION, YEAR, HORSE_POWER, FUEL_TYPE,
                     CUBIC_CAPACITY, TRANSMISSION_TYPE, CO2_EMISSIONS, ENVIRONMENTAL_LABEL,
                     DIMENSION_WIDTH, DIMENSION_HEIGHT, DIMENSION_LENGTH, WEIGHT, BODY_TYPE,
                     NUMBER_DOORS, NUMBER_SEATS, TRUNK_CAPACITY_LITERS, TANK_CAPACITY_LITERS,
                     CONSUMPTION_URBAN, CONSUMPTION_MIXED, CONSUMPTION_EXTRA_URBAN,
                     MAX_SPEED, ACCELERATION, MANUFACTURER_PRICE, SCRAPED_DATE, SCRAPED_USER)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.make)
            .bind(&row.model)
            .bind(&row.version)
            .bind(row.year)
            .bind(row.horse_power)
            .bind(&row.fuel_type)
            .bind(row.cubic_capacity)
            .bind(&row.transmission_type)
            .bind(row.co2_emissions)
            .bind(&row.environmental_label)
            .bind(row.dimension_width)
            .bind(row.dimension_height)
            .bind(row.dimension_length)
            .bind(row.weight)
            .bind(&row.body_type)
            .bind(row.number_doors)
            .bind(row.number_seats)
            .bind(row.trunk_capacity_liters)
            .bind(row.tank_capacity_liters)
            .bind(row.consumption_urban)
            .bind(row.consumption_mixed)
            .bind(row.consumption_extra_urban)
            .bind(row.max_speed)
            .bind(row.acceleration)
            .bind(row.manufacturer_price)
            .bind(row.scraped_date)
            .bind(&row.scraped_user)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Insert a seller batch, returning generated ids in input order.
    pub async fn insert_sellers(
        &self,
        rows: &[Seller],
    ) -> std::result::Result<Vec<i64>, HarvestError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO SELLER (NAME, PAGE_URL, COUNTRY, PROVINCE, ZIP_CODE,
                     SCRAPED_DATE, SCRAPED_USER)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.name)
            .bind(&row.page_url)
            .bind(&row.country)
            .bind(&row.province)
            .bind(&row.zip_code)
            .bind(row.scraped_date)
            .bind(&row.scraped_user)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Insert an announcement batch, returning generated ids in input order.
    pub async fn insert_announcements(
        &self,
        rows: &[Announcement],
    ) -> std::result::Result<Vec<i64>, HarvestError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO ANNOUNCEMENT (ANNOUNCEMENT_ID, ANNOUNCER, TITLE, DESCRIPTION,
                     URL, OFFER_TYPE, VEHICLE_ID, VEHICLE_KM, VEHICLE_YEAR, STATUS,
                     VEHICLE_COLOR, PRICE, FINANCED_PRICE, HAS_TAXES, WARRANTY_MONTHS,
                     WARRANTY_OFFICIAL, IS_FINANCED, IS_CERTIFIED, IS_PROFESSIONAL, HAS_URGE,
                     COUNTRY, PROVINCE, AD_CREATION_DATE, AD_PUBLISHED_DATE,
                     ENVIRONMENTAL_LABEL, SELLER_ID, SCRAPED_DATE, SCRAPED_USER)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.ad_id)
            .bind(&row.announcer)
            .bind(&row.title)
            .bind(&row.description)
            .bind(&row.url)
            .bind(&row.offer_type)
            .bind(row.vehicle_id)
            .bind(row.vehicle_km)
            .bind(row.vehicle_year)
            .bind(&row.status)
            .bind(&row.vehicle_color)
            .bind(row.price)
            .bind(row.financed_price)
            .bind(row.has_taxes)
            .bind(row.warranty_months)
            .bind(row.warranty_official)
            .bind(row.is_financed)
            .bind(row.is_certified)
            .bind(row.is_professional)
            .bind(row.has_urge)
            .bind(&row.country)
            .bind(&row.province)
            .bind(row.ad_creation_date)
            .bind(row.ad_published_date)
            .bind(&row.environmental_label)
            .bind(row.seller_id)
            .bind(row.scraped_date)
            .bind(&row.scraped_user)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Uniqueness columns + id for every persisted vehicle.
    pub async fn load_vehicle_cache(&self) -> Result<Vec<(i64, VehicleKey)>> {
        let rows = sqlx::query("SELECT ID, MAKE, MODEL, VERSION, YEAR FROM VEHICLE")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let vehicle = Vehicle {
                    make: row.get("MAKE"),
                    model: row.get("MODEL"),
                    version: row.get("VERSION"),
                    year: row.get("YEAR"),
                    ..Default::default()
                };
                (row.get::<i64, _>("ID"), vehicle)
            })
            .filter_map(|(id, vehicle)| vehicle.key().map(|key| (id, key)))
            .collect())
    }

    /// Uniqueness columns + id for every persisted seller.
    pub async fn load_seller_cache(&self) -> Result<Vec<(i64, SellerKey)>> {
        let rows = sqlx::query("SELECT ID, NAME, PROVINCE FROM SELLER")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let seller = Seller {
                    name: row.get("NAME"),
                    province: row.get("PROVINCE"),
                    ..Default::default()
                };
                (row.get::<i64, _>("ID"), seller)
            })
            .filter_map(|(id, seller)| seller.key().map(|key| (id, key)))
            .collect())
    }

    /// Uniqueness columns + id for every persisted announcement.
    pub async fn load_announcement_cache(&self) -> Result<Vec<(i64, AnnouncementKey)>> {
        let rows = sqlx::query(
            "SELECT ID, TITLE, VEHICLE_YEAR, VEHICLE_KM, PRICE, ANNOUNCER FROM ANNOUNCEMENT",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let announcement = Announcement {
                    title: row.get("TITLE"),
                    vehicle_year: row.get("VEHICLE_YEAR"),
                    vehicle_km: row.get("VEHICLE_KM"),
                    price: row.get("PRICE"),
                    announcer: row.get::<String, _>("ANNOUNCER"),
                    ..Default::default()
                };
                (row.get::<i64, _>("ID"), announcement)
            })
            .filter_map(|(id, announcement)| announcement.key().map(|key| (id, key)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn vehicle(make: &str, model: &str, year: i64) -> Vehicle {
        Vehicle {
            make: Some(make.to_string()),
            model: Some(model.to_string()),
            year: Some(year),
            scraped_date: Some(Utc::now()),
            scraped_user: Some("test".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_vehicles_returns_ids_in_order() {
        let db = memory_db().await;
        let rows = vec![vehicle("OPEL", "Corsa", 2020), vehicle("SEAT", "Ibiza", 2019)];
        let ids = db.insert_vehicles(&rows).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[1] > ids[0]);

        let cache = db.load_vehicle_cache().await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache[0].0, ids[0]);
        assert_eq!(cache[0].1.make, "OPEL");
    }

    #[tokio::test]
    async fn test_insert_announcement_with_foreign_keys() {
        let db = memory_db().await;
        let vehicle_ids = db
            .insert_vehicles(&[vehicle("OPEL", "Corsa", 2020)])
            .await
            .unwrap();

        let announcement = Announcement {
            ad_id: Some(54694534),
            announcer: "coches.net".to_string(),
            title: Some("OPEL Corsa 1.2".to_string()),
            price: Some(12000),
            vehicle_year: Some(2020),
            vehicle_km: Some(45000),
            vehicle_id: Some(vehicle_ids[0]),
            seller_id: None,
            scraped_date: Some(Utc::now()),
            scraped_user: Some("test".to_string()),
            ..Default::default()
        };
        let ids = db.insert_announcements(&[announcement]).await.unwrap();
        assert_eq!(ids.len(), 1);

        let cache = db.load_announcement_cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].1.title, "OPEL Corsa 1.2");
        assert_eq!(cache[0].1.announcer, "coches.net");
    }

    #[tokio::test]
    async fn test_null_required_field_rolls_back_batch() {
        let db = memory_db().await;
        let good = vehicle("OPEL", "Corsa", 2020);
        let bad = Vehicle {
            make: Some("SEAT".to_string()),
            model: None,
            scraped_date: Some(Utc::now()),
            scraped_user: Some("test".to_string()),
            ..Default::default()
        };

        let result = db.insert_vehicles(&[good, bad]).await;
        assert!(matches!(result, Err(HarvestError::Persistence(_))));

        // The whole batch rolled back, including the valid first row
        assert!(db.load_vehicle_cache().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seller_cache_round_trip() {
        let db = memory_db().await;
        let seller = Seller {
            name: Some("Meuri Ocasion".to_string()),
            province: Some("Valencia".to_string()),
            scraped_date: Some(Utc::now()),
            scraped_user: Some("test".to_string()),
            ..Default::default()
        };
        let ids = db.insert_sellers(&[seller]).await.unwrap();

        let cache = db.load_seller_cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].0, ids[0]);
        assert_eq!(cache[0].1.name, "Meuri Ocasion");
        assert_eq!(cache[0].1.province.as_deref(), Some("Valencia"));
    }
}
