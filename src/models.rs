//! Normalized entity models persisted by the pipeline
//!
//! Three entity shapes come out of extraction: the announcement (the ad
//! itself), the vehicle it advertises and the seller behind it. Each carries
//! a content-based uniqueness key used for cache lookups and duplicate
//! suppression; the external ad identifier is not part of any key because it
//! is not reliably present across extraction paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn canonical(value: &str) -> String {
    value.trim().to_string()
}

/// A classified-ad listing joined from its search stub and detail payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Announcement {
    pub ad_id: Option<i64>,
    pub announcer: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub offer_type: Option<String>,
    pub status: Option<String>,
    pub vehicle_km: Option<i64>,
    pub vehicle_year: Option<i64>,
    pub vehicle_color: Option<String>,
    pub price: Option<i64>,
    pub financed_price: Option<i64>,
    pub has_taxes: Option<bool>,
    pub warranty_months: Option<i64>,
    pub warranty_official: Option<bool>,
    pub is_financed: Option<bool>,
    pub is_certified: Option<bool>,
    pub is_professional: Option<bool>,
    pub has_urge: Option<bool>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub ad_creation_date: Option<DateTime<Utc>>,
    pub ad_published_date: Option<DateTime<Utc>>,
    pub environmental_label: Option<String>,
    pub vehicle_id: Option<i64>,
    pub seller_id: Option<i64>,
    pub scraped_date: Option<DateTime<Utc>>,
    pub scraped_user: Option<String>,
}

/// Content fingerprint for an announcement: (title, year, km, price,
/// announcer). Requires a title; rows without one are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnouncementKey {
    pub title: String,
    pub vehicle_year: Option<i64>,
    pub vehicle_km: Option<i64>,
    pub price: Option<i64>,
    pub announcer: String,
}

impl Announcement {
    pub fn key(&self) -> Option<AnnouncementKey> {
        let title = self.title.as_deref()?;
        Some(AnnouncementKey {
            title: canonical(title),
            vehicle_year: self.vehicle_year,
            vehicle_km: self.vehicle_km,
            price: self.price,
            announcer: canonical(&self.announcer),
        })
    }
}

/// The advertised vehicle with its technical sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vehicle {
    pub make: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub year: Option<i64>,
    pub horse_power: Option<i64>,
    pub fuel_type: Option<String>,
    pub cubic_capacity: Option<i64>,
    pub transmission_type: Option<String>,
    pub co2_emissions: Option<i64>,
    pub environmental_label: Option<String>,
    pub dimension_width: Option<i64>,
    pub dimension_height: Option<i64>,
    pub dimension_length: Option<i64>,
    pub weight: Option<i64>,
    pub body_type: Option<String>,
    pub number_doors: Option<i64>,
    pub number_seats: Option<i64>,
    pub trunk_capacity_liters: Option<i64>,
    pub tank_capacity_liters: Option<i64>,
    pub consumption_urban: Option<f64>,
    pub consumption_mixed: Option<f64>,
    pub consumption_extra_urban: Option<f64>,
    pub max_speed: Option<i64>,
    pub acceleration: Option<f64>,
    pub manufacturer_price: Option<i64>,
    pub scraped_date: Option<DateTime<Utc>>,
    pub scraped_user: Option<String>,
}

/// Uniqueness key: (make, model, version, year). Make and model are
/// required columns; a row missing either is dropped before insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VehicleKey {
    pub make: String,
    pub model: String,
    pub version: Option<String>,
    pub year: Option<i64>,
}

impl Vehicle {
    pub fn key(&self) -> Option<VehicleKey> {
        let make = self.make.as_deref()?;
        let model = self.model.as_deref()?;
        Some(VehicleKey {
            make: canonical(make),
            model: canonical(model),
            version: self.version.as_deref().map(canonical),
            year: self.year,
        })
    }
}

/// The party publishing the announcement. Sellers are optional: a detail
/// payload without a seller name leaves the announcement's reference unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seller {
    pub name: Option<String>,
    pub page_url: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub zip_code: Option<String>,
    pub scraped_date: Option<DateTime<Utc>>,
    pub scraped_user: Option<String>,
}

/// Uniqueness key: (name, province). Name is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SellerKey {
    pub name: String,
    pub province: Option<String>,
}

impl Seller {
    pub fn key(&self) -> Option<SellerKey> {
        let name = self.name.as_deref()?;
        Some(SellerKey {
            name: canonical(name),
            province: self.province.as_deref().map(canonical),
        })
    }
}

/// Stub announcement lifted from one search-page item, used to dispatch the
/// detail fetch and to suppress already-harvested ads before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementStub {
    pub ad_id: i64,
    pub title: Option<String>,
    pub vehicle_year: Option<i64>,
    pub vehicle_km: Option<i64>,
    pub price: Option<i64>,
}

impl AnnouncementStub {
    /// Fingerprint of the stub under a given source site name.
    pub fn key(&self, announcer: &str) -> Option<AnnouncementKey> {
        let title = self.title.as_deref()?;
        Some(AnnouncementKey {
            title: canonical(title),
            vehicle_year: self.vehicle_year,
            vehicle_km: self.vehicle_km,
            price: self.price,
            announcer: canonical(announcer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_key_requires_make_and_model() {
        let vehicle = Vehicle {
            make: Some("OPEL".to_string()),
            model: None,
            ..Default::default()
        };
        assert!(vehicle.key().is_none());

        let vehicle = Vehicle {
            make: Some("OPEL".to_string()),
            model: Some("Corsa".to_string()),
            year: Some(2020),
            ..Default::default()
        };
        let key = vehicle.key().unwrap();
        assert_eq!(key.make, "OPEL");
        assert_eq!(key.model, "Corsa");
        assert_eq!(key.version, None);
        assert_eq!(key.year, Some(2020));
    }

    #[test]
    fn test_announcement_key_requires_title() {
        let announcement = Announcement {
            announcer: "coches.net".to_string(),
            ..Default::default()
        };
        assert!(announcement.key().is_none());
    }

    #[test]
    fn test_key_canonicalizes_whitespace() {
        let a = Seller {
            name: Some("  Meuri Ocasion ".to_string()),
            province: None,
            ..Default::default()
        };
        let b = Seller {
            name: Some("Meuri Ocasion".to_string()),
            province: None,
            ..Default::default()
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_stub_key_matches_announcement_key() {
        let stub = AnnouncementStub {
            ad_id: 54694534,
            title: Some("VOLKSWAGEN Touran Sport 2.0 TDI".to_string()),
            vehicle_year: Some(2019),
            vehicle_km: Some(90672),
            price: Some(28985),
        };
        let announcement = Announcement {
            announcer: "coches.net".to_string(),
            title: Some("VOLKSWAGEN Touran Sport 2.0 TDI".to_string()),
            vehicle_year: Some(2019),
            vehicle_km: Some(90672),
            price: Some(28985),
            ..Default::default()
        };
        assert_eq!(stub.key("coches.net"), announcement.key());
    }
}
