//! Field-path mapping from raw payloads to entity shapes
//!
//! Every mapped field is declared here with its path into the raw document
//! and read through the typed accessors in [`super::fields`]; a missing
//! path leaves the field unset. The announcement joins fields from both the
//! search stub (km, year, price live there) and the detail payload.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::fields::{get_bool, get_datetime, get_f64, get_i64, get_str};
use crate::models::{Announcement, Seller, Vehicle};

/// One announcement's raw material: its search item, its detail payload,
/// and the scrape metadata recorded on every extracted row.
#[derive(Debug, Clone, Copy)]
pub struct RawDocument<'a> {
    pub search_item: &'a Value,
    pub detail: &'a Value,
    pub scraped_date: DateTime<Utc>,
    pub scraped_user: &'a str,
}

// Detail paths (everything nests under "ad")
const AD_ID: &str = "/ad/id";
const AD_TITLE: &str = "/ad/title";
const AD_DESCRIPTION: &str = "/ad/description";
const AD_URL: &str = "/ad/url";
const AD_OFFER_TYPE: &str = "/ad/offerType";
const AD_STATUS: &str = "/ad/status";
const AD_COLOR: &str = "/ad/color";
const AD_HAS_TAXES: &str = "/ad/price/hasTaxes";
const AD_WARRANTY_MONTHS: &str = "/ad/warranty/months";
const AD_WARRANTY_OFFICIAL: &str = "/ad/warranty/isOfficial";
const AD_IS_FINANCED: &str = "/ad/isFinanced";
const AD_IS_CERTIFIED: &str = "/ad/isCertified";
const AD_IS_PROFESSIONAL: &str = "/ad/isProfessional";
const AD_HAS_URGE: &str = "/ad/hasUrgeLabel";
const AD_COUNTRY: &str = "/ad/location/country";
const AD_PROVINCE: &str = "/ad/location/provinceLiteral";
const AD_CREATION_DATE: &str = "/ad/creationDate";
const AD_PUBLISHED_DATE: &str = "/ad/publicationDate";
const AD_ENVIRONMENTAL_LABEL: &str = "/ad/environmentalLabel";

// Search-item paths (the stub carries the commercial numbers)
const ITEM_TITLE: &str = "/title";
const ITEM_URL: &str = "/url";
const ITEM_KM: &str = "/km";
const ITEM_YEAR: &str = "/year";
const ITEM_PRICE: &str = "/price/amount";
const ITEM_FINANCED_PRICE: &str = "/price/financedAmount";
const ITEM_OFFER_TYPE: &str = "/offerTypeLiteral";
const ITEM_PROVINCE: &str = "/provinceLiteral";
const ITEM_ENVIRONMENTAL_LABEL: &str = "/environmentalLabel";

// Vehicle technical sheet
const VEHICLE_MAKE: &str = "/ad/vehicle/make";
const VEHICLE_MODEL: &str = "/ad/vehicle/model";
const VEHICLE_VERSION: &str = "/ad/vehicle/version";
const VEHICLE_YEAR: &str = "/ad/vehicle/year";
const VEHICLE_HP: &str = "/ad/vehicle/hp";
const VEHICLE_FUEL_TYPE: &str = "/ad/vehicle/fuelTypeLiteral";
const VEHICLE_CUBIC_CAPACITY: &str = "/ad/vehicle/cubicCapacity";
const VEHICLE_TRANSMISSION: &str = "/ad/vehicle/transmissionTypeLiteral";
const VEHICLE_CO2: &str = "/ad/vehicle/co2Emissions";
const VEHICLE_ENV_LABEL: &str = "/ad/vehicle/environmentalLabel";
const VEHICLE_WIDTH: &str = "/ad/vehicle/dimensions/width";
const VEHICLE_HEIGHT: &str = "/ad/vehicle/dimensions/height";
const VEHICLE_LENGTH: &str = "/ad/vehicle/dimensions/length";
const VEHICLE_WEIGHT: &str = "/ad/vehicle/weight";
const VEHICLE_BODY_TYPE: &str = "/ad/vehicle/bodyTypeLiteral";
const VEHICLE_DOORS: &str = "/ad/vehicle/doors";
const VEHICLE_SEATS: &str = "/ad/vehicle/seats";
const VEHICLE_TRUNK: &str = "/ad/vehicle/trunkCapacityLiters";
const VEHICLE_TANK: &str = "/ad/vehicle/tankCapacityLiters";
const VEHICLE_CONSUMPTION_URBAN: &str = "/ad/vehicle/consumption/urban";
const VEHICLE_CONSUMPTION_MIXED: &str = "/ad/vehicle/consumption/mixed";
const VEHICLE_CONSUMPTION_EXTRA: &str = "/ad/vehicle/consumption/extraUrban";
const VEHICLE_MAX_SPEED: &str = "/ad/vehicle/maxSpeed";
const VEHICLE_ACCELERATION: &str = "/ad/vehicle/acceleration";
const VEHICLE_MANUFACTURER_PRICE: &str = "/ad/vehicle/manufacturerPrice";

// Seller block
const SELLER_NAME: &str = "/ad/seller/name";
const SELLER_PAGE_URL: &str = "/ad/seller/pageUrl";
const SELLER_COUNTRY: &str = "/ad/seller/country";
const SELLER_PROVINCE: &str = "/ad/seller/provinceLiteral";
const SELLER_ZIP_CODE: &str = "/ad/seller/zipCode";

pub fn map_announcement(doc: &RawDocument<'_>, announcer: &str) -> Announcement {
    Announcement {
        ad_id: get_i64(doc.detail, AD_ID),
        announcer: announcer.to_string(),
        title: get_str(doc.detail, AD_TITLE).or_else(|| get_str(doc.search_item, ITEM_TITLE)),
        description: get_str(doc.detail, AD_DESCRIPTION),
        url: get_str(doc.detail, AD_URL).or_else(|| get_str(doc.search_item, ITEM_URL)),
        offer_type: get_str(doc.detail, AD_OFFER_TYPE)
            .or_else(|| get_str(doc.search_item, ITEM_OFFER_TYPE)),
        status: get_str(doc.detail, AD_STATUS),
        vehicle_km: get_i64(doc.search_item, ITEM_KM),
        vehicle_year: get_i64(doc.search_item, ITEM_YEAR),
        vehicle_color: get_str(doc.detail, AD_COLOR),
        price: get_i64(doc.search_item, ITEM_PRICE),
        financed_price: get_i64(doc.search_item, ITEM_FINANCED_PRICE),
        has_taxes: get_bool(doc.detail, AD_HAS_TAXES),
        warranty_months: get_i64(doc.detail, AD_WARRANTY_MONTHS),
        warranty_official: get_bool(doc.detail, AD_WARRANTY_OFFICIAL),
        is_financed: get_bool(doc.detail, AD_IS_FINANCED),
        is_certified: get_bool(doc.detail, AD_IS_CERTIFIED),
        is_professional: get_bool(doc.detail, AD_IS_PROFESSIONAL),
        has_urge: get_bool(doc.detail, AD_HAS_URGE),
        country: get_str(doc.detail, AD_COUNTRY),
        province: get_str(doc.detail, AD_PROVINCE)
            .or_else(|| get_str(doc.search_item, ITEM_PROVINCE)),
        ad_creation_date: get_datetime(doc.detail, AD_CREATION_DATE),
        ad_published_date: get_datetime(doc.detail, AD_PUBLISHED_DATE),
        environmental_label: get_str(doc.detail, AD_ENVIRONMENTAL_LABEL)
            .or_else(|| get_str(doc.search_item, ITEM_ENVIRONMENTAL_LABEL)),
        vehicle_id: None,
        seller_id: None,
        scraped_date: Some(doc.scraped_date),
        scraped_user: Some(doc.scraped_user.to_string()),
    }
}

pub fn map_vehicle(doc: &RawDocument<'_>) -> Vehicle {
    Vehicle {
        make: get_str(doc.detail, VEHICLE_MAKE),
        model: get_str(doc.detail, VEHICLE_MODEL),
        version: get_str(doc.detail, VEHICLE_VERSION),
        year: get_i64(doc.detail, VEHICLE_YEAR).or_else(|| get_i64(doc.search_item, ITEM_YEAR)),
        horse_power: get_i64(doc.detail, VEHICLE_HP),
        fuel_type: get_str(doc.detail, VEHICLE_FUEL_TYPE),
        cubic_capacity: get_i64(doc.detail, VEHICLE_CUBIC_CAPACITY),
        transmission_type: get_str(doc.detail, VEHICLE_TRANSMISSION),
        co2_emissions: get_i64(doc.detail, VEHICLE_CO2),
        environmental_label: get_str(doc.detail, VEHICLE_ENV_LABEL),
        dimension_width: get_i64(doc.detail, VEHICLE_WIDTH),
        dimension_height: get_i64(doc.detail, VEHICLE_HEIGHT),
        dimension_length: get_i64(doc.detail, VEHICLE_LENGTH),
        weight: get_i64(doc.detail, VEHICLE_WEIGHT),
        body_type: get_str(doc.detail, VEHICLE_BODY_TYPE),
        number_doors: get_i64(doc.detail, VEHICLE_DOORS),
        number_seats: get_i64(doc.detail, VEHICLE_SEATS),
        trunk_capacity_liters: get_i64(doc.detail, VEHICLE_TRUNK),
        tank_capacity_liters: get_i64(doc.detail, VEHICLE_TANK),
        consumption_urban: get_f64(doc.detail, VEHICLE_CONSUMPTION_URBAN),
        consumption_mixed: get_f64(doc.detail, VEHICLE_CONSUMPTION_MIXED),
        consumption_extra_urban: get_f64(doc.detail, VEHICLE_CONSUMPTION_EXTRA),
        max_speed: get_i64(doc.detail, VEHICLE_MAX_SPEED),
        acceleration: get_f64(doc.detail, VEHICLE_ACCELERATION),
        manufacturer_price: get_i64(doc.detail, VEHICLE_MANUFACTURER_PRICE),
        scraped_date: Some(doc.scraped_date),
        scraped_user: Some(doc.scraped_user.to_string()),
    }
}

pub fn map_seller(doc: &RawDocument<'_>) -> Seller {
    Seller {
        name: get_str(doc.detail, SELLER_NAME),
        page_url: get_str(doc.detail, SELLER_PAGE_URL),
        country: get_str(doc.detail, SELLER_COUNTRY),
        province: get_str(doc.detail, SELLER_PROVINCE),
        zip_code: get_str(doc.detail, SELLER_ZIP_CODE),
        scraped_date: Some(doc.scraped_date),
        scraped_user: Some(doc.scraped_user.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_item() -> Value {
        json!({
            "id": 54694534,
            "title": "VOLKSWAGEN Touran Sport 2.0 TDI 110kW 150CV 5p.",
            "url": "/volkswagen-touran-54694534-covo.aspx",
            "km": 90672,
            "year": 2019,
            "price": {"amount": 28985, "financedAmount": 26295},
            "offerTypeLiteral": "Ocasión",
            "provinceLiteral": "Valencia"
        })
    }

    fn sample_detail() -> Value {
        json!({
            "ad": {
                "id": 54694534,
                "title": "VOLKSWAGEN Touran Sport 2.0 TDI 110kW 150CV 5p.",
                "status": "active",
                "color": "Blanco",
                "price": {"hasTaxes": true},
                "warranty": {"months": 12, "isOfficial": false},
                "isFinanced": true,
                "isCertified": false,
                "isProfessional": true,
                "hasUrgeLabel": false,
                "location": {"provinceLiteral": "Valencia"},
                "creationDate": "2023-03-23T20:01:34.000001",
                "publicationDate": "2023-03-24T19:01:46.000001",
                "environmentalLabel": "C",
                "vehicle": {
                    "make": "VOLKSWAGEN",
                    "model": "Touran",
                    "version": "Sport 2.0 TDI",
                    "year": 2019,
                    "hp": 150,
                    "fuelTypeLiteral": "Diesel",
                    "consumption": {"urban": 5.6, "mixed": 4.8, "extraUrban": 4.3}
                },
                "seller": {
                    "name": "Meuri Ocasion",
                    "provinceLiteral": "Valencia",
                    "zipCode": "46001"
                }
            }
        })
    }

    fn doc<'a>(item: &'a Value, detail: &'a Value) -> RawDocument<'a> {
        RawDocument {
            search_item: item,
            detail,
            scraped_date: Utc::now(),
            scraped_user: "test",
        }
    }

    #[test]
    fn test_map_announcement_joins_stub_and_detail() {
        let item = sample_item();
        let detail = sample_detail();
        let announcement = map_announcement(&doc(&item, &detail), "coches.net");

        assert_eq!(announcement.ad_id, Some(54694534));
        assert_eq!(announcement.announcer, "coches.net");
        assert_eq!(announcement.vehicle_km, Some(90672));
        assert_eq!(announcement.price, Some(28985));
        assert_eq!(announcement.financed_price, Some(26295));
        assert_eq!(announcement.has_taxes, Some(true));
        assert_eq!(announcement.warranty_months, Some(12));
        assert_eq!(announcement.province.as_deref(), Some("Valencia"));
        assert!(announcement.ad_creation_date.is_some());
        assert_eq!(announcement.environmental_label.as_deref(), Some("C"));
        assert!(announcement.vehicle_id.is_none());
    }

    #[test]
    fn test_map_vehicle_and_seller() {
        let item = sample_item();
        let detail = sample_detail();
        let vehicle = map_vehicle(&doc(&item, &detail));
        assert_eq!(vehicle.make.as_deref(), Some("VOLKSWAGEN"));
        assert_eq!(vehicle.version.as_deref(), Some("Sport 2.0 TDI"));
        assert_eq!(vehicle.consumption_mixed, Some(4.8));
        assert!(vehicle.key().is_some());

        let seller = map_seller(&doc(&item, &detail));
        assert_eq!(seller.name.as_deref(), Some("Meuri Ocasion"));
        assert_eq!(seller.zip_code.as_deref(), Some("46001"));
    }

    #[test]
    fn test_map_tolerates_sparse_payloads() {
        let item = json!({"id": 1});
        let detail = json!({"ad": {"id": 1}});
        let announcement = map_announcement(&doc(&item, &detail), "coches.net");
        assert_eq!(announcement.title, None);
        assert_eq!(announcement.price, None);

        let seller = map_seller(&doc(&item, &detail));
        assert_eq!(seller.name, None);
        assert!(seller.key().is_none());
    }

    #[test]
    fn test_vehicle_year_falls_back_to_stub() {
        let item = json!({"id": 1, "year": 2021});
        let detail = json!({"ad": {"vehicle": {"make": "SEAT", "model": "Ibiza"}}});
        let vehicle = map_vehicle(&doc(&item, &detail));
        assert_eq!(vehicle.year, Some(2021));
    }
}
