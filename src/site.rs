//! Marketplace API adapter for the coches.net listing service
//!
//! Builds the search and detail requests and reads the handful of response
//! fields the crawl loop needs (announcement items, pagination metadata,
//! block signatures). Entity field mapping lives in [`crate::extract`].
//!
//! Search responses look like `{"items": [...], "meta": {"totalPages": N,
//! "totalResults": M}}`; detail responses nest everything under `"ad"`.

use reqwest::Method;
use serde_json::{json, Value};

use crate::models::AnnouncementStub;

/// Source site name recorded on every persisted row.
pub const SITE_NAME: &str = "coches.net";

/// Response-body marker for anti-automation detection.
pub const BOT_BLOCK_SIGNATURE: &str = "Algo en tu navegador nos hizo pensar que eres un bot";

/// Response-body marker for location-based denial.
pub const GEO_BLOCK_SIGNATURE: &str =
    "You don't have permission to access /vpns/ on this server.";

/// Public site root, used as the proxy validation target.
pub const SITE_ROOT: &str = "https://www.coches.net/";

const BASE_URL: &str = "https://ms-mt--api-web.spain.advgo.net";

const PAGE_SIZE: u64 = 100;

/// One logical HTTP request against the marketplace API.
#[derive(Debug, Clone)]
pub struct SiteRequest {
    pub method: Method,
    pub url: String,
    pub headers: &'static [(&'static str, &'static str)],
    pub body: Option<Value>,
}

const API_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json,text/plain,*/*"),
    ("x-adevinta-channel", "web-desktop"),
    ("x-schibsted-tenant", "coches"),
    (
        "user-agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/91.0.4472.114 Safari/537.36",
    ),
    ("content-type", "application/json;charset=UTF-8"),
    ("origin", "https://www.coches.net"),
    ("referer", "https://www.coches.net/"),
    ("accept-language", "en-US,en;q=0.9,es;q=0.8"),
];

/// Request builder for the marketplace's JSON API.
#[derive(Debug, Clone, Default)]
pub struct SiteApi;

impl SiteApi {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        SITE_NAME
    }

    /// Paginated search over all car listings, newest publications first.
    pub fn search_by_published_date(&self, page: u64) -> SiteRequest {
        let body = json!({
            "pagination": { "page": page, "size": PAGE_SIZE },
            "sort": { "order": "desc", "term": "publishedDate" },
            "filters": {
                "categories": { "category1Ids": [2500] },
                "offerTypeIds": [0, 2, 3, 4, 5],
                "isFinanced": false,
                "isCertified": false,
                "onlyPeninsula": false,
                "sellerTypeId": 0,
                "transmissionTypeId": 0
            }
        });
        SiteRequest {
            method: Method::POST,
            url: format!("{BASE_URL}/search/listing"),
            headers: API_HEADERS,
            body: Some(body),
        }
    }

    /// Detail payload for one announcement.
    pub fn announcement_detail(&self, ad_id: i64) -> SiteRequest {
        SiteRequest {
            method: Method::GET,
            url: format!("{BASE_URL}/details/{ad_id}"),
            headers: API_HEADERS,
            body: None,
        }
    }

    /// Items array of a search response.
    pub fn announcements(search: &Value) -> &[Value] {
        search
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// External ad id of one search item or of a detail payload's `ad`.
    pub fn announcement_id(item: &Value) -> Option<i64> {
        item.get("id")
            .or_else(|| item.pointer("/ad/id"))
            .and_then(Value::as_i64)
    }

    pub fn total_pages(search: &Value) -> Option<u64> {
        search.pointer("/meta/totalPages").and_then(Value::as_u64)
    }

    pub fn total_results(search: &Value) -> Option<u64> {
        search.pointer("/meta/totalResults").and_then(Value::as_u64)
    }

    /// Lift the dispatchable stubs out of a search response. Items without
    /// an id cannot be detail-fetched and are skipped.
    pub fn announcement_stubs(search: &Value) -> Vec<AnnouncementStub> {
        Self::announcements(search)
            .iter()
            .filter_map(|item| {
                let ad_id = Self::announcement_id(item)?;
                Some(AnnouncementStub {
                    ad_id,
                    title: item.get("title").and_then(Value::as_str).map(str::to_string),
                    vehicle_year: item.get("year").and_then(Value::as_i64),
                    vehicle_km: item.get("km").and_then(Value::as_i64),
                    price: item.pointer("/price/amount").and_then(Value::as_i64),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_request_pagination() {
        let api = SiteApi::new();
        let request = api.search_by_published_date(7);
        assert_eq!(request.method, Method::POST);
        assert!(request.url.ends_with("/search/listing"));
        let body = request.body.unwrap();
        assert_eq!(body.pointer("/pagination/page"), Some(&json!(7)));
        assert_eq!(body.pointer("/sort/term"), Some(&json!("publishedDate")));
    }

    #[test]
    fn test_detail_request_url() {
        let api = SiteApi::new();
        let request = api.announcement_detail(54694534);
        assert_eq!(request.method, Method::GET);
        assert!(request.url.ends_with("/details/54694534"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_announcement_id_from_search_item_and_detail() {
        let item = json!({"id": 123, "title": "x"});
        assert_eq!(SiteApi::announcement_id(&item), Some(123));

        let detail = json!({"ad": {"id": 456}});
        assert_eq!(SiteApi::announcement_id(&detail), Some(456));
    }

    #[test]
    fn test_stubs_skip_items_without_id() {
        let search = json!({
            "items": [
                {"id": 1, "title": "A", "year": 2020, "km": 1000, "price": {"amount": 9000}},
                {"title": "no id"},
                {"id": 2, "title": "B"}
            ]
        });
        let stubs = SiteApi::announcement_stubs(&search);
        assert_eq!(stubs.len(), 2);
        assert_eq!(stubs[0].ad_id, 1);
        assert_eq!(stubs[0].price, Some(9000));
        assert_eq!(stubs[1].ad_id, 2);
        assert_eq!(stubs[1].price, None);
    }

    #[test]
    fn test_meta_accessors() {
        let search = json!({"items": [], "meta": {"totalPages": 12, "totalResults": 1180}});
        assert_eq!(SiteApi::total_pages(&search), Some(12));
        assert_eq!(SiteApi::total_results(&search), Some(1180));
        assert_eq!(SiteApi::total_pages(&json!({})), None);
    }
}
