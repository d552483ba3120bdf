//! Output records
//!
//! One [`EventRecord`] per emitted event: the session's current event data
//! merged with the user's attribute groups into a single flat object.
//!
//! ```text
//! {
//!   "event_id": "…", "event_timestamp": "2024-01-01 10:00:03.120000",
//!   "event_type": "pageview", "page_url": "http://www.dummywebsite.com/home",
//!   "page_url_path": "/home", "properties": { … },
//!   "user_domain_id": "…", "geo_country": "US", "browser_name": "Chrome", …
//! }
//! ```

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;
use webevents_core::User;

/// Event type of records without a custom event
pub const PAGEVIEW: &str = "pageview";

pub const SITE_URL: &str = "http://www.dummywebsite.com";

/// Wire format of `event_timestamp`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A single fake web event
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_id: Uuid,
    #[serde(serialize_with = "serialize_timestamp")]
    pub event_timestamp: NaiveDateTime,
    pub event_type: String,
    pub page_url: String,
    pub page_url_path: String,
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub user: Map<String, Value>,
}

impl EventRecord {
    /// Merge event data with the user's geo, ip, browser, operating system,
    /// device and identity fields.
    ///
    /// `event_type = None` makes a pageview. Later groups overwrite earlier
    /// ones on key collisions.
    pub fn assemble(
        event_id: Uuid,
        timestamp: NaiveDateTime,
        event_type: Option<&str>,
        page: &str,
        properties: Map<String, Value>,
        user: &User,
    ) -> Self {
        let mut fields = Map::new();
        for group in [
            user.geo(),
            user.ip(),
            user.browser(),
            user.operating_system(),
            user.device(),
            user.user(),
        ] {
            fields.extend(group);
        }

        Self {
            event_id,
            event_timestamp: timestamp,
            event_type: event_type.unwrap_or(PAGEVIEW).to_string(),
            page_url: format!("{SITE_URL}/{page}"),
            page_url_path: format!("/{page}"),
            properties,
            user: fields,
        }
    }

    pub fn is_pageview(&self) -> bool {
        self.event_type == PAGEVIEW
    }

    /// Page name without the leading slash
    pub fn page(&self) -> &str {
        self.page_url_path.trim_start_matches('/')
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json_pretty() {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use webevents_core::{Config, Faker, UserPool, WeightedSelector};

    fn user() -> User {
        let selector = WeightedSelector::new(Arc::new(Config::template().unwrap()));
        let mut rng = StdRng::seed_from_u64(3);
        UserPool::new(0).get_user(&selector, &Faker::new(), &mut rng)
    }

    fn timestamp() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-01 10:00:03.12", "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_pageview_record_shape() {
        let user = user();
        let record = EventRecord::assemble(Uuid::nil(), timestamp(), None, "home", Map::new(), &user);

        assert!(record.is_pageview());
        assert_eq!(record.page_url, "http://www.dummywebsite.com/home");
        assert_eq!(record.page_url_path, "/home");
        assert_eq!(record.page(), "home");

        let json: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["event_timestamp"], "2024-03-01 10:00:03.120000");
        assert_eq!(json["event_type"], "pageview");
        assert!(json.get("user_domain_id").is_some());
        assert!(json.get("browser_name").is_some());
        assert!(json.get("geo_country").is_some());
    }

    #[test]
    fn test_custom_event_keeps_properties() {
        let user = user();
        let mut properties = Map::new();
        properties.insert("quantity".to_string(), Value::from(3));
        let record = EventRecord::assemble(
            Uuid::nil(),
            timestamp(),
            Some("add_to_cart"),
            "product_a",
            properties,
            &user,
        );

        assert!(!record.is_pageview());
        let json: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["event_type"], "add_to_cart");
        assert_eq!(json["properties"]["quantity"], 3);
    }
}
