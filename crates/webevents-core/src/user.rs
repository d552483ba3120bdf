//! Synthetic users and the user pool
//!
//! A [`Visitor`] is the stable part of an identity (ids, location, device);
//! a [`User`] is what one session sees: a shared visitor plus how that visit
//! was acquired (referer and UTM fields).
//!
//! Attribute distributions come from optional weighted tables in the
//! configuration: `countries`, `browsers`, `operating_systems`,
//! `mobile_devices`, `referers`, `utm_sources`, `utm_mediums`,
//! `utm_campaigns`, `utm_contents`.

use crate::faker::{Faker, Place};
use crate::weighted::WeightedSelector;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Chance that a session from a full pool brings a brand new visitor.
const NEW_VISITOR_PROB: f64 = 0.1;

const MOBILE_SYSTEMS: &[&str] = &["Android", "iOS"];

/// Stable identity shared by every session of the same visitor
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Visitor {
    pub domain_id: Uuid,
    pub custom_id: String,
    pub place: Place,
    pub ip_address: String,
    pub browser_name: String,
    pub browser_user_agent: String,
    pub browser_language: String,
    pub os_name: String,
    pub os_version: String,
    pub device_type: String,
}

impl Visitor {
    pub fn generate<R: Rng + ?Sized>(selector: &WeightedSelector, faker: &Faker, rng: &mut R) -> Self {
        let country = selector.select_optional("countries", rng).unwrap_or("US").to_string();
        let place = faker
            .local_latlng(&country, rng)
            .unwrap_or_else(|| Place {
                latitude: 0.0,
                longitude: 0.0,
                place: String::new(),
                country_code: country.clone(),
                timezone: "UTC".to_string(),
            });

        let browser_name = selector.select_optional("browsers", rng).unwrap_or("Chrome").to_string();
        let os_name = selector
            .select_optional("operating_systems", rng)
            .unwrap_or("Windows")
            .to_string();
        let device_type = if MOBILE_SYSTEMS.contains(&os_name.as_str()) {
            selector.select_optional("mobile_devices", rng).unwrap_or("Mobile").to_string()
        } else {
            "Desktop".to_string()
        };
        let os_version = os_version(&os_name, rng);

        Self {
            domain_id: faker.uuid(rng),
            custom_id: faker.free_email(rng),
            ip_address: faker.ipv4(rng),
            browser_user_agent: faker.user_agent(&browser_name, &os_name, rng),
            browser_language: faker.language(rng).to_string(),
            place,
            browser_name,
            os_name,
            os_version,
            device_type,
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.device_type != "Desktop"
    }
}

fn os_version<R: Rng + ?Sized>(os_name: &str, rng: &mut R) -> String {
    match os_name {
        "Windows" => format!("Windows {}", if rng.random_bool(0.7) { 10 } else { 11 }),
        "MacOS" => format!("MacOS 10.15.{}", rng.random_range(1..8)),
        "Android" => format!("Android {}", rng.random_range(9..15)),
        "iOS" => format!("iOS {}.{}", rng.random_range(14..18), rng.random_range(0..6)),
        other => other.to_string(),
    }
}

/// How a single visit arrived at the site
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub referer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub click_id: Uuid,
}

impl Acquisition {
    pub fn generate<R: Rng + ?Sized>(selector: &WeightedSelector, faker: &Faker, rng: &mut R) -> Self {
        let mut draw = |table: &str| selector.select_optional(table, rng).map(str::to_string);
        let referer = draw("referers");
        let utm_source = draw("utm_sources");
        let utm_medium = draw("utm_mediums");
        let utm_campaign = draw("utm_campaigns");
        let utm_content = draw("utm_contents");
        Self {
            referer,
            utm_source,
            utm_medium,
            utm_campaign,
            utm_content,
            click_id: faker.uuid(rng),
        }
    }
}

fn referer_medium(host: &str) -> &'static str {
    const SEARCH: &[&str] = &["google.", "bing.", "duckduckgo.", "yahoo."];
    const SOCIAL: &[&str] = &["facebook.", "instagram.", "twitter.", "linkedin.", "tiktok."];
    if host == "direct" {
        "direct"
    } else if host.starts_with("mail.") {
        "email"
    } else if SEARCH.iter().any(|s| host.contains(s)) {
        "search"
    } else if SOCIAL.iter().any(|s| host.contains(s)) {
        "social"
    } else {
        "internal"
    }
}

/// Attribute bundle handed to one session
#[derive(Debug, Clone)]
pub struct User {
    visitor: Arc<Visitor>,
    acquisition: Acquisition,
}

impl User {
    pub fn new(visitor: Arc<Visitor>, acquisition: Acquisition) -> Self {
        Self { visitor, acquisition }
    }

    pub fn visitor(&self) -> &Arc<Visitor> {
        &self.visitor
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn referer(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(host) = &self.acquisition.referer {
            let medium = referer_medium(host);
            let url = if medium == "direct" { String::new() } else { host.clone() };
            fields.insert("referer_url".into(), Value::String(url));
            fields.insert("referer_url_scheme".into(), "http".into());
            fields.insert("referer_url_port".into(), "80".into());
            fields.insert("referer_medium".into(), medium.into());
        }
        fields
    }

    pub fn utm(&self) -> Map<String, Value> {
        let acquisition = &self.acquisition;
        let mut fields = Map::new();
        for (key, value) in [
            ("utm_medium", &acquisition.utm_medium),
            ("utm_source", &acquisition.utm_source),
            ("utm_content", &acquisition.utm_content),
            ("utm_campaign", &acquisition.utm_campaign),
        ] {
            if let Some(value) = value {
                fields.insert(key.into(), Value::String(value.clone()));
            }
        }
        fields.insert("click_id".into(), acquisition.click_id.to_string().into());
        fields
    }

    pub fn geo(&self) -> Map<String, Value> {
        let place = &self.visitor.place;
        let mut fields = Map::new();
        fields.insert("geo_latitude".into(), place.latitude.into());
        fields.insert("geo_longitude".into(), place.longitude.into());
        fields.insert("geo_country".into(), place.country_code.clone().into());
        fields.insert("geo_timezone".into(), place.timezone.clone().into());
        fields.insert("geo_region_name".into(), place.place.clone().into());
        fields
    }

    pub fn ip(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("ip_address".into(), self.visitor.ip_address.clone().into());
        fields
    }

    pub fn browser(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("browser_name".into(), self.visitor.browser_name.clone().into());
        fields.insert("browser_user_agent".into(), self.visitor.browser_user_agent.clone().into());
        fields.insert("browser_language".into(), self.visitor.browser_language.clone().into());
        fields
    }

    pub fn operating_system(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("os".into(), self.visitor.os_version.clone().into());
        fields.insert("os_name".into(), self.visitor.os_name.clone().into());
        fields.insert("os_timezone".into(), self.visitor.place.timezone.clone().into());
        fields
    }

    pub fn device(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("device_type".into(), self.visitor.device_type.clone().into());
        fields.insert("device_is_mobile".into(), self.visitor.is_mobile().into());
        fields
    }

    pub fn user(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("user_custom_id".into(), self.visitor.custom_id.clone().into());
        fields.insert("user_domain_id".into(), self.visitor.domain_id.to_string().into());
        fields
    }
}

/// Recycles visitors so the same people come back across sessions.
///
/// The pool fills with new visitors first; once full, a session brings a new
/// visitor (replacing a random slot) with probability 0.1 and a returning one
/// otherwise. A pool of size 0 never recycles.
#[derive(Debug, Default)]
pub struct UserPool {
    size: usize,
    visitors: Vec<Arc<Visitor>>,
}

impl UserPool {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            visitors: Vec::with_capacity(size),
        }
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Hand out a user for a new session
    pub fn get_user<R: Rng + ?Sized>(
        &mut self,
        selector: &WeightedSelector,
        faker: &Faker,
        rng: &mut R,
    ) -> User {
        let visitor = if self.size == 0 {
            Arc::new(Visitor::generate(selector, faker, rng))
        } else if self.visitors.len() < self.size {
            let visitor = Arc::new(Visitor::generate(selector, faker, rng));
            self.visitors.push(Arc::clone(&visitor));
            visitor
        } else if rng.random_bool(NEW_VISITOR_PROB) {
            let visitor = Arc::new(Visitor::generate(selector, faker, rng));
            let slot = rng.random_range(0..self.visitors.len());
            self.visitors[slot] = Arc::clone(&visitor);
            visitor
        } else {
            let slot = rng.random_range(0..self.visitors.len());
            Arc::clone(&self.visitors[slot])
        };

        User::new(visitor, Acquisition::generate(selector, faker, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn selector() -> WeightedSelector {
        WeightedSelector::new(Arc::new(Config::template().unwrap()))
    }

    #[test]
    fn test_pool_fills_then_recycles() {
        let selector = selector();
        let mut pool = UserPool::new(3);
        let mut rng = StdRng::seed_from_u64(12);

        for _ in 0..3 {
            pool.get_user(&selector, &Faker, &mut rng);
        }
        assert_eq!(pool.len(), 3);

        let users: Vec<User> = (0..200)
            .map(|_| pool.get_user(&selector, &Faker, &mut rng))
            .collect();
        let returning = users
            .iter()
            .filter(|user| Arc::strong_count(user.visitor()) > 1)
            .count();
        assert_eq!(pool.len(), 3);
        assert!(returning > 150, "only {returning} returning visitors");
    }

    #[test]
    fn test_zero_sized_pool_never_stores() {
        let selector = selector();
        let mut pool = UserPool::new(0);
        let mut rng = StdRng::seed_from_u64(1);
        let a = pool.get_user(&selector, &Faker, &mut rng);
        let b = pool.get_user(&selector, &Faker, &mut rng);
        assert!(pool.is_empty());
        assert_ne!(a.visitor().domain_id, b.visitor().domain_id);
    }

    #[test]
    fn test_field_groups() {
        let selector = selector();
        let mut rng = StdRng::seed_from_u64(30);
        let user = UserPool::new(1).get_user(&selector, &Faker, &mut rng);

        assert!(user.referer().contains_key("referer_medium"));
        assert!(user.utm().contains_key("click_id"));
        assert!(user.utm().contains_key("utm_source"));
        assert!(user.geo()["geo_latitude"].is_f64());
        assert!(user.ip()["ip_address"].is_string());
        assert!(user.browser().contains_key("browser_user_agent"));
        assert!(user.operating_system().contains_key("os_name"));
        assert_eq!(
            user.device()["device_is_mobile"],
            Value::Bool(user.visitor().device_type != "Desktop")
        );
        assert!(user.user().contains_key("user_domain_id"));
    }

    #[test]
    fn test_referer_medium() {
        assert_eq!(referer_medium("www.google.com"), "search");
        assert_eq!(referer_medium("www.instagram.com"), "social");
        assert_eq!(referer_medium("mail.google.com"), "email");
        assert_eq!(referer_medium("direct"), "direct");
        assert_eq!(referer_medium("blog.example.com"), "internal");
    }
}
