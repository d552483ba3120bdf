//! Synthetic value generator
//!
//! Small built-in word and place tables, enough to make records look
//! plausible. All draws come from the caller's RNG.

use chrono::{NaiveDateTime, TimeDelta};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &[
    "james", "mary", "robert", "patricia", "john", "jennifer", "michael", "linda", "david",
    "elizabeth", "lucas", "julia", "hans", "greta", "yuki", "haruto", "oliver", "amelia",
];

const LAST_NAMES: &[&str] = &[
    "smith", "johnson", "williams", "brown", "jones", "garcia", "miller", "davis", "silva",
    "santos", "muller", "schmidt", "sato", "suzuki", "taylor", "wilson",
];

const FREE_EMAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

const STREET_NAMES: &[&str] = &[
    "Maple", "Oak", "Pine", "Cedar", "Elm", "Washington", "Lake", "Hill", "Sunset", "Park",
];

const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Court"];

const CITIES: &[(&str, &str)] = &[
    ("Springfield", "IL"),
    ("Riverside", "CA"),
    ("Franklin", "TN"),
    ("Greenville", "SC"),
    ("Madison", "WI"),
    ("Salem", "OR"),
];

const PHONE_FORMATS: &[&str] = &["###-###-####", "(###)###-####", "+1-###-###-####", "###.###.####"];

const LANGUAGES: &[&str] = &[
    "en_US", "en_GB", "pt_BR", "de_DE", "ja_JP", "fr_FR", "es_ES", "it_IT",
];

/// (latitude, longitude, place, country code, timezone)
const PLACES: &[(f64, f64, &str, &str, &str)] = &[
    (40.71427, -74.00597, "New York City", "US", "America/New_York"),
    (34.05223, -118.24368, "Los Angeles", "US", "America/Los_Angeles"),
    (41.85003, -87.65005, "Chicago", "US", "America/Chicago"),
    (47.60621, -122.33207, "Seattle", "US", "America/Los_Angeles"),
    (-23.5475, -46.63611, "Sao Paulo", "BR", "America/Sao_Paulo"),
    (-22.90278, -43.2075, "Rio de Janeiro", "BR", "America/Sao_Paulo"),
    (-30.03306, -51.23, "Porto Alegre", "BR", "America/Sao_Paulo"),
    (52.52437, 13.41053, "Berlin", "DE", "Europe/Berlin"),
    (48.13743, 11.57549, "Munich", "DE", "Europe/Berlin"),
    (53.57532, 10.01534, "Hamburg", "DE", "Europe/Berlin"),
    (51.50853, -0.12574, "London", "GB", "Europe/London"),
    (53.48095, -2.23743, "Manchester", "GB", "Europe/London"),
    (35.6895, 139.69171, "Tokyo", "JP", "Asia/Tokyo"),
    (34.69374, 135.50218, "Osaka", "JP", "Asia/Tokyo"),
    (48.85341, 2.3488, "Paris", "FR", "Europe/Paris"),
    (43.70011, -79.4163, "Toronto", "CA", "America/Toronto"),
    (19.07283, 72.88261, "Mumbai", "IN", "Asia/Kolkata"),
    (-33.86785, 151.20732, "Sydney", "AU", "Australia/Sydney"),
];

/// A geographic location
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub place: String,
    pub country_code: String,
    pub timezone: String,
}

/// Stateless synthetic value generator
#[derive(Debug, Clone, Copy, Default)]
pub struct Faker;

impl Faker {
    pub fn new() -> Self {
        Self
    }

    /// Random v4 UUID drawn from `rng` (repeatable under a seeded RNG)
    pub fn uuid<R: Rng + ?Sized>(&self, rng: &mut R) -> Uuid {
        let bytes: [u8; 16] = rng.random();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    pub fn boolean<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random_bool(0.5)
    }

    /// Inclusive on both ends; bounds are ordered.
    pub fn int<R: Rng + ?Sized>(&self, min: i64, max: i64, rng: &mut R) -> i64 {
        rng.random_range(min.min(max)..=min.max(max))
    }

    /// Inclusive on both ends; bounds are ordered.
    pub fn float<R: Rng + ?Sized>(&self, min: f64, max: f64, rng: &mut R) -> f64 {
        if min == max {
            return min;
        }
        rng.random_range(min.min(max)..=min.max(max))
    }

    /// Uniform instant in `[start, end]` at millisecond resolution
    pub fn datetime_between<R: Rng + ?Sized>(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        rng: &mut R,
    ) -> NaiveDateTime {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let span_ms = (end - start).num_milliseconds();
        start + TimeDelta::milliseconds(rng.random_range(0..=span_ms))
    }

    pub fn first_name<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        *pick(FIRST_NAMES, rng)
    }

    pub fn last_name<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        *pick(LAST_NAMES, rng)
    }

    pub fn email<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.email_at(*pick(EMAIL_DOMAINS, rng), rng)
    }

    /// Address on a free webmail domain
    pub fn free_email<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        self.email_at(*pick(FREE_EMAIL_DOMAINS, rng), rng)
    }

    fn email_at<R: Rng + ?Sized>(&self, domain: &str, rng: &mut R) -> String {
        let first = self.first_name(rng);
        let last = self.last_name(rng);
        match rng.random_range(0..3) {
            0 => format!("{first}.{last}@{domain}"),
            1 => format!("{}{last}{}@{domain}", &first[..1], rng.random_range(1..100)),
            _ => format!("{first}{}@{domain}", rng.random_range(10..1000)),
        }
    }

    pub fn phone_number<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        pick(PHONE_FORMATS, rng)
            .chars()
            .map(|c| {
                if c == '#' {
                    char::from(b'0' + rng.random_range(0..10u8))
                } else {
                    c
                }
            })
            .collect()
    }

    pub fn address<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let (city, state) = *pick(CITIES, rng);
        format!(
            "{} {} {}, {}, {} {:05}",
            rng.random_range(1..9999),
            pick(STREET_NAMES, rng),
            pick(STREET_SUFFIXES, rng),
            city,
            state,
            rng.random_range(1000..99999)
        )
    }

    /// A known place in `country_code`, `None` for countries outside the table
    pub fn local_latlng<R: Rng + ?Sized>(&self, country_code: &str, rng: &mut R) -> Option<Place> {
        let places: Vec<_> = PLACES
            .iter()
            .filter(|(.., country, _)| country.eq_ignore_ascii_case(country_code))
            .collect();
        places
            .choose(rng)
            .map(|(latitude, longitude, place, country, timezone)| Place {
                latitude: *latitude,
                longitude: *longitude,
                place: (*place).to_string(),
                country_code: (*country).to_string(),
                timezone: (*timezone).to_string(),
            })
    }

    /// Public-looking IPv4 address
    pub fn ipv4<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        format!(
            "{}.{}.{}.{}",
            rng.random_range(11..224),
            rng.random_range(0..256),
            rng.random_range(0..256),
            rng.random_range(1..255)
        )
    }

    pub fn language<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        *pick(LANGUAGES, rng)
    }

    /// User agent string for a browser / operating system pair
    pub fn user_agent<R: Rng + ?Sized>(&self, browser: &str, os: &str, rng: &mut R) -> String {
        let platform = match os {
            "Windows" => "Windows NT 10.0; Win64; x64".to_string(),
            "MacOS" => format!("Macintosh; Intel Mac OS X 10_15_{}", rng.random_range(1..8)),
            "Android" => format!("Linux; Android {}", rng.random_range(9..15)),
            "iOS" => format!("iPhone; CPU iPhone OS {}_0 like Mac OS X", rng.random_range(14..18)),
            _ => "X11; Linux x86_64".to_string(),
        };
        let version = rng.random_range(90..130);
        match browser {
            "Firefox" => format!("Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"),
            "Safari" => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{}.0 Safari/605.1.15",
                rng.random_range(13..18)
            ),
            "Edge" => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36 Edg/{version}.0.0.0"
            ),
            _ => format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
            ),
        }
    }
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
    // Tables are non-empty constants.
    &items[rng.random_range(0..items.len())]
}
