//! Custom event property specs
//!
//! Each property of a custom event is declared with a `type` tag and the
//! parameters that kind needs:
//!
//! ```yaml
//! quantity: { type: int, values: [1, 5] }          # inclusive range
//! price:    { type: float, values: [9.99, 49.99] } # inclusive range
//! size:     { type: string, values: [S, M, L] }    # one of
//! shipped:  { type: date, values: ["2024-01-01", "2024-12-31"] }
//! where:    { type: geolocation, values: BR }      # country code, default US
//! ```
//!
//! Unknown tags deserialize to [`PropertySpec::Unknown`] and are skipped when
//! resolving.

use crate::faker::Faker;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

const FLOAT_ATTEMPTS: usize = 64;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertySpec {
    /// One of the literal values
    String { values: Vec<Value> },
    Boolean,
    /// Inclusive range `[first, last]`
    Int { values: Vec<i64> },
    /// Inclusive range `[first, last]`
    Float { values: Vec<f64> },
    /// `[first, last]`, or from the event time to the only value
    Date { values: Vec<String> },
    Datetime { values: Vec<String> },
    Email,
    #[serde(alias = "phone_number")]
    Phone,
    Address,
    Geolocation {
        /// Country code, US when absent
        #[serde(default)]
        values: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("no values to choose from")]
    EmptyValues,
    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: String, max: String },
    #[error("unparsable date '{0}'")]
    InvalidDate(String),
    #[error("unknown country code '{0}'")]
    UnknownCountry(String),
    #[error("property '{name}' not correctly configured: {source}")]
    Field {
        name: String,
        #[source]
        source: Box<PropertyError>,
    },
}

/// Resolve one spec to a value.
///
/// `reference` is the event time, used as the lower bound of single-valued
/// date ranges. Unknown kinds yield `Ok(None)`.
pub fn resolve<R: Rng + ?Sized>(
    spec: &PropertySpec,
    faker: &Faker,
    rng: &mut R,
    reference: NaiveDateTime,
) -> Result<Option<Value>, PropertyError> {
    let value = match spec {
        PropertySpec::String { values } => values.choose(rng).cloned().ok_or(PropertyError::EmptyValues)?,
        PropertySpec::Boolean => Value::Bool(faker.boolean(rng)),
        PropertySpec::Int { values } => {
            let (min, max) = bounds(values)?;
            if min > max {
                return Err(invalid_range(min, max));
            }
            Value::from(faker.int(min, max, rng))
        }
        PropertySpec::Float { values } => {
            let (min, max) = bounds(values)?;
            // the sampled hull must have a finite width
            if !(max.ceil() - min.floor()).is_finite() || min > max {
                return Err(invalid_range(min, max));
            }
            Value::from(bounded_float(faker, min, max, rng))
        }
        PropertySpec::Date { values } => {
            let dt = datetime_in(values, faker, rng, reference)?;
            Value::String(dt.format("%Y-%m-%d").to_string())
        }
        PropertySpec::Datetime { values } => {
            let dt = datetime_in(values, faker, rng, reference)?;
            Value::String(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        PropertySpec::Email => Value::String(faker.free_email(rng)),
        PropertySpec::Phone => Value::String(faker.phone_number(rng)),
        PropertySpec::Address => Value::String(faker.address(rng)),
        PropertySpec::Geolocation { values } => {
            let country = values.as_deref().unwrap_or("US");
            let place = faker
                .local_latlng(country, rng)
                .ok_or_else(|| PropertyError::UnknownCountry(country.to_string()))?;
            json!({
                "latitude": place.latitude,
                "longitude": place.longitude,
                "place": place.place,
                "country_code": place.country_code,
                "timezone": place.timezone,
            })
        }
        PropertySpec::Unknown => return Ok(None),
    };
    Ok(Some(value))
}

/// Resolve every property of an event; the first malformed spec aborts.
pub fn resolve_all<R: Rng + ?Sized>(
    specs: &IndexMap<String, PropertySpec>,
    faker: &Faker,
    rng: &mut R,
    reference: NaiveDateTime,
) -> Result<Map<String, Value>, PropertyError> {
    let mut props = Map::new();
    for (name, spec) in specs {
        match resolve(spec, faker, rng, reference) {
            Ok(Some(value)) => {
                props.insert(name.clone(), value);
            }
            Ok(None) => debug!(property = %name, "Skipping property of unknown type."),
            Err(e) => {
                return Err(PropertyError::Field {
                    name: name.clone(),
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(props)
}

fn bounds<T: Copy>(values: &[T]) -> Result<(T, T), PropertyError> {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => Ok((*first, *last)),
        _ => Err(PropertyError::EmptyValues),
    }
}

fn invalid_range<T: ToString>(min: T, max: T) -> PropertyError {
    PropertyError::InvalidRange {
        min: min.to_string(),
        max: max.to_string(),
    }
}

/// Draw from the integer hull `[floor(min), ceil(max)]` until the value falls
/// inside `[min, max]`.
fn bounded_float<R: Rng + ?Sized>(faker: &Faker, min: f64, max: f64, rng: &mut R) -> f64 {
    let (lo, hi) = (min.floor(), max.ceil());
    for _ in 0..FLOAT_ATTEMPTS {
        let candidate = faker.float(lo, hi, rng);
        if (min..=max).contains(&candidate) {
            return candidate;
        }
    }
    faker.float(min, max, rng)
}

fn datetime_in<R: Rng + ?Sized>(
    values: &[String],
    faker: &Faker,
    rng: &mut R,
    reference: NaiveDateTime,
) -> Result<NaiveDateTime, PropertyError> {
    let last = values.last().ok_or(PropertyError::EmptyValues)?;
    let end = parse_datetime(last)?;
    let start = if values.len() > 1 {
        parse_datetime(&values[0])?
    } else {
        reference
    };
    Ok(faker.datetime_between(start, end, rng))
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, PropertyError> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| PropertyError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn spec(yaml: &str) -> PropertySpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_int_spec_stays_in_inclusive_range() {
        let spec = spec("{ type: int, values: [1, 10] }");
        let mut rng = StdRng::seed_from_u64(21);
        let mut seen = [false; 11];
        for _ in 0..5_000 {
            let value = resolve(&spec, &Faker, &mut rng, reference()).unwrap().unwrap();
            let n = value.as_i64().unwrap();
            assert!((1..=10).contains(&n), "drew {n}");
            seen[n as usize] = true;
        }
        assert!(seen[1] && seen[10]);
    }

    #[test]
    fn test_float_spec_rejection_sampled() {
        let spec = spec("{ type: float, values: [1.25, 1.75] }");
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..1_000 {
            let value = resolve(&spec, &Faker, &mut rng, reference()).unwrap().unwrap();
            let x = value.as_f64().unwrap();
            assert!((1.25..=1.75).contains(&x), "drew {x}");
        }
    }

    #[test]
    fn test_string_spec_picks_literal() {
        let spec = spec("{ type: string, values: [S, M, 42] }");
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let value = resolve(&spec, &Faker, &mut rng, reference()).unwrap().unwrap();
            assert!(value == json!("S") || value == json!("M") || value == json!(42));
        }
    }

    #[test]
    fn test_date_spec_range() {
        let spec = spec(r#"{ type: date, values: ["2024-01-01", "2024-01-31"] }"#);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            let value = resolve(&spec, &Faker, &mut rng, reference()).unwrap().unwrap();
            let date = NaiveDate::parse_from_str(value.as_str().unwrap(), "%Y-%m-%d").unwrap();
            assert_eq!(date.format("%Y-%m").to_string(), "2024-01");
        }
    }

    #[test]
    fn test_single_valued_datetime_starts_at_reference() {
        let spec = spec(r#"{ type: datetime, values: ["2024-06-02 12:00:00"] }"#);
        let mut rng = StdRng::seed_from_u64(3);
        let value = resolve(&spec, &Faker, &mut rng, reference()).unwrap().unwrap();
        let dt = NaiveDateTime::parse_from_str(value.as_str().unwrap(), "%Y-%m-%d %H:%M:%S%.f").unwrap();
        assert!(dt >= reference());
    }

    #[test]
    fn test_phone_number_alias() {
        assert_eq!(spec("{ type: phone_number }"), PropertySpec::Phone);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let mut specs = IndexMap::new();
        specs.insert("mystery".to_string(), spec("{ type: hologram, values: [1] }"));
        specs.insert("ok".to_string(), spec("{ type: boolean }"));
        let mut rng = StdRng::seed_from_u64(4);

        let props = resolve_all(&specs, &Faker, &mut rng, reference()).unwrap();
        assert!(!props.contains_key("mystery"));
        assert!(props["ok"].is_boolean());
    }

    #[test]
    fn test_malformed_spec_is_error() {
        let mut rng = StdRng::seed_from_u64(5);
        let cases = [
            ("{ type: int, values: [] }", PropertyError::EmptyValues),
            ("{ type: date, values: [yesterday] }", PropertyError::InvalidDate("yesterday".to_string())),
            ("{ type: geolocation, values: ZZ }", PropertyError::UnknownCountry("ZZ".to_string())),
        ];
        for (yaml, expected) in cases {
            assert_eq!(resolve(&spec(yaml), &Faker, &mut rng, reference()), Err(expected));
        }
        assert!(matches!(
            resolve(&spec("{ type: float, values: [5.0, 1.0] }"), &Faker, &mut rng, reference()),
            Err(PropertyError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_float_spec_too_wide_is_error() {
        let mut rng = StdRng::seed_from_u64(9);
        for yaml in [
            "{ type: float, values: [-1.0e308, 1.0e308] }",
            "{ type: float, values: [0.0, .inf] }",
        ] {
            assert!(matches!(
                resolve(&spec(yaml), &Faker, &mut rng, reference()),
                Err(PropertyError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn test_resolve_all_names_failing_property() {
        let mut specs = IndexMap::new();
        specs.insert("qty".to_string(), spec("{ type: int, values: [9, 1] }"));
        let mut rng = StdRng::seed_from_u64(6);
        let err = resolve_all(&specs, &Faker, &mut rng, reference()).unwrap_err();
        assert!(matches!(err, PropertyError::Field { ref name, .. } if name == "qty"));
    }

    #[test]
    fn test_geolocation_defaults_to_us() {
        let mut rng = StdRng::seed_from_u64(7);
        let value = resolve(&spec("{ type: geolocation }"), &Faker, &mut rng, reference())
            .unwrap()
            .unwrap();
        assert_eq!(value["country_code"], "US");
    }
}
