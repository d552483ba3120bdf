//! Configuration model and loader
//!
//! The whole simulation is driven by one YAML document:
//!
//! ```yaml
//! visits_per_hour: { 0: 0.01, 1: 0.01, ..., 23: 0.02 }
//! pages:
//!   home:
//!     max_decay_cycles: 3
//!     pages: { home: 0.4, product_a: 0.3, session_end: 0.3 }
//! events:
//!   product_a:
//!     add_to_cart: { prob: 0.3, properties: { quantity: { type: int, values: [1, 5] } } }
//! landing_pages: { home: 0.7, product_a: 0.3 }   # any other key is a weighted table
//! ```
//!
//! Maps keep file order so seeded runs draw identically across processes.

use crate::property::PropertySpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Terminal page: a session that reaches it is finished.
pub const SESSION_END: &str = "session_end";

/// Weighted table the landing page of a new session is drawn from.
pub const LANDING_PAGES: &str = "landing_pages";

/// Path tried when no configuration path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

const TEMPLATE: &str = include_str!("../config.template.yml");

/// Outcome name -> weight.
pub type WeightTable = IndexMap<String, f64>;

/// Root configuration document
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Expected share of daily sessions arriving in each hour of the day.
    pub visits_per_hour: BTreeMap<u32, f64>,
    /// Page transition graph.
    pub pages: IndexMap<String, PageConfig>,
    /// Custom events per page.
    #[serde(default)]
    pub events: IndexMap<String, IndexMap<String, EventConfig>>,
    /// Every other top-level key: named weighted tables (landing pages, browsers, ...).
    #[serde(flatten)]
    pub tables: IndexMap<String, WeightTable>,
}

/// Outgoing transitions of one page
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PageConfig {
    /// Steps over which the self-loop bias decays to the configured weights.
    pub max_decay_cycles: u32,
    /// Target page -> weight.
    pub pages: WeightTable,
}

/// A custom event that can fire while a session stays on a page
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventConfig {
    pub prob: f64,
    /// Event that must have fired on the previous step for this one to be eligible.
    #[serde(default)]
    pub prereq: Option<String>,
    /// Whether the event opens a modal sub-flow.
    #[serde(default)]
    pub modal: bool,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySpec>,
}

/// Errors raised while loading or validating a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("visits_per_hour has no entry for hour {0}")]
    MissingHour(u32),
    #[error("visits_per_hour has an entry for hour {0}, expected 0..=23")]
    UnknownHour(u32),
    #[error("invalid weight {weight} for '{key}' in '{table}'")]
    InvalidWeight {
        table: String,
        key: String,
        weight: f64,
    },
    #[error("page '{from}' transitions to unknown page '{to}'")]
    UnknownTarget { from: String, to: String },
    #[error("table '{0}' has no entry with a positive weight")]
    NoPositiveWeight(String),
    #[error("page '{0}' has no transition with a positive weight")]
    DeadEndPage(String),
    #[error("events configured for unknown page '{0}'")]
    UnknownEventPage(String),
    #[error("event '{event}' on page '{page}' requires unknown event '{prereq}'")]
    UnknownPrereq {
        page: String,
        event: String,
        prereq: String,
    },
    #[error("missing weighted table '{0}'")]
    MissingTable(String),
    #[error("table '{table}' names unknown page '{page}'")]
    UnknownLandingPage { table: String, page: String },
}

impl Config {
    /// Load a configuration file, falling back to the bundled template when
    /// the file does not exist. `None` tries [`DEFAULT_CONFIG_PATH`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        match fs::read_to_string(path) {
            Ok(raw) => {
                info!(path = %path.display(), "Loaded configuration.");
                Self::from_yaml_str(&raw)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Configuration not found, loading default template.");
                Self::template()
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        debug!(
            pages = config.pages.len(),
            tables = config.tables.len(),
            "Configuration validated."
        );
        Ok(config)
    }

    /// The bundled default configuration
    pub fn template() -> Result<Self, ConfigError> {
        Self::from_yaml_str(TEMPLATE)
    }

    /// Raw text of the bundled default configuration
    pub fn template_source() -> &'static str {
        TEMPLATE
    }

    pub fn page(&self, page: &str) -> Option<&PageConfig> {
        self.pages.get(page)
    }

    pub fn events_for(&self, page: &str) -> Option<&IndexMap<String, EventConfig>> {
        self.events.get(page)
    }

    pub fn event(&self, page: &str, event: &str) -> Option<&EventConfig> {
        self.events.get(page).and_then(|events| events.get(event))
    }

    pub fn table(&self, name: &str) -> Option<&WeightTable> {
        self.tables.get(name)
    }

    /// Expected arrivals for an hour of the day (0 for unknown hours)
    pub fn visits_for_hour(&self, hour: u32) -> f64 {
        self.visits_per_hour.get(&hour).copied().unwrap_or(0.0)
    }

    /// Check the structural invariants the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for hour in 0..24 {
            let weight = *self
                .visits_per_hour
                .get(&hour)
                .ok_or(ConfigError::MissingHour(hour))?;
            check_weight("visits_per_hour", &hour.to_string(), weight)?;
        }
        if let Some(hour) = self.visits_per_hour.keys().find(|h| **h >= 24) {
            return Err(ConfigError::UnknownHour(*hour));
        }

        for (from, page) in &self.pages {
            for (to, weight) in &page.pages {
                check_weight(from, to, *weight)?;
                if to != SESSION_END && !self.pages.contains_key(to) {
                    return Err(ConfigError::UnknownTarget {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
            if !page.pages.values().any(|w| *w > 0.0) {
                return Err(ConfigError::DeadEndPage(from.clone()));
            }
        }

        for (page, events) in &self.events {
            if !self.pages.contains_key(page) {
                return Err(ConfigError::UnknownEventPage(page.clone()));
            }
            for (name, event) in events {
                check_weight(page, name, event.prob)?;
                if let Some(prereq) = &event.prereq {
                    if !events.contains_key(prereq) {
                        return Err(ConfigError::UnknownPrereq {
                            page: page.clone(),
                            event: name.clone(),
                            prereq: prereq.clone(),
                        });
                    }
                }
            }
        }

        for (name, table) in &self.tables {
            for (key, weight) in table {
                check_weight(name, key, *weight)?;
            }
        }

        let landing = self
            .tables
            .get(LANDING_PAGES)
            .ok_or_else(|| ConfigError::MissingTable(LANDING_PAGES.to_string()))?;
        if let Some(page) = landing.keys().find(|p| !self.pages.contains_key(*p)) {
            return Err(ConfigError::UnknownLandingPage {
                table: LANDING_PAGES.to_string(),
                page: page.clone(),
            });
        }
        if !landing.values().any(|w| *w > 0.0) {
            return Err(ConfigError::NoPositiveWeight(LANDING_PAGES.to_string()));
        }

        Ok(())
    }
}

fn check_weight(table: &str, key: &str, weight: f64) -> Result<(), ConfigError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight {
            table: table.to_string(),
            key: key.to_string(),
            weight,
        })
    }
}
