//! # webevents-core - Collaborators for the fake web events engine
//!
//! Everything the session engine consumes but does not own:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      webevents-core                          │
//! │                                                              │
//! │   config.yml ──► Config ──► WeightedSelector ──┐             │
//! │                    │                           ▼             │
//! │                    └──► PropertySpec ──► Faker ──► values    │
//! │                                                              │
//! │   UserPool ──► User (Arc<Visitor> + referer/utm)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All randomness is drawn from a caller-supplied [`rand::Rng`], so a seeded
//! simulation repeats exactly.

pub mod config;
pub mod faker;
pub mod property;
pub mod user;
pub mod weighted;

pub use config::{
    Config, ConfigError, DEFAULT_CONFIG_PATH, EventConfig, LANDING_PAGES, PageConfig, SESSION_END,
    WeightTable,
};
pub use faker::{Faker, Place};
pub use property::{PropertyError, PropertySpec, resolve, resolve_all};
pub use user::{Acquisition, User, UserPool, Visitor};
pub use weighted::{
    EventChoices, PageTransitions, SelectError, WeightedSelector, choose_weighted,
};
