//! # webevents-sim - Fake web events simulation engine
//!
//! Simulates visitors browsing a website and emits one flat record per
//! pageview or custom event, driven entirely by a YAML site description.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        webevents-sim                             │
//! │                                                                  │
//! │   ┌──────────────────────────────────────────────────────────┐   │
//! │   │                      Simulation                          │   │
//! │   │                                                          │   │
//! │   │  clock + rate ──► spawn ──► Vec<Session> ──► update      │   │
//! │   │                                   │                      │   │
//! │   │                                   ▼                      │   │
//! │   │                     Session::to_record ──► EventRecord   │   │
//! │   └──────────────────────────────────────────────────────────┘   │
//! │                               │                                  │
//! │                               ▼                                  │
//! │   webevents-core: Config, WeightedSelector, Faker, UserPool      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use webevents_core::Config;
//! use webevents_sim::{Simulation, SimulationOptions};
//!
//! let config = Arc::new(Config::load(None)?);
//! let options = SimulationOptions { seed: Some(42), ..Default::default() };
//! let mut simulation = Simulation::new(config, options)?;
//! for record in simulation.run(Duration::from_secs(5)) {
//!     println!("{}", record?.to_json()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod record;
pub mod session;
pub mod simulation;

pub use record::{EventRecord, PAGEVIEW, SITE_URL, TIMESTAMP_FORMAT};
pub use session::{Session, SessionContext, Step};
pub use simulation::{
    Growth, Run, Simulation, SimulationError, SimulationOptions, SimulationStats,
};
