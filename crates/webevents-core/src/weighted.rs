//! Weighted random selection over configuration tables
//!
//! Read-only projections of [`Config`]: flat weighted tables, decayed page
//! transitions and prerequisite-filtered event choices. Every draw uses the
//! caller's RNG, so the selector itself is freely shareable.

use crate::config::{Config, EventConfig};
use crate::property::PropertySpec;
use indexmap::IndexMap;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectError {
    #[error("unknown weighted table '{0}'")]
    UnknownTable(String),
    #[error("unknown page '{0}'")]
    UnknownPage(String),
    #[error("no selectable outcome in '{0}'")]
    NoOutcome(String),
}

/// Draw an index proportionally to `weights`.
///
/// Zero weights are never selected. Returns `None` when nothing is selectable
/// (empty slice, all zero, or invalid weights).
pub fn choose_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let dist = WeightedIndex::new(weights).ok()?;
    Some(dist.sample(rng))
}

/// Candidate next pages and their (possibly decayed) weights
#[derive(Debug, Clone, PartialEq)]
pub struct PageTransitions {
    pub pages: Vec<String>,
    pub weights: Vec<f64>,
}

impl PageTransitions {
    pub fn weight_of(&self, page: &str) -> Option<f64> {
        self.pages
            .iter()
            .position(|p| p == page)
            .map(|i| self.weights[i])
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        choose_weighted(&self.weights, rng).map(|i| self.pages[i].as_str())
    }
}

/// Events eligible on a page for the current step
#[derive(Debug, Clone)]
pub struct EventChoices<'a> {
    pub events: Vec<(&'a str, &'a EventConfig)>,
    /// False when no event required the given prerequisite and the choices
    /// fell back to events without one.
    pub had_prereq_match: bool,
}

impl<'a> EventChoices<'a> {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            had_prereq_match: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.events.iter().map(|(name, _)| *name).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.events.iter().map(|(_, event)| event.prob).collect()
    }

    pub fn is_modal(&self, name: &str) -> bool {
        self.get(name).is_some_and(|event| event.modal)
    }

    pub fn properties(&self, name: &str) -> Option<&'a IndexMap<String, PropertySpec>> {
        self.get(name).map(|event| &event.properties)
    }

    /// Pick one event by `prob`
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&'a str, &'a EventConfig)> {
        choose_weighted(&self.weights(), rng).map(|i| self.events[i])
    }

    fn get(&self, name: &str) -> Option<&'a EventConfig> {
        self.events
            .iter()
            .find(|(event, _)| *event == name)
            .map(|(_, event)| *event)
    }
}

/// Stateless weighted-selection capability over a shared configuration
#[derive(Debug, Clone)]
pub struct WeightedSelector {
    config: Arc<Config>,
}

impl WeightedSelector {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Draw one key of a named flat table
    pub fn select<R: Rng + ?Sized>(&self, table: &str, rng: &mut R) -> Result<&str, SelectError> {
        let entries = self
            .config
            .table(table)
            .ok_or_else(|| SelectError::UnknownTable(table.to_string()))?;
        let weights: Vec<f64> = entries.values().copied().collect();
        choose_weighted(&weights, rng)
            .and_then(|i| entries.get_index(i))
            .map(|(key, _)| key.as_str())
            .ok_or_else(|| SelectError::NoOutcome(table.to_string()))
    }

    /// Like [`select`](Self::select) but yields `None` for absent tables
    pub fn select_optional<R: Rng + ?Sized>(&self, table: &str, rng: &mut R) -> Option<&str> {
        self.config.table(table)?;
        self.select(table, rng).ok()
    }

    /// Outgoing transitions of `page` at decay step `cycle`.
    ///
    /// While `cycle <= max_decay_cycles` every other target is scaled by
    /// `cycle / max_decay_cycles` and the self-loop takes the remainder
    /// `1 - sum(scaled)`, clamped to `[0, 1]`. Past that the configured
    /// weights are returned unchanged.
    pub fn page_transitions(&self, page: &str, cycle: u32) -> Result<PageTransitions, SelectError> {
        let page_config = self
            .config
            .page(page)
            .ok_or_else(|| SelectError::UnknownPage(page.to_string()))?;
        let max_cycles = page_config.max_decay_cycles;

        if max_cycles == 0 || cycle > max_cycles {
            return Ok(PageTransitions {
                pages: page_config.pages.keys().cloned().collect(),
                weights: page_config.pages.values().copied().collect(),
            });
        }

        let scale = f64::from(cycle) / f64::from(max_cycles);
        let mut pages = Vec::with_capacity(page_config.pages.len() + 1);
        let mut weights = Vec::with_capacity(page_config.pages.len() + 1);
        for (target, weight) in &page_config.pages {
            if target != page {
                pages.push(target.clone());
                weights.push(weight * scale);
            }
        }
        let stay = (1.0 - weights.iter().sum::<f64>()).clamp(0.0, 1.0);
        pages.push(page.to_string());
        weights.push(stay);

        Ok(PageTransitions { pages, weights })
    }

    /// Events of `page` whose prerequisite equals `prereq`, falling back to
    /// events without a prerequisite when none match.
    pub fn page_events(&self, page: &str, prereq: Option<&str>) -> EventChoices<'_> {
        let Some(events) = self.config.events_for(page) else {
            return EventChoices::empty();
        };

        let matching = with_prereq(events, prereq);
        if matching.is_empty() {
            EventChoices {
                events: with_prereq(events, None),
                had_prereq_match: false,
            }
        } else {
            EventChoices {
                events: matching,
                had_prereq_match: true,
            }
        }
    }
}

fn with_prereq<'a>(
    events: &'a IndexMap<String, EventConfig>,
    wanted: Option<&str>,
) -> Vec<(&'a str, &'a EventConfig)> {
    events
        .iter()
        .filter(|(_, event)| event.prereq.as_deref() == wanted)
        .map(|(name, event)| (name.as_str(), event))
        .collect()
}
