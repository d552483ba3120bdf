//! Session state machine
//!
//! One visitor's walk through the site. Each [`Session::update`] moves the
//! session one step along the page graph; staying on the same page may fire a
//! custom event, possibly inside a modal sub-flow.
//!
//! ```text
//!              ┌──────── same page: custom event ─────────┐
//!              │                                          │
//!   landing ──►│  Browsing(page) ── page change ──► Browsing(other)
//!              │        │                                 │
//!              └────────┴─────── session_end ─────────────┴──► terminal
//! ```
//!
//! Modal sub-flow: an event flagged `modal` opens a modal. While it is open,
//! events whose prerequisite matches the last event continue the flow; when
//! nothing matches the session goes back to the modal event with probability
//! 0.4 or leaves the modal otherwise.

use chrono::{NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use rand::Rng;
use std::sync::Arc;
use tracing::trace;
use webevents_core::{
    Config, Faker, LANDING_PAGES, PropertyError, PropertySpec, SESSION_END, SelectError, User,
    WeightedSelector, resolve_all,
};

use crate::record::EventRecord;

/// Chance of going back to the open modal when no prerequisite matched
pub const MODAL_RETURN_PROB: f64 = 0.4;

/// Timestamp jitter as a fraction of the step size
pub const TIMESTAMP_JITTER: f64 = 0.3;

/// Read-only capabilities every session draws on
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub selector: WeightedSelector,
    pub faker: Faker,
    /// Simulation step in seconds
    pub batch_size: u32,
    /// Only jitter timestamps forward
    pub always_forward: bool,
}

impl SessionContext {
    pub fn new(config: Arc<Config>, batch_size: u32, always_forward: bool) -> Self {
        Self {
            selector: WeightedSelector::new(config),
            faker: Faker::new(),
            batch_size,
            always_forward,
        }
    }

    pub fn config(&self) -> &Config {
        self.selector.config()
    }

    fn jitter<R: Rng + ?Sized>(&self, base: NaiveDateTime, rng: &mut R) -> NaiveDateTime {
        let range_ms = (f64::from(self.batch_size) * TIMESTAMP_JITTER * 1000.0) as i64;
        let low = if self.always_forward { 0 } else { -range_ms };
        base + TimeDelta::milliseconds(rng.random_range(low..=range_ms))
    }
}

/// Outcome of one [`Session::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<'a> {
    pub is_new_page: bool,
    pub custom_event: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Session {
    user: User,
    current_page: String,
    previous_page: Option<String>,
    timestamp: NaiveDateTime,
    custom_event: Option<String>,
    event_properties: IndexMap<String, PropertySpec>,
    curr_cycle: u32,
    /// Event that opened the current modal; `Some` while a modal is open
    modal_event: Option<String>,
    yield_modal: bool,
    is_new_page: bool,
}

impl Session {
    /// Start a session on a landing page drawn from `landing_pages`
    pub fn new<R: Rng + ?Sized>(
        timestamp: NaiveDateTime,
        user: User,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> Result<Self, SelectError> {
        let landing = ctx.selector.select(LANDING_PAGES, rng)?.to_string();
        trace!(page = %landing, "Session started.");

        Ok(Self {
            user,
            current_page: landing,
            previous_page: None,
            timestamp: ctx.jitter(timestamp, rng),
            custom_event: None,
            event_properties: IndexMap::new(),
            curr_cycle: 1,
            modal_event: None,
            yield_modal: false,
            is_new_page: true,
        })
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advance one step with the simulated clock at `now`.
    ///
    /// A terminal session is left untouched.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        now: NaiveDateTime,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> Result<Step<'_>, SelectError> {
        if self.is_active() {
            self.timestamp = ctx.jitter(now, rng);
            self.next_page(ctx, rng)?;
            if self.is_new_page {
                self.custom_event = None;
                self.event_properties.clear();
                self.modal_event = None;
                self.yield_modal = false;
                self.curr_cycle = 1;
            } else {
                self.next_custom_event(ctx, rng);
                self.curr_cycle += 1;
            }
        }

        Ok(Step {
            is_new_page: self.is_new_page,
            custom_event: self.custom_event.as_deref(),
        })
    }

    fn next_page<R: Rng + ?Sized>(&mut self, ctx: &SessionContext, rng: &mut R) -> Result<(), SelectError> {
        let transitions = ctx.selector.page_transitions(&self.current_page, self.curr_cycle)?;
        let next = transitions
            .draw(rng)
            .ok_or_else(|| SelectError::NoOutcome(self.current_page.clone()))?
            .to_string();

        let previous = std::mem::replace(&mut self.current_page, next);
        self.is_new_page = previous != self.current_page;
        self.previous_page = Some(previous);
        Ok(())
    }

    fn next_custom_event<R: Rng + ?Sized>(&mut self, ctx: &SessionContext, rng: &mut R) {
        let choices = ctx
            .selector
            .page_events(&self.current_page, self.custom_event.as_deref());
        let Some((name, event)) = choices.draw(rng) else {
            self.custom_event = None;
            self.event_properties.clear();
            self.yield_modal = false;
            return;
        };

        self.custom_event = Some(name.to_string());
        self.event_properties = event.properties.clone();

        let Some(modal_event) = self.modal_event.clone() else {
            self.update_modal(event.modal);
            return;
        };
        if choices.had_prereq_match {
            self.update_modal(event.modal);
        } else if rng.random_bool(MODAL_RETURN_PROB) {
            // back to the modal itself
            self.event_properties = ctx
                .config()
                .event(&self.current_page, &modal_event)
                .map(|modal| modal.properties.clone())
                .unwrap_or_default();
            self.custom_event = Some(modal_event);
            self.yield_modal = false;
        } else {
            self.modal_event = None;
            self.update_modal(event.modal);
        }
    }

    /// Open a modal when a modal event fires while none is open.
    fn update_modal(&mut self, opens_modal: bool) {
        if opens_modal && self.modal_event.is_none() {
            self.modal_event = self.custom_event.clone();
            self.yield_modal = true;
        } else {
            self.yield_modal = false;
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Whether the current state should be reported as a record
    pub fn is_reportable(&self) -> bool {
        self.is_active() && (self.is_new_page || self.custom_event.is_some())
    }

    /// Assemble the record for the current state.
    ///
    /// Pageviews carry the session's referer and UTM fields as properties;
    /// custom events carry their resolved property specs.
    pub fn to_record<R: Rng + ?Sized>(
        &self,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> Result<EventRecord, PropertyError> {
        let properties = match &self.custom_event {
            None => {
                let mut fields = self.user.referer();
                fields.extend(self.user.utm());
                fields
            }
            Some(_) => resolve_all(&self.event_properties, &ctx.faker, rng, self.timestamp)?,
        };

        Ok(EventRecord::assemble(
            ctx.faker.uuid(rng),
            self.timestamp,
            self.custom_event.as_deref(),
            &self.current_page,
            properties,
            &self.user,
        ))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn is_active(&self) -> bool {
        self.current_page != SESSION_END
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn current_page(&self) -> &str {
        &self.current_page
    }

    pub fn previous_page(&self) -> Option<&str> {
        self.previous_page.as_deref()
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn custom_event(&self) -> Option<&str> {
        self.custom_event.as_deref()
    }

    pub fn event_properties(&self) -> &IndexMap<String, PropertySpec> {
        &self.event_properties
    }

    pub fn curr_cycle(&self) -> u32 {
        self.curr_cycle
    }

    pub fn is_modal(&self) -> bool {
        self.modal_event.is_some()
    }

    pub fn modal_event(&self) -> Option<&str> {
        self.modal_event.as_deref()
    }

    pub fn yield_modal(&self) -> bool {
        self.yield_modal
    }

    pub fn is_new_page(&self) -> bool {
        self.is_new_page
    }
}
