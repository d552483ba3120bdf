//! Simulation clock and session pool
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Simulation                           │
//! │                                                               │
//! │  tick():                                                      │
//! │    1. update every session, drop the ones that reached end    │
//! │    2. spawn floor(rate) + Bernoulli(frac(rate)) sessions      │
//! │    3. advance the clock by batch_size ± 30% jitter            │
//! │    4. recompute rate from visits_per_hour[hour]               │
//! │    5. emit one record per reportable session                  │
//! │                                                               │
//! │  run(duration) ──► Run: lazy records until wall clock is up   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All randomness comes from one [`StdRng`] owned by the simulation, so a
//! seeded run with the same options and configuration repeats exactly.

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp, Triangular};
use serde::Serialize;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use webevents_core::{Config, SelectError, UserPool};

use crate::record::EventRecord;
use crate::session::{Session, SessionContext};

/// Clock jitter as a fraction of the step size
pub const CLOCK_JITTER: f64 = 0.3;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Exponential start-time ramp cut-off
const EXP_RAMP_LIMIT: f64 = 8.0;

// ============================================================================
// Options
// ============================================================================

/// How session start times spread over the simulated window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    #[default]
    Uniform,
    Linear,
    Exponential,
}

impl FromStr for Growth {
    type Err = Infallible;

    /// Unrecognized names fall back to uniform.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "lineal" | "lin" | "linear" => Growth::Linear,
            "exp" | "exponential" => Growth::Exponential,
            _ => Growth::Uniform,
        })
    }
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Growth::Uniform => "uniform",
            Growth::Linear => "linear",
            Growth::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Recycled visitors; 0 makes every session a new visitor
    pub user_pool_size: usize,
    /// Sessions per day at a visits weight of 1.0
    pub sessions_per_day: u32,
    /// Simulated seconds per step
    pub batch_size: u32,
    pub init_time: NaiveDateTime,
    /// Length of the window session start times are drawn from
    pub sim_days: u32,
    pub growth: Growth,
    /// Never jitter the clock or timestamps backwards
    pub always_forward: bool,
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            user_pool_size: 0,
            sessions_per_day: 10_000,
            batch_size: 10,
            init_time: Local::now().naive_local(),
            sim_days: 1,
            growth: Growth::Uniform,
            always_forward: true,
            seed: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid simulation options: {0}")]
    InvalidOptions(String),
    #[error("session step failed: {0}")]
    Select(#[from] SelectError),
}

/// Running totals since the simulation was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub ticks: u64,
    pub sessions_created: u64,
    pub sessions_finished: u64,
    pub events_emitted: u64,
    /// Records skipped because their properties could not be resolved
    pub failed_records: u64,
}

/// Distribution of the start-time ratio within the simulated window
#[derive(Debug, Clone, Copy)]
enum StartShape {
    Uniform,
    Linear(Triangular<f64>),
    Exponential(Exp<f64>),
}

impl StartShape {
    fn new(growth: Growth) -> Result<Self, SimulationError> {
        let shape = match growth {
            Growth::Uniform => StartShape::Uniform,
            Growth::Linear => StartShape::Linear(
                Triangular::new(0.0, 1.0, 0.0)
                    .map_err(|e| SimulationError::InvalidOptions(e.to_string()))?,
            ),
            Growth::Exponential => StartShape::Exponential(
                Exp::new(1.0 / 1.5).map_err(|e| SimulationError::InvalidOptions(e.to_string()))?,
            ),
        };
        Ok(shape)
    }

    /// Ratio in `[0, 1]`; later starts are more likely for the growth shapes
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            StartShape::Uniform => rng.random(),
            StartShape::Linear(triangular) => 1.0 - triangular.sample(rng),
            StartShape::Exponential(exp) => {
                let x = exp.sample(rng);
                if x < EXP_RAMP_LIMIT {
                    (EXP_RAMP_LIMIT - x) / EXP_RAMP_LIMIT
                } else {
                    1.0
                }
            }
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    ctx: SessionContext,
    user_pool: UserPool,
    sessions: Vec<Session>,
    init_time: NaiveDateTime,
    cur_time: NaiveDateTime,
    stop_time: NaiveDateTime,
    sessions_per_day: f64,
    growth: Growth,
    start_shape: StartShape,
    rng: StdRng,
    rate: f64,
    stats: SimulationStats,
}

impl Simulation {
    pub fn new(config: Arc<Config>, options: SimulationOptions) -> Result<Self, SimulationError> {
        if options.sim_days == 0 {
            return Err(SimulationError::InvalidOptions("sim_days must be positive".into()));
        }
        if options.batch_size == 0 {
            return Err(SimulationError::InvalidOptions("batch_size must be positive".into()));
        }

        let stop_time = TimeDelta::try_days(i64::from(options.sim_days))
            .and_then(|span| options.init_time.checked_add_signed(span))
            .ok_or_else(|| {
                SimulationError::InvalidOptions(format!(
                    "sim_days {} runs past the supported calendar",
                    options.sim_days
                ))
            })?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut simulation = Self {
            ctx: SessionContext::new(config, options.batch_size, options.always_forward),
            user_pool: UserPool::new(options.user_pool_size),
            sessions: Vec::new(),
            init_time: options.init_time,
            cur_time: options.init_time,
            stop_time,
            sessions_per_day: f64::from(options.sessions_per_day),
            growth: options.growth,
            start_shape: StartShape::new(options.growth)?,
            rng,
            rate: 0.0,
            stats: SimulationStats::default(),
        };
        simulation.rate = simulation.rate_per_step();

        info!(
            init_time = %simulation.init_time,
            sim_days = options.sim_days,
            batch_size = options.batch_size,
            sessions_per_day = options.sessions_per_day,
            user_pool_size = options.user_pool_size,
            growth = %options.growth,
            seeded = options.seed.is_some(),
            "Simulation created."
        );
        Ok(simulation)
    }

    /// Lazily yield records, stepping the clock whenever the buffer runs dry,
    /// until `duration` of wall-clock time has passed.
    ///
    /// Dropping the iterator keeps all state; a later `run` resumes from it.
    pub fn run(&mut self, duration: Duration) -> Run<'_> {
        Run {
            simulation: self,
            started: Instant::now(),
            budget: duration,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// One simulation step; returns the records it emitted.
    pub fn tick(&mut self) -> Result<Vec<EventRecord>, SimulationError> {
        self.update_all_sessions()?;
        self.create_sessions()?;
        self.wait();

        let mut records = Vec::new();
        for session in &self.sessions {
            if !session.is_reportable() {
                continue;
            }
            match session.to_record(&self.ctx, &mut self.rng) {
                Ok(record) => records.push(record),
                Err(error) => {
                    self.stats.failed_records += 1;
                    warn!(
                        page = session.current_page(),
                        event = session.custom_event().unwrap_or_default(),
                        %error,
                        "Skipping record with unresolvable properties."
                    );
                }
            }
        }

        self.stats.ticks += 1;
        self.stats.events_emitted += records.len() as u64;
        debug!(
            sessions = self.sessions.len(),
            records = records.len(),
            rate = self.rate,
            "Tick complete."
        );
        Ok(records)
    }

    fn update_all_sessions(&mut self) -> Result<(), SimulationError> {
        let elapsed = self.cur_time - self.init_time;
        for session in &mut self.sessions {
            let now = session.timestamp() + elapsed;
            session.update(now, &self.ctx, &mut self.rng)?;
        }

        let before = self.sessions.len();
        self.sessions.retain(Session::is_active);
        self.stats.sessions_finished += (before - self.sessions.len()) as u64;
        Ok(())
    }

    fn create_sessions(&mut self) -> Result<(), SimulationError> {
        let whole = self.rate.floor();
        let mut count = whole as u64;
        if self.rng.random_bool((self.rate - whole).clamp(0.0, 1.0)) {
            count += 1;
        }

        for _ in 0..count {
            let start = self.session_start();
            let user = self.user_pool.get_user(&self.ctx.selector, &self.ctx.faker, &mut self.rng);
            let session = Session::new(start, user, &self.ctx, &mut self.rng)?;
            self.sessions.push(session);
        }
        self.stats.sessions_created += count;
        Ok(())
    }

    fn session_start(&mut self) -> NaiveDateTime {
        let span_ms = (self.stop_time - self.init_time).num_milliseconds() as f64;
        let ratio = self.start_shape.sample(&mut self.rng);
        self.init_time + TimeDelta::milliseconds((span_ms * ratio) as i64)
    }

    /// Advance the clock one step and refresh the spawn rate
    fn wait(&mut self) {
        let step_ms = i64::from(self.ctx.batch_size) * 1000;
        let jitter_ms = (f64::from(self.ctx.batch_size) * CLOCK_JITTER * 1000.0) as i64;
        let low = if self.ctx.always_forward { 0 } else { -jitter_ms };
        self.cur_time += TimeDelta::milliseconds(step_ms + self.rng.random_range(low..=jitter_ms));
        self.rate = self.rate_per_step();
    }

    pub fn steps_per_hour(&self) -> f64 {
        SECONDS_PER_HOUR / f64::from(self.ctx.batch_size)
    }

    /// Expected new sessions per step at the current simulated hour
    fn rate_per_step(&self) -> f64 {
        let hourly = self.ctx.config().visits_for_hour(self.cur_time.hour());
        hourly * self.sessions_per_day / self.steps_per_hour()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn len_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn growth(&self) -> Growth {
        self.growth
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    pub fn current_time(&self) -> NaiveDateTime {
        self.cur_time
    }

    pub fn current_duration(&self) -> TimeDelta {
        self.cur_time - self.init_time
    }

    /// Simulated time elapsed, e.g. `1 days, 2 hours, 3 minutes, 4 seconds`
    pub fn duration_str(&self) -> String {
        let total = self.current_duration().num_seconds();
        format!(
            "{} days, {} hours, {} minutes, {} seconds",
            total / 86_400,
            (total % 86_400) / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

impl fmt::Display for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation state")?;
        writeln!(f, "  sessions:  {}", self.len_sessions())?;
        writeln!(f, "  duration:  {}", self.duration_str())?;
        writeln!(f, "  rate:      {:.4} sessions/step", self.rate)?;
        writeln!(f, "  events:    {}", self.stats.events_emitted)?;
        write!(f, "  failed:    {}", self.stats.failed_records)
    }
}

// ============================================================================
// Lazy record stream
// ============================================================================

/// Record iterator returned by [`Simulation::run`]
pub struct Run<'a> {
    simulation: &'a mut Simulation,
    started: Instant,
    budget: Duration,
    pending: VecDeque<EventRecord>,
    failed: bool,
}

impl Run<'_> {
    pub fn simulation(&self) -> &Simulation {
        self.simulation
    }
}

impl Iterator for Run<'_> {
    type Item = Result<EventRecord, SimulationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.failed || self.started.elapsed() >= self.budget {
                return None;
            }
            match self.simulation.tick() {
                Ok(records) => self.pending.extend(records),
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
