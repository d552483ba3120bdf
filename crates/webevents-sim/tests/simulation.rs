//! End-to-end tests driving the simulation through its public API

use chrono::{NaiveDateTime, TimeDelta};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use webevents_core::{Config, SESSION_END, UserPool};
use webevents_sim::{
    EventRecord, Growth, Session, SessionContext, Simulation, SimulationOptions,
};

const HOURS: &str = "visits_per_hour: { 0: 1, 1: 1, 2: 1, 3: 1, 4: 1, 5: 1, 6: 1, 7: 1, 8: 1, 9: 1, 10: 1, 11: 1, 12: 1, 13: 1, 14: 1, 15: 1, 16: 1, 17: 1, 18: 1, 19: 1, 20: 1, 21: 1, 22: 1, 23: 1 }\n";

const TWO_STATE: &str = "landing_pages: { landing: 1 }
pages:
  landing:
    max_decay_cycles: 1
    pages: { landing: 0.5, session_end: 0.5 }
";

fn config(body: &str) -> Arc<Config> {
    Arc::new(Config::from_yaml_str(&format!("{HOURS}{body}")).unwrap())
}

fn init_time() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2024-06-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
}

fn options(seed: u64) -> SimulationOptions {
    SimulationOptions {
        init_time: init_time(),
        seed: Some(seed),
        ..SimulationOptions::default()
    }
}

fn ticks(sim: &mut Simulation, n: usize) -> Vec<EventRecord> {
    let mut records = Vec::new();
    for _ in 0..n {
        records.extend(sim.tick().unwrap());
    }
    records
}

#[test]
fn test_single_session_two_state_walk() {
    let ctx = SessionContext::new(config(TWO_STATE), 10, true);
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..100 {
        let user = UserPool::new(0).get_user(&ctx.selector, &ctx.faker, &mut rng);
        let mut session = Session::new(init_time(), user, &ctx, &mut rng).unwrap();

        let mut records = usize::from(session.is_reportable());
        let mut page_changes = usize::from(session.is_new_page());
        let mut steps = 0;
        while session.is_active() {
            steps += 1;
            assert!(steps < 200, "session did not terminate");
            let now = session.timestamp() + TimeDelta::seconds(10);
            session.update(now, &ctx, &mut rng).unwrap();
            if session.is_reportable() {
                records += 1;
            }
            if session.is_active() && session.is_new_page() {
                page_changes += 1;
            }
        }

        assert_eq!(session.current_page(), SESSION_END);
        assert_eq!(records, 1);
        assert_eq!(records, page_changes);
    }
}

#[test]
fn test_two_state_simulation_emits_one_pageview_per_session() {
    let mut sim = Simulation::new(config(TWO_STATE), options(5)).unwrap();
    let records = ticks(&mut sim, 500);

    let stats = sim.stats();
    assert!(stats.sessions_created > 0);
    assert_eq!(stats.events_emitted, stats.sessions_created);
    assert_eq!(records.len() as u64, stats.events_emitted);
    assert!(records.iter().all(|r| r.is_pageview() && r.page() == "landing"));
}

#[test]
fn test_spawn_count_converges_to_rate() {
    let opts = SimulationOptions {
        sessions_per_day: 1000,
        ..options(17)
    };
    let mut sim = Simulation::new(config(TWO_STATE), opts).unwrap();

    let n = 10_000;
    let mut expected = 0.0;
    let mut created = 0;
    for _ in 0..n {
        expected += sim.rate();
        let before = sim.stats().sessions_created;
        sim.tick().unwrap();
        created += sim.stats().sessions_created - before;
    }

    let mean_rate = expected / n as f64;
    let mean_spawned = created as f64 / n as f64;
    assert!((mean_rate - 1000.0 / 360.0).abs() < 1e-9);
    assert!(
        (mean_spawned - mean_rate).abs() < 0.05,
        "spawned {mean_spawned} per tick, rate {mean_rate}"
    );
}

#[test]
fn test_hourly_weights_shape_the_rate() {
    let weights: Vec<String> = (0..24)
        .map(|hour| format!("{hour}: {}", if hour < 12 { 0.0 } else { 2.0 }))
        .collect();
    let hours = format!("visits_per_hour: {{ {} }}\n", weights.join(", "));
    let config = Arc::new(Config::from_yaml_str(&format!("{hours}{TWO_STATE}")).unwrap());

    let mut sim = Simulation::new(config, options(3)).unwrap();
    assert_eq!(sim.rate(), 0.0);
    // morning hours spawn nothing
    for _ in 0..100 {
        assert!(sim.tick().unwrap().is_empty());
    }

    let opts = SimulationOptions {
        init_time: init_time() + TimeDelta::hours(13),
        ..options(3)
    };
    let config = Arc::new(Config::from_yaml_str(&format!("{hours}{TWO_STATE}")).unwrap());
    let sim = Simulation::new(config, opts).unwrap();
    assert!((sim.rate() - 2.0 * 10_000.0 / 360.0).abs() < 1e-9);
}

#[test]
fn test_seeded_runs_repeat_exactly() {
    let render = |seed| {
        let opts = SimulationOptions {
            user_pool_size: 50,
            growth: Growth::Linear,
            ..options(seed)
        };
        let mut sim = Simulation::new(Arc::new(Config::template().unwrap()), opts).unwrap();
        ticks(&mut sim, 200)
            .iter()
            .map(|record| record.to_json().unwrap())
            .collect::<Vec<_>>()
    };

    let first = render(99);
    assert!(!first.is_empty());
    assert_eq!(first, render(99));
    assert_ne!(first, render(100));
}

#[test]
fn test_template_records_are_consistent() {
    let config = Arc::new(Config::template().unwrap());
    let opts = SimulationOptions {
        user_pool_size: 100,
        ..options(42)
    };
    let mut sim = Simulation::new(Arc::clone(&config), opts).unwrap();
    let records = ticks(&mut sim, 300);

    assert_eq!(sim.stats().failed_records, 0);
    assert!(records.iter().any(|r| !r.is_pageview()));

    let mut ids = HashSet::new();
    for record in &records {
        assert!(ids.insert(record.event_id));
        assert!(config.page(record.page()).is_some());
        assert_ne!(record.page(), SESSION_END);
        if !record.is_pageview() {
            assert!(
                config.event(record.page(), &record.event_type).is_some(),
                "{} is not an event of {}",
                record.event_type,
                record.page()
            );
        }
        assert!(record.user.contains_key("user_domain_id"));
        assert!(record.user.contains_key("browser_name"));
    }
}

#[test]
fn test_always_forward_keeps_timestamps_after_base() {
    let config = Arc::new(Config::template().unwrap());
    let ctx = SessionContext::new(config, 10, true);
    let mut rng = StdRng::seed_from_u64(8);

    for _ in 0..50 {
        let user = UserPool::new(0).get_user(&ctx.selector, &ctx.faker, &mut rng);
        let mut session = Session::new(init_time(), user, &ctx, &mut rng).unwrap();
        assert!(session.timestamp() >= init_time());
        while session.is_active() {
            let base = session.timestamp() + TimeDelta::seconds(10);
            session.update(base, &ctx, &mut rng).unwrap();
            assert!(session.timestamp() >= base);
        }
    }
}

#[test]
fn test_prereq_events_follow_their_prereq() {
    let config = Arc::new(Config::template().unwrap());
    let ctx = SessionContext::new(Arc::clone(&config), 10, true);
    let mut rng = StdRng::seed_from_u64(12);

    for _ in 0..300 {
        let user = UserPool::new(0).get_user(&ctx.selector, &ctx.faker, &mut rng);
        let mut session = Session::new(init_time(), user, &ctx, &mut rng).unwrap();
        while session.is_active() {
            let previous_event = session.custom_event().map(str::to_string);
            let base = session.timestamp();
            session.update(base, &ctx, &mut rng).unwrap();
            let Some(event) = session.custom_event() else {
                continue;
            };
            assert!(!session.is_new_page());
            let prereq = config
                .event(session.current_page(), event)
                .and_then(|e| e.prereq.as_deref());
            if let Some(prereq) = prereq {
                assert_eq!(previous_event.as_deref(), Some(prereq));
            }
        }
    }
}

#[test]
fn test_unresolvable_properties_are_skipped() {
    let body = "landing_pages: { shop: 1 }
pages:
  shop:
    max_decay_cycles: 0
    pages: { shop: 0.9, session_end: 0.1 }
events:
  shop:
    broken:
      prob: 1.0
      properties:
        quantity: { type: int, values: [10, 1] }
";
    let mut sim = Simulation::new(config(body), options(21)).unwrap();
    let records = ticks(&mut sim, 300);

    let stats = sim.stats();
    assert!(stats.failed_records > 0);
    assert!(!records.is_empty());
    assert!(records.iter().all(EventRecord::is_pageview));
    assert_eq!(stats.events_emitted, records.len() as u64);
}

#[test]
fn test_run_streams_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{HOURS}{TWO_STATE}").unwrap();

    let config = Arc::new(Config::load(Some(file.path())).unwrap());
    let mut sim = Simulation::new(config, options(1)).unwrap();

    let records: Vec<_> = sim
        .run(Duration::from_millis(100))
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(!records.is_empty());
    assert_eq!(records.len() as u64, sim.stats().events_emitted);
}

#[test]
fn test_unbounded_float_range_is_skipped() {
    let body = "landing_pages: { shop: 1 }
pages:
  shop:
    max_decay_cycles: 0
    pages: { shop: 0.9, session_end: 0.1 }
events:
  shop:
    measure:
      prob: 1.0
      properties:
        amount: { type: float, values: [-1.0e308, 1.0e308] }
";
    let mut sim = Simulation::new(config(body), options(22)).unwrap();
    let records = ticks(&mut sim, 300);

    assert!(sim.stats().failed_records > 0);
    assert!(records.iter().all(EventRecord::is_pageview));
}
