//! webevents - Fake web events generator
//!
//! Usage:
//!   webevents generate --duration 30s --config config.yml
//!   webevents generate --duration 5m --sessions-per-day 50000 --growth linear --seed 7
//!   webevents validate --config config.yml
//!   webevents template > config.yml
//!   webevents benchmark --duration 10s

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr, bail};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use webevents_core::{Config, DEFAULT_CONFIG_PATH, LANDING_PAGES};
use webevents_sim::{Growth, Simulation, SimulationOptions};

#[derive(Parser)]
#[command(name = "webevents")]
#[command(about = "Generate fake web analytics events from a site description")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream generated events to stdout
    Generate {
        #[command(flatten)]
        sim: SimArgs,

        /// Wall-clock duration (e.g. 30s, 5m, 1h)
        #[arg(short, long, default_value = "30s")]
        duration: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Load and validate a configuration file
    Validate {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print the bundled default configuration
    Template,

    /// Measure generation throughput
    Benchmark {
        #[command(flatten)]
        sim: SimArgs,

        /// Wall-clock duration
        #[arg(short, long, default_value = "10s")]
        duration: String,
    },
}

#[derive(clap::Args)]
struct SimArgs {
    /// Configuration file; the bundled template is used when it does not exist
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Sessions per day at a visits weight of 1.0
    #[arg(long, default_value = "10000")]
    sessions_per_day: u32,

    /// Simulated seconds per step
    #[arg(long, default_value = "10")]
    batch_size: u32,

    /// Recycled visitors (0 disables returning visitors)
    #[arg(long, default_value = "0")]
    user_pool_size: usize,

    /// Days session start times spread over
    #[arg(long, default_value = "1")]
    sim_days: u32,

    /// Start-time shape: uniform, linear or exponential
    #[arg(long, default_value = "uniform")]
    growth: Growth,

    /// Simulated start time (YYYY-MM-DD HH:MM:SS); defaults to now
    #[arg(long)]
    init_time: Option<String>,

    /// Allow the clock and timestamps to jitter backwards
    #[arg(long)]
    allow_backwards: bool,

    /// RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Indented JSON
    Pretty,
    /// No records, only the final state
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Generate {
            sim,
            duration,
            format,
        } => run_generate(sim, &duration, format),
        Commands::Validate { config } => run_validate(config),
        Commands::Template => run_template(),
        Commands::Benchmark { sim, duration } => run_benchmark(sim, &duration),
    }
}

fn build_simulation(args: SimArgs) -> Result<Simulation> {
    let config = Config::load(Some(&args.config))
        .wrap_err_with(|| format!("failed to load {}", args.config.display()))?;

    let mut options = SimulationOptions {
        user_pool_size: args.user_pool_size,
        sessions_per_day: args.sessions_per_day,
        batch_size: args.batch_size,
        sim_days: args.sim_days,
        growth: args.growth,
        always_forward: !args.allow_backwards,
        seed: args.seed,
        ..SimulationOptions::default()
    };
    if let Some(raw) = args.init_time {
        options.init_time = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
            .wrap_err_with(|| format!("invalid --init-time '{raw}'"))?;
    }

    Ok(Simulation::new(Arc::new(config), options)?)
}

fn run_generate(args: SimArgs, duration: &str, format: OutputFormat) -> Result<()> {
    let budget = parse_duration(duration)?;
    let mut simulation = build_simulation(args)?;
    info!(duration = ?budget, "Generating events.");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut last_report = 0;

    let mut run = simulation.run(budget);
    while let Some(record) = run.next() {
        let record = record?;
        match format {
            OutputFormat::Json => writeln!(out, "{}", record.to_json()?)?,
            OutputFormat::Pretty => writeln!(out, "{}", record.to_json_pretty()?)?,
            OutputFormat::Summary => {}
        }

        let stats = run.simulation().stats();
        if stats.ticks >= last_report + 360 {
            last_report = stats.ticks;
            info!(
                sessions = run.simulation().len_sessions(),
                events = stats.events_emitted,
                duration = %run.simulation().duration_str(),
                "Progress."
            );
        }
    }
    drop(run);
    out.flush()?;

    eprintln!("{simulation}");
    Ok(())
}

fn run_validate(path: PathBuf) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    let config =
        Config::load(Some(&path)).wrap_err_with(|| format!("{} is invalid", path.display()))?;

    let events: usize = config.events.values().map(|events| events.len()).sum();
    println!("{} is valid", path.display());
    println!("  pages:          {}", config.pages.len());
    println!("  custom events:  {events}");
    println!(
        "  landing pages:  {}",
        config.table(LANDING_PAGES).map_or(0, |table| table.len())
    );
    println!("  weighted tables: {}", config.tables.len());
    Ok(())
}

fn run_template() -> Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(Config::template_source().as_bytes())?;
    out.flush()?;
    Ok(())
}

fn run_benchmark(args: SimArgs, duration: &str) -> Result<()> {
    let budget = parse_duration(duration)?;
    let mut simulation = build_simulation(args)?;

    eprintln!("╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║           webevents Throughput Benchmark                     ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║ Duration: {:50} ║", duration);
    eprintln!("╚══════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let mut total = 0u64;
    let mut bytes = 0usize;
    for record in simulation.run(budget) {
        bytes += record?.to_json()?.len();
        total += 1;
    }

    let elapsed = start.elapsed().as_secs_f64();
    let stats = simulation.stats();

    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║                   Benchmark Results                          ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║ Wall clock time: {:42.2}s ║", elapsed);
    eprintln!("║ Total events: {:46} ║", total);
    eprintln!("║ Events/sec: {:48.0} ║", total as f64 / elapsed.max(f64::EPSILON));
    eprintln!("║ MB/sec: {:52.2} ║", bytes as f64 / 1_048_576.0 / elapsed.max(f64::EPSILON));
    eprintln!("║ Ticks: {:53} ║", stats.ticks);
    eprintln!("║ Simulated: {:49} ║", simulation.duration_str());
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
    Ok(())
}

/// Parse `30s`, `5m`, `1h` or a bare number of seconds
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .wrap_err_with(|| format!("invalid duration '{s}'"))?;
    Ok(Duration::from_secs(value * unit))
}
