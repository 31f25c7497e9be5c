use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

use gps_dyno::{
    drive_run, DynoConfig, JsonFileRepository, RunPlan, RunSession, RunStatus, SimulatedProvider,
    TrackingFeed, Vehicle,
};

#[derive(Parser, Debug)]
#[command(name = "gps_dyno")]
#[command(about = "GPS dyno - power and torque from an acceleration run", long_about = None)]
struct Args {
    /// Recording time in seconds after the countdown
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// JSON config file (defaults apply for missing keys)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vehicle mass in kg
    #[arg(long)]
    mass: Option<f64>,

    /// Vehicle name
    #[arg(long)]
    name: Option<String>,

    /// Directory holding saved runs
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Top speed of the simulated run (m/s)
    #[arg(long, default_value = "45.0")]
    top_speed: f64,

    /// Save the run when it completes
    #[arg(long)]
    save: bool,

    /// List saved runs and exit
    #[arg(long)]
    list: bool,

    /// Delete the saved run with this id and exit
    #[arg(long, value_name = "ID")]
    delete: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DynoConfig::load(path)?,
        None => DynoConfig::default(),
    };
    if let Some(dir) = &args.store_dir {
        config.store_dir = dir.clone();
    }
    let vehicle = Vehicle::new(
        args.name.clone().unwrap_or_else(|| config.vehicle.name.clone()),
        args.mass.unwrap_or(config.vehicle.mass_kg),
    )?;
    config.vehicle = vehicle;

    let repository = JsonFileRepository::in_dir(&config.store_dir);
    let provider = Arc::new(SimulatedProvider::new(args.top_speed, 6.0));
    let (feed, mut events) = TrackingFeed::new(provider, config.poll_interval(), config.feed_capacity);
    let mut session = RunSession::new(feed, repository, &config);

    if args.list {
        if session.saved_runs().is_empty() {
            println!("No saved runs in {}", config.store_dir.display());
        }
        for run in session.saved_runs() {
            println!("{}  {}  {}", run.id, run.date, run.headline());
        }
        return Ok(());
    }

    if let Some(id) = &args.delete {
        if !session.delete_run(id)? {
            bail!("no saved run with id {}", id);
        }
        println!("Deleted {}", id);
        return Ok(());
    }

    println!("[{}] GPS Dyno Starting", ts_now());
    println!("  Vehicle: {} ({} kg)", config.vehicle.name, config.vehicle.mass_kg);
    println!("  Duration: {} seconds", args.duration);
    println!("  Store Dir: {}", config.store_dir.display());

    std::fs::create_dir_all(&config.store_dir)?;
    let plan = RunPlan {
        countdown_tick: config.countdown_tick(),
        record_for: Duration::from_secs(args.duration),
        status_path: Some(config.store_dir.join("live_status.json")),
        ..RunPlan::default()
    };

    let status = drive_run(&mut session, &mut events, &plan).await?;
    if status != RunStatus::Complete {
        bail!("run ended in state {}", status);
    }

    println!("\n=== Run Results ===");
    println!("Samples: {}", session.sample_count());
    println!("Curve points: {}", session.derived().len());
    match session.peaks() {
        Some(peaks) => {
            println!("Max power: {:.0} HP", peaks.max_power_hp);
            println!("Max torque: {:.0} Nm", peaks.max_torque_nm);
        }
        None => println!("Not enough samples for a curve"),
    }

    if args.save {
        match session.save()? {
            Some(run) => {
                info!("saved to {}", config.store_dir.display());
                println!("[{}] Saved run {}", ts_now(), run.id);
            }
            None => println!("[{}] Nothing to save", ts_now()),
        }
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
