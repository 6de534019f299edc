//! Clinicflow CLI
//!
//! Command-line interface for clinicflow operations:
//! - Book, move and delete appointments
//! - Inspect overcrowding, free slots and department load
//! - Run priority rescheduling and expiry
//! - Import appointments from CSV
//! - Watch alerts while the background sweep runs

use anyhow::Context;
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clinicflow::config::{generate_default_config, Config, LoggingConfig};
use clinicflow::import::CsvImporter;
use clinicflow::schedule::{
    format_instant, parse_date, parse_time, Appointment, AppointmentKind, Department, Priority,
    MANUAL_RESCHEDULE_REASON,
};
use clinicflow::store::AppointmentStore;

#[derive(Parser)]
#[command(name = "clinicflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hospital appointment capacity and reschedule engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Book an appointment
    Add {
        /// Patient name
        name: String,
        /// Department (General, Cardiology, Orthopedics, Neurology, Emergency)
        department: Department,
        /// Date (YYYY-MM-DD)
        #[arg(value_parser = date_arg)]
        date: NaiveDate,
        /// Start time (HH:MM)
        #[arg(value_parser = time_arg)]
        time: NaiveTime,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Scheduled or Emergency
        #[arg(short = 't', long = "type", default_value = "scheduled")]
        kind: AppointmentKind,
        /// Duration in minutes (15-120)
        #[arg(short, long, default_value = "30")]
        duration: u32,
        #[arg(short, long)]
        note: Option<String>,
        /// Explicit appointment id
        #[arg(long)]
        id: Option<String>,
    },

    /// Move an appointment
    Reschedule {
        id: String,
        #[arg(value_parser = date_arg)]
        date: NaiveDate,
        #[arg(value_parser = time_arg)]
        time: NaiveTime,
        #[arg(short, long)]
        reason: Option<String>,
        /// Refuse the move unless the target slot has room
        #[arg(long)]
        check: bool,
    },

    /// Delete an appointment
    Delete { id: String },

    /// List appointments
    List {
        #[arg(short, long, value_parser = date_arg)]
        date: Option<NaiveDate>,
        #[arg(long)]
        department: Option<Department>,
    },

    /// Show overcrowded slots (default: today)
    Overcrowding {
        #[arg(short, long, value_parser = date_arg)]
        date: Option<NaiveDate>,
    },

    /// Show slot availability for a department
    Slots {
        department: Department,
        #[arg(short, long, value_parser = date_arg)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "30")]
        duration: u32,
        /// Appointment id to leave out of the occupancy count
        #[arg(long)]
        exclude: Option<String>,
    },

    /// Re-seat a day by priority
    Prioritize {
        #[arg(short, long, value_parser = date_arg)]
        date: Option<NaiveDate>,
        /// Earliest slot to use (HH:MM)
        #[arg(long, value_parser = time_arg, default_value = "09:00")]
        from: NaiveTime,
        /// Commit the plan instead of only printing it
        #[arg(long)]
        apply: bool,
    },

    /// Remove appointments that have finished
    Expire,

    /// Per-department load (default: today)
    Summary {
        #[arg(short, long, value_parser = date_arg)]
        date: Option<NaiveDate>,
    },

    /// Show or change doctor counts
    Capacity {
        #[command(subcommand)]
        action: CapacityAction,
    },

    /// Import appointments from CSV
    Import {
        path: PathBuf,
        /// Duration for rows without one
        #[arg(long, default_value = "30")]
        default_duration: u32,
        /// Parse only, submit nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show active alerts
    Alerts,

    /// Run the background sweep and print alerts until Ctrl-C
    Watch,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CapacityAction {
    Show,
    Set { department: Department, count: u32 },
}

fn date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).map_err(|e| e.to_string())
}

fn time_arg(raw: &str) -> Result<NaiveTime, String> {
    parse_time(raw).map_err(|e| e.to_string())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("clinicflow={}", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_appointments(appointments: &[Appointment]) {
    if appointments.is_empty() {
        println!("No appointments.");
        return;
    }
    println!(
        "{:<12} {:<20} {:<12} {:<9} {:<10} {:<17} {:>4}  {}",
        "ID", "Patient", "Department", "Priority", "Type", "Start", "Min", "Flags"
    );
    println!("{}", "-".repeat(100));
    for a in appointments {
        let mut flags = Vec::new();
        if a.needs_rescheduling {
            flags.push("NEEDS RESCHEDULE".to_string());
        }
        if let Some(reason) = &a.reschedule_reason {
            flags.push(format!("moved: {}", reason));
        }
        let id: String = a.id.chars().take(12).collect();
        println!(
            "{:<12} {:<20} {:<12} {:<9} {:<10} {:<17} {:>4}  {}",
            id,
            a.patient_name,
            a.department,
            a.priority,
            a.kind,
            format_instant(a.starts_at()),
            a.duration_minutes,
            flags.join("; ")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    let store = Arc::new(
        AppointmentStore::open(config.store_config()?, config.repository())
            .await
            .context("opening appointment store")?,
    );

    let result = run(&cli, &store).await;
    store.shutdown().await.context("saving appointments")?;
    result
}

async fn run(cli: &Cli, store: &Arc<AppointmentStore>) -> anyhow::Result<()> {
    let now = Local::now().naive_local();
    let today = now.date();
    let json = cli.format == OutputFormat::Json;

    match &cli.command {
        Commands::Add {
            name,
            department,
            date,
            time,
            priority,
            kind,
            duration,
            note,
            id,
        } => {
            let mut candidate = Appointment::new(name.as_str(), *department, *date, *time)
                .priority(*priority)
                .kind(*kind)
                .duration(*duration);
            if let Some(note) = note {
                candidate = candidate.health_note(note.as_str());
            }
            if let Some(id) = id {
                candidate = candidate.id(id.as_str());
            }

            let outcome = store.submit_at(candidate, now).await?;
            if json {
                print_json(&outcome)?;
            } else {
                let a = &outcome.appointment;
                println!(
                    "{:?}: {} ({}) at {} in {}",
                    outcome.status,
                    a.patient_name,
                    a.id,
                    format_instant(a.starts_at()),
                    a.department
                );
                for alert in &outcome.alerts {
                    println!("  [{}] {}", alert.severity, alert.message);
                }
            }
        }

        Commands::Reschedule {
            id,
            date,
            time,
            reason,
            check,
        } => {
            let outcome = if *check {
                store
                    .reschedule_to_available_at(id, *date, *time, reason.as_deref(), now)
                    .await?
            } else {
                let reason = reason.as_deref().unwrap_or(MANUAL_RESCHEDULE_REASON);
                store.reschedule_at(id, *date, *time, reason, now).await?
            };
            if json {
                print_json(&outcome)?;
            } else {
                println!("{}", outcome.alert.message);
            }
        }

        Commands::Delete { id } => {
            let removed = store.delete(id).await?;
            if json {
                print_json(&removed)?;
            } else {
                println!("Deleted {} ({})", removed.patient_name, removed.id);
            }
        }

        Commands::List { date, department } => {
            let mut appointments = store.appointments().await;
            appointments.retain(|a| {
                date.map_or(true, |d| a.date == d) && department.map_or(true, |d| a.department == d)
            });
            appointments.sort_by_key(|a| (a.starts_at(), a.department));
            if json {
                print_json(&appointments)?;
            } else {
                print_appointments(&appointments);
            }
        }

        Commands::Overcrowding { date } => {
            let slots = store.detect_overcrowding(date.unwrap_or(today)).await;
            if json {
                print_json(&slots)?;
            } else if slots.is_empty() {
                println!("No overcrowded slots.");
            } else {
                for slot in &slots {
                    println!(
                        "{} {} {}: {}/{} patients",
                        slot.slot.date,
                        slot.slot.time.format("%H:%M"),
                        slot.slot.department,
                        slot.slot.predicted,
                        slot.slot.capacity
                    );
                    for patient in &slot.excess {
                        println!(
                            "  move: {} ({}, {})",
                            patient.patient_name, patient.priority, patient.id
                        );
                    }
                    let spare: Vec<String> = slot
                        .spare_slots
                        .iter()
                        .take(5)
                        .map(|s| s.label())
                        .collect();
                    if !spare.is_empty() {
                        println!("  free: {}", spare.join(", "));
                    }
                    for hint in slot.recommendations() {
                        println!("  - {}", hint);
                    }
                }
            }
        }

        Commands::Slots {
            department,
            date,
            duration,
            exclude,
        } => {
            let slots = store
                .available_slots(
                    *department,
                    date.unwrap_or(today),
                    *duration,
                    exclude.as_deref(),
                )
                .await;
            if json {
                print_json(&slots)?;
            } else {
                for slot in &slots {
                    println!("{}", slot.label());
                }
            }
        }

        Commands::Prioritize { date, from, apply } => {
            let date = date.unwrap_or(today);
            let plan = if *apply {
                store.apply_priority_reschedule_at(date, *from, now).await?
            } else {
                store.plan_priority_reschedule(date, *from).await
            };
            if json {
                print_json(&plan)?;
            } else if plan.is_empty() {
                println!("Nobody needs to move.");
            } else {
                for p in &plan {
                    println!(
                        "{:<20} {:<9} {:<12} {} -> {}",
                        p.name,
                        p.priority,
                        p.department,
                        p.old_time.format("%H:%M"),
                        p.new_time.format("%H:%M")
                    );
                }
                if !*apply {
                    println!();
                    println!("(Plan only - rerun with --apply to move patients)");
                }
            }
        }

        Commands::Expire => {
            let removed = store.expire_completed_at(now).await;
            if json {
                print_json(&removed)?;
            } else {
                println!("Removed {} completed appointments", removed.len());
            }
        }

        Commands::Summary { date } => {
            let summary = store.summary(date.unwrap_or(today)).await;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "{:<12} {:>6} {:>8} {:>8} {:>5} {:>7}",
                    "Department", "Appts", "Flagged", "Doctors", "Peak", "Util%"
                );
                println!("{}", "-".repeat(52));
                for d in &summary.departments {
                    println!(
                        "{:<12} {:>6} {:>8} {:>8} {:>5} {:>6.0}%",
                        d.department,
                        d.appointments,
                        d.flagged,
                        d.capacity,
                        d.peak_concurrency,
                        d.utilization_percent
                    );
                }
                println!();
                println!(
                    "Total: {} appointments, {} flagged, {} overcrowded slots",
                    summary.total_appointments, summary.total_flagged, summary.overcrowded_slots
                );
            }
        }

        Commands::Capacity { action } => {
            if let CapacityAction::Set { department, count } = action {
                store.set_capacity(*department, *count).await?;
            }
            let capacities = store.capacities().await;
            if json {
                print_json(&capacities)?;
            } else {
                for (department, count) in capacities.iter() {
                    println!("{:<12} {}", department, count);
                }
            }
        }

        Commands::Import {
            path,
            default_duration,
            dry_run,
        } => {
            let importer = CsvImporter::new().with_default_duration(*default_duration);
            let parsed = importer
                .parse_path(path)
                .with_context(|| format!("reading {:?}", path))?;

            if *dry_run {
                println!("Rows parsed: {}", parsed.appointments.len());
                println!("Rows failed: {}", parsed.rows_failed);
                for error in parsed.errors.iter().take(10) {
                    println!("  {}", error);
                }
                println!();
                println!("(Dry run - no appointments were submitted)");
                return Ok(());
            }

            let report = importer.submit_all(parsed, store, now).await;
            if json {
                print_json(&report)?;
            } else {
                println!("Import results:");
                println!("  Admitted: {}", report.admitted);
                println!("  Needs rescheduling: {}", report.needs_rescheduling);
                println!("  Failed: {}", report.rows_failed);
                if !report.errors.is_empty() {
                    println!();
                    println!("Errors (first 10):");
                    for error in report.errors.iter().take(10) {
                        println!("  {}", error);
                    }
                }
            }
        }

        Commands::Alerts => {
            let alerts = store.active_alerts_at(now).await;
            if json {
                print_json(&alerts)?;
            } else {
                let summary = store.alert_summary_at(now).await;
                println!(
                    "{} active ({} critical), {} today",
                    summary.active, summary.critical, summary.total_today
                );
                for alert in &alerts {
                    println!(
                        "{} [{}] {}",
                        alert.timestamp.format("%H:%M"),
                        alert.severity,
                        alert.message
                    );
                }
            }
        }

        Commands::Watch => {
            let mut alerts = store.subscribe();
            let sweep = store.start_background_sweep();
            tracing::info!("Watching appointments, press Ctrl-C to stop");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    received = alerts.recv() => match received {
                        Ok(alert) => {
                            if json {
                                print_json(&alert)?;
                            } else {
                                println!("[{}] {}", alert.severity, alert.message);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("Missed {} alerts", missed);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            store.shutdown().await?;
            sweep.await.context("waiting for background sweep")?;
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}
