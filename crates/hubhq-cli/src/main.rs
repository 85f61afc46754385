use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use hubhq_core::hub::{HubProfile, HubState};
use hubhq_core::status::StatusThresholds;
use hubhq_core::RecordSet;
use hubhq_storage::{HubStore, Sheet, UpsertErrorEntry};
use hubhq_sync::sink::OutboxSink;
use hubhq_sync::source::DirectorySource;
use hubhq_sync::{attendance, committee, compile, forms, national, setup, PassSummary, SyncContext};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod lock;
mod logging;

use config::{config_path, load_config, save_config, AppConfig, CONFIG_ENV};
use lock::{lock_path, RunLock};

#[derive(Parser)]
#[command(name = "hubhq")]
#[command(about = "Hub HQ contact sync", long_about = None)]
struct Cli {
    /// Config file; defaults to the user config dir
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// SQLite store, overriding the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Snapshot directory, overriding the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Committee outbox directory, overriding the config file
    #[arg(long, global = true)]
    outbox_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and manage hubs
    Hub {
        #[command(subcommand)]
        action: HubCommands,
    },
    /// Run scheduled passes
    Sync {
        #[arg(value_enum)]
        pass: Pass,
    },
    /// Load or inspect a hub's sheets
    Hq {
        #[command(subcommand)]
        action: HqCommands,
    },
    /// Inspect the errors tables
    Errors {
        #[arg(long)]
        hub: Option<String>,
        /// Show pending committee upsert failures instead
        #[arg(long)]
        upserts: bool,
        /// With --upserts, every failure logged on or after this day, retried or not
        #[arg(long, value_name = "YYYY-MM-DD", requires = "upserts")]
        since: Option<NaiveDate>,
    },
    /// Write the effective configuration to the config path
    InitConfig,
}

#[derive(Subcommand)]
enum HubCommands {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        spreadsheet_id: String,
        #[arg(long, default_value = "")]
        zipcode: String,
        #[arg(long, default_value_t = 0)]
        radius: u32,
        /// Skip set-up and put the hub straight on the schedule
        #[arg(long)]
        scheduled: bool,
    },
    List {
        #[arg(long)]
        state: Option<HubState>,
    },
    Settings {
        name: String,
        #[arg(long)]
        event_threshold: Option<u32>,
        #[arg(long)]
        inactivity_days: Option<i64>,
    },
    Promote {
        name: String,
    },
}

#[derive(Subcommand)]
enum HqCommands {
    /// Replace a sheet with the records in a JSON array file
    Import {
        hub: String,
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = SheetArg::HubHq)]
        sheet: SheetArg,
    },
    Show {
        hub: String,
        #[arg(long, value_enum, default_value_t = SheetArg::HubHq)]
        sheet: SheetArg,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Pass {
    Attendance,
    Forms,
    National,
    Committee,
    Retry,
    Compile,
    Setup,
    /// Set-up, attendance, forms, national, committee then compile
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SheetArg {
    HubHq,
    Unrestricted,
    National,
}

impl From<SheetArg> for Sheet {
    fn from(arg: SheetArg) -> Self {
        match arg {
            SheetArg::HubHq => Sheet::HubHq,
            SheetArg::Unrestricted => Sheet::Unrestricted,
            SheetArg::National => Sheet::NationalContacts,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_file = config_path(cli.config.as_deref());
    let mut config = load_config(&config_file)?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(outbox_dir) = &cli.outbox_dir {
        config.outbox_dir = outbox_dir.clone();
    }
    logging::init_logging(cli.log_level.as_deref(), config.log_level.as_deref());

    match cli.command {
        Commands::InitConfig => {
            save_config(&config_file, &config)?;
            println!("Wrote {}", config_file.display());
        }
        Commands::Hub { action } => run_hub_command(&config, action)?,
        Commands::Sync { pass } => run_sync(&config, pass)?,
        Commands::Hq { action } => run_hq_command(&config, action)?,
        Commands::Errors { hub, upserts, since } => {
            let store = open_store(&config.database_path)?;
            if upserts {
                print_upsert_errors(&store, hub.as_deref(), since)?;
            } else {
                print_errors(&store, hub.as_deref())?;
            }
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<HubStore> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    HubStore::open(path).with_context(|| format!("Failed to open store {}", path.display()))
}

fn acquire_lock(config: &AppConfig) -> Result<RunLock> {
    let path = lock_path(&config.database_path);
    match RunLock::try_acquire(&path, Utc::now())
        .with_context(|| format!("Failed to open lock {}", path.display()))?
    {
        Some(lock) => Ok(lock),
        None => bail!("another hubhq run holds {}", path.display()),
    }
}

fn run_hub_command(config: &AppConfig, action: HubCommands) -> Result<()> {
    match action {
        HubCommands::List { state } => {
            let store = open_store(&config.database_path)?;
            let states = match state {
                Some(state) => vec![state],
                None => vec![HubState::SetUp, HubState::Scheduled],
            };
            for state in states {
                for hub in store.hubs_in_state(state)? {
                    println!(
                        "{}\t{}\t{}\tevents>{}\tinactive>={}d",
                        hub.name(),
                        hub.profile.hub_email,
                        hub.state,
                        hub.thresholds.event_threshold,
                        hub.thresholds.inactivity_days
                    );
                }
            }
        }
        HubCommands::Add {
            name,
            email,
            spreadsheet_id,
            zipcode,
            radius,
            scheduled,
        } => {
            let _lock = acquire_lock(config)?;
            let store = open_store(&config.database_path)?;
            let state = if scheduled {
                HubState::Scheduled
            } else {
                HubState::SetUp
            };
            let profile = HubProfile {
                hub_name: name,
                hub_email: email,
                spreadsheet_id,
                zipcode,
                search_radius: radius,
            };
            let created = store.register_hub(&profile, state, config.thresholds.into(), Utc::now())?;
            if created {
                println!("Registered {} ({state})", profile.hub_name);
            } else {
                println!("Updated {}", profile.hub_name);
            }
        }
        HubCommands::Settings {
            name,
            event_threshold,
            inactivity_days,
        } => {
            let _lock = acquire_lock(config)?;
            let store = open_store(&config.database_path)?;
            let current = store.thresholds(&name)?;
            let updated = StatusThresholds {
                event_threshold: event_threshold.unwrap_or(current.event_threshold),
                inactivity_days: inactivity_days.unwrap_or(current.inactivity_days),
            };
            store.set_thresholds(&name, updated)?;
            println!(
                "{name}: event threshold {}, inactivity {} days",
                updated.event_threshold, updated.inactivity_days
            );
        }
        HubCommands::Promote { name } => {
            let _lock = acquire_lock(config)?;
            let store = open_store(&config.database_path)?;
            store.set_hub_state(&name, HubState::Scheduled)?;
            println!("{name} is scheduled");
        }
    }
    Ok(())
}

fn run_sync(config: &AppConfig, pass: Pass) -> Result<()> {
    let _lock = acquire_lock(config)?;
    let store = open_store(&config.database_path)?;
    let source = DirectorySource::new(&config.data_dir);
    let sink = OutboxSink::new(&config.outbox_dir);
    let ctx = SyncContext {
        store: &store,
        source: &source,
        sink: &sink,
        now: Utc::now(),
    };

    let passes = match pass {
        Pass::All => vec![
            Pass::Setup,
            Pass::Attendance,
            Pass::Forms,
            Pass::National,
            Pass::Committee,
            Pass::Compile,
        ],
        single => vec![single],
    };

    info!(event = "sync_start", passes = passes.len(), db = %config.database_path.display());
    for pass in passes {
        let summary = match pass {
            Pass::Attendance => attendance::run(&ctx),
            Pass::Forms => forms::run(&ctx),
            Pass::National => national::run(&ctx),
            Pass::Committee => committee::run(&ctx),
            Pass::Retry => committee::retry(&ctx),
            Pass::Compile => compile::run(&ctx),
            Pass::Setup => setup::run(&ctx),
            Pass::All => continue,
        }
        .with_context(|| format!("{pass:?} pass aborted"))?;
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &PassSummary) {
    for report in &summary.reports {
        println!(
            "{}\t{}\tmatched={}\tappended={}\tissues={}",
            report.script,
            report.hub,
            report.matched,
            report.appended,
            report.issues.len()
        );
    }
    for hub in &summary.errored_hubs {
        println!("{}\t{}\tFAILED", summary.script, hub);
    }
}

fn run_hq_command(config: &AppConfig, action: HqCommands) -> Result<()> {
    match action {
        HqCommands::Import { hub, file, sheet } => {
            let _lock = acquire_lock(config)?;
            let store = open_store(&config.database_path)?;
            if store.hub(&hub)?.is_none() {
                bail!("unknown hub {hub}");
            }
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records: RecordSet = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let written = store.replace_sheet(&hub, sheet.into(), &records)?;
            println!("Loaded {written} rows into {hub} {}", Sheet::from(sheet).as_str());
        }
        HqCommands::Show { hub, sheet, json } => {
            let store = open_store(&config.database_path)?;
            let sheet = Sheet::from(sheet);
            let records = store.load_sheet(&hub, sheet)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records).context("Failed to render sheet")?
                );
            } else {
                println!("{}", sheet.columns().join("\t"));
                for record in &records {
                    println!("{}", record.to_row(sheet.columns()).join("\t"));
                }
            }
        }
    }
    Ok(())
}

/// Pending failures by default; with `since`, the full history from that day.
fn upsert_errors(
    store: &HubStore,
    hub: Option<&str>,
    since: Option<NaiveDate>,
) -> Result<Vec<UpsertErrorEntry>> {
    let entries = match since {
        Some(day) => store
            .upsert_errors_since(day)?
            .into_iter()
            .filter(|entry| hub.map_or(true, |hub| entry.hub == hub))
            .collect(),
        None => store.pending_upsert_errors(hub)?,
    };
    Ok(entries)
}

fn print_upsert_errors(store: &HubStore, hub: Option<&str>, since: Option<NaiveDate>) -> Result<()> {
    for entry in upsert_errors(store, hub, since)? {
        println!(
            "{}\t{}\t{}\t{}",
            entry.date, entry.hub, entry.email, entry.error
        );
    }
    Ok(())
}

fn print_errors(store: &HubStore, hub: Option<&str>) -> Result<()> {
    let entries = store.errors(hub)?;
    for entry in &entries {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            entry.date, entry.script, entry.hub, entry.note, entry.error
        );
    }
    eprintln!("{} of {} logged errors", entries.len(), store.error_count()?);
    Ok(())
}
