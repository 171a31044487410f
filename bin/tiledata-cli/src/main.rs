//! TileData CLI - Universal record administration
//!
//! Inspects and edits the universal record database offline, while the
//! server that owns it is stopped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tiledata_common::{Config, Location, RecordId};
use tiledata_record::{RecordStore, UniversalRecord};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tiledata-cli")]
#[command(about = "TileData record admin CLI")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/tiledata/tiledata.toml")]
    config: PathBuf,

    /// Record database path (overrides config)
    #[arg(long, env = "TILEDATA_DB")]
    db: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all records
    List,
    /// Show a record's fields
    Show {
        /// Record UUID
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an empty record
    Create {
        /// Initial location (`world;x;y;z`)
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Set a field on a record
    Set {
        /// Record UUID
        id: String,
        /// Field name
        field: String,
        /// Field value
        value: String,
    },
    /// Remove a field from a record
    Unset {
        /// Record UUID
        id: String,
        /// Field name
        field: String,
    },
    /// Delete a record and all its fields
    Delete {
        /// Record UUID
        id: String,
    },
    /// Show store statistics
    Stats,
}

#[derive(Serialize)]
struct RecordView {
    id: RecordId,
    last_present: Option<String>,
    fields: BTreeMap<String, String>,
}

impl RecordView {
    fn new(record: &UniversalRecord) -> Result<Self> {
        Ok(Self {
            id: record.id(),
            last_present: record.last_present().map(|l| l.to_string()),
            fields: record.container().all_data()?.to_map().into_iter().collect(),
        })
    }
}

/// Totals over every stored record
#[derive(Debug, Default, PartialEq, Eq)]
struct StoreSummary {
    records: usize,
    fields: usize,
    located: usize,
}

impl StoreSummary {
    fn collect(store: &RecordStore) -> Result<Self> {
        let mut summary = Self::default();
        for id in store.list_records()? {
            let record = store.load_record(id)?;
            summary.records += 1;
            summary.fields += record.container().all_data()?.len();
            if record.last_present().is_some() {
                summary.located += 1;
            }
        }
        Ok(summary)
    }
}

fn parse_id(id: &str) -> Result<RecordId> {
    id.parse()
        .with_context(|| format!("Invalid record id: '{id}'"))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(db) = args.db {
        config.record_store.db_path = db;
    }
    // One-shot process: every command flushes explicitly
    config.record_store.background_flush = false;

    debug!("Using record database {}", config.record_store.db_path.display());
    let store = RecordStore::open(config.record_store.clone()).with_context(|| {
        format!(
            "Failed to open record database {}",
            config.record_store.db_path.display()
        )
    })?;

    match args.command {
        Commands::List => {
            let ids = store.list_records()?;
            println!("Records");
            println!("=======");
            if ids.is_empty() {
                println!("No records found");
            } else {
                println!("{:<40} {:<8} {:<30}", "RECORD ID", "FIELDS", "LAST PRESENT");
                println!("{}", "-".repeat(80));
                for id in ids {
                    let record = store.load_record(id)?;
                    println!(
                        "{:<40} {:<8} {:<30}",
                        id,
                        record.container().all_data()?.len(),
                        record
                            .last_present()
                            .map_or_else(|| "-".to_string(), |l| l.to_string())
                    );
                }
            }
        }
        Commands::Show { id, json } => {
            let record = store.load_existing_record(parse_id(&id)?)?;
            let view = RecordView::new(&record)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("Record: {}", view.id);
                println!(
                    "Last present: {}",
                    view.last_present.as_deref().unwrap_or("-")
                );
                println!();
                if view.fields.is_empty() {
                    println!("No fields");
                } else {
                    println!("{:<30} {:<50}", "FIELD", "VALUE");
                    println!("{}", "-".repeat(80));
                    for (field, value) in &view.fields {
                        println!("{field:<30} {value:<50}");
                    }
                }
            }
        }
        Commands::Create { location } => {
            let location = location
                .map(|l| l.parse::<Location>())
                .transpose()
                .context("Invalid location")?;

            let record = store.create_record();
            if let Some(location) = location {
                record.set_last_present(location);
            }
            store.flush()?;

            println!("Record created successfully!");
            println!("Record ID: {}", record.id());
        }
        Commands::Set { id, field, value } => {
            let record = store.load_existing_record(parse_id(&id)?)?;
            record.set_data(&field, value)?;
            store.flush()?;
            println!("Set {field} on {id}");
        }
        Commands::Unset { id, field } => {
            let record = store.load_existing_record(parse_id(&id)?)?;
            if record.remove_data(&field)?.is_some() {
                store.flush()?;
                println!("Removed {field} from {id}");
            } else {
                println!("Field {field} not set on {id}");
            }
        }
        Commands::Delete { id } => {
            store.delete_record(&parse_id(&id)?)?;
            println!("Record {id} deleted");
        }
        Commands::Stats => {
            let summary = StoreSummary::collect(&store)?;
            println!("Record Store");
            println!("============");
            println!("Database: {}", config.record_store.db_path.display());
            println!("Records: {}", summary.records);
            println!("Fields: {}", summary.fields);
            println!("Records with location: {}", summary.located);
        }
    }

    Ok(())
}
