//! colstore CLI
//!
//! Command-line interface for a colstore data directory:
//! - Save events
//! - Look up, average and filter
//! - Inspect stats and schema

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colstore::config::{generate_default_config, Config, LoggingConfig};
use colstore::query::{parse_query, parse_value};
use colstore::storage::{EventStore, Fields, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "colstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Append-only column-oriented event store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding the config
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save one event
    Save {
        /// Fields in name=value format. Values are typed by literal syntax:
        /// 200 is an int, 46.3 a float, true a bool, anything else a string
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Print one event
    Get {
        /// Event id
        id: u64,
    },

    /// Average a numeric field
    Avg {
        /// Field name
        field: String,
    },

    /// Print events matching a filter, e.g. "timestamp > 510 AND status = 200"
    Where {
        /// Filter expression
        expr: String,
    },

    /// Show store statistics
    Stats,

    /// List fields and their kinds
    Schema,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
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

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    init_logging(&config.logging);
    tracing::debug!("colstore v{}", env!("CARGO_PKG_VERSION"));

    let store = EventStore::open(config.store_config(), Arc::new(SystemClock)).await?;
    let result = run(&store, cli.command).await;
    store.close().await?;
    result
}

async fn run(store: &EventStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Save { fields } => {
            let fields = parse_fields(&fields)?;
            let id = store.save_event(&fields).await?;
            print_json(&serde_json::json!({ "id": id }))?;
        }

        Commands::Get { id } => {
            let event = store.get_event(id).await?;
            print_json(&event)?;
        }

        Commands::Avg { field } => {
            let avg = store.avg(&field).await?;
            print_json(&serde_json::json!({ "field": field, "avg": avg }))?;
        }

        Commands::Where { expr } => {
            let query = parse_query(&expr)?;
            let events = store.filter(&query).await?;
            print_json(&events)?;
        }

        Commands::Stats => {
            let stats = store.stats().await?;
            tracing::info!("{}", stats);
            print_json(&stats)?;
        }

        Commands::Schema => {
            print_json(&store.schema().await?)?;
        }

        Commands::Config { .. } => unreachable!("handled before the store is opened"),
    }

    Ok(())
}

/// Parse `name=value` arguments
fn parse_fields(args: &[String]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            bail!("expected name=value, got '{}'", arg);
        };
        if fields.insert(name.to_string(), parse_value(value)).is_some() {
            bail!("field '{}' given more than once", name);
        }
    }
    Ok(fields)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine readable. `RUST_LOG` wins over the config.
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("colstore={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
