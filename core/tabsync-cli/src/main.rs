//! tabsync: inspect and edit a tabsync project store from the command line.
//!
//! Works on the JSON store file directly; the browser does not need to be
//! running. Intended for debugging and for repairing state by hand.
//!
//! ## Subcommands
//!
//! - `projects`, `add`, `delete`, `tabs`: project registry
//! - `bindings`, `gc`: window → project bindings
//! - `carry-over`: tabs marked to survive a switch
//! - `log`: diagnostic event log

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabsync_core::{load_config, StorageConfig};

#[derive(Parser)]
#[command(name = "tabsync")]
#[command(about = "Tab projects store inspector")]
#[command(version)]
struct Cli {
    /// Store file (defaults to ~/.tabsync/store.json)
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Config file (defaults to ~/.tabsync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects with their recorded tab counts
    Projects,

    /// Add a project with an empty tab list
    Add { name: String },

    /// Delete a project, its tabs and its window bindings
    Delete { name: String },

    /// Show a project's recorded tab URLs
    Tabs { name: String },

    /// Show window → project bindings
    Bindings,

    /// Drop bindings for every window not listed
    Gc {
        /// Ids of windows that are still open
        #[arg(value_name = "WINDOW_ID")]
        live: Vec<i64>,
    },

    /// Show tabs marked for carry over
    CarryOver,

    /// Show the diagnostic event log
    Log {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());

    if let Err(message) = run(cli, &storage).await {
        tracing::error!(error = %message, "tabsync failed");
        eprintln!("error: {}", message);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, storage: &StorageConfig) -> Result<(), String> {
    let config = load_config(cli.config)?;
    let store_path = cli.store.unwrap_or_else(|| storage.store_file());
    let ctx = commands::Context::open(&store_path, &config, cli.json)?;

    let output = match cli.command {
        Commands::Projects => commands::projects(&ctx).await?,
        Commands::Add { name } => commands::add(&ctx, &name).await?,
        Commands::Delete { name } => commands::delete(&ctx, &name).await?,
        Commands::Tabs { name } => commands::tabs(&ctx, &name).await?,
        Commands::Bindings => commands::bindings(&ctx).await?,
        Commands::Gc { live } => commands::gc(&ctx, &live).await?,
        Commands::CarryOver => commands::carry_over(&ctx).await?,
        Commands::Log { limit } => commands::log(&ctx, limit).await?,
    };
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
