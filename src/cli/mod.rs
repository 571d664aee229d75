use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};

pub mod commands;
mod format;

use self::commands::{
    EditArgs, IdArgs, LetterArgs, ListArgs, NewArgs, RecoverArgs, Services, StatsArgs, WriteArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "booknook",
    version,
    about = "Reading journal with autosaved drafts and letters to your future self"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over BOOKNOOK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over BOOKNOOK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an entry from flags or stdin
    New(NewArgs),
    /// List entries (default); accepts mood:, tag:, fav, created: and free text
    List(ListArgs),
    /// Change fields of an existing entry
    Edit(EditArgs),
    /// Toggle the favorite flag of an entry
    Favorite(IdArgs),
    /// Delete an entry
    Delete(IdArgs),
    /// Write an entry line by line with autosave
    Write(WriteArgs),
    /// Totals, mood breakdown and writing streak
    Stats(StatsArgs),
    /// Letters to your future or past self
    Letters(LetterArgs),
    /// Inspect drafts left behind by an interrupted session
    Recover(RecoverArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));

    runtime.block_on(async move {
        let services = Services::open(config, &paths)?;
        match command {
            Commands::New(args) => commands::new_entry(&services, args).await,
            Commands::List(args) => commands::list_entries(&services, args).await,
            Commands::Edit(args) => commands::edit_entry(&services, args).await,
            Commands::Favorite(args) => commands::toggle_favorite(&services, args).await,
            Commands::Delete(args) => commands::delete_entry(&services, args).await,
            Commands::Write(args) => commands::write_session(&services, args).await,
            Commands::Stats(args) => commands::show_stats(&services, args).await,
            Commands::Letters(args) => commands::handle_letters(&services, args).await,
            Commands::Recover(args) => commands::recover(&services, args).await,
        }
    })
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
