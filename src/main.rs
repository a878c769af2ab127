use std::io::{stdin, stdout};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use pagedb::constants::TABLE_MAX_PAGES;
use pagedb::{repl, Table, TableConfig};

#[derive(Parser)]
#[command(name = "db", about = "Single-table record store backed by a B-tree file", version)]
struct Cli {
    /// Path to the database file, created if missing
    filename: PathBuf,

    /// Set the logging level (RUST_LOG takes precedence)
    #[arg(short, long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Maximum number of pages the file may grow to
    #[arg(long, default_value_t = TABLE_MAX_PAGES)]
    max_pages: u32,

    /// Skip the fsync after the final flush
    #[arg(long)]
    no_sync: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the command transcript, logs go to stderr
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(cli.log_level.into()).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = TableConfig {
        max_pages: cli.max_pages,
        sync_on_close: !cli.no_sync,
    };
    let mut table = Table::open(&cli.filename, config)
        .with_context(|| format!("failed to open {}", cli.filename.display()))?;

    repl::run(&mut table, stdin().lock(), stdout().lock())?;

    table
        .close()
        .with_context(|| format!("failed to flush {}", cli.filename.display()))
}
