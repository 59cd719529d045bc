use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kindred::analysis::CommandAnalyzer;
use kindred::catalog::{MpdCatalog, MpdSettings};
use kindred::config::AppConfig;
use kindred::sync::SyncReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kindred", version, about = "MPD similarity-index maintainer")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Root directory of the MPD music library
    #[arg(long, global = true)]
    music_root: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest catalog entries newer than the stored watermark
    Update,

    /// Purge the index and re-ingest the whole catalog
    Rescan,

    /// Keep the index in sync continuously, blocking on MPD idle (ctrl-c to stop)
    Watch,

    /// Re-attempt every track whose last ingest failed
    RetryErrors,

    /// Empty the index and reset the watermark to epoch
    Purge,

    /// Show index statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .clone()
        .or(config.db_path.clone())
        .unwrap_or_else(kindred::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = kindred::db::Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Update => {
            let music_root = require_music_root(&cli, &config)?;
            let analyzer = build_analyzer(&config)?;
            let mut catalog = connect(&config, Arc::new(AtomicBool::new(false)))?;

            let report = kindred::sync::update(&db, &analyzer, &mut catalog, &music_root)
                .context("Update failed")?;
            print_report("Update", &report);
        }

        Commands::Rescan => {
            let music_root = require_music_root(&cli, &config)?;
            let analyzer = build_analyzer(&config)?;
            let mut catalog = connect(&config, Arc::new(AtomicBool::new(false)))?;

            let report = kindred::sync::full_rescan(&db, &analyzer, &mut catalog, &music_root)
                .context("Rescan failed")?;
            print_report("Rescan", &report);
        }

        Commands::Watch => {
            let music_root = require_music_root(&cli, &config)?;
            let analyzer = build_analyzer(&config)?;

            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = stop.clone();
            ctrlc::set_handler(move || {
                log::info!("Interrupt received, stopping after the current pass");
                handler_stop.store(true, Ordering::SeqCst);
            })
            .context("Failed to set ctrl-c handler")?;

            let mut catalog = connect(&config, stop.clone())?;
            println!("Watching MPD for library changes (ctrl-c to stop)...");

            kindred::sync::watch(&db, &analyzer, &mut catalog, &music_root, &stop)
                .context("Watch loop failed")?;
            println!("Stopped.");
        }

        Commands::RetryErrors => {
            let music_root = require_music_root(&cli, &config)?;
            let analyzer = build_analyzer(&config)?;

            let report = kindred::retry::retry_all(&db, &analyzer, &music_root)
                .context("Retry failed")?;
            println!(
                "Retry complete: {} attempted, {} recovered, {} still failing",
                report.attempted,
                report.recovered,
                report.still_failing()
            );
        }

        Commands::Purge => {
            db.purge().context("Purge failed")?;
            println!("Index purged; watermark reset to epoch.");
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Index Statistics");
            println!("================");
            println!("Songs:       {}", stats.songs);
            println!("Edges:       {}", stats.edges);
            println!("Quarantined: {}", stats.quarantined);
            println!("Watermark:   {}", stats.watermark);
        }
    }

    Ok(())
}

/// Resolve the music root: CLI > config. Required for any ingesting command.
fn require_music_root(cli: &Cli, config: &AppConfig) -> Result<PathBuf> {
    cli.music_root
        .clone()
        .or(config.music_root.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No music root configured. Pass --music-root or set music_root in config."
            )
        })
}

/// Build the external analyzer from config.
fn build_analyzer(config: &AppConfig) -> Result<CommandAnalyzer> {
    let command = config.analyzer_command.clone().ok_or_else(|| {
        anyhow::anyhow!("No analyzer configured. Set analyzer_command in config.")
    })?;
    Ok(CommandAnalyzer::new(command))
}

/// Connect to MPD with settings resolved from config then environment.
fn connect(config: &AppConfig, stop: Arc<AtomicBool>) -> Result<MpdCatalog> {
    let settings = MpdSettings::resolve(
        config.mpd.host.clone(),
        config.mpd.port,
        config.mpd.password.clone(),
    );
    log::info!("MPD: {}:{}", settings.host, settings.port);
    MpdCatalog::connect(&settings, stop).context("Failed to connect to MPD")
}

fn print_report(label: &str, report: &SyncReport) {
    println!(
        "{} complete: {} attempted, {} ingested, {} duplicate, {} failed (watermark {})",
        label, report.attempted, report.ingested, report.duplicates, report.failed, report.watermark
    );
}
