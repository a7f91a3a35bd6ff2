//! Study Vault - bulk export, preview, restore and reset of a study planner's
//! document dataset.
//!
//! Archives are single JSON files holding every collection of one account.
//! Restores are written in size-aware batches and can be re-run safely.
//!
//! QUICK START:
//!   study-vault init --owner <id>       # Write ~/.study-vault/config.toml
//!   study-vault export                  # Dated archive under exports/
//!   study-vault analyze backup.json     # Preview counts and warnings
//!   study-vault import backup.json      # Restore (asks for confirmation)
//!   study-vault reset --yes             # Delete everything

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::io::{self, Write};
use std::path::Path;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    analyze, counts_table, format_analysis, format_import_summary, format_log_line,
    format_reset_summary, read_archive_file, write_archive, ConsoleProgress, ExportService,
    OutputFormat, ResetService, RestoreService,
};
use cli::{Cli, Commands};
use domain::{AppConfig, AppError, Archive};
use infrastructure::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
    LocalCache, SqliteDocumentStore,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    if let Commands::Init { owner } = &cli.command {
        return cmd_init(cli.config.as_deref(), owner.as_deref());
    }

    let config = match &cli.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Export { output } => {
            let dir = output.unwrap_or_else(|| config.exports_dir());
            cmd_export(&config, &dir).await?;
        }
        Commands::Analyze { file, format } => {
            cmd_analyze(&file, format)?;
        }
        Commands::Import { file, yes } => {
            cmd_import(&config, &file, yes).await?;
        }
        Commands::Reset { yes } => {
            cmd_reset(&config, yes).await?;
        }
        Commands::Stats => {
            cmd_stats(&config).await?;
        }
    }

    Ok(())
}

/// Write a default config, optionally with an owner id.
fn cmd_init(path: Option<&Path>, owner: Option<&str>) -> domain::Result<()> {
    let config_path = path.map_or_else(config_file_path, Path::to_path_buf);

    match owner {
        Some(owner) => {
            let mut config = AppConfig::default();
            config.account.owner_id = owner.to_string();
            save_config(&config, &config_path)?;
            println!(
                "{} Wrote {} for account {}",
                "✓".green().bold(),
                config_path.display(),
                owner.cyan()
            );
        }
        None => {
            if ensure_config_exists(&config_path)? {
                println!("{} Wrote {}", "✓".green().bold(), config_path.display());
            } else {
                println!("Config already exists at {}", config_path.display());
            }
        }
    }

    Ok(())
}

/// Export the dataset into `dir`.
async fn cmd_export(config: &AppConfig, dir: &Path) -> domain::Result<()> {
    let store = SqliteDocumentStore::open(&config.store_db_path())?;
    let progress = ConsoleProgress::new("Export");

    let archive = ExportService::new(&store, config.account.owner_id.clone())
        .export(Some(&progress))
        .await;
    let path = write_archive(&archive, dir)?;

    println!(
        "{} Exported {} documents to {}",
        "✓".green().bold(),
        archive.document_count(),
        path.display()
    );
    Ok(())
}

/// Print an archive preview.
fn cmd_analyze(file: &Path, format: OutputFormat) -> domain::Result<()> {
    let candidate = read_archive_file(file)?;
    let analysis = analyze(&candidate);
    println!(
        "{}",
        format_analysis(&analysis, format).map_err(AppError::json_parse)?
    );
    Ok(())
}

/// Preview, confirm and restore an archive.
async fn cmd_import(config: &AppConfig, file: &Path, yes: bool) -> domain::Result<()> {
    let candidate = read_archive_file(file)?;
    let analysis = analyze(&candidate);
    println!(
        "{}",
        format_analysis(&analysis, OutputFormat::Table).map_err(AppError::json_parse)?
    );

    if !analysis.valid {
        return Err(AppError::InvalidData {
            message: format!("{} is not a restorable archive", file.display()),
        });
    }
    if !yes && !confirm(&format!(
        "Restore {} items into account {}?",
        analysis.total_items, config.account.owner_id
    ))? {
        println!("Aborted.");
        return Ok(());
    }

    let archive = Archive::from_value(candidate)?;
    let store = SqliteDocumentStore::open(&config.store_db_path())?;
    let mut cache = LocalCache::open(&config.cache_db_path())?;
    let progress = ConsoleProgress::new("Restore");

    let report = RestoreService::new(&store, config.account.owner_id.clone(), config.limits)
        .import_archive(&archive, &mut cache, Some(&progress))
        .await;

    for line in &report.logs {
        println!("  {}", format_log_line(line));
    }
    println!();
    println!("{}", format_import_summary(&report));

    if report.success {
        Ok(())
    } else {
        Err(AppError::store(
            "restore stopped early; re-run the same import to finish",
        ))
    }
}

/// Delete the whole dataset.
async fn cmd_reset(config: &AppConfig, yes: bool) -> domain::Result<()> {
    if !yes {
        return Err(AppError::Config {
            message: format!(
                "reset deletes every collection of account {}; pass --yes to confirm",
                config.account.owner_id
            ),
        });
    }

    let store = SqliteDocumentStore::open(&config.store_db_path())?;
    let mut cache = LocalCache::open(&config.cache_db_path())?;

    let result = ResetService::new(&store, config.account.owner_id.clone(), config.limits)
        .reset(&mut cache)
        .await?;

    println!("{}", format_reset_summary(&result));
    Ok(())
}

/// Show document counts in the store.
async fn cmd_stats(config: &AppConfig) -> domain::Result<()> {
    let store = SqliteDocumentStore::open(&config.store_db_path())?;
    let counts = ExportService::new(&store, config.account.owner_id.clone())
        .inventory()
        .await?;

    println!(
        "{} {}",
        "📊 Account".bold(),
        config.account.owner_id.cyan()
    );
    let mut cache = LocalCache::open(&config.cache_db_path())?;

    println!("{}", counts_table(&counts));
    println!("  Total: {}", counts.values().sum::<usize>());
    println!("  Store: {}", config.store_db_path().display());
    if cache.is_empty()? {
        println!("  Cache: empty");
    } else {
        println!("  Cache entries: {}", cache.len()?);
    }
    Ok(())
}

/// Ask a yes/no question on stdin.
fn confirm(question: &str) -> domain::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout()
        .flush()
        .map_err(|e| AppError::io("Failed to flush stdout", e))?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .map_err(|e| AppError::io("Failed to read answer", e))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
