use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use cpe_import::{CpeImporter, ImportConfig};
use cpe_store::{Db, ImportLog, ImportStatus};
use nvd_client::{ClientConfig, NvdClient, ANONYMOUS_RATE_LIMIT};
use std::path::PathBuf;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Parser)]
#[command(name = "cpe-ingest", about = "Import the NVD CPE dictionary into a local SQLite store")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./cpe-ingest.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// NVD API key for higher rate limits
    #[arg(long, global = true, env = "NVD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Debug logging and a detailed summary
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Import CPE data (full import or incremental update)
    #[command(group(ArgGroup::new("mode").required(true).args(["full", "incremental"])))]
    Import {
        /// Import every CPE entry; existing rows are left untouched
        #[arg(long)]
        full: bool,
        /// Refresh existing rows from the head of the listing
        #[arg(long)]
        incremental: bool,
        /// Days to look back for incremental updates
        #[arg(long, default_value_t = 7)]
        days_back: u32,
    },
    /// Incremental update of stored CPE data
    Update {
        #[arg(long, default_value_t = 7)]
        days_back: u32,
        /// Show what would be updated without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// List recent import attempts
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Full,
    Incremental { days_back: u32 },
}

fn main() -> Result<()> {
    let Cli { config: config_path, db, api_key, verbose, command } = Cli::parse();
    init_tracing(verbose);
    let cfg = config::load_config(config_path.as_deref())?.unwrap_or_default();
    let db_path = cfg.db_path(db.as_deref());
    debug!(db = %db_path.display(), "configuration loaded");

    match command {
        Commands::Version => {
            println!("cpe-ingest {} (core {})", env!("CARGO_PKG_VERSION"), ingest_core::version());
        }
        Commands::Import { full, days_back, .. } => {
            let mode = if full { Mode::Full } else { Mode::Incremental { days_back } };
            run_import(cfg.client_config(api_key), cfg.import_config(), db_path, mode, verbose)?;
        }
        Commands::Update { days_back, dry_run } => {
            let client_cfg = cfg.client_config(api_key);
            if dry_run {
                println!("DRY RUN: Would update CPE data for the last {days_back} days");
                if has_key(&client_cfg) {
                    println!("Would use provided NVD API key for higher rate limits");
                } else {
                    println!("Would use default rate limits (no API key)");
                }
                println!("Would write to {}", db_path.display());
                return Ok(());
            }
            run_import(client_cfg, cfg.import_config(), db_path, Mode::Incremental { days_back }, verbose)?;
        }
        Commands::Logs { limit, format } => {
            let db = Db::open_or_create(&db_path)?;
            let logs = db.import_logs(limit)?;
            match format {
                OutputFormat::Text => {
                    for l in &logs {
                        println!(
                            "{}\t{}\t{}\t{}\t{}\t{}",
                            l.log_id, fmt_ms(l.created_at), l.source, l.operation, l.status, l.records_processed
                        );
                        if !l.error_message.is_empty() {
                            println!("\terror: {}", l.error_message);
                        }
                    }
                }
                OutputFormat::Json => {
                    let rows: Vec<serde_json::Value> = logs.iter().map(log_json).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn has_key(c: &ClientConfig) -> bool {
    c.api_key.as_deref().is_some_and(|k| !k.is_empty())
}

fn run_import(client_cfg: ClientConfig, import_cfg: ImportConfig, db_path: PathBuf, mode: Mode, verbose: bool) -> Result<()> {
    if has_key(&client_cfg) {
        eprintln!(
            "Using NVD API key. Higher rate limits available ({} requests per {} seconds).",
            client_cfg.rate_limit_requests,
            client_cfg.rate_limit_window.as_secs()
        );
    } else {
        eprintln!(
            "No NVD API key provided. Using default rate limits ({} requests per {} seconds).",
            ANONYMOUS_RATE_LIMIT,
            client_cfg.rate_limit_window.as_secs()
        );
    }

    let client = NvdClient::new(client_cfg)?;
    let db = Db::open_or_create(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    let mut importer = CpeImporter::new(client, db, import_cfg);
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let started = Instant::now();
    let log = rt
        .block_on(async {
            match mode {
                Mode::Full => {
                    eprintln!("Starting full CPE import...");
                    importer.full_import().await
                }
                Mode::Incremental { days_back } => {
                    eprintln!("Starting incremental CPE update (last {days_back} days)...");
                    importer.incremental_update(days_back).await
                }
            }
        })
        .context("CPE import failed")?;

    report(&log)?;
    if verbose {
        println!();
        println!("Import details:");
        println!("  Operation: {}", log.operation);
        println!("  Status: {}", log.status);
        println!("  Records processed: {}", log.records_processed);
        println!("  Started: {}", fmt_ms(log.created_at));
        println!("  Completed: {}", fmt_ms(log.updated_at));
        println!("  Wall time: {:.1}s", started.elapsed().as_secs_f64());
        if let Ok(n) = importer.db().record_count() {
            println!("  Records stored: {n}");
        }
    }
    Ok(())
}

fn report(log: &ImportLog) -> Result<()> {
    match log.status {
        ImportStatus::Success => {
            println!("CPE import completed successfully! Processed {} records.", log.records_processed);
        }
        ImportStatus::Partial => {
            println!(
                "CPE import completed with warnings. Processed {} records. Error: {}",
                log.records_processed, log.error_message
            );
        }
        ImportStatus::Failed | ImportStatus::Started => {
            bail!(
                "CPE import failed! Processed {} records. Error: {}",
                log.records_processed,
                log.error_message
            );
        }
    }
    Ok(())
}

fn fmt_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

fn log_json(l: &ImportLog) -> serde_json::Value {
    serde_json::json!({
        "id": l.log_id,
        "source": l.source.as_str(),
        "operation": l.operation.as_str(),
        "status": l.status.as_str(),
        "records_processed": l.records_processed,
        "error_message": l.error_message,
        "created_at": fmt_ms(l.created_at),
        "updated_at": fmt_ms(l.updated_at),
    })
}
