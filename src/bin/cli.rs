//! Harvester CLI
//!
//! Local execution entry point.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use harvester::{
    error::Result,
    models::Config,
    pipeline::{Dataset, HarvestSummary, Jobs},
    services::ApiClient,
    storage::LocalStorage,
    utils::{
        Selection, http, parse_month_range,
        progress::{NoProgress, Progress},
    },
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Harvester - incremental catalog and collection harvester
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Incrementally harvest catalog entries and account collections into a local corpus"
)]
struct Cli {
    /// Directory holding corpora, remap tables and logs
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config file (default: {data_dir}/harvest.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bearer token (default: the variable named by api.token_env)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest catalog entries by id ("1,2,5-9") or re-harvest "all"
    Subjects { ids: Selection },

    /// Harvest catalog entries that aired between two months (YYYY-MM)
    Months { from: String, to: String },

    /// Harvest staff lists by subject id, or "all" catalog entries
    Persons { ids: Selection },

    /// Harvest related subjects by subject id, or "all" catalog entries
    Relations { ids: Selection },

    /// Harvest account collections by id, "all" stored or "empty" stored
    Users {
        ids: Selection,

        /// Only update accounts already in the corpus
        #[arg(long)]
        existing_only: bool,
    },

    /// Rewrite a dataset's remap table from its corpus
    Remap {
        /// anime, persons, relations or users
        #[arg(default_value = "anime")]
        dataset: Dataset,
    },

    /// Renumber the catalog by id and relink every dependent dataset
    Renumber,

    /// Relink accounts, drop empty ones and renumber
    Maintain,

    /// Validate configuration
    Validate,

    /// Show corpus sizes
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Terminal progress bar.
struct BarProgress(ProgressBar);

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} ({eta})")
        {
            bar.set_style(style);
        }
        Self(bar)
    }
}

impl Progress for BarProgress {
    fn start(&self, total: u64) {
        self.0.set_length(total);
        self.0.set_position(0);
    }

    fn advance(&self) {
        self.0.inc(1);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

fn report(summary: &HarvestSummary) {
    if summary.failed() > 0 {
        log::warn!(
            "{} unit(s) failed; see logs/skipped_{}.csv",
            summary.failed(),
            summary.dataset
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    log::info!("Harvester starting...");

    // Load configuration
    let data_dir = cli.data_dir.clone();
    let config_path = cli.config.clone().unwrap_or_else(|| {
        data_dir
            .clone()
            .unwrap_or_else(|| Config::default().paths.data_dir)
            .join("harvest.toml")
    });
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(dir) = data_dir {
        config.paths.data_dir = dir;
    }

    log::info!("Data directory: {}", config.paths.data_dir.display());

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    let token = http::resolve_token(cli.token.clone(), &config.api);
    if token.is_none() {
        log::warn!(
            "No API token (set --token or {}); requests are anonymous",
            config.api.token_env
        );
    }

    let api = Arc::new(ApiClient::from_config(&config, token)?);
    let storage = LocalStorage::new(&config.paths.data_dir);
    let progress: Arc<dyn Progress> = if cli.no_progress {
        Arc::new(NoProgress)
    } else {
        Arc::new(BarProgress::new())
    };
    let jobs = Jobs::new(Arc::new(config), api, storage).with_progress(progress);

    match cli.command {
        Command::Subjects { ids } => report(&jobs.harvest_subjects(&ids).await?),

        Command::Months { from, to } => {
            let months = parse_month_range(&from, &to)?;
            log::info!("Harvesting {} month(s) from {} to {}", months.len(), from, to);
            report(&jobs.harvest_months(months).await?);
        }

        Command::Persons { ids } => report(&jobs.harvest_staff(&ids).await?),

        Command::Relations { ids } => report(&jobs.harvest_relations(&ids).await?),

        Command::Users { ids, existing_only } => {
            report(&jobs.harvest_accounts(&ids, existing_only).await?)
        }

        Command::Remap { dataset } => {
            let rows = jobs.remap(dataset).await?;
            log::info!("{}: remap table rewritten with {} rows", dataset, rows);
        }

        Command::Renumber => {
            let changed = jobs.renumber().await?;
            log::info!("Renumber complete, {} catalog ids changed", changed);
        }

        Command::Maintain => {
            let report = jobs.maintain_accounts().await?;
            log::info!(
                "Maintenance complete: {} accounts kept, {} removed, {} renumbered",
                report.accounts,
                report.pruned.len(),
                report.renumbered
            );
        }

        Command::Validate => {
            log::info!("✓ Config OK ({})", config_path.display());
        }

        Command::Info => {
            log::info!("Storage directory: {}", jobs.storage().root_dir().display());
            for info in jobs.info().await? {
                if info.path.exists() && !info.dense {
                    log::warn!(
                        "{}: {} entries, ids are not 1..=N; run `renumber`",
                        info.dataset,
                        info.entries
                    );
                } else if info.path.exists() {
                    log::info!(
                        "{}: {} entries ({})",
                        info.dataset,
                        info.entries,
                        info.path.display()
                    );
                } else {
                    log::info!("{}: not harvested yet", info.dataset);
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selections_and_globals() {
        let cli = Cli::try_parse_from([
            "harvester",
            "users",
            "1-3,7",
            "--existing-only",
            "--data-dir",
            "/tmp/h",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/h")));
        match cli.command {
            Command::Users { ids, existing_only } => {
                assert_eq!(ids, Selection::Ids(vec![1, 2, 3, 7]));
                assert!(existing_only);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_id_list() {
        assert!(Cli::try_parse_from(["harvester", "subjects", "5-"]).is_err());
    }

    #[test]
    fn remap_defaults_to_catalog() {
        let cli = Cli::try_parse_from(["harvester", "remap"]).unwrap();
        assert!(matches!(cli.command, Command::Remap { dataset: Dataset::Anime }));
    }

    #[test]
    fn unknown_dataset_is_an_error() {
        let err = Cli::try_parse_from(["harvester", "remap", "books"]).unwrap_err();
        assert!(err.to_string().contains("unknown dataset"));
    }
}
