//! witr - why is this running?
//!
//! Explains where a process came from: its parent chain, owner, working
//! directory, repository, container, supervising service and listening ports.

mod output;
mod pool;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use output::{BatchRow, Report};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use witr_classify::TaskClassifier;
use witr_core::{ConfigLoader, Process, WitrConfig};
use witr_proc::{ancestry, Discovery, EnrichOptions, Enricher, SocketTable};

#[derive(Parser)]
#[command(name = "witr")]
#[command(version)]
#[command(about = "Explain why a process is running", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: Format,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "WITR_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the systemd unit lookup
    #[arg(long, global = true)]
    no_service: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Short,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain one or more processes by PID
    Pid {
        #[arg(required = true)]
        pids: Vec<u32>,
    },

    /// Explain every process whose command or arguments contain PATTERN
    Name { pattern: String },

    /// One-line summary with task label for every match of PATTERN
    Batch { pattern: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone());

    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.witr.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut enrich_settings = config.enrich.clone();
    if cli.no_service {
        enrich_settings.service_lookup = false;
    }
    let enricher = Enricher::from_settings(&enrich_settings);
    let workers = enrich_settings.workers;

    match cli.command {
        Commands::Pid { pids } => explain(enricher, pids, workers, cli.format).await,
        Commands::Name { pattern } => {
            let pids = find(&config, &pattern)?;
            explain(enricher, pids, workers, cli.format).await
        }
        Commands::Batch { pattern } => {
            let pids = find(&config, &pattern)?;
            batch(&config, enricher, pids, workers, cli.format).await
        }
    }
}

/// Load configuration file, falling back to defaults
fn load_config(cli_path: Option<PathBuf>) -> WitrConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            debug!("Configuration loaded");
            config
        }
        Err(e) => {
            // Logging is not set up yet
            eprintln!("witr: failed to load configuration: {e}, using defaults");
            WitrConfig::default()
        }
    }
}

fn find(config: &WitrConfig, pattern: &str) -> anyhow::Result<Vec<u32>> {
    let pids = Discovery::from_settings(&config.discover).discover(pattern)?;
    if pids.is_empty() {
        bail!("no matching process for {pattern:?}");
    }
    info!(pattern, matches = pids.len(), "discovered processes");
    Ok(pids)
}

async fn explain(
    enricher: Enricher,
    pids: Vec<u32>,
    workers: usize,
    format: Format,
) -> anyhow::Result<()> {
    let sockets = Arc::new(enricher.socket_table());
    debug!(sockets = sockets.len(), "read listening socket table");

    let parents = enricher.with_options(EnrichOptions {
        service_lookup: false,
        git_lookup: false,
    });

    let results = pool::resolve_all(pids, workers, move |pid| {
        let target = enricher.enrich(pid, &sockets)?;
        Ok(ancestry(&parents, &sockets, target))
    })
    .await?;

    let reports: Vec<Report> = collect_ok(results)?
        .into_iter()
        .filter_map(Report::from_ancestry)
        .collect();

    match format {
        Format::Json => {
            let json = match reports.as_slice() {
                [single] => serde_json::to_string_pretty(single)?,
                many => serde_json::to_string_pretty(many)?,
            };
            println!("{json}");
        }
        Format::Short => {
            for report in &reports {
                println!("{}", output::render_short(report));
            }
        }
        Format::Text => {
            let now = chrono::Utc::now();
            let rendered: Vec<String> = reports
                .iter()
                .map(|r| output::render_full(r, now))
                .collect();
            print!("{}", rendered.join("\n"));
        }
    }
    Ok(())
}

async fn batch(
    config: &WitrConfig,
    enricher: Enricher,
    pids: Vec<u32>,
    workers: usize,
    format: Format,
) -> anyhow::Result<()> {
    let sockets: Arc<SocketTable> = Arc::new(enricher.socket_table());
    let results =
        pool::resolve_all(pids, workers, move |pid| enricher.enrich(pid, &sockets)).await?;

    let classifier = TaskClassifier::from_settings(&config.classify);
    let rows: Vec<BatchRow> = collect_ok(results)?
        .into_iter()
        .map(|process| BatchRow {
            task: task_label(&classifier, &process),
            process,
        })
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        Format::Text | Format::Short => print!("{}", output::render_batch(&rows)),
    }
    Ok(())
}

fn task_label(classifier: &TaskClassifier, process: &Process) -> String {
    let dir = process
        .has_working_dir()
        .then(|| Path::new(&process.working_dir));
    classifier.classify(&process.cmdline, dir)
}

/// Keep successful resolutions, reporting the rest.
///
/// Fails only when nothing could be resolved at all, with the last error seen.
fn collect_ok<T>(results: Vec<(u32, witr_core::Result<T>)>) -> anyhow::Result<Vec<T>> {
    let mut resolved = Vec::with_capacity(results.len());
    let mut last_error = None;

    for (pid, result) in results {
        match result {
            Ok(value) => resolved.push(value),
            Err(e) => {
                let message = if e.is_no_such_process() {
                    format!("no such process: {pid}")
                } else {
                    format!("pid {pid}: {e}")
                };
                warn!("{message}");
                last_error = Some(message);
            }
        }
    }

    match last_error {
        Some(message) if resolved.is_empty() => bail!(message),
        _ => Ok(resolved),
    }
}
