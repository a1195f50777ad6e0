//! nrd-blocklists command-line entry point

use clap::{Args, Parser, Subcommand};
use nrd_blocklists::config::default_feeds_from_env;
use nrd_blocklists::{Classify, Config, FeedPipeline, RunSummary, Scheduler, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Build blocklists from newly-registered-domain feeds
///
/// Feed URLs come from the configuration file or from NORDOMAIN_30DAY_URL,
/// NORDOMAIN_14DAY_URL, PHISHING_30DAY_URL and PHISHING_14DAY_URL.
#[derive(Parser, Debug)]
#[command(name = "nrd-blocklists")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "NRD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the output directory
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Override the number of feeds processed at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Reprocess feeds even when their fingerprint is unchanged
    #[arg(long, global = true)]
    force: bool,

    /// Increase verbosity (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every feed once and print the generated files
    Run,

    /// Process feeds periodically until SIGTERM/SIGINT
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Seconds between runs
    #[arg(short, long, default_value_t = 6 * 60 * 60)]
    interval: u64,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> nrd_blocklists::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if config.feeds.is_empty() {
        config.feeds = default_feeds_from_env();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrent_feeds = concurrency;
    }
    Ok(config)
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        if let Some(error) = &report.error {
            eprintln!("{}: {} ({})", report.feed, report.state, error);
        } else {
            eprintln!("{}: {} ({} domains)", report.feed, report.state, report.entries);
        }
    }
    println!("Generated files:");
    for file in summary.files() {
        println!("  {}", file.display());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let pipeline = match load_config(&cli).and_then(FeedPipeline::new) {
        Ok(pipeline) => pipeline.with_force(cli.force),
        Err(e) => {
            error!(code = e.error_code(), error = %e, "cannot start");
            return ExitCode::from(2);
        }
    };
    if pipeline.config().feeds.is_empty() {
        error!("no feeds configured; set a config file or the feed URL environment variables");
        return ExitCode::from(2);
    }

    match cli.command {
        Command::Run => match pipeline.run().await {
            Ok(summary) => {
                print_summary(&summary);
                if summary.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(1)
                }
            }
            Err(e) => {
                error!(code = e.error_code(), error = %e, "run failed");
                ExitCode::from(2)
            }
        },
        Command::Watch(args) => {
            let runs =
                run_with_shutdown(Scheduler::new(pipeline, Duration::from_secs(args.interval)))
                    .await;
            info!(runs, "shut down");
            ExitCode::SUCCESS
        }
    }
}
