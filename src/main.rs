//! Sitescribe main entry point
//!
//! This is the command-line interface for the Sitescribe crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sitescribe::config::{compute_config_hash, load_config_with_hash, validate, Config};
use sitescribe::crawler::{HttpFetcher, LoggingHooks, Orchestrator};
use sitescribe::output::print_statistics;
use sitescribe::CrawlPhase;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Sitescribe: a polite site-to-markdown crawler
///
/// Sitescribe crawls a website breadth-first from a seed URL, converts every
/// page to markdown and mirrors the site's URL hierarchy on disk.
#[derive(Parser, Debug)]
#[command(name = "sitescribe")]
#[command(version)]
#[command(about = "A polite site-to-markdown crawler", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a site starting from a seed URL
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// URL to start from
    #[arg(value_name = "SEED_URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum link depth from the seed
    #[arg(short, long)]
    depth: Option<u32>,

    /// Maximum number of pages to save
    #[arg(short = 'm', long)]
    max_pages: Option<usize>,

    /// Seconds between requests to the same host
    #[arg(long)]
    delay: Option<f64>,

    /// Root directory for crawled sites
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// User-Agent header to send
    #[arg(long)]
    user_agent: Option<String>,

    /// Also crawl pages on other sites
    #[arg(long)]
    follow_external: bool,

    /// Record image, script and stylesheet references
    #[arg(long)]
    include_assets: bool,

    /// Number of concurrent workers
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Attempts per page for server errors, network errors and timeouts
    #[arg(long)]
    max_retries: Option<u32>,

    /// Validate the configuration and show what would be crawled, then exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Crawl(args) => handle_crawl(args, cli.quiet).await,
    };

    match result {
        Ok(phase) if phase.is_success() => ExitCode::SUCCESS,
        Ok(phase) => {
            tracing::error!("Crawl ended {}", phase);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitescribe=info,warn"),
            1 => EnvFilter::new("sitescribe=debug,info"),
            2 => EnvFilter::new("sitescribe=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the effective configuration: file (if any), then flags
fn build_config(args: &CrawlArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::debug!("Configuration file loaded (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    config.seed_url = Some(args.url.clone());
    if let Some(depth) = args.depth {
        config.crawler.max_depth = depth;
    }
    if let Some(max_pages) = args.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(delay) = args.delay {
        config.politeness.delay = delay;
    }
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = dir.clone();
    }
    if let Some(agent) = &args.user_agent {
        config.crawler.user_agent = agent.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(retries) = args.max_retries {
        config.crawler.max_retries = retries;
    }
    if args.follow_external {
        config.crawler.follow_external = true;
    }
    if args.include_assets {
        config.crawler.include_assets = true;
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config, hash: &str) {
    println!("=== Sitescribe Dry Run ===\n");

    println!("Seed: {}", config.seed_url.as_deref().unwrap_or_default());

    println!("\nCrawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Follow external: {}", config.crawler.follow_external);
    println!("  Include assets: {}", config.crawler.include_assets);
    println!("  Query policy: {}", config.crawler.query_policy.as_str());
    println!("  User agent: {}", config.crawler.user_agent);

    println!("\nPoliteness:");
    println!("  Delay: {}s", config.politeness.delay);
    for (host, delay) in &config.politeness.per_host {
        println!("  - {}: {}s", host, delay);
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output.output_dir.display());

    println!("\n✓ Configuration is valid (hash: {})", hash);
}

/// Handles the main crawl operation
async fn handle_crawl(args: CrawlArgs, quiet: bool) -> anyhow::Result<CrawlPhase> {
    let config = build_config(&args)?;
    let hash = compute_config_hash(&config);
    tracing::info!("Configuration ready (hash: {})", hash);

    if args.dry_run {
        handle_dry_run(&config, &hash);
        return Ok(CrawlPhase::Completed);
    }

    let fetcher = Arc::new(HttpFetcher::new().context("Failed to build HTTP client")?);
    let orchestrator = Orchestrator::new(config, fetcher).with_hooks(LoggingHooks);

    let handle = orchestrator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            handle.cancel();
        }
    });

    let report = orchestrator.run().await.context("Crawl failed")?;
    if !quiet {
        print_statistics(&report);
    }
    Ok(report.phase)
}
