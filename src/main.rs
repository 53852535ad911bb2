//! Sumi-Sweep main entry point
//!
//! This is the command-line interface for the Sumi-Sweep site crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_sweep::config::{load_config_with_hash, Config, TraversalStrategy};
use sumi_sweep::output::write_markdown_summary;
use sumi_sweep::{Coordinator, CrawlResult, CrawlSummary};
use tracing_subscriber::EnvFilter;

/// Sumi-Sweep: A polite, resumable site crawler
///
/// Sumi-Sweep walks a site breadth- or depth-first while respecting
/// robots.txt, crawl-delay and per-domain rate limits. Progress is
/// checkpointed so an interrupted crawl can pick up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "sumi-sweep")]
#[command(version)]
#[command(about = "A polite, resumable site crawler", long_about = None)]
struct Cli {
    /// URL to start crawling from (optional when resuming)
    #[arg(value_name = "START_URL")]
    start_url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Resume from the latest checkpoint (fails if there is none)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring any checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Traversal strategy: bfs, dfs or dfs-preorder
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<TraversalStrategy>,

    /// Maximum link depth (-1 for unlimited)
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    max_depth: Option<i64>,

    /// Maximum number of URLs to admit (-1 for unlimited)
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    max_urls: Option<i64>,

    /// Write a markdown report to this path
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        print_dry_run(&config, cli.start_url.as_deref());
        return Ok(());
    }

    let mut builder = Coordinator::builder(config);
    if let Some(hash) = config_hash {
        builder = builder.config_hash(hash);
    }
    let coordinator = builder.build().context("failed to set up crawler")?;

    let shutdown = coordinator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping crawl");
            shutdown.abort();
        }
    });

    let result = run(&coordinator, &cli).await?;

    if !cli.quiet {
        println!("{}", CrawlSummary::from_result(&result));
    }
    if let Some(path) = &cli.summary {
        write_summary(&result, path)?;
    }

    Ok(())
}

/// Resumes or starts a crawl depending on flags and the checkpoint store
async fn run(coordinator: &Coordinator, cli: &Cli) -> anyhow::Result<CrawlResult> {
    let checkpoint = if cli.fresh {
        None
    } else {
        coordinator
            .load_checkpoint()
            .context("failed to load checkpoint")?
    };

    match (checkpoint, cli.start_url.as_deref()) {
        (Some(checkpoint), start) if start.map_or(true, |s| same_start(s, &checkpoint.start_url)) => {
            Ok(coordinator.resume(checkpoint).await?)
        }
        (Some(checkpoint), Some(start)) if cli.resume => bail!(
            "checkpoint is for {}, not {} (use --fresh to start over)",
            checkpoint.start_url,
            start
        ),
        (_, Some(start)) if !cli.resume => Ok(coordinator.crawl(start).await?),
        (None, _) if cli.resume => bail!("no checkpoint to resume from"),
        _ => bail!("a START_URL is required when there is no checkpoint to resume"),
    }
}

fn same_start(requested: &str, checkpointed: &str) -> bool {
    match sumi_sweep::normalize_url(requested) {
        Ok(url) => url.as_str() == checkpointed,
        Err(_) => false,
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(strategy) = cli.strategy {
        config.crawler.strategy = strategy;
    }
    if let Some(max_depth) = cli.max_depth {
        config.crawler.max_depth = max_depth;
    }
    if let Some(max_urls) = cli.max_urls {
        config.crawler.max_urls = max_urls;
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sweep=info,warn"),
            1 => EnvFilter::new("sumi_sweep=debug,info"),
            2 => EnvFilter::new("sumi_sweep=trace,debug"),
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

/// Handles --dry-run: shows the effective configuration
fn print_dry_run(config: &Config, start_url: Option<&str>) {
    println!("=== Sumi-Sweep Dry Run ===\n");

    match start_url {
        Some(url) => match sumi_sweep::normalize_url(url) {
            Ok(normalized) => println!("Start URL: {}", normalized),
            Err(e) => println!("Start URL: {} (invalid: {})", url, e),
        },
        None => println!("Start URL: (resume from checkpoint)"),
    }

    let crawler = &config.crawler;
    println!("\nCrawler:");
    println!("  Strategy: {}", crawler.strategy);
    println!("  Max depth: {}", limit(crawler.max_depth));
    println!("  Max URLs: {}", limit(crawler.max_urls));
    println!("  Workers: {}", crawler.workers);
    println!("  Use sitemap: {}", crawler.use_sitemap);
    if crawler.allowed_domains.is_empty() {
        println!("  Allowed domains: start URL host only");
    } else {
        println!("  Allowed domains: {}", crawler.allowed_domains.join(", "));
    }

    let politeness = &config.politeness;
    println!("\nPoliteness:");
    println!("  Rate limit: {}s", politeness.rate_limit);
    println!("  Respect robots.txt: {}", politeness.respect_robots);
    println!("  Max per domain: {}", politeness.max_per_domain);

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!("  Timeout: {}s", config.retry.timeout);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    let checkpoint = &config.checkpoint;
    if checkpoint.enabled {
        println!(
            "\nCheckpoints: {:?} at {} every {}s",
            checkpoint.backend,
            checkpoint.path.display(),
            checkpoint.interval
        );
    } else {
        println!("\nCheckpoints: disabled");
    }
}

fn limit(value: i64) -> String {
    if value < 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

fn write_summary(result: &CrawlResult, path: &Path) -> anyhow::Result<()> {
    write_markdown_summary(result, path)
        .with_context(|| format!("failed to write summary to {}", path.display()))?;
    tracing::info!("Summary written to {}", path.display());
    Ok(())
}
