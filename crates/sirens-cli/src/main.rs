use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sirens_client::{ReqwestFetcher, RobotsTxtPolicy};
use sirens_core::traits::{Fetcher, RobotsPolicy};
use sirens_core::{
    Application, CrawlConfig, DispatchOutcome, FunctionRegistry, ProcessorRegistry, Request,
};

#[derive(Parser)]
#[command(name = "sirens", version, about = "Configuration-driven web crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every pattern of a crawl config and list the pipelines
    Check {
        /// Path to the YAML crawl config
        #[arg(short, long, env = "SIRENS_CONFIG")]
        config: PathBuf,
    },

    /// Crawl from a seed URL until the queue is empty
    Crawl {
        /// Path to the YAML crawl config
        #[arg(short, long, env = "SIRENS_CONFIG")]
        config: PathBuf,

        /// Seed URL
        #[arg(short, long)]
        url: String,

        /// Pattern (or `module:name` reference) handling the seed
        #[arg(short, long)]
        pattern: String,

        /// Stop after dispatching this many requests
        #[arg(short = 'n', long, default_value_t = 1000)]
        max_requests: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Results go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sirens=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let app = build_app(load_config(&config)?)?;
            cmd_check(&app);
        }
        Commands::Crawl {
            config,
            url,
            pattern,
            max_requests,
        } => {
            let app = build_app(load_config(&config)?)?;
            if !pattern.contains(':') && app.pipeline(&pattern).is_none() {
                bail!(
                    "Unknown pattern '{pattern}' (known: {})",
                    app.pipeline_names().collect::<Vec<_>>().join(", ")
                );
            }
            let stats = crawl(&app, Request::new(url, pattern), max_requests).await;
            if stats.failed > 0 {
                tracing::warn!(failed = stats.failed, "Some requests failed");
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<CrawlConfig> {
    CrawlConfig::from_path(path)
        .with_context(|| format!("Failed to load crawl config: {}", path.display()))
}

type CliApp = Application<ReqwestFetcher, RobotsTxtPolicy<ReqwestFetcher>>;

fn build_app(config: CrawlConfig) -> Result<CliApp> {
    let fetcher = ReqwestFetcher::from_config(&config).context("Failed to create HTTP client")?;
    let robots = RobotsTxtPolicy::new(fetcher.clone(), fetcher.user_agent());
    Application::new(
        config,
        ProcessorRegistry::with_builtins(),
        FunctionRegistry::new(),
        fetcher,
        robots,
    )
    .context("Failed to compile crawl config")
}

fn cmd_check<F: Fetcher, R: RobotsPolicy>(app: &Application<F, R>) {
    let mut count = 0;
    for name in app.pipeline_names() {
        if let Some(pipeline) = app.pipeline(name) {
            println!("  {name:<24} {:<9} {} handler(s)", pipeline.kind(), pipeline.len());
            count += 1;
        }
    }
    println!("\n{count} pattern(s) compiled");
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CrawlStats {
    dispatched: usize,
    processed: usize,
    disallowed: usize,
    failed: usize,
}

/// Breadth-first crawl over an in-memory queue.
///
/// A `(url, processor)` pair is dispatched at most once. Request failures
/// are logged and skipped.
async fn crawl<F: Fetcher, R: RobotsPolicy>(
    app: &Application<F, R>,
    seed: Request,
    max_requests: usize,
) -> CrawlStats {
    let mut queue = VecDeque::from([seed]);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut stats = CrawlStats::default();

    while let Some(request) = queue.pop_front() {
        if !seen.insert((request.url.clone(), request.processor.clone())) {
            continue;
        }
        if stats.dispatched >= max_requests {
            tracing::info!(limit = max_requests, "Request limit reached");
            queue.push_front(request);
            break;
        }
        stats.dispatched += 1;

        match app.dispatch(&mut queue, &request).await {
            Ok(DispatchOutcome::Processed) => stats.processed += 1,
            Ok(DispatchOutcome::Disallowed) => stats.disallowed += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(
                    url = %request.url,
                    processor = %request.processor,
                    error = %e,
                    "Request failed"
                );
            }
        }
    }

    tracing::info!(
        dispatched = stats.dispatched,
        processed = stats.processed,
        disallowed = stats.disallowed,
        failed = stats.failed,
        pending = queue.len(),
        "Crawl finished"
    );
    stats
}
