//! reviews-crawler - Resilient review scraper for marketplace product pages
//!
//! Drives Chromium through product pages and writes one JSON result per product.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reviews_crawler::commands::{BatchCommand, ReplayCommand};
use reviews_crawler::config::{OutputFormat, ParserConfig};
use reviews_crawler::input::load_urls;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "reviews-crawler",
    version,
    about = "Resilient review scraper for marketplace product pages",
    long_about = "Drives a Chromium session through product pages, extracts reviews with \
                  ordered selector ladders and saves diagnostics when a page defeats extraction."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,

    /// Number of products processed at once
    #[arg(long, global = true, env = "REVIEWS_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Directory for per-product JSON results
    #[arg(short, long, global = true, env = "REVIEWS_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse reviews for product URLs
    #[command(alias = "r")]
    Run {
        /// Product page URLs
        urls: Vec<String>,

        /// CSV file with product URLs in the first column
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Re-run extraction against a saved HTML page
    Replay {
        /// Saved page (for example a debug dump)
        html: PathBuf,

        /// URL the page was served from
        #[arg(long)]
        url: Option<String>,
    },

    /// Print the effective selector ladders
    Selectors,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = ParserConfig::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if cli.headless {
        config.headless = true;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }

    match cli.command {
        Commands::Run { mut urls, input } => {
            if let Some(path) = input {
                urls.extend(load_urls(&path)?);
            }
            if urls.is_empty() {
                anyhow::bail!("No product URLs given: pass URLs or --input <FILE>");
            }

            config.prepare_dirs()?;
            let cmd = BatchCommand::new(config);

            let token = cmd.cancellation_token();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Interrupted, finishing current products");
                        token.cancel();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                }
            });

            let output = cmd.execute(&urls).await?;
            println!("{}", output);
        }

        Commands::Replay { html, url } => {
            config.prepare_dirs()?;
            let cmd = ReplayCommand::new(config);
            let output = cmd
                .execute(&html, url.as_deref())
                .await
                .with_context(|| format!("Replay of {} failed", html.display()))?;
            println!("{}", output);
        }

        Commands::Selectors => {
            info!("Showing effective selector ladders");
            println!("{}", config.selectors.describe());
        }
    }

    Ok(())
}
