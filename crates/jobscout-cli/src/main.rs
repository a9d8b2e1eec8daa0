mod sink;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use jobscout_client::HttpBrowser;
use jobscout_core::classifier::UrlClassifier;
use jobscout_core::listing::ListingExtractor;
use jobscout_core::throttle::RateLimitedBrowser;
use jobscout_core::traits::{Browser, JobSink};
use jobscout_core::validator::JobValidator;
use jobscout_core::{BatchProcessor, Cache, DiscoveryConfig, OperationMonitor};

use crate::sink::{CsvSink, JsonLinesSink};

#[derive(Parser)]
#[command(name = "jobscout", version, about = "Find live job postings behind a list of URLs")]
struct Cli {
    /// Render pages with headless Chromium (requires the `browser` feature)
    #[arg(long, global = true, default_value_t = false)]
    browser: bool,

    /// Allow URLs that resolve to private/loopback addresses
    #[arg(long, global = true, default_value_t = false)]
    allow_private: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a URL as direct job, listing, careers page or not relevant
    Classify {
        /// URL to classify
        url: String,
    },

    /// Extract job candidates from a listing page
    Extract {
        /// Listing URL
        url: String,

        /// Maximum number of candidates to return
        #[arg(long, default_value_t = 30)]
        max_jobs: usize,

        /// Maximum number of result pages to visit
        #[arg(long, default_value_t = 2)]
        max_pages: usize,
    },

    /// Check whether a job posting is live and complete
    Validate {
        /// Posting URL
        url: String,
    },

    /// Run the full pipeline over many URLs
    Batch {
        /// URL to process (repeatable)
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// File with one URL per line (`#` starts a comment)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Candidate cap per listing
        #[arg(long, env = "JOBSCOUT_MAX_JOBS_PER_LISTING")]
        max_jobs_per_listing: Option<usize>,

        /// Concurrent URLs
        #[arg(short, long, env = "JOBSCOUT_MAX_WORKERS")]
        workers: Option<usize>,

        /// Result pages per listing
        #[arg(long, env = "JOBSCOUT_MAX_PAGES")]
        max_pages: Option<usize>,

        /// Keep extracted candidates without opening each posting
        #[arg(long, default_value_t = false)]
        no_validate: bool,

        /// Output format for the discovered jobs
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write the full batch result (counters and per-URL outcomes) as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Log per-operation timing statistics when done
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON object per line
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobscout=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DiscoveryConfig::from_env().context("Invalid JOBSCOUT_* configuration")?;

    if cli.browser {
        #[cfg(feature = "browser")]
        {
            let mut browser = jobscout_client::ChromiumBrowser::launch()
                .await
                .context("Failed to launch headless Chromium")?;
            if cli.allow_private {
                browser = browser.allow_private_urls();
            }
            return run(browser, cli.command, &config).await;
        }
        #[cfg(not(feature = "browser"))]
        tracing::warn!("Built without the `browser` feature; falling back to static HTTP");
    }

    let mut browser = HttpBrowser::new().context("Failed to create HTTP client")?;
    if cli.allow_private {
        browser = browser.allow_private_urls();
    }
    run(browser, cli.command, &config).await
}

async fn run<B: Browser>(browser: B, command: Commands, config: &DiscoveryConfig) -> Result<()> {
    let browser = RateLimitedBrowser::new(browser, config.rate_limiter());
    let cache = Arc::new(Cache::new());
    let monitor = Arc::new(OperationMonitor::new());

    match command {
        Commands::Classify { url } => {
            let analysis = UrlClassifier::new(browser, cache, monitor)
                .classify(&url)
                .await;
            print_json(&analysis)?;
        }
        Commands::Extract {
            url,
            max_jobs,
            max_pages,
        } => {
            let candidates = ListingExtractor::new(browser, monitor)
                .extract(&url, max_jobs, max_pages)
                .await;
            tracing::info!(%url, found = candidates.len(), "Extraction finished");
            print_json(&candidates)?;
        }
        Commands::Validate { url } => {
            let validation = JobValidator::new(browser, monitor).validate(&url).await;
            print_json(&validation)?;
        }
        Commands::Batch {
            urls,
            file,
            max_jobs_per_listing,
            workers,
            max_pages,
            no_validate,
            format,
            report,
            stats,
        } => {
            let mut urls = urls;
            if let Some(path) = file {
                urls.extend(read_url_file(&path)?);
            }
            if urls.is_empty() {
                anyhow::bail!("No URLs given. Use --url or --file.");
            }

            let mut options = config.batch_options();
            options.validate_jobs = !no_validate;
            if let Some(n) = max_jobs_per_listing {
                options.max_jobs_per_listing = n;
            }
            if let Some(n) = workers {
                anyhow::ensure!(n > 0, "--workers must be at least 1");
                options.max_workers = n;
            }
            if let Some(n) = max_pages {
                options.max_pages = n;
            }

            let processor = BatchProcessor::new(browser, cache, monitor);
            let result = processor.process(&urls, &options).await;

            let jobs = &result.unique_jobs;
            let written = match format {
                OutputFormat::Json => JsonLinesSink::new(std::io::stdout()).store(jobs),
                OutputFormat::Csv => CsvSink::new(std::io::stdout()).store(jobs),
            }
            .context("Failed to write jobs")?;

            tracing::info!(
                batch_id = %result.batch_id,
                urls = result.total_urls_processed,
                jobs = written,
                before_dedup = result.total_jobs_before_dedup,
                errors = result.errors,
                elapsed_secs = result.processing_time.as_secs_f64(),
                "Batch finished"
            );

            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report: {}", path.display()))?;
                tracing::info!(path = %path.display(), "Report written");
            }

            if stats {
                processor.monitor().log_summary();
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read URLs from a file, one per line, skipping blanks and `#` comments.
fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open URL file: {}", path.display()))?;

    let mut urls = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        urls.push(line.to_string());
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn url_file_skips_blanks_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# seeds from search").unwrap();
        writeln!(file, "https://boards.greenhouse.io/acme/jobs/123").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   https://jobs.lever.co/acme   ").unwrap();

        let urls = read_url_file(file.path()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://boards.greenhouse.io/acme/jobs/123",
                "https://jobs.lever.co/acme",
            ]
        );
    }

    #[test]
    fn missing_url_file_names_the_path() {
        let err = read_url_file(Path::new("/nonexistent/urls.txt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/urls.txt"));
    }

    #[test]
    fn batch_flags_parse() {
        let cli = Cli::try_parse_from([
            "jobscout",
            "batch",
            "--url",
            "https://a.example/jobs",
            "--url",
            "https://b.example/careers",
            "--no-validate",
            "--format",
            "csv",
        ])
        .unwrap();

        match cli.command {
            Commands::Batch {
                urls,
                no_validate,
                format,
                ..
            } => {
                assert_eq!(urls.len(), 2);
                assert!(no_validate);
                assert_eq!(format, OutputFormat::Csv);
            }
            _ => panic!("expected batch"),
        }
    }
}
