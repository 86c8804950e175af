//! BibLink CLI - Command-line interface
//!
//! Usage:
//!   biblink extract --kind isbn --source-a-query a.rq --source-b-query b.rq [--new-only]
//!   biblink normalize --kind <kind|title|year> <value>...
//!   biblink similarity <a> <b> [--measure dice] [--unit char] [--size 2]
//!   biblink download --urls urls.txt --out <dir>

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use biblink_core::{
    AppConfig, IdentifierKind, LoggingConfig, ShingleUnit, SimilarityMeasure, SimilaritySelector,
};
use biblink_normalize::Normalizer;
use biblink_pipeline::{ExtractionPipeline, ExtractionRequest};
use biblink_store::{DownloadPool, DownloadTask, HttpFetcher, SparqlHttpGateway};

#[derive(Parser)]
#[command(name = "biblink")]
#[command(about = "Link bibliographic records across repositories by shared identifiers")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match source A against source B and save the shared records
    Extract {
        /// Identifier kind to match on
        #[arg(short, long)]
        kind: IdentifierKind,
        /// File holding the source A query
        #[arg(long)]
        source_a_query: PathBuf,
        /// File holding the source B query
        #[arg(long)]
        source_b_query: PathBuf,
        /// Skip identifiers already saved for source B
        #[arg(long)]
        new_only: bool,
    },
    /// Validate and format values
    Normalize {
        /// Identifier kind, `title` or `year`
        #[arg(short, long)]
        kind: Target,
        values: Vec<String>,
    },
    /// Compare two strings by shingle similarity
    Similarity {
        a: String,
        b: String,
        #[arg(long)]
        measure: Option<SimilarityMeasure>,
        #[arg(long)]
        unit: Option<ShingleUnit>,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Download every URL listed in a file
    Download {
        /// One URL per line; blank lines and `#` comments are skipped
        #[arg(long)]
        urls: PathBuf,
        /// Directory receiving the files
        #[arg(long)]
        out: PathBuf,
        /// URLs per batch
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
}

/// What `normalize` formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Identifier(IdentifierKind),
    Title,
    Year,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "year" => Ok(Self::Year),
            other => other
                .parse()
                .map(Self::Identifier)
                .map_err(|e: biblink_core::BibLinkError| e.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Extract {
            kind,
            source_a_query,
            source_b_query,
            new_only,
        } => extract(&config, kind, &source_a_query, &source_b_query, new_only).await?,
        Commands::Normalize { kind, values } => {
            let normalizer = Normalizer::new(Some(&config.rules.source_a));
            for value in values {
                println!("{}", normalize_line(&normalizer, kind, &value));
            }
        }
        Commands::Similarity {
            a,
            b,
            measure,
            unit,
            size,
        } => {
            let selector = SimilaritySelector::new(
                measure.unwrap_or(config.similarity.measure),
                unit.unwrap_or(config.similarity.unit),
                size.unwrap_or(config.similarity.size),
            )?;
            println!("{:.6}", biblink_similarity::coefficient(&a, &b, &selector));
        }
        Commands::Download {
            urls,
            out,
            batch_size,
        } => download(&config, &urls, &out, batch_size).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn extract(
    config: &AppConfig,
    kind: IdentifierKind,
    source_a_query: &Path,
    source_b_query: &Path,
    new_only: bool,
) -> anyhow::Result<()> {
    let source_a_query = std::fs::read_to_string(source_a_query)
        .with_context(|| format!("Failed to read {}", source_a_query.display()))?;
    let source_b_query = std::fs::read_to_string(source_b_query)
        .with_context(|| format!("Failed to read {}", source_b_query.display()))?;

    let gateway = Arc::new(SparqlHttpGateway::new(config.http)?);
    let pipeline = ExtractionPipeline::connect(
        gateway,
        config.source_a.clone(),
        config.destination.clone(),
        Some(config.rules.source_a.clone()),
        config.pipeline,
    )
    .await?;

    let request = ExtractionRequest::new(
        source_a_query,
        source_b_query,
        config.source_b.clone(),
        kind,
    )
    .save_new_only(new_only)
    .with_source_b_rules(config.rules.source_b.clone());

    let result = pipeline.run(&request).await;
    pipeline.close().await?;
    let report = result?;

    println!("{} identifiers in {}", report.source_a_identifiers, config.source_a.repository_name);
    println!("{} identifiers matched", report.matched_identifiers);
    println!(
        "{}\t{} saved",
        config.source_a.repository_name,
        report.source_a_saved()
    );
    println!(
        "{}\t{} saved",
        config.source_b.repository_name,
        report.source_b_saved()
    );
    Ok(())
}

fn normalize_line(normalizer: &Normalizer, target: Target, value: &str) -> String {
    let result = match target {
        Target::Identifier(kind) => normalizer.identifier(value, kind),
        Target::Title => normalizer.title(value),
        Target::Year => normalizer.year(value),
    };

    match result.into_option() {
        Some(formatted) => format!("valid\t{formatted}"),
        None => "invalid".to_string(),
    }
}

async fn download(
    config: &AppConfig,
    urls: &Path,
    out: &Path,
    batch_size: usize,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(urls)
        .with_context(|| format!("Failed to read {}", urls.display()))?;
    let tasks = download_tasks(&content, out);
    if tasks.is_empty() {
        bail!("No URLs in {}", urls.display());
    }

    let batches: Vec<Vec<DownloadTask>> = tasks
        .chunks(batch_size.max(1))
        .map(<[DownloadTask]>::to_vec)
        .collect();

    let fetcher = Arc::new(HttpFetcher::new(&config.download)?);
    let pool = DownloadPool::new(fetcher, config.download);
    let summary = pool.run_batches(batches).await;

    println!("{} downloaded, {} failed", summary.succeeded(), summary.failed());
    if summary.halted {
        bail!("Stopped after too many consecutive download errors");
    }
    Ok(())
}

/// One task per listed URL, saved under the URL's last path segment
fn download_tasks(content: &str, out: &Path) -> Vec<DownloadTask> {
    let mut used = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(index, url)| {
            let name = url
                .split(['?', '#'])
                .next()
                .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
                .filter(|name| !name.is_empty() && !name.contains(':'))
                .map(str::to_string)
                .unwrap_or_else(|| format!("download-{}", index + 1));
            DownloadTask::new(url, out.join(unique_name(&name, &mut used)))
        })
        .collect()
}

/// `name` itself, or the first free `stem-N.ext` with N counting from 2
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let (stem, extension) = match name.find('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    };

    let mut candidate = name.to_string();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{stem}-{n}{extension}");
    }
    candidate
}
