// src/main.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gapdays_core::loader::read_csv;
use gapdays_core::pipeline;
use gapdays_core::{Category, JsonArtifactRenderer, PipelineConfig};

#[derive(Parser)]
#[command(name = "gapdays")]
#[command(about = "Gap days / missing productivity reports from daily attendance hours")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Source {
    /// Daily hours CSV export
    #[arg(short, long)]
    input: PathBuf,

    /// Output root holding reports/, csv_datasets/ and the run manifest
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Classify, render pending reports and export the labelled dataset
    Run {
        #[command(flatten)]
        source: Source,

        /// Last day of the analysis window (YYYY-MM-DD); whole input when omitted
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// Render at most N reports per category this run
        #[arg(long)]
        limit: Option<usize>,

        /// Abort on the first rendering failure
        #[arg(long)]
        fail_fast: bool,
    },
    /// Print the pending sets without rendering anything
    Pending {
        #[command(flatten)]
        source: Source,

        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Export normalized records for a date range
    Export {
        #[command(flatten)]
        source: Source,

        #[arg(long)]
        start_date: NaiveDate,

        #[arg(long)]
        end_date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run {
            source,
            end_date,
            limit,
            fail_fast,
        } => {
            if limit.is_some() {
                config.report_limit = limit;
            }
            if fail_fast {
                config.isolate_failures = false;
            }
            let table = read_csv(&source.input)
                .with_context(|| format!("Failed to load {:?}", source.input))?;
            let summary = pipeline::run(
                table,
                &source.output,
                end_date,
                &config,
                Arc::new(JsonArtifactRenderer),
            )
            .await
            .context("Report run failed")?;

            print!("{}", summary);
            if summary.failed() > 0 {
                warn!(
                    "{} reports failed; they stay pending for the next run",
                    summary.failed()
                );
            }
        }
        Command::Pending { source, end_date } => {
            let table = read_csv(&source.input)
                .with_context(|| format!("Failed to load {:?}", source.input))?;
            let summary = pipeline::dry_run(table, &source.output, end_date, &config)
                .context("Pending computation failed")?;

            print!("{}", summary);
            for category in Category::REPORTED {
                if let Some(ids) = summary.pending(category) {
                    println!("{} pending ids: {}", category, ids.join(", "));
                }
            }
        }
        Command::Export {
            source,
            start_date,
            end_date,
        } => {
            let table = read_csv(&source.input)
                .with_context(|| format!("Failed to load {:?}", source.input))?;
            let path =
                pipeline::export_range(table, start_date, end_date, &source.output, &config)
                    .context("Export failed")?;
            info!("Data successfully exported");
            println!("{}", path.display());
        }
    }

    Ok(())
}
