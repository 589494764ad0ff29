use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "perflens")]
#[command(version, about = "Multi-stage React performance review for GitHub pull requests")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a pull request and post a review
    Review {
        /// PR number or full GitHub PR URL
        pr: String,

        /// Minimum severity that becomes an inline comment: low, medium, high, critical
        #[arg(long)]
        severity: Option<String>,

        /// Approve when no critical or high issues are found
        #[arg(long)]
        auto_approve: bool,

        /// Analyze without posting a review
        #[arg(long)]
        analyze_only: bool,
    },
    /// Analyze local files and print one report per file
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format: markdown, json, github
        #[arg(long, default_value = "markdown")]
        format: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Review {
            pr,
            severity,
            auto_approve,
            analyze_only,
        } => {
            cmd::cmd_review(
                &project_dir,
                pr,
                severity.as_deref(),
                *auto_approve,
                *analyze_only,
            )
            .await?;
        }
        Commands::Analyze { files, format } => {
            cmd::cmd_analyze(&project_dir, files, format).await?;
        }
    }

    Ok(())
}
