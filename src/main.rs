use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "reckon")]
#[command(version, about = "Confidence-gated diagnostic report generation pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the SQLite database (overrides RECKON_DB).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a report from a submission JSON file
    Generate {
        /// Path to the submission JSON
        #[arg(long)]
        submission: PathBuf,
    },
    /// Re-run generation for an existing token, keeping the token
    Regenerate {
        #[arg(long)]
        token: String,
        #[arg(long)]
        submission: PathBuf,
    },
    /// Show the status of a reckoning by token
    Status {
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "reckon=debug"
    } else {
        "reckon=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate { submission } => {
            cmd::generate(submission, cli.db, cli.verbose).await
        }
        Commands::Regenerate { token, submission } => {
            cmd::regenerate(token, submission, cli.db, cli.verbose).await
        }
        Commands::Status { token } => cmd::status(token, cli.db).await,
    }
}
