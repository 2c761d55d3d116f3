use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bidmon")]
#[command(about = "Public procurement bid monitor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled source once and write exports under reports/.
    Sync,
    /// Serve the JSON API with the background scheduler.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let (summary, run_dir) = bidmon_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} sources={} failed={} unique={} duplicates_removed={} reports={}",
                summary.run_id,
                summary.sources_attempted,
                summary.sources_failed.len(),
                summary.unique,
                summary.duplicates_removed,
                run_dir.display()
            );
        }
        Commands::Serve => {
            bidmon_web::serve_from_env().await?;
        }
    }

    Ok(())
}
