mod commands;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pubflow-cli")]
#[command(about = "Pubflow pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enqueue collect tasks for the configured (or given) subreddits.
    Trigger {
        /// Subreddits to collect; defaults to the configured set.
        #[arg(long = "subreddit")]
        subreddits: Vec<String>,
    },
    /// File a takedown request for a published item.
    Takedown {
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Show queue depths and today's budget spend, or one item's progress.
    Status {
        /// Inspect a single item instead of the global view.
        #[arg(long)]
        source_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = pubflow_core::load_app_config()?;
    let pool_config = pubflow_db::PoolConfig::from_app_config(&config);
    let pool = pubflow_db::connect_pool(&config.database_url, pool_config).await?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Trigger { subreddits } => {
            commands::run_trigger(&pool, &config, subreddits).await?;
        }
        Commands::Takedown { source_id, reason } => {
            commands::run_takedown(&pool, &config, &source_id, &reason).await?;
        }
        Commands::Status { source_id } => {
            commands::run_status(&pool, &config, source_id.as_deref()).await?;
        }
    }

    Ok(())
}
