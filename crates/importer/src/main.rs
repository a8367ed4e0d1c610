//! Foodgram Fixture Importer
//!
//! Loads ingredient and tag fixtures into the database. Entries that
//! already exist are skipped, so the importer can be rerun safely.

mod fixtures;

use anyhow::Context;
use clap::{Parser, Subcommand};
use foodgram_common::{
    config::AppConfig,
    db::{create_schema, DbPool, Repository},
    VERSION,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Foodgram fixture importer
#[derive(Parser)]
#[command(name = "foodgram-import")]
#[command(about = "Load ingredient and tag fixtures into the Foodgram database")]
#[command(version)]
struct Cli {
    /// Create missing tables before importing
    #[arg(long)]
    create_schema: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import `[{"name", "measurement_unit"}]`
    Ingredients {
        #[arg(default_value = "data/ingredients.json")]
        path: PathBuf,
    },
    /// Import `[{"name", "slug"}]`
    Tags {
        #[arg(default_value = "data/tags.json")]
        path: PathBuf,
    },
    /// Import both default fixtures
    All {
        #[arg(long, default_value = "data")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level)),
        )
        .with_target(false)
        .init();

    info!("Foodgram importer v{}", VERSION);

    let db = DbPool::new(&config.database).await?;
    if cli.create_schema || config.database.auto_create_schema {
        create_schema(db.write()).await?;
    }
    let repo = Repository::new(db);

    match cli.command {
        Commands::Ingredients { path } => import_ingredients(&repo, path).await?,
        Commands::Tags { path } => import_tags(&repo, path).await?,
        Commands::All { dir } => {
            import_ingredients(&repo, dir.join("ingredients.json")).await?;
            import_tags(&repo, dir.join("tags.json")).await?;
        }
    }

    Ok(())
}

async fn import_ingredients(repo: &Repository, path: PathBuf) -> anyhow::Result<()> {
    let items = fixtures::parse_ingredients(&fixtures::read(&path)?)?;
    let total = items.len();
    let created = repo.import_ingredients(items).await?;

    info!(
        path = %path.display(),
        total,
        created,
        "Loaded {} ingredients",
        created
    );
    Ok(())
}

async fn import_tags(repo: &Repository, path: PathBuf) -> anyhow::Result<()> {
    let items = fixtures::parse_tags(&fixtures::read(&path)?)?;
    let total = items.len();
    let created = repo.import_tags(items).await?;

    info!(
        path = %path.display(),
        total,
        created,
        "Loaded {} tags",
        created
    );
    Ok(())
}
