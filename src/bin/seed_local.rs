use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use restodir::backend::sqlite::NewRestaurant;
use restodir::backend::SqliteBackend;
use restodir::config::{self, BackendKind};
use restodir::model::Profile;

#[derive(Debug, Parser)]
#[command(author, version, about = "Seed the local SQLite backend from a YAML file")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// YAML file with `profiles` and `restaurants` lists
    seed: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Seed {
    #[serde(default)]
    profiles: Vec<Profile>,
    #[serde(default)]
    restaurants: Vec<NewRestaurant>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    if cfg.backend.kind != BackendKind::Sqlite {
        bail!("seeding only works against the sqlite backend");
    }

    let raw = fs::read_to_string(&args.seed)
        .with_context(|| format!("failed to read {}", args.seed.display()))?;
    let seed: Seed = serde_yaml::from_str(&raw).context("invalid seed file")?;

    let database_url = cfg.backend.resolved_database_url();
    let backend = SqliteBackend::connect(&database_url).await?;

    for profile in &seed.profiles {
        backend.insert_profile(profile).await?;
    }
    for restaurant in &seed.restaurants {
        backend.insert_restaurant(restaurant).await?;
    }
    info!(
        database_url = %database_url,
        profiles = seed.profiles.len(),
        restaurants = seed.restaurants.len(),
        "seeded local backend"
    );
    Ok(())
}
