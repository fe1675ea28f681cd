//! cifonauta - Catalog maintenance tool
//!
//! Opens the catalog database under the resolved root folder and runs one
//! maintenance command: counter recounts, tour position renumbering,
//! taxon closure and orphan reports, and WoRMS lookups and imports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cifonauta_common::config::{RootFolderResolver, TomlConfig};
use cifonauta_common::db::init::{init_database, schema_version};
use cifonauta_common::db::models::CountedKind;
use cifonauta_common::events::EventBus;
use cifonauta_common::Catalog;
use cifonauta_worms::AphiaClient;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Command-line arguments for cifonauta
#[derive(Parser, Debug)]
#[command(name = "cifonauta")]
#[command(about = "Cifonauta catalog maintenance")]
#[command(version)]
struct Args {
    /// Root folder holding the catalog database
    #[arg(short, long, env = "CIFONAUTA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database if needed and report its schema version
    Init,
    /// Recompute cached image and video counters
    Recount {
        /// Only this kind (author, source, tag, size, sublocation, city,
        /// state, country, reference, tour)
        #[arg(short, long)]
        kind: Option<CountedKind>,
    },
    /// Renumber tour positions from 0
    Positions {
        /// Only this tour
        #[arg(short, long)]
        tour: Option<i64>,
    },
    /// Print taxa with all their ancestors
    Closure {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List taxa without parent or rank
    Orphans,
    /// World Register of Marine Species
    #[command(subcommand)]
    Worms(WormsCommand),
}

#[derive(Subcommand, Debug)]
enum WormsCommand {
    /// Find the accepted record for a name
    Match { name: String },
    /// Import the classification of an AphiaID
    Import { aphia_id: i64 },
    /// Look up every orphan taxon and import its classification
    FixOrphans,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::load_or_default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting cifonauta v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(args.root_folder.as_deref(), &config).resolve();
    let db_path = config.database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let catalog = Catalog::new(pool, EventBus::new(config.event_bus_capacity));

    let lines = match args.command {
        Command::Init => {
            let version = schema_version(catalog.pool()).await?;
            vec![format!("{} (schema version {})", db_path.display(), version)]
        }
        Command::Recount { kind } => commands::recount(catalog.pool(), kind).await?,
        Command::Positions { tour } => commands::positions(catalog.pool(), tour).await?,
        Command::Closure { names } => commands::closure(catalog.pool(), &names).await?,
        Command::Orphans => commands::orphans(catalog.pool()).await?,
        Command::Worms(worms) => {
            let client = AphiaClient::new(&config.worms).context("Failed to create WoRMS client")?;
            match worms {
                WormsCommand::Match { name } => commands::worms_match(&client, &name).await?,
                WormsCommand::Import { aphia_id } => {
                    commands::worms_import(&client, &catalog, aphia_id).await?
                }
                WormsCommand::FixOrphans => commands::worms_fix_orphans(&client, &catalog).await?,
            }
        }
    };

    for line in lines {
        println!("{}", line);
    }

    catalog.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recount_kind() {
        let args = Args::try_parse_from(["cifonauta", "recount", "--kind", "city"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Recount {
                kind: Some(CountedKind::City)
            }
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Args::try_parse_from(["cifonauta", "recount", "--kind", "planet"]).is_err());
    }

    #[test]
    fn test_closure_requires_names() {
        assert!(Args::try_parse_from(["cifonauta", "closure"]).is_err());
        let args = Args::try_parse_from(["cifonauta", "closure", "Aurelia aurita", "Homo sapiens"]).unwrap();
        match args.command {
            Command::Closure { names } => assert_eq!(names.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_worms_subcommands() {
        let args = Args::try_parse_from(["cifonauta", "worms", "import", "135306"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Worms(WormsCommand::Import { aphia_id: 135306 })
        ));

        let args = Args::try_parse_from(["cifonauta", "worms", "fix-orphans"]).unwrap();
        assert!(matches!(args.command, Command::Worms(WormsCommand::FixOrphans)));
    }

    #[test]
    fn test_root_folder_flag() {
        let args = Args::try_parse_from(["cifonauta", "-r", "/tmp/catalog", "orphans"]).unwrap();
        assert_eq!(args.root_folder, Some(PathBuf::from("/tmp/catalog")));
    }
}
