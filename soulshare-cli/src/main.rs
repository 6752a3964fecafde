//! Demo binary wiring [`soulshare_core::ShareService`] to a TOML-backed
//! [`OptionsSource`](soulshare_contracts::options::OptionsSource).

mod options_source;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use soulshare_contracts::options::StorageMode;
use soulshare_core::factory::{NullAttributeReader, SoulseekFileFactory};
use soulshare_core::repository::SqliteShareRepository;
use soulshare_core::service::ShareService;
use soulshare_model::SearchQuery;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use crate::options_source::TomlOptionsSource;

#[derive(Debug, Parser)]
#[command(name = "soulshare", about = "Shared-file index demo peer")]
struct Cli {
    /// Path to a TOML config file (see `soulshare-cli/soulshare.example.toml`).
    #[arg(long, default_value = "soulshare.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize the repository (creating it if missing) without scanning.
    Init,
    /// Initialize, then run a scan.
    Scan {
        /// Force a rescan even if the existing index looks valid.
        #[arg(long)]
        force: bool,
    },
    /// List directories (and their immediate files) under a share.
    Browse {
        /// Masked share alias to restrict to; omit to browse every share.
        #[arg(long)]
        share: Option<String>,
    },
    /// Run a full-text search over indexed filenames.
    Search {
        #[arg(long, value_delimiter = ',')]
        terms: Vec<String>,
        #[arg(long, value_delimiter = ',', default_value = "")]
        exclusions: Vec<String>,
    },
    /// Resolve a masked filename to its local path and size.
    Resolve {
        #[arg(long)]
        masked: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let options_source = Arc::new(
        TomlOptionsSource::load(&cli.config)
            .await
            .with_context(|| format!("loading {}", cli.config.display()))?,
    );
    let options = options_source.current();

    let primary: Arc<dyn soulshare_contracts::repository::ShareRepository> = match options
        .storage_mode
    {
        StorageMode::Disk => Arc::new(
            SqliteShareRepository::open_disk(&PathBuf::from(format!(
                "{}.db",
                options.instance_name
            )))
            .await
            .context("opening primary disk repository")?,
        ),
        StorageMode::Memory => Arc::new(
            SqliteShareRepository::open_memory(&options.instance_name)
                .await
                .context("opening primary memory repository")?,
        ),
    };
    let backup_path = PathBuf::from(format!("{}.backup.db", options.instance_name));
    let backup: Arc<dyn soulshare_contracts::repository::ShareRepository> = Arc::new(
        SqliteShareRepository::open_disk(&backup_path)
            .await
            .context("opening backup repository")?,
    );
    let factory = Arc::new(SoulseekFileFactory::new(Box::new(NullAttributeReader)));
    let shutdown = CancellationToken::new();

    let service = ShareService::new(
        primary,
        backup,
        backup_path,
        factory,
        options_source,
        shutdown,
    );

    match cli.command {
        Command::Init => {
            service.initialize(false).await?;
            println!("initialized: {:?}", service.state().current_value());
        }
        Command::Scan { force } => {
            service.initialize(force).await?;
            let outcome = service.scan().await?;
            println!("scan finished: {outcome:?}");
            println!("state: {:?}", service.state().current_value());
        }
        Command::Browse { share } => {
            service.initialize(false).await?;
            let entries = service.browse(share.as_deref()).await;
            for entry in entries {
                println!("{}", entry.directory.masked_name);
                for file in entry.files {
                    println!("  {} ({} bytes)", file.masked_filename, file.size);
                }
            }
        }
        Command::Search { terms, exclusions } => {
            service.initialize(false).await?;
            let exclusions: Vec<String> = exclusions.into_iter().filter(|e| !e.is_empty()).collect();
            let query = SearchQuery::new(terms, exclusions);
            for file in service.search(&query).await {
                println!("{} ({} bytes)", file.masked_filename, file.size);
            }
        }
        Command::Resolve { masked } => {
            service.initialize(false).await?;
            let (local_path, size) = service.resolve_file(&masked).await?;
            println!("{local_path} ({size} bytes)");
        }
    }

    Ok(())
}
