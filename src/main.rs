//! `catalog-server`: runs the directory API, bootstraps the schema or loads
//! demo data.

use anyhow::{anyhow, Context};
use catalog::service::seed;
use catalog::{AnyStore, CatalogConfig, MemoryStore, PgStore, StoreBackend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "catalog-server")]
#[command(about = "Company, building and category directory API")]
#[command(version)]
struct Cli {
    /// Configuration file (environment variables still override it)
    #[arg(long, global = true, default_value = catalog::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Use the volatile in-memory store instead of Postgres
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and start the HTTP server (default)
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },

    /// Create missing tables and indexes, then exit
    InitSchema,

    /// Replace all data with the demo data set, then exit
    Seed,
}

fn open_store(cfg: &CatalogConfig, memory: bool) -> anyhow::Result<AnyStore> {
    if memory || cfg.store.backend == StoreBackend::Memory {
        log::warn!("using in-memory store, data is lost on exit");
        return Ok(MemoryStore::new().into());
    }
    let store = PgStore::connect(&cfg.database).context("failed to connect to Postgres")?;
    store
        .initialize_schema()
        .context("failed to initialize schema")?;
    Ok(store.into())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = CatalogConfig::load(&cli.config)
        .with_context(|| format!("invalid configuration ({})", cli.config.display()))?;

    may::config().set_workers(cfg.server.workers);

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            let store = Arc::new(open_store(&cfg, cli.memory)?);
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let server = catalog::http::serve(store, bind.as_str())
                .with_context(|| format!("failed to bind {bind}"))?;
            log::info!(
                "catalog-server {} on http://{bind} with {} workers",
                env!("CARGO_PKG_VERSION"),
                cfg.server.workers
            );
            server
                .join()
                .map_err(|e| anyhow!("server terminated: {e:?}"))?;
        }
        Commands::InitSchema => {
            if cli.memory {
                return Err(anyhow!("init-schema needs a Postgres store"));
            }
            open_store(&cfg, false)?;
            log::info!("schema is up to date");
        }
        Commands::Seed => {
            let store = open_store(&cfg, cli.memory)?;
            let counts = seed::generate(&store)?;
            println!(
                "created {} buildings, {} categories, {} companies",
                counts.buildings, counts.categories, counts.companies
            );
        }
    }
    Ok(())
}
