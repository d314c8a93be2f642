//! # Catalog Search CLI (`catsearch`)
//!
//! The `catsearch` binary is the primary interface for Catalog Search. It
//! provides commands for database initialization, workbook imports, catalog
//! search, statistics, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! catsearch --config ./config/catsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catsearch init` | Create the SQLite database and run schema migrations |
//! | `catsearch import <catalog> <file>` | Import a CATMAT or CATSER workbook (.xlsx) |
//! | `catsearch search <catalog> [query]` | Search a catalog with optional filters |
//! | `catsearch stats` | Print row counts and per-group/per-status breakdowns |
//! | `catsearch serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! catsearch init --config ./config/catsearch.toml
//!
//! # Import the published CATMAT sheet
//! catsearch import catmat ./downloads/catmat.xlsx
//!
//! # Ranked full-text search with a filter
//! catsearch search catmat "caneta esferográfica" --group-code 75 --limit 20
//!
//! # Services currently active
//! catsearch search catser limpeza --status ATIVO
//!
//! # Start the HTTP API
//! catsearch serve --config ./config/catsearch.toml
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use catsearch::models::{CatalogKind, CatmatSearchParams, CatserSearchParams};
use catsearch::{config, db, ingest, migrate, search, server, stats};

/// Catalog Search CLI — ingestion and full-text search for the CATMAT and
/// CATSER procurement catalogs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/catsearch.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "catsearch",
    about = "Ingestion and full-text search for the CATMAT/CATSER procurement catalogs",
    version,
    long_about = "Catalog Search ingests the CATMAT (materials) and CATSER (services) spreadsheets \
    published on the Brazilian federal procurement portal, stores them in SQLite, and serves \
    ranked diacritic-insensitive full-text search with typed filters via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/catsearch.toml`. Database, server, and cache
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/catsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Catalog selector shared by `import` and `search`.
#[derive(Clone, Copy, ValueEnum)]
enum CatalogArg {
    /// Materials catalog (CATMAT).
    Catmat,
    /// Services catalog (CATSER).
    Catser,
}

impl From<CatalogArg> for CatalogKind {
    fn from(arg: CatalogArg) -> Self {
        match arg {
            CatalogArg::Catmat => CatalogKind::Catmat,
            CatalogArg::Catser => CatalogKind::Catser,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the catalog tables, their FTS5
    /// shadow tables, and all indexes. This command is idempotent — running
    /// it multiple times is safe.
    Init,

    /// Import a catalog workbook (.xlsx).
    ///
    /// Walks the first sheet of the workbook, locates the catalog's header
    /// row, and upserts every valid data row. Rows that cannot be mapped are
    /// skipped and reported individually; they never abort the import.
    Import {
        /// Which catalog the workbook belongs to.
        #[arg(value_enum)]
        catalog: CatalogArg,

        /// Path to the workbook file.
        file: PathBuf,
    },

    /// Search a catalog.
    ///
    /// Runs a ranked full-text query (diacritic-insensitive, terms AND-ed)
    /// plus any code filters, and prints the matching items with their
    /// relevance. Without a query, items are listed in insertion order.
    Search {
        /// Which catalog to search.
        #[arg(value_enum)]
        catalog: CatalogArg,

        /// Free-text query. FTS5 operators in it are neutralized.
        query: Option<String>,

        /// Filter by group code.
        #[arg(long)]
        group_code: Option<i16>,

        /// Filter by class code.
        #[arg(long)]
        class_code: Option<i32>,

        /// Filter by PDM code (CATMAT only).
        #[arg(long)]
        pdm_code: Option<i32>,

        /// Filter by NCM code (CATMAT only).
        #[arg(long)]
        ncm_code: Option<String>,

        /// Filter by service code (CATSER only).
        #[arg(long)]
        service_code: Option<i32>,

        /// Filter by status (CATSER only), e.g. `ATIVO`.
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of results per page (capped at 100).
        #[arg(long, default_value_t = 50)]
        limit: i32,

        /// Number of results to skip.
        #[arg(long, default_value_t = 0)]
        offset: i32,
    },

    /// Print catalog statistics.
    ///
    /// Shows total row counts per catalog, the largest groups, and the
    /// CATSER status breakdown.
    Stats,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// import, search, and stats endpoints until interrupted.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Import { catalog, file } => {
            ingest::run_import(&cfg, catalog.into(), &file).await?;
        }
        Commands::Search {
            catalog,
            query,
            group_code,
            class_code,
            pdm_code,
            ncm_code,
            service_code,
            status,
            limit,
            offset,
        } => match catalog {
            CatalogArg::Catmat => {
                let params = CatmatSearchParams {
                    query,
                    group_code,
                    class_code,
                    pdm_code,
                    ncm_code,
                    limit,
                    offset,
                };
                search::run_search_catmat(&cfg, params).await?;
            }
            CatalogArg::Catser => {
                let params = CatserSearchParams {
                    query,
                    group_code,
                    class_code,
                    service_code,
                    status,
                    limit,
                    offset,
                };
                search::run_search_catser(&cfg, params).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
