//! # parldata-updater
//!
//! Orchestration shell over `parldata-persistence`: opens the parliament
//! stores, selects a [`ParliamentHandler`] by parliament code and runs its
//! `scrape`, `update` or `check` operation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use parldata_persistence::backends::sqlite::SqliteBackend;
//! use parldata_updater::{HandlerRegistry, Stores};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let stores = Stores::open(SqliteBackend::open("parldata.db")?).await?;
//! let registry = HandlerRegistry::from_data_dir(Path::new("data"))?;
//! let summary = registry.get("cz-psp")?.update(&stores).await?;
//! println!("{} rows created", summary.created);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod dataset;
pub mod error;
pub mod handler;
pub mod tables;

pub use check::{AttributeOverlap, CheckReport, check_stores};
pub use config::{Command, UpdaterConfig};
pub use dataset::{AreaEntry, AttributeEntry, Dataset, EntityRows, UpdateSummary};
pub use error::{UpdaterError, UpdaterResult};
pub use handler::{HandlerRegistry, JsonDatasetHandler, ParliamentHandler};
pub use tables::Stores;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise both crates log at `level`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parldata_updater={},parldata_persistence={}",
            level, level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
