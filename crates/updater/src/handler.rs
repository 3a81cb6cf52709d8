//! Parliament handlers and the registry that selects them by code.
//!
//! Each parliament has its own source format, so fetching its data is
//! parliament-specific while writing and checking it is not. A
//! [`ParliamentHandler`] only has to produce a [`Dataset`]; the default
//! `update` and `check` implementations do the rest.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::check::{CheckReport, check_stores};
use crate::dataset::{Dataset, UpdateSummary};
use crate::error::{UpdaterError, UpdaterResult};
use crate::tables::Stores;

/// The operations the updater runs for one parliament.
#[async_trait]
pub trait ParliamentHandler: Send + Sync + Debug {
    /// Parliament code, e.g. `cz-psp`.
    fn code(&self) -> &str;

    /// Fetches the current data from the source.
    async fn scrape(&self) -> UpdaterResult<Dataset>;

    /// Fetches the current data and writes it to `stores`.
    async fn update(&self, stores: &Stores) -> UpdaterResult<UpdateSummary> {
        let dataset = self.scrape().await?;
        dataset.apply(stores).await
    }

    /// Checks the stored data of this parliament.
    async fn check(&self, stores: &Stores) -> UpdaterResult<CheckReport> {
        check_stores(self.code(), stores).await
    }
}

/// Reads a prepared dataset from `<data_dir>/<code>.json`.
#[derive(Debug, Clone)]
pub struct JsonDatasetHandler {
    code: String,
    path: PathBuf,
}

impl JsonDatasetHandler {
    /// Creates a handler reading `<data_dir>/<code>.json`.
    pub fn new(code: impl Into<String>, data_dir: &Path) -> Self {
        let code = code.into();
        let path = data_dir.join(format!("{}.json", code));
        Self { code, path }
    }

    /// The dataset file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ParliamentHandler for JsonDatasetHandler {
    fn code(&self) -> &str {
        &self.code
    }

    async fn scrape(&self) -> UpdaterResult<Dataset> {
        debug!(path = %self.path.display(), "Reading dataset");
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| UpdaterError::Io {
                path: self.path.clone(),
                source,
            })?;
        Dataset::from_json_str(&text).map_err(|source| UpdaterError::Dataset {
            path: self.path.clone(),
            source,
        })
    }
}

/// Map from parliament code to handler, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ParliamentHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a JSON dataset handler for every `*.json` file in
    /// `data_dir`. A missing directory yields an empty registry.
    pub fn from_data_dir(data_dir: &Path) -> UpdaterResult<Self> {
        let mut registry = Self::new();
        if !data_dir.is_dir() {
            warn!(path = %data_dir.display(), "Data directory not found");
            return Ok(registry);
        }

        let io_error = |source| UpdaterError::Io {
            path: data_dir.to_path_buf(),
            source,
        };
        for entry in std::fs::read_dir(data_dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(code) = path.file_stem().and_then(|s| s.to_str()) {
                registry.register(Arc::new(JsonDatasetHandler::new(code, data_dir)))?;
            }
        }
        info!(parliaments = registry.len(), "Handlers registered");
        Ok(registry)
    }

    /// Adds a handler; a second handler for the same code is rejected.
    pub fn register(&mut self, handler: Arc<dyn ParliamentHandler>) -> UpdaterResult<()> {
        let code = handler.code().to_string();
        if self.handlers.contains_key(&code) {
            return Err(UpdaterError::DuplicateParliament(code));
        }
        self.handlers.insert(code, handler);
        Ok(())
    }

    /// Looks a handler up by parliament code.
    pub fn get(&self, code: &str) -> UpdaterResult<Arc<dyn ParliamentHandler>> {
        self.handlers
            .get(code)
            .cloned()
            .ok_or_else(|| UpdaterError::UnknownParliament(code.to_string()))
    }

    /// Registered codes, sorted.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
