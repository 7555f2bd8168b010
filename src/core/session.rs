use crate::config::cli::LocalStorage;
use crate::core::catalog::Catalog;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, WranglerError};

pub const CATALOG_FILE: &str = "catalog.json";

/// A unit of work against the catalog. Jobs mutate `catalog` and call
/// `commit` at the points where progress should survive a crash.
pub struct Session<S: Storage = LocalStorage> {
    storage: S,
    pub catalog: Catalog,
    commits: usize,
}

impl<S: Storage> Session<S> {
    /// Load the catalog from storage. A missing catalog file is an empty
    /// catalog.
    pub async fn open(storage: S) -> Result<Self> {
        let catalog = match storage.read_file(CATALOG_FILE).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(WranglerError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "📂 No catalog at {}, starting empty",
                    storage.location(CATALOG_FILE)
                );
                Catalog::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            storage,
            catalog,
            commits: 0,
        })
    }

    pub fn in_memory(storage: S, catalog: Catalog) -> Self {
        Self {
            storage,
            catalog,
            commits: 0,
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.catalog)?;
        self.storage.write_file(CATALOG_FILE, &bytes).await?;
        self.commits += 1;
        tracing::debug!("💾 Catalog committed ({} commits this run)", self.commits);
        Ok(())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}
