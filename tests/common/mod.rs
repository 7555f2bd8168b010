#![allow(dead_code)]

use metadata_wrangler::config::toml_config::TomlConfig;
use metadata_wrangler::{Catalog, CliConfig, LocalStorage, Session, WranglerConfig};
use tempfile::TempDir;

/// A data directory plus a configuration pointing every integration at
/// `upstream`.
pub struct Fixture {
    pub dir: TempDir,
    pub config: WranglerConfig,
}

impl Fixture {
    pub fn new(upstream: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().to_string_lossy().replace('\\', "/");
        let toml = format!(
            r#"
[data]
directory = "{data_dir}"

[integrations.oclc_linked_data]
url = "{upstream}"

[integrations.viaf]
url = "{upstream}"

[integrations.content_server]
url = "{upstream}"

[http]
timeout_seconds = 5
retry_attempts = 0

[coverage]
batch_size = 10
"#
        );
        let file = TomlConfig::from_toml_str(&toml).unwrap();
        let config = WranglerConfig::from_parts(CliConfig::default(), file);
        Self { dir, config }
    }

    pub fn storage(&self) -> LocalStorage {
        LocalStorage::new(self.dir.path().to_string_lossy().into_owned())
    }

    pub async fn save(&self, catalog: Catalog) {
        let mut session = Session::in_memory(self.storage(), catalog);
        session.commit().await.unwrap();
    }

    pub async fn load(&self) -> Catalog {
        Session::open(self.storage()).await.unwrap().catalog
    }
}
