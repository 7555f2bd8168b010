use crate::core::session::Session;
use crate::domain::ports::{Script, ScriptReport};
use crate::utils::error::Result;
use crate::utils::validation;
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;

pub const SCRIPT_NAME: &str = "Integration Client Generator";
const SECRET_BYTES: usize = 24;

/// 48 hex characters from 24 random bytes.
pub fn generate_shared_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Registers an integration client for each url and prints its
/// credentials.
pub struct IntegrationClientGeneratorScript {
    urls: Vec<String>,
}

impl IntegrationClientGeneratorScript {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        validation::validate_non_empty_list("url", &urls)?;
        for url in &urls {
            validation::validate_url("url", url)?;
        }
        Ok(Self { urls })
    }
}

#[async_trait]
impl Script for IntegrationClientGeneratorScript {
    fn name(&self) -> &str {
        SCRIPT_NAME
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let mut report = ScriptReport::default();
        for url in &self.urls {
            let (client, is_new) =
                session
                    .catalog
                    .register_integration_client(url, generate_shared_secret, Utc::now());
            if is_new {
                tracing::info!("🔑 Registered integration client {}", client.url);
            } else {
                tracing::info!("Integration client {} already registered", client.url);
            }

            let credentials = format!(
                "url: {}\nclient id: {}\nshared secret: {}",
                url, client.url, client.shared_secret
            );
            println!("{}\n", credentials);
            report.items_processed += 1;
            report.successes += 1;
            report.messages.push(credentials);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::core::catalog::Catalog;
    use tempfile::TempDir;

    #[test]
    fn test_shared_secret_shape() {
        let secret = generate_shared_secret();
        assert_eq!(secret.len(), 48);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_shared_secret());
    }

    #[test]
    fn test_rejects_missing_or_bad_urls() {
        assert!(IntegrationClientGeneratorScript::new(vec![]).is_err());
        assert!(IntegrationClientGeneratorScript::new(vec!["not a url".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().into_owned());
        let mut session = Session::in_memory(storage, Catalog::new());

        let script =
            IntegrationClientGeneratorScript::new(vec!["https://www.library.org/".to_string()]).unwrap();
        let first = script.run(&mut session).await.unwrap();
        let again = IntegrationClientGeneratorScript::new(vec!["http://library.org".to_string()])
            .unwrap()
            .run(&mut session)
            .await
            .unwrap();

        assert!(first.messages[0].contains("client id: library.org"));
        let secret = |m: &str| m.lines().last().unwrap().to_string();
        assert_eq!(secret(&first.messages[0]), secret(&again.messages[0]));
    }
}
