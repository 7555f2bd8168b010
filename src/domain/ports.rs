use crate::core::session::Session;
use crate::domain::model::{CollectionId, DataSource, IdentifierId, IdentifierType};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn data_directory(&self) -> &str;
    fn oclc_linked_data_url(&self) -> &str;
    fn viaf_url(&self) -> Option<&str>;
    fn content_server_url(&self) -> Option<&str>;
    fn request_timeout(&self) -> Duration;
    fn retry_attempts(&self) -> u32;
    fn retry_delay(&self) -> Duration;
    fn batch_size(&self) -> usize;
}

/// What a script reports back to the runner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptReport {
    pub items_processed: usize,
    pub successes: usize,
    pub failures: usize,
    pub messages: Vec<String>,
}

impl ScriptReport {
    pub fn merge(&mut self, other: ScriptReport) {
        self.items_processed += other.items_processed;
        self.successes += other.successes;
        self.failures += other.failures;
        self.messages.extend(other.messages);
    }
}

/// One command-line job.
#[async_trait]
pub trait Script: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, session: &mut Session) -> Result<ScriptReport>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageFailure {
    pub identifier_id: IdentifierId,
    pub exception: String,
    pub transient: bool,
}

impl CoverageFailure {
    pub fn transient(identifier_id: IdentifierId, exception: impl Into<String>) -> Self {
        Self {
            identifier_id,
            exception: exception.into(),
            transient: true,
        }
    }

    pub fn persistent(identifier_id: IdentifierId, exception: impl Into<String>) -> Self {
        Self {
            identifier_id,
            exception: exception.into(),
            transient: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageOutcome {
    Success(IdentifierId),
    Failure(CoverageFailure),
}

impl CoverageOutcome {
    pub fn identifier_id(&self) -> IdentifierId {
        match self {
            CoverageOutcome::Success(id) => *id,
            CoverageOutcome::Failure(f) => f.identifier_id,
        }
    }
}

/// A job that obtains metadata for identifiers from one source and
/// records a coverage record per identifier.
#[async_trait]
pub trait CoverageProvider: Send + Sync {
    fn service_name(&self) -> &str;

    fn data_source(&self) -> DataSource;

    fn input_identifier_types(&self) -> &[IdentifierType];

    fn operation(&self) -> Option<&str> {
        None
    }

    fn batch_size(&self) -> usize {
        100
    }

    fn collection_id(&self) -> Option<CollectionId> {
        None
    }

    async fn process_batch(
        &self,
        session: &mut Session,
        batch: &[IdentifierId],
    ) -> Result<Vec<CoverageOutcome>>;
}
