use crate::core::catalog::Catalog;
use crate::core::session::Session;
use crate::domain::model::{CollectionId, CoverageStatus, IdentifierId};
use crate::domain::ports::{
    CoverageFailure, CoverageOutcome, CoverageProvider, Script, ScriptReport,
};
use crate::utils::error::{ErrorCategory, Result, WranglerError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;

pub const IGNORED_EXCEPTION: &str = "Was ignored by coverage provider";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub successes: usize,
    pub transient_failures: usize,
    pub persistent_failures: usize,
}

impl CoverageReport {
    pub fn total(&self) -> usize {
        self.successes + self.transient_failures + self.persistent_failures
    }
}

impl From<CoverageReport> for ScriptReport {
    fn from(report: CoverageReport) -> Self {
        ScriptReport {
            items_processed: report.total(),
            successes: report.successes,
            failures: report.transient_failures + report.persistent_failures,
            messages: Vec::new(),
        }
    }
}

/// Identifiers the provider should (re)try: right type, in the provider's
/// collection if it has one, and no coverage record unless that record
/// asks for a retry.
pub fn items_that_need_coverage(
    catalog: &Catalog,
    provider: &dyn CoverageProvider,
) -> Vec<IdentifierId> {
    let types = provider.input_identifier_types();
    let candidates: Vec<IdentifierId> = match provider.collection_id() {
        Some(collection_id) => match catalog.collection(collection_id) {
            Some(collection) => collection
                .catalog
                .iter()
                .copied()
                .filter(|id| {
                    catalog
                        .identifier(*id)
                        .is_some_and(|i| types.contains(&i.r#type))
                })
                .collect(),
            None => Vec::new(),
        },
        None => catalog.identifiers_of_types(types),
    };

    candidates
        .into_iter()
        .filter(|id| needs_coverage(catalog, provider, *id))
        .collect()
}

/// Whether the provider's coverage record for `identifier_id` is missing or
/// asks for a retry.
fn needs_coverage(catalog: &Catalog, provider: &dyn CoverageProvider, identifier_id: IdentifierId) -> bool {
    match catalog.coverage_record(
        identifier_id,
        provider.data_source(),
        provider.operation(),
        provider.collection_id(),
    ) {
        None => true,
        Some(record) => record.status.needs_retry(),
    }
}

fn record_outcomes(
    catalog: &mut Catalog,
    provider: &dyn CoverageProvider,
    batch: &[IdentifierId],
    outcomes: Vec<CoverageOutcome>,
    report: &mut CoverageReport,
) {
    let now = Utc::now();
    let mut handled = HashSet::new();

    for outcome in outcomes {
        let identifier_id = outcome.identifier_id();
        if !batch.contains(&identifier_id) {
            tracing::warn!(
                "⚠️ {} reported on identifier {} which was not in the batch",
                provider.service_name(),
                identifier_id
            );
            continue;
        }
        if !handled.insert(identifier_id) {
            continue;
        }
        let (status, exception) = match outcome {
            CoverageOutcome::Success(_) => {
                report.successes += 1;
                (CoverageStatus::Success, None)
            }
            CoverageOutcome::Failure(CoverageFailure {
                exception,
                transient,
                ..
            }) => {
                tracing::debug!(
                    "{} failed on identifier {}: {}",
                    provider.service_name(),
                    identifier_id,
                    exception
                );
                if transient {
                    report.transient_failures += 1;
                    (CoverageStatus::TransientFailure, Some(exception))
                } else {
                    report.persistent_failures += 1;
                    (CoverageStatus::PersistentFailure, Some(exception))
                }
            }
        };
        catalog.add_coverage_record(
            identifier_id,
            provider.data_source(),
            provider.operation(),
            provider.collection_id(),
            status,
            exception,
            now,
        );
    }

    for identifier_id in batch.iter().filter(|id| !handled.contains(*id)) {
        report.transient_failures += 1;
        catalog.add_coverage_record(
            *identifier_id,
            provider.data_source(),
            provider.operation(),
            provider.collection_id(),
            CoverageStatus::TransientFailure,
            Some(IGNORED_EXCEPTION.to_string()),
            now,
        );
    }
}

async fn process_and_record(
    provider: &dyn CoverageProvider,
    session: &mut Session,
    batch: &[IdentifierId],
    report: &mut CoverageReport,
) -> Result<()> {
    let outcomes = match provider.process_batch(session, batch).await {
        Ok(outcomes) => outcomes,
        // 整批都因為網路問題失敗：記成暫時性失敗，下次再試
        Err(e) if e.is_transient() => {
            tracing::warn!(
                "⚠️ {} batch of {} failed: {}",
                provider.service_name(),
                batch.len(),
                e
            );
            batch
                .iter()
                .map(|id| CoverageOutcome::Failure(CoverageFailure::transient(*id, e.to_string())))
                .collect()
        }
        Err(e) if e.category() == ErrorCategory::Data => {
            return Err(WranglerError::CoverageError {
                provider: provider.service_name().to_string(),
                details: e.to_string(),
            })
        }
        Err(e) => return Err(e),
    };
    record_outcomes(&mut session.catalog, provider, batch, outcomes, report);
    Ok(())
}

/// Process every identifier that needs coverage, one batch at a time,
/// committing after each batch. Each identifier is attempted at most once
/// per run.
pub async fn run_provider(
    provider: &dyn CoverageProvider,
    session: &mut Session,
) -> Result<CoverageReport> {
    let mut report = CoverageReport::default();
    let mut attempted: HashSet<IdentifierId> = HashSet::new();
    let batch_size = provider.batch_size().max(1);

    tracing::info!("🚀 Running coverage provider: {}", provider.service_name());

    // 每一輪只掃描一次候選；處理中新出現的 identifier 留給下一輪
    loop {
        let pending: Vec<IdentifierId> = items_that_need_coverage(&session.catalog, provider)
            .into_iter()
            .filter(|id| !attempted.contains(id))
            .collect();
        if pending.is_empty() {
            break;
        }
        tracing::debug!("{}: {} identifier(s) need coverage", provider.service_name(), pending.len());

        for chunk in pending.chunks(batch_size) {
            // an earlier batch may already have covered some of these
            let batch: Vec<IdentifierId> = chunk
                .iter()
                .copied()
                .filter(|id| needs_coverage(&session.catalog, provider, *id))
                .collect();
            attempted.extend(chunk.iter().copied());
            if batch.is_empty() {
                continue;
            }

            process_and_record(provider, session, &batch, &mut report).await?;
            session.commit().await?;

            tracing::info!(
                "📦 {}: batch of {} done ({} ok, {} transient, {} persistent so far)",
                provider.service_name(),
                batch.len(),
                report.successes,
                report.transient_failures,
                report.persistent_failures
            );
        }
    }

    Ok(report)
}

/// Make sure one identifier is covered. Skips identifiers of the wrong type
/// (returns `None`) and, unless `force`, identifiers already covered.
pub async fn ensure_coverage(
    provider: &dyn CoverageProvider,
    session: &mut Session,
    identifier_id: IdentifierId,
    force: bool,
) -> Result<Option<CoverageStatus>> {
    let right_type = session
        .catalog
        .identifier(identifier_id)
        .is_some_and(|i| provider.input_identifier_types().contains(&i.r#type));
    if !right_type {
        return Ok(None);
    }

    let existing = session
        .catalog
        .coverage_record(
            identifier_id,
            provider.data_source(),
            provider.operation(),
            provider.collection_id(),
        )
        .map(|r| r.status);
    if !force && existing == Some(CoverageStatus::Success) {
        return Ok(existing);
    }

    let mut report = CoverageReport::default();
    process_and_record(provider, session, &[identifier_id], &mut report).await?;

    Ok(session
        .catalog
        .coverage_record(
            identifier_id,
            provider.data_source(),
            provider.operation(),
            provider.collection_id(),
        )
        .map(|r| r.status))
}

/// Wraps a single coverage provider as a script.
pub struct RunCoverageProviderScript {
    provider: Box<dyn CoverageProvider>,
}

impl RunCoverageProviderScript {
    pub fn new(provider: Box<dyn CoverageProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Script for RunCoverageProviderScript {
    fn name(&self) -> &str {
        self.provider.service_name()
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let report = run_provider(self.provider.as_ref(), session).await?;
        Ok(report.into())
    }
}

pub type ProviderFactory = Box<dyn Fn(CollectionId) -> Box<dyn CoverageProvider> + Send + Sync>;

/// Runs one provider instance per collection, in collection-id order.
pub struct RunCollectionCoverageProviderScript {
    name: String,
    protocol: Option<String>,
    factory: ProviderFactory,
}

impl RunCollectionCoverageProviderScript {
    pub fn new(name: impl Into<String>, protocol: Option<String>, factory: ProviderFactory) -> Self {
        Self {
            name: name.into(),
            protocol,
            factory,
        }
    }
}

#[async_trait]
impl Script for RunCollectionCoverageProviderScript {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let collections = session
            .catalog
            .collections_with_protocol(self.protocol.as_deref());
        if collections.is_empty() {
            tracing::warn!("⚠️ {}: no collections to cover", self.name);
        }

        let mut total = ScriptReport::default();
        for collection_id in collections {
            let provider = (self.factory)(collection_id);
            tracing::info!(
                "📚 {} for collection {}",
                provider.service_name(),
                collection_id
            );
            let report = run_provider(provider.as_ref(), session).await?;
            total.merge(report.into());
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::domain::model::{Collection, DataSource, IdentifierType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Succeeds on even identifier values, fails (transiently or not) on odd.
    struct ParityProvider {
        transient: bool,
        calls: AtomicUsize,
        collection: Option<CollectionId>,
    }

    impl ParityProvider {
        fn new(transient: bool) -> Self {
            Self {
                transient,
                calls: AtomicUsize::new(0),
                collection: None,
            }
        }
    }

    #[async_trait]
    impl CoverageProvider for ParityProvider {
        fn service_name(&self) -> &str {
            "Parity"
        }

        fn data_source(&self) -> DataSource {
            DataSource::OclcLinkedData
        }

        fn input_identifier_types(&self) -> &[IdentifierType] {
            &[IdentifierType::Isbn]
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn collection_id(&self) -> Option<CollectionId> {
            self.collection
        }

        async fn process_batch(
            &self,
            session: &mut Session,
            batch: &[IdentifierId],
        ) -> Result<Vec<CoverageOutcome>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch
                .iter()
                .map(|id| {
                    let value: u64 = session.catalog.identifier(*id).unwrap().identifier.parse().unwrap();
                    if value % 2 == 0 {
                        CoverageOutcome::Success(*id)
                    } else {
                        CoverageOutcome::Failure(CoverageFailure {
                            identifier_id: *id,
                            exception: "odd".to_string(),
                            transient: self.transient,
                        })
                    }
                })
                .collect())
        }
    }

    fn session() -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().into_owned());
        (dir, Session::in_memory(storage, Catalog::new()))
    }

    #[tokio::test]
    async fn test_run_provider_batches_and_records() {
        let (_dir, mut session) = session();
        for n in 1..=5 {
            session.catalog.identifier_for(IdentifierType::Isbn, &n.to_string());
        }
        session.catalog.identifier_for(IdentifierType::Gutenberg, "2");

        let provider = ParityProvider::new(false);
        let report = run_provider(&provider, &mut session).await.unwrap();

        assert_eq!(report.successes, 2);
        assert_eq!(report.persistent_failures, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.commits(), 3);

        // 第二次執行不應再處理任何東西
        let again = run_provider(&provider, &mut session).await.unwrap();
        assert_eq!(again.total(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_next_run_only() {
        let (_dir, mut session) = session();
        session.catalog.identifier_for(IdentifierType::Isbn, "1");

        let provider = ParityProvider::new(true);
        let first = run_provider(&provider, &mut session).await.unwrap();
        assert_eq!(first.transient_failures, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let second = run_provider(&provider, &mut session).await.unwrap();
        assert_eq!(second.transient_failures, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_collection_restricts_candidates() {
        let (_dir, mut session) = session();
        let (in_collection, _) = session.catalog.identifier_for(IdentifierType::Isbn, "2");
        session.catalog.identifier_for(IdentifierType::Isbn, "4");
        let collection = session.catalog.add_collection("Main", Collection::OPDS_IMPORT);
        session.catalog.catalog_identifier(collection, in_collection).unwrap();

        let mut provider = ParityProvider::new(false);
        provider.collection = Some(collection);

        assert_eq!(
            items_that_need_coverage(&session.catalog, &provider),
            vec![in_collection]
        );
        let report = run_provider(&provider, &mut session).await.unwrap();
        assert_eq!(report.successes, 1);
        assert!(session
            .catalog
            .coverage_record(in_collection, DataSource::OclcLinkedData, None, Some(collection))
            .is_some());
    }

    #[tokio::test]
    async fn test_ensure_coverage_skips_covered_unless_forced() {
        let (_dir, mut session) = session();
        let (id, _) = session.catalog.identifier_for(IdentifierType::Isbn, "2");
        let (wrong_type, _) = session.catalog.identifier_for(IdentifierType::Gutenberg, "2");
        let provider = ParityProvider::new(false);

        assert_eq!(
            ensure_coverage(&provider, &mut session, id, false).await.unwrap(),
            Some(CoverageStatus::Success)
        );
        ensure_coverage(&provider, &mut session, id, false).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        ensure_coverage(&provider, &mut session, id, true).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        assert_eq!(
            ensure_coverage(&provider, &mut session, wrong_type, false).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unreported_items_become_transient_failures() {
        struct SilentProvider;

        #[async_trait]
        impl CoverageProvider for SilentProvider {
            fn service_name(&self) -> &str {
                "Silent"
            }
            fn data_source(&self) -> DataSource {
                DataSource::Viaf
            }
            fn input_identifier_types(&self) -> &[IdentifierType] {
                &[IdentifierType::Isbn]
            }
            async fn process_batch(
                &self,
                _session: &mut Session,
                _batch: &[IdentifierId],
            ) -> Result<Vec<CoverageOutcome>> {
                Ok(vec![CoverageOutcome::Success(9999)])
            }
        }

        let (_dir, mut session) = session();
        let (id, _) = session.catalog.identifier_for(IdentifierType::Isbn, "1");

        let report = run_provider(&SilentProvider, &mut session).await.unwrap();

        assert_eq!(report.transient_failures, 1);
        let record = session
            .catalog
            .coverage_record(id, DataSource::Viaf, None, None)
            .unwrap();
        assert_eq!(record.exception.as_deref(), Some(IGNORED_EXCEPTION));
    }

    #[tokio::test]
    async fn test_bad_data_aborts_run_with_provider_name() {
        struct GarbledProvider;

        #[async_trait]
        impl CoverageProvider for GarbledProvider {
            fn service_name(&self) -> &str {
                "Garbled"
            }
            fn data_source(&self) -> DataSource {
                DataSource::Viaf
            }
            fn input_identifier_types(&self) -> &[IdentifierType] {
                &[IdentifierType::Isbn]
            }
            async fn process_batch(
                &self,
                _session: &mut Session,
                _batch: &[IdentifierId],
            ) -> Result<Vec<CoverageOutcome>> {
                Err(WranglerError::parse("record", "truncated"))
            }
        }

        let (_dir, mut session) = session();
        session.catalog.identifier_for(IdentifierType::Isbn, "1");

        let err = run_provider(&GarbledProvider, &mut session).await.unwrap_err();

        assert!(matches!(err, WranglerError::CoverageError { ref provider, .. } if provider == "Garbled"));
        assert_eq!(session.commits(), 0);
    }

    #[tokio::test]
    async fn test_large_catalog_run_is_not_quadratic() {
        struct AlwaysCovered;

        #[async_trait]
        impl CoverageProvider for AlwaysCovered {
            fn service_name(&self) -> &str {
                "Always"
            }
            fn data_source(&self) -> DataSource {
                DataSource::OclcLinkedData
            }
            fn input_identifier_types(&self) -> &[IdentifierType] {
                &[IdentifierType::Isbn]
            }
            fn batch_size(&self) -> usize {
                1000
            }
            async fn process_batch(
                &self,
                _session: &mut Session,
                batch: &[IdentifierId],
            ) -> Result<Vec<CoverageOutcome>> {
                Ok(batch.iter().map(|id| CoverageOutcome::Success(*id)).collect())
            }
        }

        let (_dir, mut session) = session();
        for n in 0..20_000 {
            session.catalog.identifier_for(IdentifierType::Isbn, &n.to_string());
        }

        let started = std::time::Instant::now();
        let report = run_provider(&AlwaysCovered, &mut session).await.unwrap();

        assert_eq!(report.successes, 20_000);
        assert_eq!(session.commits(), 20);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(20),
            "coverage run took {:?}",
            started.elapsed()
        );
    }
}
