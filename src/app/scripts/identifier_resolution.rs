use crate::adapters::content_server::ContentServerClient;
use crate::adapters::oclc::LinkedDataCoverageProvider;
use crate::adapters::opds::OPDSImporter;
use crate::adapters::viaf::VIAFClient;
use crate::core::catalog::Catalog;
use crate::core::coverage::ensure_coverage;
use crate::core::session::Session;
use crate::domain::model::{
    CollectionId, ContributorId, CoverageStatus, DataSource, EditionId, IdentifierId,
    IdentifierType, WorkId,
};
use crate::domain::ports::{CoverageFailure, CoverageOutcome, CoverageProvider};
use crate::utils::error::{Result, WranglerError};
use async_trait::async_trait;
use std::collections::BTreeSet;

pub const SERVICE_NAME: &str = "Identifier Resolution Coverage Provider";
pub const OPERATION: &str = "resolve-identifier";

pub const NETWORK_FAILURE: &str = "Could not access underlying license source over the network.";
pub const SERVER_SIDE_PROBLEM: &str =
    "Server-side problem: the license source said it handled this identifier but sent no entry.";
pub const NOT_MENTIONED: &str = "Identifier was not mentioned in the lookup response.";
pub const NO_EDITION: &str = "No edition available to build a work from.";

const INPUT_TYPES: [IdentifierType; 5] = [
    IdentifierType::Gutenberg,
    IdentifierType::Overdrive,
    IdentifierType::ThreeM,
    IdentifierType::Axis360,
    IdentifierType::Isbn,
];

/// Turns a bare identifier into a presentation-ready work: license-source
/// identifiers through the content server, ISBNs through OCLC Linked Data.
pub struct IdentifierResolutionCoverageProvider {
    collection_id: Option<CollectionId>,
    content_server: ContentServerClient,
    oclc: LinkedDataCoverageProvider,
    viaf: Option<VIAFClient>,
    batch_size: usize,
}

impl IdentifierResolutionCoverageProvider {
    pub fn new(
        collection_id: Option<CollectionId>,
        content_server: ContentServerClient,
        oclc: LinkedDataCoverageProvider,
        viaf: Option<VIAFClient>,
        batch_size: usize,
    ) -> Self {
        Self {
            collection_id,
            content_server,
            oclc,
            viaf,
            batch_size,
        }
    }

    /// Ask the content server about every license-source identifier at once.
    async fn resolve_through_license_source(
        &self,
        catalog: &mut Catalog,
        ids: &[IdentifierId],
    ) -> Result<Vec<CoverageOutcome>> {
        let urns: Vec<(IdentifierId, String)> = ids
            .iter()
            .filter_map(|id| catalog.identifier(*id).map(|i| (*id, i.urn())))
            .collect();
        if urns.is_empty() {
            return Ok(Vec::new());
        }
        let query: Vec<String> = urns.iter().map(|(_, urn)| urn.clone()).collect();

        let feed = match self.content_server.lookup(&query).await {
            Ok(feed) => feed,
            Err(e) => {
                let exception = match &e {
                    WranglerError::HttpError(_) => NETWORK_FAILURE.to_string(),
                    WranglerError::UpstreamError { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::warn!("⚠️ Content server lookup failed: {}", e);
                return Ok(ids
                    .iter()
                    .map(|id| CoverageOutcome::Failure(CoverageFailure::transient(*id, exception.clone())))
                    .collect());
            }
        };

        let importer = OPDSImporter::new(DataSource::ContentServer);
        let imported = importer.import_from_feed(catalog, &feed)?;
        let imported_ids: BTreeSet<IdentifierId> = imported.identifiers.iter().copied().collect();

        Ok(urns
            .into_iter()
            .map(|(id, _)| {
                if imported_ids.contains(&id) {
                    return CoverageOutcome::Success(id);
                }
                let failure = match imported.identifier_messages.get(&id) {
                    Some((status, message)) if *status >= 500 => {
                        CoverageFailure::transient(id, message.clone())
                    }
                    Some((status, _)) if (200..300).contains(status) => {
                        CoverageFailure::transient(id, SERVER_SIDE_PROBLEM)
                    }
                    Some((_, message)) => CoverageFailure::persistent(id, message.clone()),
                    None => CoverageFailure::transient(id, NOT_MENTIONED),
                };
                CoverageOutcome::Failure(failure)
            })
            .collect())
    }

    async fn resolve_isbn(&self, session: &mut Session, id: IdentifierId) -> CoverageOutcome {
        let status = match ensure_coverage(&self.oclc, session, id, false).await {
            Ok(status) => status,
            Err(e) if e.is_transient() => {
                return CoverageOutcome::Failure(CoverageFailure::transient(id, e.to_string()))
            }
            Err(e) => return CoverageOutcome::Failure(CoverageFailure::persistent(id, e.to_string())),
        };
        let exception = || {
            session
                .catalog
                .coverage_record(id, self.oclc.data_source(), self.oclc.operation(), None)
                .and_then(|r| r.exception.clone())
                .unwrap_or_else(|| "Unknown failure.".to_string())
        };
        match status {
            Some(CoverageStatus::Success) => CoverageOutcome::Success(id),
            Some(CoverageStatus::PersistentFailure) => {
                CoverageOutcome::Failure(CoverageFailure::persistent(id, exception()))
            }
            _ => CoverageOutcome::Failure(CoverageFailure::transient(id, exception())),
        }
    }

    /// Some edition describing the identifier or one of its equivalents.
    fn edition_for_work(catalog: &Catalog, id: IdentifierId) -> Option<EditionId> {
        catalog
            .editions_for_identifier(id)
            .into_iter()
            .next()
            .or_else(|| {
                catalog
                    .equivalent_identifier_ids(id)
                    .into_iter()
                    .flat_map(|e| catalog.editions_for_identifier(e))
                    .next()
            })
    }

    fn contributors_of_work(catalog: &Catalog, work_id: WorkId) -> BTreeSet<ContributorId> {
        catalog
            .work(work_id)
            .map(|w| {
                w.edition_ids
                    .iter()
                    .filter_map(|e| catalog.edition(*e))
                    .flat_map(|e| e.contributions.iter().map(|c| c.contributor_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build (or refresh) the work for a resolved identifier.
    async fn finalize(&self, catalog: &mut Catalog, id: IdentifierId) -> Result<Option<WorkId>> {
        let Some(edition_id) = Self::edition_for_work(catalog, id) else {
            return Ok(None);
        };
        let work_id = catalog.work_for_edition(edition_id)?;

        if let Some(viaf) = &self.viaf {
            for contributor_id in Self::contributors_of_work(catalog, work_id) {
                if let Err(e) = viaf.process_contributor(catalog, contributor_id).await {
                    tracing::warn!("⚠️ VIAF lookup for contributor {} failed: {}", contributor_id, e);
                }
            }
        }
        catalog.calculate_presentation(work_id)?;
        Ok(Some(work_id))
    }
}

#[async_trait]
impl CoverageProvider for IdentifierResolutionCoverageProvider {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn data_source(&self) -> DataSource {
        DataSource::MetadataWrangler
    }

    fn input_identifier_types(&self) -> &[IdentifierType] {
        &INPUT_TYPES
    }

    fn operation(&self) -> Option<&str> {
        Some(OPERATION)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn collection_id(&self) -> Option<CollectionId> {
        self.collection_id
    }

    async fn process_batch(
        &self,
        session: &mut Session,
        batch: &[IdentifierId],
    ) -> Result<Vec<CoverageOutcome>> {
        let (license_ids, isbn_ids): (Vec<IdentifierId>, Vec<IdentifierId>) =
            batch.iter().copied().partition(|id| {
                session
                    .catalog
                    .identifier(*id)
                    .is_some_and(|i| i.r#type.is_license_source())
            });

        let mut resolved = self
            .resolve_through_license_source(&mut session.catalog, &license_ids)
            .await?;
        for id in isbn_ids {
            let outcome = self.resolve_isbn(session, id).await;
            resolved.push(outcome);
        }

        let mut outcomes = Vec::with_capacity(resolved.len());
        for outcome in resolved {
            let CoverageOutcome::Success(id) = outcome else {
                outcomes.push(outcome);
                continue;
            };
            let finalized = match self.finalize(&mut session.catalog, id).await {
                Ok(Some(work_id)) => {
                    tracing::debug!("Identifier {} resolved to work {}", id, work_id);
                    CoverageOutcome::Success(id)
                }
                Ok(None) => CoverageOutcome::Failure(CoverageFailure::persistent(id, NO_EDITION)),
                Err(e) => CoverageOutcome::Failure(CoverageFailure::persistent(id, e.to_string())),
            };
            outcomes.push(finalized);
        }
        Ok(outcomes)
    }
}
