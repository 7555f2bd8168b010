use crate::adapters::oclc::LinkedDataCoverageProvider;
use crate::core::catalog::Catalog;
use crate::core::coverage::ensure_coverage;
use crate::core::session::Session;
use crate::domain::model::{Contribution, CoverageStatus, DataSource, EditionId, IdentifierId, IdentifierType};
use crate::domain::ports::{CoverageProvider, Script, ScriptReport};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;

pub const SCRIPT_NAME: &str = "Redo OCLC for 3M";
pub const NO_ISBN_EXCEPTION: &str = "No ISBN equivalent to look up in OCLC";

/// Re-runs OCLC Linked Data for 3M books that came in without authors and
/// copies the authors OCLC knows about onto them.
pub struct RedoOCLCForThreeMScript {
    oclc: LinkedDataCoverageProvider,
}

impl RedoOCLCForThreeMScript {
    pub fn new(oclc: LinkedDataCoverageProvider) -> Self {
        Self { oclc }
    }

    /// 3M identifiers whose 3M edition has no contributors.
    pub fn authorless_threem_editions(catalog: &Catalog) -> Vec<(IdentifierId, EditionId)> {
        catalog
            .identifiers_of_types(&[IdentifierType::ThreeM])
            .into_iter()
            .filter_map(|id| {
                let edition_id = catalog.find_edition(DataSource::ThreeM, id)?;
                let edition = catalog.edition(edition_id)?;
                edition.contributions.is_empty().then_some((id, edition_id))
            })
            .collect()
    }

    /// Forget what OCLC told us about this identifier.
    fn reset_oclc(catalog: &mut Catalog, identifier_id: IdentifierId) {
        for equivalent in catalog.equivalent_identifier_ids(identifier_id) {
            catalog.remove_coverage_records(equivalent, DataSource::OclcLinkedData);
        }
        let removed = catalog.remove_equivalencies(identifier_id, |ds| ds.is_oclc());
        tracing::debug!("Removed {} OCLC equivalencies for identifier {}", removed, identifier_id);
    }

    fn oclc_contributions(catalog: &Catalog, isbn_ids: &[IdentifierId]) -> Vec<Contribution> {
        let mut contributions: Vec<Contribution> = Vec::new();
        for isbn in isbn_ids {
            for id in catalog.equivalent_identifier_ids(*isbn) {
                for edition_id in catalog.editions_for_identifier(id) {
                    let Some(edition) = catalog.edition(edition_id) else {
                        continue;
                    };
                    if edition.data_source != DataSource::OclcLinkedData {
                        continue;
                    }
                    for c in &edition.contributions {
                        if !contributions.contains(c) {
                            contributions.push(c.clone());
                        }
                    }
                }
            }
        }
        contributions
    }

    async fn redo(
        &self,
        session: &mut Session,
        identifier_id: IdentifierId,
        edition_id: EditionId,
    ) -> Result<bool> {
        Self::reset_oclc(&mut session.catalog, identifier_id);

        let isbns = session
            .catalog
            .equivalents_of_type(identifier_id, IdentifierType::Isbn);
        if isbns.is_empty() {
            session.catalog.add_coverage_record(
                identifier_id,
                self.oclc.data_source(),
                self.oclc.operation(),
                None,
                CoverageStatus::PersistentFailure,
                Some(NO_ISBN_EXCEPTION.to_string()),
                Utc::now(),
            );
            return Ok(false);
        }

        for isbn in &isbns {
            let status = ensure_coverage(&self.oclc, session, *isbn, true).await?;
            tracing::debug!("OCLC coverage for ISBN {}: {:?}", isbn, status);
        }

        let contributions = Self::oclc_contributions(&session.catalog, &isbns);
        if let Some(edition) = session.catalog.edition_mut(edition_id) {
            for c in &contributions {
                edition.add_contributor(c.contributor_id, &c.role);
            }
        }
        session.catalog.refresh_work_for_edition(edition_id)?;
        Ok(!contributions.is_empty())
    }
}

#[async_trait]
impl Script for RedoOCLCForThreeMScript {
    fn name(&self) -> &str {
        SCRIPT_NAME
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let targets = Self::authorless_threem_editions(&session.catalog);
        tracing::info!("🔁 {} authorless 3M edition(s) to redo", targets.len());

        let mut report = ScriptReport::default();
        for (identifier_id, edition_id) in targets {
            report.items_processed += 1;
            match self.redo(session, identifier_id, edition_id).await {
                Ok(true) => report.successes += 1,
                Ok(false) => {
                    report.failures += 1;
                    report
                        .messages
                        .push(format!("identifier {}: still no contributors", identifier_id));
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("⚠️ Redo for identifier {} failed: {}", identifier_id, e);
                    report.failures += 1;
                    report.messages.push(format!("identifier {}: {}", identifier_id, e));
                }
                Err(e) => return Err(e),
            }
            session.commit().await?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::HttpClient;
    use crate::adapters::oclc::OCLCLinkedDataClient;
    use crate::config::cli::LocalStorage;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const GRAPH: &str = r#"{
      "@graph": [
        {
          "@id": "http://www.worldcat.org/oclc/42",
          "@type": "schema:Book",
          "schema:name": "The Fellowship of the Ring",
          "schema:creator": { "@id": "http://viaf.org/viaf/95218067" },
          "schema:isbn": "9780261102354"
        },
        {
          "@id": "http://viaf.org/viaf/95218067",
          "@type": "schema:Person",
          "schema:name": "J. R. R. Tolkien"
        }
      ]
    }"#;

    fn script(server: &MockServer) -> RedoOCLCForThreeMScript {
        let http = HttpClient::new(Duration::from_secs(5), 0, Duration::from_millis(1)).unwrap();
        RedoOCLCForThreeMScript::new(LinkedDataCoverageProvider::new(
            OCLCLinkedDataClient::new(http, &server.base_url()),
            10,
        ))
    }

    #[tokio::test]
    async fn test_copies_oclc_authors_onto_threem_edition() {
        let server = MockServer::start();
        let oclc = server.mock(|when, then| {
            when.method(GET).path("/isbn/9780261102354.jsonld");
            then.status(200).body(GRAPH);
        });

        let mut catalog = Catalog::new();
        let (threem, _) = catalog.identifier_for(IdentifierType::ThreeM, "abc");
        let (isbn, _) = catalog.identifier_for(IdentifierType::Isbn, "9780261102354");
        let (stale, _) = catalog.identifier_for(IdentifierType::OclcNumber, "1");
        catalog.add_equivalency(threem, isbn, DataSource::ThreeM, 1.0);
        catalog.add_equivalency(threem, stale, DataSource::OclcClassify, 0.5);
        let (edition_id, _) = catalog.edition_for(DataSource::ThreeM, threem).unwrap();
        catalog.edition_mut(edition_id).unwrap().title = Some("Fellowship".to_string());
        // 舊的成功紀錄會被清掉並重跑
        catalog.add_coverage_record(
            isbn,
            DataSource::OclcLinkedData,
            None,
            None,
            CoverageStatus::Success,
            None,
            Utc::now(),
        );

        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().into_owned());
        let mut session = Session::in_memory(storage, catalog);

        let report = script(&server).run(&mut session).await.unwrap();

        oclc.assert();
        assert_eq!(report.successes, 1);
        let catalog = &session.catalog;
        assert!(!catalog.equivalent_identifier_ids(threem).contains(&stale));
        let edition = catalog.edition(edition_id).unwrap();
        assert_eq!(edition.contributions.len(), 1);
        let author = catalog.contributor(edition.contributions[0].contributor_id).unwrap();
        assert_eq!(author.viaf.as_deref(), Some("95218067"));
        assert!(RedoOCLCForThreeMScript::authorless_threem_editions(catalog).is_empty());
    }

    #[tokio::test]
    async fn test_no_isbn_is_persistent_failure() {
        let server = MockServer::start();
        let mut catalog = Catalog::new();
        let (threem, _) = catalog.identifier_for(IdentifierType::ThreeM, "lonely");
        catalog.edition_for(DataSource::ThreeM, threem).unwrap();

        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().into_owned());
        let mut session = Session::in_memory(storage, catalog);

        let report = script(&server).run(&mut session).await.unwrap();

        assert_eq!(report.failures, 1);
        let record = session
            .catalog
            .coverage_record(threem, DataSource::OclcLinkedData, None, None)
            .unwrap();
        assert_eq!(record.status, CoverageStatus::PersistentFailure);
        assert_eq!(record.exception.as_deref(), Some(NO_ISBN_EXCEPTION));
    }
}
