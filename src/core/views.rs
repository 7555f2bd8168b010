use crate::core::catalog::Catalog;
use crate::core::session::Session;
use crate::domain::ports::{Script, ScriptReport, Storage};
use crate::utils::error::{Result, WranglerError};
use async_trait::async_trait;
use serde::Serialize;

pub const WORKS_EDITIONS_VIEW: &str = "views/works_editions.csv";
pub const WORKS_CLASSIFICATIONS_VIEW: &str = "views/works_classifications.csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkEditionRow {
    pub work_id: u64,
    pub edition_id: u64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub sort_author: Option<String>,
    pub data_source: String,
    pub identifier_type: String,
    pub identifier: String,
    pub language: Option<String>,
    pub presentation_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkClassificationRow {
    pub work_id: u64,
    pub identifier_type: String,
    pub identifier: String,
    pub subject_type: String,
    pub subject: String,
    pub weight: u32,
}

/// One row per (work, edition), ordered by work then edition.
pub fn works_editions(catalog: &Catalog) -> Vec<WorkEditionRow> {
    let mut rows = Vec::new();
    for work in catalog.works() {
        let mut edition_ids = work.edition_ids.clone();
        edition_ids.sort_unstable();
        for edition in edition_ids.iter().filter_map(|id| catalog.edition(*id)) {
            let Some(identifier) = catalog.identifier(edition.primary_identifier_id) else {
                continue;
            };
            rows.push(WorkEditionRow {
                work_id: work.id,
                edition_id: edition.id,
                title: work.title.clone(),
                author: work.author.clone(),
                sort_author: work.sort_author.clone(),
                data_source: edition.data_source.name().to_string(),
                identifier_type: identifier.r#type.as_str().to_string(),
                identifier: identifier.identifier.clone(),
                language: work.language.clone(),
                presentation_ready: work.presentation_ready,
            });
        }
    }
    rows.sort_by_key(|r| (r.work_id, r.edition_id));
    rows
}

pub fn works_classifications(catalog: &Catalog) -> Vec<WorkClassificationRow> {
    let mut rows = Vec::new();
    for work in catalog.works() {
        let identifier_ids = catalog.work_identifier_ids(work.id);
        for classification in catalog.classifications_for(&identifier_ids) {
            let Some(identifier) = catalog.identifier(classification.identifier_id) else {
                continue;
            };
            rows.push(WorkClassificationRow {
                work_id: work.id,
                identifier_type: identifier.r#type.as_str().to_string(),
                identifier: identifier.identifier.clone(),
                subject_type: classification.subject_type.as_str().to_string(),
                subject: classification.subject.clone(),
                weight: classification.weight,
            });
        }
    }
    rows.sort_by(|a, b| {
        (a.work_id, &a.identifier_type, &a.identifier, &a.subject_type, &a.subject).cmp(&(
            b.work_id,
            &b.identifier_type,
            &b.identifier,
            &b.subject_type,
            &b.subject,
        ))
    });
    rows
}

fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| WranglerError::IoError(e.into_error()))
}

/// Rebuilds the CSV exports under `<data>/views/`.
pub struct RefreshMaterializedViewsScript;

#[async_trait]
impl Script for RefreshMaterializedViewsScript {
    fn name(&self) -> &str {
        "Refresh Materialized Views"
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let editions = works_editions(&session.catalog);
        let classifications = works_classifications(&session.catalog);

        session
            .storage()
            .write_file(WORKS_EDITIONS_VIEW, &to_csv(&editions)?)
            .await?;
        session
            .storage()
            .write_file(WORKS_CLASSIFICATIONS_VIEW, &to_csv(&classifications)?)
            .await?;

        tracing::info!(
            "💾 Views refreshed: {} work/edition rows, {} classification rows ({})",
            editions.len(),
            classifications.len(),
            session.storage().location("views")
        );

        Ok(ScriptReport {
            items_processed: editions.len() + classifications.len(),
            successes: editions.len() + classifications.len(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::domain::model::{DataSource, IdentifierType, SubjectType};
    use tempfile::TempDir;

    fn catalog_with_work() -> Catalog {
        let mut catalog = Catalog::new();
        let (id, _) = catalog.identifier_for(IdentifierType::Gutenberg, "84");
        let (edition_id, _) = catalog.edition_for(DataSource::Gutenberg, id).unwrap();
        catalog.edition_mut(edition_id).unwrap().title = Some("Frankenstein".to_string());
        catalog.classify(id, DataSource::Gutenberg, SubjectType::Lcsh, "Horror tales", None, 1);
        catalog.refresh_work_for_edition(edition_id).unwrap();
        catalog
    }

    #[test]
    fn test_rows() {
        let catalog = catalog_with_work();

        let editions = works_editions(&catalog);
        assert_eq!(editions.len(), 1);
        assert_eq!(editions[0].title.as_deref(), Some("Frankenstein"));
        assert_eq!(editions[0].identifier_type, "Gutenberg ID");
        assert!(editions[0].presentation_ready);

        let classifications = works_classifications(&catalog);
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications[0].subject, "Horror tales");
    }

    #[tokio::test]
    async fn test_script_writes_csv_files() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_string_lossy().into_owned());
        let mut session = Session::in_memory(storage, catalog_with_work());

        let report = RefreshMaterializedViewsScript.run(&mut session).await.unwrap();

        assert_eq!(report.items_processed, 2);
        let content = std::fs::read_to_string(dir.path().join(WORKS_EDITIONS_VIEW)).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("work_id,edition_id,title,author,sort_author,data_source,identifier_type,identifier,language,presentation_ready")
        );
        assert!(lines.next().unwrap().contains(",Frankenstein,"));
        assert!(dir.path().join(WORKS_CLASSIFICATIONS_VIEW).exists());
    }
}
