use crate::core::catalog::Catalog;
use crate::domain::model::*;
use crate::utils::error::{Result, WranglerError};
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::BTreeSet;

pub const NO_TITLE_EXCEPTION: &str = "No title available for this work";

/// Which way a single classification leans.
fn fiction_vote(classification: &Classification) -> Option<bool> {
    if classification.subject_type == SubjectType::Ddc {
        let subject = classification.subject.trim().to_uppercase();
        if subject == "FIC" {
            return Some(true);
        }
        let digits: String = subject.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() == 3 {
            // 8x3 是各語言的小說類
            let bytes = digits.as_bytes();
            return Some(bytes[0] == b'8' && bytes[2] == b'3');
        }
        return None;
    }

    let text = classification
        .name
        .as_deref()
        .unwrap_or(&classification.subject)
        .to_lowercase();
    if text.contains("nonfiction") || text.contains("non-fiction") {
        Some(false)
    } else if text.contains("fiction") {
        Some(true)
    } else {
        None
    }
}

impl Catalog {
    /// Identifiers of every edition in the work plus their equivalents.
    pub fn work_identifier_ids(&self, work_id: WorkId) -> BTreeSet<IdentifierId> {
        let mut ids = BTreeSet::new();
        if let Some(work) = self.work(work_id) {
            for edition_id in &work.edition_ids {
                if let Some(edition) = self.edition(*edition_id) {
                    ids.extend(self.equivalent_identifier_ids(edition.primary_identifier_id));
                }
            }
        }
        ids
    }

    fn choose_presentation_edition(&self, work: &Work) -> Option<EditionId> {
        work.edition_ids
            .iter()
            .filter_map(|id| self.edition(*id))
            .max_by_key(|e| {
                let preferred = e.open_access_url.is_some()
                    || e.data_source == DataSource::ContentServer;
                (e.completeness(), preferred, Reverse(e.id))
            })
            .map(|e| e.id)
    }

    fn primary_author(&self, edition: &Edition) -> Option<&Contributor> {
        let by_role = |role: &str| {
            edition
                .contributions
                .iter()
                .find(|c| c.role == role)
                .map(|c| c.contributor_id)
        };
        by_role(PRIMARY_AUTHOR_ROLE)
            .or_else(|| by_role(AUTHOR_ROLE))
            .or_else(|| edition.contributions.first().map(|c| c.contributor_id))
            .and_then(|id| self.contributor(id))
    }

    /// Recompute everything a client sees for a work from its editions and
    /// the metadata attached to their equivalent identifiers.
    pub fn calculate_presentation(&mut self, work_id: WorkId) -> Result<()> {
        let work = self
            .work(work_id)
            .ok_or_else(|| WranglerError::not_found("work", work_id))?
            .clone();

        let presentation_edition_id = self.choose_presentation_edition(&work);
        let presentation_edition = presentation_edition_id.and_then(|id| self.edition(id));

        let title = presentation_edition.and_then(|e| e.title.clone());
        let language = presentation_edition.and_then(|e| e.language.clone());
        let (author, sort_author) = match presentation_edition.and_then(|e| self.primary_author(e)) {
            Some(c) => {
                let display = c.display_name.clone().or_else(|| {
                    c.sort_name
                        .as_deref()
                        .map(|s| Contributor::default_names(s).1)
                });
                (display, c.sort_name.clone())
            }
            None => (None, None),
        };

        let identifier_ids = self.work_identifier_ids(work_id);
        let summary = self
            .descriptions_for(&identifier_ids)
            .max_by_key(|d| d.content.len())
            .map(|d| d.content.clone());

        let (mut fiction_weight, mut nonfiction_weight) = (0u32, 0u32);
        for classification in self.classifications_for(&identifier_ids) {
            match fiction_vote(classification) {
                Some(true) => fiction_weight += classification.weight.max(1),
                Some(false) => nonfiction_weight += classification.weight.max(1),
                None => {}
            }
        }
        let fiction = if fiction_weight + nonfiction_weight == 0 {
            None
        } else {
            Some(fiction_weight > nonfiction_weight)
        };

        let work = self
            .work_mut(work_id)
            .ok_or_else(|| WranglerError::not_found("work", work_id))?;
        work.presentation_edition_id = presentation_edition_id;
        work.presentation_ready = title.is_some();
        work.presentation_ready_exception = if title.is_some() {
            None
        } else {
            Some(NO_TITLE_EXCEPTION.to_string())
        };
        work.title = title;
        work.language = language;
        work.author = author;
        work.sort_author = sort_author;
        work.summary = summary;
        work.fiction = fiction;
        work.last_update = Some(Utc::now());
        Ok(())
    }

    /// Put an edition in a work and recalculate that work.
    pub fn refresh_work_for_edition(&mut self, edition_id: EditionId) -> Result<WorkId> {
        let work_id = self.work_for_edition(edition_id)?;
        self.calculate_presentation(work_id)?;
        Ok(work_id)
    }
}
