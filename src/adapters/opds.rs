use crate::adapters::xml::XmlElement;
use crate::core::catalog::Catalog;
use crate::domain::model::{
    Contributor, DataSource, EditionId, Identifier, IdentifierId, SubjectType, AUTHOR_ROLE,
};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const IMAGE_REL: &str = "http://opds-spec.org/image";
pub const OPEN_ACCESS_REL: &str = "http://opds-spec.org/acquisition/open-access";
pub const NEXT_REL: &str = "next";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpdsAuthor {
    pub name: Option<String>,
    pub sort_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpdsCategory {
    pub scheme: Option<String>,
    pub term: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpdsEntry {
    pub id: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<OpdsAuthor>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub issued: Option<String>,
    pub summary: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub categories: Vec<OpdsCategory>,
    pub cover_url: Option<String>,
    pub open_access_url: Option<String>,
}

/// A `simplified:message` the server sent instead of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OpdsMessage {
    pub urn: String,
    pub status_code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpdsLink {
    pub rel: Option<String>,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpdsFeed {
    pub entries: Vec<OpdsEntry>,
    pub messages: Vec<OpdsMessage>,
    pub links: Vec<OpdsLink>,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn links_of(element: &XmlElement) -> Vec<OpdsLink> {
    element
        .children_named("link")
        .filter_map(|l| {
            l.attr("href").map(|href| OpdsLink {
                rel: l.attr("rel").map(str::to_string),
                href: href.to_string(),
            })
        })
        .collect()
}

impl OpdsEntry {
    fn from_element(entry: &XmlElement) -> Self {
        let links = links_of(entry);
        let link_for = |rel: &str| {
            links
                .iter()
                .find(|l| l.rel.as_deref() == Some(rel))
                .map(|l| l.href.clone())
        };

        OpdsEntry {
            id: entry.child_text("id").unwrap_or_default().to_string(),
            title: entry.child_text("title").map(str::to_string),
            subtitle: entry.child_text("alternativeHeadline").map(str::to_string),
            authors: entry
                .children_named("author")
                .map(|a| OpdsAuthor {
                    name: a.child_text("name").map(str::to_string),
                    sort_name: a.child_text("sort_name").map(str::to_string),
                })
                .filter(|a| a.name.is_some() || a.sort_name.is_some())
                .collect(),
            publisher: entry.child_text("publisher").map(str::to_string),
            language: entry.child_text("language").map(str::to_string),
            issued: entry.child_text("issued").map(str::to_string),
            summary: entry
                .child("summary")
                .or_else(|| entry.child("content"))
                .map(|s| s.text_content())
                .filter(|s| !s.is_empty()),
            updated: entry.child_text("updated").and_then(parse_timestamp),
            categories: entry
                .children_named("category")
                .filter_map(|c| {
                    c.attr("term").map(|term| OpdsCategory {
                        scheme: c.attr("scheme").map(str::to_string),
                        term: term.to_string(),
                        label: c.attr("label").map(str::to_string),
                    })
                })
                .collect(),
            cover_url: link_for(IMAGE_REL),
            open_access_url: link_for(OPEN_ACCESS_REL),
        }
    }
}

impl OpdsFeed {
    pub fn parse(xml: &str) -> Result<Self> {
        let root = XmlElement::parse(xml)?;
        let messages = root
            .children_named("message")
            .filter_map(|m| {
                let urn = m.child_text("id")?.to_string();
                let status_code = m
                    .child_text("status_code")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500);
                let message = m
                    .child_text("description")
                    .or_else(|| m.child_text("message"))
                    .unwrap_or_default()
                    .to_string();
                Some(OpdsMessage {
                    urn,
                    status_code,
                    message,
                })
            })
            .collect();

        Ok(OpdsFeed {
            entries: root.children_named("entry").map(OpdsEntry::from_element).collect(),
            messages,
            links: links_of(&root),
        })
    }

    pub fn next_links(&self) -> Vec<&str> {
        self.links
            .iter()
            .filter(|l| l.rel.as_deref() == Some(NEXT_REL))
            .map(|l| l.href.as_str())
            .collect()
    }
}

/// What importing one feed produced.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub editions: Vec<EditionId>,
    pub identifiers: Vec<IdentifierId>,
    /// urn -> (status code, message)
    pub messages: BTreeMap<String, (u16, String)>,
    /// The same messages keyed by the catalog identifier their URN parses to,
    /// however the server spelled the URN.
    pub identifier_messages: BTreeMap<IdentifierId, (u16, String)>,
    pub next_links: Vec<String>,
}

/// Turns OPDS entries into editions (and works) owned by one data source.
pub struct OPDSImporter {
    data_source: DataSource,
}

impl OPDSImporter {
    pub fn new(data_source: DataSource) -> Self {
        Self { data_source }
    }

    pub fn data_source(&self) -> DataSource {
        self.data_source
    }

    /// An entry is new if we have never seen its identifier, have no
    /// edition for it from this source, or our edition is older than the
    /// entry. With a cutoff, entries last updated before it are never new.
    pub fn entry_has_new_data(
        &self,
        catalog: &Catalog,
        entry: &OpdsEntry,
        cutoff: Option<DateTime<Utc>>,
    ) -> bool {
        if let (Some(cutoff), Some(updated)) = (cutoff, entry.updated) {
            if updated <= cutoff {
                return false;
            }
        }
        let Ok((r#type, value)) = crate::domain::model::Identifier::parse_urn(&entry.id) else {
            return false;
        };
        let Some(identifier_id) = catalog.find_identifier(r#type, &value) else {
            return true;
        };
        let Some(edition) = catalog
            .find_edition(self.data_source, identifier_id)
            .and_then(|id| catalog.edition(id))
        else {
            return true;
        };
        match (edition.updated, entry.updated) {
            (Some(ours), Some(theirs)) => theirs > ours,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }

    pub fn import_from_feed(&self, catalog: &mut Catalog, feed: &OpdsFeed) -> Result<ImportResult> {
        let mut result = ImportResult {
            next_links: feed.next_links().into_iter().map(str::to_string).collect(),
            ..Default::default()
        };

        for message in &feed.messages {
            let status = (message.status_code, message.message.clone());
            let known = Identifier::parse_urn(&message.urn)
                .ok()
                .and_then(|(r#type, value)| catalog.find_identifier(r#type, &value));
            if let Some(identifier_id) = known {
                result.identifier_messages.insert(identifier_id, status.clone());
            }
            result.messages.insert(message.urn.clone(), status);
        }

        for entry in &feed.entries {
            let identifier_id = match catalog.identifier_from_urn(&entry.id) {
                Ok((id, _)) => id,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping entry with bad id {:?}: {}", entry.id, e);
                    result
                        .messages
                        .insert(entry.id.clone(), (400, format!("Could not parse identifier: {}", e)));
                    continue;
                }
            };
            let edition_id = self.import_entry(catalog, identifier_id, entry)?;
            catalog.refresh_work_for_edition(edition_id)?;
            result.identifiers.push(identifier_id);
            result.editions.push(edition_id);
        }

        tracing::debug!(
            "📥 Imported {} entries, {} messages",
            result.editions.len(),
            result.messages.len()
        );
        Ok(result)
    }

    fn import_entry(
        &self,
        catalog: &mut Catalog,
        identifier_id: IdentifierId,
        entry: &OpdsEntry,
    ) -> Result<EditionId> {
        let mut contributor_ids = Vec::new();
        for author in &entry.authors {
            let sort_name = author
                .sort_name
                .clone()
                .or_else(|| author.name.as_deref().map(Contributor::sort_name_for));
            let id = catalog.contributor_lookup(sort_name.as_deref(), author.name.as_deref(), None)?;
            if let Some(c) = catalog.contributor_mut(id) {
                if c.display_name.is_none() {
                    c.display_name = author.name.clone();
                }
            }
            contributor_ids.push(id);
        }

        for category in &entry.categories {
            let subject_type = category
                .scheme
                .as_deref()
                .map_or(SubjectType::Tag, SubjectType::from_scheme);
            catalog.classify(
                identifier_id,
                self.data_source,
                subject_type,
                &category.term,
                category.label.as_deref(),
                1,
            );
        }
        if let Some(summary) = &entry.summary {
            catalog.add_description(identifier_id, self.data_source, summary);
        }

        let (edition_id, _) = catalog.edition_for(self.data_source, identifier_id)?;
        if let Some(edition) = catalog.edition_mut(edition_id) {
            edition.title = entry.title.clone().or(edition.title.take());
            edition.subtitle = entry.subtitle.clone().or(edition.subtitle.take());
            edition.publisher = entry.publisher.clone().or(edition.publisher.take());
            edition.language = entry.language.clone().or(edition.language.take());
            edition.issued = entry.issued.clone().or(edition.issued.take());
            edition.cover_url = entry.cover_url.clone().or(edition.cover_url.take());
            edition.open_access_url = entry.open_access_url.clone().or(edition.open_access_url.take());
            edition.updated = entry.updated.or(edition.updated);
            for id in contributor_ids {
                edition.add_contributor(id, AUTHOR_ROLE);
            }
        }
        Ok(edition_id)
    }
}
