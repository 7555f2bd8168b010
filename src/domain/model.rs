use crate::utils::error::{Result, WranglerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

pub type IdentifierId = u64;
pub type EquivalencyId = u64;
pub type ContributorId = u64;
pub type EditionId = u64;
pub type WorkId = u64;
pub type ClassificationId = u64;
pub type DescriptionId = u64;
pub type CoverageRecordId = u64;
pub type CollectionId = u64;
pub type IntegrationClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentifierType {
    #[serde(rename = "Gutenberg ID")]
    Gutenberg,
    #[serde(rename = "Overdrive ID")]
    Overdrive,
    #[serde(rename = "3M ID")]
    ThreeM,
    #[serde(rename = "Axis 360 ID")]
    Axis360,
    #[serde(rename = "ISBN")]
    Isbn,
    #[serde(rename = "OCLC Work ID")]
    OclcWork,
    #[serde(rename = "OCLC Number")]
    OclcNumber,
    #[serde(rename = "ASIN")]
    Asin,
    #[serde(rename = "URI")]
    Uri,
}

impl IdentifierType {
    pub const ALL: [IdentifierType; 9] = [
        IdentifierType::Gutenberg,
        IdentifierType::Overdrive,
        IdentifierType::ThreeM,
        IdentifierType::Axis360,
        IdentifierType::Isbn,
        IdentifierType::OclcWork,
        IdentifierType::OclcNumber,
        IdentifierType::Asin,
        IdentifierType::Uri,
    ];

    /// Identifier types issued by a license source (the book's distributor).
    pub const LICENSE_SOURCES: [IdentifierType; 4] = [
        IdentifierType::Gutenberg,
        IdentifierType::Overdrive,
        IdentifierType::ThreeM,
        IdentifierType::Axis360,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Gutenberg => "Gutenberg ID",
            IdentifierType::Overdrive => "Overdrive ID",
            IdentifierType::ThreeM => "3M ID",
            IdentifierType::Axis360 => "Axis 360 ID",
            IdentifierType::Isbn => "ISBN",
            IdentifierType::OclcWork => "OCLC Work ID",
            IdentifierType::OclcNumber => "OCLC Number",
            IdentifierType::Asin => "ASIN",
            IdentifierType::Uri => "URI",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn is_license_source(&self) -> bool {
        Self::LICENSE_SOURCES.contains(self)
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ISBN_URN_PREFIX: &str = "urn:isbn:";
pub const SIMPLIFIED_URN_PREFIX: &str = "urn:librarysimplified.org/terms/id/";
pub const GUTENBERG_URL_PREFIX: &str = "http://www.gutenberg.org/ebooks/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub id: IdentifierId,
    pub r#type: IdentifierType,
    pub identifier: String,
}

impl Identifier {
    pub fn urn(&self) -> String {
        urn_for(self.r#type, &self.identifier)
    }

    /// 解析 URN 成 (類型, 識別碼)
    pub fn parse_urn(urn: &str) -> Result<(IdentifierType, String)> {
        let urn = urn.trim();
        if urn.is_empty() {
            return Err(WranglerError::parse("URN", "URN is empty"));
        }

        if let Some(isbn) = strip_prefix_ignore_case(urn, ISBN_URN_PREFIX) {
            let isbn: String = isbn.chars().filter(|c| *c != '-').collect();
            if isbn.is_empty() {
                return Err(WranglerError::parse("URN", format!("no ISBN in {}", urn)));
            }
            return Ok((IdentifierType::Isbn, isbn));
        }

        if let Some(rest) = urn.strip_prefix(SIMPLIFIED_URN_PREFIX) {
            let (type_part, identifier) = rest
                .split_once('/')
                .ok_or_else(|| WranglerError::parse("URN", format!("no identifier in {}", urn)))?;
            let type_name = percent_decode(type_part)?;
            let r#type = IdentifierType::from_name(&type_name).ok_or_else(|| {
                WranglerError::parse("URN", format!("unknown identifier type '{}'", type_name))
            })?;
            let identifier = percent_decode(identifier)?;
            if identifier.is_empty() {
                return Err(WranglerError::parse("URN", format!("no identifier in {}", urn)));
            }
            return Ok((r#type, identifier));
        }

        if let Some(id) = urn.strip_prefix(GUTENBERG_URL_PREFIX) {
            let id = id.trim_end_matches('/');
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                return Ok((IdentifierType::Gutenberg, id.to_string()));
            }
        }

        if urn.starts_with("urn:") || urn.starts_with("http://") || urn.starts_with("https://") {
            return Ok((IdentifierType::Uri, urn.to_string()));
        }

        Err(WranglerError::parse("URN", format!("'{}' is not a URN", urn)))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.r#type, self.identifier)
    }
}

pub fn urn_for(r#type: IdentifierType, identifier: &str) -> String {
    match r#type {
        IdentifierType::Isbn => format!("{}{}", ISBN_URN_PREFIX, identifier),
        IdentifierType::Uri => identifier.to_string(),
        other => format!(
            "{}{}/{}",
            SIMPLIFIED_URN_PREFIX,
            percent_encode(other.as_str()),
            percent_encode(identifier)
        ),
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

fn percent_decode(s: &str) -> Result<String> {
    urlencoding::decode(s)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| WranglerError::parse("URN", format!("'{}' is not UTF-8 once decoded: {}", s, e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataSource {
    Gutenberg,
    Overdrive,
    ThreeM,
    Axis360,
    OclcClassify,
    OclcLinkedData,
    Viaf,
    ContentServer,
    MetadataWrangler,
    LibraryStaff,
}

impl DataSource {
    pub fn name(&self) -> &'static str {
        match self {
            DataSource::Gutenberg => "Gutenberg",
            DataSource::Overdrive => "Overdrive",
            DataSource::ThreeM => "3M",
            DataSource::Axis360 => "Axis 360",
            DataSource::OclcClassify => "OCLC Classify",
            DataSource::OclcLinkedData => "OCLC Linked Data",
            DataSource::Viaf => "VIAF",
            DataSource::ContentServer => "Library Simplified Open Access Content Server",
            DataSource::MetadataWrangler => "Library Simplified metadata wrangler",
            DataSource::LibraryStaff => "Library staff",
        }
    }

    pub fn primary_identifier_type(&self) -> Option<IdentifierType> {
        match self {
            DataSource::Gutenberg => Some(IdentifierType::Gutenberg),
            DataSource::Overdrive => Some(IdentifierType::Overdrive),
            DataSource::ThreeM => Some(IdentifierType::ThreeM),
            DataSource::Axis360 => Some(IdentifierType::Axis360),
            _ => None,
        }
    }

    pub fn for_license_source(r#type: IdentifierType) -> Option<DataSource> {
        match r#type {
            IdentifierType::Gutenberg => Some(DataSource::Gutenberg),
            IdentifierType::Overdrive => Some(DataSource::Overdrive),
            IdentifierType::ThreeM => Some(DataSource::ThreeM),
            IdentifierType::Axis360 => Some(DataSource::Axis360),
            _ => None,
        }
    }

    pub fn is_oclc(&self) -> bool {
        matches!(self, DataSource::OclcClassify | DataSource::OclcLinkedData)
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equivalency {
    pub id: EquivalencyId,
    pub input_id: IdentifierId,
    pub output_id: IdentifierId,
    pub data_source: DataSource,
    pub strength: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub sort_name: Option<String>,
    pub display_name: Option<String>,
    pub family_name: Option<String>,
    pub wikipedia_name: Option<String>,
    pub viaf: Option<String>,
}

impl Contributor {
    /// Derive (family name, display name) from a "Family, Given" sort name.
    pub fn default_names(sort_name: &str) -> (String, String) {
        let sort_name = sort_name.trim();
        let parts: Vec<&str> = sort_name
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            // 去掉生卒年之類的部分
            .filter(|p| !p.chars().any(|c| c.is_ascii_digit()))
            .collect();

        match parts.as_slice() {
            [] => (sort_name.to_string(), sort_name.to_string()),
            [single] if !sort_name.contains(',') => {
                let family = single.split_whitespace().last().unwrap_or(single);
                (family.to_string(), single.to_string())
            }
            [family] => (family.to_string(), family.to_string()),
            [family, given, ..] => (family.to_string(), format!("{} {}", given, family)),
        }
    }

    /// "Jane Austen" -> "Austen, Jane". Names that already contain a comma
    /// are taken as sort names.
    pub fn sort_name_for(display_name: &str) -> String {
        let name = display_name.trim();
        if name.contains(',') {
            return name.to_string();
        }
        match name.rsplit_once(' ') {
            Some((given, family)) => format!("{}, {}", family.trim(), given.trim()),
            None => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor_id: ContributorId,
    pub role: String,
}

pub const AUTHOR_ROLE: &str = "Author";
pub const PRIMARY_AUTHOR_ROLE: &str = "Primary Author";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    pub id: EditionId,
    pub data_source: DataSource,
    pub primary_identifier_id: IdentifierId,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub issued: Option<String>,
    pub medium: Option<String>,
    pub contributions: Vec<Contribution>,
    pub cover_url: Option<String>,
    pub open_access_url: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

impl Edition {
    pub fn new(id: EditionId, data_source: DataSource, primary_identifier_id: IdentifierId) -> Self {
        Self {
            id,
            data_source,
            primary_identifier_id,
            title: None,
            subtitle: None,
            language: None,
            publisher: None,
            issued: None,
            medium: Some("Book".to_string()),
            contributions: Vec::new(),
            cover_url: None,
            open_access_url: None,
            updated: None,
        }
    }

    pub fn add_contributor(&mut self, contributor_id: ContributorId, role: &str) {
        let exists = self
            .contributions
            .iter()
            .any(|c| c.contributor_id == contributor_id && c.role == role);
        if !exists {
            self.contributions.push(Contribution {
                contributor_id,
                role: role.to_string(),
            });
        }
    }

    /// 已填寫欄位數，用來挑選展示用版本
    pub fn completeness(&self) -> usize {
        [
            self.title.is_some(),
            self.subtitle.is_some(),
            self.language.is_some(),
            self.publisher.is_some(),
            self.issued.is_some(),
            !self.contributions.is_empty(),
            self.cover_url.is_some(),
            self.open_access_url.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectType {
    #[serde(rename = "DDC")]
    Ddc,
    #[serde(rename = "LCC")]
    Lcc,
    #[serde(rename = "LCSH")]
    Lcsh,
    #[serde(rename = "FAST")]
    Fast,
    #[serde(rename = "schema:audience")]
    Audience,
    #[serde(rename = "tag")]
    Tag,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Ddc => "DDC",
            SubjectType::Lcc => "LCC",
            SubjectType::Lcsh => "LCSH",
            SubjectType::Fast => "FAST",
            SubjectType::Audience => "schema:audience",
            SubjectType::Tag => "tag",
        }
    }

    /// Map an OPDS category scheme URI onto a subject type.
    pub fn from_scheme(scheme: &str) -> SubjectType {
        let scheme = scheme.trim_end_matches('/').to_lowercase();
        if scheme.ends_with("/ddc") || scheme.contains("dewey.info") {
            SubjectType::Ddc
        } else if scheme.ends_with("/lcc") {
            SubjectType::Lcc
        } else if scheme.ends_with("/lcsh") || scheme.contains("id.loc.gov/authorities/subjects") {
            SubjectType::Lcsh
        } else if scheme.ends_with("/fast") || scheme.contains("id.worldcat.org/fast") {
            SubjectType::Fast
        } else if scheme.ends_with("schema.org/audience") || scheme.ends_with("schema:audience") {
            SubjectType::Audience
        } else {
            SubjectType::Tag
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: ClassificationId,
    pub identifier_id: IdentifierId,
    pub data_source: DataSource,
    pub subject_type: SubjectType,
    pub subject: String,
    pub name: Option<String>,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub id: DescriptionId,
    pub identifier_id: IdentifierId,
    pub data_source: DataSource,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    pub edition_ids: Vec<EditionId>,
    pub presentation_edition_id: Option<EditionId>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub sort_author: Option<String>,
    pub summary: Option<String>,
    pub fiction: Option<bool>,
    pub language: Option<String>,
    pub presentation_ready: bool,
    pub presentation_ready_exception: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "transient failure")]
    TransientFailure,
    #[serde(rename = "persistent failure")]
    PersistentFailure,
    #[serde(rename = "registered")]
    Registered,
}

impl CoverageStatus {
    /// Records in these states are picked up again by the next run.
    pub fn needs_retry(&self) -> bool {
        matches!(
            self,
            CoverageStatus::TransientFailure | CoverageStatus::Registered
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub id: CoverageRecordId,
    pub identifier_id: IdentifierId,
    pub data_source: DataSource,
    pub operation: Option<String>,
    pub collection_id: Option<CollectionId>,
    pub status: CoverageStatus,
    pub exception: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub protocol: String,
    pub metadata_identifier: String,
    pub catalog: BTreeSet<IdentifierId>,
}

impl Collection {
    pub const OPDS_IMPORT: &'static str = "OPDS Import";
    pub const OVERDRIVE: &'static str = "Overdrive";
    pub const BIBLIOTHECA: &'static str = "Bibliotheca";
    pub const AXIS_360: &'static str = "Axis 360";

    /// Unique, URL-safe name for a collection across every library that
    /// registers it.
    pub fn metadata_identifier_for(protocol: &str, name: &str) -> String {
        format!("{}:{}", percent_encode(protocol), percent_encode(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationClient {
    pub id: IntegrationClientId,
    pub url: String,
    pub shared_secret: String,
    pub created: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl IntegrationClient {
    /// Strip scheme, default port, leading `www.` and trailing slashes so
    /// that the same server registers once however its URL is written.
    pub fn normalize_url(raw: &str) -> String {
        let raw = raw.trim();
        let parsed = Url::parse(raw)
            .ok()
            .filter(Url::has_host)
            .or_else(|| Url::parse(&format!("http://{}", raw)).ok());
        let Some(url) = parsed else {
            return raw.to_lowercase().trim_end_matches('/').to_string();
        };

        let host = url.host_str().unwrap_or_default();
        let host = host.strip_prefix("www.").unwrap_or(host);
        let mut normalized = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        normalized.push_str(url.path().trim_end_matches('/'));
        if let Some(query) = url.query() {
            normalized.push('?');
            normalized.push_str(query);
        }
        normalized.to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub service: String,
    pub start: Option<DateTime<Utc>>,
    pub finish: Option<DateTime<Utc>>,
    pub counter: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier(r#type: IdentifierType, value: &str) -> Identifier {
        Identifier {
            id: 1,
            r#type,
            identifier: value.to_string(),
        }
    }

    #[test]
    fn test_urn_round_trip_for_every_type() {
        for t in IdentifierType::ALL {
            let value = if t == IdentifierType::Uri {
                "http://example.com/book/1"
            } else {
                "abc 123"
            };
            let urn = identifier(t, value).urn();
            let (parsed_type, parsed_value) = Identifier::parse_urn(&urn).unwrap();
            assert_eq!(parsed_type, t, "type mismatch for {}", urn);
            assert_eq!(parsed_value, value);
        }
    }

    #[test]
    fn test_urn_formats() {
        assert_eq!(
            identifier(IdentifierType::Isbn, "9780674368279").urn(),
            "urn:isbn:9780674368279"
        );
        assert_eq!(
            identifier(IdentifierType::Gutenberg, "1342").urn(),
            "urn:librarysimplified.org/terms/id/Gutenberg%20ID/1342"
        );
    }

    #[test]
    fn test_parse_urn_variants() {
        assert_eq!(
            Identifier::parse_urn("URN:ISBN:978-0-674-36827-9").unwrap(),
            (IdentifierType::Isbn, "9780674368279".to_string())
        );
        assert_eq!(
            Identifier::parse_urn("http://www.gutenberg.org/ebooks/1342").unwrap(),
            (IdentifierType::Gutenberg, "1342".to_string())
        );
        assert!(Identifier::parse_urn("").is_err());
        assert!(Identifier::parse_urn("not a urn").is_err());
        assert!(Identifier::parse_urn("urn:librarysimplified.org/terms/id/Bogus%20ID/1").is_err());
        assert!(Identifier::parse_urn("urn:librarysimplified.org/terms/id/3M%20ID/").is_err());
    }

    #[test]
    fn test_parse_urn_leaves_malformed_escapes_alone() {
        assert_eq!(
            Identifier::parse_urn("urn:librarysimplified.org/terms/id/Overdrive%20ID/a%+5b").unwrap(),
            (IdentifierType::Overdrive, "a%+5b".to_string())
        );
        assert_eq!(
            Identifier::parse_urn("urn:librarysimplified.org/terms/id/Overdrive ID/gone").unwrap(),
            (IdentifierType::Overdrive, "gone".to_string())
        );
        assert!(Identifier::parse_urn("urn:librarysimplified.org/terms/id/Overdrive%20ID/%FF").is_err());
    }

    #[test]
    fn test_sort_name_for() {
        assert_eq!(Contributor::sort_name_for("Jane Austen"), "Austen, Jane");
        assert_eq!(
            Contributor::sort_name_for("Mary Wollstonecraft Shelley"),
            "Shelley, Mary Wollstonecraft"
        );
        assert_eq!(Contributor::sort_name_for("Austen, Jane"), "Austen, Jane");
        assert_eq!(Contributor::sort_name_for("Plato"), "Plato");
    }

    #[test]
    fn test_default_names() {
        assert_eq!(
            Contributor::default_names("Austen, Jane"),
            ("Austen".to_string(), "Jane Austen".to_string())
        );
        assert_eq!(
            Contributor::default_names("Twain, Mark, 1835-1910"),
            ("Twain".to_string(), "Mark Twain".to_string())
        );
        assert_eq!(
            Contributor::default_names("Mindy Kaling"),
            ("Kaling".to_string(), "Mindy Kaling".to_string())
        );
        assert_eq!(
            Contributor::default_names("Plato"),
            ("Plato".to_string(), "Plato".to_string())
        );
    }

    #[test]
    fn test_normalize_client_url() {
        assert_eq!(
            IntegrationClient::normalize_url("https://www.Library.org/"),
            "library.org"
        );
        assert_eq!(
            IntegrationClient::normalize_url("http://circ.example.com/lib//"),
            "circ.example.com/lib"
        );
    }

    #[test]
    fn test_normalize_client_url_drops_default_port() {
        assert_eq!(
            IntegrationClient::normalize_url("https://Example.org:443/"),
            IntegrationClient::normalize_url("https://example.org/")
        );
        assert_eq!(
            IntegrationClient::normalize_url("http://example.org:8080/circ/"),
            "example.org:8080/circ"
        );
        assert_eq!(IntegrationClient::normalize_url("library.org"), "library.org");
    }

    #[test]
    fn test_subject_type_from_scheme() {
        assert_eq!(
            SubjectType::from_scheme("http://purl.org/dc/terms/LCSH"),
            SubjectType::Lcsh
        );
        assert_eq!(SubjectType::from_scheme("http://example.com/genres"), SubjectType::Tag);
        assert_eq!(
            SubjectType::from_scheme("http://librarysimplified.org/terms/ddc/"),
            SubjectType::Ddc
        );
        assert_eq!(
            SubjectType::from_scheme("http://schema.org/audience"),
            SubjectType::Audience
        );
    }
}
