use crate::adapters::http::HttpClient;
use crate::core::catalog::Catalog;
use crate::core::session::Session;
use crate::domain::model::{
    Contributor, DataSource, IdentifierId, IdentifierType, SubjectType, AUTHOR_ROLE,
};
use crate::domain::ports::{CoverageFailure, CoverageOutcome, CoverageProvider};
use crate::utils::error::{Result, WranglerError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub const SERVICE_NAME: &str = "OCLC Linked Data Coverage Provider";
pub const NO_DATA_EXCEPTION: &str = "No OCLC data found";
pub const CONTRIBUTOR_ROLE: &str = "Contributor";

const INPUT_TYPES: [IdentifierType; 3] = [
    IdentifierType::OclcWork,
    IdentifierType::OclcNumber,
    IdentifierType::Isbn,
];

#[derive(Debug, Clone, PartialEq)]
pub struct OclcSubject {
    pub subject_type: SubjectType,
    pub subject: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OclcCreator {
    pub sort_name: Option<String>,
    pub display_name: Option<String>,
    pub viaf: Option<String>,
    pub role: &'static str,
}

/// Everything one book (or work) node of the graph tells us.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OclcBook {
    pub uri: String,
    pub title: Option<String>,
    pub descriptions: Vec<String>,
    pub publisher: Option<String>,
    pub published: Option<String>,
    pub language: Option<String>,
    pub subjects: Vec<OclcSubject>,
    pub creators: Vec<OclcCreator>,
    pub isbns: Vec<String>,
    pub oclc_numbers: Vec<String>,
    pub oclc_works: Vec<String>,
}

impl OclcBook {
    /// The identifier the node's own URI names, if it is one we track.
    pub fn identifier(&self) -> Option<(IdentifierType, String)> {
        identifier_from_uri(&self.uri)
    }
}

/// Map a WorldCat URI to an identifier.
pub fn identifier_from_uri(uri: &str) -> Option<(IdentifierType, String)> {
    let trimmed = uri.trim_end_matches('/');
    let (head, last) = trimmed.rsplit_once('/')?;
    if last.is_empty() {
        return None;
    }
    if head.ends_with("/work/id") {
        Some((IdentifierType::OclcWork, last.to_string()))
    } else if head.ends_with("/oclc") {
        Some((IdentifierType::OclcNumber, last.to_string()))
    } else if head.ends_with("/isbn") {
        Some((IdentifierType::Isbn, normalize_isbn(last)))
    } else {
        None
    }
}

fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

/// The VIAF id inside a `viaf.org/viaf/<n>` URI.
pub fn viaf_id_from_uri(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("viaf.org/viaf/")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

fn prop<'a>(node: &'a Value, name: &str) -> Vec<&'a Value> {
    let keys = [
        format!("schema:{}", name),
        name.to_string(),
        format!("http://schema.org/{}", name),
    ];
    keys.iter()
        .filter_map(|k| node.get(k))
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn literal(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => match map.get("@value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        },
        _ => return None,
    };
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

fn reference(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.get("@id").and_then(Value::as_str),
        Value::String(s) if s.starts_with("http") || s.starts_with("_:") => Some(s),
        _ => None,
    }
}

fn has_type(node: &Value, wanted: &[&str]) -> bool {
    let types: Vec<&str> = match node.get("@type") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    types.iter().any(|t| {
        let local = t.rsplit([':', '/']).next().unwrap_or(t);
        wanted.contains(&local)
    })
}

/// A JSON-LD document from OCLC Linked Data, indexed by node id.
#[derive(Debug, Clone, Default)]
pub struct OclcGraph {
    nodes: Vec<Value>,
    by_id: HashMap<String, usize>,
}

impl OclcGraph {
    pub fn parse(body: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(body)?;
        let nodes: Vec<Value> = match document.get("@graph") {
            Some(Value::Array(nodes)) => nodes.clone(),
            Some(other) => vec![other.clone()],
            None if document.get("@id").is_some() => vec![document.clone()],
            None => Vec::new(),
        };
        let by_id = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.get("@id").and_then(Value::as_str).map(|id| (id.to_string(), i)))
            .collect();
        Ok(Self { nodes, by_id })
    }

    fn node(&self, id: &str) -> Option<&Value> {
        self.by_id.get(id).map(|i| &self.nodes[*i])
    }

    fn name_of(&self, value: &Value) -> Option<String> {
        match reference(value).and_then(|id| self.node(id)) {
            Some(node) => prop(node, "name").into_iter().find_map(literal),
            None => literal(value).filter(|s| !s.starts_with("http")),
        }
    }

    pub fn books(&self) -> Vec<OclcBook> {
        self.nodes
            .iter()
            .filter(|n| has_type(n, &["Book", "CreativeWork"]))
            .map(|n| self.book(n))
            .collect()
    }

    fn book(&self, node: &Value) -> OclcBook {
        let uri = node
            .get("@id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut book = OclcBook {
            title: prop(node, "name").into_iter().find_map(literal),
            descriptions: prop(node, "description").into_iter().filter_map(literal).collect(),
            publisher: prop(node, "publisher").into_iter().find_map(|v| self.name_of(v)),
            published: prop(node, "datePublished").into_iter().find_map(literal),
            language: prop(node, "inLanguage").into_iter().find_map(literal),
            ..Default::default()
        };

        for about in prop(node, "about") {
            if let Some(subject) = self.subject(about) {
                if !book.subjects.contains(&subject) {
                    book.subjects.push(subject);
                }
            }
        }
        for genre in prop(node, "genre").into_iter().filter_map(literal) {
            book.subjects.push(OclcSubject {
                subject_type: SubjectType::Tag,
                subject: genre,
                name: None,
            });
        }

        for (key, role) in [("creator", AUTHOR_ROLE), ("contributor", CONTRIBUTOR_ROLE)] {
            for value in prop(node, key) {
                if let Some(creator) = self.creator(value, role) {
                    book.creators.push(creator);
                }
            }
        }

        let mut isbns: Vec<String> = prop(node, "isbn").into_iter().filter_map(literal).collect();
        let mut oclc_numbers: Vec<String> = ["library:oclcnum", "oclcnum"]
            .iter()
            .filter_map(|k| node.get(*k))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(literal).collect::<Vec<_>>(),
                other => literal(other).into_iter().collect(),
            })
            .collect();
        let mut oclc_works = Vec::new();

        for example in prop(node, "workExample") {
            let Some(id) = reference(example) else { continue };
            match identifier_from_uri(id) {
                Some((IdentifierType::Isbn, isbn)) => isbns.push(isbn),
                Some((IdentifierType::OclcNumber, n)) => oclc_numbers.push(n),
                _ => {}
            }
            if let Some(example_node) = self.node(id) {
                isbns.extend(prop(example_node, "isbn").into_iter().filter_map(literal));
            }
        }
        for work in prop(node, "exampleOfWork") {
            if let Some((IdentifierType::OclcWork, n)) = reference(work).and_then(identifier_from_uri) {
                oclc_works.push(n);
            }
        }

        match identifier_from_uri(&uri) {
            Some((IdentifierType::OclcNumber, n)) => oclc_numbers.push(n),
            Some((IdentifierType::Isbn, isbn)) => isbns.push(isbn),
            _ => {}
        }

        book.isbns = dedup(isbns.iter().map(|i| normalize_isbn(i)).filter(|i| !i.is_empty()));
        book.oclc_numbers = dedup(oclc_numbers.into_iter());
        book.oclc_works = dedup(oclc_works.into_iter());
        book.uri = uri;
        book
    }

    fn subject(&self, value: &Value) -> Option<OclcSubject> {
        let Some(uri) = reference(value) else {
            return literal(value).map(|s| OclcSubject {
                subject_type: SubjectType::Tag,
                subject: s,
                name: None,
            });
        };
        let name = self.name_of(value);
        let tail = |marker: &str| {
            uri.split_once(marker)
                .map(|(_, rest)| rest.split('/').next().unwrap_or_default().to_string())
                .filter(|s| !s.is_empty())
        };

        if let Some(id) = tail("id.worldcat.org/fast/") {
            Some(OclcSubject { subject_type: SubjectType::Fast, subject: id, name })
        } else if let Some(class) = tail("dewey.info/class/") {
            Some(OclcSubject { subject_type: SubjectType::Ddc, subject: class, name })
        } else if let Some(id) = tail("id.loc.gov/authorities/subjects/") {
            Some(OclcSubject { subject_type: SubjectType::Lcsh, subject: id, name })
        } else {
            name.map(|n| OclcSubject {
                subject_type: SubjectType::Tag,
                subject: n,
                name: None,
            })
        }
    }

    fn creator(&self, value: &Value, role: &'static str) -> Option<OclcCreator> {
        let id = reference(value);
        let node = id.and_then(|id| self.node(id));

        let mut viaf = id.and_then(viaf_id_from_uri);
        let (name, family, given) = match node {
            Some(node) => {
                if viaf.is_none() {
                    viaf = prop(node, "sameAs")
                        .into_iter()
                        .filter_map(|v| reference(v).or(v.as_str()))
                        .find_map(viaf_id_from_uri);
                }
                (
                    prop(node, "name").into_iter().find_map(literal),
                    prop(node, "familyName").into_iter().find_map(literal),
                    prop(node, "givenName").into_iter().find_map(literal),
                )
            }
            None => (literal(value).filter(|s| !s.starts_with("http")), None, None),
        };

        let sort_name = match (&family, &given) {
            (Some(f), Some(g)) => Some(format!("{}, {}", f, g)),
            _ => name.as_deref().map(Contributor::sort_name_for),
        };
        let display_name = name.or_else(|| match (given, family) {
            (Some(g), Some(f)) => Some(format!("{} {}", g, f)),
            (None, Some(f)) => Some(f),
            _ => None,
        });

        if sort_name.is_none() && display_name.is_none() && viaf.is_none() {
            return None;
        }
        Some(OclcCreator {
            sort_name,
            display_name,
            viaf,
            role,
        })
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

pub struct OCLCLinkedDataClient {
    http: HttpClient,
    base_url: String,
}

impl OCLCLinkedDataClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, r#type: IdentifierType, value: &str) -> Result<String> {
        let path = match r#type {
            IdentifierType::OclcNumber => format!("oclc/{}", value),
            IdentifierType::OclcWork => format!("work/id/{}", value),
            IdentifierType::Isbn => format!("isbn/{}", value),
            other => {
                return Err(WranglerError::parse(
                    "OCLC lookup",
                    format!("cannot look up {} identifiers", other.as_str()),
                ))
            }
        };
        Ok(format!("{}/{}.jsonld", self.base_url, path))
    }

    /// `Ok(None)` when OCLC has never heard of the identifier.
    pub async fn lookup(&self, r#type: IdentifierType, value: &str) -> Result<Option<OclcGraph>> {
        let url = self.url_for(r#type, value)?;
        let response = self.http.get(&url).await?;
        if response.status == 404 {
            tracing::debug!("OCLC has nothing for {} {}", r#type.as_str(), value);
            return Ok(None);
        }
        let response = response.error_for_status("OCLC Linked Data")?;
        OclcGraph::parse(&response.body).map(Some)
    }
}

/// Write one book into the catalog under `identifier_id` (the identifier
/// that was looked up). Returns the id of the OCLC edition.
pub fn record_book(catalog: &mut Catalog, identifier_id: IdentifierId, book: &OclcBook) -> Result<u64> {
    let source = DataSource::OclcLinkedData;
    let book_identifier_id = match book.identifier() {
        Some((t, v)) => catalog.identifier_for(t, &v).0,
        None => identifier_id,
    };
    catalog.add_equivalency(identifier_id, book_identifier_id, source, 1.0);

    for isbn in &book.isbns {
        let (id, _) = catalog.identifier_for(IdentifierType::Isbn, isbn);
        catalog.add_equivalency(book_identifier_id, id, source, 1.0);
    }
    for number in &book.oclc_numbers {
        let (id, _) = catalog.identifier_for(IdentifierType::OclcNumber, number);
        catalog.add_equivalency(book_identifier_id, id, source, 1.0);
    }
    for work in &book.oclc_works {
        let (id, _) = catalog.identifier_for(IdentifierType::OclcWork, work);
        catalog.add_equivalency(book_identifier_id, id, source, 1.0);
    }

    let mut contributions = Vec::new();
    for creator in &book.creators {
        let contributor_id = catalog.contributor_lookup(
            creator.sort_name.as_deref(),
            creator.display_name.as_deref(),
            creator.viaf.as_deref(),
        )?;
        if let Some(contributor) = catalog.contributor_mut(contributor_id) {
            if contributor.display_name.is_none() {
                contributor.display_name = creator.display_name.clone();
            }
            if contributor.viaf.is_none() {
                contributor.viaf = creator.viaf.clone();
            }
        }
        contributions.push((contributor_id, creator.role));
    }

    let (edition_id, _) = catalog.edition_for(source, book_identifier_id)?;
    if let Some(edition) = catalog.edition_mut(edition_id) {
        if book.title.is_some() {
            edition.title = book.title.clone();
        }
        if book.publisher.is_some() {
            edition.publisher = book.publisher.clone();
        }
        if book.published.is_some() {
            edition.issued = book.published.clone();
        }
        if book.language.is_some() {
            edition.language = book.language.clone();
        }
        for (contributor_id, role) in contributions {
            edition.add_contributor(contributor_id, role);
        }
    }

    for subject in &book.subjects {
        catalog.classify(
            book_identifier_id,
            source,
            subject.subject_type,
            &subject.subject,
            subject.name.as_deref(),
            1,
        );
    }
    for description in &book.descriptions {
        catalog.add_description(book_identifier_id, source, description);
    }
    Ok(edition_id)
}

pub struct LinkedDataCoverageProvider {
    client: OCLCLinkedDataClient,
    batch_size: usize,
}

impl LinkedDataCoverageProvider {
    pub fn new(client: OCLCLinkedDataClient, batch_size: usize) -> Self {
        Self { client, batch_size }
    }

    async fn process_one(&self, catalog: &mut Catalog, identifier_id: IdentifierId) -> CoverageOutcome {
        let Some(identifier) = catalog.identifier(identifier_id).cloned() else {
            return CoverageOutcome::Failure(CoverageFailure::persistent(
                identifier_id,
                "Identifier vanished",
            ));
        };

        let graph = match self.client.lookup(identifier.r#type, &identifier.identifier).await {
            Ok(Some(graph)) => graph,
            Ok(None) => {
                return CoverageOutcome::Failure(CoverageFailure::persistent(
                    identifier_id,
                    NO_DATA_EXCEPTION,
                ))
            }
            Err(e @ (WranglerError::HttpError(_) | WranglerError::UpstreamError { .. })) => {
                return CoverageOutcome::Failure(CoverageFailure::transient(identifier_id, e.to_string()))
            }
            Err(e) => {
                return CoverageOutcome::Failure(CoverageFailure::persistent(identifier_id, e.to_string()))
            }
        };

        let books = graph.books();
        if books.is_empty() {
            return CoverageOutcome::Failure(CoverageFailure::persistent(
                identifier_id,
                NO_DATA_EXCEPTION,
            ));
        }
        for book in &books {
            if let Err(e) = record_book(catalog, identifier_id, book) {
                return CoverageOutcome::Failure(CoverageFailure::persistent(identifier_id, e.to_string()));
            }
        }
        tracing::debug!(
            "📥 {} book node(s) recorded for {}",
            books.len(),
            identifier.urn()
        );
        CoverageOutcome::Success(identifier_id)
    }
}

#[async_trait]
impl CoverageProvider for LinkedDataCoverageProvider {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn data_source(&self) -> DataSource {
        DataSource::OclcLinkedData
    }

    fn input_identifier_types(&self) -> &[IdentifierType] {
        &INPUT_TYPES
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn process_batch(
        &self,
        session: &mut Session,
        batch: &[IdentifierId],
    ) -> Result<Vec<CoverageOutcome>> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for identifier_id in batch {
            outcomes.push(self.process_one(&mut session.catalog, *identifier_id).await);
        }
        Ok(outcomes)
    }
}
