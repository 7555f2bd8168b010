use crate::domain::model::*;
use crate::utils::error::{Result, WranglerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How many hops `equivalent_identifier_ids` follows.
pub const EQUIVALENCY_DEPTH: usize = 3;

type CoverageKey = (IdentifierId, DataSource, Option<String>, Option<CollectionId>);

fn coverage_key(
    identifier_id: IdentifierId,
    data_source: DataSource,
    operation: Option<&str>,
    collection_id: Option<CollectionId>,
) -> CoverageKey {
    (identifier_id, data_source, operation.map(str::to_string), collection_id)
}

/// Unique-key lookups over the tables. Never persisted; rebuilt whenever a
/// catalog is loaded.
#[derive(Debug, Clone, Default)]
struct CatalogIndex {
    identifiers: HashMap<(IdentifierType, String), IdentifierId>,
    editions: HashMap<(DataSource, IdentifierId), EditionId>,
    editions_by_identifier: HashMap<IdentifierId, BTreeSet<EditionId>>,
    equivalencies: HashMap<IdentifierId, BTreeSet<EquivalencyId>>,
    coverage: HashMap<CoverageKey, CoverageRecordId>,
}

impl CatalogIndex {
    fn add_edition(&mut self, edition: &Edition) {
        self.editions
            .insert((edition.data_source, edition.primary_identifier_id), edition.id);
        self.editions_by_identifier
            .entry(edition.primary_identifier_id)
            .or_default()
            .insert(edition.id);
    }

    fn add_equivalency(&mut self, e: &Equivalency) {
        self.equivalencies.entry(e.input_id).or_default().insert(e.id);
        self.equivalencies.entry(e.output_id).or_default().insert(e.id);
    }

    fn remove_equivalency(&mut self, e: &Equivalency) {
        for end in [e.input_id, e.output_id] {
            if let Some(ids) = self.equivalencies.get_mut(&end) {
                ids.remove(&e.id);
            }
        }
    }
}

/// The wrangler's catalog: every table the jobs read and write, held in
/// memory and persisted as one JSON document by the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StoredCatalog")]
pub struct Catalog {
    next_id: u64,
    identifiers: BTreeMap<IdentifierId, Identifier>,
    equivalencies: BTreeMap<EquivalencyId, Equivalency>,
    contributors: BTreeMap<ContributorId, Contributor>,
    editions: BTreeMap<EditionId, Edition>,
    classifications: BTreeMap<ClassificationId, Classification>,
    descriptions: BTreeMap<DescriptionId, Description>,
    works: BTreeMap<WorkId, Work>,
    coverage_records: BTreeMap<CoverageRecordId, CoverageRecord>,
    collections: BTreeMap<CollectionId, Collection>,
    integration_clients: BTreeMap<IntegrationClientId, IntegrationClient>,
    timestamps: BTreeMap<String, Timestamp>,
    #[serde(skip)]
    index: CatalogIndex,
}

/// The persisted tables, without the index.
#[derive(Deserialize)]
struct StoredCatalog {
    next_id: u64,
    identifiers: BTreeMap<IdentifierId, Identifier>,
    equivalencies: BTreeMap<EquivalencyId, Equivalency>,
    contributors: BTreeMap<ContributorId, Contributor>,
    editions: BTreeMap<EditionId, Edition>,
    classifications: BTreeMap<ClassificationId, Classification>,
    descriptions: BTreeMap<DescriptionId, Description>,
    works: BTreeMap<WorkId, Work>,
    coverage_records: BTreeMap<CoverageRecordId, CoverageRecord>,
    collections: BTreeMap<CollectionId, Collection>,
    integration_clients: BTreeMap<IntegrationClientId, IntegrationClient>,
    timestamps: BTreeMap<String, Timestamp>,
}

impl From<StoredCatalog> for Catalog {
    fn from(stored: StoredCatalog) -> Self {
        let mut catalog = Catalog {
            next_id: stored.next_id,
            identifiers: stored.identifiers,
            equivalencies: stored.equivalencies,
            contributors: stored.contributors,
            editions: stored.editions,
            classifications: stored.classifications,
            descriptions: stored.descriptions,
            works: stored.works,
            coverage_records: stored.coverage_records,
            collections: stored.collections,
            integration_clients: stored.integration_clients,
            timestamps: stored.timestamps,
            index: CatalogIndex::default(),
        };
        catalog.rebuild_index();
        catalog
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild_index(&mut self) {
        let mut index = CatalogIndex::default();
        for i in self.identifiers.values() {
            index.identifiers.insert((i.r#type, i.identifier.clone()), i.id);
        }
        for e in self.editions.values() {
            index.add_edition(e);
        }
        for e in self.equivalencies.values() {
            index.add_equivalency(e);
        }
        for r in self.coverage_records.values() {
            index.coverage.insert(
                coverage_key(r.identifier_id, r.data_source, r.operation.as_deref(), r.collection_id),
                r.id,
            );
        }
        self.index = index;
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ---- identifiers -------------------------------------------------

    pub fn identifier(&self, id: IdentifierId) -> Option<&Identifier> {
        self.identifiers.get(&id)
    }

    pub fn find_identifier(&self, r#type: IdentifierType, value: &str) -> Option<IdentifierId> {
        self.index
            .identifiers
            .get(&(r#type, value.to_string()))
            .copied()
    }

    /// Get or create an identifier. Returns `(id, is_new)`.
    pub fn identifier_for(&mut self, r#type: IdentifierType, value: &str) -> (IdentifierId, bool) {
        if let Some(id) = self.find_identifier(r#type, value) {
            return (id, false);
        }
        let id = self.allocate_id();
        self.index.identifiers.insert((r#type, value.to_string()), id);
        self.identifiers.insert(
            id,
            Identifier {
                id,
                r#type,
                identifier: value.to_string(),
            },
        );
        (id, true)
    }

    pub fn identifier_from_urn(&mut self, urn: &str) -> Result<(IdentifierId, bool)> {
        let (r#type, value) = Identifier::parse_urn(urn)?;
        Ok(self.identifier_for(r#type, &value))
    }

    pub fn identifiers_of_types(&self, types: &[IdentifierType]) -> Vec<IdentifierId> {
        self.identifiers
            .values()
            .filter(|i| types.contains(&i.r#type))
            .map(|i| i.id)
            .collect()
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.len()
    }

    // ---- equivalencies -----------------------------------------------

    pub fn add_equivalency(
        &mut self,
        input_id: IdentifierId,
        output_id: IdentifierId,
        data_source: DataSource,
        strength: f64,
    ) -> Option<EquivalencyId> {
        if input_id == output_id {
            return None;
        }
        let existing = self.index.equivalencies.get(&input_id).and_then(|ids| {
            ids.iter().copied().find(|id| {
                self.equivalencies.get(id).is_some_and(|e| {
                    e.input_id == input_id && e.output_id == output_id && e.data_source == data_source
                })
            })
        });
        if let Some(e) = existing.and_then(|id| self.equivalencies.get_mut(&id)) {
            e.strength = strength;
            return Some(e.id);
        }
        let id = self.allocate_id();
        let equivalency = Equivalency {
            id,
            input_id,
            output_id,
            data_source,
            strength,
        };
        self.index.add_equivalency(&equivalency);
        self.equivalencies.insert(id, equivalency);
        Some(id)
    }

    pub fn equivalencies_for(&self, identifier_id: IdentifierId) -> Vec<&Equivalency> {
        self.index
            .equivalencies
            .get(&identifier_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.equivalencies.get(id))
            .collect()
    }

    /// The identifier itself plus everything reachable through
    /// equivalencies (either direction) within `EQUIVALENCY_DEPTH` hops.
    pub fn equivalent_identifier_ids(&self, identifier_id: IdentifierId) -> BTreeSet<IdentifierId> {
        let mut seen = BTreeSet::from([identifier_id]);
        let mut frontier = vec![identifier_id];
        for _ in 0..EQUIVALENCY_DEPTH {
            let mut next = Vec::new();
            for id in frontier {
                for e in self.equivalencies_for(id) {
                    let other = if e.input_id == id { e.output_id } else { e.input_id };
                    if seen.insert(other) {
                        next.push(other);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        seen
    }

    pub fn equivalents_of_type(
        &self,
        identifier_id: IdentifierId,
        r#type: IdentifierType,
    ) -> Vec<IdentifierId> {
        self.equivalent_identifier_ids(identifier_id)
            .into_iter()
            .filter(|id| self.identifier(*id).is_some_and(|i| i.r#type == r#type))
            .collect()
    }

    /// Remove the equivalencies touching `identifier_id` whose data source
    /// matches. The identifiers themselves stay.
    pub fn remove_equivalencies(
        &mut self,
        identifier_id: IdentifierId,
        matches: impl Fn(DataSource) -> bool,
    ) -> usize {
        let doomed: Vec<EquivalencyId> = self
            .equivalencies_for(identifier_id)
            .into_iter()
            .filter(|e| matches(e.data_source))
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            if let Some(e) = self.equivalencies.remove(id) {
                self.index.remove_equivalency(&e);
            }
        }
        doomed.len()
    }

    // ---- contributors ------------------------------------------------

    pub fn contributor(&self, id: ContributorId) -> Option<&Contributor> {
        self.contributors.get(&id)
    }

    pub fn contributor_mut(&mut self, id: ContributorId) -> Option<&mut Contributor> {
        self.contributors.get_mut(&id)
    }

    pub fn contributor_ids(&self) -> Vec<ContributorId> {
        self.contributors.keys().copied().collect()
    }

    /// Find a contributor by VIAF id, then by sort name; create one if
    /// neither matches.
    pub fn contributor_lookup(
        &mut self,
        sort_name: Option<&str>,
        display_name: Option<&str>,
        viaf: Option<&str>,
    ) -> Result<ContributorId> {
        if sort_name.is_none() && display_name.is_none() && viaf.is_none() {
            return Err(WranglerError::parse(
                "contributor",
                "a contributor needs a name or a VIAF id",
            ));
        }
        if let Some(viaf) = viaf {
            if let Some(c) = self
                .contributors
                .values()
                .find(|c| c.viaf.as_deref() == Some(viaf))
            {
                return Ok(c.id);
            }
        }
        if let Some(sort_name) = sort_name {
            if let Some(c) = self
                .contributors
                .values_mut()
                .find(|c| c.sort_name.as_deref() == Some(sort_name))
            {
                if c.viaf.is_none() {
                    c.viaf = viaf.map(str::to_string);
                }
                return Ok(c.id);
            }
        } else if let Some(display_name) = display_name {
            if let Some(c) = self
                .contributors
                .values()
                .find(|c| c.display_name.as_deref() == Some(display_name))
            {
                return Ok(c.id);
            }
        }
        let id = self.allocate_id();
        self.contributors.insert(
            id,
            Contributor {
                id,
                sort_name: sort_name.map(str::to_string),
                display_name: display_name.map(str::to_string),
                viaf: viaf.map(str::to_string),
                ..Default::default()
            },
        );
        Ok(id)
    }

    pub fn contributors_with_viaf(&self, viaf: &str) -> Vec<ContributorId> {
        self.contributors
            .values()
            .filter(|c| c.viaf.as_deref() == Some(viaf))
            .map(|c| c.id)
            .collect()
    }

    /// Editions crediting the contributor.
    pub fn editions_by_contributor(&self, contributor_id: ContributorId) -> Vec<EditionId> {
        self.editions
            .values()
            .filter(|e| e.contributions.iter().any(|c| c.contributor_id == contributor_id))
            .map(|e| e.id)
            .collect()
    }

    /// Move every contribution from `from` to `into` and delete `from`.
    pub fn merge_contributor(&mut self, from: ContributorId, into: ContributorId) -> Result<()> {
        if from == into {
            return Ok(());
        }
        if !self.contributors.contains_key(&into) {
            return Err(WranglerError::not_found("contributor", into));
        }
        self.contributors
            .remove(&from)
            .ok_or_else(|| WranglerError::not_found("contributor", from))?;
        for edition in self.editions.values_mut() {
            let moved: Vec<String> = edition
                .contributions
                .iter()
                .filter(|c| c.contributor_id == from)
                .map(|c| c.role.clone())
                .collect();
            edition.contributions.retain(|c| c.contributor_id != from);
            for role in moved {
                edition.add_contributor(into, &role);
            }
        }
        Ok(())
    }

    // ---- editions ----------------------------------------------------

    pub fn edition(&self, id: EditionId) -> Option<&Edition> {
        self.editions.get(&id)
    }

    pub fn edition_mut(&mut self, id: EditionId) -> Option<&mut Edition> {
        self.editions.get_mut(&id)
    }

    pub fn find_edition(
        &self,
        data_source: DataSource,
        identifier_id: IdentifierId,
    ) -> Option<EditionId> {
        self.index.editions.get(&(data_source, identifier_id)).copied()
    }

    /// Get or create the edition `data_source` describes for an identifier.
    pub fn edition_for(
        &mut self,
        data_source: DataSource,
        identifier_id: IdentifierId,
    ) -> Result<(EditionId, bool)> {
        if !self.identifiers.contains_key(&identifier_id) {
            return Err(WranglerError::not_found("identifier", identifier_id));
        }
        if let Some(id) = self.find_edition(data_source, identifier_id) {
            return Ok((id, false));
        }
        let id = self.allocate_id();
        let edition = Edition::new(id, data_source, identifier_id);
        self.index.add_edition(&edition);
        self.editions.insert(id, edition);
        Ok((id, true))
    }

    pub fn editions_for_identifier(&self, identifier_id: IdentifierId) -> Vec<EditionId> {
        self.index
            .editions_by_identifier
            .get(&identifier_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn edition_ids(&self) -> Vec<EditionId> {
        self.editions.keys().copied().collect()
    }

    // ---- classifications & descriptions -------------------------------

    pub fn classify(
        &mut self,
        identifier_id: IdentifierId,
        data_source: DataSource,
        subject_type: SubjectType,
        subject: &str,
        name: Option<&str>,
        weight: u32,
    ) -> ClassificationId {
        if let Some(existing) = self.classifications.values_mut().find(|c| {
            c.identifier_id == identifier_id
                && c.data_source == data_source
                && c.subject_type == subject_type
                && c.subject == subject
        }) {
            existing.weight = weight;
            if existing.name.is_none() {
                existing.name = name.map(str::to_string);
            }
            return existing.id;
        }
        let id = self.allocate_id();
        self.classifications.insert(
            id,
            Classification {
                id,
                identifier_id,
                data_source,
                subject_type,
                subject: subject.to_string(),
                name: name.map(str::to_string),
                weight,
            },
        );
        id
    }

    pub fn classifications_for<'a>(
        &'a self,
        identifier_ids: &'a BTreeSet<IdentifierId>,
    ) -> impl Iterator<Item = &'a Classification> + 'a {
        self.classifications
            .values()
            .filter(move |c| identifier_ids.contains(&c.identifier_id))
    }

    pub fn add_description(
        &mut self,
        identifier_id: IdentifierId,
        data_source: DataSource,
        content: &str,
    ) -> DescriptionId {
        if let Some(existing) = self.descriptions.values().find(|d| {
            d.identifier_id == identifier_id && d.data_source == data_source && d.content == content
        }) {
            return existing.id;
        }
        let id = self.allocate_id();
        self.descriptions.insert(
            id,
            Description {
                id,
                identifier_id,
                data_source,
                content: content.to_string(),
            },
        );
        id
    }

    pub fn descriptions_for<'a>(
        &'a self,
        identifier_ids: &'a BTreeSet<IdentifierId>,
    ) -> impl Iterator<Item = &'a Description> + 'a {
        self.descriptions
            .values()
            .filter(move |d| identifier_ids.contains(&d.identifier_id))
    }

    // ---- works -------------------------------------------------------

    pub fn work(&self, id: WorkId) -> Option<&Work> {
        self.works.get(&id)
    }

    pub fn works(&self) -> impl Iterator<Item = &Work> {
        self.works.values()
    }

    pub fn work_for_edition_id(&self, edition_id: EditionId) -> Option<WorkId> {
        self.works
            .values()
            .find(|w| w.edition_ids.contains(&edition_id))
            .map(|w| w.id)
    }

    /// Find the work an edition belongs to. An edition whose identifier is
    /// equivalent to one already in a work joins that work; otherwise a new
    /// work is created.
    pub fn work_for_edition(&mut self, edition_id: EditionId) -> Result<WorkId> {
        let primary_identifier_id = self
            .edition(edition_id)
            .ok_or_else(|| WranglerError::not_found("edition", edition_id))?
            .primary_identifier_id;
        if let Some(work_id) = self.work_for_edition_id(edition_id) {
            return Ok(work_id);
        }

        let equivalents = self.equivalent_identifier_ids(primary_identifier_id);
        let existing = self
            .works
            .values()
            .find(|w| {
                w.edition_ids.iter().any(|e| {
                    self.editions
                        .get(e)
                        .is_some_and(|e| equivalents.contains(&e.primary_identifier_id))
                })
            })
            .map(|w| w.id);

        let work_id = match existing {
            Some(id) => id,
            None => {
                let id = self.allocate_id();
                self.works.insert(
                    id,
                    Work {
                        id,
                        ..Default::default()
                    },
                );
                id
            }
        };
        if let Some(work) = self.works.get_mut(&work_id) {
            work.edition_ids.push(edition_id);
        }
        Ok(work_id)
    }

    pub(crate) fn work_mut(&mut self, id: WorkId) -> Option<&mut Work> {
        self.works.get_mut(&id)
    }

    // ---- coverage records --------------------------------------------

    pub fn coverage_record(
        &self,
        identifier_id: IdentifierId,
        data_source: DataSource,
        operation: Option<&str>,
        collection_id: Option<CollectionId>,
    ) -> Option<&CoverageRecord> {
        self.index
            .coverage
            .get(&coverage_key(identifier_id, data_source, operation, collection_id))
            .and_then(|id| self.coverage_records.get(id))
    }

    /// Insert or update the coverage record for this key.
    #[allow(clippy::too_many_arguments)]
    pub fn add_coverage_record(
        &mut self,
        identifier_id: IdentifierId,
        data_source: DataSource,
        operation: Option<&str>,
        collection_id: Option<CollectionId>,
        status: CoverageStatus,
        exception: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> CoverageRecordId {
        let key = coverage_key(identifier_id, data_source, operation, collection_id);
        if let Some(existing) = self
            .index
            .coverage
            .get(&key)
            .and_then(|id| self.coverage_records.get_mut(id))
        {
            existing.status = status;
            existing.exception = exception;
            existing.timestamp = timestamp;
            return existing.id;
        }
        let id = self.allocate_id();
        self.index.coverage.insert(key, id);
        self.coverage_records.insert(
            id,
            CoverageRecord {
                id,
                identifier_id,
                data_source,
                operation: operation.map(str::to_string),
                collection_id,
                status,
                exception,
                timestamp,
            },
        );
        id
    }

    pub fn remove_coverage_records(
        &mut self,
        identifier_id: IdentifierId,
        data_source: DataSource,
    ) -> usize {
        let before = self.coverage_records.len();
        self.coverage_records
            .retain(|_, r| !(r.identifier_id == identifier_id && r.data_source == data_source));
        self.index
            .coverage
            .retain(|(id, source, _, _), _| !(*id == identifier_id && *source == data_source));
        before - self.coverage_records.len()
    }

    pub fn coverage_records(&self) -> impl Iterator<Item = &CoverageRecord> {
        self.coverage_records.values()
    }

    // ---- collections -------------------------------------------------

    pub fn add_collection(&mut self, name: &str, protocol: &str) -> CollectionId {
        let metadata_identifier = Collection::metadata_identifier_for(protocol, name);
        if let Some(existing) = self.collection_by_metadata_identifier(&metadata_identifier) {
            return existing.id;
        }
        let id = self.allocate_id();
        self.collections.insert(
            id,
            Collection {
                id,
                name: name.to_string(),
                protocol: protocol.to_string(),
                metadata_identifier,
                catalog: BTreeSet::new(),
            },
        );
        id
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.get(&id)
    }

    pub fn collection_by_metadata_identifier(&self, metadata_identifier: &str) -> Option<&Collection> {
        self.collections
            .values()
            .find(|c| c.metadata_identifier == metadata_identifier)
    }

    /// Collections in id order, optionally restricted to one protocol.
    pub fn collections_with_protocol(&self, protocol: Option<&str>) -> Vec<CollectionId> {
        self.collections
            .values()
            .filter(|c| protocol.map_or(true, |p| c.protocol == p))
            .map(|c| c.id)
            .collect()
    }

    pub fn catalog_identifier(
        &mut self,
        collection_id: CollectionId,
        identifier_id: IdentifierId,
    ) -> Result<bool> {
        if !self.identifiers.contains_key(&identifier_id) {
            return Err(WranglerError::not_found("identifier", identifier_id));
        }
        let collection = self
            .collections
            .get_mut(&collection_id)
            .ok_or_else(|| WranglerError::not_found("collection", collection_id))?;
        Ok(collection.catalog.insert(identifier_id))
    }

    // ---- integration clients -----------------------------------------

    pub fn integration_client_by_url(&self, url: &str) -> Option<&IntegrationClient> {
        let normalized = IntegrationClient::normalize_url(url);
        self.integration_clients
            .values()
            .find(|c| c.url == normalized)
    }

    /// Register a client for `url`. An already registered url keeps its
    /// secret. Returns `(client, is_new)`.
    pub fn register_integration_client(
        &mut self,
        url: &str,
        shared_secret: impl FnOnce() -> String,
        now: DateTime<Utc>,
    ) -> (IntegrationClient, bool) {
        if let Some(existing) = self.integration_client_by_url(url) {
            return (existing.clone(), false);
        }
        let id = self.allocate_id();
        let client = IntegrationClient {
            id,
            url: IntegrationClient::normalize_url(url),
            shared_secret: shared_secret(),
            created: now,
            last_accessed: None,
        };
        self.integration_clients.insert(id, client.clone());
        (client, true)
    }

    // ---- timestamps --------------------------------------------------

    pub fn timestamp(&self, service: &str) -> Option<&Timestamp> {
        self.timestamps.get(service)
    }

    pub fn update_timestamp(
        &mut self,
        service: &str,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        counter: Option<u64>,
    ) {
        let entry = self
            .timestamps
            .entry(service.to_string())
            .or_insert_with(|| Timestamp {
                service: service.to_string(),
                ..Default::default()
            });
        if start.is_some() {
            entry.start = start;
        }
        entry.finish = finish;
        if counter.is_some() {
            entry.counter = counter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_for_is_idempotent() {
        let mut catalog = Catalog::new();
        let (a, new_a) = catalog.identifier_for(IdentifierType::Isbn, "9780674368279");
        let (b, new_b) = catalog.identifier_for(IdentifierType::Isbn, "9780674368279");
        assert_eq!(a, b);
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(catalog.identifier_count(), 1);
    }

    #[test]
    fn test_equivalents_are_transitive_and_bounded() {
        let mut catalog = Catalog::new();
        let ids: Vec<IdentifierId> = (0..6)
            .map(|n| catalog.identifier_for(IdentifierType::OclcNumber, &n.to_string()).0)
            .collect();
        for pair in ids.windows(2) {
            catalog.add_equivalency(pair[0], pair[1], DataSource::OclcLinkedData, 1.0);
        }

        let equivalents = catalog.equivalent_identifier_ids(ids[0]);
        // 自己加上三層
        assert_eq!(equivalents, ids[..4].iter().copied().collect());

        // 反方向也可以
        assert!(catalog.equivalent_identifier_ids(ids[2]).contains(&ids[0]));
    }

    #[test]
    fn test_self_equivalency_is_ignored() {
        let mut catalog = Catalog::new();
        let (id, _) = catalog.identifier_for(IdentifierType::Isbn, "1");
        assert!(catalog
            .add_equivalency(id, id, DataSource::OclcLinkedData, 1.0)
            .is_none());
    }

    #[test]
    fn test_remove_equivalencies_keeps_identifiers() {
        let mut catalog = Catalog::new();
        let (threem, _) = catalog.identifier_for(IdentifierType::ThreeM, "abc");
        let (isbn, _) = catalog.identifier_for(IdentifierType::Isbn, "123");
        let (oclc, _) = catalog.identifier_for(IdentifierType::OclcNumber, "456");
        catalog.add_equivalency(threem, isbn, DataSource::ThreeM, 1.0);
        catalog.add_equivalency(threem, oclc, DataSource::OclcClassify, 0.5);

        let removed = catalog.remove_equivalencies(threem, |ds| ds.is_oclc());

        assert_eq!(removed, 1);
        assert!(catalog.identifier(oclc).is_some());
        assert_eq!(catalog.equivalencies_for(threem).len(), 1);
    }

    #[test]
    fn test_coverage_record_upsert() {
        let mut catalog = Catalog::new();
        let (id, _) = catalog.identifier_for(IdentifierType::Isbn, "1");
        let now = Utc::now();
        let first = catalog.add_coverage_record(
            id,
            DataSource::OclcLinkedData,
            None,
            None,
            CoverageStatus::TransientFailure,
            Some("timeout".to_string()),
            now,
        );
        let second = catalog.add_coverage_record(
            id,
            DataSource::OclcLinkedData,
            None,
            None,
            CoverageStatus::Success,
            None,
            now,
        );
        assert_eq!(first, second);
        let record = catalog
            .coverage_record(id, DataSource::OclcLinkedData, None, None)
            .unwrap();
        assert_eq!(record.status, CoverageStatus::Success);
        assert!(record.exception.is_none());
    }

    #[test]
    fn test_merge_contributor_moves_contributions() {
        let mut catalog = Catalog::new();
        let (id, _) = catalog.identifier_for(IdentifierType::Gutenberg, "1");
        let (edition, _) = catalog.edition_for(DataSource::Gutenberg, id).unwrap();
        let dupe = catalog
            .contributor_lookup(Some("Kaling, Mindy"), None, None)
            .unwrap();
        let keeper = catalog
            .contributor_lookup(Some("Kaling, M."), None, Some("9581122"))
            .unwrap();
        catalog
            .edition_mut(edition)
            .unwrap()
            .add_contributor(dupe, AUTHOR_ROLE);

        catalog.merge_contributor(dupe, keeper).unwrap();

        assert!(catalog.contributor(dupe).is_none());
        let contributions = &catalog.edition(edition).unwrap().contributions;
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].contributor_id, keeper);
    }

    #[test]
    fn test_work_for_equivalent_editions_is_shared() {
        let mut catalog = Catalog::new();
        let (gutenberg, _) = catalog.identifier_for(IdentifierType::Gutenberg, "1342");
        let (isbn, _) = catalog.identifier_for(IdentifierType::Isbn, "9780141439518");
        catalog.add_equivalency(gutenberg, isbn, DataSource::OclcLinkedData, 1.0);
        let (e1, _) = catalog.edition_for(DataSource::Gutenberg, gutenberg).unwrap();
        let (e2, _) = catalog.edition_for(DataSource::OclcLinkedData, isbn).unwrap();

        let w1 = catalog.work_for_edition(e1).unwrap();
        let w2 = catalog.work_for_edition(e2).unwrap();

        assert_eq!(w1, w2);
        assert_eq!(catalog.work(w1).unwrap().edition_ids, vec![e1, e2]);
    }

    #[test]
    fn test_register_integration_client_keeps_secret() {
        let mut catalog = Catalog::new();
        let now = Utc::now();
        let (first, is_new) =
            catalog.register_integration_client("https://library.org/", || "s1".to_string(), now);
        let (second, again) =
            catalog.register_integration_client("http://www.library.org", || "s2".to_string(), now);
        assert!(is_new);
        assert!(!again);
        assert_eq!(first.id, second.id);
        assert_eq!(second.shared_secret, "s1");
    }

    #[test]
    fn test_catalog_survives_json_round_trip() {
        let mut catalog = Catalog::new();
        let (id, _) = catalog.identifier_for(IdentifierType::Overdrive, "abc");
        let collection = catalog.add_collection("Main", Collection::OVERDRIVE);
        catalog.catalog_identifier(collection, id).unwrap();

        let (isbn, _) = catalog.identifier_for(IdentifierType::Isbn, "9780261102354");
        catalog.add_equivalency(id, isbn, DataSource::OclcLinkedData, 1.0);
        let (edition, _) = catalog.edition_for(DataSource::Overdrive, id).unwrap();
        catalog.add_coverage_record(
            isbn,
            DataSource::OclcLinkedData,
            None,
            Some(collection),
            CoverageStatus::Success,
            None,
            Utc::now(),
        );

        let json = serde_json::to_string(&catalog).unwrap();
        assert!(!json.contains("index"));
        let mut restored: Catalog = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.find_identifier(IdentifierType::Overdrive, "abc"), Some(id));
        assert!(restored.collection(collection).unwrap().catalog.contains(&id));
        assert_eq!(restored.find_edition(DataSource::Overdrive, id), Some(edition));
        assert_eq!(restored.editions_for_identifier(id), vec![edition]);
        assert!(restored.equivalent_identifier_ids(id).contains(&isbn));
        assert!(restored
            .coverage_record(isbn, DataSource::OclcLinkedData, None, Some(collection))
            .is_some());

        // the rebuilt index keeps lookups unique after reload
        assert_eq!(restored.identifier_for(IdentifierType::Isbn, "9780261102354"), (isbn, false));
        assert_eq!(restored.edition_for(DataSource::Overdrive, id).unwrap(), (edition, false));
        assert_eq!(restored.remove_equivalencies(isbn, |ds| ds.is_oclc()), 1);
        assert!(restored.equivalencies_for(id).is_empty());
        assert_eq!(restored.remove_coverage_records(isbn, DataSource::OclcLinkedData), 1);
        assert!(restored
            .coverage_record(isbn, DataSource::OclcLinkedData, None, Some(collection))
            .is_none());
    }
}
