//! Identifier-driven batch fetches.
//!
//! An [`EntityFetcher`] turns a set of identifiers into chunked `in`-filter
//! queries, drives each chunk through the pagination engine, and reduces the
//! pages back into a key-ordered map. A chunk that fails is logged and
//! contributes no records; it never aborts the batch.

mod priority;

pub use priority::{DedupPriority, DedupRule};

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{ApiClient, ApiError};
use crate::paginate::{ItemsKey, PaginationRequest, Record, key_string};

/// Default number of identifiers per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 50;
/// Default ceiling on identifiers per chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct SecondaryKey {
    field: String,
    filter_param: String,
}

/// Fetches entities of one resource by identifier.
#[derive(Debug, Clone)]
pub struct EntityFetcher {
    client: ApiClient,
    path: String,
    items_key: ItemsKey,
    id_field: String,
    filter_param: String,
    chunk_size: usize,
    priority: DedupPriority,
    secondary: Option<SecondaryKey>,
    extra_params: Vec<(String, String)>,
}

impl EntityFetcher {
    /// Start building a fetcher for the listing at `path`.
    ///
    /// Records are keyed on `id_field` and filtered with `<id_field>__in` unless
    /// [`EntityFetcherBuilder::filter_param`] says otherwise.
    pub fn builder(
        client: ApiClient,
        path: impl Into<String>,
        items_key: ItemsKey,
        id_field: impl Into<String>,
    ) -> EntityFetcherBuilder {
        let id_field = id_field.into();
        EntityFetcherBuilder {
            client,
            path: path.into(),
            items_key,
            filter_param: format!("{id_field}__in"),
            id_field,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            priority: DedupPriority::new(),
            secondary: None,
            extra_params: Vec::new(),
        }
    }

    /// Effective chunk size, after clamping to the ceiling.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Rules applied when two records share a key.
    pub fn priority(&self) -> &DedupPriority {
        &self.priority
    }

    /// Fetch one record per identifier.
    ///
    /// Identifiers are trimmed, deduplicated and sorted before chunking, so
    /// the same input set always issues the same queries. On a key collision
    /// the configured [`DedupPriority`] decides; ties keep the first-seen record.
    #[tracing::instrument(skip_all, fields(endpoint = %self.client.name(), path = %self.path))]
    pub async fn fetch_by_ids<I, S>(
        &self,
        ids: I,
        fields: &[&str],
        page_size: Option<u32>,
    ) -> BTreeMap<String, Record>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: BTreeMap<String, Record> = BTreeMap::new();
        for rec in self.fetch_chunks(normalize(ids), fields, page_size).await {
            if let Some(key) = rec.get(&self.id_field).and_then(key_string) {
                self.merge(&mut out, key, rec);
            }
        }
        out
    }

    /// Fetch every record per identifier, for one-to-many relations.
    ///
    /// Records keep server order within each identifier.
    #[tracing::instrument(skip_all, fields(endpoint = %self.client.name(), path = %self.path))]
    pub async fn fetch_grouped<I, S>(
        &self,
        ids: I,
        fields: &[&str],
        page_size: Option<u32>,
    ) -> BTreeMap<String, Vec<Record>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for rec in self.fetch_chunks(normalize(ids), fields, page_size).await {
            if let Some(key) = rec.get(&self.id_field).and_then(key_string) {
                out.entry(key).or_default().push(rec);
            }
        }
        out
    }

    /// Fetch one record per `(primary, secondary)` pair.
    ///
    /// Pairs are grouped on the primary identifier, which is sent as an exact
    /// filter, and the secondaries of each group are chunked into an `in` filter.
    ///
    /// # Errors
    ///
    /// `ApiError::InvalidConfig` if the fetcher has no secondary key. Chunk
    /// failures are not errors.
    #[tracing::instrument(skip_all, fields(endpoint = %self.client.name(), path = %self.path))]
    pub async fn fetch_by_pairs<I, A, B>(
        &self,
        pairs: I,
        fields: &[&str],
        page_size: Option<u32>,
    ) -> Result<BTreeMap<(String, String), Record>, ApiError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let Some(secondary) = &self.secondary else {
            return Err(ApiError::InvalidConfig(format!(
                "{}: fetch_by_pairs needs a secondary key",
                self.client.name()
            )));
        };

        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (a, b) in pairs {
            let (a, b) = (a.as_ref().trim(), b.as_ref().trim());
            if !a.is_empty() && !b.is_empty() {
                groups.entry(a.to_string()).or_default().insert(b.to_string());
            }
        }

        let mut out: BTreeMap<(String, String), Record> = BTreeMap::new();
        for (primary, secondaries) in &groups {
            let secondaries: Vec<&String> = secondaries.iter().collect();
            for chunk in secondaries.chunks(self.chunk_size) {
                let joined = chunk.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",");
                let filters = [
                    (self.id_field.clone(), primary.clone()),
                    (secondary.filter_param.clone(), joined),
                ];
                for rec in self.fetch_chunk(&filters, fields, page_size, chunk.len()).await {
                    let a = rec.get(&self.id_field).and_then(key_string);
                    let b = rec.get(&secondary.field).and_then(key_string);
                    if let (Some(a), Some(b)) = (a, b) {
                        self.merge(&mut out, (a, b), rec);
                    }
                }
            }
        }
        Ok(out)
    }

    fn merge<K: Ord>(&self, out: &mut BTreeMap<K, Record>, key: K, rec: Record) {
        match out.get_mut(&key) {
            Some(kept) => {
                if self.priority.replaces(&rec, kept) {
                    *kept = rec;
                }
            }
            None => {
                out.insert(key, rec);
            }
        }
    }

    async fn fetch_chunks(&self, ids: Vec<String>, fields: &[&str], page_size: Option<u32>) -> Vec<Record> {
        let mut records = Vec::new();
        for chunk in ids.chunks(self.chunk_size) {
            let filters = [(self.filter_param.clone(), chunk.join(","))];
            records.extend(self.fetch_chunk(&filters, fields, page_size, chunk.len()).await);
        }
        records
    }

    /// `only=` value: key fields first, then the caller's fields, then every
    /// field the dedup rules read. `None` means all fields.
    fn projection(&self, fields: &[&str]) -> Option<String> {
        if fields.is_empty() {
            return None;
        }
        let keys = std::iter::once(self.id_field.as_str())
            .chain(self.secondary.as_ref().map(|s| s.field.as_str()));
        let mut cols: Vec<&str> = Vec::new();
        for f in keys
            .chain(fields.iter().copied())
            .chain(self.priority.fields())
        {
            if !cols.contains(&f) {
                cols.push(f);
            }
        }
        Some(cols.join(","))
    }

    /// One paginated query; a failure yields no records.
    async fn fetch_chunk(
        &self,
        filters: &[(String, String)],
        fields: &[&str],
        page_size: Option<u32>,
        ids_in_chunk: usize,
    ) -> Vec<Record> {
        let mut req = PaginationRequest::new(self.path.clone(), self.items_key.clone())
            .params(self.extra_params.iter().cloned())
            .params(filters.iter().cloned());
        if let Some(only) = self.projection(fields) {
            req = req.param("only", only);
        }
        if let Some(n) = page_size {
            req = req.page_size(n);
        }

        match self.client.paginate_all(req).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    event = "chunk_failed",
                    endpoint = %self.client.name(),
                    path = %self.path,
                    ids = ids_in_chunk,
                    kind = ?e.kind(),
                    status = e.status(),
                    error = %e,
                    "chunk fetch failed, continuing without its records"
                );
                Vec::new()
            }
        }
    }
}

/// Trimmed, deduplicated, sorted.
fn normalize<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Builder for [`EntityFetcher`]; see [`EntityFetcher::builder`].
pub struct EntityFetcherBuilder {
    client: ApiClient,
    path: String,
    items_key: ItemsKey,
    id_field: String,
    filter_param: String,
    chunk_size: usize,
    max_chunk_size: usize,
    priority: DedupPriority,
    secondary: Option<SecondaryKey>,
    extra_params: Vec<(String, String)>,
}

impl EntityFetcherBuilder {
    /// Query parameter carrying the comma-joined identifiers.
    #[must_use]
    pub fn filter_param(mut self, param: impl Into<String>) -> Self {
        self.filter_param = param.into();
        self
    }

    /// Identifiers per request; clamped to [`Self::max_chunk_size`] on build.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    /// The remote API's own limit on identifiers per filter.
    #[must_use]
    pub const fn max_chunk_size(mut self, n: usize) -> Self {
        self.max_chunk_size = n;
        self
    }

    /// Collision rules; the default keeps the first-seen record.
    #[must_use]
    pub fn priority(mut self, priority: DedupPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Second key component for [`EntityFetcher::fetch_by_pairs`].
    #[must_use]
    pub fn secondary_key(mut self, field: impl Into<String>, filter_param: impl Into<String>) -> Self {
        self.secondary = Some(SecondaryKey {
            field: field.into(),
            filter_param: filter_param.into(),
        });
        self
    }

    /// Fixed query parameter sent with every chunk.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    /// # Errors
    ///
    /// `ApiError::InvalidConfig` for a zero chunk size or ceiling, or an empty key field.
    pub fn build(self) -> Result<EntityFetcher, ApiError> {
        if self.chunk_size == 0 || self.max_chunk_size == 0 {
            return Err(ApiError::InvalidConfig(format!(
                "{}: chunk sizes must be positive",
                self.path
            )));
        }
        if self.id_field.trim().is_empty() || self.filter_param.trim().is_empty() {
            return Err(ApiError::InvalidConfig(format!(
                "{}: key field and filter parameter must be set",
                self.path
            )));
        }
        Ok(EntityFetcher {
            client: self.client,
            path: self.path,
            items_key: self.items_key,
            id_field: self.id_field,
            filter_param: self.filter_param,
            chunk_size: self.chunk_size.min(self.max_chunk_size),
            priority: self.priority,
            secondary: self.secondary,
            extra_params: self.extra_params,
        })
    }
}
