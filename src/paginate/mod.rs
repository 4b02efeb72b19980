//! Cursor-driven pagination over list endpoints.
//!
//! A traversal issues the first request (with a page-size limit injected if the
//! caller gave none), pulls the item list out of every page, follows the
//! `next` cursor found in the page metadata, and stops when no cursor remains.
//! Pages are fetched strictly in cursor order and item order is preserved.

mod handshake;
mod items;

pub use handshake::Handshake;
pub use items::ItemsKey;

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;

use crate::audit::{AuditBegin, AuditSink, AuditStatus, PageSnapshot};
use crate::core::{ApiClient, ApiError, ApiRequest};

/// One entity record: an opaque JSON object.
pub type Record = serde_json::Map<String, Value>;

/// Caller-supplied description of one traversal.
#[derive(Clone)]
pub struct PaginationRequest {
    pub(crate) path: String,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) page_size: Option<u32>,
    pub(crate) items_key: ItemsKey,
    pub(crate) unique_key: Option<String>,
    pub(crate) audit: Option<Arc<dyn AuditSink>>,
    pub(crate) audit_source: Option<String>,
    pub(crate) job_id: Option<String>,
    pub(crate) operator: Option<String>,
}

impl std::fmt::Debug for PaginationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationRequest")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("page_size", &self.page_size)
            .field("items_key", &self.items_key)
            .field("unique_key", &self.unique_key)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl PaginationRequest {
    /// Traverse `path`, reading items from the `items_key` field of each page.
    pub fn new(path: impl Into<String>, items_key: ItemsKey) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
            page_size: None,
            items_key,
            unique_key: None,
            audit: None,
            audit_source: None,
            job_id: None,
            operator: None,
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn params<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Requested page size; clamped to the endpoint's ceiling.
    #[must_use]
    pub const fn page_size(mut self, n: u32) -> Self {
        self.page_size = Some(n);
        self
    }

    /// Drop items whose `field` value was already yielded in this traversal.
    #[must_use]
    pub fn unique_key(mut self, field: impl Into<String>) -> Self {
        self.unique_key = Some(field.into());
        self
    }

    /// Report begin/update/finish of this traversal to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Source label used in audit records (defaults to the endpoint name).
    #[must_use]
    pub fn audit_source(mut self, source: impl Into<String>) -> Self {
        self.audit_source = Some(source.into());
        self
    }

    /// Job and operator identifiers passed through to the audit sink.
    #[must_use]
    pub fn audit_job(mut self, job_id: impl Into<String>, operator: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self.operator = Some(operator.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn items_key(&self) -> &ItemsKey {
        &self.items_key
    }
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based position in the traversal.
    pub index: usize,
    /// URL actually requested, query included.
    pub url: String,
    pub status: u16,
    pub body: Value,
    pub items: Vec<Record>,
    /// Cursor for the following page; `None` means the listing is exhausted.
    pub next: Option<String>,
}

enum Cursor {
    First,
    Next(String),
    Done,
}

struct Traversal {
    client: ApiClient,
    request: PaginationRequest,
    cursor: Cursor,
    visited: HashSet<String>,
    seen_keys: HashSet<String>,
    page_index: usize,
    total: usize,
    audit: Option<(Arc<dyn AuditSink>, String)>,
}

impl Traversal {
    fn new(client: ApiClient, request: PaginationRequest) -> Self {
        Self {
            client,
            request,
            cursor: Cursor::First,
            visited: HashSet::new(),
            seen_keys: HashSet::new(),
            page_index: 0,
            total: 0,
            audit: None,
        }
    }

    async fn next_page(&mut self) -> Result<Option<Page>, ApiError> {
        match self.step().await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.cursor = Cursor::Done;
                if let Some((sink, id)) = self.audit.take() {
                    sink.finish(&id, AuditStatus::Failed, self.total, Some(&e.to_string()));
                }
                tracing::warn!(
                    event = "pagination_complete",
                    endpoint = %self.client.name(),
                    path = %self.request.path,
                    pages = self.page_index,
                    items = self.total,
                    error = %e,
                    "pagination aborted"
                );
                Err(e)
            }
        }
    }

    fn first_request(&self) -> ApiRequest {
        let pcfg = &self.client.config().pagination;
        let mut params = self.request.params.clone();
        if !params.iter().any(|(k, _)| k == &pcfg.limit_param) {
            let size = self
                .request
                .page_size
                .unwrap_or(pcfg.default_page_size)
                .clamp(1, pcfg.max_page_size);
            params.push((pcfg.limit_param.clone(), size.to_string()));
        }
        ApiRequest::get(self.request.path.clone()).params(params)
    }

    async fn begin(&mut self, req: &ApiRequest) -> Result<(), ApiError> {
        let status_path = self.client.config().pagination.status_path.clone();
        let handshake = match status_path {
            Some(p) => Some(self.client.handshake(&p).await?),
            None => None,
        };

        let url = self.client.resolve(req.target())?;
        tracing::info!(
            event = "pagination_start",
            endpoint = %self.client.name(),
            url = %url,
            params = ?req.query(),
            "pagination started"
        );

        if let Some(sink) = &self.request.audit {
            let entry = AuditBegin {
                source: self
                    .request
                    .audit_source
                    .clone()
                    .unwrap_or_else(|| self.client.name().to_string()),
                url: url.to_string(),
                params: req.query().to_vec(),
                release: handshake.as_ref().and_then(|h| h.release.clone()),
                version: handshake.as_ref().and_then(|h| h.version.clone()),
                job_id: self.request.job_id.clone(),
                operator: self.request.operator.clone(),
            };
            let id = sink.begin(&entry);
            self.audit = Some((Arc::clone(sink), id));
        }
        Ok(())
    }

    async fn step(&mut self) -> Result<Option<Page>, ApiError> {
        let req = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::First => {
                let req = self.first_request();
                self.begin(&req).await?;
                let mut first = self.client.resolve(req.target())?;
                first.query_pairs_mut().extend_pairs(req.query());
                self.visited.insert(first.to_string());
                req
            }
            Cursor::Next(cursor) => {
                let resolved = self.client.resolve(&cursor)?;
                if !self.visited.insert(resolved.to_string()) {
                    return Err(ApiError::RepeatedCursor { cursor });
                }
                ApiRequest::get(cursor)
            }
        };
        let full_params = (self.page_index == 0).then(|| req.query().to_vec());

        let resp = self.client.call(req).await?;
        let body = resp.json()?;
        let pcfg = &self.client.config().pagination;
        let mut items = self
            .request
            .items_key
            .extract(&body, &pcfg.meta_key, self.client.name())?;
        let next = next_cursor(&body, &pcfg.meta_key, &pcfg.next_key);

        if let Some(field) = &self.request.unique_key {
            items.retain(|item| match item.get(field).and_then(key_string) {
                Some(k) => self.seen_keys.insert(k),
                None => true,
            });
        }

        let index = self.page_index;
        self.page_index += 1;
        self.total += items.len();

        if let Some((sink, id)) = &self.audit {
            let snapshot = PageSnapshot {
                page_index: index,
                status: resp.status,
                item_count: items.len(),
                params: full_params,
            };
            sink.update(id, &snapshot, items.len());
        }

        match &next {
            Some(c) => self.cursor = Cursor::Next(c.clone()),
            None => {
                if let Some((sink, id)) = self.audit.take() {
                    sink.finish(&id, AuditStatus::Success, self.total, None);
                }
                tracing::info!(
                    event = "pagination_complete",
                    endpoint = %self.client.name(),
                    path = %self.request.path,
                    pages = self.page_index,
                    items = self.total,
                    "pagination complete"
                );
            }
        }

        Ok(Some(Page {
            index,
            url: resp.url.to_string(),
            status: resp.status,
            body,
            items,
            next,
        }))
    }
}

impl Drop for Traversal {
    /// A consumer that stops polling early still closes its audit record.
    fn drop(&mut self) {
        if let Some((sink, id)) = self.audit.take() {
            sink.finish(
                &id,
                AuditStatus::Failed,
                self.total,
                Some("traversal dropped before the last page"),
            );
            tracing::warn!(
                event = "pagination_complete",
                endpoint = %self.client.name(),
                path = %self.request.path,
                pages = self.page_index,
                items = self.total,
                "pagination abandoned by consumer"
            );
        }
    }
}

/// The `next` cursor from the page metadata; absent, null or empty means done.
fn next_cursor(body: &Value, meta_key: &str, next_key: &str) -> Option<String> {
    match body.get(meta_key)?.get(next_key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Stable string form of a key value: strings as-is, numbers and bools printed.
pub(crate) fn key_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ApiClient {
    /// Lazily fetch the pages of a listing, one request per poll.
    ///
    /// The stream ends after the page without a `next` cursor, or after the
    /// first error (a repeated cursor included). It cannot be restarted.
    pub fn pages(
        &self,
        request: PaginationRequest,
    ) -> impl Stream<Item = Result<Page, ApiError>> + Send + use<> {
        let traversal = Traversal::new(self.clone(), request);
        stream::try_unfold(traversal, |mut t| async move {
            Ok(t.next_page().await?.map(|page| (page, t)))
        })
    }

    /// Lazily fetch every item of a listing, page after page, in server order.
    pub fn paginate(
        &self,
        request: PaginationRequest,
    ) -> impl Stream<Item = Result<Record, ApiError>> + Send + use<> {
        self.pages(request)
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<Record, ApiError>)))
            .try_flatten()
    }

    /// Drain [`ApiClient::paginate`] into a vector.
    ///
    /// # Errors
    ///
    /// The first error met during the traversal.
    pub async fn paginate_all(&self, request: PaginationRequest) -> Result<Vec<Record>, ApiError> {
        self.paginate(request).try_collect().await
    }
}
