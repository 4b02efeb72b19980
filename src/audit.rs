//! Audit/lineage collaborator driven by the pagination engine.
//!
//! The engine calls [`AuditSink::begin`] before the first page,
//! [`AuditSink::update`] after every page and [`AuditSink::finish`] exactly once
//! when a traversal completes or fails. Persistence is the sink's business.

use std::sync::{Mutex, PoisonError};

/// Opening record of one traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditBegin {
    /// Source label, the endpoint name unless overridden on the request.
    pub source: String,
    /// Resolved absolute URL of the first page, without query.
    pub url: String,
    /// Initial query parameters, page size included.
    pub params: Vec<(String, String)>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub job_id: Option<String>,
    pub operator: Option<String>,
}

/// What is known after one page has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Zero-based page position in the traversal.
    pub page_index: usize,
    /// HTTP status of the page response.
    pub status: u16,
    /// Items yielded from this page.
    pub item_count: usize,
    /// Full parameter set; only present for the first page.
    pub params: Option<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failed,
}

/// Receives lineage records for paginated fetches.
pub trait AuditSink: Send + Sync {
    /// Open a record and return its id.
    fn begin(&self, entry: &AuditBegin) -> String;

    fn update(&self, record_id: &str, snapshot: &PageSnapshot, records_fetched_delta: usize);

    fn finish(
        &self,
        record_id: &str,
        status: AuditStatus,
        records_fetched: usize,
        error_message: Option<&str>,
    );
}

/// One call received by a [`MemoryAuditSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    Begin(AuditBegin),
    Update {
        record_id: String,
        snapshot: PageSnapshot,
        delta: usize,
    },
    Finish {
        record_id: String,
        status: AuditStatus,
        records_fetched: usize,
        error_message: Option<String>,
    },
}

/// Sink that keeps every call in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls received so far, in order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: AuditEvent) -> usize {
        let mut guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(event);
        guard.len()
    }
}

impl AuditSink for MemoryAuditSink {
    fn begin(&self, entry: &AuditBegin) -> String {
        let n = self.push(AuditEvent::Begin(entry.clone()));
        format!("audit-{n}")
    }

    fn update(&self, record_id: &str, snapshot: &PageSnapshot, records_fetched_delta: usize) {
        self.push(AuditEvent::Update {
            record_id: record_id.to_string(),
            snapshot: snapshot.clone(),
            delta: records_fetched_delta,
        });
    }

    fn finish(
        &self,
        record_id: &str,
        status: AuditStatus,
        records_fetched: usize,
        error_message: Option<&str>,
    ) {
        self.push(AuditEvent::Finish {
            record_id: record_id.to_string(),
            status,
            records_fetched,
            error_message: error_message.map(str::to_string),
        });
    }
}
