//! Audit trail for outbound HTTP requests
//!
//! Every call to [`crate::fetch::FetchClient::get`] produces exactly one
//! [`AuditEntry`], including calls that were blocked before touching the
//! network. Sinks must never fail the request they describe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// One outbound request attempt sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Provider key the request was made for
    pub provider: String,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    /// Final HTTP status, `None` when no response was received
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub user_agent: String,
    pub robots_allowed: bool,
    /// robots.txt group that decided the outcome, if any
    pub robots_group: Option<String>,
    pub retry_count: u32,
    pub error: Option<String>,
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    /// Records one entry. Implementations swallow their own failures.
    fn record(&self, entry: AuditEntry);
}

/// Emits each entry as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "pricetide::audit",
            timestamp = %entry.timestamp.to_rfc3339(),
            provider = %entry.provider,
            method = %entry.method,
            url = %entry.url,
            host = %entry.host,
            path = %entry.path,
            status = entry.status.unwrap_or(0),
            duration_ms = entry.duration_ms,
            user_agent = %entry.user_agent,
            robots_allowed = entry.robots_allowed,
            robots_group = entry.robots_group.as_deref().unwrap_or(""),
            retry_count = entry.retry_count,
            error = entry.error.as_deref().unwrap_or(""),
            "HTTP request audit"
        );
    }
}

/// Keeps entries in memory, mostly for inspection in tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
