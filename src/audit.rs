//! Audit trail: one summary record per processed document.
//!
//! The summary carries no content: no question, no answer, no field values. Documents here are often medical records, and audit logs
//! are kept longer and read more widely than results. Field *names* are
//! recorded so reviewers can see what was asked for.
//!
//! Every summary is logged under the `edgequake_pagemerge::audit` tracing
//! target; route that target to durable storage with a subscriber filter.
//! An [`AuditSink`] on the config receives the same record in-process.

use crate::pipeline::detect::DocumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Tracing target used for audit records.
pub const AUDIT_TARGET: &str = "edgequake_pagemerge::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Query,
    Extract,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Extract => "extract",
        })
    }
}

/// What was done to which document, without what was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document: PathBuf,
    pub document_type: DocumentType,
    pub operation: Operation,
    pub page_count: usize,
    pub tokens_used: Option<u64>,
    pub field_keys: Vec<String>,
    /// Model that analysed the pages, when the analyzer reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Receives a summary after each successful query or extraction.
pub trait AuditSink: Send + Sync {
    fn record(&self, summary: &DocumentSummary);
}

/// Log `summary` on [`AUDIT_TARGET`] and forward it to `sink`, if any.
pub(crate) fn emit_summary(summary: &DocumentSummary, sink: Option<&Arc<dyn AuditSink>>) {
    info!(
        target: AUDIT_TARGET,
        document = %summary.document.display(),
        document_type = %summary.document_type,
        operation = %summary.operation,
        page_count = summary.page_count,
        tokens_used = ?summary.tokens_used,
        field_keys = ?summary.field_keys,
        model = summary.model.as_deref().unwrap_or("-"),
        processed_at = %summary.processed_at.to_rfc3339(),
        "Document processed"
    );
    if let Some(sink) = sink {
        sink.record(summary);
    }
}
