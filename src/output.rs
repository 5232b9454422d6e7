//! Result types returned by [`crate::session`].

use crate::audit::{DocumentSummary, Operation};
use crate::error::PageError;
use crate::pipeline::detect::DocumentType;
use crate::pipeline::fields::FieldMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The reconciled outcome of a query or an extraction over one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    /// Canonical path of the document that was read.
    pub document: PathBuf,
    pub doc_type: DocumentType,
    /// The question asked, for queries.
    pub question: Option<String>,
    /// Combined answer, for queries.
    pub answer: Option<String>,
    /// Merged fields, for extractions. Empty for queries.
    pub fields: FieldMap,
    /// Pages the analyzer saw (after the `max_pages` cap).
    pub page_count: usize,
    /// Sum of reported token usage; `None` if no page reported any.
    pub tokens_used: Option<u64>,
    /// Pages whose structured output was unusable and left out of `fields`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<PageError>,
    /// Model reported by the analyzer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl MergedResult {
    pub fn operation(&self) -> Operation {
        if self.question.is_some() {
            Operation::Query
        } else {
            Operation::Extract
        }
    }

    /// The audit-safe view of this result: no question, answer or values.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            document: self.document.clone(),
            document_type: self.doc_type,
            operation: self.operation(),
            page_count: self.page_count,
            tokens_used: self.tokens_used,
            field_keys: self.fields.keys().cloned().collect(),
            model: self.model.clone(),
            processed_at: Utc::now(),
        }
    }
}

/// Cheap facts about a document, gathered without rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub doc_type: DocumentType,
    pub page_count: usize,
    pub file_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fields::FieldValue;

    fn result(question: Option<&str>) -> MergedResult {
        let mut fields = FieldMap::new();
        if question.is_none() {
            fields.insert("name".into(), FieldValue::Text("Ada".into()));
            fields.insert("allergies".into(), FieldValue::List(vec!["latex".into()]));
        }
        MergedResult {
            document: PathBuf::from("/tmp/a.pdf"),
            doc_type: DocumentType::Pdf,
            question: question.map(str::to_string),
            answer: question.map(|_| "yes".to_string()),
            fields,
            page_count: 2,
            tokens_used: Some(120),
            page_errors: vec![],
            model: None,
        }
    }

    #[test]
    fn summary_has_keys_not_values() {
        let summary = result(None).summary();
        assert_eq!(summary.operation, Operation::Extract);
        assert_eq!(summary.field_keys, vec!["allergies", "name"]);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("Ada"));
        assert!(!json.contains("latex"));
    }

    #[test]
    fn query_summary_omits_question() {
        let summary = result(Some("Is the patient diabetic?")).summary();
        assert_eq!(summary.operation, Operation::Query);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("diabetic"));
    }

    #[test]
    fn empty_page_errors_not_serialised() {
        let json = serde_json::to_value(result(None)).unwrap();
        assert!(json.get("page_errors").is_none());
        assert_eq!(json["doc_type"], "pdf");
    }
}
