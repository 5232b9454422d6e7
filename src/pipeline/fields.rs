//! Field merging: reconcile per-page structured extractions into one map.
//!
//! Keys fall into two kinds, decided by the [`FieldTaxonomy`]:
//!
//! * **list-like** (`medications`, `diagnoses`, …): values from every page
//!   are unioned in first-seen order, blanks dropped, exact duplicates kept
//!   once. A multi-page discharge summary lists medications on page 1 and
//!   page 3; both halves belong in the result.
//! * **scalar-like** (everything else): the first page with a non-blank value
//!   wins. Later pages never overwrite it; a patient name repeated in every
//!   page header should not flip-flop on OCR noise.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// Keys treated as list-like unless the caller supplies its own taxonomy.
pub const DEFAULT_LIST_FIELDS: &[&str] = &[
    "medications",
    "prescribed_medications",
    "current_medications",
    "diagnoses",
    "secondary_diagnoses",
    "allergies",
    "conditions",
    "problems",
    "problem_list",
    "procedures",
    "lab_results",
];

/// The set of field names whose values accumulate across pages.
///
/// Matching is exact on the whole key, ignoring ASCII case and surrounding
/// whitespace: `"Medications"` is list-like, `"medication_count"` is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTaxonomy {
    list_fields: BTreeSet<String>,
}

impl FieldTaxonomy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            list_fields: names.into_iter().map(|n| normalise_key(n.as_ref())).collect(),
        }
    }

    /// A taxonomy where every key is scalar-like.
    pub fn scalar_only() -> Self {
        Self {
            list_fields: BTreeSet::new(),
        }
    }

    pub fn with_list_field(mut self, name: impl AsRef<str>) -> Self {
        self.list_fields.insert(normalise_key(name.as_ref()));
        self
    }

    pub fn is_list_like(&self, key: &str) -> bool {
        self.list_fields.contains(&normalise_key(key))
    }

    pub fn list_fields(&self) -> impl Iterator<Item = &str> {
        self.list_fields.iter().map(String::as_str)
    }
}

impl Default for FieldTaxonomy {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_FIELDS)
    }
}

fn normalise_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// A merged field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            Self::Text(_) => None,
        }
    }
}

/// Merged fields, keyed by the name the model used. Ordered for stable output.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Parsed structured output for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFields {
    /// Zero-based page index.
    pub index: usize,
    /// The parsed reply. Anything other than a JSON object is skipped.
    pub raw: Value,
}

#[derive(Default)]
struct ListAccumulator {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl ListAccumulator {
    fn extend(&mut self, items: impl IntoIterator<Item = String>) {
        for item in items {
            if self.seen.insert(item.clone()) {
                self.items.push(item);
            }
        }
    }
}

/// Merge page extractions in page order.
///
/// * Non-object pages are skipped with a warning.
/// * A list-like key appears in the result as soon as any page mentions it,
///   possibly with an empty list.
/// * A scalar-like key appears only once some page gives it a non-blank
///   value. Numbers and booleans are stringified; a list under a scalar key
///   is joined with `", "`; nested objects contribute nothing.
pub fn merge_fields(pages: &[PageFields], taxonomy: &FieldTaxonomy) -> FieldMap {
    let mut merged = FieldMap::new();
    let mut lists: BTreeMap<String, ListAccumulator> = BTreeMap::new();
    let mut merged_pages = 0usize;

    for page in pages {
        let Some(object) = page.raw.as_object() else {
            warn!(
                page = page.index + 1,
                kind = json_kind(&page.raw),
                "Skipping page whose structured output is not an object"
            );
            continue;
        };
        merged_pages += 1;

        for (key, value) in object {
            if taxonomy.is_list_like(key) {
                lists.entry(key.clone()).or_default().extend(list_items(value));
            } else if !merged.contains_key(key) {
                if let Some(text) = scalar_text(value) {
                    merged.insert(key.clone(), FieldValue::Text(text));
                }
            }
        }
    }

    for (key, acc) in lists {
        merged.insert(key, FieldValue::List(acc.items));
    }

    debug!(
        pages = pages.len(),
        merged_pages,
        keys = merged.len(),
        "Merged page fields"
    );
    merged
}

/// Text of a single non-container value, trimmed; `None` when blank.
fn leaf_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn list_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(leaf_text).collect(),
        other => leaf_text(other).into_iter().collect(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(leaf_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => leaf_text(other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
