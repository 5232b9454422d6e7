//! Prompts sent with each page image.
//!
//! Queries pass the caller's question through unchanged; the model sees one
//! page at a time and answers from it. Extraction builds its prompt from the
//! requested field names and insists on a bare JSON object, which
//! [`crate::pipeline::parse`] then tolerates being disobeyed.

/// Build the per-page extraction prompt for `fields`.
///
/// The exact field names are listed so the model reuses them as JSON keys;
/// merging relies on keys matching across pages.
pub fn extraction_prompt<S: AsRef<str>>(fields: &[S]) -> String {
    let listed = fields
        .iter()
        .map(|f| format!("- {}", f.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Extract the following fields from this page of the document:\n\
{listed}\n\n\
Return ONLY a JSON object whose keys are exactly the field names above.\n\
Use a JSON array for fields that can hold several items (medications, diagnoses, allergies).\n\
Use null for any field that does not appear on this page.\n\
Do not wrap the JSON in code fences and do not add any commentary."
    )
}
