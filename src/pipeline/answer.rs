//! Answer combining: join per-page free-text answers into one document answer.

use crate::error::{PageMergeError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One page's free-text answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAnswer {
    /// Zero-based page index.
    pub index: usize,
    pub text: String,
}

/// Separator label for a page block, 1-based.
pub fn page_label(index: usize) -> String {
    format!("--- Page {} ---", index + 1)
}

/// Combine page answers in the order given.
///
/// A single page's answer is returned verbatim. With several pages, each
/// non-blank answer becomes a block headed by [`page_label`], and blocks are
/// separated by a blank line. If every page is blank the result is empty.
///
/// # Errors
/// [`PageMergeError::NoAnswerPages`] when `answers` is empty.
pub fn combine_answers(answers: &[PageAnswer]) -> Result<String> {
    match answers {
        [] => Err(PageMergeError::NoAnswerPages),
        [only] => Ok(only.text.clone()),
        many => {
            let blocks: Vec<String> = many
                .iter()
                .filter(|a| !a.text.trim().is_empty())
                .map(|a| format!("{}\n{}", page_label(a.index), a.text.trim()))
                .collect();
            debug!(
                pages = many.len(),
                blocks = blocks.len(),
                "Combined page answers"
            );
            Ok(blocks.join("\n\n"))
        }
    }
}
