//! # edgequake-pagemerge
//!
//! Turn PDF, TIFF and image documents into a stream of PNG pages, ask a
//! vision model about each page, and reconcile the per-page answers into one
//! result per document.
//!
//! ## Why page by page?
//!
//! Vision models see one image at a time, and scanned records arrive as
//! multi-page PDFs or multi-frame TIFFs. This crate normalises every
//! container to the same lazy sequence of PNG pages, so only one page image
//! is in memory at once, then merges what the model said about each page:
//! free-text answers are concatenated under page labels, structured fields
//! are unioned (lists) or first-wins (scalars).
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Detect   PDF / TIFF / image from magic bytes, extension fallback
//!  ├─ 2. Pages    pdfium render @150 DPI, TIFF frames, or the image itself → PNG
//!  ├─ 3. Analyze  one VLM call per page (retry + backoff)
//!  ├─ 4. Parse    tolerant JSON for extraction replies
//!  ├─ 5. Merge    combine answers / merge fields
//!  └─ 6. Audit    content-free summary per document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pagemerge::{extract_async, PipelineConfig, VlmAnalyzer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder().max_pages(10).build()?;
//!     let analyzer = Arc::new(VlmAnalyzer::from_config(&config)?);
//!     let fields = vec!["patient_name".to_string(), "medications".to_string()];
//!     let result = extract_async("discharge.tiff", fields, config, analyzer).await?;
//!     println!("{}", serde_json::to_string_pretty(&result.fields)?);
//!     Ok(())
//! }
//! ```
//!
//! Without an analyzer, [`pages`] gives the normalised page stream alone:
//!
//! ```rust,no_run
//! for page in edgequake_pagemerge::pages("scan.pdf", Some(3))? {
//!     let page = page?;
//!     std::fs::write(format!("page-{}.png", page.page_number()), &page.png)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{AuditSink, DocumentSummary, Operation};
pub use config::{PipelineConfig, PipelineConfigBuilder, RenderOptions};
pub use error::{PageError, PageMergeError, Result};
pub use output::{DocumentInfo, MergedResult};
pub use pipeline::answer::{combine_answers, PageAnswer};
pub use pipeline::count::page_count;
pub use pipeline::detect::{classify, Document, DocumentType};
pub use pipeline::fields::{merge_fields, FieldMap, FieldTaxonomy, FieldValue, PageFields};
pub use pipeline::llm::{Analysis, AnalysisOptions, Analyzer, AnalyzerError, VlmAnalyzer};
pub use pipeline::pages::{pages, pages_with, Page, PageStream};
pub use pipeline::parse::parse_extraction_response;
pub use progress::{NoopProgressCallback, PageProgressCallback, ProgressCallback};
pub use session::{
    extract, extract_async, extract_bytes, inspect, pages_from_bytes, query, query_async,
    query_bytes,
};
