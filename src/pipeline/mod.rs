//! Pipeline stages for page normalisation and result reconciliation.
//!
//! Each submodule implements one step, testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! detect ──▶ pages ──▶ llm ──▶ parse ──▶ fields   (extraction)
//! (type)    (PNGs)   (VLM)   (JSON)    └▶ answer  (query)
//! ```
//!
//! 1. [`detect`] — classify a path as PDF, TIFF or single image
//! 2. [`pages`]  — lazy PNG page stream; [`render`] (pdfium) and [`frames`]
//!    (TIFF IFDs) supply the multi-page formats, [`encode`] the PNG step
//! 3. [`count`]  — page totals without rendering
//! 4. [`llm`]    — the [`llm::Analyzer`] seam and the VLM-backed analyzer
//! 5. [`parse`]  — tolerant JSON parsing of extraction replies
//! 6. [`fields`] / [`answer`] — reconcile per-page outputs
//!
//! [`input`] spools in-memory documents to a temp file for the stages that
//! need a path.

pub mod answer;
pub mod count;
pub mod detect;
pub mod encode;
pub mod fields;
pub mod frames;
pub mod input;
pub mod llm;
pub mod pages;
pub mod parse;
pub mod render;
