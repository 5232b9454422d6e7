//! Document-level entry points: ask a question of a document, or extract
//! fields from it.
//!
//! Both operations walk the page stream in order, hand each page to an
//! [`Analyzer`], and reconcile the per-page outputs:
//!
//! ```text
//! Document ──▶ PageStream ──▶ Analyzer ──▶ combine_answers  (query)
//!                 (lazy)       (per page)  └▶ parse → merge_fields (extract)
//! ```
//!
//! Only one page image is alive at a time; it is dropped as soon as the
//! analyzer returns. An analyzer failure aborts the whole operation with the
//! page number; unparseable structured output on one page does not.
//!
//! The sync functions block the calling thread. From async code use
//! [`query_async`] / [`extract_async`], which move the work onto tokio's
//! blocking pool.

use crate::audit::emit_summary;
use crate::config::PipelineConfig;
use crate::error::{PageError, PageMergeError, Result};
use crate::output::{DocumentInfo, MergedResult};
use crate::pipeline::answer::{combine_answers, PageAnswer};
use crate::pipeline::count::count_document;
use crate::pipeline::detect::Document;
use crate::pipeline::fields::{merge_fields, FieldMap, PageFields};
use crate::pipeline::input::SpooledDocument;
use crate::pipeline::llm::{AnalysisOptions, Analyzer};
use crate::pipeline::pages::PageStream;
use crate::pipeline::parse::parse_extraction_response;
use crate::progress::{NoopProgressCallback, PageProgressCallback};
use crate::prompts::extraction_prompt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Ask `question` of every page of the document at `path` and combine the
/// answers.
///
/// # Errors
/// - classification and page-stream errors ([`PageMergeError::NotFound`],
///   [`PageMergeError::UnsupportedType`], …)
/// - [`PageMergeError::AnalysisFailure`] with the 1-based page that failed
/// - [`PageMergeError::NoAnswerPages`] when no page was analysed
pub fn query(
    path: impl AsRef<Path>,
    question: &str,
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    let document = Document::open(path)?;
    query_document(document, None, question, config, analyzer)
}

/// Extract `fields` from every page of the document at `path` and merge
/// them with `config.taxonomy`.
///
/// Pages whose reply is not a JSON object are recorded in
/// [`MergedResult::page_errors`] and left out of the merge.
///
/// # Errors
/// As for [`query`], except that a document with no pages yields an empty
/// field map rather than an error. An empty `fields` slice is
/// [`PageMergeError::InvalidConfig`].
pub fn extract<S: AsRef<str>>(
    path: impl AsRef<Path>,
    fields: &[S],
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    let document = Document::open(path)?;
    extract_document(document, None, fields, config, analyzer)
}

/// [`query`] over in-memory bytes. `name_hint` (e.g. `"scan.tif"`) feeds the
/// extension fallback of type detection.
pub fn query_bytes(
    bytes: &[u8],
    name_hint: Option<&str>,
    question: &str,
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    let spool = SpooledDocument::write(bytes, name_hint)?;
    let document = Document::open(spool.path())?;
    query_document(document, Some(spool), question, config, analyzer)
}

/// [`extract`] over in-memory bytes.
pub fn extract_bytes<S: AsRef<str>>(
    bytes: &[u8],
    name_hint: Option<&str>,
    fields: &[S],
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    let spool = SpooledDocument::write(bytes, name_hint)?;
    let document = Document::open(spool.path())?;
    extract_document(document, Some(spool), fields, config, analyzer)
}

/// A page stream over in-memory bytes. The temp file lives as long as the
/// stream.
pub fn pages_from_bytes(
    bytes: &[u8],
    name_hint: Option<&str>,
    max_pages: Option<usize>,
) -> Result<PageStream> {
    let spool = SpooledDocument::write(bytes, name_hint)?;
    let document = Document::open(spool.path())?;
    let stream = PageStream::open(document, max_pages, &Default::default())?;
    Ok(stream.with_spool(spool))
}

/// Classify and count a document without rendering anything.
pub fn inspect(path: impl AsRef<Path>) -> Result<DocumentInfo> {
    let document = Document::open(path)?;
    let page_count = count_document(&document)?;
    let file_size_bytes = std::fs::metadata(&document.path)
        .map_err(|e| PageMergeError::from_io(&document.path, e))?
        .len();
    Ok(DocumentInfo {
        path: document.path,
        doc_type: document.doc_type,
        page_count,
        file_size_bytes,
    })
}

/// [`query`] on tokio's blocking pool.
pub async fn query_async(
    path: impl Into<PathBuf>,
    question: impl Into<String>,
    config: PipelineConfig,
    analyzer: Arc<dyn Analyzer>,
) -> Result<MergedResult> {
    let path = path.into();
    let question = question.into();
    tokio::task::spawn_blocking(move || query(&path, &question, &config, analyzer.as_ref()))
        .await
        .map_err(|e| PageMergeError::Internal(format!("Query task panicked: {}", e)))?
}

/// [`extract`] on tokio's blocking pool.
pub async fn extract_async(
    path: impl Into<PathBuf>,
    fields: Vec<String>,
    config: PipelineConfig,
    analyzer: Arc<dyn Analyzer>,
) -> Result<MergedResult> {
    let path = path.into();
    tokio::task::spawn_blocking(move || extract(&path, fields.as_slice(), &config, analyzer.as_ref()))
        .await
        .map_err(|e| PageMergeError::Internal(format!("Extraction task panicked: {}", e)))?
}

// ── Internals ────────────────────────────────────────────────────────────

fn query_document(
    document: Document,
    spool: Option<SpooledDocument>,
    question: &str,
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    info!(path = %document.path.display(), doc_type = %document.doc_type, "Starting query");

    let (stream, planned) = open_stream(document.clone(), spool, config)?;
    let options = AnalysisOptions::for_query(config);

    let mut answers = Vec::new();
    let run = run_pages(stream, question, &options, analyzer, config, planned, |index, text| {
        answers.push(PageAnswer { index, text });
        None
    })?;

    let answer = combine_answers(&answers)?;
    let result = MergedResult {
        document: document.path,
        doc_type: document.doc_type,
        question: Some(question.to_string()),
        answer: Some(answer),
        fields: FieldMap::new(),
        page_count: run.analysed,
        tokens_used: run.tokens_used,
        page_errors: Vec::new(),
        model: analyzer.model(),
    };
    finish(&result, config, planned);
    Ok(result)
}

fn extract_document<S: AsRef<str>>(
    document: Document,
    spool: Option<SpooledDocument>,
    fields: &[S],
    config: &PipelineConfig,
    analyzer: &dyn Analyzer,
) -> Result<MergedResult> {
    if fields.is_empty() {
        return Err(PageMergeError::InvalidConfig(
            "extraction needs at least one field name".into(),
        ));
    }
    info!(
        path = %document.path.display(),
        doc_type = %document.doc_type,
        fields = fields.len(),
        "Starting extraction"
    );

    let (stream, planned) = open_stream(document.clone(), spool, config)?;
    let prompt = extraction_prompt(fields);
    let options = AnalysisOptions::for_extraction(config);

    let mut parsed = Vec::new();
    let mut page_errors = Vec::new();
    let run = run_pages(stream, &prompt, &options, analyzer, config, planned, |index, text| {
        let page = index + 1;
        let outcome = parse_extraction_response(page, &text).and_then(|raw| {
            if raw.is_object() {
                Ok(raw)
            } else {
                Err(PageError::MalformedPageOutput {
                    page,
                    detail: "expected a JSON object".into(),
                })
            }
        });
        match outcome {
            Ok(raw) => {
                parsed.push(PageFields { index, raw });
                None
            }
            Err(e) => {
                warn!(page, error = %e, "Skipping page with unusable structured output");
                let message = e.to_string();
                page_errors.push(e);
                Some(message)
            }
        }
    })?;

    let merged = merge_fields(&parsed, &config.taxonomy);
    let result = MergedResult {
        document: document.path,
        doc_type: document.doc_type,
        question: None,
        answer: None,
        fields: merged,
        page_count: run.analysed,
        tokens_used: run.tokens_used,
        page_errors,
        model: analyzer.model(),
    };
    finish(&result, config, planned);
    Ok(result)
}

/// Count pages for progress planning, then open the stream.
fn open_stream(
    document: Document,
    spool: Option<SpooledDocument>,
    config: &PipelineConfig,
) -> Result<(PageStream, usize)> {
    let total = count_document(&document)?;
    let planned = config.max_pages.map_or(total, |cap| cap.min(total));
    info!("Document has {} pages, analysing {}", total, planned);

    let stream = PageStream::open(document, config.max_pages, &config.render_options())?;
    let stream = match spool {
        Some(spool) => stream.with_spool(spool),
        None => stream,
    };
    Ok((stream, planned))
}

struct PageRun {
    analysed: usize,
    tokens_used: Option<u64>,
}

/// Pull pages one at a time and analyse each.
///
/// `on_text` receives the zero-based index and the analyzer's text; it
/// returns an error description when the page's output was unusable.
fn run_pages(
    stream: PageStream,
    prompt: &str,
    options: &AnalysisOptions,
    analyzer: &dyn Analyzer,
    config: &PipelineConfig,
    planned: usize,
    mut on_text: impl FnMut(usize, String) -> Option<String>,
) -> Result<PageRun> {
    let noop = NoopProgressCallback;
    let progress: &dyn PageProgressCallback = config.progress_callback.as_deref().unwrap_or(&noop);
    progress.on_document_start(planned);

    let mut run = PageRun {
        analysed: 0,
        tokens_used: None,
    };

    for page in stream {
        let page = page?;
        let page_num = page.page_number();
        progress.on_page_start(page_num, planned);

        let analysis = match analyzer.analyze(&page, prompt, options) {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(page = page_num, error = %e, "Analyzer failed, aborting document");
                progress.on_page_error(page_num, planned, &e.message);
                return Err(PageMergeError::AnalysisFailure {
                    page: page_num,
                    detail: e.message,
                });
            }
        };
        let index = page.index;
        drop(page);

        run.analysed += 1;
        if let Some(tokens) = analysis.tokens {
            run.tokens_used = Some(run.tokens_used.unwrap_or(0) + tokens);
        }

        let text_len = analysis.text.len();
        match on_text(index, analysis.text) {
            None => progress.on_page_complete(page_num, planned, text_len),
            Some(problem) => progress.on_page_error(page_num, planned, &problem),
        }
    }

    Ok(run)
}

fn finish(result: &MergedResult, config: &PipelineConfig, planned: usize) {
    info!(
        "{} complete: {}/{} pages, {} page errors",
        result.operation(),
        result.page_count,
        planned,
        result.page_errors.len()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(planned, result.page_count);
    }
    emit_summary(&result.summary(), config.audit_sink.as_ref());
}
