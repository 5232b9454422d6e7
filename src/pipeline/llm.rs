//! Page analysis: the per-page vision call behind a small trait.
//!
//! The reconciliation pipeline only needs "given a page image and a prompt,
//! return text". [`Analyzer`] is that seam: tests plug in scripted closures,
//! production uses [`VlmAnalyzer`] over an `edgequake-llm` provider.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! load. Exponential backoff (`retry_backoff_ms * 2^attempt`) with 500 ms
//! base and 3 retries waits 500 ms → 1 s → 2 s before giving up on a page.
//!
//! ## Sync over async
//!
//! Page streams are synchronous iterators, so `Analyzer::analyze` is too.
//! [`VlmAnalyzer`] keeps a tokio `Handle` and blocks on it; call it from a
//! blocking context (`spawn_blocking`, a plain thread, or outside any
//! runtime), never directly from inside an async task.

use crate::config::PipelineConfig;
use crate::error::{PageMergeError, Result};
use crate::pipeline::encode::to_image_data;
use crate::pipeline::pages::Page;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One page's analysis result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub text: String,
    /// Tokens consumed, if the backend reports usage.
    pub tokens: Option<u64>,
}

impl Analysis {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: None,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

/// Sampling knobs for one call. Scripted analyzers are free to ignore them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl AnalysisOptions {
    /// Free-text questions.
    pub fn for_query(config: &PipelineConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Structured extraction: deterministic sampling, shorter replies.
    pub fn for_extraction(config: &PipelineConfig) -> Self {
        Self {
            temperature: 0.0,
            max_tokens: config.extraction_max_tokens,
        }
    }
}

/// Why an analyzer could not answer for a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AnalyzerError {
    pub message: String,
}

impl AnalyzerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Answers a prompt about a single page image.
pub trait Analyzer: Send + Sync {
    fn analyze(
        &self,
        page: &Page,
        prompt: &str,
        options: &AnalysisOptions,
    ) -> std::result::Result<Analysis, AnalyzerError>;

    /// Model identifier recorded in audit summaries.
    fn model(&self) -> Option<String> {
        None
    }
}

impl<F> Analyzer for F
where
    F: Fn(&Page, &str) -> std::result::Result<Analysis, AnalyzerError> + Send + Sync,
{
    fn analyze(
        &self,
        page: &Page,
        prompt: &str,
        _options: &AnalysisOptions,
    ) -> std::result::Result<Analysis, AnalyzerError> {
        self(page, prompt)
    }
}

/// [`Analyzer`] backed by an `edgequake-llm` vision provider.
pub struct VlmAnalyzer {
    provider: Arc<dyn LLMProvider>,
    handle: Handle,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VlmAnalyzer {
    /// Wrap `provider`, capturing the current tokio runtime.
    ///
    /// # Errors
    /// [`PageMergeError::InvalidConfig`] when called outside a runtime.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            PageMergeError::InvalidConfig(format!("VlmAnalyzer needs a tokio runtime: {e}"))
        })?;
        Ok(Self::with_handle(provider, handle))
    }

    /// Wrap `provider`, running calls on `handle`.
    pub fn with_handle(provider: Arc<dyn LLMProvider>, handle: Handle) -> Self {
        Self {
            provider,
            handle,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }

    /// Resolve a provider from `config` (see [`resolve_provider`]) and take
    /// its retry settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider)?.with_retries(config.max_retries, config.retry_backoff_ms))
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    async fn call_with_retries(
        &self,
        page_num: usize,
        image: ImageData,
        prompt: &str,
        options: &AnalysisOptions,
    ) -> std::result::Result<Analysis, AnalyzerError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let completion = build_options(options);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&completion)).await {
                Ok(response) => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page_num,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let used = (response.prompt_tokens + response.completion_tokens) as u64;
                    return Ok(Analysis {
                        text: response.content,
                        // Zero means the backend did not report usage.
                        tokens: (used > 0).then_some(used),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(AnalyzerError::new(format!(
            "{} retries exhausted: {}",
            self.max_retries,
            last_err.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

impl Analyzer for VlmAnalyzer {
    fn analyze(
        &self,
        page: &Page,
        prompt: &str,
        options: &AnalysisOptions,
    ) -> std::result::Result<Analysis, AnalyzerError> {
        let image = to_image_data(page);
        self.handle
            .block_on(self.call_with_retries(page.page_number(), image, prompt, options))
    }

    fn model(&self) -> Option<String> {
        Some(self.provider.model().to_string())
    }
}

fn build_options(options: &AnalysisOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(options.temperature),
        max_tokens: Some(options.max_tokens),
        ..Default::default()
    }
}

/// Resolve the vision provider, from most to least specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (default [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(provider), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !provider.is_empty() && !model.is_empty() {
            return create_vision_provider(&provider, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PageMergeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "no vision provider could be auto-detected from the environment; \
                set OPENAI_API_KEY or name a provider explicitly ({e})"
            ),
        })?;
    Ok(llm_provider)
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PageMergeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_and_extraction_options() {
        let config = PipelineConfig::default();
        let query = AnalysisOptions::for_query(&config);
        assert_eq!(query.temperature, 0.1);
        assert_eq!(query.max_tokens, 500);

        let extraction = AnalysisOptions::for_extraction(&config);
        assert_eq!(extraction.temperature, 0.0);
        assert_eq!(extraction.max_tokens, 300);
    }

    #[test]
    fn build_options_maps_both_knobs() {
        let opts = build_options(&AnalysisOptions {
            temperature: 0.3,
            max_tokens: 42,
        });
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(42));
    }

    #[test]
    fn closures_are_analyzers() {
        let analyzer = |page: &Page, prompt: &str| -> std::result::Result<Analysis, AnalyzerError> {
            Ok(Analysis::text(format!("{}:{prompt}", page.index)).with_tokens(7))
        };
        let page = Page {
            index: 4,
            png: vec![],
        };
        let options = AnalysisOptions::for_query(&PipelineConfig::default());
        let out = analyzer.analyze(&page, "q", &options).unwrap();
        assert_eq!(out.text, "4:q");
        assert_eq!(out.tokens, Some(7));
    }

    #[test]
    fn named_provider_failure_is_reported() {
        let config = PipelineConfig::builder()
            .provider_name("no-such-provider")
            .build()
            .unwrap();
        match resolve_provider(&config) {
            Err(PageMergeError::ProviderNotConfigured { provider, .. }) => {
                assert_eq!(provider, "no-such-provider")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unknown provider should not resolve"),
        }
    }
}
