//! Configuration types for page normalisation and result reconciliation.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Rendering knobs are also available on their own
//! as [`RenderOptions`] for callers that only need the page stream.

use crate::audit::AuditSink;
use crate::error::PageMergeError;
use crate::pipeline::fields::FieldTaxonomy;
use crate::progress::PageProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default rasterisation resolution for PDF pages.
pub const DEFAULT_DPI: u32 = 150;

/// Default cap on the longest rendered edge, in pixels.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 4000;

/// Rendering parameters for PDF pages.
///
/// TIFF frames and single images are never rescaled; these options only
/// apply to PDF rasterisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered width or height in pixels. Default: 4000.
    ///
    /// An A0 poster at 150 DPI is roughly 7 000 × 9 900 px. The cap scales
    /// such pages down proportionally so a single page cannot exhaust memory.
    pub max_rendered_pixels: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
        }
    }
}

/// Configuration for a document-level `query` or `extract`.
///
/// # Example
/// ```rust
/// use edgequake_pagemerge::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_pages(10)
///     .list_fields(["medications", "allergies"])
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, Some(10));
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// PDF rendering DPI. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Stop after this many pages. `None` processes every page.
    pub max_pages: Option<usize>,

    /// Field names merged as lists rather than first-non-empty scalars.
    pub taxonomy: FieldTaxonomy,

    /// Sampling temperature for free-text queries. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per page for free-text queries. Default: 500.
    pub max_tokens: usize,

    /// Maximum tokens per page for structured extraction. Default: 300.
    ///
    /// Extraction runs at temperature 0.0 regardless of `temperature`.
    pub extraction_max_tokens: usize,

    /// Retry attempts on a transient VLM failure before the page fails. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Model identifier passed to the provider factory.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "ollama", "lmstudio").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Optional per-page progress events.
    pub progress_callback: Option<Arc<dyn PageProgressCallback>>,

    /// Optional receiver for per-document audit summaries.
    pub audit_sink: Option<Arc<dyn AuditSink>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            max_pages: None,
            taxonomy: FieldTaxonomy::default(),
            temperature: 0.1,
            max_tokens: 500,
            extraction_max_tokens: 300,
            max_retries: 3,
            retry_backoff_ms: 500,
            model: None,
            provider_name: None,
            provider: None,
            progress_callback: None,
            audit_sink: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("taxonomy", &self.taxonomy)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("extraction_max_tokens", &self.extraction_max_tokens)
            .field("max_retries", &self.max_retries)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PageProgressCallback>"),
            )
            .field("audit_sink", &self.audit_sink.as_ref().map(|_| "<dyn AuditSink>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The PDF rendering subset of this configuration.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.dpi,
            max_rendered_pixels: self.max_rendered_pixels,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn taxonomy(mut self, taxonomy: FieldTaxonomy) -> Self {
        self.config.taxonomy = taxonomy;
        self
    }

    /// Replace the list-like field set.
    pub fn list_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.taxonomy = FieldTaxonomy::new(names);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn extraction_max_tokens(mut self, n: usize) -> Self {
        self.config.extraction_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn PageProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.config.audit_sink = Some(sink);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PageMergeError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PageMergeError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 || c.extraction_max_tokens == 0 {
            return Err(PageMergeError::InvalidConfig(
                "Token limits must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_at_150_dpi() {
        let config = PipelineConfig::default();
        assert_eq!(config.render_options(), RenderOptions::default());
        assert_eq!(config.render_options().dpi, 150);
        assert_eq!(config.max_pages, None);
    }

    #[test]
    fn builder_clamps_dpi() {
        let config = PipelineConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(config.dpi, 400);
        let config = PipelineConfig::builder().dpi(1).build().unwrap();
        assert_eq!(config.dpi, 72);
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let err = PipelineConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(matches!(err, PageMergeError::InvalidConfig(_)));
    }

    #[test]
    fn list_fields_replaces_taxonomy() {
        let config = PipelineConfig::builder()
            .list_fields(["Vitals"])
            .build()
            .unwrap();
        assert!(config.taxonomy.is_list_like("vitals"));
        assert!(!config.taxonomy.is_list_like("medications"));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", PipelineConfig::default());
        assert!(dbg.contains("PipelineConfig"));
        assert!(dbg.contains("dpi: 150"));
    }
}
