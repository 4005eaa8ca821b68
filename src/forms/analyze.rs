//! Analyzer pipeline
//!
//! Load → Extract → Classify + Transform → Synthesize → Serialize.
//! Load and Extract failures abort the request; anything that goes wrong
//! with a single field only drops that field.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::classify::{parse_prompt, KeywordTable, ParsedPrompt};
use super::document::FormDocument;
use super::error::FormError;
use super::geometry::{to_pdf_rect, GeometryConfig, PageSize, PdfRect};
use super::synthesize::{synthesize_fields, FieldCandidate};
use super::types::{AnalyzeResult, FieldKind};
use crate::config::AnalysisConfig;
use crate::oracle::{DocumentAnalyzer, KeyValuePair, TextBlock, PDF_MIME_TYPE};

/// Analyzer settings
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    /// Scan every page, not only the first
    pub all_pages: bool,
    pub geometry: GeometryConfig,
    pub keywords: KeywordTable,
}

impl AnalyzerOptions {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            all_pages: config.all_pages,
            geometry: config.geometry.clone(),
            keywords: KeywordTable::default(),
        }
    }
}

/// Runs the analyze pipeline against a document-analysis oracle
pub struct FormAnalyzer {
    oracle: Arc<dyn DocumentAnalyzer>,
    options: AnalyzerOptions,
}

impl FormAnalyzer {
    pub fn new(oracle: Arc<dyn DocumentAnalyzer>, options: AnalyzerOptions) -> Self {
        Self { oracle, options }
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Detect fields, synthesize widgets and return the augmented PDF
    pub async fn analyze(&self, pdf: Vec<u8>) -> Result<AnalyzeResult, FormError> {
        let (doc, page_sizes, pdf) = tokio::task::spawn_blocking(move || {
            let doc = FormDocument::load(&pdf)?;
            let page_sizes = doc.page_sizes();
            Ok::<_, FormError>((doc, page_sizes, pdf))
        })
        .await
        .map_err(|e| FormError::Task(e.to_string()))??;
        tracing::debug!("Loaded PDF with {} pages", page_sizes.len());

        let document = self.oracle.process(&pdf, PDF_MIME_TYPE).await?;
        drop(pdf);

        let options = self.options.clone();
        let oracle_name = self.oracle.name().to_string();
        tokio::task::spawn_blocking(move || {
            let blocks = document.text_blocks()?;
            tracing::debug!("{} returned {} text blocks", oracle_name, blocks.len());

            let candidates = plan_fields(&blocks, &page_sizes, &options);
            tracing::info!("Planned {} field candidates", candidates.len());
            synthesize_document(doc, &candidates, &options.geometry)
        })
        .await
        .map_err(|e| FormError::Task(e.to_string()))?
    }

    /// Key/value pairs the oracle detected, without touching the PDF
    pub async fn extract_pairs(&self, pdf: &[u8]) -> Result<Vec<KeyValuePair>, FormError> {
        let document = self.oracle.process(pdf, PDF_MIME_TYPE).await?;
        Ok(document.key_value_pairs()?)
    }
}

/// Clear existing fields, create the planned ones and serialize
fn synthesize_document(
    mut doc: FormDocument,
    candidates: &[FieldCandidate],
    geometry: &GeometryConfig,
) -> Result<AnalyzeResult, FormError> {
    let removed = doc
        .clear_fields()
        .map_err(|e| FormError::InvalidDocument(format!("Failed to clear existing fields: {}", e)))?;
    if removed > 0 {
        tracing::debug!("Removed {} pre-existing widgets", removed);
    }

    let (form_fields, skipped_fields) = synthesize_fields(&mut doc, candidates, geometry);
    let bytes = doc.save()?;

    Ok(AnalyzeResult {
        form_fields,
        modified_pdf: BASE64.encode(bytes),
        page_count: doc.page_count(),
        skipped_fields,
    })
}

/// Turn oracle text blocks into placed field candidates
///
/// The first block that yields a given name wins; later ones are ignored.
pub fn plan_fields(blocks: &[TextBlock], page_sizes: &[PageSize], options: &AnalyzerOptions) -> Vec<FieldCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for block in blocks {
        if !options.all_pages && block.page_index > 0 {
            continue;
        }
        let Some(page_size) = page_sizes.get(block.page_index).copied() else {
            tracing::debug!("Ignoring block on unknown page {}", block.page_index + 1);
            continue;
        };
        if !block.has_geometry() {
            continue;
        }
        let Some(prompt) = parse_prompt(&block.text, &options.keywords) else {
            continue;
        };
        if !seen.insert(prompt.name.clone()) {
            tracing::debug!("Duplicate field name {}, keeping first occurrence", prompt.name);
            continue;
        }

        let kind = prompt.classification.kind;
        let Some(rect) = to_pdf_rect(&block.vertices, page_size, Some(prompt.separator_index), kind, &options.geometry) else {
            continue;
        };
        let page = block.page_index as u32 + 1;

        if prompt.yes_no {
            for sibling in yes_no_candidates(&prompt, page, rect, page_size, &options.geometry) {
                if seen.insert(sibling.name.clone()) {
                    candidates.push(sibling);
                }
            }
        } else {
            candidates.push(FieldCandidate {
                name: prompt.name,
                label: prompt.label,
                kind,
                required: prompt.classification.required,
                suggested_value: prompt.suggested_value,
                page,
                rect,
            });
        }
    }

    candidates
}

/// Two sibling checkboxes, `<name>_yes` and `<name>_no`, a fixed distance apart
fn yes_no_candidates(
    prompt: &ParsedPrompt,
    page: u32,
    rect: PdfRect,
    page_size: PageSize,
    geometry: &GeometryConfig,
) -> [FieldCandidate; 2] {
    let mut yes_rect = rect;
    let mut no_rect = rect.shifted_x(geometry.yes_no_spacing);
    let overflow = no_rect.right() - page_size.width;
    if overflow > 0.0 {
        yes_rect = yes_rect.shifted_x(-overflow);
        no_rect = no_rect.shifted_x(-overflow);
    }

    let sibling = |suffix: &str, option: &str, rect: PdfRect| FieldCandidate {
        name: format!("{}_{}", prompt.name, suffix),
        label: format!("{} ({})", prompt.label, option),
        kind: FieldKind::Checkbox,
        required: prompt.classification.required,
        suggested_value: None,
        page,
        rect,
    };
    [sibling("yes", "Yes", yes_rect), sibling("no", "No", no_rect)]
}
