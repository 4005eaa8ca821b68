//! Oracle Types
//!
//! Wire types for the document-analysis service and the text blocks the
//! form pipeline consumes.

use serde::{Deserialize, Deserializer, Serialize};

/// A vertex of a bounding polygon, normalized to the page (0-1, top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedVertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl NormalizedVertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One paragraph of text detected by the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Page index (0-based, in document order)
    pub page_index: usize,
    /// Raw text content
    pub text: String,
    /// Bounding polygon: top-left, top-right, bottom-right, bottom-left
    pub vertices: Vec<NormalizedVertex>,
}

impl TextBlock {
    /// Whether the block carries the four vertices the geometry needs
    pub fn has_geometry(&self) -> bool {
        self.vertices.len() >= 4
    }
}

/// A key/value pair detected by the oracle's form parser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValuePair {
    pub field_name: String,
    pub field_value: String,
    /// 1-based page number
    pub page: usize,
}

/// Request body of the `:process` call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub raw_document: RawDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    /// Base64 encoded file content
    pub content: String,
    pub mime_type: String,
}

/// Response body of the `:process` call
#[derive(Debug, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub document: Option<OracleDocument>,
}

/// The analysed document: full text plus per-page layout
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleDocument {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pages: Vec<OraclePage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OraclePage {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub form_fields: Vec<FormFieldPair>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldPair {
    #[serde(default)]
    pub field_name: Option<Layout>,
    #[serde(default)]
    pub field_value: Option<Layout>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default)]
    pub text_anchor: Option<TextAnchor>,
    #[serde(default)]
    pub bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnchor {
    #[serde(default, alias = "segments")]
    pub text_segments: Vec<TextSegment>,
}

/// Offsets into `OracleDocument::text`, in characters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    #[serde(default, alias = "start", deserialize_with = "de_index")]
    pub start_index: usize,
    #[serde(default, alias = "end", deserialize_with = "de_index")]
    pub end_index: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingPoly {
    #[serde(default)]
    pub normalized_vertices: Vec<NormalizedVertex>,
}

/// int64 values arrive as JSON strings in proto3 JSON; accept both forms
fn de_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Index {
        Number(usize),
        Text(String),
    }

    match Index::deserialize(deserializer)? {
        Index::Number(n) => Ok(n),
        Index::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Document analysis error types
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Document analysis is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to reach document analysis service: {0}")]
    Transport(String),

    #[error("Document analysis returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("Analysis response contains no pages or text")]
    EmptyDocument,
}

impl OracleError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Byte offset of every char boundary in the document text
///
/// Built once per document so anchors resolve by slicing.
struct CharOffsets(Vec<usize>);

impl CharOffsets {
    fn new(text: &str) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Self(offsets)
    }

    fn char_count(&self) -> usize {
        self.0.len() - 1
    }

    fn resolve(&self, text: &str, anchor: &TextAnchor) -> Result<String, OracleError> {
        let total = self.char_count();
        let mut out = String::new();
        for segment in &anchor.text_segments {
            if segment.start_index > segment.end_index || segment.end_index > total {
                return Err(OracleError::MalformedResponse(format!(
                    "text segment {}..{} outside document text of {} characters",
                    segment.start_index, segment.end_index, total
                )));
            }
            out.push_str(&text[self.0[segment.start_index]..self.0[segment.end_index]]);
        }
        Ok(out)
    }
}

impl OracleDocument {
    /// Resolve a text anchor into its text
    pub fn anchor_text(&self, anchor: &TextAnchor) -> Result<String, OracleError> {
        CharOffsets::new(&self.text).resolve(&self.text, anchor)
    }

    /// Flatten the paragraphs of every page into text blocks
    ///
    /// Fails with `EmptyDocument` when the response carries no pages or no text.
    pub fn text_blocks(&self) -> Result<Vec<TextBlock>, OracleError> {
        if self.pages.is_empty() || self.text.trim().is_empty() {
            return Err(OracleError::EmptyDocument);
        }

        let offsets = CharOffsets::new(&self.text);
        let mut blocks = Vec::new();
        for (page_index, page) in self.pages.iter().enumerate() {
            for paragraph in &page.paragraphs {
                let Some(anchor) = paragraph.layout.text_anchor.as_ref() else {
                    continue;
                };
                let text = offsets.resolve(&self.text, anchor)?;
                let vertices = paragraph
                    .layout
                    .bounding_poly
                    .as_ref()
                    .map(|poly| poly.normalized_vertices.clone())
                    .unwrap_or_default();
                blocks.push(TextBlock {
                    page_index,
                    text: text.trim().to_string(),
                    vertices,
                });
            }
        }
        Ok(blocks)
    }

    /// Key/value pairs found by the form parser on every page
    pub fn key_value_pairs(&self) -> Result<Vec<KeyValuePair>, OracleError> {
        let offsets = CharOffsets::new(&self.text);
        let mut pairs = Vec::new();
        for (page_index, page) in self.pages.iter().enumerate() {
            for field in &page.form_fields {
                let name = match field.field_name.as_ref().and_then(|l| l.text_anchor.as_ref()) {
                    Some(anchor) => offsets.resolve(&self.text, anchor)?,
                    None => "Unknown".to_string(),
                };
                let value = match field.field_value.as_ref().and_then(|l| l.text_anchor.as_ref()) {
                    Some(anchor) => offsets.resolve(&self.text, anchor)?,
                    None => String::new(),
                };
                pairs.push(KeyValuePair {
                    field_name: name.trim().to_string(),
                    field_value: value.trim().to_string(),
                    page: page_index + 1,
                });
            }
        }
        Ok(pairs)
    }
}
