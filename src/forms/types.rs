//! Form data types
//!
//! Field descriptors, fill values and the pipeline result payloads.

use serde::{Deserialize, Serialize};

use super::error::FieldIssue;

/// Kind of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    Date,
    Signature,
    Checkbox,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Tel => "tel",
            Self::Date => "date",
            Self::Signature => "signature",
            Self::Checkbox => "checkbox",
        }
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self, Self::Checkbox)
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, Self::Signature)
    }
}

impl Default for FieldKind {
    fn default() -> Self {
        Self::Text
    }
}

/// Rectangle in normalized page units (0-1, top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One detected or synthesized form field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Normalized identifier, unique within a document
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// 1-based page number
    pub page: u32,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<String>,
    /// Label text the field was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<NormalizedRect>,
    is_checkbox: bool,
    is_signature: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, page: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            page,
            required: false,
            suggested_value: None,
            label: None,
            bounds: None,
            is_checkbox: kind.is_checkbox(),
            is_signature: kind.is_signature(),
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_suggested_value(mut self, value: Option<String>) -> Self {
        self.suggested_value = value;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach bounds; degenerate rectangles are dropped
    pub fn with_bounds(mut self, bounds: Option<NormalizedRect>) -> Self {
        self.bounds = bounds.filter(|b| b.width > 0.0 && b.height > 0.0);
        self
    }

    pub fn is_checkbox(&self) -> bool {
        self.is_checkbox
    }

    pub fn is_signature(&self) -> bool {
        self.is_signature
    }
}

/// A value to write into a field, decided once when the request is parsed
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
    /// Decoded image bytes (PNG or any format the `image` crate reads)
    SignatureImage(Vec<u8>),
}

/// Result of the analyze pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    pub form_fields: Vec<FieldDescriptor>,
    /// Base64 encoded PDF with the synthesized widgets
    pub modified_pdf: String,
    pub page_count: usize,
    pub skipped_fields: Vec<FieldIssue>,
}

/// Native fields already present in a PDF
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    pub form_fields: Vec<FieldDescriptor>,
    pub page_count: usize,
}
