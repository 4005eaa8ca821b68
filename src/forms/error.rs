//! Form pipeline error types
//!
//! `FormError` aborts a whole analyze or fill request. `FieldError` only
//! skips the field it belongs to and is reported back as a `FieldIssue`.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::oracle::OracleError;

/// Pipeline-level error: the request cannot produce a result
#[derive(Debug, Error)]
pub enum FormError {
    /// Bytes are not a PDF, or the PDF has no pages
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The value map is not a JSON object of primitive values
    #[error("Invalid field values: {0}")]
    InvalidValues(String),

    /// The document-analysis service failed
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// The PDF could not be written back out
    #[error("Failed to save PDF: {0}")]
    Serialization(String),

    /// Background worker failed
    #[error("Worker task failed: {0}")]
    Task(String),
}

/// Per-field error: the field is skipped, the request continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("Failed to create widget: {0}")]
    Synthesis(String),

    #[error("Field not found in document")]
    NotFound,

    #[error("Expected a {expected} field, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("Invalid signature image: {0}")]
    ImageDecode(String),

    #[error("Widget error: {0}")]
    Widget(String),
}

impl FieldError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Synthesis(_) => "synthesis_failed",
            Self::NotFound => "not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ImageDecode(_) => "invalid_image",
            Self::Widget(_) => "widget_error",
        }
    }
}

impl From<lopdf::Error> for FieldError {
    fn from(err: lopdf::Error) -> Self {
        FieldError::Widget(err.to_string())
    }
}

/// Pipeline stage in which a field was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStage {
    Synthesis,
    Fill,
}

/// Why a single field was skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub name: String,
    pub stage: FieldStage,
    #[serde(rename = "code", serialize_with = "serialize_code")]
    pub reason: FieldError,
    #[serde(rename = "reason")]
    pub message: String,
}

impl FieldIssue {
    pub fn new(name: impl Into<String>, stage: FieldStage, reason: FieldError) -> Self {
        let message = reason.to_string();
        Self {
            name: name.into(),
            stage,
            reason,
            message,
        }
    }

    pub fn synthesis(name: impl Into<String>, reason: FieldError) -> Self {
        Self::new(name, FieldStage::Synthesis, reason)
    }

    pub fn fill(name: impl Into<String>, reason: FieldError) -> Self {
        Self::new(name, FieldStage::Fill, reason)
    }
}

fn serialize_code<S: Serializer>(reason: &FieldError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(reason.code())
}
