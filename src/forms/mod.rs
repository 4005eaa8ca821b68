//! Form field inference
//!
//! Detects prompts in a document's layout, synthesizes interactive fields
//! for them, and fills those fields back in.
//!
//! # Architecture
//!
//! ```text
//!  oracle text blocks
//!          │
//!          ▼
//!   ┌──────────────┐   ┌──────────────┐
//!   │   classify   │──▶│   geometry   │   label → kind, name, input rect
//!   └──────────────┘   └──────────────┘
//!          │
//!          ▼
//!   ┌──────────────┐   ┌──────────────┐
//!   │  synthesize  │──▶│   document   │   widgets in the PDF (lopdf)
//!   └──────────────┘   └──────────────┘
//!                             ▲
//!   ┌──────────────┐          │
//!   │     fill     │──────────┘          text, checkbox, signature image
//!   └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use formins_server::forms::{fill_form, AnalyzerOptions, FillOptions, FormAnalyzer, ValueMap};
//!
//! let analyzer = FormAnalyzer::new(oracle, AnalyzerOptions::default());
//! let analysis = analyzer.analyze(pdf_bytes).await?;
//!
//! let values = ValueMap::from_json(r#"{"full_name": "Jane Doe", "i_agree": true}"#)?;
//! let outcome = fill_form(&modified_pdf, &values, FillOptions::default())?;
//! ```

mod analyze;
mod appearance;
mod classify;
mod document;
mod error;
mod fill;
mod geometry;
mod inspect;
mod synthesize;
mod types;

pub use analyze::{plan_fields, AnalyzerOptions, FormAnalyzer};
pub use classify::{
    classify, classify_native, is_excluded, normalize_field_name, parse_prompt, split_label, Classification,
    KeywordTable, ParsedPrompt,
};
pub use document::{FormDocument, NativeField, NativeKind, WidgetInstance, WidgetLookup};
pub use error::{FieldError, FieldIssue, FieldStage, FormError};
pub use fill::{fill_form, parse_checkbox_token, FillOptions, FillOutcome, ValueMap};
pub use geometry::{fit_image, to_pdf_rect, GeometryConfig, PageSize, PdfRect};
pub use inspect::inspect_fields;
pub use synthesize::{create_widget, synthesize_fields, FieldCandidate};
pub use types::{AnalyzeResult, FieldDescriptor, FieldKind, FieldValue, InspectResult, NormalizedRect};

#[cfg(test)]
pub(crate) use analyze::test_support as oracle_fixtures;
#[cfg(test)]
pub(crate) use document::test_support as pdf_fixtures;
