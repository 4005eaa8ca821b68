//! Document analysis oracle
//!
//! The external text/layout extraction service the form pipeline consults.
//! It is treated as a black box that returns the document text plus
//! normalized bounding polygons per paragraph.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use formins_server::oracle::{DocumentAiProvider, DocumentAnalyzer};
//!
//! let provider = DocumentAiProvider::new(config.oracle.clone());
//! let document = provider.process(&pdf_bytes, "application/pdf").await?;
//! let blocks = document.text_blocks()?;
//! ```

mod provider;
mod types;

pub use provider::{DocumentAiProvider, DocumentAnalyzer};
pub use types::{
    BoundingPoly, FormFieldPair, KeyValuePair, Layout, NormalizedVertex, OracleDocument, OracleError,
    OraclePage, Paragraph, TextAnchor, TextBlock, TextSegment,
};

#[cfg(test)]
pub use provider::MockAnalyzer;

/// MIME type submitted with every analysis request
pub const PDF_MIME_TYPE: &str = "application/pdf";
