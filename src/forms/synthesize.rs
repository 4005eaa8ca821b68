//! Field synthesis
//!
//! Creates native widgets for planned field candidates. A candidate that
//! cannot be created is skipped and reported; the rest still go in.

use super::document::FormDocument;
use super::error::{FieldError, FieldIssue};
use super::geometry::{GeometryConfig, PdfRect};
use super::types::{FieldDescriptor, FieldKind, NormalizedRect};

/// A classified and placed field, ready to become a widget
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidate {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub suggested_value: Option<String>,
    /// 1-based page number
    pub page: u32,
    pub rect: PdfRect,
}

impl FieldCandidate {
    fn descriptor(&self, bounds: Option<NormalizedRect>) -> FieldDescriptor {
        FieldDescriptor::new(self.name.clone(), self.kind, self.page)
            .with_required(self.required)
            .with_suggested_value(self.suggested_value.clone())
            .with_label(self.label.clone())
            .with_bounds(bounds)
    }
}

/// Add one widget for `candidate` and describe it
///
/// Text-like kinds get a text widget at the configured font size.
/// Signatures get a text widget with font size 0, since they are filled
/// with an image rather than typed.
pub fn create_widget(
    doc: &mut FormDocument,
    candidate: &FieldCandidate,
    geometry: &GeometryConfig,
) -> Result<FieldDescriptor, FieldError> {
    let created = match candidate.kind {
        FieldKind::Checkbox => doc.add_checkbox(candidate.page, &candidate.name, &candidate.rect),
        FieldKind::Signature => doc.add_text_field(candidate.page, &candidate.name, &candidate.rect, 0.0),
        _ => doc.add_text_field(
            candidate.page,
            &candidate.name,
            &candidate.rect,
            geometry.text_font_size,
        ),
    };

    created.map_err(|e| match e {
        FieldError::Synthesis(_) => e,
        other => FieldError::Synthesis(other.to_string()),
    })?;

    let page_size = doc.page_size(candidate.page);
    Ok(candidate.descriptor(NormalizedRect::from_pdf_rect(&candidate.rect, page_size)))
}

/// Create widgets for every candidate, collecting the ones that failed
pub fn synthesize_fields(
    doc: &mut FormDocument,
    candidates: &[FieldCandidate],
    geometry: &GeometryConfig,
) -> (Vec<FieldDescriptor>, Vec<FieldIssue>) {
    let mut descriptors = Vec::with_capacity(candidates.len());
    let mut skipped = Vec::new();

    for candidate in candidates {
        match create_widget(doc, candidate, geometry) {
            Ok(descriptor) => {
                tracing::debug!(
                    "Created {} field {} on page {}",
                    candidate.kind.as_str(),
                    candidate.name,
                    candidate.page
                );
                descriptors.push(descriptor);
            }
            Err(e) => {
                tracing::warn!("Skipping field {}: {}", candidate.name, e);
                skipped.push(FieldIssue::synthesis(candidate.name.clone(), e));
            }
        }
    }

    (descriptors, skipped)
}
