//! Native field inspection
//!
//! Describes the fields a PDF already carries, without consulting the
//! oracle or modifying the document.

use super::classify::{classify_native, normalize_field_name, Classification, KeywordTable};
use super::document::{FormDocument, NativeKind, WidgetLookup};
use super::error::FormError;
use super::types::{FieldDescriptor, FieldKind, InspectResult, NormalizedRect};

fn classify_field(native: NativeKind, name: &str, table: &KeywordTable) -> Classification {
    let toggles = matches!(native, NativeKind::Checkbox | NativeKind::Radio);
    let mut classification = classify_native(&normalize_field_name(name), toggles, table);
    classification.required = name.contains(table.required_marker);
    match native {
        NativeKind::Signature => classification.kind = FieldKind::Signature,
        // Only toggle widgets accept a checked state when filled
        _ if !toggles && classification.is_checkbox() => classification.kind = FieldKind::Text,
        _ => {}
    }
    classification
}

/// List the document's existing fields as descriptors
///
/// Names are reported exactly as stored so they can be filled back.
/// Page and bounds come from the first widget.
pub fn inspect_fields(pdf: &[u8], table: &KeywordTable) -> Result<InspectResult, FormError> {
    let doc = FormDocument::load(pdf)?;
    let mut form_fields = Vec::new();

    for field in doc.fields() {
        if field.kind == NativeKind::PushButton {
            continue;
        }
        let first = match doc.widget_instances(&field.name) {
            Ok(instances) => instances.into_iter().next(),
            Err(e) => {
                tracing::warn!("Could not locate widgets of {}: {}", field.name, e);
                None
            }
        };
        let page = first.map(|w| w.page).unwrap_or(1);
        let bounds = first.and_then(|w| NormalizedRect::from_pdf_rect(&w.rect, doc.page_size(w.page)));
        let classification = classify_field(field.kind, &field.name, table);

        form_fields.push(
            FieldDescriptor::new(field.name.clone(), classification.kind, page)
                .with_required(classification.required)
                .with_bounds(bounds),
        );
    }

    Ok(InspectResult {
        form_fields,
        page_count: doc.page_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::document::test_support::blank_pdf;
    use crate::forms::fill::{fill_form, FillOptions, ValueMap};
    use crate::forms::geometry::PdfRect;
    use lopdf::Object;

    #[test]
    fn test_inspect_lists_native_fields() {
        let mut doc = FormDocument::load(&blank_pdf(2)).unwrap();
        doc.add_text_field(2, "Applicant Email", &PdfRect::new(100.0, 600.0, 150.0, 16.0), 10.0)
            .unwrap();
        doc.add_checkbox(1, "consent", &PdfRect::new(61.2, 396.0, 12.0, 12.0))
            .unwrap();
        let bytes = doc.save().unwrap();

        let result = inspect_fields(&bytes, &KeywordTable::default()).unwrap();
        assert_eq!(result.page_count, 2);
        assert_eq!(result.form_fields.len(), 2);

        let email = &result.form_fields[0];
        assert_eq!(email.name, "Applicant Email");
        assert_eq!(email.kind, FieldKind::Email);
        assert_eq!(email.page, 2);

        let consent = &result.form_fields[1];
        assert!(consent.is_checkbox());
        let bounds = consent.bounds.unwrap();
        assert!((bounds.x - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_inspected_kinds_are_fillable() {
        let mut doc = FormDocument::load(&blank_pdf(1)).unwrap();
        doc.add_radio_group(
            1,
            "member",
            &[
                ("Gold", PdfRect::new(100.0, 400.0, 12.0, 12.0)),
                ("Silver", PdfRect::new(140.0, 400.0, 12.0, 12.0)),
            ],
        );
        doc.add_text_field(1, "country", &PdfRect::new(100.0, 300.0, 150.0, 16.0), 10.0)
            .unwrap();
        doc.set_field_entry("country", "FT", Object::Name(b"Ch".to_vec()));
        doc.add_text_field(1, "i_agree", &PdfRect::new(100.0, 200.0, 150.0, 16.0), 10.0)
            .unwrap();
        let bytes = doc.save().unwrap();

        let result = inspect_fields(&bytes, &KeywordTable::default()).unwrap();
        let member = &result.form_fields[0];
        assert_eq!(member.name, "member");
        assert!(member.is_checkbox());
        let country = &result.form_fields[1];
        assert_eq!(country.kind, FieldKind::Text);
        assert!(!result.form_fields.iter().any(|f| f.name == "i_agree" && f.is_checkbox()));

        let mut values = serde_json::Map::new();
        values.insert(member.name.clone(), serde_json::Value::Bool(true));
        values.insert(country.name.clone(), serde_json::Value::String("Canada".to_string()));
        values.insert("i_agree".to_string(), serde_json::Value::String("I do".to_string()));
        let values = ValueMap::from_value(serde_json::Value::Object(values)).unwrap();

        let outcome = fill_form(&bytes, &values, FillOptions::default()).unwrap();
        assert!(outcome.skipped.is_empty(), "{:?}", outcome.skipped);
        assert_eq!(outcome.filled.len(), 3);
    }

    #[test]
    fn test_inspect_without_form() {
        let result = inspect_fields(&blank_pdf(1), &KeywordTable::default()).unwrap();
        assert!(result.form_fields.is_empty());
        assert_eq!(result.page_count, 1);
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(
            inspect_fields(b"nope", &KeywordTable::default()),
            Err(FormError::InvalidDocument(_))
        ));
    }
}
