//! Filler pipeline
//!
//! Applies a value map to a PDF's fields. Each entry is dispatched on its
//! value type: text, checkbox state or signature image. An entry that cannot
//! be applied is skipped and reported; the document is still produced.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

use super::document::{FormDocument, NativeKind, WidgetLookup};
use super::error::{FieldError, FieldIssue, FormError};
use super::geometry::fit_image;
use super::types::FieldValue;

const DATA_URI_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

/// Field values decided once at the request boundary
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(String, FieldValue)>,
    /// Entries whose value could not be decoded
    rejected: Vec<FieldIssue>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON text of a value map
    pub fn from_json(raw: &str) -> Result<Self, FormError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| FormError::InvalidValues(format!("values are not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Build from a JSON object of primitive values
    ///
    /// Booleans become checkbox states, `data:image/...;base64,` strings
    /// become signature images, other primitives become text.
    pub fn from_value(value: Value) -> Result<Self, FormError> {
        let Value::Object(object) = value else {
            return Err(FormError::InvalidValues("values must be a JSON object".to_string()));
        };

        let mut map = Self::new();
        for (name, value) in object {
            let decoded = match value {
                Value::Bool(checked) => FieldValue::Checked(checked),
                Value::Null => FieldValue::Text(String::new()),
                Value::Number(n) => FieldValue::Text(n.to_string()),
                Value::String(s) => match decode_data_uri(&s) {
                    None => FieldValue::Text(s),
                    Some(Ok(bytes)) => FieldValue::SignatureImage(bytes),
                    Some(Err(e)) => {
                        tracing::warn!("Rejecting value for {}: {}", name, e);
                        map.rejected.push(FieldIssue::fill(name, e));
                        continue;
                    }
                },
                Value::Array(_) | Value::Object(_) => {
                    return Err(FormError::InvalidValues(format!(
                        "value for {:?} must be a string, number, boolean or null",
                        name
                    )));
                }
            };
            map.entries.push((name, decoded));
        }
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn rejected(&self) -> &[FieldIssue] {
        &self.rejected
    }
}

/// Decode `data:image/<type>;base64,<payload>`; `None` if not an image URI
fn decode_data_uri(value: &str) -> Option<Result<Vec<u8>, FieldError>> {
    let rest = value.strip_prefix(DATA_URI_PREFIX)?;
    let Some(marker) = rest.find(BASE64_MARKER) else {
        return Some(Err(FieldError::ImageDecode(
            "image data URI is not base64 encoded".to_string(),
        )));
    };
    let payload: String = rest[marker + BASE64_MARKER.len()..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    Some(
        BASE64
            .decode(payload)
            .map_err(|e| FieldError::ImageDecode(format!("bad base64 payload: {}", e))),
    )
}

/// Checkbox state from a text value such as "yes" or "off"
pub fn parse_checkbox_token(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "checked" | "x" => Some(true),
        "false" | "no" | "off" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Fill settings
#[derive(Debug, Clone, Copy, Default)]
pub struct FillOptions {
    /// Bake the remaining widgets into page content
    pub flatten: bool,
}

/// Filled document plus a per-field report
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub pdf: Vec<u8>,
    pub filled: Vec<String>,
    pub skipped: Vec<FieldIssue>,
}

/// Apply `values` to the PDF and serialize the result
pub fn fill_form(pdf: &[u8], values: &ValueMap, options: FillOptions) -> Result<FillOutcome, FormError> {
    let mut doc = FormDocument::load(pdf)?;
    let mut filled = Vec::new();
    let mut skipped = values.rejected().to_vec();

    for (name, value) in values.iter() {
        match apply_value(&mut doc, name, value) {
            Ok(()) => filled.push(name.to_string()),
            Err(FieldError::NotFound) => {
                tracing::debug!("No field named {}, skipping", name);
                skipped.push(FieldIssue::fill(name, FieldError::NotFound));
            }
            Err(e) => {
                tracing::warn!("Failed to fill {}: {}", name, e);
                skipped.push(FieldIssue::fill(name, e));
            }
        }
    }

    if options.flatten {
        let stamped = doc
            .flatten()
            .map_err(|e| FormError::Serialization(format!("Failed to flatten form: {}", e)))?;
        tracing::debug!("Flattened {} widgets", stamped);
    }

    let pdf = doc.save()?;
    Ok(FillOutcome { pdf, filled, skipped })
}

fn apply_value(doc: &mut FormDocument, name: &str, value: &FieldValue) -> Result<(), FieldError> {
    let field = doc.find_field(name)?;
    match value {
        FieldValue::SignatureImage(bytes) => draw_signature(doc, name, bytes),
        FieldValue::Checked(checked) => doc.set_checked(name, *checked),
        FieldValue::Text(text) if field.kind == NativeKind::Checkbox => {
            let checked = parse_checkbox_token(text).ok_or_else(|| FieldError::TypeMismatch {
                expected: "checkbox state",
                found: format!("text {:?}", text),
            })?;
            doc.set_checked(name, checked)
        }
        FieldValue::Text(text) if field.kind == NativeKind::Radio => {
            doc.select_option(name, text).or_else(|e| match parse_checkbox_token(text) {
                Some(checked) => doc.set_checked(name, checked),
                None => Err(e),
            })
        }
        FieldValue::Text(text) => doc.set_text(name, text),
    }
}

/// Stamp the image into every widget rectangle, then drop the field
///
/// Every widget rectangle is checked before anything is drawn.
fn draw_signature(doc: &mut FormDocument, name: &str, bytes: &[u8]) -> Result<(), FieldError> {
    let instances = doc.widget_instances(name)?;
    if let Some(bad) = instances.iter().find(|i| !i.rect.is_valid()) {
        return Err(FieldError::Widget(format!(
            "widget on page {} has an empty rectangle {:?}",
            bad.page, bad.rect
        )));
    }

    let image = doc.embed_image(bytes)?;
    for instance in &instances {
        let placement = fit_image(&instance.rect, image.width, image.height);
        doc.draw_image(instance.page, &image, &placement)?;
    }
    doc.remove_field(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::document::test_support::{blank_pdf, tiny_png};
    use crate::forms::geometry::PdfRect;
    use lopdf::Object;
    use serde_json::json;

    fn form_pdf() -> Vec<u8> {
        let mut doc = FormDocument::load(&blank_pdf(1)).unwrap();
        doc.add_text_field(1, "full_name", &PdfRect::new(100.0, 600.0, 150.0, 16.0), 10.0)
            .unwrap();
        doc.add_checkbox(1, "i_agree", &PdfRect::new(100.0, 500.0, 12.0, 12.0))
            .unwrap();
        doc.add_text_field(1, "signature_field", &PdfRect::new(50.0, 700.0, 100.0, 50.0), 0.0)
            .unwrap();
        doc.save().unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn data_uri(bytes: &[u8]) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(bytes))
    }

    fn values(value: Value) -> ValueMap {
        ValueMap::from_value(value).unwrap()
    }

    #[test]
    fn test_value_map_types() {
        let map = values(json!({
            "full_name": "Jane Doe",
            "i_agree": true,
            "age": 42,
            "middle_name": null,
            "signature_field": data_uri(&tiny_png()),
        }));
        assert_eq!(map.len(), 5);
        assert!(map.rejected().is_empty());

        let get = |name: &str| map.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone()).unwrap();
        assert_eq!(get("full_name"), FieldValue::Text("Jane Doe".to_string()));
        assert_eq!(get("i_agree"), FieldValue::Checked(true));
        assert_eq!(get("age"), FieldValue::Text("42".to_string()));
        assert_eq!(get("middle_name"), FieldValue::Text(String::new()));
        assert!(matches!(get("signature_field"), FieldValue::SignatureImage(_)));
    }

    #[test]
    fn test_value_map_fatal_shapes() {
        assert!(matches!(ValueMap::from_json("not json"), Err(FormError::InvalidValues(_))));
        assert!(matches!(ValueMap::from_json("[1, 2]"), Err(FormError::InvalidValues(_))));
        assert!(matches!(
            ValueMap::from_json(r#"{"a": {"nested": true}}"#),
            Err(FormError::InvalidValues(_))
        ));
        assert!(matches!(ValueMap::from_json(r#"{"a": [1]}"#), Err(FormError::InvalidValues(_))));
    }

    #[test]
    fn test_bad_data_uri_is_rejected_not_fatal() {
        let map = values(json!({
            "signature_field": "data:image/png;base64,@@@",
            "plain": "data:image/png,rawbytes",
            "full_name": "Jane",
        }));
        assert_eq!(map.len(), 1);
        assert_eq!(map.rejected().len(), 2);
        assert!(map.rejected().iter().all(|issue| issue.reason.code() == "invalid_image"));
    }

    #[test]
    fn test_missing_field_changes_nothing() {
        let pdf = form_pdf();
        let base = fill_form(&pdf, &values(json!({"full_name": "Jane Doe"})), FillOptions::default()).unwrap();
        let with_ghost = fill_form(
            &pdf,
            &values(json!({"full_name": "Jane Doe", "ghost": "boo"})),
            FillOptions::default(),
        )
        .unwrap();

        assert_eq!(base.pdf, with_ghost.pdf);
        assert_eq!(with_ghost.filled, vec!["full_name".to_string()]);
        assert_eq!(with_ghost.skipped.len(), 1);
        assert_eq!(with_ghost.skipped[0].name, "ghost");
        assert_eq!(with_ghost.skipped[0].reason, FieldError::NotFound);
    }

    #[test]
    fn test_fill_text_and_checkbox() {
        let outcome = fill_form(
            &form_pdf(),
            &values(json!({"full_name": "Jane Doe", "i_agree": true})),
            FillOptions::default(),
        )
        .unwrap();
        assert!(outcome.skipped.is_empty());

        let doc = FormDocument::load(&outcome.pdf).unwrap();
        let value = doc.field_entry("full_name", b"V").unwrap();
        assert_eq!(value.as_str().unwrap(), b"Jane Doe");
        let appearance = String::from_utf8_lossy(&doc.normal_appearance("full_name")).into_owned();
        assert!(appearance.contains("(Jane Doe) Tj"));

        let state = doc.field_entry("i_agree", b"AS").unwrap();
        assert_eq!(state.as_name().unwrap(), b"Yes");
        let check = String::from_utf8_lossy(&doc.normal_appearance("i_agree")).into_owned();
        assert!(check.contains(" l S"), "checked appearance draws the mark");
    }

    #[test]
    fn test_checkbox_text_tokens() {
        let outcome = fill_form(
            &form_pdf(),
            &values(json!({"i_agree": "Yes", "full_name": true})),
            FillOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.filled, vec!["i_agree".to_string()]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason.code(), "type_mismatch");

        let outcome = fill_form(&form_pdf(), &values(json!({"i_agree": "maybe"})), FillOptions::default()).unwrap();
        assert_eq!(outcome.skipped[0].reason.code(), "type_mismatch");

        assert_eq!(parse_checkbox_token(" ON "), Some(true));
        assert_eq!(parse_checkbox_token(""), Some(false));
    }

    #[test]
    fn test_signature_replaces_widget() {
        let outcome = fill_form(
            &form_pdf(),
            &values(json!({"signature_field": data_uri(&tiny_png())})),
            FillOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.filled, vec!["signature_field".to_string()]);

        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert!(!doc.has_field("signature_field"));
        assert!(doc.has_field("full_name"));
        let content = String::from_utf8_lossy(&doc.page_content(1)).into_owned();
        // 1x1 image in a 100x50 widget: height-constrained 50x50, centered
        assert!(content.contains("q 50 0 0 50 75 700 cm /FmImg0 Do Q"));
    }

    #[test]
    fn test_signature_aspect_ratio() {
        let outcome = fill_form(
            &form_pdf(),
            &values(json!({"signature_field": data_uri(&png(400, 100))})),
            FillOptions::default(),
        )
        .unwrap();
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        let content = String::from_utf8_lossy(&doc.page_content(1)).into_owned();
        assert!(content.contains("q 100 0 0 25 50 712.5 cm /FmImg0 Do Q"));
    }

    #[test]
    fn test_signature_on_every_widget() {
        let mut doc = FormDocument::load(&blank_pdf(2)).unwrap();
        doc.add_shared_text_field(
            "initials",
            &[
                (1, PdfRect::new(500.0, 50.0, 40.0, 20.0)),
                (2, PdfRect::new(500.0, 50.0, 40.0, 20.0)),
            ],
        );
        let pdf = doc.save().unwrap();

        let outcome = fill_form(&pdf, &values(json!({"initials": data_uri(&png(2, 1))})), FillOptions::default()).unwrap();
        assert!(outcome.skipped.is_empty());

        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert!(!doc.has_field("initials"));
        for page in 1..=2 {
            let content = String::from_utf8_lossy(&doc.page_content(page)).into_owned();
            assert!(content.contains("q 40 0 0 20 500 50 cm /FmImg0 Do Q"), "page {}", page);
        }
    }

    #[test]
    fn test_signature_with_empty_widget_draws_nothing() {
        let mut doc = FormDocument::load(&blank_pdf(2)).unwrap();
        doc.add_shared_text_field(
            "initials",
            &[
                (1, PdfRect::new(500.0, 50.0, 40.0, 20.0)),
                (2, PdfRect::new(500.0, 50.0, 40.0, 0.0)),
            ],
        );
        let pdf = doc.save().unwrap();

        let outcome = fill_form(&pdf, &values(json!({"initials": data_uri(&tiny_png())})), FillOptions::default()).unwrap();
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason.code(), "widget_error");

        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert!(doc.has_field("initials"));
        for page in 1..=2 {
            let content = String::from_utf8_lossy(&doc.page_content(page)).into_owned();
            assert!(!content.contains("FmImg"), "page {}", page);
        }
    }

    fn radio_and_choice_pdf() -> Vec<u8> {
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
        doc.save().unwrap()
    }

    #[test]
    fn test_radio_group_values() {
        let pdf = radio_and_choice_pdf();

        let outcome = fill_form(&pdf, &values(json!({"member": "Silver"})), FillOptions::default()).unwrap();
        assert!(outcome.skipped.is_empty());
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert_eq!(doc.widget_states("member"), vec![b"Off".to_vec(), b"Silver".to_vec()]);
        assert_eq!(doc.field_entry("member", b"V").unwrap().as_name().unwrap(), b"Silver");

        let outcome = fill_form(&pdf, &values(json!({"member": true})), FillOptions::default()).unwrap();
        assert!(outcome.skipped.is_empty());
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert_eq!(doc.widget_states("member"), vec![b"Gold".to_vec(), b"Off".to_vec()]);

        let outcome = fill_form(&pdf, &values(json!({"member": "off"})), FillOptions::default()).unwrap();
        assert!(outcome.skipped.is_empty());
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert_eq!(doc.field_entry("member", b"V").unwrap().as_name().unwrap(), b"Off");

        let outcome = fill_form(&pdf, &values(json!({"member": "Bronze"})), FillOptions::default()).unwrap();
        assert_eq!(outcome.skipped[0].reason.code(), "type_mismatch");
    }

    #[test]
    fn test_choice_field_takes_text() {
        let outcome = fill_form(
            &radio_and_choice_pdf(),
            &values(json!({"country": "Canada"})),
            FillOptions::default(),
        )
        .unwrap();
        assert!(outcome.skipped.is_empty());
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert_eq!(doc.field_entry("country", b"V").unwrap().as_str().unwrap(), b"Canada");
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let pdf = form_pdf();
        let outcome = fill_form(
            &pdf,
            &values(json!({"signature_field": data_uri(b"not an image")})),
            FillOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.skipped[0].reason.code(), "invalid_image");
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert!(doc.has_field("signature_field"));
    }

    #[test]
    fn test_flatten_option() {
        let outcome = fill_form(
            &form_pdf(),
            &values(json!({"full_name": "Jane Doe"})),
            FillOptions { flatten: true },
        )
        .unwrap();
        let doc = FormDocument::load(&outcome.pdf).unwrap();
        assert!(doc.fields().is_empty());
    }

    #[test]
    fn test_invalid_pdf_is_fatal() {
        let result = fill_form(b"garbage", &ValueMap::new(), FillOptions::default());
        assert!(matches!(result, Err(FormError::InvalidDocument(_))));
    }
}
