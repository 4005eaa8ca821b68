//! PDF form document
//!
//! Wraps a `lopdf::Document` and exposes the AcroForm operations the
//! pipelines need: listing fields and their widgets, creating widgets,
//! setting values with fresh appearance streams, stamping images and
//! flattening. Everything library-specific stays in this module.

use std::collections::{BTreeMap, HashSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::appearance::{self, num};
use super::error::{FieldError, FormError};
use super::geometry::{PageSize, PdfRect};

/// Field flag: radio button (Btn)
const FLAG_RADIO: i64 = 1 << 15;
/// Field flag: push button (Btn)
const FLAG_PUSHBUTTON: i64 = 1 << 16;
/// Annotation flag: print
const ANNOT_PRINT: i64 = 4;
/// Annotation flag: hidden
const ANNOT_HIDDEN: i64 = 2;

/// Native AcroForm field type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Text,
    Checkbox,
    Radio,
    PushButton,
    Choice,
    Signature,
    Unknown,
}

impl NativeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::PushButton => "button",
            Self::Choice => "choice",
            Self::Signature => "signature",
            Self::Unknown => "unknown",
        }
    }
}

/// A terminal field of the document's AcroForm
#[derive(Debug, Clone, PartialEq)]
pub struct NativeField {
    /// Fully qualified name (parent names joined with `.`)
    pub name: String,
    pub kind: NativeKind,
    pub id: ObjectId,
    /// Widget annotations; may include `id` itself for merged dictionaries
    pub widgets: Vec<ObjectId>,
}

/// One on-page instance of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetInstance {
    /// 1-based page number
    pub page: u32,
    pub rect: PdfRect,
}

/// Locate every widget of a field without exposing PDF object references
pub trait WidgetLookup {
    fn widget_instances(&self, name: &str) -> Result<Vec<WidgetInstance>, FieldError>;
}

/// An image stored in the document, ready to be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// A loaded PDF and its interactive form
pub struct FormDocument {
    doc: Document,
    /// Pages whose original content has been wrapped in `q ... Q`
    isolated_pages: HashSet<ObjectId>,
    font_id: Option<ObjectId>,
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rect_object(rect: &PdfRect) -> Object {
    Object::Array(vec![
        real(rect.x),
        real(rect.y),
        real(rect.right()),
        real(rect.top()),
    ])
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise Latin-1)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

impl FormDocument {
    /// Parse PDF bytes
    ///
    /// Fails with `InvalidDocument` when the bytes are not a PDF or the
    /// document has no pages.
    pub fn load(bytes: &[u8]) -> Result<Self, FormError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| FormError::InvalidDocument(format!("Failed to parse PDF: {}", e)))?;
        if doc.get_pages().is_empty() {
            return Err(FormError::InvalidDocument("PDF has no pages".to_string()));
        }
        Ok(Self {
            doc,
            isolated_pages: HashSet::new(),
            font_id: None,
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    fn pages(&self) -> BTreeMap<u32, ObjectId> {
        self.doc.get_pages()
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, FieldError> {
        self.pages()
            .get(&page)
            .copied()
            .ok_or_else(|| FieldError::Widget(format!("page {} does not exist", page)))
    }

    fn page_number(&self, page_id: ObjectId) -> Option<u32> {
        self.pages()
            .into_iter()
            .find(|(_, id)| *id == page_id)
            .map(|(number, _)| number)
    }

    /// Resolve a reference (one level) to the object it points at
    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn dict(&self, id: ObjectId) -> Result<&Dictionary, FieldError> {
        Ok(self.doc.get_object(id).and_then(|o| o.as_dict())?)
    }

    fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, FieldError> {
        Ok(self.doc.get_object_mut(id).and_then(|o| o.as_dict_mut())?)
    }

    /// Look up a key on a dictionary, following the `Parent` chain
    fn inherited<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = Some(dict);
        let mut depth = 0;
        while let Some(d) = current {
            if let Ok(value) = d.get(key) {
                return self.resolve(value);
            }
            depth += 1;
            if depth > 32 {
                return None;
            }
            current = d
                .get(b"Parent")
                .and_then(|p| p.as_reference())
                .ok()
                .and_then(|id| self.doc.get_object(id).ok())
                .and_then(|o| o.as_dict().ok());
        }
        None
    }

    /// Page size from the (possibly inherited) MediaBox
    pub fn page_size(&self, page: u32) -> PageSize {
        let Ok(page_id) = self.page_id(page) else {
            return PageSize::LETTER;
        };
        let Ok(dict) = self.dict(page_id) else {
            return PageSize::LETTER;
        };
        self.inherited(dict, b"MediaBox")
            .and_then(|obj| obj.as_array().ok())
            .filter(|arr| arr.len() == 4)
            .and_then(|arr| {
                let values: Vec<f64> = arr.iter().filter_map(obj_to_f64).collect();
                (values.len() == 4).then(|| PageSize {
                    width: (values[2] - values[0]).abs(),
                    height: (values[3] - values[1]).abs(),
                })
            })
            .filter(|size| size.width > 0.0 && size.height > 0.0)
            .unwrap_or(PageSize::LETTER)
    }

    /// Sizes of all pages, in page order
    pub fn page_sizes(&self) -> Vec<PageSize> {
        (1..=self.page_count() as u32).map(|p| self.page_size(p)).collect()
    }

    fn catalog_id(&self) -> Result<ObjectId, FieldError> {
        Ok(self.doc.trailer.get(b"Root").and_then(|r| r.as_reference())?)
    }

    /// The AcroForm dictionary, inline or referenced
    fn acroform(&self) -> Option<&Dictionary> {
        let catalog = self.dict(self.catalog_id().ok()?).ok()?;
        let acroform = catalog.get(b"AcroForm").ok()?;
        self.resolve(acroform)?.as_dict().ok()
    }

    /// AcroForm object id, creating or un-inlining the dictionary as needed
    fn ensure_acroform(&mut self) -> Result<ObjectId, FieldError> {
        let catalog_id = self.catalog_id()?;
        let existing = self.dict(catalog_id)?.get(b"AcroForm").ok().cloned();
        let id = match existing {
            Some(Object::Reference(id)) => id,
            Some(Object::Dictionary(dict)) => self.doc.add_object(dict),
            _ => {
                let font_id = self.font_id();
                self.doc.add_object(dictionary! {
                    "Fields" => Vec::<Object>::new(),
                    "DA" => Object::string_literal(appearance::default_appearance(0.0)),
                    "DR" => dictionary! {
                        "Font" => dictionary! { appearance::FONT_RESOURCE => font_id },
                    },
                })
            }
        };
        self.dict_mut(catalog_id)?.set("AcroForm", id);
        Ok(id)
    }

    /// Shared Helvetica font object for appearance streams
    fn font_id(&mut self) -> ObjectId {
        match self.font_id {
            Some(id) => id,
            None => {
                let id = self.doc.add_object(appearance::helvetica_font());
                self.font_id = Some(id);
                id
            }
        }
    }

    /// Top-level field references of the AcroForm
    fn root_fields(&self) -> Vec<ObjectId> {
        self.acroform()
            .and_then(|form| form.get(b"Fields").ok())
            .and_then(|fields| self.resolve(fields))
            .and_then(|fields| fields.as_array().ok())
            .map(|arr| arr.iter().filter_map(|o| o.as_reference().ok()).collect())
            .unwrap_or_default()
    }

    fn field_kind(&self, dict: &Dictionary) -> NativeKind {
        let flags = self
            .inherited(dict, b"Ff")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        match self.inherited(dict, b"FT").and_then(|o| o.as_name().ok()) {
            Some(b"Tx") => NativeKind::Text,
            Some(b"Ch") => NativeKind::Choice,
            Some(b"Sig") => NativeKind::Signature,
            Some(b"Btn") if flags & FLAG_PUSHBUTTON != 0 => NativeKind::PushButton,
            Some(b"Btn") if flags & FLAG_RADIO != 0 => NativeKind::Radio,
            Some(b"Btn") => NativeKind::Checkbox,
            _ => NativeKind::Unknown,
        }
    }

    fn collect_fields(&self, id: ObjectId, prefix: &str, depth: usize, out: &mut Vec<NativeField>) {
        if depth > 32 {
            return;
        }
        let Ok(dict) = self.dict(id) else {
            return;
        };
        let partial = dict
            .get(b"T")
            .ok()
            .and_then(|t| self.resolve(t))
            .and_then(|t| t.as_str().ok())
            .map(decode_text_string);
        let name = match (prefix.is_empty(), partial) {
            (true, Some(p)) => p,
            (false, Some(p)) => format!("{}.{}", prefix, p),
            (_, None) => prefix.to_string(),
        };

        let kids: Vec<ObjectId> = dict
            .get(b"Kids")
            .ok()
            .and_then(|k| self.resolve(k))
            .and_then(|k| k.as_array().ok())
            .map(|arr| arr.iter().filter_map(|o| o.as_reference().ok()).collect())
            .unwrap_or_default();

        // Kids carrying their own name are child fields; the rest are widgets
        let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) = kids
            .into_iter()
            .partition(|kid| self.dict(*kid).map(|d| d.has(b"T")).unwrap_or(false));

        for child in child_fields {
            self.collect_fields(child, &name, depth + 1, out);
        }

        let is_widget = dict
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|s| s == b"Widget")
            .unwrap_or(false);
        let mut field_widgets = widgets;
        if is_widget {
            field_widgets.insert(0, id);
        }
        if !field_widgets.is_empty() && !name.is_empty() {
            out.push(NativeField {
                name,
                kind: self.field_kind(dict),
                id,
                widgets: field_widgets,
            });
        }
    }

    /// All terminal fields of the AcroForm
    pub fn fields(&self) -> Vec<NativeField> {
        let mut out = Vec::new();
        for id in self.root_fields() {
            self.collect_fields(id, "", 0, &mut out);
        }
        out
    }

    pub fn find_field(&self, name: &str) -> Result<NativeField, FieldError> {
        self.fields()
            .into_iter()
            .find(|f| f.name == name)
            .ok_or(FieldError::NotFound)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.find_field(name).is_ok()
    }

    fn widget_rect(&self, widget_id: ObjectId) -> Result<PdfRect, FieldError> {
        let dict = self.dict(widget_id)?;
        let values: Vec<f64> = dict
            .get(b"Rect")
            .ok()
            .and_then(|r| self.resolve(r))
            .and_then(|r| r.as_array().ok())
            .map(|arr| arr.iter().filter_map(obj_to_f64).collect())
            .unwrap_or_default();
        if values.len() != 4 {
            return Err(FieldError::Widget("widget has no valid Rect".to_string()));
        }
        Ok(PdfRect::from_corners(values[0], values[1], values[2], values[3]))
    }

    /// References listed in a page's Annots array
    fn page_annotations(&self, page_id: ObjectId) -> Vec<Object> {
        self.dict(page_id)
            .ok()
            .and_then(|d| d.get(b"Annots").ok())
            .and_then(|a| self.resolve(a))
            .and_then(|a| a.as_array().ok())
            .cloned()
            .unwrap_or_default()
    }

    fn set_page_annotations(&mut self, page_id: ObjectId, annots: Vec<Object>) -> Result<(), FieldError> {
        let page = self.dict_mut(page_id)?;
        if annots.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", annots);
        }
        Ok(())
    }

    /// Page a widget lives on, by its `P` entry or by scanning page Annots
    fn widget_page(&self, widget_id: ObjectId) -> Option<u32> {
        let from_p = self
            .dict(widget_id)
            .ok()
            .and_then(|d| d.get(b"P").ok())
            .and_then(|p| p.as_reference().ok())
            .and_then(|page_id| self.page_number(page_id));
        from_p.or_else(|| {
            self.pages().into_iter().find_map(|(number, page_id)| {
                self.page_annotations(page_id)
                    .iter()
                    .any(|a| a.as_reference().ok() == Some(widget_id))
                    .then_some(number)
            })
        })
    }

    /// Remove every widget and the AcroForm itself
    pub fn clear_fields(&mut self) -> Result<usize, FieldError> {
        let mut removed = 0;
        for page_id in self.pages().into_values().collect::<Vec<_>>() {
            let annots = self.page_annotations(page_id);
            if annots.is_empty() {
                continue;
            }
            let before = annots.len();
            let kept: Vec<Object> = annots
                .into_iter()
                .filter(|a| !self.is_widget_annotation(a))
                .collect();
            removed += before - kept.len();
            self.set_page_annotations(page_id, kept)?;
        }

        let catalog_id = self.catalog_id()?;
        self.dict_mut(catalog_id)?.remove(b"AcroForm");
        self.doc.prune_objects();
        self.font_id = None;
        Ok(removed)
    }

    fn is_widget_annotation(&self, annot: &Object) -> bool {
        self.resolve(annot)
            .and_then(|a| a.as_dict().ok())
            .and_then(|d| d.get(b"Subtype").ok())
            .and_then(|s| s.as_name().ok())
            .map(|s| s == b"Widget")
            .unwrap_or(false)
    }

    fn register_widget(&mut self, page_id: ObjectId, widget_id: ObjectId) -> Result<(), FieldError> {
        let form_id = self.ensure_acroform()?;

        let mut annots = self.page_annotations(page_id);
        annots.push(Object::Reference(widget_id));
        self.set_page_annotations(page_id, annots)?;

        let fields = self.dict(form_id)?.get(b"Fields").ok().cloned();
        match fields {
            Some(Object::Reference(array_id)) => {
                self.doc
                    .get_object_mut(array_id)
                    .and_then(|o| o.as_array_mut())?
                    .push(Object::Reference(widget_id));
            }
            Some(Object::Array(mut arr)) => {
                arr.push(Object::Reference(widget_id));
                self.dict_mut(form_id)?.set("Fields", arr);
            }
            _ => {
                self.dict_mut(form_id)?
                    .set("Fields", vec![Object::Reference(widget_id)]);
            }
        }
        Ok(())
    }

    fn base_widget(&self, name: &str, page_id: ObjectId, rect: &PdfRect) -> Result<Dictionary, FieldError> {
        if !rect.is_valid() {
            return Err(FieldError::Synthesis(format!("invalid rectangle {:?}", rect)));
        }
        if self.has_field(name) {
            return Err(FieldError::Synthesis(format!("field {:?} already exists", name)));
        }
        Ok(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => Object::string_literal(name),
            "Rect" => rect_object(rect),
            "P" => page_id,
            "F" => ANNOT_PRINT,
            "MK" => dictionary! {
                "BC" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            },
            "BS" => dictionary! { "W" => 1, "S" => "S" },
        })
    }

    /// Add a single-line text field with a thin border
    pub fn add_text_field(&mut self, page: u32, name: &str, rect: &PdfRect, font_size: f32) -> Result<ObjectId, FieldError> {
        let page_id = self.page_id(page)?;
        let mut widget = self.base_widget(name, page_id, rect)?;
        let font_id = self.font_id();

        let normal = self.doc.add_object(appearance::text_appearance(
            rect.width,
            rect.height,
            "",
            font_size,
            font_id,
            true,
        ));
        widget.set("FT", "Tx");
        widget.set("V", Object::string_literal(""));
        widget.set("DA", Object::string_literal(appearance::default_appearance(font_size)));
        widget.set("AP", dictionary! { "N" => normal });

        let widget_id = self.doc.add_object(widget);
        self.register_widget(page_id, widget_id)?;
        Ok(widget_id)
    }

    /// Add an unchecked checkbox with `Yes`/`Off` appearances
    pub fn add_checkbox(&mut self, page: u32, name: &str, rect: &PdfRect) -> Result<ObjectId, FieldError> {
        let page_id = self.page_id(page)?;
        let mut widget = self.base_widget(name, page_id, rect)?;

        let on = self
            .doc
            .add_object(appearance::checkbox_on_appearance(rect.width, rect.height));
        let off = self
            .doc
            .add_object(appearance::checkbox_off_appearance(rect.width, rect.height));
        widget.set("FT", "Btn");
        widget.set("Ff", 0);
        widget.set("V", Object::Name(b"Off".to_vec()));
        widget.set("AS", Object::Name(b"Off".to_vec()));
        widget.set("AP", dictionary! { "N" => dictionary! { "Yes" => on, "Off" => off } });

        let widget_id = self.doc.add_object(widget);
        self.register_widget(page_id, widget_id)?;
        Ok(widget_id)
    }

    fn expect_kind(field: &NativeField, expected: NativeKind) -> Result<(), FieldError> {
        if field.kind == expected {
            Ok(())
        } else {
            Err(FieldError::TypeMismatch {
                expected: expected.as_str(),
                found: field.kind.as_str().to_string(),
            })
        }
    }

    /// Default appearance for a widget: own DA, inherited DA, AcroForm DA
    fn widget_font_size(&self, widget_id: ObjectId) -> f32 {
        let own = self
            .dict(widget_id)
            .ok()
            .and_then(|d| self.inherited(d, b"DA"))
            .and_then(|o| o.as_str().ok())
            .map(|s| String::from_utf8_lossy(s).into_owned());
        let da = own.or_else(|| {
            self.acroform()
                .and_then(|f| f.get(b"DA").ok())
                .and_then(|o| o.as_str().ok())
                .map(|s| String::from_utf8_lossy(s).into_owned())
        });
        da.as_deref().and_then(appearance::parse_font_size).unwrap_or(0.0)
    }

    /// Set a text field's value and regenerate its widget appearances
    ///
    /// Choice fields take the value as their selected option.
    pub fn set_text(&mut self, name: &str, value: &str) -> Result<(), FieldError> {
        let field = self.find_field(name)?;
        if field.kind != NativeKind::Choice {
            Self::expect_kind(&field, NativeKind::Text)?;
        }

        self.dict_mut(field.id)?
            .set("V", Object::string_literal(value));

        let font_id = self.font_id();
        for widget_id in &field.widgets {
            let rect = self.widget_rect(*widget_id)?;
            let font_size = self.widget_font_size(*widget_id);
            let bordered = self
                .dict(*widget_id)?
                .get(b"MK")
                .ok()
                .and_then(|mk| self.resolve(mk))
                .and_then(|mk| mk.as_dict().ok())
                .map(|mk| mk.has(b"BC"))
                .unwrap_or(false);
            let normal = self.doc.add_object(appearance::text_appearance(
                rect.width,
                rect.height,
                value,
                font_size,
                font_id,
                bordered,
            ));
            self.dict_mut(*widget_id)?
                .set("AP", dictionary! { "N" => normal });
        }
        Ok(())
    }

    /// Name of a checkbox widget's on state (first non-Off appearance)
    fn on_state(&self, widget_id: ObjectId) -> Vec<u8> {
        self.dict(widget_id)
            .ok()
            .and_then(|d| d.get(b"AP").ok())
            .and_then(|ap| self.resolve(ap))
            .and_then(|ap| ap.as_dict().ok())
            .and_then(|ap| ap.get(b"N").ok())
            .and_then(|n| self.resolve(n))
            .and_then(|n| n.as_dict().ok())
            .and_then(|n| {
                n.iter()
                    .map(|(key, _)| key.clone())
                    .find(|key| key.as_slice() != b"Off")
            })
            .unwrap_or_else(|| b"Yes".to_vec())
    }

    /// Set a checkbox's checked state on the field and all its widgets
    ///
    /// For a radio group, checking selects the first option.
    pub fn set_checked(&mut self, name: &str, checked: bool) -> Result<(), FieldError> {
        let field = self.find_field(name)?;
        if field.kind == NativeKind::Radio {
            let option = match field.widgets.first() {
                Some(first) if checked => Some(self.on_state(*first)),
                _ => None,
            };
            return self.select_radio(&field, option);
        }
        Self::expect_kind(&field, NativeKind::Checkbox)?;

        let mut value = b"Off".to_vec();
        for widget_id in &field.widgets {
            let state = if checked {
                self.on_state(*widget_id)
            } else {
                b"Off".to_vec()
            };
            value = state.clone();
            self.dict_mut(*widget_id)?.set("AS", Object::Name(state));
        }
        self.dict_mut(field.id)?.set("V", Object::Name(value));
        Ok(())
    }

    /// Select a radio option by its on-state name
    pub fn select_option(&mut self, name: &str, option: &str) -> Result<(), FieldError> {
        let field = self.find_field(name)?;
        Self::expect_kind(&field, NativeKind::Radio)?;

        let wanted = option.as_bytes();
        if !field.widgets.iter().any(|w| self.on_state(*w) == wanted) {
            return Err(FieldError::TypeMismatch {
                expected: "radio option",
                found: format!("text {:?}", option),
            });
        }
        self.select_radio(&field, Some(wanted.to_vec()))
    }

    /// Turn on the widget whose on state is `option`, everything else off
    fn select_radio(&mut self, field: &NativeField, option: Option<Vec<u8>>) -> Result<(), FieldError> {
        for widget_id in &field.widgets {
            let on = self.on_state(*widget_id);
            let state = match &option {
                Some(selected) if *selected == on => on,
                _ => b"Off".to_vec(),
            };
            self.dict_mut(*widget_id)?.set("AS", Object::Name(state));
        }
        let value = option.unwrap_or_else(|| b"Off".to_vec());
        self.dict_mut(field.id)?.set("V", Object::Name(value));
        Ok(())
    }

    /// Decode an image and store it as an RGB XObject with an alpha SMask
    pub fn embed_image(&mut self, bytes: &[u8]) -> Result<EmbeddedImage, FieldError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| FieldError::ImageDecode(e.to_string()))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(FieldError::ImageDecode("image has no pixels".to_string()));
        }

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in img.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel[3]);
        }

        let smask_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        let id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => smask_id,
            },
            rgb,
        ));
        Ok(EmbeddedImage { id, width, height })
    }

    /// Give the page its own Resources dictionary and return it
    fn page_resources_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, FieldError> {
        let resources = {
            let page = self.dict(page_id)?;
            match self.inherited(page, b"Resources") {
                Some(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            }
        };
        let current = self.dict(page_id)?.get(b"Resources").ok().cloned();
        match current {
            Some(Object::Reference(id)) => {
                Ok(self.doc.get_object_mut(id).and_then(|o| o.as_dict_mut())?)
            }
            _ => {
                let page = self.dict_mut(page_id)?;
                if !matches!(page.get(b"Resources"), Ok(Object::Dictionary(_))) {
                    page.set("Resources", resources);
                }
                Ok(page.get_mut(b"Resources").and_then(|o| o.as_dict_mut())?)
            }
        }
    }

    /// Register an XObject on a page under a fresh name
    fn add_xobject(&mut self, page_id: ObjectId, prefix: &str, xobject_id: ObjectId) -> Result<String, FieldError> {
        let referenced = {
            let resources = self.page_resources_mut(page_id)?;
            match resources.get(b"XObject") {
                Ok(Object::Reference(id)) => Some(*id),
                _ => None,
            }
        };
        // Inline a shared XObject dictionary so other pages are not touched
        let inherited = match referenced {
            Some(id) => Some(self.dict(id)?.clone()),
            None => None,
        };

        let resources = self.page_resources_mut(page_id)?;
        if let Some(dict) = inherited {
            resources.set("XObject", dict);
        }
        if !matches!(resources.get(b"XObject"), Ok(Object::Dictionary(_))) {
            resources.set("XObject", Dictionary::new());
        }
        let xobjects = resources
            .get_mut(b"XObject")
            .and_then(|o| o.as_dict_mut())?;

        let mut index = xobjects.len();
        let name = loop {
            let candidate = format!("{}{}", prefix, index);
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
            index += 1;
        };
        xobjects.set(name.as_str(), xobject_id);
        Ok(name)
    }

    /// Wrap the page's existing content in `q ... Q` once
    fn isolate_page_content(&mut self, page_id: ObjectId) -> Result<(), FieldError> {
        if self.isolated_pages.contains(&page_id) {
            return Ok(());
        }
        let current = self.dict(page_id)?.get(b"Contents").ok().cloned();
        let mut streams = match current {
            Some(Object::Reference(id)) => match self.doc.get_object(id)? {
                Object::Array(arr) => arr.clone(),
                _ => vec![Object::Reference(id)],
            },
            Some(Object::Array(arr)) => arr,
            _ => Vec::new(),
        };
        if !streams.is_empty() {
            let open = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let close = self.doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
            streams.insert(0, Object::Reference(open));
            streams.push(Object::Reference(close));
        }
        self.dict_mut(page_id)?.set("Contents", streams);
        self.isolated_pages.insert(page_id);
        Ok(())
    }

    fn append_page_content(&mut self, page_id: ObjectId, content: String) -> Result<(), FieldError> {
        self.isolate_page_content(page_id)?;
        self.doc.add_page_contents(page_id, content.into_bytes())?;
        Ok(())
    }

    /// Draw an embedded image into `rect` on a 1-based page
    pub fn draw_image(&mut self, page: u32, image: &EmbeddedImage, rect: &PdfRect) -> Result<(), FieldError> {
        if !rect.is_valid() {
            return Err(FieldError::Widget(format!("invalid image placement {:?}", rect)));
        }
        let page_id = self.page_id(page)?;
        let name = self.add_xobject(page_id, "FmImg", image.id)?;
        let content = format!(
            "q {} 0 0 {} {} {} cm /{} Do Q\n",
            num(rect.width),
            num(rect.height),
            num(rect.x),
            num(rect.y),
            name
        );
        self.append_page_content(page_id, content)
    }

    /// Remove a field and all of its widgets from pages and the AcroForm
    pub fn remove_field(&mut self, name: &str) -> Result<(), FieldError> {
        let field = self.find_field(name)?;
        let mut doomed: HashSet<ObjectId> = field.widgets.iter().copied().collect();
        doomed.insert(field.id);

        for page_id in self.pages().into_values().collect::<Vec<_>>() {
            let annots = self.page_annotations(page_id);
            let before = annots.len();
            let kept: Vec<Object> = annots
                .into_iter()
                .filter(|a| a.as_reference().map(|id| !doomed.contains(&id)).unwrap_or(true))
                .collect();
            if kept.len() != before {
                self.set_page_annotations(page_id, kept)?;
            }
        }

        let parent = self
            .dict(field.id)?
            .get(b"Parent")
            .and_then(|p| p.as_reference())
            .ok();
        match parent {
            Some(parent_id) => self.remove_reference(parent_id, b"Kids", &doomed)?,
            None => {
                let form_id = self.ensure_acroform()?;
                self.remove_reference(form_id, b"Fields", &doomed)?;
            }
        }

        for id in doomed {
            self.doc.objects.remove(&id);
        }
        Ok(())
    }

    /// Drop references in `ids` from an array entry of a dictionary
    fn remove_reference(&mut self, owner_id: ObjectId, key: &[u8], ids: &HashSet<ObjectId>) -> Result<(), FieldError> {
        let entry = self.dict(owner_id)?.get(key).ok().cloned();
        let keep = |o: &Object| o.as_reference().map(|id| !ids.contains(&id)).unwrap_or(true);
        match entry {
            Some(Object::Reference(array_id)) => {
                self.doc
                    .get_object_mut(array_id)
                    .and_then(|o| o.as_array_mut())?
                    .retain(keep);
            }
            Some(Object::Array(mut arr)) => {
                arr.retain(keep);
                self.dict_mut(owner_id)?.set(key.to_vec(), arr);
            }
            _ => {}
        }
        Ok(())
    }

    /// Normal appearance stream a widget currently shows
    fn current_appearance(&self, widget: &Dictionary) -> Option<ObjectId> {
        let normal = widget
            .get(b"AP")
            .ok()
            .and_then(|ap| self.resolve(ap))
            .and_then(|ap| ap.as_dict().ok())
            .and_then(|ap| ap.get(b"N").ok())?;
        match normal {
            Object::Reference(id) => match self.doc.get_object(*id).ok()? {
                Object::Stream(_) => Some(*id),
                Object::Dictionary(states) => self.state_appearance(widget, states),
                _ => None,
            },
            Object::Dictionary(states) => self.state_appearance(widget, states),
            _ => None,
        }
    }

    fn state_appearance(&self, widget: &Dictionary, states: &Dictionary) -> Option<ObjectId> {
        let state = widget.get(b"AS").and_then(|s| s.as_name()).ok()?;
        states.get(state).and_then(|s| s.as_reference()).ok()
    }

    /// Bake every widget's appearance into its page and drop the form
    pub fn flatten(&mut self) -> Result<usize, FieldError> {
        let mut stamped = 0;
        for page_id in self.pages().into_values().collect::<Vec<_>>() {
            let annots = self.page_annotations(page_id);
            let mut kept = Vec::with_capacity(annots.len());
            let mut stamps = Vec::new();

            for annot in annots {
                if !self.is_widget_annotation(&annot) {
                    kept.push(annot);
                    continue;
                }
                let Some(widget) = self.resolve(&annot).and_then(|a| a.as_dict().ok()) else {
                    continue;
                };
                let flags = widget.get(b"F").and_then(|f| f.as_i64()).unwrap_or(0);
                if flags & ANNOT_HIDDEN != 0 {
                    continue;
                }
                let Some(appearance_id) = self.current_appearance(widget) else {
                    continue;
                };
                let Some(rect) = annot
                    .as_reference()
                    .ok()
                    .and_then(|id| self.widget_rect(id).ok())
                    .or_else(|| inline_rect(widget))
                else {
                    continue;
                };
                stamps.push((appearance_id, rect));
            }

            for (appearance_id, rect) in stamps {
                let bbox = self.appearance_bbox(appearance_id).unwrap_or(PdfRect::new(0.0, 0.0, rect.width, rect.height));
                if !bbox.is_valid() || !rect.is_valid() {
                    continue;
                }
                self.ensure_form_xobject(appearance_id)?;
                let name = self.add_xobject(page_id, "FmFlat", appearance_id)?;
                let sx = rect.width / bbox.width;
                let sy = rect.height / bbox.height;
                let content = format!(
                    "q {} 0 0 {} {} {} cm /{} Do Q\n",
                    num(sx),
                    num(sy),
                    num(rect.x - bbox.x * sx),
                    num(rect.y - bbox.y * sy),
                    name
                );
                self.append_page_content(page_id, content)?;
                stamped += 1;
            }
            self.set_page_annotations(page_id, kept)?;
        }

        let catalog_id = self.catalog_id()?;
        self.dict_mut(catalog_id)?.remove(b"AcroForm");
        self.doc.prune_objects();
        self.font_id = None;
        Ok(stamped)
    }

    fn appearance_bbox(&self, id: ObjectId) -> Option<PdfRect> {
        let stream = self.doc.get_object(id).ok()?.as_stream().ok()?;
        let values: Vec<f64> = stream
            .dict
            .get(b"BBox")
            .ok()?
            .as_array()
            .ok()?
            .iter()
            .filter_map(obj_to_f64)
            .collect();
        (values.len() == 4).then(|| PdfRect::from_corners(values[0], values[1], values[2], values[3]))
    }

    fn ensure_form_xobject(&mut self, id: ObjectId) -> Result<(), FieldError> {
        let stream = self.doc.get_object_mut(id).and_then(|o| o.as_stream_mut())?;
        stream.dict.set("Type", "XObject");
        stream.dict.set("Subtype", "Form");
        Ok(())
    }

    /// Serialize the document
    pub fn save(&mut self) -> Result<Vec<u8>, FormError> {
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| FormError::Serialization(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
impl FormDocument {
    /// Decoded content of a 1-based page
    pub(crate) fn page_content(&self, page: u32) -> Vec<u8> {
        let page_id = self.page_id(page).unwrap();
        self.doc.get_page_content(page_id).unwrap()
    }

    /// An entry of a field's own dictionary
    pub(crate) fn field_entry(&self, name: &str, key: &[u8]) -> Option<Object> {
        let field = self.find_field(name).ok()?;
        self.dict(field.id).ok()?.get(key).ok().cloned()
    }

    /// Content of the first widget's normal appearance stream
    pub(crate) fn normal_appearance(&self, name: &str) -> Vec<u8> {
        let field = self.find_field(name).unwrap();
        let widget = self.dict(field.widgets[0]).unwrap();
        let id = self.current_appearance(widget).unwrap();
        self.doc.get_object(id).unwrap().as_stream().unwrap().content.clone()
    }

    /// Appearance state (`AS`) of each widget of a field
    pub(crate) fn widget_states(&self, name: &str) -> Vec<Vec<u8>> {
        let field = self.find_field(name).unwrap();
        field
            .widgets
            .iter()
            .map(|id| self.dict(*id).unwrap().get(b"AS").unwrap().as_name().unwrap().to_vec())
            .collect()
    }

    /// Overwrite an entry of a field's dictionary
    pub(crate) fn set_field_entry(&mut self, name: &str, key: &str, value: Object) {
        let field = self.find_field(name).unwrap();
        self.dict_mut(field.id).unwrap().set(key, value);
    }

    /// A radio group with one widget per option, each with `<option>`/`Off` appearances
    pub(crate) fn add_radio_group(&mut self, page: u32, name: &str, options: &[(&str, PdfRect)]) {
        let form_id = self.ensure_acroform().unwrap();
        let page_id = self.page_id(page).unwrap();
        let field_id = self.doc.new_object_id();
        let mut kids = Vec::new();
        for (option, rect) in options {
            let on = self
                .doc
                .add_object(appearance::checkbox_on_appearance(rect.width, rect.height));
            let off = self
                .doc
                .add_object(appearance::checkbox_off_appearance(rect.width, rect.height));
            let widget_id = self.doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Parent" => field_id,
                "Rect" => rect_object(rect),
                "P" => page_id,
                "AS" => "Off",
                "AP" => dictionary! { "N" => dictionary! { *option => on, "Off" => off } },
            });
            let mut annots = self.page_annotations(page_id);
            annots.push(Object::Reference(widget_id));
            self.set_page_annotations(page_id, annots).unwrap();
            kids.push(Object::Reference(widget_id));
        }
        self.doc.objects.insert(
            field_id,
            Object::Dictionary(dictionary! {
                "FT" => "Btn",
                "Ff" => FLAG_RADIO,
                "T" => Object::string_literal(name),
                "V" => "Off",
                "Kids" => kids,
            }),
        );
        let form = self.dict_mut(form_id).unwrap();
        let mut fields = form.get(b"Fields").unwrap().as_array().unwrap().clone();
        fields.push(Object::Reference(field_id));
        form.set("Fields", fields);
    }

    /// A text field whose widgets sit on several pages
    pub(crate) fn add_shared_text_field(&mut self, name: &str, placements: &[(u32, PdfRect)]) {
        let form_id = self.ensure_acroform().unwrap();
        let field_id = self.doc.new_object_id();
        let mut kids = Vec::new();
        for (page, rect) in placements {
            let page_id = self.page_id(*page).unwrap();
            let widget_id = self.doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Parent" => field_id,
                "Rect" => rect_object(rect),
                "P" => page_id,
            });
            let mut annots = self.page_annotations(page_id);
            annots.push(Object::Reference(widget_id));
            self.set_page_annotations(page_id, annots).unwrap();
            kids.push(Object::Reference(widget_id));
        }
        self.doc.objects.insert(
            field_id,
            Object::Dictionary(dictionary! {
                "FT" => "Tx",
                "T" => Object::string_literal(name),
                "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
                "Kids" => kids,
            }),
        );
        let form = self.dict_mut(form_id).unwrap();
        let mut fields = form.get(b"Fields").unwrap().as_array().unwrap().clone();
        fields.push(Object::Reference(field_id));
        form.set("Fields", fields);
    }
}

fn inline_rect(widget: &Dictionary) -> Option<PdfRect> {
    let values: Vec<f64> = widget
        .get(b"Rect")
        .ok()?
        .as_array()
        .ok()?
        .iter()
        .filter_map(obj_to_f64)
        .collect();
    (values.len() == 4).then(|| PdfRect::from_corners(values[0], values[1], values[2], values[3]))
}

impl WidgetLookup for FormDocument {
    fn widget_instances(&self, name: &str) -> Result<Vec<WidgetInstance>, FieldError> {
        let field = self.find_field(name)?;
        let mut instances = Vec::with_capacity(field.widgets.len());
        for widget_id in field.widgets {
            let page = self
                .widget_page(widget_id)
                .ok_or_else(|| FieldError::Widget("widget is not placed on any page".to_string()))?;
            instances.push(WidgetInstance {
                page,
                rect: self.widget_rect(widget_id)?,
            });
        }
        Ok(instances)
    }
}
