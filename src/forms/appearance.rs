//! Widget appearance streams
//!
//! Builds the normal-appearance form XObjects for text fields and
//! checkboxes so filled values render without the viewer regenerating
//! them.

use lopdf::{dictionary, Object, ObjectId, Stream};

/// Resource name of the Helvetica font inside appearance streams
pub const FONT_RESOURCE: &str = "Helv";

const AUTO_FONT_MAX: f64 = 12.0;
const AUTO_FONT_MIN: f64 = 4.0;
/// Average Helvetica advance as a fraction of the font size
const AVERAGE_ADVANCE: f64 = 0.5;
const PADDING: f64 = 2.0;

/// Compact number formatting for content streams
pub(crate) fn num(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Font size from a default appearance string such as `/Helv 10 Tf 0 g`
pub fn parse_font_size(da: &str) -> Option<f32> {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let index = tokens.iter().position(|t| *t == "Tf")?;
    tokens.get(index.checked_sub(1)?)?.parse().ok()
}

/// Default appearance string for synthesized text fields
pub fn default_appearance(font_size: f32) -> String {
    format!("/{} {} Tf 0 g", FONT_RESOURCE, num(font_size as f64))
}

/// Encode text as WinAnsi bytes; unmappable characters become `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => b' ',
            c if (c as u32) < 0x20 => b' ',
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// WinAnsi bytes escaped for a literal string operand
fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    for &b in bytes {
        if matches!(b, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Font size that fits `text` into a box, for `0 Tf` (auto) fields
pub fn auto_font_size(width: f64, height: f64, text: &str) -> f64 {
    let by_height = (height - 2.0 * PADDING) / 1.15;
    let chars = text.chars().count().max(1) as f64;
    let by_width = (width - 2.0 * PADDING) / (chars * AVERAGE_ADVANCE);
    by_height.min(by_width).clamp(AUTO_FONT_MIN, AUTO_FONT_MAX)
}

fn border_ops(width: f64, height: f64) -> String {
    format!(
        "0 G 1 w 0.5 0.5 {} {} re S\n",
        num((width - 1.0).max(0.0)),
        num((height - 1.0).max(0.0))
    )
}

/// Wrap content into a form XObject with a `[0 0 w h]` bounding box
pub fn form_xobject(width: f64, height: f64, content: Vec<u8>, resources: Option<lopdf::Dictionary>) -> Stream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(width as f32), Object::Real(height as f32)],
    };
    if let Some(resources) = resources {
        dict.set("Resources", resources);
    }
    Stream::new(dict, content)
}

/// Normal appearance for a single-line text field
pub fn text_appearance(width: f64, height: f64, value: &str, font_size: f32, font_id: ObjectId, border: bool) -> Stream {
    let size = if font_size > 0.0 {
        font_size as f64
    } else {
        auto_font_size(width, height, value)
    };
    let baseline = ((height - size) / 2.0 + size * 0.22).max(PADDING / 2.0);

    let mut content = Vec::new();
    content.extend_from_slice(b"/Tx BMC\nq\n");
    if border {
        content.extend_from_slice(border_ops(width, height).as_bytes());
    }
    if !value.is_empty() {
        content.extend_from_slice(
            format!(
                "1 1 {} {} re W n\nBT\n/{} {} Tf 0 g\n{} {} Td\n(",
                num((width - 2.0).max(0.0)),
                num((height - 2.0).max(0.0)),
                FONT_RESOURCE,
                num(size),
                num(PADDING),
                num(baseline)
            )
            .as_bytes(),
        );
        content.extend(escape_literal(&encode_win_ansi(value)));
        content.extend_from_slice(b") Tj\nET\n");
    }
    content.extend_from_slice(b"Q\nEMC\n");

    let resources = dictionary! {
        "Font" => dictionary! { FONT_RESOURCE => font_id },
    };
    form_xobject(width, height, content, Some(resources))
}

/// Checked state: border plus a drawn check mark
pub fn checkbox_on_appearance(width: f64, height: f64) -> Stream {
    let mut ops = String::from("q\n");
    ops.push_str(&border_ops(width, height));
    ops.push_str(&format!(
        "{} w 1 J 1 j\n{} {} m {} {} l {} {} l S\nQ\n",
        num((width.min(height) / 8.0).max(1.0)),
        num(width * 0.2),
        num(height * 0.5),
        num(width * 0.42),
        num(height * 0.25),
        num(width * 0.8),
        num(height * 0.78)
    ));
    form_xobject(width, height, ops.into_bytes(), None)
}

/// Unchecked state: border only
pub fn checkbox_off_appearance(width: f64, height: f64) -> Stream {
    let ops = format!("q\n{}Q\n", border_ops(width, height));
    form_xobject(width, height, ops.into_bytes(), None)
}

/// Standard 14 Helvetica with WinAnsi encoding
pub fn helvetica_font() -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}
