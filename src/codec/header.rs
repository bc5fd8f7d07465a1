// src/codec/header.rs

//! The XML document header.
//!
//! The header is a single `<pdnImage>` element carrying four reserved
//! attributes (`width`, `height`, `layers`, `savedWithVersion`) and one
//! nested `<custom>` element whose inner XML belongs to the application
//! layer and must round-trip byte-for-byte. The engine treats everything
//! beyond the reserved attributes as opaque passenger data, so parsing
//! here is a small hand-rolled scanner over the fixed envelope rather
//! than a general XML reader; a DOM would re-serialize the custom block
//! and lose the verbatim guarantee.

use anyhow::Result;
use log::warn;

use super::Version;
use crate::error::DocumentError;

/// Parsed form of the header envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentHeader {
    pub width: i32,
    pub height: i32,
    pub layer_count: usize,
    pub saved_with: Version,
    /// Inner XML of `<custom>`, verbatim.
    pub custom: String,
}

/// Renders the header envelope. The custom block is inserted verbatim.
pub(crate) fn render_header(header: &DocumentHeader) -> String {
    format!(
        "<pdnImage width=\"{}\" height=\"{}\" layers=\"{}\" savedWithVersion=\"{}\"><custom>{}</custom></pdnImage>",
        header.width, header.height, header.layer_count, header.saved_with, header.custom
    )
}

/// Parses a header envelope.
///
/// `width` and `height` are required and must be numeric; a header
/// without them is not a usable document. `layers` and
/// `savedWithVersion` degrade to defaults with a warning; the body is
/// the authority for both anyway.
pub(crate) fn parse_header(xml: &str) -> Result<DocumentHeader> {
    let tag = root_tag(xml)?;

    let width: i32 = require_numeric_attr(tag, "width")?;
    let height: i32 = require_numeric_attr(tag, "height")?;

    let layer_count = match find_attr(tag, "layers") {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("header attribute layers='{}' is not numeric; using 0", value);
            0
        }),
        None => 0,
    };

    let saved_with = match find_attr(tag, "savedWithVersion") {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(
                "header attribute savedWithVersion='{}' is malformed; using 0.0.0.0",
                value
            );
            Version::default()
        }),
        None => Version::default(),
    };

    Ok(DocumentHeader {
        width,
        height,
        layer_count,
        saved_with,
        custom: custom_inner(xml).to_string(),
    })
}

/// The contents of the root start tag, between `<pdnImage` and `>`.
fn root_tag(xml: &str) -> Result<&str> {
    let start = xml
        .find("<pdnImage")
        .ok_or_else(|| DocumentError::InvalidFormat("header has no <pdnImage> element".into()))?;
    let rest = &xml[start + "<pdnImage".len()..];
    let end = rest
        .find('>')
        .ok_or_else(|| DocumentError::InvalidFormat("header root tag is unterminated".into()))?;
    Ok(&rest[..end])
}

/// Scans `name="value"` pairs inside a start tag.
fn find_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    loop {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let mut chars = after.char_indices();
        let (_, quote) = chars.next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let close = after[1..].find(quote)?;
        let value = &after[1..1 + close];
        if key == name {
            return Some(value);
        }
        rest = &after[1 + close + 1..];
    }
}

fn require_numeric_attr(tag: &str, name: &str) -> Result<i32> {
    let value = find_attr(tag, name).ok_or_else(|| {
        DocumentError::InvalidFormat(format!("header is missing the '{}' attribute", name))
    })?;
    value.parse().map_err(|_| {
        DocumentError::InvalidFormat(format!(
            "header attribute {}='{}' is not numeric",
            name, value
        ))
        .into()
    })
}

/// The verbatim inner XML of `<custom>`. Uses the first open and the
/// last close so nested `<custom>` elements inside the passenger data
/// survive untouched. Missing block = empty string.
fn custom_inner(xml: &str) -> &str {
    let open = match xml.find("<custom>") {
        Some(i) => i + "<custom>".len(),
        None => return "",
    };
    match xml.rfind("</custom>") {
        Some(close) if close >= open => &xml[open..close],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_parse_round_trip() {
        let header = DocumentHeader {
            width: 800,
            height: 600,
            layer_count: 3,
            saved_with: Version::new(4, 1, 0, 2),
            custom: "<appData pinned=\"yes\"><note>hi</note></appData>".to_string(),
        };
        let xml = render_header(&header);
        assert_eq!(parse_header(&xml).unwrap(), header);
    }

    #[test]
    fn custom_block_round_trips_verbatim() {
        let custom = "  raw text <custom>nested</custom> & unescaped ";
        let header = DocumentHeader {
            width: 1,
            height: 1,
            layer_count: 1,
            saved_with: Version::default(),
            custom: custom.to_string(),
        };
        let xml = render_header(&header);
        assert_eq!(parse_header(&xml).unwrap().custom, custom);
    }

    #[test]
    fn missing_width_is_a_format_error() {
        let err = parse_header("<pdnImage height=\"5\"><custom></custom></pdnImage>").unwrap_err();
        assert!(err.downcast_ref::<DocumentError>().is_some());
    }

    #[test]
    fn malformed_optional_attrs_degrade_to_defaults() {
        let xml = "<pdnImage width=\"2\" height=\"3\" layers=\"many\" savedWithVersion=\"new!\"><custom></custom></pdnImage>";
        let header = parse_header(xml).unwrap();
        assert_eq!((header.width, header.height), (2, 3));
        assert_eq!(header.layer_count, 0);
        assert_eq!(header.saved_with, Version::default());
    }

    #[test]
    fn foreign_attribute_order_and_extras_are_tolerated() {
        let xml = "<pdnImage savedWithVersion=\"1.2\" extra='x' height=\"7\" width=\"9\"><custom></custom></pdnImage>";
        let header = parse_header(xml).unwrap();
        assert_eq!((header.width, header.height), (9, 7));
        assert_eq!(header.saved_with, Version::new(1, 2, 0, 0));
    }
}
