// src/palette.rs

//! The plain-text palette file format.
//!
//! One hex color per line (`RRGGBB` or `AARRGGBB`), `;` starts a line
//! comment, blank and comment-only lines are ignored. A palette always
//! has exactly [`PALETTE_SIZE`] slots: parsing pads with opaque white and
//! truncates overlong files. Peripheral to the document engine, but part
//! of its file-format surface.

use log::warn;

use crate::color::ColorBgra;

/// Fixed number of swatch slots in a palette.
pub const PALETTE_SIZE: usize = 96;

/// Parses palette text into exactly [`PALETTE_SIZE`] colors.
///
/// Lines that fail to parse as hex colors are skipped with a warning;
/// this mirrors the forgiving behavior users expect from hand-edited
/// palette files.
pub fn parse_palette(text: &str) -> Vec<ColorBgra> {
    let mut colors = Vec::with_capacity(PALETTE_SIZE);

    for (line_number, line) in text.lines().enumerate() {
        let content = match line.split(';').next() {
            Some(c) => c.trim(),
            None => "",
        };
        if content.is_empty() {
            continue;
        }
        if colors.len() == PALETTE_SIZE {
            // Overlong file: remaining entries are truncated away.
            break;
        }
        match parse_hex_color(content) {
            Some(color) => colors.push(color),
            None => warn!(
                "palette line {}: '{}' is not a hex color, skipping",
                line_number + 1,
                content
            ),
        }
    }

    colors.resize(PALETTE_SIZE, ColorBgra::WHITE);
    colors
}

/// Formats colors as palette text, one `AARRGGBB` line per slot.
pub fn format_palette(colors: &[ColorBgra]) -> String {
    let mut out = String::with_capacity(colors.len() * 9);
    for color in colors {
        out.push_str(&format!(
            "{:02X}{:02X}{:02X}{:02X}\n",
            color.a, color.r, color.g, color.b
        ));
    }
    out
}

/// Parses `RRGGBB` (opaque) or `AARRGGBB` hex notation.
fn parse_hex_color(s: &str) -> Option<ColorBgra> {
    let value = u32::from_str_radix(s, 16).ok()?;
    match s.len() {
        6 => Some(ColorBgra::from_rgb(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        )),
        8 => Some(ColorBgra::from_bgra(
            value as u8,
            (value >> 8) as u8,
            (value >> 16) as u8,
            (value >> 24) as u8,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_blanks_and_both_widths() {
        let text = "; my palette\n\nFF0000\n80102030 ; half-alpha\nnot-a-color\n";
        let colors = parse_palette(text);
        assert_eq!(colors.len(), PALETTE_SIZE);
        assert_eq!(colors[0], ColorBgra::from_rgb(255, 0, 0));
        assert_eq!(colors[1], ColorBgra::from_bgra(0x30, 0x20, 0x10, 0x80));
        // Bad line skipped; rest padded with white.
        assert_eq!(colors[2], ColorBgra::WHITE);
        assert_eq!(colors[PALETTE_SIZE - 1], ColorBgra::WHITE);
    }

    #[test]
    fn truncates_overlong_files() {
        let text = "000000\n".repeat(PALETTE_SIZE + 10);
        let colors = parse_palette(&text);
        assert_eq!(colors.len(), PALETTE_SIZE);
        assert!(colors.iter().all(|&c| c == ColorBgra::BLACK));
    }

    #[test]
    fn format_parse_round_trip() {
        let mut colors = vec![ColorBgra::WHITE; PALETTE_SIZE];
        colors[0] = ColorBgra::from_bgra(1, 2, 3, 4);
        colors[95] = ColorBgra::from_rgb(9, 8, 7);
        let text = format_palette(&colors);
        assert_eq!(parse_palette(&text), colors);
    }
}
