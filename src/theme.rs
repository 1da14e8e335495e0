//! Theme loading: btop-style `theme[key]="value"` and hex → colours.

use grainfall::{PALETTE, Rgb};
use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Piece palette and UI colours.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Piece colours in draw order; difficulty takes a prefix of these.
    pub pieces: Vec<Rgb>,
    /// Playfield background.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, level).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Secondary text (key help).
    pub inactive_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark_default()
    }
}

/// btop keys that feed the piece palette, in palette order.
const PIECE_KEYS: [&str; 7] = [
    "hi_fg", "net_box", "mem_box", "title", "cpu_end", "proc_box", "cpu_start",
];

impl Theme {
    /// One Dark UI colours around the stock neon piece palette.
    pub fn onedark_default() -> Self {
        Self {
            pieces: PALETTE.to_vec(),
            bg: Color::Rgb(0x31, 0x35, 0x3f),
            div_line: Color::Rgb(0x3f, 0x44, 0x4f),
            main_fg: Color::Rgb(0xab, 0xb2, 0xbf),
            title: Color::Rgb(0xe5, 0xc0, 0x7b),
            inactive_fg: Color::Rgb(0x5c, 0x63, 0x70),
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to defaults if path is None or the file is missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ThemeError> {
        let path = match path {
            Some(p) if p.exists() => p,
            _ => return Ok(Self::default()),
        };
        let s = std::fs::read_to_string(path)?;
        let map = parse_theme_file(&s);
        Ok(Self::from_map(&map))
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).and_then(|v| parse_hex(v).ok());
        let base = Self::onedark_default();
        let pieces = PIECE_KEYS
            .iter()
            .zip(PALETTE)
            .map(|(&key, fallback)| get(key).unwrap_or(fallback))
            .collect();
        Self {
            pieces,
            bg: get("meter_bg").map_or(base.bg, color),
            div_line: get("div_line").map_or(base.div_line, color),
            main_fg: get("main_fg").map_or(base.main_fg, color),
            title: get("title").map_or(base.title, color),
            inactive_fg: get("inactive_fg").map_or(base.inactive_fg, color),
        }
    }
}

#[inline]
pub fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(stripped) = line.strip_prefix("theme[") else {
            continue;
        };
        let Some(end) = stripped.find(']') else {
            continue;
        };
        let key = stripped[..end].trim();
        let rest = stripped[end + 1..].trim();
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB".
pub fn parse_hex(s: &str) -> Result<Rgb, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    if s.len() == 3 && s.is_ascii() {
        let digit = |i: usize| u8::from_str_radix(&s[i..=i], 16).map(|v| v * 17);
        return match (digit(0), digit(1), digit(2)) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Rgb(r, g, b)),
            _ => Err(invalid()),
        };
    }
    Rgb::from_hex(s).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_6() {
        assert_eq!(parse_hex("#98C379").unwrap(), Rgb(0x98, 0xC3, 0x79));
    }

    #[test]
    fn test_parse_hex_3() {
        assert_eq!(parse_hex("#FFF").unwrap(), Rgb(255, 255, 255));
        assert!(parse_hex("#GG0").is_err());
        assert!(parse_hex("#12345").is_err());
    }

    #[test]
    fn test_parse_theme_line() {
        let map = parse_theme_file(r##"theme[meter_bg]="#31353F""##);
        assert_eq!(map.get("meter_bg"), Some(&"#31353F".to_string()));
    }

    #[test]
    fn test_pieces_from_theme_with_fallbacks() {
        let map = parse_theme_file(
            "# comment\ntheme[hi_fg]='#112233'\ntheme[mem_box]=\"bogus\"\ntheme[main_fg]=\"#010203\"",
        );
        let theme = Theme::from_map(&map);
        assert_eq!(theme.pieces.len(), PALETTE.len());
        assert_eq!(theme.pieces[0], Rgb(0x11, 0x22, 0x33));
        assert_eq!(theme.pieces[2], PALETTE[2]);
        assert_eq!(theme.main_fg, Color::Rgb(1, 2, 3));
    }
}
