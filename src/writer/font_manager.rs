//! Font management for PDF generation.
//!
//! Fonts are described by a definition record: a 256-entry width table in
//! thousandths of the font size, a descriptor, and for embedded fonts the
//! name and segment lengths of the font program. Definitions come from the
//! built-in standard metrics or from JSON files read through a [`FontLoader`].
//!
//! The registry is keyed by family plus normalized style ("helveticaB") and
//! keeps insertion order, which fixes the `/F<n>` resource numbering and the
//! object emission order.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Font bounding box in glyph space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FontBBox {
    /// Lower-left x
    pub xmin: i32,
    /// Lower-left y
    pub ymin: i32,
    /// Upper-right x
    pub xmax: i32,
    /// Upper-right y
    pub ymax: i32,
}

/// Font descriptor metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FontDescriptor {
    /// Maximum height above the baseline
    pub ascent: i32,
    /// Maximum depth below the baseline (negative)
    pub descent: i32,
    /// Height of flat capital letters
    pub cap_height: i32,
    /// Descriptor flags
    pub flags: i32,
    /// Glyph bounding box
    #[serde(rename = "FontBBox")]
    pub font_bbox: FontBBox,
    /// Italic angle in degrees
    pub italic_angle: i32,
    /// Dominant vertical stem width
    pub stem_v: i32,
    /// Width used for codes missing from the table
    pub missing_width: i32,
}

/// Font definition record, as stored in definition files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FontDefinition {
    /// Font type: "Core", "Type1" or "TrueType"
    pub tp: String,
    /// PostScript name
    pub name: String,
    /// Underline position
    pub up: i32,
    /// Underline thickness
    pub ut: i32,
    /// Character widths by code
    pub cw: Vec<u32>,
    /// Descriptor metrics
    pub desc: FontDescriptor,
    /// Encoding name the definition was generated for
    pub enc: String,
    /// Encoding differences, as the body of a `/Differences` array
    pub diff: String,
    /// Font program file name, relative to the font directory
    pub file: String,
    /// Type1 clear-text segment length
    pub size1: u64,
    /// Type1 binary segment length
    pub size2: u64,
    /// TrueType original file length
    pub original_size: u64,
}

impl FontDefinition {
    /// Check the width table shape.
    pub fn validate(&self) -> Result<()> {
        if self.cw.len() != 256 {
            return Err(Error::Format(format!(
                "font {} has {} character widths, expected 256",
                self.name,
                self.cw.len()
            )));
        }
        Ok(())
    }
}

/// Font program kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    /// Standard font, never embedded
    Core,
    /// Embedded Type1 font
    Type1,
    /// Embedded TrueType font
    TrueType,
}

impl FontKind {
    /// Map the definition's type name.
    pub fn from_type_name(tp: &str) -> Result<Self> {
        match tp {
            "Core" => Ok(FontKind::Core),
            "Type1" => Ok(FontKind::Type1),
            "TrueType" => Ok(FontKind::TrueType),
            _ => Err(Error::Config(format!("Unsupported font type: {}", tp))),
        }
    }

    /// Subtype name in the font dictionary.
    pub fn subtype(&self) -> &'static str {
        match self {
            FontKind::Core | FontKind::Type1 => "Type1",
            FontKind::TrueType => "TrueType",
        }
    }
}

/// Source of font definitions.
pub trait FontLoader {
    /// Load the definition stored at `path`.
    fn load(&self, path: &Path) -> Result<FontDefinition>;
}

/// Reads definition files in JSON form.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFontLoader;

impl FontLoader for JsonFontLoader {
    fn load(&self, path: &Path) -> Result<FontDefinition> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Input(format!("cannot read font definition {}: {}", path.display(), e)))?;
        let def: FontDefinition = serde_json::from_slice(&data)?;
        Ok(def)
    }
}

/// Split a style string into its normalized font style and underline flag.
///
/// The result is upper case without "U", with "IB" written as "BI".
pub fn normalize_style(style: &str) -> (String, bool) {
    let upper = style.to_ascii_uppercase();
    let underline = upper.contains('U');
    let mut style: String = upper.chars().filter(|&c| c != 'U').collect();
    if style == "IB" {
        style = "BI".to_string();
    }
    (style, underline)
}

/// Registry key for a family and normalized style.
pub fn font_key(family: &str, style: &str) -> String {
    format!("{}{}", family, style)
}

/// A font registered with the document.
#[derive(Debug, Clone)]
pub struct RegisteredFont {
    /// 1-based resource index (`/F<index>`)
    pub index: usize,
    /// Program kind
    pub kind: FontKind,
    /// Definition record
    pub def: FontDefinition,
    /// 1-based index of the interned difference table
    pub diff_index: Option<usize>,
}

impl RegisteredFont {
    /// Width table indexed by character code.
    pub fn widths(&self) -> &[u32] {
        &self.def.cw
    }
}

/// Segment lengths of an embedded font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontFile {
    /// Clear-text length (Type1) or original size (TrueType)
    pub length1: u64,
    /// Binary segment length, Type1 only
    pub length2: Option<u64>,
}

/// Append-only table of fonts, difference tables and font files.
#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: IndexMap<String, RegisteredFont>,
    diffs: Vec<String>,
    files: IndexMap<String, FontFile>,
}

impl FontRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a key is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.fonts.contains_key(key)
    }

    /// Look up a registered font.
    pub fn get(&self, key: &str) -> Option<&RegisteredFont> {
        self.fonts.get(key)
    }

    /// Register a definition under `key`, returning its resource index.
    ///
    /// Registering an existing key is a no-op returning the existing index.
    pub fn register(&mut self, key: &str, def: FontDefinition) -> Result<usize> {
        if let Some(font) = self.fonts.get(key) {
            return Ok(font.index);
        }
        let kind = FontKind::from_type_name(&def.tp)?;
        def.validate()?;

        let diff_index = if def.diff.is_empty() {
            None
        } else {
            Some(self.intern_diff(&def.diff))
        };

        if !def.file.is_empty() {
            match kind {
                FontKind::TrueType => {
                    self.files.insert(
                        def.file.clone(),
                        FontFile {
                            length1: def.original_size,
                            length2: None,
                        },
                    );
                },
                FontKind::Type1 => {
                    self.files.insert(
                        def.file.clone(),
                        FontFile {
                            length1: def.size1,
                            length2: (def.size2 > 0).then_some(def.size2),
                        },
                    );
                },
                FontKind::Core => {},
            }
        }

        let index = self.fonts.len() + 1;
        log::debug!("registered font {} as /F{} ({:?})", key, index, kind);
        self.fonts.insert(
            key.to_string(),
            RegisteredFont {
                index,
                kind,
                def,
                diff_index,
            },
        );
        Ok(index)
    }

    /// Intern a difference table by exact string equality; indexes are 1-based.
    fn intern_diff(&mut self, diff: &str) -> usize {
        match self.diffs.iter().position(|d| d == diff) {
            Some(pos) => pos + 1,
            None => {
                self.diffs.push(diff.to_string());
                self.diffs.len()
            },
        }
    }

    /// Registered fonts in registration order.
    pub fn fonts(&self) -> impl Iterator<Item = &RegisteredFont> {
        self.fonts.values()
    }

    /// Interned difference tables in index order.
    pub fn diffs(&self) -> &[String] {
        &self.diffs
    }

    /// Embedded font files in registration order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &FontFile)> {
        self.files.iter().map(|(name, file)| (name.as_str(), file))
    }

    /// Number of registered fonts.
    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    /// Check if any fonts are registered.
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// Map a Unicode code point to its Windows-1252 byte.
pub fn unicode_to_winansi(codepoint: u32) -> Option<u8> {
    if codepoint < 0x80 || (0xA0..=0xFF).contains(&codepoint) {
        return Some(codepoint as u8);
    }

    match codepoint {
        0x20AC => Some(0x80), // Euro sign
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85), // Ellipsis
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95), // Bullet
        0x2013 => Some(0x96),
        0x2014 => Some(0x97),
        0x02DC => Some(0x98),
        0x2122 => Some(0x99), // Trade mark
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}

/// Encode text for the single-byte width tables. Unmappable characters become `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match unicode_to_winansi(ch as u32) {
            Some(b) => out.push(b),
            None => {
                log::warn!("character U+{:04X} has no single-byte code, using '?'", ch as u32);
                out.push(b'?');
            },
        }
    }
    out
}
