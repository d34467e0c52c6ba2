//! Configuration for document generation.
//!
//! Every option has a typed form and a string form. The string forms accept
//! the classic spellings ("P", "mm", "A4", "fullpage", ...) case-insensitively
//! and reject anything else with [`Error::Config`].

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Height greater than width
    #[default]
    Portrait,
    /// Width greater than height
    Landscape,
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "p" | "portrait" => Ok(Orientation::Portrait),
            "l" | "landscape" => Ok(Orientation::Landscape),
            _ => Err(Error::Config(format!("Incorrect orientation: {}", s))),
        }
    }
}

/// Unit of measure for every user-space length except font sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    /// PostScript point (1/72 inch)
    Point,
    /// Millimeter
    #[default]
    Millimeter,
    /// Centimeter
    Centimeter,
    /// Inch
    Inch,
}

impl Unit {
    /// Scale factor: number of points in one unit.
    pub fn scale(&self) -> f64 {
        match self {
            Unit::Point => 1.0,
            Unit::Millimeter => 72.0 / 25.4,
            Unit::Centimeter => 72.0 / 2.54,
            Unit::Inch => 72.0,
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pt" | "point" => Ok(Unit::Point),
            "" | "mm" => Ok(Unit::Millimeter),
            "cm" => Ok(Unit::Centimeter),
            "in" | "inch" => Ok(Unit::Inch),
            _ => Err(Error::Config(format!("Incorrect unit: {}", s))),
        }
    }
}

/// Page size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSize {
    /// A3 (297 x 420 mm)
    A3,
    /// A4 (210 x 297 mm)
    #[default]
    A4,
    /// A5 (148 x 210 mm)
    A5,
    /// US Letter (8.5 x 11 in)
    Letter,
    /// US Legal (8.5 x 14 in)
    Legal,
    /// Arbitrary size in user units, given in portrait form
    Custom {
        /// Width in user units
        width: f64,
        /// Height in user units
        height: f64,
    },
}

impl PageSize {
    /// Portrait dimensions in points, `None` for custom sizes.
    pub fn points(&self) -> Option<(f64, f64)> {
        match self {
            PageSize::A3 => Some((841.89, 1190.55)),
            PageSize::A4 => Some((595.28, 841.89)),
            PageSize::A5 => Some((420.94, 595.28)),
            PageSize::Letter => Some((612.0, 792.0)),
            PageSize::Legal => Some((612.0, 1008.0)),
            PageSize::Custom { .. } => None,
        }
    }

    /// Portrait dimensions in user units for the scale factor `k`.
    pub fn in_units(&self, k: f64) -> (f64, f64) {
        match (self, self.points()) {
            (PageSize::Custom { width, height }, _) => (*width, *height),
            (_, Some((w, h))) => (w / k, h / k),
            (_, None) => (0.0, 0.0),
        }
    }
}

impl FromStr for PageSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a3" => Ok(PageSize::A3),
            "" | "a4" => Ok(PageSize::A4),
            "a5" => Ok(PageSize::A5),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            _ => Err(Error::Config(format!("Unknown page size {}", s))),
        }
    }
}

/// Initial zoom applied by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoomMode {
    /// Whole page visible
    FullPage,
    /// Page width fills the window
    FullWidth,
    /// Actual size (100%)
    Real,
    /// Viewer preference
    #[default]
    Default,
}

impl FromStr for ZoomMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fullpage" => Ok(ZoomMode::FullPage),
            "fullwidth" => Ok(ZoomMode::FullWidth),
            "real" => Ok(ZoomMode::Real),
            "" | "default" => Ok(ZoomMode::Default),
            _ => Err(Error::Config(format!("Incorrect zoom display mode: {}", s))),
        }
    }
}

/// Page arrangement applied by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    /// One page at a time
    Single,
    /// Pages in one continuous column
    Continuous,
    /// Two columns, odd pages on the left
    Two,
    /// Viewer preference
    #[default]
    Default,
}

impl FromStr for LayoutMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(LayoutMode::Single),
            "continuous" => Ok(LayoutMode::Continuous),
            "two" => Ok(LayoutMode::Two),
            "" | "default" => Ok(LayoutMode::Default),
            _ => Err(Error::Config(format!("Incorrect layout display mode: {}", s))),
        }
    }
}

/// Document construction options.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Default page orientation
    pub orientation: Orientation,
    /// User-space unit
    pub unit: Unit,
    /// Default page size
    pub page_size: PageSize,
    /// Directory holding font definition files and font binaries
    pub font_dir: PathBuf,
    /// Compress page content streams
    pub compress: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConfig {
    /// Create a configuration with defaults: portrait A4 in millimeters.
    pub fn new() -> Self {
        Self {
            orientation: Orientation::Portrait,
            unit: Unit::Millimeter,
            page_size: PageSize::A4,
            font_dir: PathBuf::from("."),
            compress: true,
        }
    }

    /// Parse the string forms. Empty strings select the defaults.
    pub fn from_strs(orientation: &str, unit: &str, size: &str, font_dir: &str) -> Result<Self> {
        let font_dir = if font_dir.is_empty() { "." } else { font_dir };
        Ok(Self {
            orientation: orientation.parse()?,
            unit: unit.parse()?,
            page_size: size.parse()?,
            font_dir: PathBuf::from(font_dir),
            compress: true,
        })
    }

    /// Set the default orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the unit of measure.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Set the default page size.
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the font directory.
    pub fn with_font_dir(mut self, font_dir: impl Into<PathBuf>) -> Self {
        self.font_dir = font_dir.into();
        self
    }

    /// Enable or disable content stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DocumentConfig::default();
        assert_eq!(config.orientation, Orientation::Portrait);
        assert_eq!(config.unit, Unit::Millimeter);
        assert_eq!(config.page_size, PageSize::A4);
        assert!(config.compress);
    }

    #[test]
    fn test_from_strs_empty_means_default() {
        let config = DocumentConfig::from_strs("", "", "", "").unwrap();
        assert_eq!(config.orientation, Orientation::Portrait);
        assert_eq!(config.unit, Unit::Millimeter);
        assert_eq!(config.page_size, PageSize::A4);
        assert_eq!(config.font_dir, PathBuf::from("."));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("Landscape".parse::<Orientation>().unwrap(), Orientation::Landscape);
        assert_eq!("L".parse::<Orientation>().unwrap(), Orientation::Landscape);
        assert_eq!("LETTER".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!("inch".parse::<Unit>().unwrap(), Unit::Inch);
    }

    #[test]
    fn test_unknown_values_are_config_errors() {
        assert!(matches!("furlong".parse::<Unit>(), Err(Error::Config(_))));
        assert!(matches!("b5".parse::<PageSize>(), Err(Error::Config(_))));
        assert!(matches!("sideways".parse::<Orientation>(), Err(Error::Config(_))));
        assert!(matches!("zoomed".parse::<ZoomMode>(), Err(Error::Config(_))));
        assert!(matches!("three".parse::<LayoutMode>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_scale_factors() {
        assert_eq!(Unit::Point.scale(), 1.0);
        assert_eq!(Unit::Inch.scale(), 72.0);
        assert!((Unit::Millimeter.scale() - 2.834_645_669).abs() < 1e-6);
        assert!((Unit::Centimeter.scale() - 28.346_456_69).abs() < 1e-6);
    }

    #[test]
    fn test_page_size_in_units() {
        let (w, h) = PageSize::Letter.in_units(72.0);
        assert!((w - 8.5).abs() < 1e-9);
        assert!((h - 11.0).abs() < 1e-9);

        let custom = PageSize::Custom {
            width: 100.0,
            height: 150.0,
        };
        assert_eq!(custom.in_units(Unit::Millimeter.scale()), (100.0, 150.0));
    }

    #[test]
    fn test_builders() {
        let config = DocumentConfig::new()
            .with_orientation(Orientation::Landscape)
            .with_unit(Unit::Point)
            .with_page_size(PageSize::A5)
            .with_font_dir("fonts")
            .with_compress(false);
        assert_eq!(config.orientation, Orientation::Landscape);
        assert_eq!(config.unit, Unit::Point);
        assert_eq!(config.page_size, PageSize::A5);
        assert_eq!(config.font_dir, PathBuf::from("fonts"));
        assert!(!config.compress);
    }
}
