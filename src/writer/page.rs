//! Pages and link annotations.

use super::content_stream::ContentStreamBuilder;

/// Target of a clickable area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Internal link identifier returned by `add_link`
    Internal(usize),
    /// External URI
    External(String),
}

/// Destination of an internal link.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InternalLink {
    /// 1-based target page, 0 while unset
    pub page: usize,
    /// Vertical position on the target page, in user units from the top
    pub y: f64,
}

/// A link annotation, in points with y measured from the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Where the link goes
    pub target: LinkTarget,
}

/// One page of the document.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Size in points when it differs from the document default
    pub size_override: Option<(f64, f64)>,
    /// Content stream
    pub content: ContentStreamBuilder,
    /// Link annotations
    pub links: Vec<PageLink>,
}

impl Page {
    /// Create an empty page.
    pub fn new(size_override: Option<(f64, f64)>) -> Self {
        Self {
            size_override,
            content: ContentStreamBuilder::new(),
            links: Vec::new(),
        }
    }
}
