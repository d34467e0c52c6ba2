//! PDF writing.
//!
//! ## Architecture
//!
//! ```text
//! Document (cursor, pages, fonts, images, links)
//!     ↓  cell / multi_cell / write / text / image / line / rect
//! [text_layout] (line breaking)
//!     ↓
//! [ContentStreamBuilder] (one buffer per page)
//!     ↓  close
//! [pdf_writer] (object layout, resources, info, catalog)
//!     ↓
//! [ObjectSerializer] (offsets, xref, trailer)
//!     ↓
//! PDF bytes
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pdf_quill::writer::{Align, Border, Document, LineFeed};
//!
//! let mut doc = Document::default();
//! doc.add_page()?;
//! doc.set_font("times", "", 12.0)?;
//! doc.multi_cell(0.0, 5.0, "A paragraph that wraps at the margin.", Border::empty(), Align::Justify, false)?;
//! doc.cell_format(0.0, 10.0, "Centered", Border::ALL, LineFeed::NextLine, Align::Center, false, None)?;
//! let bytes = doc.output_bytes()?;
//! ```

mod cell;
mod content_stream;
mod core_metrics;
mod document;
mod font_manager;
mod image_handler;
mod object_serializer;
mod page;
mod pdf_writer;
mod text_layout;

pub use cell::{Align, Border, LineFeed};
pub use content_stream::{Color, ContentStreamBuilder, ContentStreamOp, LineCap, PaintOp};
pub use core_metrics::{builtin_definition, is_core_family, postscript_name, CORE_FAMILIES};
pub use document::{Document, DocumentState, ImagePlacement, PageBreakPolicy, PageCallback, RectStyle};
pub use font_manager::{
    encode_winansi, font_key, normalize_style, unicode_to_winansi, FontBBox, FontDefinition, FontDescriptor,
    FontFile, FontKind, FontLoader, FontRegistry, JsonFontLoader, RegisteredFont,
};
pub use image_handler::{
    parse_gif, parse_jpeg, parse_png, split_alpha, ColorSpace, ImageError, ImageInfo, ImageRegistry, ImageType,
};
pub use object_serializer::{escape, text_string, utf16_text, ObjectSerializer, PAGES_ROOT_ID, RESOURCES_ID};
pub use page::{InternalLink, LinkTarget, Page, PageLink};
pub use text_layout::{layout_bounded, layout_flowing, text_width_units, BoundedLine, FlowStep};
