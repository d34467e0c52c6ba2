//! The document state machine.
//!
//! [`Document`] owns every piece of mutable state: the cursor, the page
//! buffers, the font, image and link tables, and the graphics state that is
//! replayed at the top of each page. Coordinates passed in are user units
//! with the origin at the top-left corner; everything written to a content
//! stream is converted to points with the origin at the bottom-left.
//!
//! # Errors
//!
//! The first failing call latches its error. From then on every public call
//! returns `Ok` with a default value and does nothing, and [`Document::close`]
//! and the output methods return the latched error. A caller can therefore
//! chain many calls and check [`Document::error`] once.
//!
//! ```ignore
//! use pdf_quill::{Document, DocumentConfig};
//!
//! let mut doc = Document::new(DocumentConfig::default());
//! doc.add_page()?;
//! doc.set_font("helvetica", "B", 16.0)?;
//! doc.cell(40.0, 10.0, "Hello World!")?;
//! doc.output_file("hello.pdf")?;
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{DocumentConfig, LayoutMode, Orientation, PageSize, ZoomMode};
use crate::error::{Error, Result};

use super::content_stream::{Color, ContentStreamOp, LineCap, PaintOp};
use super::core_metrics;
use super::font_manager::{
    encode_winansi, font_key, normalize_style, FontDefinition, FontLoader, FontRegistry, JsonFontLoader,
    RegisteredFont,
};
use super::image_handler::{ImageRegistry, ImageType};
use super::object_serializer::utf16_text;
use super::page::{InternalLink, LinkTarget, Page, PageLink};
use super::pdf_writer;
use super::text_layout::text_width_units;

/// Header or footer callback.
pub type PageCallback = Box<dyn FnMut(&mut Document) -> Result<()>>;

/// Page break policy.
pub type PageBreakPolicy = Box<dyn Fn(&Document) -> bool>;

/// Lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// No page created yet
    NotOpen,
    /// Between pages
    Open,
    /// A page accepts drawing
    PageActive,
    /// Serialized; no further changes
    Closed,
}

/// How a rectangle is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RectStyle {
    /// Outline only
    #[default]
    Draw,
    /// Interior only
    Fill,
    /// Interior and outline
    DrawFill,
}

impl RectStyle {
    pub(crate) fn paint_op(&self) -> PaintOp {
        match self {
            RectStyle::Draw => PaintOp::Stroke,
            RectStyle::Fill => PaintOp::Fill,
            RectStyle::DrawFill => PaintOp::FillStroke,
        }
    }
}

impl FromStr for RectStyle {
    type Err = Error;

    /// "F" fills, "DF" or "FD" fills and strokes, anything else strokes.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "F" => RectStyle::Fill,
            "DF" | "FD" => RectStyle::DrawFill,
            _ => RectStyle::Draw,
        })
    }
}

/// Where and how large an image is drawn.
///
/// A zero width and height renders at 96 dpi. A zero in one dimension keeps
/// the aspect ratio. A negative value gives the resolution in dpi.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImagePlacement {
    /// Left edge; `None` uses the current abscissa
    pub x: Option<f64>,
    /// Top edge; `None` places the image at the cursor and moves the cursor below it
    pub y: Option<f64>,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl ImagePlacement {
    /// Place at a fixed position.
    pub fn at(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width,
            height,
        }
    }

    /// Place at the cursor in flowing mode.
    pub fn flow(width: f64, height: f64) -> Self {
        Self {
            x: None,
            y: None,
            width,
            height,
        }
    }

    /// Set the left edge.
    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }
}

/// Info dictionary entries, already encoded.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentMetadata {
    pub(crate) title: Option<Vec<u8>>,
    pub(crate) subject: Option<Vec<u8>>,
    pub(crate) author: Option<Vec<u8>>,
    pub(crate) keywords: Option<Vec<u8>>,
    pub(crate) creator: Option<Vec<u8>>,
}

fn encode_info(text: &str, is_utf8: bool) -> Vec<u8> {
    if is_utf8 {
        utf16_text(text)
    } else {
        encode_winansi(text)
    }
}

/// An in-progress PDF document.
pub struct Document {
    pub(crate) error: Option<Error>,
    pub(crate) state: DocumentState,
    /// Points per user unit
    pub(crate) k: f64,
    pub(crate) def_orientation: Orientation,
    pub(crate) cur_orientation: Orientation,
    /// Portrait page size in user units
    pub(crate) def_page_size: (f64, f64),
    pub(crate) cur_page_size: (f64, f64),
    pub(crate) w: f64,
    pub(crate) h: f64,
    pub(crate) w_pt: f64,
    pub(crate) h_pt: f64,
    pub(crate) l_margin: f64,
    pub(crate) t_margin: f64,
    pub(crate) r_margin: f64,
    pub(crate) b_margin: f64,
    pub(crate) c_margin: f64,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) lasth: f64,
    pub(crate) line_width: f64,
    pub(crate) line_cap: LineCap,
    pub(crate) fonts: FontRegistry,
    pub(crate) font_family: String,
    pub(crate) font_style: String,
    pub(crate) underline: bool,
    current_font: Option<String>,
    pub(crate) font_size_pt: f64,
    pub(crate) font_size: f64,
    pub(crate) draw_color: Color,
    pub(crate) fill_color: Color,
    pub(crate) text_color: Color,
    pub(crate) color_flag: bool,
    /// Word spacing in user units
    pub(crate) ws: f64,
    pub(crate) images: ImageRegistry,
    pub(crate) pages: Vec<Page>,
    /// Index 0 is unused
    pub(crate) links: Vec<InternalLink>,
    pub(crate) auto_page_break: bool,
    pub(crate) page_break_trigger: f64,
    pub(crate) in_header: bool,
    pub(crate) in_footer: bool,
    header: Option<PageCallback>,
    footer: Option<PageCallback>,
    accept_page_break: Option<PageBreakPolicy>,
    pub(crate) zoom_mode: ZoomMode,
    pub(crate) layout_mode: LayoutMode,
    pub(crate) metadata: DocumentMetadata,
    pub(crate) alias: Option<String>,
    pub(crate) compress: bool,
    pub(crate) pdf_version: (u8, u8),
    pub(crate) font_dir: PathBuf,
    font_loader: Box<dyn FontLoader>,
    output: Option<Vec<u8>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("state", &self.state)
            .field("pages", &self.pages.len())
            .field("fonts", &self.fonts.len())
            .field("images", &self.images.len())
            .field("error", &self.error)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentConfig::default())
    }
}

impl Document {
    /// Create a document from a configuration.
    pub fn new(config: DocumentConfig) -> Self {
        let k = config.unit.scale();
        let (pw, ph) = config.page_size.in_units(k);
        let size = if pw > ph { (ph, pw) } else { (pw, ph) };
        let (w, h) = match config.orientation {
            Orientation::Portrait => size,
            Orientation::Landscape => (size.1, size.0),
        };
        let margin = 28.35 / k;

        Self {
            error: None,
            state: DocumentState::NotOpen,
            k,
            def_orientation: config.orientation,
            cur_orientation: config.orientation,
            def_page_size: size,
            cur_page_size: size,
            w,
            h,
            w_pt: w * k,
            h_pt: h * k,
            l_margin: margin,
            t_margin: margin,
            r_margin: margin,
            b_margin: margin * 2.0,
            c_margin: margin / 10.0,
            x: margin,
            y: margin,
            lasth: 0.0,
            line_width: 0.567 / k,
            line_cap: LineCap::Butt,
            fonts: FontRegistry::new(),
            font_family: String::new(),
            font_style: String::new(),
            underline: false,
            current_font: None,
            font_size_pt: 12.0,
            font_size: 12.0 / k,
            draw_color: Color::BLACK,
            fill_color: Color::BLACK,
            text_color: Color::BLACK,
            color_flag: false,
            ws: 0.0,
            images: ImageRegistry::new(),
            pages: Vec::new(),
            links: vec![InternalLink::default()],
            auto_page_break: true,
            page_break_trigger: h - margin * 2.0,
            in_header: false,
            in_footer: false,
            header: None,
            footer: None,
            accept_page_break: None,
            zoom_mode: ZoomMode::Default,
            layout_mode: LayoutMode::Default,
            metadata: DocumentMetadata::default(),
            alias: None,
            compress: config.compress,
            pdf_version: (1, 3),
            font_dir: config.font_dir,
            font_loader: Box::new(JsonFontLoader),
            output: None,
        }
    }

    /// Create a document from the string forms of the configuration.
    ///
    /// An invalid value is latched and reported by [`Document::output`].
    pub fn from_strs(orientation: &str, unit: &str, size: &str, font_dir: &str) -> Self {
        match DocumentConfig::from_strs(orientation, unit, size, font_dir) {
            Ok(config) => Self::new(config),
            Err(err) => {
                let mut doc = Self::default();
                doc.latch(err);
                doc
            },
        }
    }

    /// Replace the font definition loader.
    pub fn set_font_loader(&mut self, loader: Box<dyn FontLoader>) {
        self.font_loader = loader;
    }

    // ---- error latch ----

    /// The latched error, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Check that no error has been latched.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// Latch an application error. Has no effect if one is already set.
    pub fn set_error(&mut self, err: Error) {
        self.latch(err);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DocumentState {
        self.state
    }

    fn latch(&mut self, err: Error) {
        if self.error.is_none() {
            log::warn!("document error: {}", err);
            self.error = Some(err);
        }
    }

    /// Whether state may still change.
    fn accepts_changes(&self) -> bool {
        self.error.is_none() && self.state != DocumentState::Closed
    }

    /// Run a public operation under the error latch.
    pub(crate) fn run<T: Default>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.error.is_some() {
            return Ok(T::default());
        }
        if self.state == DocumentState::Closed {
            return Err(Error::Config("The document is closed".to_string()));
        }
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.latch(err.clone());
                Err(err)
            },
        }
    }

    // ---- setup ----

    /// Set the left, top and right margins. A negative right margin copies the left one.
    pub fn set_margins(&mut self, left: f64, top: f64, right: f64) {
        if !self.accepts_changes() {
            return;
        }
        self.l_margin = left;
        self.t_margin = top;
        self.r_margin = if right < 0.0 { left } else { right };
    }

    /// Set the left margin, moving the cursor inside it on the current page.
    pub fn set_left_margin(&mut self, margin: f64) {
        if !self.accepts_changes() {
            return;
        }
        self.l_margin = margin;
        if !self.pages.is_empty() && self.x < margin {
            self.x = margin;
        }
    }

    /// Set the top margin.
    pub fn set_top_margin(&mut self, margin: f64) {
        if self.accepts_changes() {
            self.t_margin = margin;
        }
    }

    /// Set the right margin.
    pub fn set_right_margin(&mut self, margin: f64) {
        if self.accepts_changes() {
            self.r_margin = margin;
        }
    }

    /// Left, top, right and bottom margins.
    pub fn margins(&self) -> (f64, f64, f64, f64) {
        (self.l_margin, self.t_margin, self.r_margin, self.b_margin)
    }

    /// Enable or disable automatic page breaks, with the bottom margin that triggers them.
    pub fn set_auto_page_break(&mut self, auto: bool, margin: f64) {
        if !self.accepts_changes() {
            return;
        }
        self.auto_page_break = auto;
        self.b_margin = margin;
        self.page_break_trigger = self.h - margin;
    }

    /// Set how the viewer opens the document.
    pub fn set_display_mode(&mut self, zoom: ZoomMode, layout: LayoutMode) {
        if self.accepts_changes() {
            self.zoom_mode = zoom;
            self.layout_mode = layout;
        }
    }

    /// Set the display mode from its string forms.
    pub fn set_display_mode_str(&mut self, zoom: &str, layout: &str) -> Result<()> {
        self.run(|doc| {
            let zoom = zoom.parse()?;
            let layout = layout.parse()?;
            doc.set_display_mode(zoom, layout);
            Ok(())
        })
    }

    /// Enable or disable page stream compression.
    pub fn set_compression(&mut self, compress: bool) {
        if self.accepts_changes() {
            self.compress = compress;
        }
    }

    /// Set the directory holding font definition files.
    pub fn set_font_location(&mut self, dir: impl Into<PathBuf>) {
        if self.accepts_changes() {
            self.font_dir = dir.into();
        }
    }

    /// Replace a token with the total page count at close. `None` uses `{nb}`.
    pub fn alias_nb_pages(&mut self, alias: Option<&str>) {
        if self.accepts_changes() {
            let alias = alias.filter(|a| !a.is_empty()).unwrap_or("{nb}");
            self.alias = Some(alias.to_string());
        }
    }

    /// Set the document title.
    pub fn set_title(&mut self, title: &str, is_utf8: bool) {
        if self.accepts_changes() {
            self.metadata.title = Some(encode_info(title, is_utf8));
        }
    }

    /// Set the document subject.
    pub fn set_subject(&mut self, subject: &str, is_utf8: bool) {
        if self.accepts_changes() {
            self.metadata.subject = Some(encode_info(subject, is_utf8));
        }
    }

    /// Set the document author.
    pub fn set_author(&mut self, author: &str, is_utf8: bool) {
        if self.accepts_changes() {
            self.metadata.author = Some(encode_info(author, is_utf8));
        }
    }

    /// Set the document keywords.
    pub fn set_keywords(&mut self, keywords: &str, is_utf8: bool) {
        if self.accepts_changes() {
            self.metadata.keywords = Some(encode_info(keywords, is_utf8));
        }
    }

    /// Set the creating application.
    pub fn set_creator(&mut self, creator: &str, is_utf8: bool) {
        if self.accepts_changes() {
            self.metadata.creator = Some(encode_info(creator, is_utf8));
        }
    }

    /// Set the callback run at the top of every page.
    pub fn set_header<F>(&mut self, header: F)
    where
        F: FnMut(&mut Document) -> Result<()> + 'static,
    {
        self.header = Some(Box::new(header));
    }

    /// Set the callback run at the bottom of every page.
    pub fn set_footer<F>(&mut self, footer: F)
    where
        F: FnMut(&mut Document) -> Result<()> + 'static,
    {
        self.footer = Some(Box::new(footer));
    }

    /// Decide whether an automatic page break happens. The default follows
    /// [`Document::set_auto_page_break`].
    pub fn set_accept_page_break<F>(&mut self, policy: F)
    where
        F: Fn(&Document) -> bool + 'static,
    {
        self.accept_page_break = Some(Box::new(policy));
    }

    // ---- pages ----

    /// Start a new page with the default orientation and size.
    pub fn add_page(&mut self) -> Result<()> {
        self.run(|doc| doc.add_page_impl(None, None))
    }

    /// Start a new page with its own orientation and size.
    pub fn add_page_format(&mut self, orientation: Orientation, size: PageSize) -> Result<()> {
        self.run(|doc| {
            let (w, h) = size.in_units(doc.k);
            let size = if w > h { (h, w) } else { (w, h) };
            doc.add_page_impl(Some(orientation), Some(size))
        })
    }

    pub(crate) fn add_page_impl(&mut self, orientation: Option<Orientation>, size: Option<(f64, f64)>) -> Result<()> {
        let family = self.font_family.clone();
        let style = if self.underline {
            format!("{}U", self.font_style)
        } else {
            self.font_style.clone()
        };
        let font_size = self.font_size_pt;
        let lw = self.line_width;
        let dc = self.draw_color;
        let fc = self.fill_color;
        let tc = self.text_color;
        let cf = self.color_flag;

        if !self.pages.is_empty() {
            self.run_footer()?;
            self.state = DocumentState::Open;
        }

        self.begin_page(orientation, size);
        self.out(ContentStreamOp::SetLineCap(self.line_cap));
        self.line_width = lw;
        self.out(ContentStreamOp::SetLineWidth(lw * self.k));
        if !family.is_empty() {
            self.select_font(&family, &style, font_size)?;
        }
        self.draw_color = dc;
        if dc != Color::BLACK {
            self.out(ContentStreamOp::SetStrokeColor(dc));
        }
        self.fill_color = fc;
        if fc != Color::BLACK {
            self.out(ContentStreamOp::SetFillColor(fc));
        }
        self.text_color = tc;
        self.color_flag = cf;

        self.run_header()?;

        if self.line_width != lw {
            self.line_width = lw;
            self.out(ContentStreamOp::SetLineWidth(lw * self.k));
        }
        if !family.is_empty() {
            self.select_font(&family, &style, font_size)?;
        }
        if self.draw_color != dc {
            self.draw_color = dc;
            self.out(ContentStreamOp::SetStrokeColor(dc));
        }
        if self.fill_color != fc {
            self.fill_color = fc;
            self.out(ContentStreamOp::SetFillColor(fc));
        }
        self.text_color = tc;
        self.color_flag = cf;
        Ok(())
    }

    fn begin_page(&mut self, orientation: Option<Orientation>, size: Option<(f64, f64)>) {
        self.pages.push(Page::new(None));
        self.state = DocumentState::PageActive;
        self.x = self.l_margin;
        self.y = self.t_margin;
        self.font_family.clear();

        let orientation = orientation.unwrap_or(self.def_orientation);
        let size = size.unwrap_or(self.def_page_size);
        if orientation != self.cur_orientation || size != self.cur_page_size {
            let (w, h) = match orientation {
                Orientation::Portrait => size,
                Orientation::Landscape => (size.1, size.0),
            };
            self.w = w;
            self.h = h;
            self.w_pt = w * self.k;
            self.h_pt = h * self.k;
            self.page_break_trigger = h - self.b_margin;
            self.cur_orientation = orientation;
            self.cur_page_size = size;
        }
        if orientation != self.def_orientation || size != self.def_page_size {
            let override_size = (self.w_pt, self.h_pt);
            if let Some(page) = self.pages.last_mut() {
                page.size_override = Some(override_size);
            }
        }
        log::debug!("began page {} ({:.2} x {:.2} pt)", self.pages.len(), self.w_pt, self.h_pt);
    }

    fn run_header(&mut self) -> Result<()> {
        if let Some(mut header) = self.header.take() {
            self.in_header = true;
            let result = header(self);
            self.in_header = false;
            if self.header.is_none() {
                self.header = Some(header);
            }
            result?;
        }
        Ok(())
    }

    fn run_footer(&mut self) -> Result<()> {
        if let Some(mut footer) = self.footer.take() {
            self.in_footer = true;
            let result = footer(self);
            self.in_footer = false;
            if self.footer.is_none() {
                self.footer = Some(footer);
            }
            result?;
        }
        Ok(())
    }

    /// Create the first page if drawing starts before any page exists.
    pub(crate) fn ensure_page(&mut self) -> Result<()> {
        if self.pages.is_empty() {
            self.add_page_impl(None, None)?;
        }
        Ok(())
    }

    /// Whether content of height `h` at the cursor triggers an automatic page break.
    pub(crate) fn needs_page_break(&self, h: f64) -> bool {
        self.y + h > self.page_break_trigger && !self.in_header && !self.in_footer && self.accepts_page_break()
    }

    /// Evaluate the page break policy.
    pub fn accepts_page_break(&self) -> bool {
        match &self.accept_page_break {
            Some(policy) => policy(self),
            None => self.auto_page_break,
        }
    }

    /// Break to a new page keeping the current abscissa.
    pub(crate) fn automatic_page_break(&mut self) -> Result<()> {
        log::debug!("automatic page break after page {}", self.pages.len());
        let x = self.x;
        let orientation = self.cur_orientation;
        let size = self.cur_page_size;
        self.add_page_impl(Some(orientation), Some(size))?;
        self.x = x;
        Ok(())
    }

    /// Append one operator line to the current page.
    pub(crate) fn out(&mut self, op: ContentStreamOp) {
        if let Some(page) = self.pages.last_mut() {
            page.content.op(op);
        }
    }

    /// Append several operators on one line to the current page.
    pub(crate) fn out_line(&mut self, ops: &[ContentStreamOp]) {
        if let Some(page) = self.pages.last_mut() {
            page.content.line(ops);
        }
    }

    /// Current page number, 0 before the first page.
    pub fn page_no(&self) -> usize {
        self.pages.len()
    }

    /// Current page width and height in user units.
    pub fn page_size(&self) -> (f64, f64) {
        (self.w, self.h)
    }

    /// Points per user unit.
    pub fn scale_factor(&self) -> f64 {
        self.k
    }

    // ---- cursor ----

    /// Current abscissa.
    pub fn get_x(&self) -> f64 {
        self.x
    }

    /// Current ordinate.
    pub fn get_y(&self) -> f64 {
        self.y
    }

    /// Set the abscissa. A negative value is relative to the right edge.
    pub fn set_x(&mut self, x: f64) {
        if self.accepts_changes() {
            self.x = if x >= 0.0 { x } else { self.w + x };
        }
    }

    /// Set the ordinate and move back to the left margin. A negative value is
    /// relative to the bottom edge.
    pub fn set_y(&mut self, y: f64) {
        if self.accepts_changes() {
            self.x = self.l_margin;
            self.y = if y >= 0.0 { y } else { self.h + y };
        }
    }

    /// Set both coordinates.
    pub fn set_xy(&mut self, x: f64, y: f64) {
        self.set_y(y);
        self.set_x(x);
    }

    // ---- colors and line style ----

    /// Set the stroke color from 0-255 components.
    pub fn set_draw_color(&mut self, r: u8, g: u8, b: u8) {
        if !self.accepts_changes() {
            return;
        }
        self.draw_color = Color::from_rgb8(r, g, b);
        self.out(ContentStreamOp::SetStrokeColor(self.draw_color));
    }

    /// Set the fill color from 0-255 components.
    pub fn set_fill_color(&mut self, r: u8, g: u8, b: u8) {
        if !self.accepts_changes() {
            return;
        }
        self.fill_color = Color::from_rgb8(r, g, b);
        self.color_flag = self.fill_color != self.text_color;
        self.out(ContentStreamOp::SetFillColor(self.fill_color));
    }

    /// Set the text color from 0-255 components.
    pub fn set_text_color(&mut self, r: u8, g: u8, b: u8) {
        if !self.accepts_changes() {
            return;
        }
        self.text_color = Color::from_rgb8(r, g, b);
        self.color_flag = self.fill_color != self.text_color;
    }

    /// Set the line width in user units.
    pub fn set_line_width(&mut self, width: f64) {
        if !self.accepts_changes() {
            return;
        }
        self.line_width = width;
        self.out(ContentStreamOp::SetLineWidth(width * self.k));
    }

    /// Current line width in user units.
    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    /// Set the line cap style.
    pub fn set_line_cap_style(&mut self, cap: LineCap) {
        if !self.accepts_changes() || cap == self.line_cap {
            return;
        }
        self.line_cap = cap;
        self.out(ContentStreamOp::SetLineCap(cap));
    }

    // ---- primitives ----

    /// Draw a line between two points.
    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            let (k, h) = (doc.k, doc.h);
            doc.out(ContentStreamOp::Line {
                x1: x1 * k,
                y1: (h - y1) * k,
                x2: x2 * k,
                y2: (h - y2) * k,
            });
            Ok(())
        })
    }

    /// Draw a rectangle from its top-left corner.
    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: RectStyle) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            let k = doc.k;
            doc.out(ContentStreamOp::Rectangle {
                x: x * k,
                y: (doc.h - y) * k,
                width: w * k,
                height: -h * k,
                paint: style.paint_op(),
            });
            Ok(())
        })
    }

    // ---- fonts ----

    /// Load a font definition file and register it under a family and style.
    ///
    /// `file` defaults to the family with spaces removed, plus the lowercase
    /// style and ".json", and is resolved against the font directory.
    pub fn add_font(&mut self, family: &str, style: &str, file: Option<&str>) -> Result<()> {
        self.run(|doc| doc.add_font_impl(family, style, file))
    }

    fn add_font_impl(&mut self, family: &str, style: &str, file: Option<&str>) -> Result<()> {
        let family = family.to_lowercase();
        let file = match file {
            Some(file) => file.to_string(),
            None => format!("{}{}.json", family.replace(' ', ""), style.to_lowercase()),
        };
        let style = normalize_style(style).0;
        let key = font_key(&family, &style);
        if self.fonts.contains(&key) {
            return Ok(());
        }
        let path = self.font_dir.join(file);
        let def = self.font_loader.load(&path)?;
        self.fonts.register(&key, def)?;
        Ok(())
    }

    /// Register an in-memory font definition under a family and style.
    pub fn add_font_definition(&mut self, family: &str, style: &str, def: FontDefinition) -> Result<()> {
        self.run(|doc| {
            let family = family.to_lowercase();
            let style = normalize_style(style).0;
            doc.fonts.register(&font_key(&family, &style), def)?;
            Ok(())
        })
    }

    /// Select the font for text output.
    ///
    /// An empty family keeps the current one. A "U" in the style underlines.
    /// A size of 0 keeps the current size. Standard families are defined on
    /// first use.
    pub fn set_font(&mut self, family: &str, style: &str, size: f64) -> Result<()> {
        self.run(|doc| doc.select_font(family, style, size))
    }

    pub(crate) fn select_font(&mut self, family: &str, style: &str, size: f64) -> Result<()> {
        let mut family = if family.is_empty() {
            self.font_family.clone()
        } else {
            family.to_lowercase()
        };
        let (mut style, underline) = normalize_style(style);
        self.underline = underline;
        let size = if size == 0.0 { self.font_size_pt } else { size };

        if self.font_family == family && self.font_style == style && self.font_size_pt == size {
            return Ok(());
        }

        let mut key = font_key(&family, &style);
        if !self.fonts.contains(&key) {
            if family == "arial" {
                family = "helvetica".to_string();
            }
            if !core_metrics::is_core_family(&family) {
                return Err(Error::Config(format!("Undefined font: {} {}", family, style)));
            }
            if family == "symbol" || family == "zapfdingbats" {
                style.clear();
            }
            key = font_key(&family, &style);
            if !self.fonts.contains(&key) {
                match core_metrics::builtin_definition(&family, &style) {
                    Some(def) => {
                        self.fonts.register(&key, def)?;
                    },
                    None => self.add_font_impl(&family, &style, None)?,
                }
            }
        }

        self.font_family = family;
        self.font_style = style;
        self.font_size_pt = size;
        self.font_size = size / self.k;
        let index = self.fonts.get(&key).map(|font| font.index);
        self.current_font = Some(key);
        if let Some(index) = index {
            self.out(ContentStreamOp::SelectFont {
                index,
                size: self.font_size_pt,
            });
        }
        Ok(())
    }

    /// Change the size of the current font, in points.
    pub fn set_font_size(&mut self, size: f64) {
        if !self.accepts_changes() || self.font_size_pt == size {
            return;
        }
        self.font_size_pt = size;
        self.font_size = size / self.k;
        if let Some(index) = self.current_font().map(|font| font.index) {
            self.out(ContentStreamOp::SelectFont { index, size });
        }
    }

    /// Current font size in points and in user units.
    pub fn font_size(&self) -> (f64, f64) {
        (self.font_size_pt, self.font_size)
    }

    pub(crate) fn current_font(&self) -> Option<&RegisteredFont> {
        self.current_font.as_deref().and_then(|key| self.fonts.get(key))
    }

    /// The current font, or a configuration error when none is selected.
    pub(crate) fn require_font(&self) -> Result<&RegisteredFont> {
        self.current_font()
            .ok_or_else(|| Error::Config("No font has been set".to_string()))
    }

    /// Width of text in user units with the current font, 0 without one.
    pub fn string_width(&self, text: &str) -> f64 {
        self.width_of(&encode_winansi(text))
    }

    pub(crate) fn width_of(&self, encoded: &[u8]) -> f64 {
        match self.current_font() {
            Some(font) => f64::from(text_width_units(encoded, font.widths())) * self.font_size / 1000.0,
            None => 0.0,
        }
    }

    // ---- links ----

    /// Create an internal link target and return its identifier.
    pub fn add_link(&mut self) -> usize {
        if !self.accepts_changes() {
            return 0;
        }
        self.links.push(InternalLink::default());
        self.links.len() - 1
    }

    /// Set where an internal link points. `None` uses the current ordinate or page.
    pub fn set_link(&mut self, link: usize, y: Option<f64>, page: Option<usize>) -> Result<()> {
        self.run(|doc| {
            let target = InternalLink {
                page: page.unwrap_or(doc.pages.len()),
                y: y.unwrap_or(doc.y),
            };
            match doc.links.get_mut(link) {
                Some(slot) if link > 0 => {
                    *slot = target;
                    Ok(())
                },
                _ => Err(Error::Config(format!("Undefined link: {}", link))),
            }
        })
    }

    /// Make a rectangle a link to an internal target.
    pub fn link(&mut self, x: f64, y: f64, w: f64, h: f64, link: usize) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            doc.new_link(x, y, w, h, LinkTarget::Internal(link));
            Ok(())
        })
    }

    /// Make a rectangle a link to a URI.
    pub fn link_url(&mut self, x: f64, y: f64, w: f64, h: f64, url: &str) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            doc.new_link(x, y, w, h, LinkTarget::External(url.to_string()));
            Ok(())
        })
    }

    pub(crate) fn new_link(&mut self, x: f64, y: f64, w: f64, h: f64, target: LinkTarget) {
        let link = PageLink {
            x: x * self.k,
            y: self.h_pt - y * self.k,
            width: w * self.k,
            height: h * self.k,
            target,
        };
        if let Some(page) = self.pages.last_mut() {
            page.links.push(link);
        }
    }

    // ---- images ----

    /// Register image bytes under a name usable with [`Document::image`].
    pub fn register_image_bytes(&mut self, name: &str, image_type: ImageType, data: &[u8]) -> Result<()> {
        self.run(|doc| doc.register_image(name, image_type, data))
    }

    fn register_image(&mut self, name: &str, image_type: ImageType, data: &[u8]) -> Result<()> {
        if self.images.contains(name) {
            return Ok(());
        }
        let info = image_type.parse(data)?;
        if info.has_soft_mask() && self.pdf_version < (1, 4) {
            self.pdf_version = (1, 4);
        }
        self.images.insert(name, info);
        Ok(())
    }

    /// Draw an image.
    ///
    /// `source` is a registered name or a file path. The type is inferred from
    /// the extension when not given. An image is embedded once however many
    /// times it is drawn.
    pub fn image(
        &mut self,
        source: &str,
        placement: ImagePlacement,
        image_type: Option<ImageType>,
        link: Option<LinkTarget>,
    ) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            if !doc.images.contains(source) {
                let path = Path::new(source);
                let image_type = match image_type {
                    Some(t) => t,
                    None => ImageType::from_path(path)?,
                };
                let data = std::fs::read(path)
                    .map_err(|e| Error::Input(format!("cannot read image {}: {}", source, e)))?;
                doc.register_image(source, image_type, &data)?;
            }
            let (index, iw, ih) = match doc.images.get(source) {
                Some(info) => (info.index, f64::from(info.width), f64::from(info.height)),
                None => return Err(Error::Input(format!("image {} is not registered", source))),
            };

            let mut w = placement.width;
            let mut h = placement.height;
            if w == 0.0 && h == 0.0 {
                w = -96.0;
                h = -96.0;
            }
            if w < 0.0 {
                w = -iw * 72.0 / w / doc.k;
            }
            if h < 0.0 {
                h = -ih * 72.0 / h / doc.k;
            }
            if w == 0.0 {
                w = h * iw / ih;
            }
            if h == 0.0 {
                h = w * ih / iw;
            }

            let y = match placement.y {
                Some(y) => y,
                None => {
                    if doc.needs_page_break(h) {
                        doc.automatic_page_break()?;
                    }
                    let y = doc.y;
                    doc.y += h;
                    y
                },
            };
            let x = match placement.x {
                Some(x) if x >= 0.0 => x,
                _ => doc.x,
            };

            let k = doc.k;
            doc.out(ContentStreamOp::PaintImage {
                index,
                x: x * k,
                y: (doc.h - (y + h)) * k,
                width: w * k,
                height: h * k,
            });
            if let Some(target) = link {
                doc.new_link(x, y, w, h, target);
            }
            Ok(())
        })
    }

    // ---- output ----

    /// Finish the document. Later calls do nothing.
    ///
    /// An empty document gets one blank page. The footer runs for the last page.
    pub fn close(&mut self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.state == DocumentState::Closed {
            return Ok(());
        }
        let result = self.close_impl();
        if let Err(err) = &result {
            self.latch(err.clone());
        }
        result
    }

    fn close_impl(&mut self) -> Result<()> {
        if self.pages.is_empty() {
            self.add_page_impl(None, None)?;
        }
        self.run_footer()?;
        self.state = DocumentState::Open;

        if let Some(alias) = self.alias.clone() {
            let count = self.pages.len().to_string();
            for page in &mut self.pages {
                page.content.replace_all(alias.as_bytes(), count.as_bytes());
            }
        }

        let created = chrono::Local::now();
        let bytes = pdf_writer::assemble(self, &created)?;
        log::info!("document closed: {} pages, {} bytes", self.pages.len(), bytes.len());
        self.output = Some(bytes);
        self.state = DocumentState::Closed;
        Ok(())
    }

    /// Close the document if needed and write it to `sink`.
    pub fn output<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        self.close()?;
        let bytes = self.output.as_deref().unwrap_or_default();
        if let Err(err) = sink.write_all(bytes) {
            let err = Error::from(err);
            self.latch(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Close the document if needed and return its bytes.
    pub fn output_bytes(&mut self) -> Result<Vec<u8>> {
        self.close()?;
        Ok(self.output.clone().unwrap_or_default())
    }

    /// Close the document if needed and write it to a file.
    pub fn output_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.close()?;
        let bytes = self.output.as_deref().unwrap_or_default();
        if let Err(err) = std::fs::write(path.as_ref(), bytes) {
            let err = Error::from(err);
            self.latch(err.clone());
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Unit;

    fn content(doc: &Document, page: usize) -> String {
        String::from_utf8_lossy(doc.pages[page - 1].content.as_bytes()).to_string()
    }

    fn doc() -> Document {
        Document::new(DocumentConfig::default().with_compress(false))
    }

    #[test]
    fn test_defaults_from_scale() {
        let doc = doc();
        let k = 72.0 / 25.4;
        assert!((doc.l_margin - 28.35 / k).abs() < 1e-9);
        assert!((doc.c_margin - 28.35 / k / 10.0).abs() < 1e-9);
        assert!((doc.line_width - 0.567 / k).abs() < 1e-9);
        assert!((doc.w_pt - 595.28).abs() < 1e-6);
        assert!((doc.h_pt - 841.89).abs() < 1e-6);
        assert_eq!(doc.state(), DocumentState::NotOpen);
    }

    #[test]
    fn test_landscape_swaps_dimensions() {
        let doc = Document::new(
            DocumentConfig::new()
                .with_orientation(Orientation::Landscape)
                .with_unit(Unit::Point),
        );
        assert_eq!(doc.page_size(), (841.89, 595.28));
    }

    #[test]
    fn test_new_page_prologue() {
        let mut doc = doc();
        doc.add_page().unwrap();
        assert_eq!(content(&doc, 1), "0 J\n0.57 w\n");
        assert_eq!(doc.state(), DocumentState::PageActive);
        assert_eq!(doc.page_no(), 1);
    }

    #[test]
    fn test_graphics_state_replayed_on_next_page() {
        let mut doc = doc();
        doc.add_page().unwrap();
        doc.set_font("helvetica", "", 12.0).unwrap();
        doc.set_draw_color(255, 0, 0);
        doc.set_fill_color(128, 128, 128);
        doc.add_page().unwrap();
        let page2 = content(&doc, 2);
        assert_eq!(
            page2,
            "0 J\n0.57 w\nBT /F1 12.00 Tf ET\n1.000 0.000 0.000 RG\n0.502 g\n"
        );
    }

    #[test]
    fn test_header_and_footer_order() {
        let mut doc = doc();
        doc.set_header(|d| {
            d.set_line_width(1.0);
            Ok(())
        });
        doc.set_footer(|d| d.line(0.0, 0.0, 1.0, 1.0));
        doc.add_page().unwrap();
        doc.add_page().unwrap();
        let page1 = content(&doc, 1);
        assert!(page1.contains("2.83 w"));
        assert!(page1.ends_with("l S\n"));
        // line width restored after the header
        assert!(content(&doc, 2).ends_with("2.83 w\n0.57 w\n"));
    }

    #[test]
    fn test_header_error_is_latched() {
        let mut doc = doc();
        doc.set_header(|d| d.set_font("nosuchfont", "", 10.0));
        assert!(doc.add_page().is_err());
        assert!(matches!(doc.error(), Some(Error::Config(_))));
        assert!(doc.add_page().is_ok());
        assert!(doc.output_bytes().is_err());
    }

    #[test]
    fn test_sticky_error_makes_calls_noops() {
        let mut doc = doc();
        doc.add_page().unwrap();
        assert!(doc.set_font("comic", "", 12.0).is_err());
        let before = content(&doc, 1);
        assert!(doc.line(0.0, 0.0, 10.0, 10.0).is_ok());
        doc.set_draw_color(1, 2, 3);
        assert_eq!(content(&doc, 1), before);
        assert!(!doc.ok());
    }

    #[test]
    fn test_set_error_latches_first() {
        let mut doc = doc();
        doc.set_error(Error::Input("first".to_string()));
        doc.set_error(Error::Input("second".to_string()));
        assert!(doc.error().unwrap().to_string().contains("first"));
    }

    #[test]
    fn test_from_strs_latches_config_error() {
        let mut doc = Document::from_strs("P", "furlong", "A4", "");
        assert!(matches!(doc.output_bytes(), Err(Error::Config(_))));
    }

    #[test]
    fn test_color_flag() {
        let mut doc = doc();
        doc.set_text_color(255, 0, 0);
        assert!(doc.color_flag);
        doc.set_fill_color(255, 0, 0);
        assert!(!doc.color_flag);
    }

    #[test]
    fn test_line_cap_emitted_on_change_only() {
        let mut doc = doc();
        doc.add_page().unwrap();
        doc.set_line_cap_style(LineCap::Butt);
        doc.set_line_cap_style(LineCap::Round);
        assert_eq!(content(&doc, 1), "0 J\n0.57 w\n1 J\n");
    }

    #[test]
    fn test_set_font_arial_alias_and_size_zero() {
        let mut doc = doc();
        doc.set_font("Arial", "B", 14.0).unwrap();
        assert_eq!(doc.font_family, "helvetica");
        doc.set_font("", "I", 0.0).unwrap();
        assert_eq!(doc.font_style, "I");
        assert_eq!(doc.font_size_pt, 14.0);
        assert_eq!(doc.fonts.len(), 2);
    }

    #[test]
    fn test_symbol_needs_definition_file() {
        let mut doc = doc();
        doc.set_font_location("/nonexistent");
        assert!(matches!(doc.set_font("symbol", "B", 10.0), Err(Error::Input(_))));
    }

    #[test]
    fn test_string_width() {
        let mut doc = Document::new(DocumentConfig::new().with_unit(Unit::Point));
        assert_eq!(doc.string_width("abc"), 0.0);
        doc.set_font("courier", "", 10.0).unwrap();
        assert!((doc.string_width("abc") - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_cursor_setters() {
        let mut doc = doc();
        doc.add_page().unwrap();
        doc.set_xy(-10.0, -20.0);
        assert!((doc.get_x() - (doc.w - 10.0)).abs() < 1e-9);
        assert!((doc.get_y() - (doc.h - 20.0)).abs() < 1e-9);
        doc.set_y(50.0);
        assert_eq!(doc.get_x(), doc.l_margin);
    }

    #[test]
    fn test_margins() {
        let mut doc = doc();
        doc.set_margins(15.0, 20.0, -1.0);
        assert_eq!(doc.margins().2, 15.0);
        doc.add_page().unwrap();
        doc.set_x(5.0);
        doc.set_left_margin(12.0);
        assert_eq!(doc.get_x(), 12.0);
    }

    #[test]
    fn test_add_page_format_records_override() {
        let mut doc = doc();
        doc.add_page().unwrap();
        doc.add_page_format(Orientation::Landscape, PageSize::A4).unwrap();
        assert!(doc.pages[0].size_override.is_none());
        let (w, h) = doc.pages[1].size_override.unwrap();
        assert!((w - 841.89).abs() < 1e-6);
        assert!((h - 595.28).abs() < 1e-6);
    }

    #[test]
    fn test_links() {
        let mut doc = doc();
        let id = doc.add_link();
        assert_eq!(id, 1);
        doc.add_page().unwrap();
        doc.set_link(id, None, None).unwrap();
        assert_eq!(doc.links[id].page, 1);
        assert!(doc.set_link(7, None, None).is_err());
    }

    #[test]
    fn test_closed_document_rejects_changes() {
        let mut doc = doc();
        doc.close().unwrap();
        assert!(doc.add_page().is_err());
        assert!(doc.ok());
        assert_eq!(doc.state(), DocumentState::Closed);
    }

    #[test]
    fn test_rect_style_parse() {
        assert_eq!("F".parse::<RectStyle>().unwrap(), RectStyle::Fill);
        assert_eq!("fd".parse::<RectStyle>().unwrap(), RectStyle::DrawFill);
        assert_eq!("".parse::<RectStyle>().unwrap(), RectStyle::Draw);
    }
}
