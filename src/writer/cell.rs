//! Text output: baseline text, cells, multi-line cells and flowing text.

use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{Error, Result};

use super::content_stream::{ContentStreamOp, PaintOp};
use super::document::Document;
use super::font_manager::encode_winansi;
use super::page::LinkTarget;
use super::text_layout::{layout_bounded, layout_flowing, FlowStep};

bitflags! {
    /// Cell border sides.
    ///
    /// `ALL` is drawn as one rectangle, any other combination as separate segments.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Border: u8 {
        /// Left side
        const LEFT = 1 << 0;
        /// Top side
        const TOP = 1 << 1;
        /// Right side
        const RIGHT = 1 << 2;
        /// Bottom side
        const BOTTOM = 1 << 3;
        /// Full frame
        const ALL = Self::LEFT.bits() | Self::TOP.bits() | Self::RIGHT.bits() | Self::BOTTOM.bits();
    }
}

impl FromStr for Border {
    type Err = Error;

    /// "1" frames the cell, "0" or "" draws nothing, otherwise any of "LTRB".
    fn from_str(s: &str) -> Result<Self> {
        if s == "1" {
            return Ok(Border::ALL);
        }
        let mut border = Border::empty();
        for c in s.chars() {
            border |= match c.to_ascii_uppercase() {
                'L' => Border::LEFT,
                'T' => Border::TOP,
                'R' => Border::RIGHT,
                'B' => Border::BOTTOM,
                '0' => Border::empty(),
                _ => return Err(Error::Config(format!("Incorrect border: {}", s))),
            };
        }
        Ok(border)
    }
}

/// Horizontal text alignment inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// Flush left
    #[default]
    Left,
    /// Centered
    Center,
    /// Flush right
    Right,
    /// Stretched to the cell width; multi-line cells only
    Justify,
}

impl FromStr for Align {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "" | "L" => Ok(Align::Left),
            "C" => Ok(Align::Center),
            "R" => Ok(Align::Right),
            "J" => Ok(Align::Justify),
            _ => Err(Error::Config(format!("Incorrect alignment: {}", s))),
        }
    }
}

/// Where the cursor goes after a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFeed {
    /// To the right of the cell
    #[default]
    Right,
    /// To the left margin of the next line
    NextLine,
    /// Below the cell, keeping the abscissa
    Below,
}

impl Document {
    /// Print text with its baseline origin at `(x, y)`.
    pub fn text(&mut self, x: f64, y: f64, text: &str) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            doc.require_font()?;
            let encoded = encode_winansi(text);
            let k = doc.k;
            let mut ops = Vec::with_capacity(5);
            if doc.color_flag {
                ops.push(ContentStreamOp::SaveState);
                ops.push(ContentStreamOp::SetFillColor(doc.text_color));
            }
            ops.push(ContentStreamOp::ShowText {
                x: x * k,
                y: (doc.h - y) * k,
                text: encoded.clone(),
            });
            if doc.underline && !encoded.is_empty() {
                ops.extend(doc.underline_op(x, y, &encoded));
            }
            if doc.color_flag {
                ops.push(ContentStreamOp::RestoreState);
            }
            doc.out_line(&ops);
            Ok(())
        })
    }

    /// Print a borderless, left-aligned cell and move to its right.
    pub fn cell(&mut self, w: f64, h: f64, text: &str) -> Result<()> {
        self.cell_format(w, h, text, Border::empty(), LineFeed::Right, Align::Left, false, None)
    }

    /// Print a rectangular cell with optional border, fill and link.
    ///
    /// A width of 0 extends the cell to the right margin. The text is
    /// vertically centered. When the cell would cross the page break
    /// trigger and breaks are accepted, a new page is started first.
    pub fn cell_format(
        &mut self,
        w: f64,
        h: f64,
        text: &str,
        border: Border,
        ln: LineFeed,
        align: Align,
        fill: bool,
        link: Option<LinkTarget>,
    ) -> Result<()> {
        self.run(|doc| {
            let encoded = encode_winansi(text);
            doc.cell_bytes(w, h, &encoded, border, ln, align, fill, link.as_ref())
        })
    }

    pub(crate) fn cell_bytes(
        &mut self,
        w: f64,
        h: f64,
        text: &[u8],
        border: Border,
        ln: LineFeed,
        align: Align,
        fill: bool,
        link: Option<&LinkTarget>,
    ) -> Result<()> {
        self.ensure_page()?;
        if !text.is_empty() {
            self.require_font()?;
        }

        if self.needs_page_break(h) {
            let ws = self.ws;
            if ws > 0.0 {
                self.ws = 0.0;
                self.out(ContentStreamOp::ResetWordSpacing);
            }
            self.automatic_page_break()?;
            if ws > 0.0 {
                self.ws = ws;
                self.out(ContentStreamOp::SetWordSpacing(ws * self.k));
            }
        }

        let w = if w == 0.0 { self.w - self.r_margin - self.x } else { w };
        let k = self.k;
        let (x, y) = (self.x, self.y);
        let mut ops = Vec::new();

        let framed = border == Border::ALL;
        if fill || framed {
            let paint = match (fill, framed) {
                (true, true) => PaintOp::FillStroke,
                (true, false) => PaintOp::Fill,
                _ => PaintOp::Stroke,
            };
            ops.push(ContentStreamOp::Rectangle {
                x: x * k,
                y: (self.h - y) * k,
                width: w * k,
                height: -h * k,
                paint,
            });
        }
        if !framed && !border.is_empty() {
            let segment = |x1: f64, y1: f64, x2: f64, y2: f64| ContentStreamOp::Line {
                x1: x1 * k,
                y1: (self.h - y1) * k,
                x2: x2 * k,
                y2: (self.h - y2) * k,
            };
            if border.contains(Border::LEFT) {
                ops.push(segment(x, y, x, y + h));
            }
            if border.contains(Border::TOP) {
                ops.push(segment(x, y, x + w, y));
            }
            if border.contains(Border::RIGHT) {
                ops.push(segment(x + w, y, x + w, y + h));
            }
            if border.contains(Border::BOTTOM) {
                ops.push(segment(x, y + h, x + w, y + h));
            }
        }

        if !text.is_empty() {
            let sw = self.width_of(text);
            let dx = match align {
                Align::Right => w - self.c_margin - sw,
                Align::Center => (w - sw) / 2.0,
                Align::Left | Align::Justify => self.c_margin,
            };
            let baseline = y + 0.5 * h + 0.3 * self.font_size;
            if self.color_flag {
                ops.push(ContentStreamOp::SaveState);
                ops.push(ContentStreamOp::SetFillColor(self.text_color));
            }
            ops.push(ContentStreamOp::ShowText {
                x: (x + dx) * k,
                y: (self.h - baseline) * k,
                text: text.to_vec(),
            });
            if self.underline {
                ops.extend(self.underline_op(x + dx, baseline, text));
            }
            if self.color_flag {
                ops.push(ContentStreamOp::RestoreState);
            }
            if let Some(target) = link {
                let fs = self.font_size;
                self.new_link(x + dx, y + 0.5 * h - 0.5 * fs, sw, fs, target.clone());
            }
        }

        self.out_line(&ops);
        self.lasth = h;
        match ln {
            LineFeed::Right => self.x += w,
            LineFeed::NextLine => {
                self.y += h;
                self.x = self.l_margin;
            },
            LineFeed::Below => self.y += h,
        }
        Ok(())
    }

    /// Filled rectangle under text whose baseline starts at `(x, baseline)`.
    fn underline_op(&self, x: f64, baseline: f64, text: &[u8]) -> Option<ContentStreamOp> {
        let font = self.current_font()?;
        let up = f64::from(font.def.up);
        let ut = f64::from(font.def.ut);
        let blanks = text.iter().filter(|&&b| b == b' ').count() as f64;
        let w = self.width_of(text) + self.ws * blanks;
        Some(ContentStreamOp::Rectangle {
            x: x * self.k,
            y: (self.h - (baseline - up / 1000.0 * self.font_size)) * self.k,
            width: w * self.k,
            height: -ut / 1000.0 * self.font_size_pt,
            paint: PaintOp::Fill,
        })
    }

    /// Print text in a column of width `w`, breaking lines automatically.
    ///
    /// Lines break at `\n` and at the last space that fits. With
    /// [`Align::Justify`] soft-broken lines are stretched through word
    /// spacing. The cursor returns to the left margin below the text.
    pub fn multi_cell(&mut self, w: f64, h: f64, text: &str, border: Border, align: Align, fill: bool) -> Result<()> {
        self.run(|doc| {
            doc.ensure_page()?;
            let cw = doc.require_font()?.widths().to_vec();
            let w = if w == 0.0 { doc.w - doc.r_margin - doc.x } else { w };
            let wmax = (w - 2.0 * doc.c_margin) * 1000.0 / doc.font_size;

            let mut bytes = encode_winansi(text);
            bytes.retain(|&b| b != b'\r');
            if bytes.last() == Some(&b'\n') {
                bytes.pop();
            }

            let (first, middle) = if border == Border::ALL {
                (Border::LEFT | Border::RIGHT | Border::TOP, Border::LEFT | Border::RIGHT)
            } else {
                let sides = border & (Border::LEFT | Border::RIGHT);
                let first = if border.contains(Border::TOP) {
                    sides | Border::TOP
                } else {
                    sides
                };
                (first, sides)
            };

            let lines = layout_bounded(&bytes, &cw, wmax, align == Align::Justify, doc.font_size);
            let last = lines.len().saturating_sub(1);
            for (n, line) in lines.into_iter().enumerate() {
                match line.word_spacing {
                    Some(ws) => {
                        doc.ws = ws;
                        doc.out(ContentStreamOp::SetWordSpacing(ws * doc.k));
                    },
                    None if doc.ws > 0.0 => {
                        doc.ws = 0.0;
                        doc.out(ContentStreamOp::ResetWordSpacing);
                    },
                    None => {},
                }
                let mut sides = if n == 0 { first } else { middle };
                if n == last && border.contains(Border::BOTTOM) {
                    sides |= Border::BOTTOM;
                }
                doc.cell_bytes(w, h, &bytes[line.range], sides, LineFeed::Below, align, fill, None)?;
            }
            doc.x = doc.l_margin;
            Ok(())
        })
    }

    /// Print flowing text from the cursor with line height `h`.
    ///
    /// Text wraps at the right margin and continues from the left margin.
    /// The cursor is left at the end of the text.
    pub fn write(&mut self, h: f64, text: &str) -> Result<()> {
        self.run(|doc| doc.write_impl(h, text, None))
    }

    /// Like [`Document::write`], with every fragment carrying a link.
    pub fn write_link(&mut self, h: f64, text: &str, link: LinkTarget) -> Result<()> {
        self.run(|doc| doc.write_impl(h, text, Some(&link)))
    }

    fn write_impl(&mut self, h: f64, text: &str, link: Option<&LinkTarget>) -> Result<()> {
        self.ensure_page()?;
        let cw = self.require_font()?.widths().to_vec();
        let mut bytes = encode_winansi(text);
        bytes.retain(|&b| b != b'\r');

        let fs = self.font_size;
        let mut w = self.w - self.r_margin - self.x;
        let full = self.w - self.r_margin - self.l_margin;
        let first_wmax = (w - 2.0 * self.c_margin) * 1000.0 / fs;
        let full_wmax = (full - 2.0 * self.c_margin) * 1000.0 / fs;
        let indented = self.x > self.l_margin;

        for step in layout_flowing(&bytes, &cw, first_wmax, full_wmax, indented) {
            match step {
                FlowStep::Line(range) => {
                    self.cell_bytes(w, h, &bytes[range], Border::empty(), LineFeed::Below, Align::Left, false, link)?;
                    self.x = self.l_margin;
                    w = full;
                },
                FlowStep::Wrap => {
                    self.x = self.l_margin;
                    self.y += h;
                    w = full;
                },
                FlowStep::Tail { range, width_units } => {
                    self.cell_bytes(
                        width_units / 1000.0 * fs,
                        h,
                        &bytes[range],
                        Border::empty(),
                        LineFeed::Right,
                        Align::Left,
                        false,
                        link,
                    )?;
                },
            }
        }
        Ok(())
    }

    /// Line break: back to the left margin, down by `h` or by the last cell height.
    pub fn ln(&mut self, h: Option<f64>) {
        if self.error.is_some() || self.state == super::document::DocumentState::Closed {
            return;
        }
        self.x = self.l_margin;
        self.y += h.unwrap_or(self.lasth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocumentConfig, Unit};

    fn doc() -> Document {
        let mut doc = Document::new(DocumentConfig::new().with_unit(Unit::Point).with_compress(false));
        doc.set_margins(10.0, 10.0, 10.0);
        doc.add_page().unwrap();
        doc.set_font("helvetica", "", 12.0).unwrap();
        doc
    }

    fn content(doc: &Document) -> String {
        String::from_utf8_lossy(doc.pages.last().unwrap().content.as_bytes()).to_string()
    }

    #[test]
    fn test_border_parse() {
        assert_eq!("1".parse::<Border>().unwrap(), Border::ALL);
        assert_eq!("".parse::<Border>().unwrap(), Border::empty());
        assert_eq!("LB".parse::<Border>().unwrap(), Border::LEFT | Border::BOTTOM);
        assert!("X".parse::<Border>().is_err());
    }

    #[test]
    fn test_align_parse() {
        assert_eq!("".parse::<Align>().unwrap(), Align::Left);
        assert_eq!("c".parse::<Align>().unwrap(), Align::Center);
        assert_eq!("J".parse::<Align>().unwrap(), Align::Justify);
    }

    #[test]
    fn test_text_at_baseline() {
        let mut doc = doc();
        doc.text(100.0, 100.0, "Hello").unwrap();
        assert!(content(&doc).ends_with("BT 100.00 741.89 Td (Hello) Tj ET\n"));
    }

    #[test]
    fn test_framed_filled_cell() {
        let mut doc = doc();
        doc.cell_format(100.0, 20.0, "Hi", Border::ALL, LineFeed::Right, Align::Center, true, None)
            .unwrap();
        let out = content(&doc);
        // H=722 i=222 at 12pt: 11.328 wide, centered in 100
        assert!(out.contains("10.00 831.89 100.00 -20.00 re B BT 54.34 818.29 Td (Hi) Tj ET\n"));
        assert_eq!(doc.get_x(), 110.0);
        assert_eq!(doc.lasth, 20.0);
    }

    #[test]
    fn test_line_feed_modes() {
        let mut doc = doc();
        doc.cell_format(50.0, 10.0, "", Border::empty(), LineFeed::NextLine, Align::Left, false, None)
            .unwrap();
        assert_eq!((doc.get_x(), doc.get_y()), (10.0, 20.0));
        doc.set_x(40.0);
        doc.cell_format(50.0, 10.0, "", Border::empty(), LineFeed::Below, Align::Left, false, None)
            .unwrap();
        assert_eq!((doc.get_x(), doc.get_y()), (40.0, 30.0));
    }

    #[test]
    fn test_zero_width_extends_to_margin() {
        let mut doc = doc();
        doc.cell_format(0.0, 10.0, "", Border::empty(), LineFeed::Right, Align::Left, false, None)
            .unwrap();
        assert!((doc.get_x() - (595.28 - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_partial_border_segments() {
        let mut doc = doc();
        doc.cell_format(100.0, 20.0, "", Border::LEFT | Border::BOTTOM, LineFeed::Right, Align::Left, false, None)
            .unwrap();
        assert!(content(&doc).ends_with("10.00 831.89 m 10.00 811.89 l S 10.00 811.89 m 110.00 811.89 l S\n"));
    }

    #[test]
    fn test_underline_and_text_color() {
        let mut doc = doc();
        doc.set_font("helvetica", "U", 12.0).unwrap();
        doc.set_text_color(255, 0, 0);
        doc.cell(100.0, 20.0, "Hi").unwrap();
        let out = content(&doc);
        assert!(out.contains("q 1.000 0.000 0.000 rg BT"));
        assert!(out.contains(" re f Q\n"));
    }

    #[test]
    fn test_text_requires_font() {
        let mut doc = Document::new(DocumentConfig::new().with_compress(false));
        assert!(doc.cell(10.0, 10.0, "").is_ok());
        assert!(matches!(doc.cell(10.0, 10.0, "x"), Err(Error::Config(_))));
    }

    #[test]
    fn test_cell_triggers_page_break() {
        let mut doc = doc();
        for _ in 0..10 {
            doc.cell_format(100.0, 100.0, "row", Border::empty(), LineFeed::NextLine, Align::Left, false, None)
                .unwrap();
        }
        assert_eq!(doc.page_no(), 2);
    }

    #[test]
    fn test_page_break_policy_refuses() {
        let mut doc = doc();
        doc.set_accept_page_break(|_| false);
        for _ in 0..10 {
            doc.cell_format(100.0, 100.0, "row", Border::empty(), LineFeed::NextLine, Align::Left, false, None)
                .unwrap();
        }
        assert_eq!(doc.page_no(), 1);
    }

    #[test]
    fn test_no_break_inside_header() {
        let mut doc = Document::new(DocumentConfig::new().with_unit(Unit::Point).with_compress(false));
        doc.set_header(|d| {
            d.set_font("courier", "", 10.0)?;
            d.set_y(830.0);
            d.cell(10.0, 50.0, "header")
        });
        doc.add_page().unwrap();
        assert_eq!(doc.page_no(), 1);
    }

    #[test]
    fn test_multi_cell_border_sides() {
        let mut doc = doc();
        doc.multi_cell(60.0, 10.0, "a\nb\nc", Border::ALL, Align::Left, false).unwrap();
        let out = content(&doc);
        // LRT, LR, LRB
        assert_eq!(out.matches(" l S").count(), 8);
        assert!(!out.contains(" re "));
        assert_eq!(doc.get_x(), 10.0);
        assert_eq!(doc.get_y(), 40.0);
    }

    #[test]
    fn test_multi_cell_justifies_and_resets() {
        let mut doc = doc();
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";
        doc.multi_cell(100.0, 10.0, text, Border::empty(), Align::Justify, false).unwrap();
        let out = content(&doc);
        assert!(out.contains(" Tw\n"));
        assert!(out.trim_end().ends_with("Tj ET"));
        assert!(out.contains("0 Tw\n"));
        assert_eq!(doc.ws, 0.0);
    }

    #[test]
    fn test_multi_cell_drops_trailing_newline() {
        let mut doc = doc();
        doc.multi_cell(100.0, 10.0, "one\r\n", Border::empty(), Align::Left, false).unwrap();
        assert_eq!(doc.get_y(), 20.0);
    }

    #[test]
    fn test_write_wraps_and_leaves_cursor() {
        let mut doc = doc();
        let text = format!("{}end", "flowing words ".repeat(40));
        doc.write(14.0, &text).unwrap();
        let out = content(&doc);
        assert!(out.matches("Tj ET").count() > 2);
        assert!(doc.get_y() > 10.0);
        assert!(doc.get_x() > 10.0);
    }

    #[test]
    fn test_write_wraps_long_word_when_indented() {
        let mut doc = doc();
        doc.set_x(500.0);
        doc.write(10.0, "Supercalifragilistic").unwrap();
        assert_eq!(doc.get_y(), 20.0);
        assert!(content(&doc).contains("(Supercalifragilistic)"));
    }

    #[test]
    fn test_write_link_annotates_each_fragment() {
        let mut doc = doc();
        doc.write_link(10.0, "first\nsecond", LinkTarget::External("https://example.com".to_string()))
            .unwrap();
        assert_eq!(doc.pages[0].links.len(), 2);
    }

    #[test]
    fn test_ln_uses_last_height() {
        let mut doc = doc();
        doc.cell(20.0, 15.0, "").unwrap();
        doc.ln(None);
        assert_eq!((doc.get_x(), doc.get_y()), (10.0, 25.0));
        doc.ln(Some(5.0));
        assert_eq!(doc.get_y(), 30.0);
    }
}
