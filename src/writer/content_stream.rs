//! Page content streams.
//!
//! Every drawing and text call lands here as one or more operators. Coordinates
//! are already converted to PDF space (points, origin bottom-left) by the
//! caller; this module only formats them. Lengths use two decimals, word
//! spacing three, color components three.

use std::fmt;

/// A device color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    /// Gray level in 0..=1
    Gray(f64),
    /// RGB components in 0..=1
    Rgb(f64, f64, f64),
}

impl Color {
    /// Black.
    pub const BLACK: Color = Color::Gray(0.0);

    /// Build a color from 0-255 components, collapsing equal components to gray.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        let f = |c: u8| f64::from(c) / 255.0;
        if r == g && r == b {
            Color::Gray(f(r))
        } else {
            Color::Rgb(f(r), f(g), f(b))
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, gray_op: &str, rgb_op: &str) -> fmt::Result {
        match self {
            Color::Gray(g) => write!(f, "{:.3} {}", g, gray_op),
            Color::Rgb(r, g, b) => write!(f, "{:.3} {:.3} {:.3} {}", r, g, b, rgb_op),
        }
    }
}

/// Line cap style (J operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Square end at the endpoint
    #[default]
    Butt,
    /// Semicircular end
    Round,
    /// Square end projecting half the line width
    Square,
}

impl LineCap {
    /// Operator operand.
    pub fn value(&self) -> u8 {
        match self {
            LineCap::Butt => 0,
            LineCap::Round => 1,
            LineCap::Square => 2,
        }
    }
}

impl std::str::FromStr for LineCap {
    type Err = crate::error::Error;

    /// Unknown names fall back to butt.
    fn from_str(s: &str) -> crate::error::Result<Self> {
        Ok(match s {
            "round" => LineCap::Round,
            "square" => LineCap::Square,
            _ => LineCap::Butt,
        })
    }
}

/// Path painting operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOp {
    /// Stroke (S)
    Stroke,
    /// Fill (f)
    Fill,
    /// Fill and stroke (B)
    FillStroke,
}

impl PaintOp {
    fn as_str(&self) -> &'static str {
        match self {
            PaintOp::Stroke => "S",
            PaintOp::Fill => "f",
            PaintOp::FillStroke => "B",
        }
    }
}

/// Operations that can be added to a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentStreamOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Set line cap (J)
    SetLineCap(LineCap),
    /// Set line width in points (w)
    SetLineWidth(f64),
    /// Set stroke color (G / RG)
    SetStrokeColor(Color),
    /// Set fill color, also used for text (g / rg)
    SetFillColor(Color),
    /// Select font resource `/F<index>` at a size in points, in its own text object
    SelectFont {
        /// 1-based font resource index
        index: usize,
        /// Size in points
        size: f64,
    },
    /// Set word spacing in points (Tw)
    SetWordSpacing(f64),
    /// Reset word spacing to zero
    ResetWordSpacing,
    /// Rectangle path painted immediately (re)
    Rectangle {
        /// Lower-left x
        x: f64,
        /// Upper y
        y: f64,
        /// Width
        width: f64,
        /// Height, negative to extend downwards
        height: f64,
        /// Painting operator
        paint: PaintOp,
    },
    /// Stroked straight segment (m l S)
    Line {
        /// Start x
        x1: f64,
        /// Start y
        y1: f64,
        /// End x
        x2: f64,
        /// End y
        y2: f64,
    },
    /// Positioned text in its own text object (BT Td Tj ET)
    ShowText {
        /// Baseline x
        x: f64,
        /// Baseline y
        y: f64,
        /// Encoded text bytes, unescaped
        text: Vec<u8>,
    },
    /// Paint image `/I<index>` scaled into a box (q cm Do Q)
    PaintImage {
        /// 1-based image resource index
        index: usize,
        /// Lower-left x
        x: f64,
        /// Lower-left y
        y: f64,
        /// Rendered width
        width: f64,
        /// Rendered height
        height: f64,
    },
}

impl ContentStreamOp {
    /// Append the operator text to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            ContentStreamOp::ShowText { x, y, text } => {
                out.extend_from_slice(format!("BT {:.2} {:.2} Td (", x, y).as_bytes());
                out.extend_from_slice(&super::object_serializer::escape(text));
                out.extend_from_slice(b") Tj ET");
            },
            other => out.extend_from_slice(other.to_string().as_bytes()),
        }
    }
}

impl fmt::Display for ContentStreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentStreamOp::SaveState => write!(f, "q"),
            ContentStreamOp::RestoreState => write!(f, "Q"),
            ContentStreamOp::SetLineCap(cap) => write!(f, "{} J", cap.value()),
            ContentStreamOp::SetLineWidth(w) => write!(f, "{:.2} w", w),
            ContentStreamOp::SetStrokeColor(c) => c.write(f, "G", "RG"),
            ContentStreamOp::SetFillColor(c) => c.write(f, "g", "rg"),
            ContentStreamOp::SelectFont { index, size } => {
                write!(f, "BT /F{} {:.2} Tf ET", index, size)
            },
            ContentStreamOp::SetWordSpacing(ws) => write!(f, "{:.3} Tw", ws),
            ContentStreamOp::ResetWordSpacing => write!(f, "0 Tw"),
            ContentStreamOp::Rectangle {
                x,
                y,
                width,
                height,
                paint,
            } => write!(f, "{:.2} {:.2} {:.2} {:.2} re {}", x, y, width, height, paint.as_str()),
            ContentStreamOp::Line { x1, y1, x2, y2 } => {
                write!(f, "{:.2} {:.2} m {:.2} {:.2} l S", x1, y1, x2, y2)
            },
            ContentStreamOp::ShowText { x, y, text } => {
                let escaped = super::object_serializer::escape(text);
                write!(
                    f,
                    "BT {:.2} {:.2} Td ({}) Tj ET",
                    x,
                    y,
                    String::from_utf8_lossy(&escaped)
                )
            },
            ContentStreamOp::PaintImage {
                index,
                x,
                y,
                width,
                height,
            } => write!(f, "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /I{} Do Q", width, height, x, y, index),
        }
    }
}

/// Builder for one page's content stream.
///
/// Operators are formatted as soon as they are added, one line per call.
#[derive(Debug, Default, Clone)]
pub struct ContentStreamBuilder {
    buf: Vec<u8>,
}

impl ContentStreamBuilder {
    /// Create an empty content stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation on its own line.
    pub fn op(&mut self, op: ContentStreamOp) -> &mut Self {
        op.write_to(&mut self.buf);
        self.buf.push(b'\n');
        self
    }

    /// Add several operations on a single line, separated by spaces.
    pub fn line(&mut self, ops: &[ContentStreamOp]) -> &mut Self {
        if ops.is_empty() {
            return self;
        }
        for (i, op) in ops.iter().enumerate() {
            if i > 0 {
                self.buf.push(b' ');
            }
            op.write_to(&mut self.buf);
        }
        self.buf.push(b'\n');
        self
    }

    /// Raw stream bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Stream length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Replace every occurrence of `token` with `value`.
    pub fn replace_all(&mut self, token: &[u8], value: &[u8]) {
        if token.is_empty() || self.buf.len() < token.len() {
            return;
        }
        let mut out = Vec::with_capacity(self.buf.len());
        let mut i = 0;
        while i < self.buf.len() {
            if self.buf[i..].starts_with(token) {
                out.extend_from_slice(value);
                i += token.len();
            } else {
                out.push(self.buf[i]);
                i += 1;
            }
        }
        self.buf = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: ContentStreamOp) -> String {
        let mut builder = ContentStreamBuilder::new();
        builder.op(op);
        String::from_utf8_lossy(builder.as_bytes()).to_string()
    }

    #[test]
    fn test_color_from_rgb8() {
        assert_eq!(Color::from_rgb8(0, 0, 0), Color::Gray(0.0));
        assert_eq!(Color::from_rgb8(255, 255, 255), Color::Gray(1.0));
        assert!(matches!(Color::from_rgb8(255, 0, 0), Color::Rgb(..)));
    }

    #[test]
    fn test_color_operators() {
        assert_eq!(render(ContentStreamOp::SetStrokeColor(Color::Gray(0.5))), "0.500 G\n");
        assert_eq!(
            render(ContentStreamOp::SetFillColor(Color::from_rgb8(255, 0, 0))),
            "1.000 0.000 0.000 rg\n"
        );
    }

    #[test]
    fn test_font_selection() {
        assert_eq!(
            render(ContentStreamOp::SelectFont { index: 1, size: 12.0 }),
            "BT /F1 12.00 Tf ET\n"
        );
    }

    #[test]
    fn test_word_spacing_precision() {
        assert_eq!(render(ContentStreamOp::SetWordSpacing(1.23456)), "1.235 Tw\n");
        assert_eq!(render(ContentStreamOp::ResetWordSpacing), "0 Tw\n");
    }

    #[test]
    fn test_show_text_escapes() {
        let op = ContentStreamOp::ShowText {
            x: 28.35,
            y: 800.0,
            text: b"f(x) \\ 2".to_vec(),
        };
        assert_eq!(render(op), "BT 28.35 800.00 Td (f\\(x\\) \\\\ 2) Tj ET\n");
    }

    #[test]
    fn test_show_text_keeps_high_bytes() {
        let mut builder = ContentStreamBuilder::new();
        builder.op(ContentStreamOp::ShowText {
            x: 0.0,
            y: 0.0,
            text: vec![0xE9, 0x80],
        });
        assert!(builder.as_bytes().windows(2).any(|w| w == [0xE9, 0x80]));
    }

    #[test]
    fn test_line_joins_ops() {
        let mut builder = ContentStreamBuilder::new();
        builder.line(&[
            ContentStreamOp::Rectangle {
                x: 10.0,
                y: 20.0,
                width: 30.0,
                height: -5.0,
                paint: PaintOp::FillStroke,
            },
            ContentStreamOp::Line {
                x1: 1.0,
                y1: 2.0,
                x2: 3.0,
                y2: 4.0,
            },
        ]);
        assert_eq!(
            String::from_utf8_lossy(builder.as_bytes()),
            "10.00 20.00 30.00 -5.00 re B 1.00 2.00 m 3.00 4.00 l S\n"
        );
    }

    #[test]
    fn test_paint_image() {
        let op = ContentStreamOp::PaintImage {
            index: 2,
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        assert_eq!(render(op), "q 100.00 0 0 50.00 10.00 20.00 cm /I2 Do Q\n");
    }

    #[test]
    fn test_replace_all() {
        let mut builder = ContentStreamBuilder::new();
        builder.op(ContentStreamOp::ShowText {
            x: 0.0,
            y: 0.0,
            text: b"Page 1/{nb} of {nb}".to_vec(),
        });
        builder.replace_all(b"{nb}", b"12");
        let content = String::from_utf8_lossy(builder.as_bytes()).to_string();
        assert!(content.contains("(Page 1/12 of 12)"));
    }

    #[test]
    fn test_line_cap_parse() {
        assert_eq!("round".parse::<LineCap>().unwrap(), LineCap::Round);
        assert_eq!("square".parse::<LineCap>().unwrap().value(), 2);
        assert_eq!("anything".parse::<LineCap>().unwrap(), LineCap::Butt);
    }
}
