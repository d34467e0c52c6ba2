//! Line breaking for bounded and flowing text.
//!
//! Both planners work on single-byte encoded text and a 256-entry width table
//! in thousandths of the font size. Maximum widths use the same units, so a
//! user-space width `w` at font size `fs` corresponds to `w * 1000 / fs`.
//!
//! The planners only decide where lines end. The caller turns each planned
//! line into a cell and handles borders, page breaks and word spacing.

use std::ops::Range;

/// Width of encoded text in thousandths of the font size.
pub fn text_width_units(text: &[u8], cw: &[u32]) -> u32 {
    text.iter()
        .map(|&b| cw.get(b as usize).copied().unwrap_or(0))
        .sum()
}

/// One line of a bounded (multi-cell) layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLine {
    /// Byte range of the line in the input
    pub range: Range<usize>,
    /// Word spacing in user units to set before the line, for justified soft breaks
    pub word_spacing: Option<f64>,
}

/// Break `text` into lines no wider than `wmax`.
///
/// Lines end at `\n`, at the last space before the width is exceeded, or,
/// when the line has no space, right before the overflowing character. A
/// single character wider than `wmax` still forms a line of its own. With
/// `justify`, soft breaks carry the word spacing that stretches the line to
/// `wmax`; `font_size` converts it to user units.
pub fn layout_bounded(text: &[u8], cw: &[u32], wmax: f64, justify: bool, font_size: f64) -> Vec<BoundedLine> {
    let width = |b: u8| f64::from(cw.get(b as usize).copied().unwrap_or(0));
    let mut lines = Vec::new();
    let mut sep: Option<usize> = None;
    let mut i = 0;
    let mut j = 0;
    let mut l = 0.0;
    let mut ls = 0.0;
    let mut ns = 0usize;

    while i < text.len() {
        let c = text[i];
        if c == b'\n' {
            lines.push(BoundedLine {
                range: j..i,
                word_spacing: None,
            });
            i += 1;
            sep = None;
            j = i;
            l = 0.0;
            ns = 0;
            continue;
        }
        if c == b' ' {
            sep = Some(i);
            ls = l;
            ns += 1;
        }
        l += width(c);
        if l > wmax {
            match sep {
                None => {
                    if i == j {
                        i += 1;
                    }
                    lines.push(BoundedLine {
                        range: j..i,
                        word_spacing: None,
                    });
                },
                Some(s) => {
                    let word_spacing = justify.then(|| {
                        if ns > 1 {
                            (wmax - ls) / 1000.0 * font_size / (ns - 1) as f64
                        } else {
                            0.0
                        }
                    });
                    lines.push(BoundedLine {
                        range: j..s,
                        word_spacing,
                    });
                    i = s + 1;
                },
            }
            sep = None;
            j = i;
            l = 0.0;
            ns = 0;
        } else {
            i += 1;
        }
    }

    lines.push(BoundedLine {
        range: j..i,
        word_spacing: None,
    });
    lines
}

/// One step of a flowing (write) layout.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    /// Emit the range as a full-width line, then continue at the left margin
    Line(Range<usize>),
    /// Move to the left margin of the next line without emitting anything
    Wrap,
    /// Emit the remaining range in a cell of its own measured width
    Tail {
        /// Byte range of the fragment
        range: Range<usize>,
        /// Measured width in thousandths of the font size
        width_units: f64,
    },
}

/// Plan flowing text that starts at the cursor.
///
/// The first line has `first_wmax` available; every later line has
/// `full_wmax`. When `starts_indented` is set and the first word does not
/// fit, the text wraps to the next line instead of splitting the word.
pub fn layout_flowing(
    text: &[u8],
    cw: &[u32],
    first_wmax: f64,
    full_wmax: f64,
    starts_indented: bool,
) -> Vec<FlowStep> {
    let width = |b: u8| f64::from(cw.get(b as usize).copied().unwrap_or(0));
    let mut steps = Vec::new();
    let mut wmax = first_wmax;
    let mut indented = starts_indented;
    let mut sep: Option<usize> = None;
    let mut i = 0;
    let mut j = 0;
    let mut l = 0.0;

    while i < text.len() {
        let c = text[i];
        if c == b'\n' {
            steps.push(FlowStep::Line(j..i));
            i += 1;
            sep = None;
            j = i;
            l = 0.0;
            wmax = full_wmax;
            indented = false;
            continue;
        }
        if c == b' ' {
            sep = Some(i);
        }
        l += width(c);
        if l > wmax {
            match sep {
                None => {
                    if indented {
                        steps.push(FlowStep::Wrap);
                        wmax = full_wmax;
                        indented = false;
                        i += 1;
                        continue;
                    }
                    if i == j {
                        i += 1;
                    }
                    steps.push(FlowStep::Line(j..i));
                },
                Some(s) => {
                    steps.push(FlowStep::Line(j..s));
                    i = s + 1;
                },
            }
            sep = None;
            j = i;
            l = 0.0;
            wmax = full_wmax;
            indented = false;
        } else {
            i += 1;
        }
    }

    if i != j {
        steps.push(FlowStep::Tail {
            range: j..i,
            width_units: l,
        });
    }
    steps
}
