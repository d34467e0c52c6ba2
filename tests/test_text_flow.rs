//! Integration tests for text placement.
//!
//! Multi-line cells, flowing text, automatic page breaks with header and
//! footer callbacks, and link annotations attached to text.

use std::cell::Cell;
use std::rc::Rc;

use pdf_quill::{Align, Border, Document, DocumentConfig, LineFeed, LinkTarget, Unit};

const PARAGRAPH: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor \
incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation \
ullamco laboris nisi ut aliquip ex ea commodo consequat.";

fn plain_doc(unit: Unit) -> Document {
    Document::new(DocumentConfig::new().with_unit(unit).with_compress(false))
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

#[test]
fn test_long_word_is_hard_broken() {
    let mut doc = plain_doc(Unit::Point);
    doc.add_page().unwrap();
    doc.set_font("helvetica", "", 12.0).unwrap();
    let y = doc.get_y();
    doc.multi_cell(40.0, 14.0, &"A".repeat(50), Border::empty(), Align::Left, false)
        .unwrap();

    // 40pt minus the cell margins holds four capital A's at 12pt
    assert_eq!(doc.get_y(), y + 13.0 * 14.0);
    let out = text(&doc.output_bytes().unwrap());
    assert_eq!(out.matches("(AAAA) Tj").count(), 12);
    assert_eq!(out.matches("(AA) Tj").count(), 1);
}

#[test]
fn test_single_wide_character_still_advances() {
    let mut doc = plain_doc(Unit::Point);
    doc.add_page().unwrap();
    doc.set_font("helvetica", "", 12.0).unwrap();
    let y = doc.get_y();
    // narrower than any glyph once the cell margins are removed
    doc.multi_cell(6.0, 10.0, "WW", Border::empty(), Align::Left, false).unwrap();
    assert!(doc.get_y() >= y + 20.0);
    let out = text(&doc.output_bytes().unwrap());
    assert_eq!(out.matches("(W) Tj").count(), 2);
}

#[test]
fn test_justified_lines_set_and_reset_word_spacing() {
    let mut doc = plain_doc(Unit::Millimeter);
    doc.add_page().unwrap();
    doc.set_font("courier", "", 10.0).unwrap();
    doc.multi_cell(
        60.0,
        5.0,
        "several words in a narrow column of text that keeps going for a while",
        Border::empty(),
        Align::Justify,
        false,
    )
    .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.contains(" Tw\nBT "));
    assert!(out.contains("\n0 Tw\n"));
    assert!(out.contains("(several words in a narrow) Tj"));
}

#[test]
fn test_framed_multi_cell_borders() {
    let mut doc = plain_doc(Unit::Point);
    doc.add_page().unwrap();
    doc.set_font("courier", "", 10.0).unwrap();
    doc.multi_cell(100.0, 10.0, "one\ntwo\nthree", Border::ALL, Align::Left, false)
        .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    // sides are drawn as segments, never as a closed rectangle
    assert!(!out.contains(" re S"));
    // top once, bottom once, left and right on each of the three lines
    assert_eq!(out.matches(" l S").count(), 8);
}

#[test]
fn test_write_wraps_and_keeps_cursor() {
    let mut doc = plain_doc(Unit::Millimeter);
    doc.add_page().unwrap();
    doc.set_font("times", "", 12.0).unwrap();
    let start_y = doc.get_y();
    doc.write(5.0, &PARAGRAPH.repeat(3)).unwrap();

    assert_eq!(doc.page_no(), 1);
    assert!(doc.get_y() > start_y);
    let (left, _, right, _) = doc.margins();
    assert!(doc.get_x() > left);
    assert!(doc.get_x() <= doc.page_size().0 - right);
}

#[test]
fn test_write_from_indented_cursor_wraps_long_word() {
    let mut doc = plain_doc(Unit::Millimeter);
    doc.add_page().unwrap();
    doc.set_font("helvetica", "", 12.0).unwrap();
    doc.set_x(150.0);
    let y = doc.get_y();
    doc.write(5.0, "Supercalifragilisticexpialidocious").unwrap();
    assert_eq!(doc.get_y(), y + 5.0);
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.contains("(Supercalifragilisticexpialidocious) Tj"));
}

#[test]
fn test_automatic_page_breaks_run_header_and_footer() {
    let mut doc = plain_doc(Unit::Millimeter);
    let footers = Rc::new(Cell::new(0));
    let counter = Rc::clone(&footers);
    doc.set_header(|d| {
        d.set_font("helvetica", "B", 10.0)?;
        d.cell_format(0.0, 10.0, "Running head", Border::BOTTOM, LineFeed::NextLine, Align::Center, false, None)
    });
    doc.set_footer(move |d| {
        counter.set(counter.get() + 1);
        d.set_y(-15.0);
        d.set_font("helvetica", "I", 8.0)?;
        let label = format!("p{}", d.page_no());
        d.cell(0.0, 10.0, &label)
    });

    doc.add_page().unwrap();
    doc.set_font("times", "", 12.0).unwrap();
    for _ in 0..40 {
        doc.multi_cell(0.0, 5.0, PARAGRAPH, Border::empty(), Align::Justify, false)
            .unwrap();
    }
    let pages = doc.page_no();
    assert!(pages > 1);

    let out = text(&doc.output_bytes().unwrap());
    assert_eq!(out.matches("(Running head) Tj").count(), pages);
    assert_eq!(footers.get(), pages);
    assert!(out.contains(&format!("(p{}) Tj", pages)));
    // body font is restored after the header changes it
    assert!(out.matches("BT /F1 10.00 Tf ET").count() >= pages);
}

#[test]
fn test_page_break_policy() {
    let mut doc = plain_doc(Unit::Millimeter);
    doc.set_accept_page_break(|d| d.page_no() < 2);
    doc.add_page().unwrap();
    doc.set_font("times", "", 12.0).unwrap();
    for _ in 0..80 {
        doc.multi_cell(0.0, 5.0, PARAGRAPH, Border::empty(), Align::Left, false)
            .unwrap();
    }
    assert_eq!(doc.page_no(), 2);

    let mut fixed = plain_doc(Unit::Millimeter);
    fixed.set_auto_page_break(false, 0.0);
    fixed.add_page().unwrap();
    fixed.set_font("times", "", 12.0).unwrap();
    for _ in 0..80 {
        fixed.cell_format(0.0, 10.0, "row", Border::empty(), LineFeed::NextLine, Align::Left, false, None)
            .unwrap();
    }
    assert_eq!(fixed.page_no(), 1);
}

#[test]
fn test_page_break_keeps_abscissa() {
    let mut doc = plain_doc(Unit::Millimeter);
    doc.add_page().unwrap();
    doc.set_font("courier", "", 10.0).unwrap();
    doc.set_xy(80.0, 270.0);
    doc.cell(20.0, 10.0, "x").unwrap();
    assert_eq!(doc.page_no(), 2);
    assert_eq!(doc.get_x(), 100.0);
}

#[test]
fn test_text_links() {
    let mut doc = plain_doc(Unit::Millimeter);
    let chapter = doc.add_link();
    doc.add_page().unwrap();
    doc.set_font("helvetica", "U", 12.0).unwrap();
    doc.write_link(5.0, "visit the site", LinkTarget::External("https://example.com/docs".to_string()))
        .unwrap();
    doc.ln(None);
    doc.cell_format(
        40.0,
        10.0,
        "chapter",
        Border::empty(),
        LineFeed::NextLine,
        Align::Left,
        false,
        Some(LinkTarget::Internal(chapter)),
    )
    .unwrap();
    doc.add_page().unwrap();
    doc.set_link(chapter, Some(0.0), None).unwrap();

    let out = text(&doc.output_bytes().unwrap());
    assert_eq!(out.matches("/Subtype /Link").count(), 2);
    assert!(out.contains("/A <</S /URI /URI (https://example.com/docs)>>"));
    assert!(out.contains("/Dest [5 0 R /XYZ 0 841.89 null]"));
    // underline is painted as a filled rectangle under the text
    assert!(out.contains(" re f"));
}

#[test]
fn test_colored_text_is_wrapped_in_state_save() {
    let mut doc = plain_doc(Unit::Point);
    doc.add_page().unwrap();
    doc.set_font("helvetica", "", 12.0).unwrap();
    doc.set_text_color(255, 0, 0);
    doc.text(100.0, 100.0, "red").unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.contains("q 1.000 0.000 0.000 rg BT 100.00 741.89 Td (red) Tj ET Q"));
}
