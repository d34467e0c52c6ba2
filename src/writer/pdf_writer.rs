//! PDF document writer.
//!
//! Turns a finished [`Document`] into the file bytes. Objects are written in a
//! fixed order so every forward reference can be computed from the object
//! counter before the target exists:
//!
//! ```text
//! header
//! pages            3, 4 (page 1 and its contents), 5, 6, ...
//! pages root       1
//! encodings        one per difference table
//! font files       one per embedded program
//! fonts            font, widths, descriptor
//! images           image, soft mask, palette
//! resources        2
//! info, catalog
//! xref, trailer
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::config::{LayoutMode, Orientation, ZoomMode};
use crate::error::{Error, Result};

use super::document::Document;
use super::font_manager::{FontFile, FontKind};
use super::image_handler::{ColorSpace, ImageInfo};
use super::object_serializer::{compress_data, text_string, ObjectSerializer, PAGES_ROOT_ID, RESOURCES_ID};
use super::page::LinkTarget;

/// Serialize the document. Page buffers must already be final.
pub(crate) fn assemble(doc: &Document, created: &DateTime<Local>) -> Result<Vec<u8>> {
    let mut s = ObjectSerializer::new();
    s.out(format!("%PDF-{}.{}", doc.pdf_version.0, doc.pdf_version.1));
    put_pages(doc, &mut s)?;
    let fonts = put_fonts(doc, &mut s)?;
    let images = put_images(doc, &mut s)?;
    put_resource_dict(&mut s, &fonts, &images);
    put_info(doc, &mut s, created);
    put_catalog(doc, &mut s);
    Ok(s.finish())
}

/// Default page size in points, oriented.
fn default_size_pt(doc: &Document) -> (f64, f64) {
    let (w, h) = (doc.def_page_size.0 * doc.k, doc.def_page_size.1 * doc.k);
    match doc.def_orientation {
        Orientation::Portrait => (w, h),
        Orientation::Landscape => (h, w),
    }
}

fn put_pages(doc: &Document, s: &mut ObjectSerializer) -> Result<()> {
    let (w_pt, h_pt) = default_size_pt(doc);
    let mut kids = Vec::with_capacity(doc.pages.len());

    for page in &doc.pages {
        let page_id = s.new_object();
        kids.push(page_id);
        s.out("<</Type /Page");
        s.out(format!("/Parent {} 0 R", PAGES_ROOT_ID));
        if let Some((w, h)) = page.size_override {
            s.out(format!("/MediaBox [0 0 {:.2} {:.2}]", w, h));
        }
        s.out(format!("/Resources {} 0 R", RESOURCES_ID));

        if !page.links.is_empty() {
            let mut annots = b"/Annots [".to_vec();
            for link in &page.links {
                annots.extend_from_slice(
                    format!(
                        "<</Type /Annot /Subtype /Link /Rect [{:.2} {:.2} {:.2} {:.2}] /Border [0 0 0] ",
                        link.x,
                        link.y,
                        link.x + link.width,
                        link.y - link.height
                    )
                    .as_bytes(),
                );
                match &link.target {
                    LinkTarget::External(url) => {
                        annots.extend_from_slice(b"/A <</S /URI /URI ");
                        annots.extend_from_slice(&text_string(url.as_bytes()));
                        annots.extend_from_slice(b">>>>");
                    },
                    LinkTarget::Internal(id) => {
                        let dest = doc.links.get(*id).copied().unwrap_or_default();
                        let target = match dest.page.checked_sub(1).and_then(|i| doc.pages.get(i)) {
                            Some(target) => target,
                            None if dest.page == 0 => {
                                return Err(Error::Config(format!("Link {} has no destination", id)));
                            },
                            None => {
                                return Err(Error::Config(format!(
                                    "Link {} points to page {} of {}",
                                    id,
                                    dest.page,
                                    doc.pages.len()
                                )));
                            },
                        };
                        let target_h = target.size_override.map_or(h_pt, |(_, h)| h);
                        annots.extend_from_slice(
                            format!(
                                "/Dest [{} 0 R /XYZ 0 {:.2} null]>>",
                                1 + 2 * dest.page,
                                target_h - dest.y * doc.k
                            )
                            .as_bytes(),
                        );
                    },
                }
            }
            annots.push(b']');
            s.out(annots);
        }

        if doc.pdf_version > (1, 3) {
            s.out("/Group <</Type /Group /S /Transparency /CS /DeviceRGB>>");
        }
        s.out(format!("/Contents {} 0 R>>", page_id + 1));
        s.end_object();

        s.new_object();
        if doc.compress {
            let data = compress_data(page.content.as_bytes())?;
            s.out(format!("<</Filter /FlateDecode /Length {}>>", data.len()));
            s.put_stream(&data);
        } else {
            let data = page.content.as_bytes();
            s.out(format!("<</Length {}>>", data.len()));
            s.put_stream(data);
        }
        s.end_object();
    }

    s.begin_reserved(PAGES_ROOT_ID);
    s.out("<</Type /Pages");
    let mut line = String::from("/Kids [");
    for id in &kids {
        line.push_str(&format!("{} 0 R ", id));
    }
    line.push(']');
    s.out(line);
    s.out(format!("/Count {}", doc.pages.len()));
    s.out(format!("/MediaBox [0 0 {:.2} {:.2}]", w_pt, h_pt));
    s.out(">>");
    s.end_object();
    Ok(())
}

/// Strip the 6-byte segment headers from an unpacked Type1 program.
fn split_type1(name: &str, data: &[u8], file: &FontFile, length2: u64) -> Result<Vec<u8>> {
    let l1 = usize::try_from(file.length1).unwrap_or(usize::MAX);
    let l2 = usize::try_from(length2).unwrap_or(usize::MAX);
    let first = 6usize.checked_add(l1);
    let second = first.and_then(|end| end.checked_add(6)).and_then(|start| {
        let end = start.checked_add(l2)?;
        Some((start, end))
    });
    match (first, second) {
        (Some(first_end), Some((start, end))) if end <= data.len() => {
            let mut out = Vec::with_capacity(l1 + l2);
            out.extend_from_slice(&data[6..first_end]);
            out.extend_from_slice(&data[start..end]);
            Ok(out)
        },
        _ => Err(Error::Input(format!(
            "font file {} is shorter than its declared segments ({} bytes)",
            name,
            data.len()
        ))),
    }
}

/// Returns (resource index, object number) per font.
fn put_fonts(doc: &Document, s: &mut ObjectSerializer) -> Result<Vec<(usize, u32)>> {
    let nf = s.last_id();
    for diff in doc.fonts.diffs() {
        s.new_object();
        s.out(format!(
            "<</Type /Encoding /BaseEncoding /WinAnsiEncoding /Differences [{}]>>",
            diff
        ));
        s.end_object();
    }

    let mut file_ids: HashMap<&str, u32> = HashMap::new();
    for (name, file) in doc.fonts.files() {
        let id = s.new_object();
        file_ids.insert(name, id);
        let path = doc.font_dir.join(name);
        let mut data = std::fs::read(&path)
            .map_err(|e| Error::Input(format!("cannot read font file {}: {}", path.display(), e)))?;
        let compressed = name.ends_with(".z");
        if let (false, Some(length2)) = (compressed, file.length2) {
            data = split_type1(name, &data, file, length2)?;
        }
        s.out(format!("<</Length {}", data.len()));
        if compressed {
            s.out("/Filter /FlateDecode");
        }
        s.out(format!("/Length1 {}", file.length1));
        if let Some(length2) = file.length2 {
            s.out(format!("/Length2 {} /Length3 0", length2));
        }
        s.out(">>");
        s.put_stream(&data);
        s.end_object();
    }

    let mut ids = Vec::with_capacity(doc.fonts.len());
    for font in doc.fonts.fonts() {
        let id = s.new_object();
        ids.push((font.index, id));
        let name = &font.def.name;
        s.out("<</Type /Font");
        s.out(format!("/BaseFont /{}", name));

        match font.kind {
            FontKind::Core => {
                s.out("/Subtype /Type1");
                if name != "Symbol" && name != "ZapfDingbats" {
                    s.out("/Encoding /WinAnsiEncoding");
                }
                s.out(">>");
                s.end_object();
            },
            FontKind::Type1 | FontKind::TrueType => {
                s.out(format!("/Subtype /{}", font.kind.subtype()));
                s.out("/FirstChar 32 /LastChar 255");
                s.out(format!("/Widths {} 0 R", id + 1));
                s.out(format!("/FontDescriptor {} 0 R", id + 2));
                match font.diff_index {
                    Some(diff) => s.out(format!("/Encoding {} 0 R", nf as usize + diff)),
                    None => s.out("/Encoding /WinAnsiEncoding"),
                }
                s.out(">>");
                s.end_object();

                s.new_object();
                let mut widths = String::from("[");
                for w in font.widths().iter().skip(32) {
                    widths.push_str(&format!("{} ", w));
                }
                widths.push(']');
                s.out(widths);
                s.end_object();

                s.new_object();
                let d = &font.def.desc;
                let mut desc = format!(
                    "<</Type /FontDescriptor /FontName /{} /Ascent {} /Descent {} /CapHeight {} /Flags {} \
                     /FontBBox [{} {} {} {}] /ItalicAngle {} /StemV {} /MissingWidth {}",
                    name,
                    d.ascent,
                    d.descent,
                    d.cap_height,
                    d.flags,
                    d.font_bbox.xmin,
                    d.font_bbox.ymin,
                    d.font_bbox.xmax,
                    d.font_bbox.ymax,
                    d.italic_angle,
                    d.stem_v,
                    d.missing_width
                );
                if let Some(file_id) = file_ids.get(font.def.file.as_str()) {
                    let suffix = if font.kind == FontKind::Type1 { "" } else { "2" };
                    desc.push_str(&format!(" /FontFile{} {} 0 R", suffix, file_id));
                }
                desc.push_str(">>");
                s.out(desc);
                s.end_object();
            },
        }
    }
    Ok(ids)
}

/// Returns (resource index, object number) per image.
fn put_images(doc: &Document, s: &mut ObjectSerializer) -> Result<Vec<(usize, u32)>> {
    let mut ids = Vec::with_capacity(doc.images.len());
    for info in doc.images.iter() {
        let id = put_image(s, info, doc.compress)?;
        ids.push((info.index, id));
    }
    Ok(ids)
}

fn put_image_head(s: &mut ObjectSerializer, width: u32, height: u32) -> u32 {
    let id = s.new_object();
    s.out("<</Type /XObject");
    s.out("/Subtype /Image");
    s.out(format!("/Width {}", width));
    s.out(format!("/Height {}", height));
    id
}

fn put_image(s: &mut ObjectSerializer, info: &ImageInfo, compress: bool) -> Result<u32> {
    let id = put_image_head(s, info.width, info.height);
    match info.color_space {
        ColorSpace::Indexed => s.out(format!(
            "/ColorSpace [/Indexed /DeviceRGB {} {} 0 R]",
            (info.palette.len() / 3).saturating_sub(1),
            id + 1
        )),
        cs => {
            s.out(format!("/ColorSpace /{}", cs.pdf_name()));
            if cs == ColorSpace::DeviceCMYK {
                s.out("/Decode [1 0 1 0 1 0 1 0]");
            }
        },
    }
    s.out(format!("/BitsPerComponent {}", info.bits_per_component));
    if let Some(filter) = info.filter {
        s.out(format!("/Filter /{}", filter));
    }
    if let Some(dp) = &info.decode_parms {
        s.out(format!("/DecodeParms <<{}>>", dp));
    }
    if !info.transparency.is_empty() {
        let mut mask = String::from("/Mask [");
        for v in &info.transparency {
            mask.push_str(&format!("{} {} ", v, v));
        }
        mask.push(']');
        s.out(mask);
    }
    if info.soft_mask.is_some() {
        s.out(format!("/SMask {} 0 R", id + 1));
    }
    s.out(format!("/Length {}>>", info.data.len()));
    s.put_stream(&info.data);
    s.end_object();

    if let Some(alpha) = &info.soft_mask {
        put_image_head(s, info.width, info.height);
        s.out("/ColorSpace /DeviceGray");
        s.out("/BitsPerComponent 8");
        if let Some(filter) = info.filter {
            s.out(format!("/Filter /{}", filter));
        }
        s.out(format!(
            "/DecodeParms <</Predictor 15 /Colors 1 /BitsPerComponent 8 /Columns {}>>",
            info.width
        ));
        s.out(format!("/Length {}>>", alpha.len()));
        s.put_stream(alpha);
        s.end_object();
    }

    if info.color_space == ColorSpace::Indexed {
        s.new_object();
        if compress {
            let palette = compress_data(&info.palette)?;
            s.out(format!("<</Filter /FlateDecode /Length {}>>", palette.len()));
            s.put_stream(&palette);
        } else {
            s.out(format!("<</Length {}>>", info.palette.len()));
            s.put_stream(&info.palette);
        }
        s.end_object();
    }
    Ok(id)
}

fn put_resource_dict(s: &mut ObjectSerializer, fonts: &[(usize, u32)], images: &[(usize, u32)]) {
    s.begin_reserved(RESOURCES_ID);
    s.out("<<");
    s.out("/ProcSet [/PDF /Text /ImageB /ImageC /ImageI]");
    s.out("/Font <<");
    for (index, id) in fonts {
        s.out(format!("/F{} {} 0 R", index, id));
    }
    s.out(">>");
    s.out("/XObject <<");
    for (index, id) in images {
        s.out(format!("/I{} {} 0 R", index, id));
    }
    s.out(">>");
    s.out(">>");
    s.end_object();
}

fn info_entry(s: &mut ObjectSerializer, key: &str, value: &[u8]) {
    let mut line = format!("/{} ", key).into_bytes();
    line.extend_from_slice(&text_string(value));
    s.out(line);
}

fn put_info(doc: &Document, s: &mut ObjectSerializer, created: &DateTime<Local>) {
    let meta = &doc.metadata;
    s.new_object();
    s.out("<<");
    info_entry(s, "Producer", format!("{} {}", crate::NAME, crate::VERSION).as_bytes());
    let entries = [
        ("Title", &meta.title),
        ("Subject", &meta.subject),
        ("Author", &meta.author),
        ("Keywords", &meta.keywords),
        ("Creator", &meta.creator),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            info_entry(s, key, value);
        }
    }
    info_entry(s, "CreationDate", created.format("D:%Y%m%d%H%M%S").to_string().as_bytes());
    s.out(">>");
    s.end_object();
}

fn put_catalog(doc: &Document, s: &mut ObjectSerializer) {
    s.new_object();
    s.out("<<");
    s.out("/Type /Catalog");
    s.out(format!("/Pages {} 0 R", PAGES_ROOT_ID));
    match doc.zoom_mode {
        ZoomMode::FullPage => s.out("/OpenAction [3 0 R /Fit]"),
        ZoomMode::FullWidth => s.out("/OpenAction [3 0 R /FitH null]"),
        ZoomMode::Real => s.out("/OpenAction [3 0 R /XYZ null null 1]"),
        ZoomMode::Default => {},
    }
    match doc.layout_mode {
        LayoutMode::Single => s.out("/PageLayout /SinglePage"),
        LayoutMode::Continuous => s.out("/PageLayout /OneColumn"),
        LayoutMode::Two => s.out("/PageLayout /TwoColumnLeft"),
        LayoutMode::Default => {},
    }
    s.out(">>");
    s.end_object();
}
