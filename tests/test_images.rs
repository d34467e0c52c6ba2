//! Integration tests for image embedding.
//!
//! Tests registration, de-duplication, sizing and the PNG alpha split from
//! raw image bytes to the serialized XObjects.

use std::io::{Read, Write};

use pdf_quill::writer::{parse_png, split_alpha, ColorSpace};
use pdf_quill::{Document, DocumentConfig, Error, ImagePlacement, ImageType, LinkTarget, Unit};

// Minimal valid JPEG data (1x1 gray pixel)
const MINIMAL_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x08, 0x06, 0x06, 0x07, 0x06, 0x05, 0x08,
    0x07, 0x07, 0x07, 0x09, 0x09, 0x08, 0x0A, 0x0C, 0x14, 0x0D, 0x0C, 0x0B, 0x0B, 0x0C, 0x19, 0x12,
    0x13, 0x0F, 0x14, 0x1D, 0x1A, 0x1F, 0x1E, 0x1D, 0x1A, 0x1C, 0x1C, 0x20, 0x24, 0x2E, 0x27, 0x20,
    0x22, 0x2C, 0x23, 0x1C, 0x1C, 0x28, 0x37, 0x29, 0x2C, 0x30, 0x31, 0x34, 0x34, 0x34, 0x1F, 0x27,
    0x39, 0x3D, 0x38, 0x32, 0x3C, 0x2E, 0x33, 0x34, 0x32, 0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01,
    0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xC4, 0x00, 0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04,
    0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F,
    0x00, 0xFB, 0xD5, 0xDB, 0x20, 0xA8, 0xF1, 0x47, 0xFF, 0xD9,
];

/// Create a PNG image in memory from unfiltered rows.
fn create_test_png(width: u32, height: u32, color_type: u8, pixel: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();

    // PNG signature
    data.extend_from_slice(b"\x89PNG\r\n\x1a\n");

    let mut raw_pixels = Vec::new();
    for _ in 0..height {
        raw_pixels.push(0); // Filter byte (None)
        for _ in 0..width {
            raw_pixels.extend_from_slice(pixel);
        }
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&raw_pixels).unwrap();
    let compressed = encoder.finish().unwrap();

    fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], chunk_data: &[u8]) {
        out.extend_from_slice(&(chunk_data.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk_type);
        out.extend_from_slice(chunk_data);
        let mut crc_data = Vec::new();
        crc_data.extend_from_slice(chunk_type);
        crc_data.extend_from_slice(chunk_data);
        out.extend_from_slice(&crc32fast::hash(&crc_data).to_be_bytes());
    }

    let mut ihdr_data = Vec::new();
    ihdr_data.extend_from_slice(&width.to_be_bytes());
    ihdr_data.extend_from_slice(&height.to_be_bytes());
    ihdr_data.extend_from_slice(&[8, color_type, 0, 0, 0]);
    write_chunk(&mut data, b"IHDR", &ihdr_data);
    write_chunk(&mut data, b"IDAT", &compressed);
    write_chunk(&mut data, b"IEND", &[]);
    data
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

fn plain_doc() -> Document {
    Document::new(DocumentConfig::new().with_unit(Unit::Point).with_compress(false))
}

#[test]
fn test_same_source_embedded_once() {
    let mut doc = plain_doc();
    doc.register_image_bytes("logo", ImageType::Jpeg, MINIMAL_JPEG).unwrap();
    doc.add_page().unwrap();
    doc.image("logo", ImagePlacement::at(10.0, 10.0, 20.0, 20.0), None, None)
        .unwrap();
    doc.add_page().unwrap();
    doc.image("logo", ImagePlacement::at(30.0, 30.0, 40.0, 40.0), None, None)
        .unwrap();
    let out = text(&doc.output_bytes().unwrap());

    assert_eq!(out.matches("/Subtype /Image").count(), 1);
    assert_eq!(out.matches("/I1 Do").count(), 2);
    assert!(out.contains("/ColorSpace /DeviceGray\n/BitsPerComponent 8\n/Filter /DCTDecode"));
    assert!(out.contains("q 20.00 0 0 20.00 10.00 811.89 cm /I1 Do Q"));
}

#[test]
fn test_image_file_type_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.JPEG");
    std::fs::write(&path, MINIMAL_JPEG).unwrap();
    let source = path.to_string_lossy().to_string();

    let mut doc = plain_doc();
    doc.image(&source, ImagePlacement::at(0.0, 0.0, 10.0, 10.0), None, None)
        .unwrap();
    doc.image(&source, ImagePlacement::at(20.0, 0.0, 10.0, 10.0), None, None)
        .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert_eq!(out.matches("/Subtype /Image").count(), 1);
}

#[test]
fn test_unknown_extension_is_config_error() {
    let mut doc = plain_doc();
    let result = doc.image("picture.bmp", ImagePlacement::flow(10.0, 10.0), None, None);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_file_is_input_error() {
    let mut doc = plain_doc();
    let result = doc.image("/no/such/dir/picture.png", ImagePlacement::flow(10.0, 10.0), None, None);
    assert!(matches!(result, Err(Error::Input(_))));
}

#[test]
fn test_default_size_is_96_dpi() {
    let png = create_test_png(96, 48, 2, &[255, 0, 0]);
    let mut doc = plain_doc();
    doc.register_image_bytes("red", ImageType::Png, &png).unwrap();
    doc.add_page().unwrap();
    doc.image("red", ImagePlacement::at(0.0, 0.0, 0.0, 0.0), None, None)
        .unwrap();
    // 96 px at 96 dpi is one inch
    doc.image("red", ImagePlacement::at(0.0, 100.0, 0.0, 18.0), None, None)
        .unwrap();
    doc.image("red", ImagePlacement::at(0.0, 200.0, -192.0, 0.0), None, None)
        .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.contains("q 72.00 0 0 36.00 0.00 805.89 cm /I1 Do Q"));
    assert!(out.contains("q 36.00 0 0 18.00 0.00 723.89 cm /I1 Do Q"));
    assert!(out.contains("q 36.00 0 0 18.00 0.00 623.89 cm /I1 Do Q"));
}

#[test]
fn test_flow_placement_moves_cursor_and_breaks_page() {
    let png = create_test_png(4, 4, 0, &[128]);
    let mut doc = plain_doc();
    doc.register_image_bytes("gray", ImageType::Png, &png).unwrap();
    doc.add_page().unwrap();
    let y = doc.get_y();
    doc.image("gray", ImagePlacement::flow(100.0, 100.0), None, None).unwrap();
    assert_eq!(doc.get_y(), y + 100.0);

    doc.set_y(700.0);
    doc.image("gray", ImagePlacement::flow(100.0, 100.0).with_x(50.0), None, None)
        .unwrap();
    assert_eq!(doc.page_no(), 2);
    assert_eq!(doc.get_y(), doc.margins().1 + 100.0);
}

#[test]
fn test_image_link() {
    let png = create_test_png(2, 2, 2, &[1, 2, 3]);
    let mut doc = plain_doc();
    doc.register_image_bytes("tiny", ImageType::Png, &png).unwrap();
    doc.image(
        "tiny",
        ImagePlacement::at(10.0, 10.0, 50.0, 50.0),
        None,
        Some(LinkTarget::External("https://example.org".to_string())),
    )
    .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.contains("/Rect [10.00 831.89 60.00 781.89]"));
    assert!(out.contains("/URI (https://example.org)"));
}

#[test]
fn test_png_alpha_split_round_trip() {
    let (width, height) = (3usize, 2usize);
    let mut raw = Vec::new();
    for row in 0..height {
        raw.push(row as u8); // keep distinct filter bytes per row
        for col in 0..width {
            let v = (row * width + col) as u8;
            raw.extend_from_slice(&[v, v + 10, v + 20, 255 - v]);
        }
    }

    let (color, alpha) = split_alpha(&raw, width, height, 3).unwrap();
    let mut rebuilt = Vec::new();
    for (c_row, a_row) in color.chunks(1 + width * 3).zip(alpha.chunks(1 + width)) {
        assert_eq!(c_row[0], a_row[0]);
        rebuilt.push(c_row[0]);
        for (rgb, a) in c_row[1..].chunks(3).zip(&a_row[1..]) {
            rebuilt.extend_from_slice(rgb);
            rebuilt.push(*a);
        }
    }
    assert_eq!(rebuilt, raw);
}

#[test]
fn test_rgba_png_gets_soft_mask() {
    let png = create_test_png(2, 2, 6, &[10, 20, 30, 40]);
    let info = parse_png(&png).unwrap();
    assert_eq!(info.color_space, ColorSpace::DeviceRGB);
    assert_eq!(inflate(&info.data), vec![0, 10, 20, 30, 10, 20, 30, 0, 10, 20, 30, 10, 20, 30]);
    assert_eq!(inflate(info.soft_mask.as_ref().unwrap()), vec![0, 40, 40, 0, 40, 40]);

    let mut doc = plain_doc();
    doc.register_image_bytes("alpha", ImageType::Png, &png).unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.starts_with("%PDF-1.4\n"));
    assert!(out.contains("/SMask "));
    assert!(out.contains("/Group <</Type /Group /S /Transparency /CS /DeviceRGB>>"));
}

#[test]
fn test_gray_alpha_png() {
    let png = create_test_png(1, 1, 4, &[77, 200]);
    let info = parse_png(&png).unwrap();
    assert_eq!(info.color_space, ColorSpace::DeviceGray);
    assert_eq!(inflate(&info.data), vec![0, 77]);
    assert_eq!(inflate(info.soft_mask.as_ref().unwrap()), vec![0, 200]);
}

#[test]
fn test_corrupt_png_latches_format_error() {
    let mut png = create_test_png(2, 2, 2, &[1, 2, 3]);
    png.truncate(30);
    let mut doc = plain_doc();
    let result = doc.register_image_bytes("broken", ImageType::Png, &png);
    assert!(matches!(result, Err(Error::Format(_))));
    assert!(doc.output_bytes().is_err());
}

#[test]
fn test_gif_transparency_uses_color_key_mask() {
    let pixels: Vec<u8> = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 0, 0], [255, 0, 0, 255]]
        .iter()
        .flatten()
        .copied()
        .collect();
    let mut gif = Vec::new();
    {
        let mut encoder = image::codecs::gif::GifEncoder::new(&mut gif);
        encoder.encode(&pixels, 2, 2, image::ColorType::Rgba8).unwrap();
    }

    let mut doc = plain_doc();
    doc.register_image_bytes("sprite", ImageType::Gif, &gif).unwrap();
    doc.add_page().unwrap();
    doc.image("sprite", ImagePlacement::at(0.0, 0.0, 20.0, 20.0), None, None)
        .unwrap();
    let out = text(&doc.output_bytes().unwrap());
    assert!(out.starts_with("%PDF-1.3\n"));
    assert!(out.contains("/ColorSpace [/Indexed /DeviceRGB 2 "));
    assert!(out.contains("/Mask [2 2 ]"));
    assert!(!out.contains("/SMask"));
}
