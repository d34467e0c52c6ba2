//! Image handling for PDF generation.
//!
//! Images become Image XObjects. Each source is parsed once into an
//! [`ImageInfo`] holding the stream bytes ready for embedding plus the
//! dictionary values the writer needs.
//!
//! # Supported Formats
//!
//! - **JPEG**: pass-through embedding with the DCTDecode filter
//! - **PNG**: the IDAT stream is kept compressed and described with a PNG
//!   predictor; images with an alpha channel are inflated and split into a
//!   color stream and a soft mask
//! - **GIF**: the first frame is decoded and re-encoded as PNG
//!
//! # Color Spaces
//!
//! - DeviceGray, DeviceRGB, DeviceCMYK
//! - Indexed over DeviceRGB, with the palette in its own object

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use indexmap::IndexMap;

use crate::error::Error;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Image embedding error.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Unsupported image format or color layout
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Failed to decode image
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    /// Failed to compress image data
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Invalid image data
    #[error("Invalid image data: {0}")]
    InvalidData(String),
}

impl From<ImageError> for Error {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::IoError(_) => Error::Input(err.to_string()),
            _ => Error::Format(err.to_string()),
        }
    }
}

/// Source image type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// JPEG (DCTDecode pass-through)
    Jpeg,
    /// PNG
    Png,
    /// GIF (first frame)
    Gif,
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageType::Jpeg),
            "png" => Ok(ImageType::Png),
            "gif" => Ok(ImageType::Gif),
            _ => Err(Error::Config(format!("Unsupported image type: {}", s))),
        }
    }
}

impl ImageType {
    /// Infer the type from a file extension.
    pub fn from_path(path: &Path) -> crate::error::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.parse(),
            None => Err(Error::Config(format!(
                "Image file has no extension and no type was specified: {}",
                path.display()
            ))),
        }
    }

    /// Parse image bytes of this type.
    pub fn parse(&self, data: &[u8]) -> Result<ImageInfo, ImageError> {
        match self {
            ImageType::Jpeg => parse_jpeg(data),
            ImageType::Png => parse_png(data),
            ImageType::Gif => parse_gif(data),
        }
    }
}

/// Color space for image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Grayscale (1 component per pixel)
    DeviceGray,
    /// RGB color (3 components per pixel)
    DeviceRGB,
    /// CMYK color (4 components per pixel)
    DeviceCMYK,
    /// Palette indexes into DeviceRGB
    Indexed,
}

impl ColorSpace {
    /// Get the number of color components.
    pub fn components(&self) -> u8 {
        match self {
            ColorSpace::DeviceGray | ColorSpace::Indexed => 1,
            ColorSpace::DeviceRGB => 3,
            ColorSpace::DeviceCMYK => 4,
        }
    }

    /// Get the PDF name for this color space.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRGB => "DeviceRGB",
            ColorSpace::DeviceCMYK => "DeviceCMYK",
            ColorSpace::Indexed => "Indexed",
        }
    }
}

/// A parsed image, ready for embedding.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// 1-based resource index (`/I<index>`), set on registration
    pub index: usize,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color space
    pub color_space: ColorSpace,
    /// Bits per component
    pub bits_per_component: u8,
    /// Stream filter name
    pub filter: Option<&'static str>,
    /// Decode parameters, as the body of a dictionary
    pub decode_parms: Option<String>,
    /// RGB palette for indexed images
    pub palette: Vec<u8>,
    /// Color key mask values
    pub transparency: Vec<u8>,
    /// Compressed alpha channel, emitted as a gray soft mask
    pub soft_mask: Option<Vec<u8>>,
    /// Stream bytes
    pub data: Vec<u8>,
}

impl ImageInfo {
    /// Whether embedding needs transparency support in the viewer.
    pub fn has_soft_mask(&self) -> bool {
        self.soft_mask.is_some()
    }
}

/// Big-endian reader over a byte slice that fails on truncation.
struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ImageError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| ImageError::InvalidData("Truncated PNG chunk".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, ImageError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn read_u8(&mut self) -> Result<u8, ImageError> {
        Ok(self.take(1)?[0])
    }
}

/// Parse a PNG stream.
pub fn parse_png(data: &[u8]) -> Result<ImageInfo, ImageError> {
    let mut reader = ChunkReader::new(data);
    if reader.take(8).ok() != Some(&PNG_SIGNATURE[..]) {
        return Err(ImageError::InvalidData("Not a PNG buffer".to_string()));
    }

    reader.take(4)?;
    if reader.take(4)? != b"IHDR" {
        return Err(ImageError::InvalidData("Incorrect PNG buffer".to_string()));
    }
    let width = reader.read_u32()?;
    let height = reader.read_u32()?;
    let bpc = reader.read_u8()?;
    if bpc > 8 {
        return Err(ImageError::UnsupportedFormat(
            "16-bit depth not supported in PNG file".to_string(),
        ));
    }
    let color_type = reader.read_u8()?;
    let color_space = match color_type {
        0 | 4 => ColorSpace::DeviceGray,
        2 | 6 => ColorSpace::DeviceRGB,
        3 => ColorSpace::Indexed,
        _ => {
            return Err(ImageError::UnsupportedFormat(format!(
                "Unknown color type in PNG buffer: {}",
                color_type
            )))
        },
    };
    if reader.read_u8()? != 0 {
        return Err(ImageError::UnsupportedFormat(
            "Unknown compression method in PNG buffer".to_string(),
        ));
    }
    if reader.read_u8()? != 0 {
        return Err(ImageError::UnsupportedFormat("Unknown filter method in PNG buffer".to_string()));
    }
    if reader.read_u8()? != 0 {
        return Err(ImageError::UnsupportedFormat(
            "Interlacing not supported in PNG buffer".to_string(),
        ));
    }
    reader.take(4)?;

    let colors = if color_space == ColorSpace::DeviceRGB { 3 } else { 1 };
    let decode_parms = format!(
        "/Predictor 15 /Colors {} /BitsPerComponent {} /Columns {}",
        colors, bpc, width
    );

    let mut palette = Vec::new();
    let mut transparency = Vec::new();
    let mut idat = Vec::new();
    loop {
        let n = reader.read_u32()? as usize;
        let kind = reader.take(4)?;
        match kind {
            b"PLTE" => {
                palette = reader.take(n)?.to_vec();
                reader.take(4)?;
            },
            b"tRNS" => {
                let t = reader.take(n)?;
                let at = |i: usize| t.get(i).copied().ok_or_else(|| {
                    ImageError::InvalidData("Truncated tRNS chunk".to_string())
                });
                match color_type {
                    0 => transparency = vec![at(1)?],
                    2 => transparency = vec![at(1)?, at(3)?, at(5)?],
                    _ => {
                        // alpha entries past the palette have no color to mask
                        let entries = (palette.len() / 3).min(256);
                        if let Some(pos) = t.iter().take(entries).position(|&b| b == 0) {
                            transparency = vec![pos as u8];
                        }
                    },
                }
                reader.take(4)?;
            },
            b"IDAT" => {
                idat.extend_from_slice(reader.take(n)?);
                reader.take(4)?;
            },
            b"IEND" => break,
            _ => {
                reader.take(n + 4)?;
            },
        }
        if n == 0 {
            break;
        }
    }

    if color_space == ColorSpace::Indexed && palette.is_empty() {
        return Err(ImageError::InvalidData("Missing palette in PNG buffer".to_string()));
    }

    let mut info = ImageInfo {
        index: 0,
        width,
        height,
        color_space,
        bits_per_component: bpc,
        filter: Some("FlateDecode"),
        decode_parms: Some(decode_parms),
        palette,
        transparency,
        soft_mask: None,
        data: idat,
    };

    if color_type >= 4 {
        let raw = inflate(&info.data)?;
        let channels = if color_type == 4 { 1 } else { 3 };
        let (color, alpha) = split_alpha(&raw, width as usize, height as usize, channels)?;
        info.data = deflate(&color)?;
        info.soft_mask = Some(deflate(&alpha)?);
    }

    Ok(info)
}

/// Split interleaved color+alpha rows into two filtered row streams.
///
/// Each row of `raw` is one filter byte followed by `width` pixels of
/// `channels` color bytes and one alpha byte. Both outputs keep the row's
/// filter byte.
pub fn split_alpha(
    raw: &[u8],
    width: usize,
    height: usize,
    channels: usize,
) -> Result<(Vec<u8>, Vec<u8>), ImageError> {
    let overflow = || ImageError::InvalidData(format!("PNG image dimensions overflow: {}x{}", width, height));
    let stride = width
        .checked_mul(channels + 1)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(overflow)?;
    let needed = stride.checked_mul(height).ok_or_else(overflow)?;
    if raw.len() < needed {
        return Err(ImageError::InvalidData(format!(
            "PNG image data too short: {} bytes for {} rows of {}",
            raw.len(),
            height,
            stride
        )));
    }

    // both planes are smaller than the interleaved rows checked above
    let mut color = Vec::with_capacity(needed - height * width);
    let mut alpha = Vec::with_capacity(height * (1 + width));
    for row in raw.chunks_exact(stride).take(height) {
        color.push(row[0]);
        alpha.push(row[0]);
        for pixel in row[1..].chunks_exact(channels + 1) {
            color.extend_from_slice(&pixel[..channels]);
            alpha.push(pixel[channels]);
        }
    }
    Ok((color, alpha))
}

/// Parse a JPEG stream for its frame header. The data is embedded as is.
pub fn parse_jpeg(data: &[u8]) -> Result<ImageInfo, ImageError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(ImageError::InvalidData("Improper JPEG header".to_string()));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return Err(ImageError::InvalidData(format!(
                "Unexpected JPEG segment header at offset {}",
                pos
            )));
        }
        let marker = data[pos + 1];
        pos += 2;

        // Fill bytes and standalone markers carry no length
        if marker == 0xFF || marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            if marker == 0xFF {
                pos -= 1;
            }
            continue;
        }

        // Start-of-frame markers (C4, C8 and CC are DHT, JPG and DAC)
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            if pos + 8 > data.len() {
                return Err(ImageError::InvalidData("Truncated JPEG header".to_string()));
            }
            let bpc = data[pos + 2];
            let height = u32::from(BigEndian::read_u16(&data[pos + 3..pos + 5]));
            let width = u32::from(BigEndian::read_u16(&data[pos + 5..pos + 7]));
            let color_space = match data[pos + 7] {
                1 => ColorSpace::DeviceGray,
                3 => ColorSpace::DeviceRGB,
                4 => ColorSpace::DeviceCMYK,
                n => {
                    return Err(ImageError::UnsupportedFormat(format!(
                        "JPEG buffer has unsupported color space ({})",
                        n
                    )))
                },
            };
            return Ok(ImageInfo {
                index: 0,
                width,
                height,
                color_space,
                bits_per_component: bpc,
                filter: Some("DCTDecode"),
                decode_parms: None,
                palette: Vec::new(),
                transparency: Vec::new(),
                soft_mask: None,
                data: data.to_vec(),
            });
        }

        if marker == 0xD9 || marker == 0xDA || pos + 2 > data.len() {
            break;
        }
        pos += BigEndian::read_u16(&data[pos..pos + 2]) as usize;
    }

    Err(ImageError::InvalidData("JPEG frame header not found".to_string()))
}

/// Decode the first GIF frame.
///
/// Frames with at most 256 opaque colors and fully transparent pixels are
/// rebuilt as an indexed image with a color-key mask. Anything else goes
/// through the PNG path and may get a soft mask.
pub fn parse_gif(data: &[u8]) -> Result<ImageInfo, ImageError> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Gif)
        .map_err(|e| ImageError::DecodeError(e.to_string()))?;
    if let Some(info) = indexed_frame(&img.to_rgba8())? {
        return Ok(info);
    }
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, image::ImageOutputFormat::Png)
        .map_err(|e| ImageError::DecodeError(e.to_string()))?;
    parse_png(png.get_ref())
}

/// Rebuild the palette of a decoded frame, or `None` if it does not fit one.
fn indexed_frame(frame: &image::RgbaImage) -> Result<Option<ImageInfo>, ImageError> {
    let (width, height) = frame.dimensions();
    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut palette = Vec::new();
    let mut transparent = None;
    let mut rows = Vec::with_capacity(height as usize * (1 + width as usize));

    for row in frame.rows() {
        rows.push(0);
        for pixel in row {
            let [r, g, b, a] = pixel.0;
            let index = match (a, transparent) {
                (0, Some(index)) => index,
                (0, None) => {
                    let index = match next_palette_index(&palette) {
                        Some(index) => index,
                        None => return Ok(None),
                    };
                    palette.extend_from_slice(&[0, 0, 0]);
                    transparent = Some(index);
                    index
                },
                (255, _) => match lookup.get(&[r, g, b]) {
                    Some(&index) => index,
                    None => {
                        let index = match next_palette_index(&palette) {
                            Some(index) => index,
                            None => return Ok(None),
                        };
                        palette.extend_from_slice(&[r, g, b]);
                        lookup.insert([r, g, b], index);
                        index
                    },
                },
                _ => return Ok(None),
            };
            rows.push(index);
        }
    }

    Ok(Some(ImageInfo {
        index: 0,
        width,
        height,
        color_space: ColorSpace::Indexed,
        bits_per_component: 8,
        filter: Some("FlateDecode"),
        decode_parms: Some(format!(
            "/Predictor 15 /Colors 1 /BitsPerComponent 8 /Columns {}",
            width
        )),
        palette,
        transparency: transparent.map(|index| vec![index]).unwrap_or_default(),
        soft_mask: None,
        data: deflate(&rows)?,
    }))
}

fn next_palette_index(palette: &[u8]) -> Option<u8> {
    u8::try_from(palette.len() / 3).ok()
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ImageError::DecodeError(e.to_string()))?;
    Ok(out)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ImageError::CompressionError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ImageError::CompressionError(e.to_string()))
}

/// Images keyed by source name, in registration order.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: IndexMap<String, ImageInfo>,
}

impl ImageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered image.
    pub fn get(&self, name: &str) -> Option<&ImageInfo> {
        self.images.get(name)
    }

    /// Check whether a source name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    /// Register a parsed image, assigning the next resource index.
    ///
    /// An already registered name keeps its first image.
    pub fn insert(&mut self, name: &str, mut info: ImageInfo) -> &ImageInfo {
        let next = self.images.len() + 1;
        self.images.entry(name.to_string()).or_insert_with(|| {
            info.index = next;
            log::debug!("registered image {} as /I{} ({}x{})", name, next, info.width, info.height);
            info
        })
    }

    /// Registered images in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageInfo> {
        self.images.values()
    }

    /// Number of registered images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if any images are registered.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
