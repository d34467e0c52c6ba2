//! PDF object serialization.
//!
//! Writes numbered indirect objects into one growing byte buffer, records
//! the byte offset of each object header and closes the file with the
//! cross-reference table and trailer.
//!
//! Object numbers are handed out strictly in emission order. Objects 1 (the
//! page tree root) and 2 (the shared resource dictionary) are reserved up
//! front so pages can point at them before they are written.

use std::io::Write;

/// Object number of the page tree root.
pub const PAGES_ROOT_ID: u32 = 1;

/// Object number of the shared resource dictionary.
pub const RESOURCES_ID: u32 = 2;

/// Sequential object writer with offset bookkeeping.
#[derive(Debug)]
pub struct ObjectSerializer {
    /// Output bytes
    buf: Vec<u8>,
    /// Byte offset per object number; index 0 is the free-list head
    offsets: Vec<usize>,
    /// Highest object number handed out
    n: u32,
}

impl Default for ObjectSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSerializer {
    /// Create a serializer with objects 1 and 2 reserved.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            offsets: vec![0; RESOURCES_ID as usize + 1],
            n: RESOURCES_ID,
        }
    }

    /// Current length of the output.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Highest object number handed out so far.
    pub fn last_id(&self) -> u32 {
        self.n
    }

    /// Number the next object will receive.
    pub fn next_id(&self) -> u32 {
        self.n + 1
    }

    /// Start a new indirect object and return its number.
    pub fn new_object(&mut self) -> u32 {
        self.n += 1;
        let id = self.n;
        self.begin_reserved(id);
        id
    }

    /// Start a previously reserved object (1 or 2) at the current offset.
    pub fn begin_reserved(&mut self, id: u32) {
        let idx = id as usize;
        if self.offsets.len() <= idx {
            self.offsets.resize(idx + 1, 0);
        }
        self.offsets[idx] = self.buf.len();
        self.out(format!("{} 0 obj", id));
    }

    /// Close the current object.
    pub fn end_object(&mut self) {
        self.out("endobj");
    }

    /// Append one line.
    pub fn out(&mut self, line: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(line.as_ref());
        self.buf.push(b'\n');
    }

    /// Append a stream body between `stream` and `endstream`.
    pub fn put_stream(&mut self, data: &[u8]) {
        self.out("stream");
        self.out(data);
        self.out("endstream");
    }

    /// Offset recorded for an object, if it was written.
    pub fn offset_of(&self, id: u32) -> Option<usize> {
        match self.offsets.get(id as usize) {
            Some(&offset) if id != 0 && id <= self.n => Some(offset),
            _ => None,
        }
    }

    /// Emit the cross-reference table and trailer and return the file bytes.
    ///
    /// The catalog is the last object written and the info dictionary the one
    /// before it.
    pub fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let count = self.n + 1;
        self.out("xref");
        self.out(format!("0 {}", count));
        self.out("0000000000 65535 f ");
        for id in 1..=self.n as usize {
            let offset = self.offsets.get(id).copied().unwrap_or(0);
            self.out(format!("{:010} 00000 n ", offset));
        }
        self.out("trailer");
        self.out("<<");
        self.out(format!("/Size {}", count));
        self.out(format!("/Root {} 0 R", self.n));
        self.out(format!("/Info {} 0 R", self.n - 1));
        self.out(">>");
        self.out("startxref");
        self.out(format!("{}", xref_offset));
        self.out("%%EOF");
        self.buf
    }
}

/// Escape the delimiters of a literal string.
pub fn escape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 8);
    for &b in text {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

/// Format bytes as a parenthesized literal string.
pub fn text_string(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    out.extend_from_slice(&escape(text));
    out.push(b')');
    out
}

/// Encode text as UTF-16BE with a byte-order mark.
pub fn utf16_text(text: &str) -> Vec<u8> {
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Compress data using Flate/Deflate compression.
pub fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
