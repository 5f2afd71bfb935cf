//! The `.ics` text header, reduced to the fields the binary pipeline
//! consumes: layout, representation, per-dimension parameters, and the
//! source-file pointer. Lines are `category field values…`, separated by
//! the field character declared on the first line of the file (a tab in
//! everything this engine writes). Categories this engine does not know
//! — sensor blocks, history — are skipped, not rejected.
//!
//! The header ends at the `end` line. In a version-2 file the binary
//! body starts at the very next byte, so parsing tracks exactly how many
//! bytes it consumed.

use std::fmt::Write as _;
use std::io::Read;
use std::path::PathBuf;

use ics_core::byteorder::ByteOrder;
use ics_core::dtype::DataType;
use ics_core::error::{IcsError, IcsResult};
use ics_core::format::{Compression, Dimension, Imel, Version, MAX_DIM};

/// Everything the engine keeps in memory about a dataset, minus the open
/// file state. This is both what the parser produces and what the
/// emitter consumes.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    /// Base name recorded in the header, without path or extension.
    pub filename: String,
    pub imel: Imel,
    pub dims: Vec<Dimension>,
    /// Coordinate-system name; "video" unless the file says otherwise.
    pub coord: String,
    pub scil_type: Option<String>,
    pub byte_order: ByteOrder,
    pub compression: Compression,
    /// External body file and offset (version 2 only).
    pub src_file: Option<PathBuf>,
    pub src_offset: u64,
}

impl Default for Header {
    fn default() -> Header {
        Header {
            version: Version::V1,
            filename: String::new(),
            imel: Imel::default(),
            dims: Vec::new(),
            coord: "video".to_string(),
            scil_type: None,
            byte_order: ByteOrder::unspecified(),
            compression: Compression::Uncompressed,
            src_file: None,
            src_offset: 0,
        }
    }
}

impl Header {
    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.size).collect()
    }

    /// Bytes per image element; zero while the type is unknown.
    pub fn imel_size(&self) -> usize {
        self.imel.dtype.size().unwrap_or(0)
    }

    /// Image elements in the whole array.
    pub fn image_size(&self) -> usize {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims.iter().map(|d| d.size).product()
    }

    /// Bytes in the whole body.
    pub fn data_size(&self) -> usize {
        self.image_size() * self.imel_size()
    }

    /// Width the byte-order engine works at for this sample kind.
    pub fn reorder_width(&self) -> usize {
        self.imel.dtype.reorder_size().unwrap_or(0)
    }

    // ── Emit ───────────────────────────────────────────────────────────────

    /// Render the complete header text, `end` line included. For a
    /// version-2 dataset the body belongs at the byte right after the
    /// returned string.
    pub fn to_text(&self) -> String {
        const SEP: char = '\t';
        let mut t = String::new();
        t.push(SEP);
        t.push('\n');
        let _ = writeln!(t, "ics_version{SEP}{}", self.version.as_header_str());
        let _ = writeln!(t, "filename{SEP}{}", self.filename);

        // The imel is parameter 0, carried as the pseudo-dimension "bits".
        let _ = writeln!(t, "layout{SEP}parameters{SEP}{}", self.ndims() + 1);
        let mut order = format!("layout{SEP}order{SEP}bits");
        let mut sizes = format!("layout{SEP}sizes{SEP}{}", self.imel_size() * 8);
        for d in &self.dims {
            let _ = write!(order, "{SEP}{}", d.order);
            let _ = write!(sizes, "{SEP}{}", d.size);
        }
        t.push_str(&order);
        t.push('\n');
        t.push_str(&sizes);
        t.push('\n');
        let _ = writeln!(t, "layout{SEP}coordinates{SEP}{}", self.coord);
        let _ = writeln!(t, "layout{SEP}significant_bits{SEP}{}", self.imel.sig_bits);

        let mut bo = format!("representation{SEP}byte_order");
        for &e in self.byte_order.entries(self.reorder_width()) {
            let _ = write!(bo, "{SEP}{e}");
        }
        t.push_str(&bo);
        t.push('\n');
        let _ = writeln!(t, "representation{SEP}format{SEP}{}", self.imel.dtype.family());
        let _ = writeln!(
            t,
            "representation{SEP}sign{SEP}{}",
            if self.imel.dtype.is_signed() { "signed" } else { "unsigned" }
        );
        let _ = writeln!(
            t,
            "representation{SEP}compression{SEP}{}",
            self.compression.name()
        );
        if let Some(scil) = &self.scil_type {
            let _ = writeln!(t, "representation{SEP}SCIL_TYPE{SEP}{scil}");
        }

        let mut origin = format!("parameter{SEP}origin{SEP}{}", self.imel.origin);
        let mut scale = format!("parameter{SEP}scale{SEP}{}", self.imel.scale);
        let mut units = format!("parameter{SEP}units{SEP}{}", self.imel.unit);
        let mut labels = format!("parameter{SEP}labels{SEP}intensity");
        for d in &self.dims {
            let _ = write!(origin, "{SEP}{}", d.origin);
            let _ = write!(scale, "{SEP}{}", d.scale);
            let _ = write!(units, "{SEP}{}", d.unit);
            let _ = write!(labels, "{SEP}{}", d.label);
        }
        for line in [origin, scale, units, labels] {
            t.push_str(&line);
            t.push('\n');
        }

        if let Some(src) = &self.src_file {
            let _ = writeln!(t, "source{SEP}file{SEP}{}", src.display());
            let _ = writeln!(t, "source{SEP}offset{SEP}{}", self.src_offset);
        }

        t.push_str("end\n");
        t
    }

    // ── Parse ──────────────────────────────────────────────────────────────

    /// Parse a header from `reader`. Returns the header and the number of
    /// bytes consumed up to and including the `end` line — the embedded
    /// body offset of a version-2 file.
    pub fn parse(reader: &mut dyn Read) -> IcsResult<(Header, u64)> {
        let mut lines = LineReader::new(reader);

        // First line declares the separators: one field character plus
        // the line terminator. Headers that skip the declaration get the
        // tab default and the first line re-examined as content.
        let mut sep = '\t';
        let first = match lines.next_line(sep)? {
            Some(line) => line,
            None => return Err(IcsError::FReadIcs),
        };
        let mut pending = None;
        match first.first().map(String::as_str) {
            Some(" ") => sep = ' ',
            Some("") | None => {}
            _ => pending = Some(first),
        }

        let mut raw = RawFields::default();
        loop {
            let tokens = match pending.take() {
                Some(t) => t,
                None => match lines.next_line(sep)? {
                    Some(t) => t,
                    None => break,
                },
            };
            if raw.take_line(&tokens)? {
                break; // "end"
            }
        }
        Ok((raw.assemble()?, lines.consumed))
    }
}

/// Byte-counting line reader. Reads one byte at a time so that nothing
/// past the `end` line is ever consumed from the underlying stream.
struct LineReader<'a> {
    inner: &'a mut dyn Read,
    consumed: u64,
}

impl<'a> LineReader<'a> {
    fn new(inner: &'a mut dyn Read) -> LineReader<'a> {
        LineReader { inner, consumed: 0 }
    }

    /// The next line, already split on `sep`, with the terminator (and a
    /// stray `\r`) dropped. `None` at end of input.
    fn next_line(&mut self, sep: char) -> IcsResult<Option<Vec<String>>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.inner.read(&mut byte).map_err(|_| IcsError::FReadIcs)?;
            if n == 0 {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            self.consumed += 1;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let text = String::from_utf8(line).map_err(|_| IcsError::FReadIcs)?;
        Ok(Some(text.split(sep).map(str::to_string).collect()))
    }
}

/// Accumulates the raw field values in whatever order the file lists
/// them; `assemble` folds them into a `Header` with defaults for
/// everything absent.
#[derive(Default)]
struct RawFields {
    version: Option<Version>,
    filename: Option<String>,
    parameters: Option<usize>,
    order: Vec<String>,
    sizes: Vec<usize>,
    bits_size: Option<usize>,
    sig_bits: Option<usize>,
    coord: Option<String>,
    family: Option<String>,
    signed: Option<bool>,
    compression: Option<Compression>,
    scil_type: Option<String>,
    byte_order: Vec<u8>,
    origins: Vec<f64>,
    scales: Vec<f64>,
    units: Vec<String>,
    labels: Vec<String>,
    src_file: Option<PathBuf>,
    src_offset: Option<u64>,
}

fn parse_num<T: std::str::FromStr>(s: &str) -> IcsResult<T> {
    s.trim().parse().map_err(|_| IcsError::FReadIcs)
}

impl RawFields {
    /// Digest one tokenized line. Returns true on `end`.
    fn take_line(&mut self, tokens: &[String]) -> IcsResult<bool> {
        let cat = match tokens.first() {
            Some(c) if !c.is_empty() => c.as_str(),
            _ => return Ok(false),
        };
        if cat == "end" {
            return Ok(true);
        }
        let field = tokens.get(1).map(String::as_str).unwrap_or("");
        let values = &tokens[tokens.len().min(2)..];
        match (cat, field) {
            ("ics_version", v) => {
                self.version = Some(match v {
                    "1.0" => Version::V1,
                    "2.0" => Version::V2,
                    _ => return Err(IcsError::FReadIcs),
                });
            }
            ("filename", name) => self.filename = Some(name.to_string()),
            ("layout", "parameters") => {
                self.parameters = Some(parse_num(values.first().ok_or(IcsError::FReadIcs)?)?)
            }
            ("layout", "order") => {
                let mut values = values;
                if values.first().map(String::as_str) == Some("bits") {
                    values = &values[1..];
                }
                self.order = values.to_vec();
            }
            ("layout", "sizes") => {
                let mut all = Vec::with_capacity(values.len());
                for v in values {
                    all.push(parse_num::<usize>(v)?);
                }
                if let Some((&bits, rest)) = all.split_first() {
                    self.bits_size = Some(bits);
                    self.sizes = rest.to_vec();
                }
            }
            ("layout", "coordinates") => {
                self.coord = values.first().map(|s| s.to_string());
            }
            ("layout", "significant_bits") => {
                self.sig_bits = Some(parse_num(values.first().ok_or(IcsError::FReadIcs)?)?)
            }
            ("representation", "byte_order") => {
                let mut entries = Vec::with_capacity(values.len());
                for v in values {
                    entries.push(parse_num::<u8>(v)?);
                }
                self.byte_order = entries;
            }
            ("representation", "format") => {
                self.family = values.first().map(|s| s.to_string());
            }
            ("representation", "sign") => {
                self.signed = values.first().map(|s| s == "signed");
            }
            ("representation", "compression") => {
                self.compression =
                    Some(Compression::from_name(values.first().ok_or(IcsError::FReadIcs)?)?);
            }
            ("representation", "SCIL_TYPE") => {
                self.scil_type = values.first().map(|s| s.to_string());
            }
            ("parameter", "origin") => self.origins = parse_all(values)?,
            ("parameter", "scale") => self.scales = parse_all(values)?,
            ("parameter", "units") => self.units = values.to_vec(),
            ("parameter", "labels") => self.labels = values.to_vec(),
            ("source", "file") => {
                self.src_file = values.first().map(PathBuf::from);
            }
            ("source", "offset") => {
                self.src_offset = Some(parse_num(values.first().ok_or(IcsError::FReadIcs)?)?)
            }
            // Sensor, history, and anything else outside this engine's
            // slice of the format.
            _ => {}
        }
        Ok(false)
    }

    fn assemble(self) -> IcsResult<Header> {
        if self.sizes.is_empty() {
            return Err(IcsError::NoLayout);
        }
        let ndims = self.sizes.len();
        if ndims > MAX_DIM {
            return Err(IcsError::TooManyDims);
        }
        if let Some(p) = self.parameters {
            if p != ndims + 1 {
                return Err(IcsError::NoLayout);
            }
        }

        let bits = self.bits_size.ok_or(IcsError::NoLayout)?;
        if bits == 0 || bits % 8 != 0 {
            return Err(IcsError::UnknownDataType);
        }
        let family = self.family.as_deref().unwrap_or("integer");
        let signed = self.signed.unwrap_or(false);
        let dtype = DataType::from_parts(family, signed, bits / 8)?;

        let mut imel = Imel::new(dtype);
        if let Some(sig) = self.sig_bits {
            imel.sig_bits = sig;
        }
        if let Some(o) = self.origins.first() {
            imel.origin = *o;
        }
        if let Some(s) = self.scales.first() {
            imel.scale = *s;
        }
        if let Some(u) = self.units.first() {
            imel.unit = u.clone();
        }

        let mut dims = Vec::with_capacity(ndims);
        for (i, &size) in self.sizes.iter().enumerate() {
            if size == 0 {
                return Err(IcsError::NoLayout);
            }
            let mut dim = Dimension::new(i, size);
            if let Some(order) = self.order.get(i) {
                dim.order = order.clone();
                dim.label = order.clone();
            }
            // Parameter vectors carry the imel at index 0.
            if let Some(&o) = self.origins.get(i + 1) {
                dim.origin = o;
            }
            if let Some(&s) = self.scales.get(i + 1) {
                dim.scale = s;
            }
            if let Some(u) = self.units.get(i + 1) {
                dim.unit = u.clone();
            }
            if let Some(l) = self.labels.get(i + 1) {
                dim.label = l.clone();
            }
            dims.push(dim);
        }

        Ok(Header {
            version: self.version.unwrap_or(Version::V1),
            filename: self.filename.unwrap_or_default(),
            imel,
            dims,
            coord: self.coord.unwrap_or_else(|| "video".to_string()),
            scil_type: self.scil_type,
            byte_order: ByteOrder::from_entries(&self.byte_order),
            compression: self.compression.unwrap_or_default(),
            src_file: self.src_file,
            src_offset: self.src_offset.unwrap_or(0),
        })
    }
}

fn parse_all(values: &[String]) -> IcsResult<Vec<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        out.push(parse_num(v)?);
    }
    Ok(out)
}
