use crate::dtype::DataType;
use crate::error::{IcsError, IcsResult};

/// Maximum number of dimensions a dataset may declare.
pub const MAX_DIM: usize = 10;

/// Maximum bytes per image element; byte-order vectors are fixed arrays
/// of this length.
pub const MAX_IMEL_SIZE: usize = 32;

/// Default unit string for dimensions that never got one.
pub const UNITS_UNDEFINED: &str = "undefined";

/// Default unit string for the image element itself.
pub const UNITS_RELATIVE: &str = "relative";

/// Canonical order names for the first five dimensions; later dimensions
/// fall back to `dim_i`.
const ORDER_NAMES: [&str; 5] = ["x", "y", "z", "t", "probe"];

pub fn default_order_name(index: usize) -> String {
    match ORDER_NAMES.get(index) {
        Some(name) => (*name).to_string(),
        None => format!("dim_{index}"),
    }
}

// ── Dimension and imel descriptors ─────────────────────────────────────────

/// One axis of the N-D sample array.
#[derive(Debug, Clone)]
pub struct Dimension {
    /// Extent along this axis, in image elements. Always positive.
    pub size: usize,
    /// Short order name ("x", "y", ..., "dim_7").
    pub order: String,
    /// Display label; defaults to the order name.
    pub label: String,
    pub origin: f64,
    pub scale: f64,
    pub unit: String,
}

impl Dimension {
    /// A dimension with the canonical defaults for position `index`.
    pub fn new(index: usize, size: usize) -> Dimension {
        let order = default_order_name(index);
        Dimension {
            size,
            label: order.clone(),
            order,
            origin: 0.0,
            scale: 1.0,
            unit: UNITS_UNDEFINED.to_string(),
        }
    }
}

/// The image element descriptor: what one pixel/voxel is.
#[derive(Debug, Clone)]
pub struct Imel {
    pub dtype: DataType,
    /// Significant bits, at most 8× the element width.
    pub sig_bits: usize,
    pub origin: f64,
    pub scale: f64,
    pub unit: String,
}

impl Imel {
    pub fn new(dtype: DataType) -> Imel {
        Imel {
            dtype,
            sig_bits: dtype.size().unwrap_or(0) * 8,
            origin: 0.0,
            scale: 1.0,
            unit: UNITS_RELATIVE.to_string(),
        }
    }
}

impl Default for Imel {
    fn default() -> Imel {
        Imel::new(DataType::Unknown)
    }
}

// ── Dataset tags ───────────────────────────────────────────────────────────

/// How the body bytes are stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Uncompressed,
    Gzip,
    /// Historical `compress(1)` framing. Read-only; writes are upgraded
    /// to gzip.
    Compress,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Gzip => "gzip",
            Compression::Compress => "compress",
        }
    }

    pub fn from_name(name: &str) -> IcsResult<Compression> {
        match name {
            "uncompressed" => Ok(Compression::Uncompressed),
            "gzip" => Ok(Compression::Gzip),
            "compress" => Ok(Compression::Compress),
            _ => Err(IcsError::UnknownCompression),
        }
    }
}

/// What the handle was opened for. Selected once at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    /// Reading and writing on an existing file: the close path rewrites
    /// the header in place, preserving the body.
    Update,
}

/// ICS format version: v1 keeps the body in a sibling `.ids` file, v2
/// embeds it in the `.ics` file after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    V1,
    V2,
}

impl Version {
    pub fn as_header_str(self) -> &'static str {
        match self {
            Version::V1 => "1.0",
            Version::V2 => "2.0",
        }
    }
}

// ── SCIL_TYPE ──────────────────────────────────────────────────────────────

/// Derive the legacy SCIL type tag from the sample kind and the
/// dimensionality. Only the historical combinations exist; everything
/// else is `NoScilType`.
pub fn guess_scil_type(dtype: DataType, ndims: usize) -> IcsResult<String> {
    let prefix = match dtype {
        DataType::Uint8 | DataType::Sint8 | DataType::Uint16 | DataType::Sint16 => "g",
        DataType::Real32 => "f",
        DataType::Complex32 => "c",
        _ => return Err(IcsError::NoScilType),
    };
    let suffix = match ndims {
        0 => return Err(IcsError::NoScilType),
        1 | 2 => "2d",
        3 => "3d",
        _ => return Err(IcsError::NoScilType),
    };
    Ok(format!("{prefix}{suffix}"))
}
