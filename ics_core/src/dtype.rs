use crate::error::{IcsError, IcsResult};

/// The numeric sample kinds an ICS dataset can carry.
///
/// `Unknown` appears only on datasets whose header has not (yet) declared
/// a representation; it has no defined width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Unknown,
    Uint8,
    Sint8,
    Uint16,
    Sint16,
    Uint32,
    Sint32,
    Real32,
    Real64,
    Complex32,
    Complex64,
}

impl DataType {
    /// On-disk bytes per image element. `None` for `Unknown`.
    pub fn size(self) -> Option<usize> {
        match self {
            DataType::Unknown => None,
            DataType::Uint8 | DataType::Sint8 => Some(1),
            DataType::Uint16 | DataType::Sint16 => Some(2),
            DataType::Uint32 | DataType::Sint32 | DataType::Real32 => Some(4),
            DataType::Real64 | DataType::Complex32 => Some(8),
            DataType::Complex64 => Some(16),
        }
    }

    /// Width the byte-order engine works at: complex kinds are two
    /// interleaved components, so their reorder unit is the component.
    pub fn reorder_size(self) -> Option<usize> {
        match self {
            DataType::Complex32 | DataType::Complex64 => self.size().map(|s| s / 2),
            _ => self.size(),
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DataType::Complex32 | DataType::Complex64)
    }

    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            DataType::Uint8 | DataType::Uint16 | DataType::Uint32 | DataType::Unknown
        )
    }

    /// The `representation format` family name used in headers.
    pub fn family(self) -> &'static str {
        match self {
            DataType::Unknown => "unknown",
            DataType::Real32 | DataType::Real64 => "real",
            DataType::Complex32 | DataType::Complex64 => "complex",
            _ => "integer",
        }
    }

    /// Reassemble a data type from the header triple
    /// (format family, signedness, bytes per element).
    pub fn from_parts(family: &str, signed: bool, size: usize) -> IcsResult<DataType> {
        let dt = match (family, signed, size) {
            ("integer", false, 1) => DataType::Uint8,
            ("integer", true, 1) => DataType::Sint8,
            ("integer", false, 2) => DataType::Uint16,
            ("integer", true, 2) => DataType::Sint16,
            ("integer", false, 4) => DataType::Uint32,
            ("integer", true, 4) => DataType::Sint32,
            ("real", _, 4) => DataType::Real32,
            ("real", _, 8) => DataType::Real64,
            ("complex", _, 8) => DataType::Complex32,
            ("complex", _, 16) => DataType::Complex64,
            _ => return Err(IcsError::UnknownDataType),
        };
        Ok(dt)
    }
}
