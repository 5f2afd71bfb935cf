//! Image Cytometry Standard datasets.
//!
//! An ICS dataset is a text header describing an N-dimensional array of
//! numeric samples, plus the raw sample bytes — in a sibling `.ids` file
//! (version 1, optionally gzip- or compress(1)-packed) or embedded after
//! the header in the `.ics` file itself (version 2). This crate is the
//! access engine: open a handle with [`Ics::open`], describe or declare
//! the layout, stream the body whole, in blocks, or as a sub-sampled
//! region of interest, and close.
//!
//! ```no_run
//! use ics::{DataType, Ics};
//!
//! # fn main() -> Result<(), ics::IcsError> {
//! let samples: Vec<u8> = vec![0; 4 * 3 * 2];
//! let mut w = Ics::open("myfile", "w2")?;
//! w.set_layout(DataType::Uint16, &[4, 3])?;
//! w.set_data(&samples)?;
//! w.close()?;
//!
//! let mut r = Ics::open("myfile", "r")?;
//! let (_dtype, _sizes) = r.layout()?;
//! let mut back = vec![0u8; r.data_size()];
//! r.get_data(&mut back)?;
//! r.close()?;
//! # Ok(()) }
//! ```

pub mod access;
pub mod dataset;
pub mod header;

pub use dataset::Ics;
pub use header::Header;

pub use ics_core::{
    ByteOrder, Compression, DataType, Dimension, FileMode, IcsError, IcsResult, Imel, Notice,
    Version, MAX_DIM, MAX_IMEL_SIZE,
};
