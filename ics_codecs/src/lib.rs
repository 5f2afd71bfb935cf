mod gzip;
mod lzw;
mod plain;

pub use gzip::{GzipReader, GzipWriter};
pub use lzw::LzwReader;
pub use plain::{PlainReader, PlainWriter};

use std::fs::File;

use ics_core::codec::{BodyRead, BodyWrite};
use ics_core::{Compression, IcsError, IcsResult};

/// Open a decode stream on `file`, which must be positioned at the first
/// body byte (offset 0 for a sidecar `.ids`, the recorded data offset
/// for an embedded version-2 body).
pub fn open_reader(file: File, method: Compression) -> IcsResult<Box<dyn BodyRead>> {
    Ok(match method {
        Compression::Uncompressed => Box::new(PlainReader::new(file)?),
        Compression::Gzip => Box::new(GzipReader::new(file)?),
        Compression::Compress => Box::new(LzwReader::new(file)),
    })
}

/// Open an encode stream. `compress` cannot be written; callers upgrade
/// it to gzip before getting here.
pub fn open_writer(file: File, method: Compression, level: u32) -> IcsResult<Box<dyn BodyWrite>> {
    Ok(match method {
        Compression::Uncompressed => Box::new(PlainWriter::new(file)),
        Compression::Gzip => Box::new(GzipWriter::new(file, level)?),
        Compression::Compress => return Err(IcsError::NotValidAction),
    })
}
