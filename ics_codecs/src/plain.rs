use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use ics_core::codec::{BodyRead, BodyWrite, Whence};
use ics_core::{IcsError, IcsResult};

/// Cap on a single write call. Some C runtimes shipped `fwrite`
/// implementations that corrupt writes beyond this size, and the chunking
/// costs nothing.
const WRITE_CHUNK: usize = 1 << 30;

/// Uncompressed body: reads are exact, skips map straight to seeks.
pub struct PlainReader {
    file: File,
    /// File offset where the body starts; `Whence::Set` skips are
    /// relative to this, not to the start of the file (the body may be
    /// embedded in a version-2 `.ics`).
    body_start: u64,
}

impl PlainReader {
    pub fn new(mut file: File) -> IcsResult<PlainReader> {
        let body_start = file.stream_position().map_err(|_| IcsError::FReadIds)?;
        Ok(PlainReader { file, body_start })
    }
}

impl BodyRead for PlainReader {
    fn read_block(&mut self, dst: &mut [u8]) -> IcsResult {
        self.file.read_exact(dst).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => IcsError::EndOfStream,
            _ => IcsError::FReadIds,
        })
    }

    fn skip_block(&mut self, offset: i64, whence: Whence) -> IcsResult {
        let target = match whence {
            Whence::Set => {
                if offset < 0 {
                    return Err(IcsError::IllParameter);
                }
                SeekFrom::Start(self.body_start + offset as u64)
            }
            Whence::Cur => SeekFrom::Current(offset),
        };
        self.file.seek(target).map_err(|_| IcsError::FReadIds)?;
        Ok(())
    }
}

/// Uncompressed body writer.
pub struct PlainWriter {
    file: File,
}

impl PlainWriter {
    pub fn new(file: File) -> PlainWriter {
        PlainWriter { file }
    }
}

impl BodyWrite for PlainWriter {
    fn write(&mut self, data: &[u8]) -> IcsResult {
        for chunk in data.chunks(WRITE_CHUNK) {
            self.file.write_all(chunk).map_err(|_| IcsError::FWriteIds)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> IcsResult {
        self.file.flush().map_err(|_| IcsError::FCloseIds)
    }
}
