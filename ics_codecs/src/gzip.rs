//! Hand-framed gzip over a raw deflate stream.
//!
//! The envelope is the minimal one: magic, method 8, no flags, zeroed
//! mtime/xflags, host OS code, then deflate data with no zlib header,
//! then a little-endian CRC-32 of the uncompressed bytes and the
//! uncompressed length modulo 2^32. The CRC runs over the uncompressed
//! stream in the order it is produced or consumed, and the trailer is
//! checked exactly once, when the deflate stream ends.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crc32fast::Hasher;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use ics_core::codec::{BodyRead, BodyWrite, Whence};
use ics_core::{IcsError, IcsResult};

/// Deflate scratch size, both directions.
const SCRATCH: usize = 16 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;

const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;

fn os_code() -> u8 {
    if cfg!(unix) {
        0x03
    } else if cfg!(windows) {
        0x0b
    } else {
        0xff
    }
}

// ── Writer ─────────────────────────────────────────────────────────────────

pub struct GzipWriter {
    file: File,
    deflate: Compress,
    crc: Hasher,
    /// Uncompressed bytes fed so far; the trailer stores this mod 2^32.
    total_in: u64,
}

impl GzipWriter {
    /// Write the envelope header and set up a raw deflate context at
    /// `level` (clamped to 1..=9).
    pub fn new(mut file: File, level: u32) -> IcsResult<GzipWriter> {
        let header: [u8; 10] = [
            GZIP_MAGIC[0],
            GZIP_MAGIC[1],
            METHOD_DEFLATE,
            0, // flags: no extra field, no name, no comment, no header CRC
            0,
            0,
            0,
            0, // mtime
            0, // xflags
            os_code(),
        ];
        file.write_all(&header).map_err(|_| IcsError::FWriteIds)?;
        let level = level.clamp(1, 9);
        Ok(GzipWriter {
            file,
            deflate: Compress::new(Compression::new(level), false),
            crc: Hasher::new(),
            total_in: 0,
        })
    }

    /// Push `input` through deflate, draining all produced output to the
    /// file. With `FlushCompress::Finish` this loops until `StreamEnd`.
    fn pump(&mut self, mut input: &[u8], flush: FlushCompress) -> IcsResult {
        let mut out = [0u8; SCRATCH];
        loop {
            let before_in = self.deflate.total_in();
            let before_out = self.deflate.total_out();
            let status = self
                .deflate
                .compress(input, &mut out, flush)
                .map_err(|_| IcsError::CompressionProblem)?;
            let consumed = (self.deflate.total_in() - before_in) as usize;
            let produced = (self.deflate.total_out() - before_out) as usize;
            if produced > 0 {
                self.file
                    .write_all(&out[..produced])
                    .map_err(|_| IcsError::FWriteIds)?;
            }
            input = &input[consumed..];
            match flush {
                FlushCompress::Finish => {
                    if status == Status::StreamEnd {
                        return Ok(());
                    }
                }
                _ => {
                    if input.is_empty() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl BodyWrite for GzipWriter {
    fn write(&mut self, data: &[u8]) -> IcsResult {
        self.crc.update(data);
        self.total_in += data.len() as u64;
        self.pump(data, FlushCompress::None)
    }

    fn finish(&mut self) -> IcsResult {
        self.pump(&[], FlushCompress::Finish)?;
        let crc = std::mem::take(&mut self.crc).finalize();
        let len = self.total_in as u32;
        self.file
            .write_all(&crc.to_le_bytes())
            .and_then(|()| self.file.write_all(&len.to_le_bytes()))
            .and_then(|()| self.file.flush())
            .map_err(|_| IcsError::FWriteIds)
    }
}

// ── Reader ─────────────────────────────────────────────────────────────────

pub struct GzipReader {
    file: File,
    inflate: Decompress,
    crc: Hasher,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_end: usize,
    /// File offset of the gzip stream; backward skips restart from here.
    body_start: u64,
    /// Decoded bytes delivered so far.
    logical_pos: u64,
    /// One decoded-but-undelivered byte, produced while probing for the
    /// end of stream; served before anything else on the next read.
    pending: Option<u8>,
    /// Trailer seen and verified; nothing more to read.
    at_end: bool,
}

impl GzipReader {
    pub fn new(mut file: File) -> IcsResult<GzipReader> {
        let body_start = file.stream_position().map_err(|_| IcsError::FReadIds)?;
        let mut reader = GzipReader {
            file,
            inflate: Decompress::new(false),
            crc: Hasher::new(),
            buf: vec![0u8; SCRATCH],
            buf_pos: 0,
            buf_end: 0,
            body_start,
            logical_pos: 0,
            pending: None,
            at_end: false,
        };
        reader.read_header()?;
        Ok(reader)
    }

    fn refill(&mut self) -> IcsResult {
        let n = self.file.read(&mut self.buf).map_err(|_| IcsError::FReadIds)?;
        if n == 0 {
            return Err(IcsError::EndOfStream);
        }
        self.buf_pos = 0;
        self.buf_end = n;
        Ok(())
    }

    fn next_byte(&mut self) -> IcsResult<u8> {
        if self.buf_pos == self.buf_end {
            self.refill()?;
        }
        let b = self.buf[self.buf_pos];
        self.buf_pos += 1;
        Ok(b)
    }

    /// Parse the gzip header, including the optional fields this writer
    /// never emits but other producers do.
    fn read_header(&mut self) -> IcsResult {
        let magic = [self.next_byte()?, self.next_byte()?];
        if magic != GZIP_MAGIC {
            return Err(IcsError::CorruptedStream);
        }
        if self.next_byte()? != METHOD_DEFLATE {
            return Err(IcsError::CorruptedStream);
        }
        let flags = self.next_byte()?;
        for _ in 0..6 {
            self.next_byte()?; // mtime, xflags, OS
        }
        if flags & FLAG_EXTRA != 0 {
            let len = u16::from_le_bytes([self.next_byte()?, self.next_byte()?]);
            for _ in 0..len {
                self.next_byte()?;
            }
        }
        if flags & FLAG_NAME != 0 {
            while self.next_byte()? != 0 {}
        }
        if flags & FLAG_COMMENT != 0 {
            while self.next_byte()? != 0 {}
        }
        if flags & FLAG_HCRC != 0 {
            self.next_byte()?;
            self.next_byte()?;
        }
        Ok(())
    }

    /// Read the eight trailer bytes and check CRC and length against what
    /// the inflate pass accumulated. Any mismatch is a corrupted stream;
    /// only a short trailer is an end-of-stream condition.
    fn verify_trailer(&mut self) -> IcsResult {
        let mut trailer = [0u8; 8];
        for slot in trailer.iter_mut() {
            *slot = self.next_byte()?;
        }
        let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let stored_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        let crc = self.crc.clone().finalize();
        let len = self.inflate.total_out() as u32;
        if stored_crc != crc || stored_len != len {
            return Err(IcsError::CorruptedStream);
        }
        Ok(())
    }

    /// Drop all decode state and start over from the head of the stream.
    fn restart(&mut self) -> IcsResult {
        self.file
            .seek(SeekFrom::Start(self.body_start))
            .map_err(|_| IcsError::FReadIds)?;
        self.inflate.reset(false);
        self.crc = Hasher::new();
        self.buf_pos = 0;
        self.buf_end = 0;
        self.logical_pos = 0;
        self.pending = None;
        self.at_end = false;
        self.read_header()
    }

    /// Decode and discard `count` bytes.
    fn discard(&mut self, mut count: u64) -> IcsResult {
        let mut sink = [0u8; SCRATCH];
        while count > 0 {
            let n = count.min(SCRATCH as u64) as usize;
            self.read_block_inner(&mut sink[..n])?;
            count -= n as u64;
        }
        Ok(())
    }

    fn read_block_inner(&mut self, dst: &mut [u8]) -> IcsResult {
        if dst.is_empty() {
            return Ok(());
        }
        let mut out_pos = 0;
        if let Some(b) = self.pending.take() {
            dst[0] = b;
            out_pos = 1;
            self.logical_pos += 1;
        }
        if out_pos < dst.len() && self.at_end {
            return Err(IcsError::EndOfStream);
        }
        while out_pos < dst.len() {
            if self.buf_pos == self.buf_end {
                self.refill()?;
            }
            let before_in = self.inflate.total_in();
            let before_out = self.inflate.total_out();
            // Inflate's data errors mean the stream bytes are bad, the
            // same condition the trailer check guards against.
            let status = self
                .inflate
                .decompress(
                    &self.buf[self.buf_pos..self.buf_end],
                    &mut dst[out_pos..],
                    FlushDecompress::None,
                )
                .map_err(|_| IcsError::CorruptedStream)?;
            let consumed = (self.inflate.total_in() - before_in) as usize;
            let produced = (self.inflate.total_out() - before_out) as usize;
            self.buf_pos += consumed;
            if produced > 0 {
                self.crc.update(&dst[out_pos..out_pos + produced]);
                out_pos += produced;
                self.logical_pos += produced as u64;
            }
            match status {
                Status::StreamEnd => {
                    self.verify_trailer()?;
                    self.at_end = true;
                    if out_pos < dst.len() {
                        return Err(IcsError::EndOfStream);
                    }
                }
                // A buffer error just means inflate wants more input;
                // the refill at the top of the loop provides it.
                Status::BufError | Status::Ok => {}
            }
        }
        self.probe_stream_end()
    }

    /// An inflate context that filled the caller's buffer exactly may not
    /// have looked at the end-of-stream marker yet, and the trailer must
    /// be verified as soon as the last data byte is out. Nudge the
    /// context with a one-byte window: either the stream really ends
    /// (trailer checked here), or a data byte comes out and is held back
    /// for the next read.
    fn probe_stream_end(&mut self) -> IcsResult {
        while !self.at_end && self.pending.is_none() {
            if self.buf_pos == self.buf_end {
                let n = self.file.read(&mut self.buf).map_err(|_| IcsError::FReadIds)?;
                if n == 0 {
                    return Ok(()); // nothing buffered and nothing on disk yet
                }
                self.buf_pos = 0;
                self.buf_end = n;
            }
            let before_in = self.inflate.total_in();
            let before_out = self.inflate.total_out();
            let mut probe = [0u8; 1];
            let status = self
                .inflate
                .decompress(
                    &self.buf[self.buf_pos..self.buf_end],
                    &mut probe,
                    FlushDecompress::None,
                )
                .map_err(|_| IcsError::CorruptedStream)?;
            let consumed = (self.inflate.total_in() - before_in) as usize;
            let produced = (self.inflate.total_out() - before_out) as usize;
            self.buf_pos += consumed;
            if produced > 0 {
                self.crc.update(&probe);
                self.pending = Some(probe[0]);
                return Ok(());
            }
            match status {
                Status::StreamEnd => {
                    self.verify_trailer()?;
                    self.at_end = true;
                }
                Status::BufError | Status::Ok => {
                    if consumed == 0 {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

impl BodyRead for GzipReader {
    fn read_block(&mut self, dst: &mut [u8]) -> IcsResult {
        self.read_block_inner(dst)
    }

    /// Seeks are emulated: forward by decode-and-discard, backward by
    /// restarting the stream and discarding up to the target.
    fn skip_block(&mut self, offset: i64, whence: Whence) -> IcsResult {
        let target = match whence {
            Whence::Set => {
                if offset < 0 {
                    return Err(IcsError::IllParameter);
                }
                offset as u64
            }
            Whence::Cur => {
                let t = self.logical_pos as i64 + offset;
                if t < 0 {
                    return Err(IcsError::IllParameter);
                }
                t as u64
            }
        };
        if target < self.logical_pos {
            self.restart()?;
        }
        self.discard(target - self.logical_pos)
    }

    /// Give back the read-ahead: the underlying file offset is moved to
    /// just past the last consumed compressed byte, so a later open of
    /// the same file continues from a well-defined place.
    fn finish(&mut self) -> IcsResult {
        let unread = (self.buf_end - self.buf_pos) as i64;
        if unread > 0 {
            self.file
                .seek(SeekFrom::Current(-unread))
                .map_err(|_| IcsError::FCloseIds)?;
            self.buf_pos = self.buf_end;
        }
        Ok(())
    }
}
